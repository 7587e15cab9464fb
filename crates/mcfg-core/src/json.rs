//! JSON rendering of env views
//!
//! An item renders as an object of its attributes followed by its visible
//! children. Repeatable collections render as objects keyed by item key.
//! Deferred values render as [`TODO_MARKER`]; attributes without a value
//! for the env are left out.

use crate::error::{ApiUsageError, ConfigError};
use crate::item::ChildEntry;
use crate::view::{ItemView, RepeatableView};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// Rendering of a todo value
pub const TODO_MARKER: &str = "MC_TODO";

impl Serialize for ItemView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (name, value) in self.attributes() {
            match value {
                Ok(value) => map.serialize_entry(name, value)?,
                Err(ConfigError::ApiUsage(ApiUsageError::TodoValue { .. })) => {
                    map.serialize_entry(name, TODO_MARKER)?;
                }
                Err(_) => {}
            }
        }

        let mut done: Vec<&str> = Vec::new();
        for child in self.children() {
            let name = child.name();
            if !self.child_entry(name).is_some_and(ChildEntry::is_repeatable) {
                map.serialize_entry(name, &child)?;
            } else if !done.contains(&name) {
                done.push(name);
                if let Ok(collection) = self.repeatable(name) {
                    map.serialize_entry(name, &collection)?;
                }
            }
        }
        map.end()
    }
}

impl Serialize for RepeatableView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (key, item) in self.iter() {
            map.serialize_entry(key, &item)?;
        }
        map.end()
    }
}

/// Render an env view as a JSON value
///
/// # Errors
/// Returns serialization errors from `serde_json`
pub fn to_json_value(view: &ItemView<'_>) -> serde_json::Result<Value> {
    serde_json::to_value(view)
}

/// Render an env view as pretty-printed JSON text
///
/// # Errors
/// Returns serialization errors from `serde_json`
pub fn to_json_string(view: &ItemView<'_>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(view)
}
