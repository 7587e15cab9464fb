//! Builder expansion
//!
//! A builder is a transient item. Once its scope body has run for an env,
//! its `mc_build` hook constructs regular items in the builder's own
//! container. Every item declared in the builder's body is then exposed as a
//! child of each produced item through a proxy, so shared configuration is
//! written once and not copied.

use crate::error::Result;
use crate::item::ItemId;
use crate::scope::{BuildContext, BuildFrame, Scope};

impl BuildContext {
    /// Run the deferred build of `builder` and wire its body items into the
    /// produced items
    pub(crate) fn expand_builder(&mut self, builder: ItemId) -> Result<()> {
        let schema = std::sync::Arc::clone(&self.tree.node(builder).schema);
        let Some(build) = schema.mc_build() else {
            return Ok(());
        };

        self.frames.push(BuildFrame {
            builder,
            produced: Vec::new(),
        });
        let result = build(&mut Scope::new(self, builder));
        let produced = self
            .frames
            .pop()
            .map(|frame| frame.produced)
            .unwrap_or_default();
        if let Err(err) = result {
            return Err(self.hook_failed(builder, "mc_build", err));
        }

        let env = self.env;
        let body_items = self.body_items(builder);
        let mut first = None;
        let mut count = 0;
        for item in produced {
            if !self.tree.node(item).is_included(env) {
                continue;
            }
            count += 1;
            for (name, key, target) in &body_items {
                if let Err(err) = self.tree.install_proxy(item, name, key.as_deref(), *target, env) {
                    let err = self.fail(item, err);
                    first.get_or_insert(err);
                }
            }
            let checked = self
                .backfill_children(item)
                .and_then(|()| self.check_required_children(item));
            if let Err(err) = checked {
                first.get_or_insert(err);
            }
        }

        tracing::debug!(
            "Expanded builder {} into {} item(s) for env '{}'",
            self.tree.path(builder),
            count,
            self.env_info.name()
        );
        first.map_or(Ok(()), Err)
    }

    /// Regular items declared in the builder's own scope body for the current env
    fn body_items(&self, builder: ItemId) -> Vec<(String, Option<String>, ItemId)> {
        let env = self.env;
        let node = self.tree.node(builder);
        let mut items = Vec::new();
        for (name, entry) in &node.children {
            for (key, slot) in entry.slots() {
                let Some(child) = slot.item else {
                    continue;
                };
                let child_node = self.tree.node(child);
                if child_node.schema.is_hidden() || !child_node.is_included(env) {
                    continue;
                }
                items.push((name.clone(), key.map(str::to_string), child));
            }
        }
        items
    }
}
