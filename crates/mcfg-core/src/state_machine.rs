//! Item lifecycle state machine
//!
//! Every configuration item moves through construction, its nested scope,
//! the post-scope hooks and finally [`ItemState::Frozen`]. An item frozen for
//! one env is re-entered for the next env through the `InRe*` states.

use crate::attribute::Where;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a configuration item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemState {
    /// Constructed, init arguments being applied
    InInit,
    /// Re-entered for another env, init arguments being applied
    InReInit,
    /// Running the user `mc_init` hooks
    InMcInit,
    /// Running a builder's deferred build
    InMcBuild,
    /// Inside the item's own scope body
    InWith,
    /// Inside the scope body of a re-entered item
    InReWith,
    /// Immutable until re-entered for another env
    Frozen,
}

impl ItemState {
    /// Phase recorded as `where_from` for values set in this state
    #[must_use]
    pub fn phase(self) -> Option<Where> {
        match self {
            Self::InInit | Self::InReInit => Some(Where::Init),
            Self::InWith | Self::InReWith => Some(Where::With),
            Self::InMcInit => Some(Where::McInit),
            Self::InMcBuild => Some(Where::McBuild),
            Self::Frozen => None,
        }
    }

    /// True if child items may be constructed in this state
    #[inline]
    #[must_use]
    pub fn accepts_children(self) -> bool {
        matches!(self, Self::InWith | Self::InReWith | Self::InMcBuild | Self::InMcInit)
    }

    /// State entered by the scope body after init
    #[must_use]
    pub fn scope_state(self) -> Option<Self> {
        match self {
            Self::InInit => Some(Self::InWith),
            Self::InReInit => Some(Self::InReWith),
            _ => None,
        }
    }

    /// True once frozen
    #[inline]
    #[must_use]
    pub fn is_frozen(self) -> bool {
        self == Self::Frozen
    }
}

/// Transition not allowed by the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal state transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    /// Current state
    pub from: ItemState,
    /// Requested state
    pub to: ItemState,
}

/// Validates a state transition.
///
/// With the `strict-debug` feature an illegal transition panics instead, which
/// pinpoints the offending call in tests.
///
/// # Errors
/// Returns [`IllegalTransition`] if `to` is not reachable from `from`
pub fn validate_transition(from: ItemState, to: ItemState) -> Result<(), IllegalTransition> {
    if allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal item state transition attempted: {from:?} -> {to:?}");

        #[cfg(not(feature = "strict-debug"))]
        Err(IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: ItemState) -> Vec<ItemState> {
    use ItemState::*;
    match from {
        // Frozen directly from init means the item is excluded for the env
        InInit => vec![InWith, Frozen],
        InReInit => vec![InReWith, Frozen],
        InWith | InReWith => vec![InMcBuild, InMcInit],
        InMcBuild => vec![InMcInit],
        InMcInit => vec![Frozen],
        Frozen => vec![InReInit],
    }
}

fn allowed(from: ItemState, to: ItemState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
