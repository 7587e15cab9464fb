//! MCFG Environment Hierarchy
//!
//! Named deployment environments organized into groups, with
//! specificity-based most-specific-match resolution.
//!
//! # Overview
//!
//! The hierarchy provides:
//! - **Env**: Leaf environment with a unique bit position
//! - **EnvGroup**: Composite of envs and groups, ordered by specificity
//! - **EnvFactory**: Owner of the hierarchy, performs resolution
//!
//! # Example
//!
//! ```rust
//! use mcfg_envs::{EnvFactory, EnvKey};
//!
//! let mut factory = EnvFactory::new();
//! let prod = factory.env("prod").unwrap();
//! let pp = factory.env("pp").unwrap();
//! let g_ppr = factory.group("g_ppr", &[prod.into(), pp.into()]).unwrap();
//! factory.seal().unwrap();
//!
//! // prod is more specific than g_ppr
//! let candidates = [EnvKey::from(g_ppr), EnvKey::from(prod)];
//! assert_eq!(factory.resolve_most_specific(candidates, prod).unwrap(), Some(prod.into()));
//! assert_eq!(factory.resolve_most_specific(candidates, pp).unwrap(), Some(g_ppr.into()));
//! ```

#![warn(missing_docs)]

pub mod env;
pub mod factory;
pub mod mask;

// Re-exports
pub use env::{Env, EnvGroup, EnvId, EnvKey, GroupId};
pub use factory::{EnvError, EnvFactory, DEFAULT_GROUP};
pub use mask::EnvMask;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for env hierarchy operations
    pub use crate::{Env, EnvError, EnvFactory, EnvGroup, EnvId, EnvKey, EnvMask, GroupId};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
