//! graphport-registry: identity-keyed storage of converted records.
//!
//! - [`ObjectDefinitions`] is the capability the walker registers through.
//! - [`LongTermObjectRegistry`] caches records across conversions.
//! - [`RegistryIncrement`] collects what one walk added; it is folded into
//!   the long-term registry with [`LongTermObjectRegistry::merge_increment`].
//! - [`ObjectRegistry`] is the per-walk view over both.

mod error;
mod increment;
mod key;
mod long_term;
mod object_registry;
mod traits;

pub use error::RegistryError;
pub use increment::{RegistryEntry, RegistryIncrement};
pub use key::IdentityKey;
pub use long_term::LongTermObjectRegistry;
pub use object_registry::ObjectRegistry;
pub use traits::{DependencyGraph, ObjectDefinitions, RecordLookup, Registration};
