//! Provider mapping tables

pub mod builtin;
pub mod mapping;
pub mod registry;

pub use mapping::{DeltaMode, DeltaSpec, FieldAlias, KindRule, ProviderMapping, RuleAction, TextPattern};
pub use registry::{ProviderError, ProviderRegistry};
