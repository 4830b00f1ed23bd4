pub mod loader;
pub mod schema;

pub use loader::{
    load_from_path, load_from_str, load_replacer, replacer_from_str, ConfigError, Origin, Overrides,
};
pub use schema::{
    Filter, Options, PatternDefinition, ReplaceConfig, ValidationError, ValidationIssue,
};
