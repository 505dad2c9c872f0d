//! Error types for schema loading
//!
//! Flat hierarchy, same as everything else in the workspace.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchemaError>;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Duplicate domain: {0}")]
    DuplicateDomain(String),

    #[error("Duplicate {category} '{domain}.{name}'")]
    DuplicateItem {
        category: &'static str,
        domain: String,
        name: String,
    },

    #[error("Duplicate parameter '{parameter}' in {list} of '{domain}.{item}'")]
    DuplicateParameter {
        domain: String,
        item: String,
        list: &'static str,
        parameter: String,
    },

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
}
