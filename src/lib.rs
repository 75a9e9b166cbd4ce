pub mod client;
pub mod config;
pub mod error;
pub mod extractor;
pub mod flatten;
pub mod models;
pub mod pagination;
pub mod schema;
pub mod since;
pub mod transform;
pub mod writer;

pub use client::JiraClient;
pub use config::{CustomJql, Dataset, ExtractorConfig};
pub use error::{Error, Result};
pub use extractor::JiraExtractor;
pub use models::*;

// Schema re-exports
pub use schema::{CUSTOM_FIELDS_KEY, Table, TableSchema};

// Transform re-exports
pub use transform::{changelog_rows, comment_row, document_text, transform_issue};

// Flattener re-export
pub use flatten::flatten;

// Since-date re-exports
pub use since::{SinceDate, parse_since};

// Writer re-export
pub use writer::TableWriter;
