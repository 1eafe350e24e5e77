//! Path-and-predicate queries over hierarchical documents.
//!
//! A query names a path through a document of nested tables and arrays,
//! optionally constraining node kinds (`@` array, `$` table, `%` scalar),
//! refining matches with selectors (`:first`, `:range(a,b)`, `:number`, …)
//! and filtering tables with bracketed predicates. Evaluation returns every
//! matching value together with the key path that led to it.
//!
//! # Example
//!
//! ```
//! let doc: docq::Value = serde_json::from_str(r#"{"service": {"port": 8080}}"#).unwrap();
//! let query = docq::parse(".service.port").unwrap();
//! let results = query.select(&doc).unwrap();
//! assert_eq!(results.len(), 1);
//! assert_eq!(results[0].path, vec!["service", "port"]);
//! assert_eq!(results[0].value, docq::Value::Int(8080));
//! ```

pub mod document;
pub mod error;
pub mod glob;
pub mod query;

pub use document::Value;
pub use error::{QueryError, QueryResult};
pub use query::{parse, Queryset, Selection};
