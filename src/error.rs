use thiserror::Error;

/// Errors produced while compiling or evaluating a query.
///
/// `parse` only ever returns `Lexical` or `Syntax`; the remaining variants
/// come out of `select`. Evaluation is first-fail: the first error met in
/// traversal order aborts the query.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("lexical error: invalid input {0:?}")]
    Lexical(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("{key}: {expected} expected")]
    KindMismatch { key: String, expected: &'static str },

    #[error("option not found: {0}")]
    OptionNotFound(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("can not apply query to value {0}")]
    ApplyOnValue(String),

    #[error("{value}: fail to cast to {kind}")]
    Cast { value: String, kind: &'static str },
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

impl serde::Serialize for QueryError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
