use thiserror::Error;

/// Compilation failures. All are configuration mistakes; the compiler never
/// repairs input, it rejects it.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("column '{column}' referenced by {context} is not declared on table '{table}'")]
    UnknownColumn {
        column: String,
        table: String,
        context: &'static str,
    },
    #[error("{statement} requires a non-empty key list")]
    EmptyKeys { statement: &'static str },
    #[error("table '{table}' has no columns to compile")]
    NoColumns { table: String },
    #[error("column '{column}' has no resolved type; cannot compile CREATE TABLE")]
    UnresolvedType { column: String },
}
