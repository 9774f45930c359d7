//! Pipeline configuration loading.

mod parser;

pub use parser::{load_pipeline, parse_pipeline_str, substitute_env_vars};
