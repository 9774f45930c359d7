use std::path::Path;

use anyhow::{Context, Result};

use rowferry_engine::config::load_pipeline;
use rowferry_sql::select;

/// Parse and compile a pipeline without touching any database.
pub fn check(pipeline: &Path) -> Result<()> {
    let config = load_pipeline(pipeline)?;
    let descriptor = config.to_descriptor().context("invalid pipeline")?;
    let sql = select::compile_select(&descriptor, config.dialect)
        .context("pipeline does not compile")?;
    println!("pipeline '{}' is valid ({:?} mode, {} dialect)", config.pipeline, config.mode, config.dialect);
    println!("\ncompiled extract query:\n{sql}");
    Ok(())
}
