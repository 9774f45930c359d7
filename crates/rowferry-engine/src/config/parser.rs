//! YAML pipeline file parsing with `${ENV_VAR}` substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;

use rowferry_types::PipelineConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex"));

/// Replace every `${NAME}` with the value of the environment variable.
/// Unset variables are an error, not an empty string.
pub fn substitute_env_vars(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut last = 0;
    for caps in ENV_VAR_RE.captures_iter(raw) {
        let whole = caps.get(0).expect("capture 0");
        let name = &caps[1];
        out.push_str(&raw[last..whole.start()]);
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => bail!("environment variable '{name}' referenced in pipeline config is not set"),
        }
        last = whole.end();
    }
    out.push_str(&raw[last..]);
    Ok(out)
}

pub fn parse_pipeline_str(raw: &str) -> Result<PipelineConfig> {
    let substituted = substitute_env_vars(raw)?;
    let config: PipelineConfig =
        serde_yaml::from_str(&substituted).context("failed to parse pipeline config")?;
    Ok(config)
}

pub fn load_pipeline(path: &Path) -> Result<PipelineConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read pipeline config {}", path.display()))?;
    parse_pipeline_str(&raw)
}
