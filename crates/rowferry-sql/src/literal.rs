//! JSON config values rendered as SQL literals.

use chrono::NaiveDateTime;
use rowferry_types::Dialect;
use serde_json::Value as Json;

/// Render a scalar config value. Strings are single-quoted with embedded
/// quotes doubled; null becomes NULL; numbers and booleans use their
/// natural text form. Arrays are handled by the filter renderer, not here.
pub fn render(value: &Json) -> String {
    match value {
        Json::Null => "NULL".to_string(),
        Json::Bool(true) => "TRUE".to_string(),
        Json::Bool(false) => "FALSE".to_string(),
        Json::Number(n) => n.to_string(),
        Json::String(s) => quote(s),
        other => quote(&other.to_string()),
    }
}

/// Render the elements of a list value, comma-separated, for IN lists.
pub fn render_list(values: &[Json]) -> String {
    values.iter().map(render).collect::<Vec<_>>().join(", ")
}

pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Render a timestamp bound. Oracle needs an explicit TO_DATE; the other
/// dialects compare against the ISO text form directly.
pub fn render_timestamp(ts: &NaiveDateTime, dialect: Dialect) -> String {
    let text = ts.format("%Y-%m-%d %H:%M:%S").to_string();
    match dialect {
        Dialect::Oracle => format!("TO_DATE('{text}', 'YYYY-MM-DD HH24:MI:SS')"),
        _ => format!("'{text}'"),
    }
}
