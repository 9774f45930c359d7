//! Generated table naming: `{type}_{source}_{basename}`, truncated to the
//! dialect's identifier limit.

use rowferry_types::Dialect;

/// Kinds of tables the engine generates names for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Final target of a pipeline without an explicit target table.
    Raw,
    /// Staging dataset.
    Staging,
    /// Error handler.
    ErrorHandler,
    /// Run log.
    Log,
}

impl TableKind {
    pub fn prefix(self) -> &'static str {
        match self {
            TableKind::Raw => "raw",
            TableKind::Staging => "ds",
            TableKind::ErrorHandler => "eh",
            TableKind::Log => "log",
        }
    }
}

/// Build a generated table name.
///
/// With the default pattern the prefix and source are kept intact and the
/// basename is truncated to fit the dialect's identifier limit. A custom
/// pattern may use `{type}`, `{source}`, and `{basename}` placeholders and
/// is truncated as a whole.
pub fn generated_name(
    kind: TableKind,
    source: &str,
    basename: &str,
    pattern: Option<&str>,
    dialect: Dialect,
) -> String {
    let max = dialect.max_identifier_len();
    match pattern {
        Some(pattern) => {
            let name = pattern
                .replace("{type}", kind.prefix())
                .replace("{source}", source)
                .replace("{basename}", basename);
            truncate(&name, max)
        }
        None => {
            let head = format!("{}_{source}_", kind.prefix());
            let room = max.saturating_sub(head.len());
            format!("{head}{}", truncate(basename, room))
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pattern() {
        assert_eq!(
            generated_name(TableKind::Staging, "erp", "orders", None, Dialect::Sqlite),
            "ds_erp_orders"
        );
        assert_eq!(
            generated_name(TableKind::ErrorHandler, "erp", "orders", None, Dialect::Sqlite),
            "eh_erp_orders"
        );
    }

    #[test]
    fn basename_truncates_to_oracle_limit() {
        let long = "a".repeat(40);
        let name = generated_name(TableKind::Raw, "erp", &long, None, Dialect::Oracle);
        assert_eq!(name.len(), 30);
        assert!(name.starts_with("raw_erp_"));
    }

    #[test]
    fn custom_pattern_overrides_layout() {
        let name = generated_name(
            TableKind::Log,
            "erp",
            "orders",
            Some("{basename}_{type}"),
            Dialect::Sqlite,
        );
        assert_eq!(name, "orders_log");
    }
}
