//! DuckDB formatting rules.
//!
//! The generated SQL targets exactly one engine, so dialect handling is a
//! small set of quoting and literal helpers rather than a trait:
//!
//! - ANSI identifier quoting (`"`)
//! - Single-quoted strings with `''` escaping
//! - `true`/`false` boolean literals
//! - `LIMIT ... OFFSET ...` pagination

/// Quote an identifier (table, column, alias).
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Format a boolean literal.
pub fn format_bool(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}
