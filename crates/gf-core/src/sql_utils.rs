//! SQL quoting utilities
//!
//! Identifiers built from dataset ids and schema names are always quoted
//! before they are spliced into generated SQL.

/// Quote a SQL identifier, doubling embedded double quotes.
///
/// # Examples
/// ```
/// use gf_core::sql_utils::quote_ident;
/// assert_eq!(quote_ident("roads"), r#""roads""#);
/// assert_eq!(quote_ident(r#"my"table"#), r#""my""table""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a `schema.table` pair.
///
/// # Examples
/// ```
/// use gf_core::sql_utils::quote_table;
/// assert_eq!(quote_table("raw", "roads"), r#""raw"."roads""#);
/// ```
pub fn quote_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Escape a value for use inside a single-quoted SQL string literal.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Render a value as a complete single-quoted SQL string literal.
///
/// # Examples
/// ```
/// use gf_core::sql_utils::sql_literal;
/// assert_eq!(sql_literal("it's"), "'it''s'");
/// ```
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", escape_sql_string(value))
}

#[cfg(test)]
#[path = "sql_utils_test.rs"]
mod tests;
