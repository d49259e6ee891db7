use super::*;

#[test]
fn test_quote_ident_simple() {
    assert_eq!(quote_ident("roads"), r#""roads""#);
}

#[test]
fn test_quote_ident_with_embedded_quotes() {
    assert_eq!(quote_ident(r#"my"table"#), r#""my""table""#);
}

#[test]
fn test_quote_ident_keeps_dots() {
    assert_eq!(quote_ident("schema.table"), r#""schema.table""#);
}

#[test]
fn test_quote_table() {
    assert_eq!(
        quote_table("staging_004", "naturreservat"),
        r#""staging_004"."naturreservat""#
    );
}

#[test]
fn test_escape_sql_string() {
    assert_eq!(escape_sql_string("O'Brien"), "O''Brien");
    assert_eq!(escape_sql_string("plain"), "plain");
}

#[test]
fn test_sql_literal() {
    assert_eq!(sql_literal(""), "''");
    assert_eq!(sql_literal("Skyddad natur"), "'Skyddad natur'");
    assert_eq!(sql_literal("''"), "''''''");
}
