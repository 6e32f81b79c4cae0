//! Destination writers and the SQL they share.
//!
//! Both backends speak the same INSERT dialect (`"quoted"` identifiers,
//! multi-row `VALUES`, `ON CONFLICT`). They differ in how values reach the
//! server: the embedded writer binds parameters, the networked writer renders
//! SQL literals.

mod postgres;
mod sequence;
mod sqlite;

pub use postgres::{PostgresTarget, TlsMode};
pub use sequence::setval_sql;
pub use sqlite::{SqliteTarget, SQLITE_MAX_VARIABLES};

use crate::registry::{ConflictPolicy, TableSpec};

/// Quote an identifier with double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Comma-separated list of quoted identifiers.
pub(crate) fn ident_list(names: &[&str]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `INSERT INTO "t" ("a", "b") VALUES ` prefix, in destination column order.
pub(crate) fn insert_prefix(spec: &TableSpec) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ",
        quote_ident(spec.name),
        ident_list(&spec.column_names())
    )
}

/// Trailing conflict clause for `spec`.
///
/// [`ConflictPolicy::Update`] always yields `ON CONFLICT (key) DO UPDATE`.
/// [`ConflictPolicy::Ignore`] yields `ON CONFLICT DO NOTHING` only when
/// `skip_duplicates` is set; a freshly created destination has nothing to
/// collide with, so the embedded writer passes `false`.
pub(crate) fn conflict_clause(spec: &TableSpec, skip_duplicates: bool) -> String {
    match &spec.on_conflict {
        ConflictPolicy::Update(cols) => {
            let sets: Vec<String> = cols
                .iter()
                .map(|c| {
                    let q = quote_ident(c);
                    format!("{} = EXCLUDED.{}", q, q)
                })
                .collect();
            format!(
                " ON CONFLICT ({}) DO UPDATE SET {}",
                ident_list(&spec.conflict_key),
                sets.join(", ")
            )
        }
        ConflictPolicy::Ignore if skip_duplicates => " ON CONFLICT DO NOTHING".to_string(),
        ConflictPolicy::Ignore => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::builtin;

    fn spec(name: &str) -> TableSpec {
        builtin().into_iter().find(|s| s.name == name).unwrap()
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_insert_prefix_follows_column_order() {
        assert_eq!(
            insert_prefix(&spec("character_attrs")),
            r#"INSERT INTO "character_attrs" ("user_id", "attr_name", "attr_value") VALUES "#
        );
    }

    #[test]
    fn test_update_clause() {
        assert_eq!(
            conflict_clause(&spec("character_attrs"), false),
            r#" ON CONFLICT ("user_id", "attr_name") DO UPDATE SET "attr_value" = EXCLUDED."attr_value""#
        );
    }

    #[test]
    fn test_ignore_clause_depends_on_backend() {
        let users = spec("users");
        assert_eq!(conflict_clause(&users, true), " ON CONFLICT DO NOTHING");
        assert_eq!(conflict_clause(&users, false), "");
    }
}
