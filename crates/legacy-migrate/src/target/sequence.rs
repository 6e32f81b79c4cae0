//! Identity counter reconciliation for the networked backend.

use super::quote_ident;

/// Statement moving the sequence behind `table.column` to the column's
/// current maximum, or 1 for an empty table. `pg_get_serial_sequence` yields
/// NULL for columns without a sequence, which makes `setval` a no-op.
pub fn setval_sql(table: &str, column: &str) -> String {
    format!(
        "SELECT setval(pg_get_serial_sequence('{}', '{}'), COALESCE(MAX({}), 1)) FROM {}",
        table.replace('\'', "''"),
        column.replace('\'', "''"),
        quote_ident(column),
        quote_ident(table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setval_sql() {
        assert_eq!(
            setval_sql("users", "id"),
            r#"SELECT setval(pg_get_serial_sequence('users', 'id'), COALESCE(MAX("id"), 1)) FROM "users""#
        );
    }
}
