//! SQL query constants and builders
//!
//! Catalog queries are restricted to the `public` schema.

/// List all base tables in public schema
pub const LIST_TABLES: &str = r#"
    SELECT t.table_name::text AS table_name
    FROM information_schema.tables t
    WHERE t.table_schema = 'public'
        AND t.table_type = 'BASE TABLE'
    ORDER BY t.table_name
"#;

/// Single-column foreign keys as (table, column, referenced table, referenced column).
/// Composite constraints are skipped.
pub const LIST_REFERENCES: &str = r#"
    SELECT
        src.relname::text AS table_name,
        a1.attname::text AS column_name,
        ref.relname::text AS referenced_table,
        a2.attname::text AS referenced_column
    FROM pg_constraint c
    JOIN pg_class src ON src.oid = c.conrelid
    JOIN pg_class ref ON ref.oid = c.confrelid
    JOIN pg_namespace n ON n.oid = src.relnamespace
    JOIN pg_attribute a1 ON a1.attrelid = c.conrelid AND a1.attnum = c.conkey[1]
    JOIN pg_attribute a2 ON a2.attrelid = c.confrelid AND a2.attnum = c.confkey[1]
    WHERE c.contype = 'f'
        AND n.nspname = 'public'
        AND array_length(c.conkey, 1) = 1
    ORDER BY src.relname, c.conname
"#;

/// Primary key columns of every table in public schema
pub const LIST_PRIMARY_KEYS: &str = r#"
    SELECT tc.table_name::text AS table_name, kcu.column_name::text AS column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name
        AND tc.table_schema = kcu.table_schema
        AND tc.table_name = kcu.table_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
        AND tc.table_schema = 'public'
    ORDER BY tc.table_name, kcu.ordinal_position
"#;

/// Columns with a default value or an identity generator
pub const LIST_AUTO_VALUE_COLUMNS: &str = r#"
    SELECT c.table_name::text AS table_name, c.column_name::text AS column_name
    FROM information_schema.columns c
    JOIN information_schema.tables t
        ON c.table_schema = t.table_schema
        AND c.table_name = t.table_name
    WHERE (c.column_default IS NOT NULL OR c.is_identity = 'YES')
        AND t.table_schema = 'public'
        AND t.table_type = 'BASE TABLE'
    ORDER BY c.table_name, c.ordinal_position
"#;

/// SQL builder for safe identifier quoting
pub struct SqlBuilder;

impl SqlBuilder {
    /// Quote an identifier (table/column name) safely
    pub fn quote_ident(ident: &str) -> String {
        // PostgreSQL identifier quoting
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Select whole rows as JSON objects where `column` equals the value carried in `$1`.
    ///
    /// `$1` is a JSON object `{column: value}`; `json_populate_record` coerces the value
    /// to the column's type so text, numbers and dates compare natively.
    pub fn select_rows(table: &str, column: &str) -> String {
        let table = Self::quote_ident(table);
        let column = Self::quote_ident(column);
        format!(
            "SELECT row_to_json(t) AS row FROM {table} AS t \
             WHERE t.{column} = (json_populate_record(NULL::{table}, $1::json)).{column}"
        )
    }

    /// Insert one row whose values are carried as a JSON object in `$1`
    pub fn insert_row(table: &str, columns: &[String], returning: Option<&str>) -> String {
        let table = Self::quote_ident(table);

        let mut query = if columns.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            let cols = columns
                .iter()
                .map(|c| Self::quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            let selected = columns
                .iter()
                .map(|c| format!("r.{}", Self::quote_ident(c)))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "INSERT INTO {table} ({cols}) SELECT {selected} \
                 FROM json_populate_record(NULL::{table}, $1::json) AS r"
            )
        };

        if let Some(column) = returning {
            query.push_str(&format!(" RETURNING {}::text", Self::quote_ident(column)));
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(SqlBuilder::quote_ident("user"), "\"user\"");
        assert_eq!(SqlBuilder::quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_select_rows() {
        assert_eq!(
            SqlBuilder::select_rows("purchase", "from"),
            "SELECT row_to_json(t) AS row FROM \"purchase\" AS t \
             WHERE t.\"from\" = (json_populate_record(NULL::\"purchase\", $1::json)).\"from\""
        );
    }

    #[test]
    fn test_insert_row_with_returning() {
        let sql = SqlBuilder::insert_row(
            "purchase",
            &["person_id".to_string(), "from".to_string()],
            Some("id"),
        );
        assert_eq!(
            sql,
            "INSERT INTO \"purchase\" (\"person_id\", \"from\") SELECT r.\"person_id\", r.\"from\" \
             FROM json_populate_record(NULL::\"purchase\", $1::json) AS r RETURNING \"id\"::text"
        );
    }

    #[test]
    fn test_insert_row_only_defaults() {
        assert_eq!(
            SqlBuilder::insert_row("counter", &[], Some("id")),
            "INSERT INTO \"counter\" DEFAULT VALUES RETURNING \"id\"::text"
        );
        assert_eq!(
            SqlBuilder::insert_row("tag", &["name".to_string()], None),
            "INSERT INTO \"tag\" (\"name\") SELECT r.\"name\" FROM json_populate_record(NULL::\"tag\", $1::json) AS r"
        );
    }
}
