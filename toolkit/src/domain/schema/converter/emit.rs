//! Target DDL emission

use super::ColumnConversion;
use crate::core::constants::STARROCKS_BUCKETS;
use crate::domain::schema::TargetDialect;
use crate::domain::schema::types::TableSchema;

/// DDL syntax of one target database
pub trait DdlEmitter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render `CREATE TABLE` for an already mapped table
    fn create_table(&self, table: &TableSchema, columns: &[ColumnConversion]) -> String;

    /// Quote an identifier only when it is not a plain word
    fn ident(&self, name: &str) -> String {
        let plain = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if plain {
            name.to_string()
        } else {
            format!("`{}`", name.replace('`', "``"))
        }
    }
}

pub struct ClickhouseEmitter;

pub struct StarrocksEmitter;

/// Emitter for a target dialect
pub fn emitter(target: TargetDialect) -> &'static dyn DdlEmitter {
    match target {
        TargetDialect::ClickHouse => &ClickhouseEmitter,
        TargetDialect::StarRocks => &StarrocksEmitter,
    }
}

impl DdlEmitter for ClickhouseEmitter {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    fn create_table(&self, table: &TableSchema, columns: &[ColumnConversion]) -> String {
        let body = columns
            .iter()
            .map(|c| format!("    {} {}", self.ident(&c.name), c.mapping.target_type))
            .collect::<Vec<_>>()
            .join(",\n");
        let order_by = if table.primary_key.is_empty() {
            "tuple()".to_string()
        } else {
            let keys: Vec<_> = table.primary_key.iter().map(|k| self.ident(k)).collect();
            format!("({})", keys.join(", "))
        };
        format!(
            "CREATE TABLE {} (\n{}\n) ENGINE = MergeTree() ORDER BY {};",
            self.ident(&table.name),
            body,
            order_by
        )
    }
}

impl DdlEmitter for StarrocksEmitter {
    fn name(&self) -> &'static str {
        "starrocks"
    }

    fn create_table(&self, table: &TableSchema, columns: &[ColumnConversion]) -> String {
        let keys: Vec<String> = if table.primary_key.is_empty() {
            columns.first().map(|c| c.name.clone()).into_iter().collect()
        } else {
            table.primary_key.clone()
        };

        // Key columns must lead the column list
        let is_key = |name: &str| keys.iter().any(|k| k.eq_ignore_ascii_case(name));
        let mut ordered: Vec<&ColumnConversion> = keys
            .iter()
            .filter_map(|k| columns.iter().find(|c| c.name.eq_ignore_ascii_case(k)))
            .collect();
        ordered.extend(columns.iter().filter(|c| !is_key(&c.name)));

        let body = ordered
            .iter()
            .map(|c| {
                let not_null = if c.nullable { "" } else { " NOT NULL" };
                format!("    {} {}{}", self.ident(&c.name), c.mapping.target_type, not_null)
            })
            .collect::<Vec<_>>()
            .join(",\n");
        let key_list = keys
            .iter()
            .map(|k| self.ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE TABLE {} (\n{}\n) ENGINE=OLAP\nDUPLICATE KEY({})\nDISTRIBUTED BY HASH({}) BUCKETS {};",
            self.ident(&table.name),
            body,
            key_list,
            key_list,
            STARROCKS_BUCKETS
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::types::{ColumnSchema, TypeMappingResult};

    fn column(name: &str, target: &str, nullable: bool) -> ColumnConversion {
        ColumnConversion {
            name: name.to_string(),
            source_type: String::new(),
            nullable,
            mapping: TypeMappingResult::new(target),
        }
    }

    fn table(pk: &[&str]) -> TableSchema {
        TableSchema {
            name: "t".into(),
            columns: vec![ColumnSchema {
                name: "a".into(),
                data_type: "INT".into(),
                nullable: true,
                default: None,
                is_primary_key: false,
            }],
            primary_key: pk.iter().map(|s| s.to_string()).collect(),
            indexes: vec![],
            options: None,
        }
    }

    #[test]
    fn test_clickhouse_without_key_orders_by_tuple() {
        let ddl = emitter(TargetDialect::ClickHouse)
            .create_table(&table(&[]), &[column("a", "Int32", true)]);
        assert_eq!(
            ddl,
            "CREATE TABLE t (\n    a Int32\n) ENGINE = MergeTree() ORDER BY tuple();"
        );
    }

    #[test]
    fn test_starrocks_keys_lead() {
        let ddl = emitter(TargetDialect::StarRocks).create_table(
            &table(&["b"]),
            &[column("a", "STRING", true), column("b", "BIGINT", false)],
        );
        assert_eq!(
            ddl,
            "CREATE TABLE t (\n    b BIGINT NOT NULL,\n    a STRING\n) ENGINE=OLAP\nDUPLICATE KEY(b)\nDISTRIBUTED BY HASH(b) BUCKETS 10;"
        );
    }

    #[test]
    fn test_starrocks_first_column_fallback_key() {
        let ddl = emitter(TargetDialect::StarRocks)
            .create_table(&table(&[]), &[column("a", "INT", true), column("b", "INT", true)]);
        assert!(ddl.contains("DUPLICATE KEY(a)"));
        assert!(ddl.contains("HASH(a)"));
    }

    #[test]
    fn test_ident_quoting() {
        let e = emitter(TargetDialect::ClickHouse);
        assert_eq!(e.name(), "clickhouse");
        assert_eq!(e.ident("user_id"), "user_id");
        assert_eq!(e.ident("order date"), "`order date`");
        assert_eq!(e.ident("1st"), "`1st`");
    }
}
