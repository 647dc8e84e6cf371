//! Built-in mapping rules, used when no rules file is configured or the
//! configured one fails to load

use std::collections::BTreeMap;

use super::types::{
    Condition, ConditionField, ConditionOperator, ConditionValue, ContextRule, RuleTable,
};

const MYSQL_CLICKHOUSE: &[(&str, &str)] = &[
    ("TINYINT", "Int8"),
    ("TINYINT UNSIGNED", "UInt8"),
    ("SMALLINT", "Int16"),
    ("SMALLINT UNSIGNED", "UInt16"),
    ("MEDIUMINT", "Int32"),
    ("MEDIUMINT UNSIGNED", "UInt32"),
    ("INT", "Int32"),
    ("INT UNSIGNED", "UInt32"),
    ("INTEGER", "Int32"),
    ("INTEGER UNSIGNED", "UInt32"),
    ("BIGINT", "Int64"),
    ("BIGINT UNSIGNED", "UInt64"),
    ("FLOAT", "Float32"),
    ("DOUBLE", "Float64"),
    ("REAL", "Float64"),
    ("DECIMAL", "Decimal"),
    ("NUMERIC", "Decimal"),
    ("DEC", "Decimal"),
    ("FIXED", "Decimal"),
    ("BIT", "UInt64"),
    ("BOOL", "Bool"),
    ("BOOLEAN", "Bool"),
    ("CHAR", "String"),
    ("VARCHAR", "String"),
    ("TINYTEXT", "String"),
    ("TEXT", "String"),
    ("MEDIUMTEXT", "String"),
    ("LONGTEXT", "String"),
    ("BINARY", "String"),
    ("VARBINARY", "String"),
    ("TINYBLOB", "String"),
    ("BLOB", "String"),
    ("MEDIUMBLOB", "String"),
    ("LONGBLOB", "String"),
    ("JSON", "String"),
    ("ENUM", "String"),
    ("SET", "String"),
    ("DATE", "Date32"),
    ("DATETIME", "DateTime"),
    ("TIMESTAMP", "DateTime"),
    ("TIME", "String"),
    ("YEAR", "UInt16"),
];

const POSTGRES_CLICKHOUSE: &[(&str, &str)] = &[
    ("SMALLINT", "Int16"),
    ("INT2", "Int16"),
    ("INTEGER", "Int32"),
    ("INT", "Int32"),
    ("INT4", "Int32"),
    ("BIGINT", "Int64"),
    ("INT8", "Int64"),
    ("SMALLSERIAL", "Int16"),
    ("SERIAL", "Int32"),
    ("BIGSERIAL", "Int64"),
    ("REAL", "Float32"),
    ("FLOAT4", "Float32"),
    ("FLOAT", "Float64"),
    ("FLOAT8", "Float64"),
    ("DOUBLE PRECISION", "Float64"),
    ("NUMERIC", "Decimal"),
    ("DECIMAL", "Decimal"),
    ("BOOLEAN", "Bool"),
    ("BOOL", "Bool"),
    ("CHAR", "String"),
    ("CHARACTER", "String"),
    ("BPCHAR", "String"),
    ("VARCHAR", "String"),
    ("CHARACTER VARYING", "String"),
    ("TEXT", "String"),
    ("BYTEA", "String"),
    ("UUID", "UUID"),
    ("JSON", "String"),
    ("JSONB", "String"),
    ("INET", "String"),
    ("DATE", "Date32"),
    ("TIMESTAMP", "DateTime64"),
    ("TIMESTAMP WITHOUT TIME ZONE", "DateTime64"),
    ("TIMESTAMPTZ", "DateTime64"),
    ("TIMESTAMP WITH TIME ZONE", "DateTime64"),
    ("TIME", "String"),
    ("TIME WITHOUT TIME ZONE", "String"),
    ("INTERVAL", "Int64"),
];

const MYSQL_STARROCKS: &[(&str, &str)] = &[
    ("TINYINT", "TINYINT"),
    ("TINYINT UNSIGNED", "SMALLINT"),
    ("SMALLINT", "SMALLINT"),
    ("SMALLINT UNSIGNED", "INT"),
    ("MEDIUMINT", "INT"),
    ("MEDIUMINT UNSIGNED", "INT"),
    ("INT", "INT"),
    ("INT UNSIGNED", "BIGINT"),
    ("INTEGER", "INT"),
    ("INTEGER UNSIGNED", "BIGINT"),
    ("BIGINT", "BIGINT"),
    ("BIGINT UNSIGNED", "LARGEINT"),
    ("FLOAT", "FLOAT"),
    ("DOUBLE", "DOUBLE"),
    ("REAL", "DOUBLE"),
    ("DECIMAL", "DECIMAL"),
    ("NUMERIC", "DECIMAL"),
    ("DEC", "DECIMAL"),
    ("BIT", "BIGINT"),
    ("BOOL", "BOOLEAN"),
    ("BOOLEAN", "BOOLEAN"),
    ("CHAR", "CHAR"),
    ("VARCHAR", "VARCHAR"),
    ("TINYTEXT", "STRING"),
    ("TEXT", "STRING"),
    ("MEDIUMTEXT", "STRING"),
    ("LONGTEXT", "STRING"),
    ("BINARY", "VARBINARY"),
    ("VARBINARY", "VARBINARY"),
    ("BLOB", "VARBINARY"),
    ("LONGBLOB", "VARBINARY"),
    ("JSON", "JSON"),
    ("ENUM", "STRING"),
    ("SET", "STRING"),
    ("DATE", "DATE"),
    ("DATETIME", "DATETIME"),
    ("TIMESTAMP", "DATETIME"),
    ("TIME", "STRING"),
    ("YEAR", "SMALLINT"),
];

const POSTGRES_STARROCKS: &[(&str, &str)] = &[
    ("SMALLINT", "SMALLINT"),
    ("INT2", "SMALLINT"),
    ("INTEGER", "INT"),
    ("INT", "INT"),
    ("INT4", "INT"),
    ("BIGINT", "BIGINT"),
    ("INT8", "BIGINT"),
    ("SMALLSERIAL", "SMALLINT"),
    ("SERIAL", "INT"),
    ("BIGSERIAL", "BIGINT"),
    ("REAL", "FLOAT"),
    ("FLOAT4", "FLOAT"),
    ("FLOAT", "DOUBLE"),
    ("FLOAT8", "DOUBLE"),
    ("DOUBLE PRECISION", "DOUBLE"),
    ("NUMERIC", "DECIMAL"),
    ("DECIMAL", "DECIMAL"),
    ("BOOLEAN", "BOOLEAN"),
    ("BOOL", "BOOLEAN"),
    ("CHAR", "CHAR"),
    ("CHARACTER", "CHAR"),
    ("VARCHAR", "VARCHAR"),
    ("CHARACTER VARYING", "VARCHAR"),
    ("TEXT", "STRING"),
    ("BYTEA", "VARBINARY"),
    ("UUID", "VARCHAR(36)"),
    ("JSON", "JSON"),
    ("JSONB", "JSON"),
    ("DATE", "DATE"),
    ("TIMESTAMP", "DATETIME"),
    ("TIMESTAMP WITHOUT TIME ZONE", "DATETIME"),
    ("TIMESTAMPTZ", "DATETIME"),
    ("TIMESTAMP WITH TIME ZONE", "DATETIME"),
    ("TIME", "STRING"),
    ("INTERVAL", "BIGINT"),
];

fn table(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Base type tables for every supported dialect pair.
///
/// TiDB has no table of its own and resolves through the MySQL entries.
pub fn default_rules() -> RuleTable {
    let mut rules = RuleTable::new();
    rules.insert("mysql:clickhouse".into(), table(MYSQL_CLICKHOUSE));
    rules.insert("postgres:clickhouse".into(), table(POSTGRES_CLICKHOUSE));
    rules.insert("mysql:starrocks".into(), table(MYSQL_STARROCKS));
    rules.insert("postgres:starrocks".into(), table(POSTGRES_STARROCKS));
    rules
}

fn cond(field: ConditionField, operator: ConditionOperator, value: ConditionValue) -> Condition {
    Condition {
        field,
        operator,
        value,
    }
}

fn text(s: &str) -> ConditionValue {
    ConditionValue::Text(s.to_string())
}

pub fn context_rules() -> Vec<ContextRule> {
    use ConditionField::*;
    use ConditionOperator::*;

    vec![
        ContextRule {
            name: "uuid_char36".into(),
            conditions: vec![
                cond(TargetDb, Equals, text("clickhouse")),
                cond(BaseType, Equals, text("CHAR")),
                cond(Length, Equals, ConditionValue::Int(36)),
                cond(ColumnName, Matches, text("(?i)(uuid|guid)")),
            ],
            target_type: "UUID".into(),
            priority: 100,
        },
        ContextRule {
            name: "mysql_tinyint1_bool_clickhouse".into(),
            conditions: vec![
                cond(SourceDb, Matches, text("^(mysql|tidb)$")),
                cond(TargetDb, Equals, text("clickhouse")),
                cond(BaseType, Equals, text("TINYINT")),
                cond(Length, Equals, ConditionValue::Int(1)),
            ],
            target_type: "Bool".into(),
            priority: 50,
        },
        ContextRule {
            name: "mysql_tinyint1_bool_starrocks".into(),
            conditions: vec![
                cond(SourceDb, Matches, text("^(mysql|tidb)$")),
                cond(TargetDb, Equals, text("starrocks")),
                cond(BaseType, Equals, text("TINYINT")),
                cond(Length, Equals, ConditionValue::Int(1)),
            ],
            target_type: "BOOLEAN".into(),
            priority: 50,
        },
        ContextRule {
            name: "short_fixed_char".into(),
            conditions: vec![
                cond(TargetDb, Equals, text("clickhouse")),
                cond(BaseType, Equals, text("CHAR")),
                cond(Length, Range, ConditionValue::Range { min: 1, max: 8 }),
            ],
            target_type: "FixedString({length})".into(),
            priority: 20,
        },
    ]
}
