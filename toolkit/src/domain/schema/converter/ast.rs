//! `CREATE TABLE` parsing through sqlparser

use sqlparser::ast::{ColumnOption, CreateTable, Statement, TableConstraint};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::{Parser, ParserError};

use super::fallback::split_definition;
use crate::domain::schema::SourceDialect;
use crate::domain::schema::types::{ColumnSchema, IndexSchema, TableSchema};

/// Grammar used for a source dialect
pub fn grammar(source: SourceDialect) -> Box<dyn Dialect> {
    match source {
        SourceDialect::MySql | SourceDialect::TiDb => Box::new(MySqlDialect {}),
        SourceDialect::Postgres => Box::new(PostgreSqlDialect {}),
    }
}

/// Parse one statement. `Ok(None)` when it is valid SQL but not a table.
pub fn parse_create_table(
    statement: &str,
    source: SourceDialect,
) -> Result<Option<TableSchema>, ParserError> {
    let dialect = grammar(source);
    let statements = Parser::parse_sql(dialect.as_ref(), statement)?;

    let Some(create) = statements.into_iter().find_map(|s| match s {
        Statement::CreateTable(create) => Some(create),
        _ => None,
    }) else {
        return Ok(None);
    };
    if create.columns.is_empty() {
        // CREATE TABLE ... AS SELECT / LIKE
        return Ok(None);
    }

    let mut table = table_from_ast(&create);
    table.options = split_definition(statement).and_then(|d| d.options);
    table.normalize_primary_key();
    Ok(Some(table))
}

fn table_from_ast(create: &CreateTable) -> TableSchema {
    let name = create
        .name
        .0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_else(|| create.name.to_string());

    let mut columns = Vec::with_capacity(create.columns.len());
    let mut indexes = Vec::new();
    for def in &create.columns {
        let mut column = ColumnSchema {
            name: def.name.value.clone(),
            data_type: def.data_type.to_string(),
            nullable: true,
            default: None,
            is_primary_key: false,
        };
        for option in &def.options {
            match &option.option {
                ColumnOption::Null => column.nullable = true,
                ColumnOption::NotNull => column.nullable = false,
                ColumnOption::Default(expr) => column.default = Some(expr.to_string()),
                ColumnOption::Unique {
                    is_primary: true, ..
                } => column.is_primary_key = true,
                ColumnOption::Unique {
                    is_primary: false, ..
                } => indexes.push(IndexSchema {
                    name: None,
                    columns: vec![column.name.clone()],
                    unique: true,
                }),
                _ => {}
            }
        }
        columns.push(column);
    }

    let mut primary_key = Vec::new();
    for constraint in &create.constraints {
        match constraint {
            TableConstraint::PrimaryKey { columns, .. } => {
                primary_key = columns.iter().map(|c| c.value.clone()).collect();
            }
            TableConstraint::Unique { name, columns, .. } => indexes.push(IndexSchema {
                name: name.as_ref().map(|n| n.value.clone()),
                columns: columns.iter().map(|c| c.value.clone()).collect(),
                unique: true,
            }),
            TableConstraint::Index { name, columns, .. } => indexes.push(IndexSchema {
                name: name.as_ref().map(|n| n.value.clone()),
                columns: columns.iter().map(|c| c.value.clone()).collect(),
                unique: false,
            }),
            _ => {}
        }
    }

    TableSchema {
        name,
        columns,
        primary_key,
        indexes,
        options: None,
    }
}
