//! DDL conversion
//!
//! Statements are split on `;` outside quotes and comments. Each
//! `CREATE TABLE` is parsed with the source grammar, falling back to the
//! balance-aware reader, then every column runs through the [`TypeMapper`]
//! and the target emitter renders the result.

pub mod ast;
pub mod emit;
pub mod fallback;
pub mod tidb;

use std::ops::ControlFlow;

use serde::Serialize;
use sqlparser::ast::visit_relations;
use sqlparser::parser::Parser;

use super::mapper::TypeMapper;
use super::types::{TableSchema, TypeMappingContext, TypeMappingResult};
use super::{SourceDialect, TargetDialect};
use crate::core::error::{BenchError, BenchResult};

pub use emit::{DdlEmitter, emitter};

const COMPONENT: &str = "converter";

/// One mapped column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnConversion {
    pub name: String,
    pub source_type: String,
    pub nullable: bool,
    pub mapping: TypeMappingResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableConversion {
    pub table: TableSchema,
    pub columns: Vec<ColumnConversion>,
    /// Parsed by the balance-aware reader instead of the grammar
    pub fallback_parser: bool,
}

impl TableConversion {
    pub fn requires_manual(&self) -> usize {
        self.columns
            .iter()
            .filter(|c| c.mapping.requires_manual)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult {
    pub target: TargetDialect,
    /// Target DDL, one statement per table
    pub ddl: String,
    pub tables: Vec<TableConversion>,
    /// Statement-level problems (skipped or unparseable statements)
    pub warnings: Vec<String>,
}

impl ConversionResult {
    /// Columns that need a human decision
    pub fn requires_manual(&self) -> usize {
        self.tables.iter().map(|t| t.requires_manual()).sum()
    }

    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }
}

struct Parsed {
    tables: Vec<(TableSchema, bool)>,
    warnings: Vec<String>,
}

/// Source-dialect DDL converter
#[derive(Debug, Clone)]
pub struct SchemaConverter {
    source: SourceDialect,
    mapper: TypeMapper,
}

impl SchemaConverter {
    pub fn new(source: SourceDialect, mapper: TypeMapper) -> Self {
        Self { source, mapper }
    }

    pub fn source(&self) -> SourceDialect {
        self.source
    }

    /// Parse every `CREATE TABLE` in `ddl`
    pub fn parse(&self, ddl: &str) -> BenchResult<Vec<TableSchema>> {
        let parsed = self.parse_statements(ddl)?;
        Ok(parsed.tables.into_iter().map(|(t, _)| t).collect())
    }

    /// Convert source DDL text into target DDL
    pub fn convert(&self, ddl: &str, target: TargetDialect) -> BenchResult<ConversionResult> {
        let parsed = self.parse_statements(ddl)?;
        let mut result = self.convert_parsed(parsed.tables, target);
        result.warnings = parsed.warnings;
        Ok(result)
    }

    /// Convert already parsed tables (for example a schema dump)
    pub fn convert_tables(&self, tables: &[TableSchema], target: TargetDialect) -> ConversionResult {
        self.convert_parsed(tables.iter().map(|t| (t.clone(), false)).collect(), target)
    }

    /// Text-in, text-out conversion with the target named by string
    pub fn convert_ddl(&self, ddl: &str, target: &str) -> BenchResult<String> {
        let target: TargetDialect = target.parse()?;
        Ok(self.convert(ddl, target)?.ddl)
    }

    fn parse_statements(&self, ddl: &str) -> BenchResult<Parsed> {
        let mut parsed = Parsed {
            tables: Vec::new(),
            warnings: Vec::new(),
        };
        let mut create_statements = 0usize;

        for statement in split_statements(ddl) {
            let statement = match self.source {
                SourceDialect::TiDb => tidb::strip_tidb_extensions(statement),
                _ => statement.to_string(),
            };
            let body = strip_leading_comments(&statement);
            if !fallback::is_create_table(body) {
                tracing::debug!(statement = %first_line(body), "Skipping non-table statement");
                continue;
            }
            create_statements += 1;

            match ast::parse_create_table(body, self.source) {
                Ok(Some(table)) => parsed.tables.push((table, false)),
                Ok(None) => {
                    let message = format!("no column list in: {}", first_line(body));
                    tracing::warn!(statement = %first_line(body), "CREATE TABLE without columns skipped");
                    parsed.warnings.push(message);
                }
                Err(e) => match fallback::parse_create_table(body) {
                    Some(table) => {
                        tracing::debug!(
                            table = %table.name,
                            error = %e,
                            "Grammar rejected table, used fallback reader"
                        );
                        parsed.tables.push((table, true));
                    }
                    None => {
                        tracing::warn!(
                            statement = %first_line(body),
                            error = %e,
                            "Unparseable CREATE TABLE skipped"
                        );
                        parsed
                            .warnings
                            .push(format!("unparseable statement: {} ({})", first_line(body), e));
                    }
                },
            }
        }

        if parsed.tables.is_empty() {
            let message = if create_statements == 0 {
                "no CREATE TABLE statement found".to_string()
            } else {
                format!("none of {} CREATE TABLE statements could be parsed", create_statements)
            };
            return Err(BenchError::parse_failed(COMPONENT, message));
        }
        Ok(parsed)
    }

    fn convert_parsed(&self, tables: Vec<(TableSchema, bool)>, target: TargetDialect) -> ConversionResult {
        let emitter = emitter(target);
        let mut conversions = Vec::with_capacity(tables.len());
        let mut statements = Vec::with_capacity(tables.len());

        for (mut table, fallback_parser) in tables {
            table.normalize_primary_key();
            let columns: Vec<ColumnConversion> = table
                .columns
                .iter()
                .map(|column| {
                    let ctx = TypeMappingContext::for_column(&table, column, self.source, target);
                    let mapping = self.mapper.map(&ctx);
                    if mapping.requires_manual {
                        tracing::warn!(
                            table = %table.name,
                            column = %column.name,
                            source = %column.data_type,
                            target = %mapping.target_type,
                            "Column needs manual review"
                        );
                    }
                    ColumnConversion {
                        name: column.name.clone(),
                        source_type: column.data_type.clone(),
                        nullable: column.nullable,
                        mapping,
                    }
                })
                .collect();

            statements.push(emitter.create_table(&table, &columns));
            conversions.push(TableConversion {
                table,
                columns,
                fallback_parser,
            });
        }

        let result = ConversionResult {
            target,
            ddl: statements.join("\n\n") + "\n",
            tables: conversions,
            warnings: Vec::new(),
        };
        tracing::info!(
            source = %self.source,
            target = %target,
            tables = result.tables.len(),
            columns = result.column_count(),
            manual = result.requires_manual(),
            "Schema converted"
        );
        result
    }
}

/// Tables referenced by a query, in first-appearance order
pub fn list_tables(sql: &str, source: SourceDialect) -> BenchResult<Vec<String>> {
    let dialect = ast::grammar(source);
    let statements = Parser::parse_sql(dialect.as_ref(), sql)
        .map_err(|e| BenchError::parse_failed(COMPONENT, e.to_string()).with_source(e))?;

    let mut tables: Vec<String> = Vec::new();
    let _ = visit_relations(&statements, |relation| {
        let name = relation
            .0
            .iter()
            .map(|ident| ident.value.as_str())
            .collect::<Vec<_>>()
            .join(".");
        if !tables.contains(&name) {
            tables.push(name);
        }
        ControlFlow::<()>::Continue(())
    });
    Ok(tables)
}

/// Split on `;` outside quoted spans and comments. Empty pieces are dropped.
pub fn split_statements(sql: &str) -> Vec<&str> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        Quote(char),
        LineComment,
        BlockComment,
    }

    let bytes = sql.as_bytes();
    let mut statements = Vec::new();
    let mut state = State::Code;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let next = bytes.get(i + 1).map(|b| *b as char);
        match state {
            State::Code => match c {
                '\'' | '"' | '`' => state = State::Quote(c),
                '-' if next == Some('-') => state = State::LineComment,
                '#' => state = State::LineComment,
                '/' if next == Some('*') => {
                    state = State::BlockComment;
                    i += 1;
                }
                ';' => {
                    statements.push(&sql[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
            State::Quote(q) => {
                if c == '\\' && q != '`' {
                    i += 1;
                } else if c == q {
                    if next == Some(q) {
                        i += 1;
                    } else {
                        state = State::Code;
                    }
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && next == Some('/') {
                    state = State::Code;
                    i += 1;
                }
            }
        }
        i += 1;
    }
    statements.push(&sql[start.min(sql.len())..]);

    statements
        .into_iter()
        .filter(|s| !strip_leading_comments(s).is_empty())
        .collect()
}

/// Drop leading whitespace, `--`/`#` line comments and plain block comments.
/// TiDB `/*T![...]` comments are stripped earlier by the TiDB pass.
fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if rest.starts_with("--") || rest.starts_with('#') {
            rest = rest.split_once('\n').map(|(_, r)| r).unwrap_or("").trim_start();
        } else if rest.starts_with("/*") && !rest.starts_with("/*!") {
            rest = rest.split_once("*/").map(|(_, r)| r).unwrap_or("").trim_start();
        } else {
            return rest;
        }
    }
}

fn first_line(sql: &str) -> &str {
    let line = sql.lines().next().unwrap_or_default().trim();
    match line.char_indices().nth(80) {
        Some((i, _)) => &line[..i],
        None => line,
    }
}
