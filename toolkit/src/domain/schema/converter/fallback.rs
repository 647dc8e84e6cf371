//! Balance-aware `CREATE TABLE` reader
//!
//! Used when the AST parser rejects a statement. Tracks paren depth and
//! quote state so commas inside `DECIMAL(10,2)`, `ENUM('a,b')` or quoted
//! identifiers never split a column.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::schema::types::{ColumnSchema, IndexSchema, TableSchema};

static CREATE_TABLE_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*CREATE\s+(?:OR\s+REPLACE\s+)?(?:(?:GLOBAL|LOCAL)\s+)?(?:TEMPORARY\s+|TEMP\s+|UNLOGGED\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?",
    )
    .expect("Invalid regex")
});

static NAMED_CONSTRAINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^CONSTRAINT\s+\S+\s+").expect("Invalid regex"));

/// Words that end the type part of a column definition
const TYPE_STOP_WORDS: &[&str] = &[
    "NOT",
    "NULL",
    "DEFAULT",
    "PRIMARY",
    "KEY",
    "UNIQUE",
    "AUTO_INCREMENT",
    "AUTOINCREMENT",
    "COMMENT",
    "REFERENCES",
    "CHECK",
    "COLLATE",
    "CHARSET",
    "CONSTRAINT",
    "GENERATED",
    "AS",
    "ON",
    "STORED",
    "VIRTUAL",
    "INVISIBLE",
    "VISIBLE",
];

/// Whether `statement` is a `CREATE TABLE`
pub fn is_create_table(statement: &str) -> bool {
    CREATE_TABLE_HEAD.is_match(statement)
}

/// Pieces of a `CREATE TABLE` statement around its definition list
#[derive(Debug, PartialEq, Eq)]
pub struct Definition<'a> {
    pub name: String,
    pub body: &'a str,
    /// Table options after the closing paren, without the terminator
    pub options: Option<String>,
}

/// Locate the table name, the parenthesized body and trailing options
pub fn split_definition(statement: &str) -> Option<Definition<'_>> {
    let head = CREATE_TABLE_HEAD.find(statement)?;
    let rest = &statement[head.end()..];
    let open = rest.find('(')?;
    let name = unquote_path(rest[..open].trim());
    if name.is_empty() {
        return None;
    }

    let body_start = head.end() + open + 1;
    let close = matching_paren(&statement[body_start..])? + body_start;
    let options = statement[close + 1..]
        .trim()
        .trim_end_matches(';')
        .trim()
        .to_string();

    Some(Definition {
        name,
        body: &statement[body_start..close],
        options: (!options.is_empty()).then_some(options),
    })
}

/// Parse a `CREATE TABLE` statement without a grammar
pub fn parse_create_table(statement: &str) -> Option<TableSchema> {
    let definition = split_definition(statement)?;

    let mut table = TableSchema {
        name: definition.name,
        columns: Vec::new(),
        primary_key: Vec::new(),
        indexes: Vec::new(),
        options: definition.options,
    };

    for item in split_top_level(definition.body, ',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        // CONSTRAINT name PRIMARY KEY (...)
        let constraint = match NAMED_CONSTRAINT.find(item) {
            Some(m) => &item[m.end()..],
            None => item,
        };
        let upper = constraint.to_ascii_uppercase();
        let keyword = first_word(&upper);

        if keyword == "PRIMARY" {
            table.primary_key = paren_list(constraint);
        } else if keyword == "UNIQUE" {
            table.indexes.push(index(constraint, true));
        } else if matches!(keyword, "KEY" | "INDEX" | "FULLTEXT" | "SPATIAL") {
            table.indexes.push(index(constraint, false));
        } else if matches!(keyword, "FOREIGN" | "CHECK" | "EXCLUDE")
            || constraint.len() != item.len()
        {
            tracing::trace!(item = %item, "Skipping table constraint");
        } else if let Some(column) = parse_column(item) {
            table.columns.push(column);
        }
    }

    if table.columns.is_empty() {
        return None;
    }
    table.normalize_primary_key();
    Some(table)
}

fn parse_column(item: &str) -> Option<ColumnSchema> {
    let tokens = tokenize(item);
    let mut iter = tokens.iter().map(|t| t.as_str()).peekable();
    let name = unquote(iter.next()?);

    let mut type_parts: Vec<String> = Vec::new();
    while let Some(&token) = iter.peek() {
        let upper = token.to_ascii_uppercase();
        if let Some(last) = type_parts.last_mut()
            && token.starts_with('(')
        {
            last.push_str(token);
            iter.next();
            continue;
        }
        let stop = !type_parts.is_empty()
            && (TYPE_STOP_WORDS.contains(&upper.as_str())
                || (upper == "CHARACTER"
                    && tokens
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case("SET"))));
        if stop {
            break;
        }
        type_parts.push(token.to_string());
        iter.next();
    }
    if type_parts.is_empty() {
        return None;
    }

    let mut column = ColumnSchema {
        name,
        data_type: type_parts.join(" "),
        nullable: true,
        default: None,
        is_primary_key: false,
    };

    let rest: Vec<&str> = iter.collect();
    let mut i = 0;
    while i < rest.len() {
        let upper = rest[i].to_ascii_uppercase();
        let next = rest.get(i + 1).map(|t| t.to_ascii_uppercase());
        match (upper.as_str(), next.as_deref()) {
            ("NOT", Some("NULL")) => {
                column.nullable = false;
                i += 1;
            }
            ("NULL", _) => column.nullable = true,
            ("PRIMARY", Some("KEY")) => {
                column.is_primary_key = true;
                i += 1;
            }
            ("DEFAULT", Some(_)) => {
                column.default = Some(rest[i + 1].to_string());
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    Some(column)
}

fn index(constraint: &str, unique: bool) -> IndexSchema {
    // Everything before the column list, minus the keywords, is the name
    let before = constraint.split('(').next().unwrap_or_default();
    let name = before
        .split_whitespace()
        .filter(|w| {
            !matches!(
                w.to_ascii_uppercase().as_str(),
                "UNIQUE" | "KEY" | "INDEX" | "FULLTEXT" | "SPATIAL" | "USING" | "BTREE" | "HASH"
            )
        })
        .map(unquote)
        .next();
    IndexSchema {
        name,
        columns: paren_list(constraint),
        unique,
    }
}

/// Column names of the first parenthesized list, prefix lengths removed
fn paren_list(text: &str) -> Vec<String> {
    let Some(open) = text.find('(') else {
        return Vec::new();
    };
    let Some(close) = matching_paren(&text[open + 1..]) else {
        return Vec::new();
    };
    split_top_level(&text[open + 1..open + 1 + close], ',')
        .into_iter()
        .filter_map(|part| {
            let word = part.split_whitespace().next()?;
            let word = word.split('(').next().unwrap_or(word);
            Some(unquote(word))
        })
        .filter(|name| !name.is_empty())
        .collect()
}

fn first_word(upper: &str) -> &str {
    upper
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
}

/// Offset of the paren closing an already-opened group, quote aware
pub fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Split on `sep` outside parens and quoted spans
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                c if c == sep && depth == 0 => {
                    parts.push(&text[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Whitespace tokens; quoted spans and paren groups stay whole
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                c if c.is_whitespace() && depth == 0 => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            },
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unquote(ident: &str) -> String {
    let ident = ident.trim();
    let stripped = ident
        .strip_prefix('`')
        .and_then(|s| s.strip_suffix('`'))
        .or_else(|| ident.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .or_else(|| ident.strip_prefix('[').and_then(|s| s.strip_suffix(']')))
        .unwrap_or(ident);
    stripped.to_string()
}

/// Last segment of a possibly qualified name
fn unquote_path(name: &str) -> String {
    split_top_level(name, '.')
        .last()
        .map(|s| unquote(s))
        .unwrap_or_default()
}
