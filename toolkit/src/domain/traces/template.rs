//! Template extraction and grouping

use std::collections::HashMap;

use super::redact::{Redacted, redact};
use super::types::{SqlTemplate, SqlTrace};
use crate::domain::schema::SourceDialect;
use crate::domain::schema::converter::list_tables;
use crate::utils::crypto::{sha256_hex, short_hash};

/// Groups traces by redacted text.
///
/// Templates keep first-occurrence order so repeated runs over the same input
/// produce identical output.
#[derive(Debug)]
pub struct TemplateExtractor {
    dialect: SourceDialect,
    templates: Vec<SqlTemplate>,
    index: HashMap<String, usize>,
}

/// Result of observing one trace
#[derive(Debug)]
pub struct Observation {
    pub fingerprint: String,
    pub redacted: Redacted,
}

impl Default for TemplateExtractor {
    fn default() -> Self {
        Self::new(SourceDialect::MySql)
    }
}

impl TemplateExtractor {
    /// `dialect` selects the grammar used for best-effort table listing
    pub fn new(dialect: SourceDialect) -> Self {
        Self {
            dialect,
            templates: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add one trace, creating its template on first occurrence
    pub fn observe(&mut self, trace: &SqlTrace) -> Observation {
        let redacted = redact(&trace.query);
        let fingerprint = sha256_hex(&redacted.text);

        match self.index.get(&fingerprint) {
            Some(&i) => {
                self.templates[i].frequency += 1;
            }
            None => {
                let tables = match list_tables(&trace.query, self.dialect) {
                    Ok(tables) => tables,
                    Err(e) => {
                        tracing::trace!(error = %e, "Table listing failed, leaving empty");
                        Vec::new()
                    }
                };
                tracing::trace!(
                    fingerprint = %short_hash(&redacted.text, 12),
                    placeholders = redacted.placeholders.len(),
                    "New template"
                );
                self.index
                    .insert(fingerprint.clone(), self.templates.len());
                self.templates.push(SqlTemplate {
                    fingerprint: fingerprint.clone(),
                    text: redacted.text.clone(),
                    sql: redacted.sql.clone(),
                    example: trace.query.clone(),
                    placeholders: redacted.placeholders.clone(),
                    frequency: 1,
                    tables,
                    first_seen: trace.timestamp,
                });
            }
        }

        Observation {
            fingerprint,
            redacted,
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<&SqlTemplate> {
        self.index.get(fingerprint).map(|&i| &self.templates[i])
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn templates(&self) -> &[SqlTemplate] {
        &self.templates
    }

    pub fn into_templates(self) -> Vec<SqlTemplate> {
        self.templates
    }
}

/// Extract templates from a complete trace set
pub fn extract_templates(traces: &[SqlTrace], dialect: SourceDialect) -> Vec<SqlTemplate> {
    let mut extractor = TemplateExtractor::new(dialect);
    for trace in traces {
        extractor.observe(trace);
    }
    extractor.into_templates()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trace(q: &str) -> SqlTrace {
        SqlTrace::new(q, Utc::now())
    }

    #[test]
    fn test_grouping_by_redacted_text() {
        let traces = vec![
            trace("select * from users where id = 1"),
            trace("SELECT * FROM users WHERE id = 2 "),
            trace("select * from users where id = 1"),
            trace("select * from orders"),
        ];
        let templates = extract_templates(&traces, SourceDialect::MySql);
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].text, "select * from users where id = ?");
        assert_eq!(templates[0].frequency, 3);
        assert_eq!(templates[0].example, "select * from users where id = 1");
        assert_eq!(templates[1].text, "select * from orders");
        assert_eq!(templates[1].frequency, 1);
    }

    #[test]
    fn test_tables_attached() {
        let templates = extract_templates(
            &[trace("SELECT o.id FROM orders o JOIN users u ON u.id = o.user_id")],
            SourceDialect::MySql,
        );
        assert_eq!(templates[0].tables, vec!["orders", "users"]);
    }

    #[test]
    fn test_unparseable_query_leaves_tables_empty() {
        let templates = extract_templates(&[trace("SELEKT garbage ((")], SourceDialect::MySql);
        assert_eq!(templates.len(), 1);
        assert!(templates[0].tables.is_empty());
    }

    #[test]
    fn test_idempotent_on_deduplicated_set() {
        let traces = vec![
            trace("select * from a where x = 1"),
            trace("select * from b where y = 'k'"),
        ];
        let first = extract_templates(&traces, SourceDialect::MySql);
        let second = extract_templates(&traces, SourceDialect::MySql);
        let fp = |ts: &[SqlTemplate]| ts.iter().map(|t| t.fingerprint.clone()).collect::<Vec<_>>();
        assert_eq!(fp(&first), fp(&second));
    }

    #[test]
    fn test_observe_returns_slots() {
        let mut extractor = TemplateExtractor::default();
        let obs = extractor.observe(&trace("select * from t where a = 5"));
        assert_eq!(obs.redacted.placeholders, vec!["p1"]);
        assert_eq!(extractor.get(&obs.fingerprint).unwrap().frequency, 1);
        assert_eq!(extractor.len(), 1);
        assert!(!extractor.is_empty());
    }
}
