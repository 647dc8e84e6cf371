//! Trace ingestion and template extraction

pub mod parser;
pub mod redact;
pub mod template;
pub mod types;

pub use parser::TraceParser;
pub use redact::{Redacted, Slot, redact};
pub use template::{Observation, TemplateExtractor, extract_templates};
pub use types::{ParseStats, SqlTemplate, SqlTrace};
