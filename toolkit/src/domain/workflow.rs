//! Phase sequencing
//!
//! convert → generate → run → validate. Every phase writes its artifact
//! under the output directory before the next one starts, so a failed run
//! leaves the earlier outputs on disk for inspection.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::config::AppConfig;
use crate::core::error::{BenchError, BenchResult};
use crate::core::telemetry::Telemetry;
use crate::data::artifacts::{self, ArtifactLayout};
use crate::data::plugins::{PluginClient, PluginRegistry};
use crate::data::rules::RuleStore;
use crate::domain::execution::{ExecutionEngine, PerformanceMetrics};
use crate::domain::params::analyze;
use crate::domain::schema::{ConversionResult, SchemaConverter, TypeMapper};
use crate::domain::traces::{ParseStats, SqlTemplate, SqlTrace, TraceParser, extract_templates};
use crate::domain::validation::{
    ParameterFidelity, ValidationReport, compare_parameters, compare_runs, fidelity_tests,
};
use crate::domain::workload::{BenchmarkWorkload, generate_workload};

const COMPONENT: &str = "workflow";

/// Label for the validation score gauge
const VALIDATION_MODEL: &str = "workload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Convert,
    Generate,
    Run,
    Validate,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Convert => "convert",
            Phase::Generate => "generate",
            Phase::Run => "run",
            Phase::Validate => "validate",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline error tagged with the phase that raised it
#[derive(Error, Debug)]
#[error("{phase} phase failed: {source}")]
pub struct PhaseFailure {
    pub phase: Phase,
    #[source]
    pub source: BenchError,
}

impl PhaseFailure {
    /// Logs the full error chain at error level
    pub fn new(phase: Phase, source: BenchError) -> Self {
        tracing::error!(phase = %phase, error = ?source, "Phase failed");
        Self { phase, source }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

#[derive(Debug)]
pub struct ConvertOutcome {
    pub stats: ParseStats,
    pub traces: Vec<SqlTrace>,
    pub templates: Vec<SqlTemplate>,
    pub schema: Option<ConversionResult>,
}

#[derive(Debug)]
pub struct GenerateOutcome {
    pub workload: BenchmarkWorkload,
    pub templates: usize,
    pub parameters: usize,
    pub fidelity: Vec<ParameterFidelity>,
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub convert: ConvertOutcome,
    pub generate: GenerateOutcome,
    pub metrics: PerformanceMetrics,
    /// `None` when no baseline is configured
    pub report: Option<ValidationReport>,
}

// =============================================================================
// Workflow
// =============================================================================

/// Owns the long-lived subsystems for one invocation
pub struct Workflow {
    config: AppConfig,
    layout: ArtifactLayout,
    converter: SchemaConverter,
    plugins: Arc<PluginRegistry>,
    telemetry: Option<Arc<Telemetry>>,
    cancel: CancellationToken,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("output", &self.layout.root())
            .field("plugins", &self.plugins.names())
            .finish_non_exhaustive()
    }
}

impl Workflow {
    pub fn new(
        config: AppConfig,
        rules: Arc<RuleStore>,
        plugins: Arc<PluginRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        let mapper = TypeMapper::new(rules, config.schema.precision);
        let converter = SchemaConverter::new(config.schema.source, mapper);
        Self {
            layout: ArtifactLayout::new(config.output_dir.clone()),
            config,
            converter,
            plugins,
            telemetry: None,
            cancel,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    // -------------------------------------------------------------------------
    // Phase 1: convert
    // -------------------------------------------------------------------------

    /// Ingest a trace file, extract templates and optionally convert a schema
    pub async fn convert(&self, traces: &Path, schema: Option<&Path>) -> BenchResult<ConvertOutcome> {
        let parser = TraceParser::new(self.config.trace.buffer_size);
        let mut parsed = Vec::new();
        let stats = parser.parse_file(traces, |t| parsed.push(t)).await?;
        let templates = extract_templates(&parsed, self.config.schema.source);

        tracing::info!(
            lines = stats.lines,
            traces = stats.parsed,
            skipped = stats.skipped(),
            templates = templates.len(),
            "Traces ingested"
        );

        artifacts::write_traces(&self.layout.traces(), &parsed).await?;
        artifacts::write_json(&self.layout.templates(), &templates).await?;

        let schema = match schema {
            Some(path) => Some(self.convert_schema(path).await?),
            None => None,
        };

        Ok(ConvertOutcome {
            stats,
            traces: parsed,
            templates,
            schema,
        })
    }

    async fn convert_schema(&self, path: &Path) -> BenchResult<ConversionResult> {
        let result = self.schema_dump(path).await?;
        artifacts::write_text(&self.layout.schema(), &result.ddl).await?;
        Ok(result)
    }

    // -------------------------------------------------------------------------
    // Phase 2: generate
    // -------------------------------------------------------------------------

    /// Generate a workload from the converted traces on disk
    pub async fn generate_from_disk(&self, traces: Option<&Path>) -> BenchResult<GenerateOutcome> {
        let path = traces.map(Path::to_path_buf).unwrap_or_else(|| self.layout.traces());
        let parser = TraceParser::new(self.config.trace.buffer_size);
        let traces = artifacts::read_traces(&path, &parser).await?;
        let templates = extract_templates(&traces, self.config.schema.source);
        self.generate(&traces, &templates).await
    }

    /// Model parameters, synthesize the workload and score its fidelity
    pub async fn generate(
        &self,
        traces: &[SqlTrace],
        templates: &[SqlTemplate],
    ) -> BenchResult<GenerateOutcome> {
        let started = Instant::now();
        let models = analyze(traces, templates, self.config.analysis);
        let generated = generate_workload(
            templates,
            &models,
            &self.config.generation,
            self.config.benchmark.execution(),
        )?;
        let elapsed = started.elapsed();

        artifacts::write_workload(&self.layout.workload(), &generated.workload.queries).await?;

        let fidelity = compare_parameters(&models, &generated.samples);
        artifacts::write_json(&self.layout.fidelity(), &fidelity).await?;

        if let Some(telemetry) = &self.telemetry {
            telemetry.observe_generation(
                &self.generation_model(),
                generated.workload.len(),
                elapsed,
            );
            for result in &fidelity {
                if let Some(ks) = &result.ks {
                    telemetry.set_ks_pvalue(&result.label, ks.p_value);
                }
            }
        }

        tracing::info!(
            queries = generated.workload.len(),
            parameters = models.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            path = %self.layout.workload().display(),
            "Workload written"
        );

        Ok(GenerateOutcome {
            workload: generated.workload,
            templates: templates.len(),
            parameters: models.len(),
            fidelity,
        })
    }

    fn generation_model(&self) -> String {
        if self.config.generation.inject_hotspots {
            "hotspot".to_string()
        } else {
            "fitted".to_string()
        }
    }

    // -------------------------------------------------------------------------
    // Phase 3: run
    // -------------------------------------------------------------------------

    /// Replay a workload file against the configured adapter
    pub async fn run_file(&self, workload: Option<&Path>) -> BenchResult<PerformanceMetrics> {
        let path = workload.map(Path::to_path_buf).unwrap_or_else(|| self.layout.workload());
        let queries = artifacts::read_workload(&path).await?;
        tracing::info!(path = %path.display(), queries = queries.len(), "Workload loaded");
        let workload = BenchmarkWorkload::new(queries, self.config.benchmark.execution());
        self.run(&workload).await
    }

    pub async fn run(&self, workload: &BenchmarkWorkload) -> BenchResult<PerformanceMetrics> {
        let client = self.executor()?;
        let mut engine = ExecutionEngine::new(client, self.config.schema.target.to_string())
            .with_slow_threshold(self.config.benchmark.slow_query_threshold);
        if let Some(telemetry) = &self.telemetry {
            engine = engine.with_telemetry(telemetry.clone());
        }

        let metrics = engine.run(workload, &self.cancel).await?;
        artifacts::write_json(&self.layout.metrics(), &metrics).await?;
        tracing::info!(
            queries = metrics.queries_executed,
            errors = metrics.errors,
            slow = metrics.slow_queries,
            path = %self.layout.metrics().display(),
            "Metrics written"
        );
        Ok(metrics)
    }

    /// Adapter named by `benchmark.plugin`, else the one named after the
    /// target dialect, else the only one registered
    fn executor(&self) -> BenchResult<Arc<PluginClient>> {
        if let Some(name) = &self.config.benchmark.plugin {
            return self.plugins.get(name);
        }
        let target = self.config.schema.target.to_string();
        if self.plugins.get(&target).is_ok() {
            return self.plugins.get(&target);
        }
        match self.plugins.names().as_slice() {
            [only] => self.plugins.get(only),
            [] => Err(BenchError::plugin_not_found(COMPONENT, target)),
            names => Err(BenchError::invalid_input(
                COMPONENT,
                format!(
                    "several plugins registered ({}), set benchmark.plugin",
                    names.join(", ")
                ),
            )),
        }
    }

    // -------------------------------------------------------------------------
    // Phase 4: validate
    // -------------------------------------------------------------------------

    /// Compare candidate metrics against the configured baseline.
    ///
    /// Returns `None` without touching disk when no baseline is configured.
    pub async fn validate(&self, candidate: Option<&Path>) -> BenchResult<Option<ValidationReport>> {
        let Some(baseline_path) = &self.config.validation.baseline else {
            tracing::info!("No baseline configured, skipping validation");
            return Ok(None);
        };
        let candidate_path = candidate
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.layout.metrics());

        let baseline: PerformanceMetrics = artifacts::read_json(baseline_path).await?;
        let candidate: PerformanceMetrics = artifacts::read_json(&candidate_path).await?;
        let fidelity = self.saved_fidelity().await?;
        Ok(Some(self.report(&baseline, &candidate, &fidelity).await?))
    }

    async fn saved_fidelity(&self) -> BenchResult<Vec<ParameterFidelity>> {
        let path = self.layout.fidelity();
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        artifacts::read_json(&path).await
    }

    async fn report(
        &self,
        baseline: &PerformanceMetrics,
        candidate: &PerformanceMetrics,
        fidelity: &[ParameterFidelity],
    ) -> BenchResult<ValidationReport> {
        let options = &self.config.validation.options;
        let mut tests = fidelity_tests(fidelity, options);
        tests.extend(compare_runs(baseline, candidate, options));
        let report = ValidationReport::from_tests(tests, options);

        artifacts::write_json(&self.layout.report(), &report).await?;
        if let Some(telemetry) = &self.telemetry {
            telemetry.set_pass_rate(report.pass_rate);
            telemetry.set_validation_score(VALIDATION_MODEL, report.score);
        }

        if report.passed {
            tracing::info!(score = report.score, summary = %report.summary, "Validation passed");
        } else {
            tracing::warn!(score = report.score, summary = %report.summary, "Validation failed");
        }
        Ok(report)
    }

    // -------------------------------------------------------------------------
    // Full pipeline
    // -------------------------------------------------------------------------

    pub async fn run_pipeline(
        &self,
        traces: &Path,
        schema: Option<&Path>,
    ) -> Result<PipelineOutcome, PhaseFailure> {
        let convert = self
            .convert(traces, schema)
            .await
            .map_err(|e| PhaseFailure::new(Phase::Convert, e))?;
        let generate = self
            .generate(&convert.traces, &convert.templates)
            .await
            .map_err(|e| PhaseFailure::new(Phase::Generate, e))?;
        let metrics = self
            .run(&generate.workload)
            .await
            .map_err(|e| PhaseFailure::new(Phase::Run, e))?;

        let report = match &self.config.validation.baseline {
            Some(path) => {
                let report = async {
                    let baseline: PerformanceMetrics = artifacts::read_json(path).await?;
                    self.report(&baseline, &metrics, &generate.fidelity).await
                }
                .await
                .map_err(|e| PhaseFailure::new(Phase::Validate, e))?;
                Some(report)
            }
            None => {
                tracing::info!("No baseline configured, skipping validation");
                None
            }
        };

        Ok(PipelineOutcome {
            convert,
            generate,
            metrics,
            report,
        })
    }

    // -------------------------------------------------------------------------
    // Schema commands
    // -------------------------------------------------------------------------

    /// Convert a source DDL file into the configured target dialect
    pub async fn schema_dump(&self, path: &Path) -> BenchResult<ConversionResult> {
        let ddl = read_ddl(path).await?;
        let result = self.converter.convert(&ddl, self.config.schema.target)?;
        for warning in &result.warnings {
            tracing::warn!(path = %path.display(), warning = %warning, "Schema conversion warning");
        }
        tracing::info!(
            tables = result.tables.len(),
            columns = result.column_count(),
            requires_manual = result.requires_manual(),
            target = %result.target,
            "Schema converted"
        );
        Ok(result)
    }

    /// Hand the parsed source schema to the adapter's own converter
    pub async fn schema_load(&self, path: &Path) -> BenchResult<String> {
        let ddl = read_ddl(path).await?;
        let tables = self.converter.parse(&ddl)?;
        let json = serde_json::to_string(&tables).map_err(|e| {
            BenchError::conversion_failed(COMPONENT, "failed to encode parsed schema").with_source(e)
        })?;
        let client = self.executor()?;
        let converted = client.convert_schema(&json).await?;
        tracing::info!(tables = tables.len(), plugin = %client.name(), "Schema converted by adapter");
        Ok(converted)
    }
}

async fn read_ddl(path: &Path) -> BenchResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BenchError::io(COMPONENT, format!("failed to read schema {}", path.display()), e))
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
