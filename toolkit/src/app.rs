//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::MetricsServer;
use crate::core::cli::{self, BenchmarkCommands, CliConfig, Commands, LogFormat, SchemaCommands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::core::telemetry::Telemetry;
use crate::data::artifacts;
use crate::data::plugins::PluginRegistry;
use crate::data::rules::{RuleStore, spawn_watcher};
use crate::domain::workflow::{Phase, PhaseFailure, Workflow};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub rules: Arc<RuleStore>,
    pub plugins: Arc<PluginRegistry>,
    pub telemetry: Arc<Telemetry>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        let (cli_config, command) = cli::parse();
        Self::init_logging(cli_config.log_format);

        tracing::debug!("Application starting");
        tracing::trace!(command = ?command, "Parsed command");

        let app = Self::init(&cli_config, &command).await?;
        let result = app.dispatch(command).await;
        app.shutdown.shutdown(&app.plugins).await;
        result
    }

    async fn init(cli: &CliConfig, command: &Commands) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let shutdown = ShutdownService::new();
        shutdown.install_signal_handlers();

        let telemetry = Arc::new(
            Telemetry::new().map_err(|e| anyhow::anyhow!("Failed to register metrics: {}", e))?,
        );

        let rules = Arc::new(match &config.schema.rules_path {
            Some(path) => RuleStore::load(path.clone()),
            None => RuleStore::with_defaults(),
        });
        if config.schema.watch_rules
            && let Some(handle) = spawn_watcher(rules.clone(), shutdown.token())
        {
            shutdown.register(handle).await;
        }

        let plugins = if Self::needs_plugins(command) {
            PluginRegistry::launch_all(&config.plugins)
                .await
                .context("Failed to start adapter plugins")?
        } else {
            PluginRegistry::new()
        };

        if config.metrics.enabled {
            let (_, handle) = MetricsServer::new(&config.metrics, telemetry.clone())?
                .start(&shutdown)
                .await?;
            shutdown.register(handle).await;
        }

        Ok(Self {
            shutdown,
            config,
            rules,
            plugins: Arc::new(plugins),
            telemetry,
        })
    }

    fn needs_plugins(command: &Commands) -> bool {
        matches!(
            command,
            Commands::Run(_)
                | Commands::RunPipeline { .. }
                | Commands::Benchmark { .. }
                | Commands::Schema {
                    command: SchemaCommands::Load { .. }
                }
        )
    }

    fn workflow(&self) -> Workflow {
        Workflow::new(
            self.config.clone(),
            self.rules.clone(),
            self.plugins.clone(),
            self.shutdown.token(),
        )
        .with_telemetry(self.telemetry.clone())
    }

    async fn dispatch(&self, command: Commands) -> Result<()> {
        let workflow = self.workflow();
        match command {
            Commands::Convert { traces, schema } => {
                let outcome = workflow
                    .convert(&traces, schema.as_deref())
                    .await
                    .map_err(|e| PhaseFailure::new(Phase::Convert, e))?;
                println!(
                    "Converted {} traces into {} templates ({} lines skipped) -> {}",
                    outcome.stats.parsed,
                    outcome.templates.len(),
                    outcome.stats.skipped(),
                    workflow.layout().traces().display()
                );
                if let Some(schema) = outcome.schema {
                    println!(
                        "Schema: {} tables, {} columns, {} need manual review -> {}",
                        schema.tables.len(),
                        schema.column_count(),
                        schema.requires_manual(),
                        workflow.layout().schema().display()
                    );
                }
            }
            Commands::Generate { traces } => {
                let outcome = workflow
                    .generate_from_disk(traces.as_deref())
                    .await
                    .map_err(|e| PhaseFailure::new(Phase::Generate, e))?;
                println!(
                    "Generated {} queries from {} templates -> {}",
                    outcome.workload.len(),
                    outcome.templates,
                    workflow.layout().workload().display()
                );
            }
            Commands::Run(args)
            | Commands::Benchmark {
                command: BenchmarkCommands::Run(args),
            } => {
                let metrics = workflow
                    .run_file(args.workload.as_deref())
                    .await
                    .map_err(|e| PhaseFailure::new(Phase::Run, e))?;
                println!(
                    "Executed {} queries ({} errors, {} slow) at {:.1} qps; p50 {:.3} ms, p99 {:.3} ms",
                    metrics.queries_executed,
                    metrics.errors,
                    metrics.slow_queries,
                    metrics.throughput(),
                    metrics.p50 as f64 / 1e6,
                    metrics.p99 as f64 / 1e6
                );
            }
            Commands::Validate { candidate } => {
                let report = workflow
                    .validate(candidate.as_deref())
                    .await
                    .map_err(|e| PhaseFailure::new(Phase::Validate, e))?;
                match report {
                    Some(report) => println!("{}", report.summary),
                    None => println!("Validation skipped: no baseline configured"),
                }
            }
            Commands::RunPipeline { traces, schema } => {
                let outcome = workflow.run_pipeline(&traces, schema.as_deref()).await?;
                println!(
                    "Pipeline finished: {} templates, {} queries generated, {} executed",
                    outcome.convert.templates.len(),
                    outcome.generate.workload.len(),
                    outcome.metrics.queries_executed
                );
                if let Some(report) = outcome.report {
                    println!("{}", report.summary);
                }
            }
            Commands::Schema { command } => self.schema_command(&workflow, command).await?,
        }
        Ok(())
    }

    async fn schema_command(&self, workflow: &Workflow, command: SchemaCommands) -> Result<()> {
        match command {
            SchemaCommands::Dump { schema, out } => {
                let result = workflow
                    .schema_dump(&schema)
                    .await
                    .map_err(|e| PhaseFailure::new(Phase::Convert, e))?;
                match out {
                    Some(path) => {
                        artifacts::write_text(&path, &result.ddl).await?;
                        println!("Wrote {}", path.display());
                    }
                    None => println!("{}", result.ddl),
                }
            }
            SchemaCommands::Load { schema } => {
                let converted = workflow
                    .schema_load(&schema)
                    .await
                    .map_err(|e| PhaseFailure::new(Phase::Convert, e))?;
                println!("{}", converted);
            }
        }
        Ok(())
    }

    fn init_logging(format: LogFormat) {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        let builder = tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_writer(std::io::stderr)
            .with_env_filter(filter);

        match format {
            LogFormat::Compact => builder.with_ansi(true).compact().init(),
            LogFormat::Json => builder.json().init(),
        }
    }
}
