//! Presenter CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load `presenter.toml` (or `--config`) and read
//!    secrets from the environment variables it names.
//! 2. **Wire observability**: install a `tracing-subscriber` pretty or JSON
//!    layer, plus an OpenTelemetry OTLP exporter when
//!    `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//! 3. **Construct infrastructure**: build the Miro client factory, content
//!    generator, import broker and result sink, and inject them into
//!    [`orchestrator::DeliveryOrchestrator`].
//! 4. **Run**: execute one delivery, streaming progress to the log and
//!    printing the final result as JSON on stdout. Ctrl-C cancels every
//!    in-flight delivery.

mod config;
mod local;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use import_broker::HttpImportBroker;
use llm::HttpContentGenerator;
use miro::{MiroClientFactory, ReqwestTransport};
use orchestrator::{
    Collaborators, DefaultPayloadNormalizer, DeliveryOptions, DeliveryOrchestrator,
    DeliveryRegistry,
};
use pipeline::{DeliveryProgress, DeliveryTarget, PromptId};
use results::HttpResultSink;
use tracing::{info, warn};

use crate::config::{read_secret, PresenterConfig, DEFAULT_CONFIG_PATH};
use crate::local::{EnvCredentialProvider, FilePromptStore};
use crate::telemetry::LogFormat;

/// Deliver AI-generated prompt output to collaboration boards and design tools.
#[derive(Debug, Parser)]
#[command(name = "presenter", version)]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, env = "PRESENTER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Deliver one prompt's output to a destination.
    Deliver(DeliverArgs),
}

#[derive(Debug, clap::Args)]
struct DeliverArgs {
    /// Prompt id (file name without `.json` in the prompts directory).
    #[arg(long)]
    prompt: String,

    /// Destination: `miro` or `figma`.
    #[arg(long)]
    destination: String,

    /// Board id or design file key.
    #[arg(long)]
    target: String,

    #[arg(long)]
    max_retries: Option<u32>,

    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Skip the destination-specific optimizer.
    #[arg(long)]
    no_optimize: bool,

    /// Skip payload validation.
    #[arg(long)]
    no_validate: bool,
}

impl DeliverArgs {
    /// CLI flags layered over the `[delivery]` table.
    fn options(&self, base: &DeliveryOptions) -> DeliveryOptions {
        DeliveryOptions {
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            retry_delay_ms: self.retry_delay_ms.unwrap_or(base.retry_delay_ms),
            optimize_payload: base.optimize_payload && !self.no_optimize,
            validate_before_delivery: base.validate_before_delivery && !self.no_validate,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = PresenterConfig::load(&cli.config)?;
    let telemetry = telemetry::init(cli.log_format)?;

    let outcome = match cli.command {
        Command::Deliver(args) => deliver(&config, args).await,
    };

    telemetry.shutdown();
    outcome
}

async fn deliver(config: &PresenterConfig, args: DeliverArgs) -> anyhow::Result<()> {
    let prompt_id = PromptId::new(args.prompt.trim()).context("--prompt must not be empty")?;
    let target = DeliveryTarget::from_parts(&args.destination, &args.target)?;
    let options = args.options(&config.delivery);

    let orchestrator = Arc::new(build_orchestrator(config)?);

    let on_signal = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(active = on_signal.active_deliveries().len(), "Interrupted, cancelling deliveries");
            on_signal.shutdown();
        }
    });

    let result = orchestrator
        .execute_delivery(&prompt_id, target, &options, log_progress)
        .await?;

    info!(delivery_id = %result.id, status = result.status.as_str(), "Done");
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn build_orchestrator(config: &PresenterConfig) -> anyhow::Result<DeliveryOrchestrator> {
    let secret = |name: &Option<String>| name.as_deref().and_then(read_secret);

    let transport = Arc::new(ReqwestTransport::new(config.miro.client.timeout()));
    let generator = HttpContentGenerator::new(&config.generator, secret(&config.generator.api_key_env))?;
    let actor = std::env::var(&config.results.actor_env).ok();

    let collaborators = Collaborators {
        prompts: Arc::new(FilePromptStore::new(&config.prompts.dir)),
        credentials: Arc::new(EnvCredentialProvider::new(
            read_secret(&config.miro.token_env),
            config.miro.token_env.clone(),
        )),
        generator: Arc::new(generator),
        normalizer: Arc::new(DefaultPayloadNormalizer),
        boards: Arc::new(MiroClientFactory::new(transport, config.miro.client.clone())),
        broker: Arc::new(HttpImportBroker::new(
            &config.broker,
            secret(&config.broker.api_key_env),
        )),
        sink: Arc::new(HttpResultSink::new(
            &config.results,
            secret(&config.results.api_key_env),
            actor,
        )),
    };

    Ok(DeliveryOrchestrator::with_registry(
        collaborators,
        config.miro.embed.clone(),
        DeliveryRegistry::new(),
    ))
}

fn log_progress(progress: DeliveryProgress) {
    info!(
        stage = progress.stage.as_str(),
        progress = progress.progress,
        details = ?progress.details,
        "{}",
        progress.message
    );
}
