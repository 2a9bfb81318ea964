//! One-shot CLI: classify and dispatch a single task against the
//! configured backends, printing the result and routing metadata.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use modelmux::backend::{HttpGenerationBackend, HttpTextBackend, HttpVisionBackend};
use modelmux::{
    Attachment, BackendSet, ModelProfile, ModelRegistry, Orchestrator, OrchestratorConfig,
    TaskKind,
};

#[derive(Parser)]
#[command(name = "modelmux", about = "Multi-model AI request orchestrator")]
struct Cli {
    /// Request text.
    text: String,
    /// Path to an image attachment.
    #[arg(long)]
    image: Option<PathBuf>,
    /// Path to a PDF attachment.
    #[arg(long)]
    pdf: Option<PathBuf>,
    /// Overall deadline for the request, in seconds.
    #[arg(long, default_value_t = 120)]
    deadline_secs: u64,
}

/// Default catalog: a primary and a fallback text model, one vision
/// model, one generation-job worker. Model names and endpoints come
/// from `MODELMUX_*` env vars with local defaults.
fn default_catalog(config: &OrchestratorConfig) -> (ModelRegistry, BackendSet) {
    let text_kinds = [
        TaskKind::Chat,
        TaskKind::Code,
        TaskKind::DocumentAnalysis,
        TaskKind::Search,
        TaskKind::FinancialModeling,
    ];

    let text_model = std::env::var("MODELMUX_TEXT_MODEL")
        .unwrap_or_else(|_| "qwen2.5-72b-instruct".into());
    let fallback_model = std::env::var("MODELMUX_TEXT_FALLBACK_MODEL")
        .unwrap_or_else(|_| "llama-3.1-8b-instruct".into());
    let vision_model =
        std::env::var("MODELMUX_VISION_MODEL").unwrap_or_else(|_| "qwen2-vl-7b".into());
    let generation_model =
        std::env::var("MODELMUX_GENERATION_MODEL").unwrap_or_else(|_| "sdxl-worker".into());

    let endpoints = &config.endpoints;
    let key = endpoints.api_key.clone();

    let registry = ModelRegistry::new(vec![
        ModelProfile::new(text_model.clone(), text_kinds).with_priority(10),
        ModelProfile::new(fallback_model.clone(), text_kinds).with_priority(20),
        ModelProfile::new(vision_model.clone(), [TaskKind::Vision]).with_priority(10),
        ModelProfile::new(
            generation_model.clone(),
            [TaskKind::ImageGeneration, TaskKind::VideoGeneration],
        )
        .with_priority(10),
    ]);

    let backends = BackendSet::new()
        .with_text(
            text_model.clone(),
            Arc::new(HttpTextBackend::new(&endpoints.text_url, &text_model, key.clone())),
        )
        .with_text(
            fallback_model.clone(),
            Arc::new(HttpTextBackend::new(
                &endpoints.text_url,
                &fallback_model,
                key.clone(),
            )),
        )
        .with_vision(
            vision_model.clone(),
            Arc::new(HttpVisionBackend::new(
                &endpoints.vision_url,
                &vision_model,
                key.clone(),
            )),
        )
        .with_generation(
            generation_model.clone(),
            Arc::new(HttpGenerationBackend::new(
                &endpoints.generation_url,
                &generation_model,
                key,
            )),
        );

    (registry, backends)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = OrchestratorConfig::default();
    let (registry, backends) = default_catalog(&config);

    let orchestrator = Orchestrator::new(config, registry, backends)
        .context("orchestrator configuration invalid")?;
    info!("orchestrator ready");

    let mut attachments = Vec::new();
    if let Some(path) = &cli.image {
        let data = std::fs::read(path)
            .with_context(|| format!("reading image {}", path.display()))?;
        attachments.push(Attachment::image(data));
    }
    if let Some(path) = &cli.pdf {
        let data =
            std::fs::read(path).with_context(|| format!("reading pdf {}", path.display()))?;
        attachments.push(Attachment::pdf(data));
    }

    match orchestrator
        .submit(&cli.text, attachments, Duration::from_secs(cli.deadline_secs))
        .await
    {
        Ok(completion) => {
            info!(
                kind = %completion.kind,
                model = %completion.model_used,
                attempts = completion.attempt_count,
                "done"
            );
            println!("{}", completion.text);
            Ok(())
        }
        Err(err) => {
            let code = err.code();
            Err(anyhow::anyhow!(err)).with_context(|| format!("request failed ({code})"))
        }
    }
}
