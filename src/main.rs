mod api;
mod attribute;
mod category;
mod extract;
mod instruction;
mod llm;
mod outbound;
mod pipeline;
mod session;
mod settings;
mod web;

use std::{process::exit, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use crate::{
    extract::Extractor,
    llm::{Completion, OllamaClient, OpenAiClient},
    outbound::CatalogClient,
    pipeline::Assistant,
    session::SessionStore,
    settings::{Args, Backend, Settings},
};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let settings = match Settings::from_file(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Problem while loading settings from {}: {e}", args.config.display());
            exit(1);
        }
    };

    let schema = match build_schema(&settings) {
        Ok(schema) => schema,
        Err(e) => {
            error!("Problem while starting the assistant: {e:#}");
            exit(1);
        }
    };

    web::serve(schema, settings.web.address).await;
}

fn build_schema(settings: &Settings) -> Result<api::Schema> {
    let llm = &settings.llm;
    let completion: Arc<dyn Completion> = match llm.backend {
        Backend::OpenAi => Arc::new(
            OpenAiClient::new(
                &llm.url,
                llm.api_key.clone(),
                &llm.model,
                llm.stream,
                Duration::from_secs(llm.timeout_secs),
            )
            .context("failed to build the OpenAI client")?,
        ),
        Backend::Ollama => Arc::new(
            OllamaClient::new(&llm.url, &llm.model, Duration::from_secs(llm.timeout_secs))
                .context("failed to build the Ollama client")?,
        ),
    };
    info!(backend = ?llm.backend, model = %llm.model, "completion backend ready");

    let catalog = &settings.catalog;
    let products = CatalogClient::new(catalog).context("failed to build the catalog client")?;
    let extractor = Extractor::for_host(&catalog.host).context("invalid catalog host")?;
    let assistant = Assistant::new(
        completion,
        Arc::new(products),
        extractor,
        &catalog.host,
        catalog.display_count,
        llm.retain_history,
    );

    let idle = Duration::from_secs(settings.web.session_idle_secs);
    let store = SessionStore::new(catalog.sample_seed, idle);
    store.spawn_sweeper(idle.clamp(Duration::from_secs(1), SWEEP_INTERVAL));

    Ok(api::schema(Arc::new(assistant), store))
}
