use radar_pipeline::chat::{ChatSink, ConsoleChat, WebhookChat};
use radar_pipeline::config::RadarConfig;
use radar_pipeline::feeds::{Feed, JsonFeed};
use radar_pipeline::kv::{KvStore, SqliteKv};
use radar_pipeline::llm::LlmRouter;
use radar_pipeline::models::signal::Source;
use radar_pipeline::scheduler::{self, RadarEnv};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("radar_pipeline=debug")),
        )
        .init();

    let mode = std::env::args().nth(1).unwrap_or_default();
    let config_path =
        std::env::var("RADAR_CONFIG").unwrap_or_else(|_| "radar.toml".to_string());
    let config = RadarConfig::load(&config_path)?;

    let kv = SqliteKv::open(&config.kv_path)?;
    match kv.purge_expired() {
        Ok(0) => {}
        Ok(n) => tracing::info!("purged {n} expired keys"),
        Err(e) => tracing::warn!("expiry purge failed: {e}"),
    }
    let kv: Arc<dyn KvStore> = Arc::new(kv);

    let router = LlmRouter::from_config(&config);
    if !router.is_available() {
        tracing::warn!("no LLM provider has an API key; digests fall back to templates");
    }

    let feeds: Vec<Box<dyn Feed>> = config
        .feeds
        .iter()
        .map(|f| {
            Box::new(JsonFeed::new(Source::from(f.source.as_str()), f.url.clone()))
                as Box<dyn Feed>
        })
        .collect();
    let chat: Box<dyn ChatSink> = match &config.chat_webhook_url {
        Some(url) => Box::new(WebhookChat::new(url.clone())),
        None => Box::new(ConsoleChat),
    };

    let env = RadarEnv {
        kv,
        config,
        router,
        feeds,
        chat,
    };
    let now = chrono::Utc::now();

    match mode.as_str() {
        "ingest" => {
            let summary = scheduler::tick_ingest(&env, now).await?;
            tracing::info!(
                "done: {} stored, {} discarded, {} skipped",
                summary.stored,
                summary.discarded,
                summary.skipped
            );
        }
        "daily" => {
            let output = scheduler::tick_daily_digest(&env, now).await?;
            tracing::info!("done: {} messages", output.messages.len());
        }
        "weekly" => {
            let output = scheduler::tick_weekly_digest(&env, now).await?;
            tracing::info!("done: {} messages", output.messages.len());
        }
        _ => {
            eprintln!("usage: radar <ingest|daily|weekly>");
            std::process::exit(2);
        }
    }
    Ok(())
}
