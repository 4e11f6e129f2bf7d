//! Scheduler entrypoints: three stateless, idempotent tick functions. An
//! external trigger (cron, CLI) invokes exactly one per run; all state lives
//! in the KV store.

use crate::chat::ChatSink;
use crate::config::RadarConfig;
use crate::digest::{DigestComposer, DigestOutput};
use crate::feeds::Feed;
use crate::kv::KvStore;
use crate::llm::LlmRouter;
use crate::processor::SignalProcessor;
use crate::seen::SeenSet;
use crate::store::SignalStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Everything a tick needs, wired once per invocation.
pub struct RadarEnv {
    pub kv: Arc<dyn KvStore>,
    pub config: RadarConfig,
    pub router: LlmRouter,
    pub feeds: Vec<Box<dyn Feed>>,
    pub chat: Box<dyn ChatSink>,
}

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub fetched: usize,
    pub fresh: usize,
    pub stored: usize,
    pub discarded: usize,
    pub skipped: usize,
}

/// Per feed: fetch, drop already-seen items, score and persist survivors,
/// then mark the scored ones seen. A feed failure is isolated to that feed.
pub async fn tick_ingest(env: &RadarEnv, now: DateTime<Utc>) -> anyhow::Result<IngestSummary> {
    let seen = SeenSet::new(env.kv.clone(), env.config.seen_retention_days);
    let store = SignalStore::new(env.kv.clone());
    let processor = SignalProcessor::new(&env.router, &store, &env.config);

    let mut summary = IngestSummary::default();
    for feed in &env.feeds {
        let items = match feed.fetch_latest().await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("feed {} fetch failed: {e}", feed.name());
                continue;
            }
        };
        summary.fetched += items.len();

        let fresh = seen.filter_new(items).await;
        summary.fresh += fresh.len();

        let outcome = processor.process(&fresh, now).await?;
        seen.mark_seen(&outcome.accepted, now).await;

        summary.stored += outcome.stored;
        summary.discarded += outcome.discarded;
        summary.skipped += outcome.skipped;
    }
    tracing::info!(
        "ingest tick: fetched={} fresh={} stored={} discarded={} skipped={}",
        summary.fetched,
        summary.fresh,
        summary.stored,
        summary.discarded,
        summary.skipped
    );
    Ok(summary)
}

/// Compose the daily digest (record is durable before delivery) and hand
/// the messages to the chat collaborator.
pub async fn tick_daily_digest(env: &RadarEnv, now: DateTime<Utc>) -> anyhow::Result<DigestOutput> {
    let store = SignalStore::new(env.kv.clone());
    let composer = DigestComposer::new(&env.kv, &store, &env.router, &env.config);
    let output = composer.compose_daily(now).await?;
    if let Err(e) = env.chat.deliver(&output.messages).await {
        tracing::warn!("daily digest delivery failed: {e}");
    }
    Ok(output)
}

pub async fn tick_weekly_digest(
    env: &RadarEnv,
    now: DateTime<Utc>,
) -> anyhow::Result<DigestOutput> {
    let store = SignalStore::new(env.kv.clone());
    let composer = DigestComposer::new(&env.kv, &store, &env.router, &env.config);
    let output = composer.compose_weekly(now).await?;
    if let Err(e) = env.chat.deliver(&output.messages).await {
        tracing::warn!("weekly digest delivery failed: {e}");
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::SqliteKv;
    use crate::llm::{CallOpts, ProviderAdapter};
    use crate::models::signal::{RawItem, Source};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    struct StaticFeed(Vec<RawItem>);

    #[async_trait]
    impl Feed for StaticFeed {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_latest(&self) -> anyhow::Result<Vec<RawItem>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenFeed;

    #[async_trait]
    impl Feed for BrokenFeed {
        fn name(&self) -> &str {
            "broken"
        }

        async fn fetch_latest(&self) -> anyhow::Result<Vec<RawItem>> {
            anyhow::bail!("DNS failure")
        }
    }

    struct CollectingChat(Mutex<Vec<String>>);

    #[async_trait]
    impl ChatSink for CollectingChat {
        async fn deliver(&self, messages: &[String]) -> anyhow::Result<()> {
            self.0.lock().unwrap().extend(messages.iter().cloned());
            Ok(())
        }
    }

    struct ScriptedAdapter(String);

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, _: &str, _: &str, _: &CallOpts) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    fn item(id: &str) -> RawItem {
        RawItem {
            id: id.to_string(),
            source: Source::HackerNews,
            title: format!("Item {id}"),
            link: format!("https://example.com/{id}"),
            detected_at: "2026-01-20T08:00:00Z".to_string(),
        }
    }

    fn high_score_json() -> String {
        r#"{"summary_zh":"一条足够长的测试摘要。","score_breakdown":{"innovation":5,"relevance":5,"actionability":4,"signal_strength":4,"timeliness":5},"score_confidence":0.92,"score_reasoning":"强"}"#
            .to_string()
    }

    fn env(feeds: Vec<Box<dyn Feed>>, reply: &str) -> RadarEnv {
        RadarEnv {
            kv: Arc::new(SqliteKv::open_in_memory().unwrap()),
            config: RadarConfig::default(),
            router: LlmRouter::new(vec![
                Box::new(ScriptedAdapter(reply.to_string())) as Box<dyn ProviderAdapter>
            ]),
            feeds,
            chat: Box::new(ConsoleLessChat),
        }
    }

    struct ConsoleLessChat;

    #[async_trait]
    impl ChatSink for ConsoleLessChat {
        async fn deliver(&self, _messages: &[String]) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 20, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn ingest_dedupes_and_running_twice_changes_nothing() {
        let feed = StaticFeed(vec![item("hn_a"), item("hn_b")]);
        let env = env(vec![Box::new(feed)], &high_score_json());

        let first = tick_ingest(&env, noon()).await.unwrap();
        assert_eq!(first.fetched, 2);
        assert_eq!(first.fresh, 2);
        assert_eq!(first.stored, 2);

        // Same feed content again: everything is seen now.
        let second = tick_ingest(&env, noon()).await.unwrap();
        assert_eq!(second.fresh, 0);
        assert_eq!(second.stored, 0);

        let store = SignalStore::new(env.kv.clone());
        let listed = store.list_by_date("2026-01-20").await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn previously_seen_item_is_not_stored_again() {
        let env = env(
            vec![Box::new(StaticFeed(vec![item("hn_a"), item("hn_b")]))],
            &high_score_json(),
        );
        // hn_b was marked seen three days ago.
        let seen = SeenSet::new(env.kv.clone(), env.config.seen_retention_days);
        let earlier = Utc.with_ymd_and_hms(2026, 1, 17, 12, 0, 0).unwrap();
        seen.mark_seen(&["hn_b".to_string()], earlier).await;

        let summary = tick_ingest(&env, noon()).await.unwrap();
        assert_eq!(summary.fresh, 1);
        assert_eq!(summary.stored, 1);

        let store = SignalStore::new(env.kv.clone());
        let listed = store.list_by_date("2026-01-20").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "hacker_news_hn_a");
        assert!(
            env.kv
                .get("signal:2026-01-20:hacker_news_hn_a")
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            env.kv
                .get("signal:2026-01-20:hacker_news_hn_b")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn broken_feed_does_not_abort_the_tick() {
        let env = env(
            vec![
                Box::new(BrokenFeed) as Box<dyn Feed>,
                Box::new(StaticFeed(vec![item("hn_a")])),
            ],
            &high_score_json(),
        );
        let summary = tick_ingest(&env, noon()).await.unwrap();
        assert_eq!(summary.stored, 1);
    }

    #[tokio::test]
    async fn empty_feeds_write_nothing() {
        let env = env(vec![Box::new(StaticFeed(Vec::new()))], &high_score_json());
        let summary = tick_ingest(&env, noon()).await.unwrap();
        assert_eq!(summary.fetched, 0);
        assert!(
            env.kv
                .get("index:daily:2026-01-20")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn daily_tick_hands_messages_to_the_chat_sink() {
        let mut env = env(
            vec![Box::new(StaticFeed(vec![item("hn_a")]))],
            &high_score_json(),
        );
        tick_ingest(&env, noon()).await.unwrap();

        // Swap in a collecting sink and disable the LLM so the digest is the
        // deterministic template.
        let chat = Arc::new(CollectingChat(Mutex::new(Vec::new())));
        struct ArcChat(Arc<CollectingChat>);
        #[async_trait]
        impl ChatSink for ArcChat {
            async fn deliver(&self, messages: &[String]) -> anyhow::Result<()> {
                self.0.deliver(messages).await
            }
        }
        env.chat = Box::new(ArcChat(chat.clone()));
        env.config.daily_llm_enabled = false;

        let output = tick_daily_digest(&env, noon()).await.unwrap();
        assert_eq!(output.messages.len(), 1);
        let delivered = chat.0.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].contains("每日科技信号日报"));
    }
}
