//! LLM routing: an ordered list of provider adapters tried sequentially,
//! each behind a hard per-call timeout. The router returns the first raw
//! body that arrives, `None` when every provider failed its budget. It
//! never parses response JSON; that stays with the caller.

pub mod prompts;
pub mod providers;

use crate::config::RadarConfig;
use async_trait::async_trait;
use std::time::Duration;

/// Identifier recorded in digest provenance. Bumped when routing or prompt
/// handling changes behavior.
pub const ROUTER_VERSION: &str = "llm_router/2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct CallOpts {
    pub response_format: ResponseFormat,
    pub timeout_ms: u64,
    pub max_tokens: u32,
}

/// Raised only for configuration mistakes; provider failures are handled by
/// the fallback loop and never surface as errors.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no LLM provider configured")]
    NoProviders,
}

/// One outbound request to one provider. Non-2xx, transport errors, empty
/// bodies, and malformed response envelopes are all `Err`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;
    async fn invoke(&self, system: &str, user: &str, opts: &CallOpts) -> anyhow::Result<String>;
}

pub struct LlmRouter {
    providers: Vec<Box<dyn ProviderAdapter>>,
}

impl LlmRouter {
    pub fn new(providers: Vec<Box<dyn ProviderAdapter>>) -> Self {
        Self { providers }
    }

    /// Build adapters for every configured provider that has an API key,
    /// preserving the configured order.
    pub fn from_config(config: &RadarConfig) -> Self {
        let providers = config
            .active_providers()
            .into_iter()
            .filter_map(|p| providers::build_adapter(p))
            .collect();
        Self::new(providers)
    }

    pub fn is_available(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Try providers in order; each gets exactly one attempt. Returns the
    /// first non-empty body, or `Ok(None)` once the list is exhausted.
    pub async fn call_llm(
        &self,
        system: &str,
        user: &str,
        opts: &CallOpts,
    ) -> Result<Option<String>, RouterError> {
        if self.providers.is_empty() {
            return Err(RouterError::NoProviders);
        }
        for provider in &self.providers {
            let attempt = provider.invoke(system, user, opts);
            match tokio::time::timeout(Duration::from_millis(opts.timeout_ms), attempt).await {
                Err(_) => {
                    tracing::warn!(
                        "llm provider {} timed out after {}ms",
                        provider.name(),
                        opts.timeout_ms
                    );
                }
                Ok(Err(e)) => {
                    tracing::warn!("llm provider {} failed: {e}", provider.name());
                }
                Ok(Ok(body)) if body.trim().is_empty() => {
                    tracing::warn!("llm provider {} returned an empty body", provider.name());
                }
                Ok(Ok(body)) => {
                    tracing::debug!(
                        "llm provider {} answered ({} bytes)",
                        provider.name(),
                        body.len()
                    );
                    return Ok(Some(body));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedAdapter {
        name: &'static str,
        reply: Result<String, String>,
        calls: Arc<AtomicUsize>,
    }

    impl FixedAdapter {
        fn ok(name: &'static str, reply: &str, calls: &Arc<AtomicUsize>) -> Box<Self> {
            Box::new(Self {
                name,
                reply: Ok(reply.to_string()),
                calls: calls.clone(),
            })
        }

        fn err(name: &'static str, calls: &Arc<AtomicUsize>) -> Box<Self> {
            Box::new(Self {
                name,
                reply: Err("HTTP 500".to_string()),
                calls: calls.clone(),
            })
        }
    }

    #[async_trait]
    impl ProviderAdapter for FixedAdapter {
        fn name(&self) -> &str {
            self.name
        }

        async fn invoke(&self, _: &str, _: &str, _: &CallOpts) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().map_err(anyhow::Error::msg)
        }
    }

    fn opts() -> CallOpts {
        CallOpts {
            response_format: ResponseFormat::Json,
            timeout_ms: 1_000,
            max_tokens: 256,
        }
    }

    #[tokio::test]
    async fn first_success_wins_without_touching_later_providers() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let router = LlmRouter::new(vec![
            FixedAdapter::ok("a", "{\"ok\":true}", &first),
            FixedAdapter::ok("b", "{\"ok\":false}", &second),
        ]);
        let body = router.call_llm("s", "u", &opts()).await.unwrap();
        assert_eq!(body.as_deref(), Some("{\"ok\":true}"));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_advances_to_next_provider() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let router = LlmRouter::new(vec![
            FixedAdapter::err("a", &first),
            FixedAdapter::ok("b", "{\"ok\":true}", &second),
        ]);
        let body = router.call_llm("s", "u", &opts()).await.unwrap();
        assert_eq!(body.as_deref(), Some("{\"ok\":true}"));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_body_counts_as_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = LlmRouter::new(vec![
            FixedAdapter::ok("a", "   ", &calls),
            FixedAdapter::ok("b", "real", &calls),
        ]);
        let body = router.call_llm("s", "u", &opts()).await.unwrap();
        assert_eq!(body.as_deref(), Some("real"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_list_returns_none() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = LlmRouter::new(vec![
            FixedAdapter::err("a", &calls),
            FixedAdapter::err("b", &calls),
        ]);
        assert!(router.call_llm("s", "u", &opts()).await.unwrap().is_none());
        // Each provider tried exactly once, no retries.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_providers_is_a_configuration_error() {
        let router = LlmRouter::new(Vec::new());
        assert!(matches!(
            router.call_llm("s", "u", &opts()).await,
            Err(RouterError::NoProviders)
        ));
    }

    struct SlowAdapter;

    #[async_trait]
    impl ProviderAdapter for SlowAdapter {
        fn name(&self) -> &str {
            "slow"
        }

        async fn invoke(&self, _: &str, _: &str, _: &CallOpts) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_advances_to_next_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = LlmRouter::new(vec![
            Box::new(SlowAdapter) as Box<dyn ProviderAdapter>,
            FixedAdapter::ok("fast", "{\"ok\":true}", &calls),
        ]);
        let body = router.call_llm("s", "u", &opts()).await.unwrap();
        assert_eq!(body.as_deref(), Some("{\"ok\":true}"));
    }
}
