//! Signal processor: the sequential per-item summarize -> calibrate ->
//! threshold -> persist loop. One item's failure never blocks the rest.

use crate::config::RadarConfig;
use crate::llm::{CallOpts, LlmRouter, ResponseFormat, prompts};
use crate::models::signal::{RawItem, Signal};
use crate::score::{self, CalibratedSummary};
use crate::store::SignalStore;
use chrono::{DateTime, Utc};

const SUMMARIZE_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Default)]
pub struct ProcessSummary {
    /// Raw ids that completed scoring (stored or discarded). These are the
    /// ids the scheduler marks seen; anything else is retried next tick.
    pub accepted: Vec<String>,
    pub stored: usize,
    pub discarded: usize,
    pub skipped: usize,
}

pub struct SignalProcessor<'a> {
    router: &'a LlmRouter,
    store: &'a SignalStore,
    config: &'a RadarConfig,
}

impl<'a> SignalProcessor<'a> {
    pub fn new(router: &'a LlmRouter, store: &'a SignalStore, config: &'a RadarConfig) -> Self {
        Self {
            router,
            store,
            config,
        }
    }

    pub async fn process(
        &self,
        items: &[RawItem],
        now: DateTime<Utc>,
    ) -> anyhow::Result<ProcessSummary> {
        let system = prompts::summarize_system();
        let opts = CallOpts {
            response_format: ResponseFormat::Json,
            timeout_ms: self.config.llm_timeout_summarize_ms,
            max_tokens: SUMMARIZE_MAX_TOKENS,
        };

        let mut summary = ProcessSummary::default();
        for item in items {
            // RouterError is a configuration mistake and aborts the tick;
            // provider exhaustion just skips this item.
            let raw = match self
                .router
                .call_llm(&system, &prompts::summarize_user(item), &opts)
                .await?
            {
                Some(raw) => raw,
                None => {
                    tracing::warn!("summarize exhausted all providers for {}", item.id);
                    summary.skipped += 1;
                    continue;
                }
            };

            let calibrated = score::calibrate(&raw);
            if calibrated.fallback {
                tracing::warn!("summarize returned unusable JSON for {}", item.id);
            }

            if calibrated.value_score < self.config.push_threshold {
                tracing::debug!(
                    "discarding {} (score {} below threshold {})",
                    item.id,
                    calibrated.value_score,
                    self.config.push_threshold
                );
                summary.discarded += 1;
                summary.accepted.push(item.id.clone());
                continue;
            }

            let signal = build_signal(item, calibrated);
            match self.store.store(signal, now).await {
                Ok(()) => {
                    summary.stored += 1;
                    summary.accepted.push(item.id.clone());
                }
                Err(e) => {
                    // Left unaccepted on purpose: the item stays unseen and
                    // is retried next tick.
                    tracing::warn!("persist failed for {}: {e}", item.id);
                }
            }
        }
        Ok(summary)
    }
}

fn build_signal(item: &RawItem, calibrated: CalibratedSummary) -> Signal {
    Signal {
        id: Signal::derive_id(&item.source, &item.id),
        source: item.source.clone(),
        title: item.title.clone(),
        link: item.link.clone(),
        summary_zh: if calibrated.summary_zh.trim().is_empty() {
            item.title.clone()
        } else {
            calibrated.summary_zh
        },
        value_score: calibrated.value_score,
        score_breakdown: calibrated.breakdown,
        score_confidence: calibrated.confidence,
        score_reasoning: calibrated.reasoning,
        uncertainty_reason: calibrated.uncertainty_reason,
        detected_at: item.detected_at.clone(),
        stored_at: String::new(),
        key_points: calibrated.key_points,
        target_audience: calibrated.target_audience,
        feedback_count: 0,
    }
}
