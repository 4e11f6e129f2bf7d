//! Weekly digest: ISO week in UTC, one message (the chat collaborator
//! splits on byte budget, not the core), template fallback.

use super::{BriefPick, DigestComposer, DigestOutput, char_len, stars, template};
use crate::llm::{CallOpts, ROUTER_VERSION, ResponseFormat, prompts};
use crate::models::digest::{DigestRecord, DigestSection, DigestSignalRef, DigestType};
use crate::models::signal::Signal;
use crate::score::strip_code_fences;
use crate::store::iso_week_str;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Instant;

const WEEKLY_MAX_TOKENS: u32 = 4096;
const TOP_SECTION_CAP: usize = 10;

#[derive(Debug, Deserialize)]
struct WeeklyLlmResponse {
    #[serde(default)]
    title: String,
    #[serde(default)]
    overview: String,
    #[serde(default, rename = "topSignals")]
    top_signals: Vec<WeeklyTopEntry>,
    #[serde(default, rename = "trendAnalysis")]
    trend_analysis: Vec<String>,
    #[serde(default, rename = "otherPicks")]
    other_picks: Vec<BriefPick>,
    #[serde(default, rename = "weekAhead")]
    week_ahead: Vec<String>,
    #[serde(default)]
    themes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WeeklyTopEntry {
    #[serde(default)]
    rank: u32,
    #[serde(default)]
    signal_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    link: String,
    #[serde(default, rename = "dayOfWeek")]
    day_of_week: String,
}

impl DigestComposer<'_> {
    pub async fn compose_weekly(&self, now: DateTime<Utc>) -> anyhow::Result<DigestOutput> {
        let week_str = iso_week_str(now.date_naive());
        let started = Instant::now();
        let signals = self.store.list_by_week(&week_str).await?;

        if signals.is_empty() {
            let placeholder =
                format!("**📡 每周科技信号周报 · {week_str}**\n\n本周暂无新信号。");
            return Ok(DigestOutput {
                markdown: placeholder.clone(),
                messages: vec![placeholder],
                record: None,
            });
        }

        if !self.router.is_available() {
            return self
                .weekly_template(&week_str, &signals, started, "simple_template", now)
                .await;
        }

        let split = signals.len().min(TOP_SECTION_CAP);
        let (top_slice, other_slice) = signals.split_at(split);
        let top_refs: Vec<&Signal> = top_slice.iter().collect();
        let other_refs: Vec<&Signal> = other_slice.iter().collect();

        let system = prompts::weekly_system(&week_str);
        let user = prompts::weekly_user(&top_refs, &other_refs, &week_str);
        let opts = CallOpts {
            response_format: ResponseFormat::Json,
            timeout_ms: self.config.llm_timeout_weekly_ms,
            max_tokens: WEEKLY_MAX_TOKENS,
        };

        let Some(raw) = self.router.call_llm(&system, &user, &opts).await? else {
            tracing::warn!("weekly digest: all providers failed, using template");
            return self
                .weekly_template(&week_str, &signals, started, "simple_template_fallback", now)
                .await;
        };
        let mut parsed: WeeklyLlmResponse = match serde_json::from_str(strip_code_fences(&raw)) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("weekly digest JSON unusable ({e}), using template");
                return self
                    .weekly_template(&week_str, &signals, started, "simple_template_fallback", now)
                    .await;
            }
        };

        parsed.top_signals.sort_by_key(|e| e.rank);
        parsed.top_signals.truncate(TOP_SECTION_CAP);
        parsed.other_picks.sort_by_key(|p| p.rank);
        let degraded = parsed.top_signals.len() < top_refs.len();
        if degraded {
            tracing::warn!(
                "weekly digest degraded: {} of {} top entries returned",
                parsed.top_signals.len(),
                top_refs.len()
            );
        }
        let generated_by = if degraded {
            format!("{ROUTER_VERSION}_degraded")
        } else {
            ROUTER_VERSION.to_string()
        };

        let markdown = render_weekly(&week_str, &parsed, &top_refs, signals.len());

        let top_count = parsed.top_signals.len();
        let mut refs = Vec::with_capacity(top_count + parsed.other_picks.len());
        for (i, entry) in parsed.top_signals.iter().enumerate() {
            let signal_id = if entry.signal_id.trim().is_empty() {
                top_refs.get(i).map(|s| s.id.clone())
            } else {
                Some(entry.signal_id.clone())
            };
            if let Some(signal_id) = signal_id {
                refs.push(DigestSignalRef {
                    signal_id,
                    rank: (i + 1) as u32,
                    section: DigestSection::Full,
                });
            }
        }
        for (i, pick) in parsed.other_picks.iter().enumerate() {
            let signal_id = if pick.signal_id.trim().is_empty() {
                other_refs.get(i).map(|s| s.id.clone())
            } else {
                Some(pick.signal_id.clone())
            };
            if let Some(signal_id) = signal_id {
                refs.push(DigestSignalRef {
                    signal_id,
                    rank: (top_count + i + 1) as u32,
                    section: DigestSection::Brief,
                });
            }
        }

        let record = DigestRecord {
            digest_id: format!("weekly_{week_str}"),
            digest_type: DigestType::Weekly,
            date: week_str.clone(),
            signals: refs,
            themes: parsed.themes,
            generated_by,
            prompt_version: self.config.prompt_version.clone(),
            prompt_hash: prompts::prompt_hash(&system),
            generation_time_ms: started.elapsed().as_millis() as u64,
            content_markdown: markdown.clone(),
            content_length: char_len(&markdown),
            created_at: now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        };
        self.write_record(&record, &week_str).await?;

        Ok(DigestOutput {
            markdown: markdown.clone(),
            messages: vec![markdown],
            record: Some(record),
        })
    }

    async fn weekly_template(
        &self,
        week_str: &str,
        signals: &[Signal],
        started: Instant,
        generated_by: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<DigestOutput> {
        let markdown = template::render(DigestType::Weekly, week_str, signals);
        let refs = signals
            .iter()
            .enumerate()
            .map(|(i, s)| DigestSignalRef {
                signal_id: s.id.clone(),
                rank: (i + 1) as u32,
                section: DigestSection::Full,
            })
            .collect();
        let record = DigestRecord {
            digest_id: format!("weekly_{week_str}"),
            digest_type: DigestType::Weekly,
            date: week_str.to_string(),
            signals: refs,
            themes: Vec::new(),
            generated_by: generated_by.to_string(),
            prompt_version: self.config.prompt_version.clone(),
            prompt_hash: "none".to_string(),
            generation_time_ms: started.elapsed().as_millis() as u64,
            content_markdown: markdown.clone(),
            content_length: char_len(&markdown),
            created_at: now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        };
        self.write_record(&record, week_str).await?;
        Ok(DigestOutput {
            markdown: markdown.clone(),
            messages: vec![markdown],
            record: Some(record),
        })
    }
}

fn render_weekly(
    week_str: &str,
    parsed: &WeeklyLlmResponse,
    top_refs: &[&Signal],
    total: usize,
) -> String {
    let mut out = format!("**📡 每周科技信号周报 · {week_str}**\n");
    if !parsed.title.trim().is_empty() {
        out.push_str(&format!("{}\n", parsed.title));
    }
    out.push_str(&format!("\n共捕获 {total} 条信号\n"));
    if !parsed.overview.trim().is_empty() {
        out.push_str(&format!("\n{}\n", parsed.overview));
    }

    out.push_str("\n本周重点：\n");
    for (i, entry) in parsed.top_signals.iter().enumerate() {
        let signal = top_refs.get(i).copied();
        let title = fill(&entry.title, signal.map(|s| s.title.as_str()));
        let source = fill(&entry.source, signal.map(|s| s.source.as_str()));
        let summary = fill(&entry.summary, signal.map(|s| s.summary_zh.as_str()));
        let link = fill(&entry.link, signal.map(|s| s.link.as_str()));
        let score = if entry.score >= 1.0 {
            (entry.score.round() as i64).clamp(1, 5) as u8
        } else {
            signal.map(|s| s.value_score).unwrap_or(3)
        };
        out.push_str(&format!("\n{}. **{title}**", i + 1));
        if !entry.day_of_week.trim().is_empty() {
            out.push_str(&format!("（{}）", entry.day_of_week));
        }
        out.push_str(&format!(
            "\n   来源: {source} | 评分: {}\n   {summary}\n   🔗 {link}\n",
            stars(score)
        ));
    }

    if !parsed.trend_analysis.is_empty() {
        out.push_str("\n【本周趋势】\n");
        for trend in &parsed.trend_analysis {
            out.push_str(&format!("- {trend}\n"));
        }
    }
    if !parsed.week_ahead.is_empty() {
        out.push_str("\n【下周展望】\n");
        for item in &parsed.week_ahead {
            out.push_str(&format!("- {item}\n"));
        }
    }
    if !parsed.themes.is_empty() {
        out.push_str(&format!("\n【本周关键词】\n{}\n", parsed.themes.join(" / ")));
    }
    out
}

fn fill<'a>(primary: &'a str, fallback: Option<&'a str>) -> &'a str {
    if primary.trim().is_empty() {
        fallback.unwrap_or("")
    } else {
        primary
    }
}
