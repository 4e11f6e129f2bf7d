//! Scoring calibrator: turns whatever the summarize call returned into a
//! fully-populated, in-range score. The weighted scalar computed here is the
//! sole source of truth for `value_score`; any model-reported value is
//! ignored.

use crate::models::signal::ScoreBreakdown;
use serde_json::Value;

const MAX_REASONING_CHARS: usize = 200;

/// `0.25·innovation + 0.25·relevance + 0.20·actionability
///  + 0.15·signal_strength + 0.15·timeliness`, rounded, clamped to 1..=5.
pub fn weighted_score(b: &ScoreBreakdown) -> u8 {
    let weighted = 0.25 * b.innovation as f64
        + 0.25 * b.relevance as f64
        + 0.20 * b.actionability as f64
        + 0.15 * b.signal_strength as f64
        + 0.15 * b.timeliness as f64;
    (weighted.round() as i64).clamp(1, 5) as u8
}

/// Calibrated output of one summarize call.
#[derive(Debug, Clone)]
pub struct CalibratedSummary {
    pub summary_zh: String,
    pub breakdown: ScoreBreakdown,
    pub value_score: u8,
    pub confidence: f64,
    pub reasoning: String,
    pub uncertainty_reason: Option<String>,
    pub key_points: Vec<String>,
    pub target_audience: String,
    /// True when the model response was unusable and the parse-failure
    /// defaults were substituted.
    pub fallback: bool,
}

/// Remove a surrounding ```` ```json ```` / ```` ``` ```` fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest.strip_prefix("json").unwrap_or(rest).trim_start();
        s = s.strip_suffix("```").map(str::trim_end).unwrap_or(s);
    }
    s
}

/// Parse and normalize a raw summarize response. Malformed JSON (after
/// fence stripping) yields the fallback summary.
pub fn calibrate(raw: &str) -> CalibratedSummary {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(value) if value.is_object() => calibrate_value(&value),
        _ => fallback_summary("模型返回的不是合法 JSON"),
    }
}

fn calibrate_value(value: &Value) -> CalibratedSummary {
    let bd = value.get("score_breakdown");
    let breakdown = ScoreBreakdown {
        innovation: component(bd, "innovation"),
        relevance: component(bd, "relevance"),
        actionability: component(bd, "actionability"),
        signal_strength: component(bd, "signal_strength"),
        timeliness: component(bd, "timeliness"),
    };
    let value_score = weighted_score(&breakdown);

    let confidence = value
        .get("score_confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    let mut reasoning = text_field(value, "score_reasoning");
    if reasoning.chars().count() > MAX_REASONING_CHARS {
        reasoning = reasoning.chars().take(MAX_REASONING_CHARS).collect();
    }

    let mut uncertainty_reason = value
        .get("uncertainty_reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty());
    if confidence < 0.8 && uncertainty_reason.is_none() {
        uncertainty_reason = Some("模型未说明不确定性来源".to_string());
    }

    let key_points = value
        .get("key_points")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .take(3)
                .collect()
        })
        .unwrap_or_default();

    CalibratedSummary {
        summary_zh: text_field(value, "summary_zh"),
        breakdown,
        value_score,
        confidence,
        reasoning,
        uncertainty_reason,
        key_points,
        target_audience: text_field(value, "target_audience"),
        fallback: false,
    }
}

/// Parse-failure signal: every dimension 2, confidence 0.3. Scores below the
/// default push threshold, so it is normally discarded rather than stored.
pub fn fallback_summary(reason: &str) -> CalibratedSummary {
    let breakdown = ScoreBreakdown {
        innovation: 2,
        relevance: 2,
        actionability: 2,
        signal_strength: 2,
        timeliness: 2,
    };
    CalibratedSummary {
        summary_zh: String::new(),
        value_score: weighted_score(&breakdown),
        breakdown,
        confidence: 0.3,
        reasoning: "JSON parse failed".to_string(),
        uncertainty_reason: Some(reason.to_string()),
        key_points: Vec::new(),
        target_audience: String::new(),
        fallback: true,
    }
}

/// Missing keys default to the neutral 3; non-integers round to nearest;
/// out-of-range values clamp into 1..=5.
fn component(breakdown: Option<&Value>, key: &str) -> u8 {
    match breakdown.and_then(|b| b.get(key)).and_then(Value::as_f64) {
        Some(v) => (v.round() as i64).clamp(1, 5) as u8,
        None => 3,
    }
}

fn text_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(i: u8, r: u8, a: u8, s: u8, t: u8) -> ScoreBreakdown {
        ScoreBreakdown {
            innovation: i,
            relevance: r,
            actionability: a,
            signal_strength: s,
            timeliness: t,
        }
    }

    #[test]
    fn weighted_score_rounds_up_at_4_65() {
        // 0.25*5 + 0.25*5 + 0.20*4 + 0.15*4 + 0.15*5 = 4.65
        assert_eq!(weighted_score(&breakdown(5, 5, 4, 4, 5)), 5);
    }

    #[test]
    fn weighted_score_of_neutral_breakdown_is_3() {
        assert_eq!(weighted_score(&breakdown(3, 3, 3, 3, 3)), 3);
    }

    #[test]
    fn weighted_score_stays_in_range_at_extremes() {
        assert_eq!(weighted_score(&breakdown(1, 1, 1, 1, 1)), 1);
        assert_eq!(weighted_score(&breakdown(5, 5, 5, 5, 5)), 5);
    }

    #[test]
    fn missing_components_default_to_neutral() {
        let cal = calibrate(r#"{"summary_zh":"x","score_breakdown":{"innovation":5}}"#);
        assert_eq!(cal.breakdown.innovation, 5);
        assert_eq!(cal.breakdown.relevance, 3);
        assert_eq!(cal.breakdown.timeliness, 3);
        assert!(!cal.fallback);
    }

    #[test]
    fn out_of_range_components_clamp_and_round() {
        let cal = calibrate(
            r#"{"score_breakdown":{"innovation":9,"relevance":0,"actionability":3.6,"signal_strength":-2,"timeliness":2.4}}"#,
        );
        assert_eq!(cal.breakdown.innovation, 5);
        assert_eq!(cal.breakdown.relevance, 1);
        assert_eq!(cal.breakdown.actionability, 4);
        assert_eq!(cal.breakdown.signal_strength, 1);
        assert_eq!(cal.breakdown.timeliness, 2);
        assert_eq!(cal.value_score, weighted_score(&cal.breakdown));
    }

    #[test]
    fn confidence_clamps_into_unit_interval() {
        let cal = calibrate(r#"{"score_confidence":1.7}"#);
        assert_eq!(cal.confidence, 1.0);
        let cal = calibrate(r#"{"score_confidence":-0.4}"#);
        assert_eq!(cal.confidence, 0.0);
    }

    #[test]
    fn low_confidence_always_carries_a_reason() {
        let cal = calibrate(r#"{"score_confidence":0.5}"#);
        assert!(cal.confidence < 0.8);
        assert!(cal.uncertainty_reason.is_some());

        let cal = calibrate(r#"{"score_confidence":0.6,"uncertainty_reason":"来源单一"}"#);
        assert_eq!(cal.uncertainty_reason.as_deref(), Some("来源单一"));
    }

    #[test]
    fn code_fences_are_stripped_before_parsing() {
        let fenced = "```json\n{\"score_breakdown\":{\"innovation\":4}}\n```";
        let cal = calibrate(fenced);
        assert!(!cal.fallback);
        assert_eq!(cal.breakdown.innovation, 4);

        let bare_fence = "```\n{\"summary_zh\":\"ok\"}\n```";
        assert!(!calibrate(bare_fence).fallback);
    }

    #[test]
    fn malformed_json_produces_fallback() {
        let cal = calibrate("sorry, I cannot answer that");
        assert!(cal.fallback);
        assert_eq!(cal.value_score, 2);
        assert_eq!(cal.breakdown, breakdown(2, 2, 2, 2, 2));
        assert_eq!(cal.confidence, 0.3);
        assert_eq!(cal.reasoning, "JSON parse failed");
        assert!(cal.uncertainty_reason.is_some());
    }

    #[test]
    fn non_object_json_produces_fallback() {
        assert!(calibrate("[1,2,3]").fallback);
        assert!(calibrate("\"just a string\"").fallback);
    }

    #[test]
    fn reasoning_is_truncated_on_char_boundary() {
        let long = "很".repeat(300);
        let cal = calibrate(&format!(
            r#"{{"score_reasoning":"{long}","score_confidence":0.9}}"#
        ));
        assert_eq!(cal.reasoning.chars().count(), 200);
    }

    #[test]
    fn key_points_cap_at_three() {
        let cal = calibrate(r#"{"key_points":["a","b","c","d","e"]}"#);
        assert_eq!(cal.key_points, vec!["a", "b", "c"]);
    }
}
