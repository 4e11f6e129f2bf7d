//! Prompt builders for the summarize and digest calls, plus the prompt
//! fingerprint recorded in digest provenance.

use crate::models::signal::{RawItem, Signal};
use sha2::{Digest, Sha256};

/// 8-hex-char fingerprint of a prompt string. Identical prompts hash
/// identically within a deployment; the exact algorithm is not load-bearing.
pub fn prompt_hash(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    digest[..4].iter().map(|b| format!("{b:02x}")).collect()
}

pub fn summarize_system() -> String {
    "你是一名科技情报分析师，负责为中文读者评估并总结来自海外科技社区的新鲜情报。\n\n\
     请从以下五个维度对条目打分，每个维度为 1-5 的整数：\n\
     - innovation（创新性）：技术或产品思路的新颖程度\n\
     - relevance（相关性）：对科技从业者的相关程度\n\
     - actionability（可行动性）：读者能否据此采取行动\n\
     - signal_strength（信号强度）：背后趋势的可信程度\n\
     - timeliness（时效性）：当下关注的紧迫程度\n\n\
     输出必须是严格的 JSON 对象，不要使用 Markdown 代码块，包含且仅包含以下键：\n\
     {\"summary_zh\": \"150-250 字的中文摘要，以完整句子结尾\",\n\
      \"score_breakdown\": {\"innovation\": 1-5, \"relevance\": 1-5, \"actionability\": 1-5, \"signal_strength\": 1-5, \"timeliness\": 1-5},\n\
      \"score_confidence\": 0 到 1 之间的小数,\n\
      \"score_reasoning\": \"不超过 200 字的打分理由\",\n\
      \"uncertainty_reason\": \"当 score_confidence 低于 0.8 时必填，说明不确定性来源\",\n\
      \"key_points\": [\"最多 3 条要点\"],\n\
      \"target_audience\": \"最适合的读者人群\"}"
        .to_string()
}

pub fn summarize_user(item: &RawItem) -> String {
    format!(
        "标题: {}\n来源: {}\n链接: {}",
        item.title, item.source, item.link
    )
}

pub fn daily_system(date: &str) -> String {
    format!(
        "你是一名科技情报主编，负责把当天捕获的信号编排成中文日报（日期：{date}）。\n\n\
         输出必须是严格的 JSON 对象，不要使用 Markdown 代码块，键如下：\n\
         {{\"title\": \"日报标题\",\n\
           \"date\": \"{date}\",\n\
           \"totalCount\": 当天信号总数,\n\
           \"fullSummary\": [对「重点信号」里的每一条，按给定顺序输出 {{\"rank\", \"signal_id\", \"title\", \"source\", \"score\", \"summary\", \"link\"}}],\n\
           \"briefList\": [对「其余信号」里的每一条输出 {{\"rank\", \"signal_id\", \"title\", \"score\", \"link\"}}],\n\
           \"themes\": [\"3-5 个当日关键词\"],\n\
           \"insights\": \"100-150 字的当日趋势洞察\"}}\n\n\
         summary 在保留原意的前提下可以润色，但不要编造信号之外的内容。"
    )
}

pub fn daily_user(full: &[&Signal], brief: &[&Signal], date: &str) -> String {
    let mut out = format!("日期：{date}\n信号总数：{}\n\n重点信号：\n", full.len() + brief.len());
    for (i, s) in full.iter().enumerate() {
        out.push_str(&format!(
            "{rank}. [{score}分] {title}（{source}）\n   signal_id: {id}\n   链接: {link}\n   摘要: {summary}\n",
            rank = i + 1,
            score = s.value_score,
            title = s.title,
            source = s.source,
            id = s.id,
            link = s.link,
            summary = s.summary_zh,
        ));
    }
    if !brief.is_empty() {
        out.push_str("\n其余信号：\n");
        for (i, s) in brief.iter().enumerate() {
            out.push_str(&format!(
                "{rank}. [{score}分] {title} signal_id: {id} 链接: {link}\n",
                rank = full.len() + i + 1,
                score = s.value_score,
                title = s.title,
                id = s.id,
                link = s.link,
            ));
        }
    }
    out
}

pub fn weekly_system(week: &str) -> String {
    format!(
        "你是一名科技情报主编，负责把一周（{week}）捕获的信号编排成中文周报。\n\n\
         输出必须是严格的 JSON 对象，不要使用 Markdown 代码块，键如下：\n\
         {{\"title\": \"周报标题\",\n\
           \"weekInfo\": \"{week}\",\n\
           \"totalCount\": 本周信号总数,\n\
           \"overview\": \"本周整体概述\",\n\
           \"topSignals\": [对「重点信号」里的每一条，按给定顺序输出 {{\"rank\", \"signal_id\", \"title\", \"source\", \"score\", \"summary\", \"link\", \"dayOfWeek\"}}],\n\
           \"trendAnalysis\": [\"若干条本周趋势分析\"],\n\
           \"otherPicks\": [对「其余信号」里的每一条输出 {{\"rank\", \"signal_id\", \"title\", \"score\", \"link\"}}],\n\
           \"weekAhead\": [\"若干条下周值得关注的方向\"],\n\
           \"themes\": [\"5-8 个本周关键词\"]}}"
    )
}

pub fn weekly_user(full: &[&Signal], brief: &[&Signal], week: &str) -> String {
    let mut out = format!(
        "周次：{week}\n信号总数：{}\n\n重点信号：\n",
        full.len() + brief.len()
    );
    for (i, s) in full.iter().enumerate() {
        out.push_str(&format!(
            "{rank}. [{score}分] {title}（{source}，{detected}）\n   signal_id: {id}\n   链接: {link}\n   摘要: {summary}\n",
            rank = i + 1,
            score = s.value_score,
            title = s.title,
            source = s.source,
            detected = s.detected_at,
            id = s.id,
            link = s.link,
            summary = s.summary_zh,
        ));
    }
    if !brief.is_empty() {
        out.push_str("\n其余信号：\n");
        for (i, s) in brief.iter().enumerate() {
            out.push_str(&format!(
                "{rank}. [{score}分] {title} signal_id: {id} 链接: {link}\n",
                rank = full.len() + i + 1,
                score = s.value_score,
                title = s.title,
                id = s.id,
                link = s.link,
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::signal::Source;

    #[test]
    fn prompt_hash_is_stable_8_hex_chars() {
        let a = prompt_hash("same prompt");
        let b = prompt_hash("same prompt");
        let c = prompt_hash("different prompt");
        assert_eq!(a.len(), 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn summarize_system_names_every_required_key() {
        let system = summarize_system();
        for key in [
            "summary_zh",
            "innovation",
            "relevance",
            "actionability",
            "signal_strength",
            "timeliness",
            "score_confidence",
            "score_reasoning",
            "uncertainty_reason",
            "key_points",
            "target_audience",
        ] {
            assert!(system.contains(key), "missing {key}");
        }
    }

    #[test]
    fn summarize_user_carries_item_fields() {
        let item = RawItem {
            id: "hn_a".to_string(),
            source: Source::HackerNews,
            title: "A new database".to_string(),
            link: "https://example.com/db".to_string(),
            detected_at: "2026-01-20T08:00:00Z".to_string(),
        };
        let user = summarize_user(&item);
        assert!(user.contains("A new database"));
        assert!(user.contains("hacker_news"));
        assert!(user.contains("https://example.com/db"));
    }

    #[test]
    fn digest_system_prompts_name_contract_keys() {
        let daily = daily_system("2026-01-20");
        for key in ["fullSummary", "briefList", "themes", "insights", "totalCount"] {
            assert!(daily.contains(key), "daily missing {key}");
        }
        let weekly = weekly_system("2026-W04");
        for key in ["topSignals", "trendAnalysis", "otherPicks", "weekAhead", "themes"] {
            assert!(weekly.contains(key), "weekly missing {key}");
        }
    }
}
