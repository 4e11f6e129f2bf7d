//! Deterministic digest renderer used whenever the LLM path is disabled or
//! comes back unusable. One Markdown message, all signals, score order.

use super::stars;
use crate::models::digest::DigestType;
use crate::models::signal::Signal;

pub(crate) fn render(kind: DigestType, period: &str, signals: &[Signal]) -> String {
    let heading = match kind {
        DigestType::Daily => "每日科技信号日报",
        DigestType::Weekly => "每周科技信号周报",
    };
    let mut out = format!("**📡 {heading} · {period}**\n\n共 {} 条信号\n", signals.len());
    for (i, signal) in signals.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. **{}**\n   来源: {} | 评分: {}\n   {}\n   🔗 {}\n",
            i + 1,
            signal.title,
            signal.source,
            stars(signal.value_score),
            signal.summary_zh,
            signal.link,
        ));
    }
    out
}
