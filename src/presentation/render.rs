// Terminal rendering of verdicts
use crate::domain::model::{ClassificationResult, DetectionRecord, RATE_LIMITED_MESSAGE};
use crate::presentation::theme::Theme;
use chrono::{Local, TimeZone};
use std::fmt::Write;

/// How a result should be presented. Anything that is not a clean verdict
/// is shown as suspicious; nothing falls back to "safe".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Phishing,
    Safe,
    Suspicious,
}

pub fn verdict(result: &ClassificationResult) -> Verdict {
    if !result.is_success() {
        Verdict::Suspicious
    } else if result.is_phishing {
        Verdict::Phishing
    } else {
        Verdict::Safe
    }
}

/// Number of lit severity dots out of five.
pub fn severity_level(phishing_confidence: f64) -> usize {
    (phishing_confidence.clamp(0.0, 1.0) * 5.0).ceil() as usize
}

pub fn format_result(
    url: &str,
    result: &ClassificationResult,
    theme: &Theme,
    enable_emoji: bool,
) -> String {
    let mut output = String::new();

    let (icon, headline) = match verdict(result) {
        Verdict::Phishing => ("⚠️ ", (theme.danger)("Phishing detected")),
        Verdict::Safe => ("✅", (theme.safe)("Safe website")),
        Verdict::Suspicious => ("❌", (theme.suspicious)("Could not verify, treated as suspicious")),
    };
    if enable_emoji {
        writeln!(output, "{} {} {}", icon, headline, (theme.url)(url)).ok();
    } else {
        writeln!(output, "{} {}", headline, (theme.url)(url)).ok();
    }

    if !result.is_success() {
        let reason = result.message.as_deref().unwrap_or("unknown error");
        writeln!(output, "  {} {}", (theme.label)("reason"), (theme.value)(reason)).ok();
        if reason == RATE_LIMITED_MESSAGE {
            writeln!(output, "  {}", (theme.note)("will be checked again shortly")).ok();
        }
        return output;
    }

    let dots = severity_level(result.phishing_confidence);
    let (on, off) = if enable_emoji { ("●", "○") } else { ("#", "-") };
    writeln!(
        output,
        "  {} {} phishing {:.1}%  legitimate {:.1}%",
        (theme.label)("confidence"),
        format!("{}{}", on.repeat(dots), off.repeat(5 - dots)),
        result.phishing_confidence * 100.0,
        result.legitimate_confidence * 100.0
    )
    .ok();

    let f = &result.features;
    writeln!(
        output,
        "  {} {} days  {} {}  {} {:.1}%  {} {}",
        (theme.label)("domain age"),
        (theme.value)(&f.domain_age_days.to_string()),
        (theme.label)("ssl"),
        (theme.value)(if f.has_ssl { "present" } else { "missing" }),
        (theme.label)("url score"),
        f.suspicious_url_score * 100.0,
        (theme.label)("redirects"),
        (theme.value)(&f.redirect_count.to_string()),
    )
    .ok();
    if f.similarity_flag {
        writeln!(output, "  {}", (theme.note)("similar to a well-known domain")).ok();
    }
    if let Some(message) = &result.message {
        writeln!(output, "  {}", (theme.note)(message)).ok();
    }

    output
}

pub fn format_history(records: &[DetectionRecord], theme: &Theme) -> String {
    let mut output = String::new();
    for record in records {
        let when = Local
            .timestamp_millis_opt(record.time)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let verdict = if record.is_phishing {
            (theme.danger)("phishing")
        } else {
            (theme.safe)("safe")
        };
        writeln!(
            output,
            "{}  {:<10} {:>5.1}%  {}",
            (theme.note)(&when),
            verdict,
            record.phishing_confidence * 100.0,
            (theme.url)(&record.url)
        )
        .ok();
    }
    output
}
