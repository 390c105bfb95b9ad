use serde::{Deserialize, Serialize};
use tokio::time::Instant;

// 分类结果状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    #[default]
    Success,
    Error,
}

/// Signals the scoring service reports alongside a verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Features {
    #[serde(default)]
    pub suspicious_url_score: f64,
    #[serde(default)]
    pub domain_age_days: i64,
    #[serde(default)]
    pub has_ssl: bool,
    #[serde(default)]
    pub redirect_count: u32,
    #[serde(default)]
    pub similarity_flag: bool,
}

/// Uniform classification outcome for one URL.
///
/// `phishing_confidence` and `legitimate_confidence` are independent model
/// outputs: they need not sum to 1, but both stay within `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub status: ResultStatus,
    pub is_phishing: bool,
    #[serde(default)]
    pub phishing_confidence: f64,
    #[serde(default)]
    pub legitimate_confidence: f64,
    #[serde(default)]
    pub features: Features,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ClassificationResult {
    /// Fail-closed result: anything we could not classify is treated as suspicious.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            is_phishing: true,
            phishing_confidence: 0.0,
            legitimate_confidence: 0.0,
            features: Features::default(),
            message: Some(message.into()),
        }
    }

    pub fn rate_limited() -> Self {
        Self::failure(RATE_LIMITED_MESSAGE)
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    /// True when this is a phishing verdict strictly above `threshold`.
    pub fn is_high_risk(&self, threshold: f64) -> bool {
        self.is_success() && self.is_phishing && self.phishing_confidence > threshold
    }
}

pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded";

// 缓存条目
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: ClassificationResult,
    pub created_at: Instant,
}

/// How a single URL was resolved by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Served from the result cache; no remote call was made.
    Cached(ClassificationResult),
    /// Fresh verdict from the scoring service, now cached.
    Classified(ClassificationResult),
    /// Admission denied; fail-closed and scheduled for retry.
    RateLimited(ClassificationResult),
    /// Remote call failed or returned garbage; fail-closed, not cached.
    Failed(ClassificationResult),
}

impl Outcome {
    pub fn result(&self) -> &ClassificationResult {
        match self {
            Outcome::Cached(r)
            | Outcome::Classified(r)
            | Outcome::RateLimited(r)
            | Outcome::Failed(r) => r,
        }
    }

    pub fn into_result(self) -> ClassificationResult {
        match self {
            Outcome::Cached(r)
            | Outcome::Classified(r)
            | Outcome::RateLimited(r)
            | Outcome::Failed(r) => r,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Outcome::RateLimited(_))
    }
}

// 检测历史记录 (只追加)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionRecord {
    pub url: String,
    pub is_phishing: bool,
    pub phishing_confidence: f64,
    pub legitimate_confidence: f64,
    pub features: Features,
    /// Unix timestamp in milliseconds.
    pub time: i64,
}

impl DetectionRecord {
    pub fn from_result(url: &str, result: &ClassificationResult) -> Self {
        Self {
            url: url.to_string(),
            is_phishing: result.is_phishing,
            phishing_confidence: result.phishing_confidence,
            legitimate_confidence: result.legitimate_confidence,
            features: result.features.clone(),
            time: chrono::Utc::now().timestamp_millis(),
        }
    }
}
