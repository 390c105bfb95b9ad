use crate::domain::error::PhishError;
use crate::domain::model::{ClassificationResult, Features, ResultStatus};
use crate::domain::traits::Classifier;
use crate::infrastructure::config::ServiceConfig;
use crate::infrastructure::network::http::create_client;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Serialize, Debug)]
struct CheckRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    use_bert: bool,
}

#[derive(Serialize, Debug)]
struct FeedbackRequest<'a> {
    url: &'a str,
    feedback: bool,
}

// Scoring service response. Every field is optional on the wire so that a
// partial body is reported as malformed instead of a generic decode error.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CheckResponse {
    status: Option<ResultStatus>,
    is_phishing: Option<bool>,
    phishing_confidence: Option<f64>,
    legitimate_confidence: Option<f64>,
    #[serde(default)]
    features: Features,
    message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StatusResponse {
    status: Option<String>,
    message: Option<String>,
}

/// Client for the remote scoring service.
///
/// `classify` is a single request/response exchange. It does not retry and
/// folds every failure into a fail-closed result.
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
    use_bert: bool,
}

impl HttpClassifier {
    pub fn new(client: Client, service: &ServiceConfig) -> Self {
        Self {
            client,
            endpoint: service.endpoint.trim_end_matches('/').to_string(),
            use_bert: service.use_bert,
        }
    }

    /// Build the HTTP client from `service` as well.
    pub fn from_config(service: &ServiceConfig) -> Result<Self, PhishError> {
        Ok(Self::new(create_client(service)?, service))
    }

    fn route(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    async fn check_url(&self, url: &str) -> Result<ClassificationResult, PhishError> {
        let response = self
            .client
            .post(self.route("check-url"))
            .json(&CheckRequest {
                url,
                use_bert: self.use_bert,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let detail = serde_json::from_slice::<StatusResponse>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());
            return Err(PhishError::Api(format!(
                "Scoring service returned {}: {}",
                status.as_u16(),
                detail
            )));
        }

        let parsed: CheckResponse = serde_json::from_slice(&body)?;
        normalize(parsed)
    }

    /// Report a URL to the community database.
    pub async fn report_url(&self, url: &str) -> Result<(), PhishError> {
        let response = self
            .client
            .post(self.route("report-url"))
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await?;
        expect_success(response).await
    }

    /// Submit a user verdict override for `url`.
    pub async fn send_feedback(&self, url: &str, is_phishing: bool) -> Result<(), PhishError> {
        let response = self
            .client
            .post(self.route("feedback"))
            .json(&FeedbackRequest {
                url,
                feedback: is_phishing,
            })
            .send()
            .await?;
        expect_success(response).await
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, url: &str) -> ClassificationResult {
        match self.check_url(url).await {
            Ok(result) => {
                debug!(
                    "Classified {}: phishing={} ({:.3})",
                    url, result.is_phishing, result.phishing_confidence
                );
                result
            }
            Err(e) => {
                warn!("Classification failed for {}: {}", url, e);
                ClassificationResult::failure(e.to_string())
            }
        }
    }
}

fn normalize(response: CheckResponse) -> Result<ClassificationResult, PhishError> {
    if response.status == Some(ResultStatus::Error) {
        return Err(PhishError::Api(
            response
                .message
                .unwrap_or_else(|| "Scoring service reported an error".to_string()),
        ));
    }

    let is_phishing = response
        .is_phishing
        .ok_or_else(|| PhishError::MalformedResponse("missing isPhishing".to_string()))?;
    let phishing_confidence = confidence(response.phishing_confidence, "phishingConfidence")?;
    let legitimate_confidence =
        confidence(response.legitimate_confidence, "legitimateConfidence")?;

    Ok(ClassificationResult {
        status: ResultStatus::Success,
        is_phishing,
        phishing_confidence,
        legitimate_confidence,
        features: response.features,
        message: response.message,
    })
}

fn confidence(value: Option<f64>, field: &str) -> Result<f64, PhishError> {
    match value {
        Some(v) if (0.0..=1.0).contains(&v) => Ok(v),
        Some(v) => Err(PhishError::MalformedResponse(format!(
            "{} out of range: {}",
            field, v
        ))),
        None => Err(PhishError::MalformedResponse(format!("missing {}", field))),
    }
}

async fn expect_success(response: reqwest::Response) -> Result<(), PhishError> {
    let status = response.status();
    let body: Option<StatusResponse> = response.json().await.ok();
    let message = body.as_ref().and_then(|b| b.message.clone());

    let reported_error = body
        .as_ref()
        .and_then(|b| b.status.as_deref())
        .is_some_and(|s| s == "error");

    if !status.is_success() || reported_error {
        return Err(PhishError::Api(format!(
            "{}: {}",
            status.as_u16(),
            message.unwrap_or_else(|| "request failed".to_string())
        )));
    }
    Ok(())
}
