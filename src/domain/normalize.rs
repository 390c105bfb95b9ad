// URL normalization for cache, rate-limit and queue keys
use crate::domain::error::PhishError;
use url::Url;

/// Canonical form of an absolute web URL.
///
/// Scheme and host are lowercased, default ports and fragments dropped, and
/// an empty path becomes `/`, so every spelling of one resource maps to the
/// same key. Anything that is not an absolute `http`/`https` URL is rejected.
pub fn normalize_url(raw: &str) -> Result<String, PhishError> {
    let trimmed = raw.trim();
    let mut parsed =
        Url::parse(trimmed).map_err(|e| PhishError::InvalidUrl(format!("{:?}: {}", trimmed, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(PhishError::InvalidUrl(format!(
                "{:?}: unsupported scheme {}",
                trimmed, other
            )))
        }
    }

    parsed.set_fragment(None);
    Ok(parsed.into())
}
