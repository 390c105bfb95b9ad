// HTTP client utilities
use crate::domain::error::PhishError;
use crate::infrastructure::config::ServiceConfig;
use reqwest::Client;

/// Create the shared HTTP client for the scoring service
pub fn create_client(service: &ServiceConfig) -> Result<Client, PhishError> {
    let mut builder = Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .timeout(service.timeout())
        .user_agent(service.user_agent.as_str());

    if let Some(proxy) = service.http_proxy.as_deref().filter(|p| !p.is_empty()) {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}
