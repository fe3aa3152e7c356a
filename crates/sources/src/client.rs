use std::sync::Once;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::error::SourceError;

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Request timeout applied to every call against the watched sites.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Make aws-lc-rs the process-wide rustls provider. Safe to call repeatedly.
pub fn install_rustls_provider() {
    static INSTALLED: Once = Once::new();
    INSTALLED.call_once(|| {
        // Fails only when some other component installed a provider first.
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            debug!("A rustls crypto provider was already installed");
        }
    });
}

/// Client builder preconfigured with the user agent and timeout shared by all sources.
pub fn create_client_builder() -> reqwest::ClientBuilder {
    install_rustls_provider();

    Client::builder()
        .user_agent(DEFAULT_UA)
        .timeout(DEFAULT_TIMEOUT)
        .pool_max_idle_per_host(4)
}

pub fn default_client() -> Result<Client, SourceError> {
    create_client_builder()
        .build()
        .map_err(|e| SourceError::unavailable(format!("failed to create HTTP client: {}", e)))
}
