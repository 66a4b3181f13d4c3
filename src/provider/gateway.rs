use reqwest::Url;
use std::sync::{Arc, OnceLock};
use tracing::{error, info};

use crate::config::ProviderConfig;
use crate::error::{AppError, AppResult};
use crate::provider::{JsonRpcProvider, SharedProvider};

/// One-shot detection of the injected wallet transport.
///
/// The first call to [`ProviderGateway::detect`] decides; later calls return
/// the same provider (or the same failure) without looking again.
#[derive(Default)]
pub struct ProviderGateway {
    detection: OnceLock<Result<SharedProvider, String>>,
}

impl ProviderGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway whose detection already produced `provider`.
    pub fn with_provider(provider: SharedProvider) -> Self {
        let gateway = Self::new();
        let _ = gateway.detection.set(Ok(provider));
        gateway
    }

    pub fn detect(&self, config: &ProviderConfig) -> AppResult<SharedProvider> {
        self.detection
            .get_or_init(|| inspect(config).map_err(|e| e.to_string()))
            .clone()
            .map_err(AppError::NoProvider)
    }

    /// Provider from a previous successful detection.
    pub fn provider(&self) -> Option<SharedProvider> {
        match self.detection.get() {
            Some(Ok(provider)) => Some(provider.clone()),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.provider().is_some()
    }
}

fn inspect(config: &ProviderConfig) -> Result<SharedProvider, String> {
    let raw = config
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| {
            error!("No wallet provider injected (provider.url is not set)");
            "no provider endpoint injected".to_string()
        })?;

    let url = Url::parse(raw).map_err(|e| {
        error!("Injected provider url {} is invalid: {}", raw, e);
        format!("invalid provider url: {}", e)
    })?;

    let provider = JsonRpcProvider::new(url.as_str(), config.receipt_poll_interval())
        .map_err(|e| format!("failed to create provider: {}", e))?;
    info!("Wallet provider detected at {}", provider.url());
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            url: url.map(str::to_string),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn missing_url_means_no_provider() {
        let gateway = ProviderGateway::new();
        let err = gateway.detect(&config(None)).err().unwrap();
        assert!(matches!(err, AppError::NoProvider(_)));
        assert!(!gateway.is_available());
    }

    #[test]
    fn blank_or_malformed_url_means_no_provider() {
        assert!(ProviderGateway::new().detect(&config(Some("   "))).is_err());
        assert!(ProviderGateway::new().detect(&config(Some("not a url"))).is_err());
    }

    #[test]
    fn detection_runs_once() {
        let gateway = ProviderGateway::new();
        assert!(gateway.detect(&config(None)).is_err());
        // A later, valid config does not trigger a second look.
        assert!(gateway.detect(&config(Some("http://127.0.0.1:8545"))).is_err());
    }

    #[test]
    fn detected_provider_is_shared() {
        let gateway = ProviderGateway::new();
        let first = gateway.detect(&config(Some("http://127.0.0.1:8545"))).unwrap();
        let second = gateway.detect(&config(None)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.describe().contains("127.0.0.1:8545"));
    }
}
