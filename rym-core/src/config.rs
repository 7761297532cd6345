//! Remote runtime configuration, fetched once per process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use tracing::{info, warn};

use crate::api::{ApiRequest, Transport};
use crate::error::ClientError;

/// Runtime configuration served next to the application (`config.json`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    #[serde(alias = "api_base_url")]
    pub api_base_url: String,
    /// Identity provider host, e.g. `myapp.auth.eu-west-3.amazoncognito.com`.
    #[serde(alias = "cognitoDomain", alias = "authDomain", alias = "auth_domain")]
    pub identity_domain: String,
    #[serde(alias = "cognitoClientId", alias = "client_id")]
    pub client_id: String,
    #[serde(alias = "redirect_uri")]
    pub redirect_uri: String,
    #[serde(alias = "logoutUri", alias = "logout_redirect_uri", alias = "logout_uri")]
    pub logout_redirect_uri: String,
}

impl RuntimeConfig {
    /// Identity provider origin with a scheme, without a trailing slash.
    pub fn identity_origin(&self) -> String {
        let domain = self.identity_domain.trim().trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        }
    }
}

type ConfigFuture = Shared<BoxFuture<'static, Result<Arc<RuntimeConfig>, String>>>;

/// Memoized `RuntimeConfig` loader.
///
/// Concurrent callers share one in-flight request. Success is cached for
/// the lifetime of the provider; a failure is handed to every waiter and
/// then forgotten, so a later call fetches again.
pub struct ConfigProvider {
    transport: Arc<dyn Transport>,
    config_url: String,
    slot: Mutex<Option<(u64, ConfigFuture)>>,
    attempts: AtomicU64,
}

impl ConfigProvider {
    pub fn new(transport: Arc<dyn Transport>, config_url: impl Into<String>) -> Self {
        Self {
            transport,
            config_url: config_url.into(),
            slot: Mutex::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    /// A provider that never touches the network.
    pub fn preloaded(transport: Arc<dyn Transport>, config: RuntimeConfig) -> Self {
        let ready: ConfigFuture = futures::future::ready(Ok(Arc::new(config)))
            .boxed()
            .shared();
        Self {
            transport,
            config_url: String::new(),
            slot: Mutex::new(Some((0, ready))),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn config_url(&self) -> &str {
        &self.config_url
    }

    pub async fn get(&self) -> Result<Arc<RuntimeConfig>, ClientError> {
        let (attempt, fut) = {
            let mut slot = self.slot.lock().unwrap();
            match slot.as_ref() {
                Some((attempt, fut)) => (*attempt, fut.clone()),
                None => {
                    let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
                    let fut = fetch_config(self.transport.clone(), self.config_url.clone())
                        .boxed()
                        .shared();
                    *slot = Some((attempt, fut.clone()));
                    (attempt, fut)
                }
            }
        };

        match fut.await {
            Ok(config) => Ok(config),
            Err(message) => {
                let mut slot = self.slot.lock().unwrap();
                if matches!(slot.as_ref(), Some((current, _)) if *current == attempt) {
                    *slot = None;
                }
                Err(ClientError::ConfigUnavailable(message))
            }
        }
    }
}

async fn fetch_config(
    transport: Arc<dyn Transport>,
    url: String,
) -> Result<Arc<RuntimeConfig>, String> {
    info!("Fetching runtime configuration from {}", url);

    let resp = transport
        .send(ApiRequest::get(url.clone()))
        .await
        .map_err(|e| {
            warn!("Runtime configuration fetch failed: {e}");
            e.to_string()
        })?;

    if !resp.is_success() {
        warn!("Runtime configuration fetch failed: HTTP {}", resp.status);
        return Err(format!("HTTP {}", resp.status));
    }

    let config: RuntimeConfig = serde_json::from_str(&resp.body).map_err(|e| {
        warn!("Runtime configuration is malformed: {e}");
        format!("malformed configuration: {e}")
    })?;

    info!("Runtime configuration loaded (api: {})", config.api_base_url);
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_config() {
        let json = r#"{
            "apiBaseUrl": "https://api.example/prod/",
            "cognitoDomain": "rym.auth.eu-west-3.amazoncognito.com",
            "cognitoClientId": "client-123",
            "redirectUri": "http://localhost:5173/callback",
            "logoutUri": "http://localhost:5173/"
        }"#;
        let config: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.client_id, "client-123");
        assert_eq!(
            config.identity_origin(),
            "https://rym.auth.eu-west-3.amazoncognito.com"
        );
        assert_eq!(config.logout_redirect_uri, "http://localhost:5173/");
    }

    #[test]
    fn identity_origin_keeps_explicit_scheme() {
        let config = RuntimeConfig {
            api_base_url: "http://localhost:3000".to_string(),
            identity_domain: "http://localhost:9229/".to_string(),
            client_id: "c".to_string(),
            redirect_uri: "http://localhost:5173/callback".to_string(),
            logout_redirect_uri: "http://localhost:5173/".to_string(),
        };
        assert_eq!(config.identity_origin(), "http://localhost:9229");
    }
}
