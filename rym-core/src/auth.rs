//! Redirect-based sign-in with the identity provider.
//!
//! Authorization code grant with the exchange done by the backend
//! (`GET /auth/callback?code=...`), so no client secret or PKCE verifier
//! lives on the client. The flow:
//!
//! 1. `begin_login()` navigates to the provider's login page. That is the
//!    last thing this instance does; the provider sends the user back to
//!    the configured redirect URI.
//! 2. A fresh instance is handed the return URL via `handle_redirect()`,
//!    exchanges the code once and stores the resulting credential.
//! 3. `begin_logout()` clears the credential and navigates to the
//!    provider's logout endpoint.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use reqwest::Url;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::models::TokenResponse;
use crate::api::ApiClient;
use crate::config::RuntimeConfig;
use crate::credentials::{Credential, CredentialStore, StorageError};
use crate::error::ClientError;

/// Scopes requested at login.
pub const LOGIN_SCOPES: &str = "openid profile email";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    AwaitingRedirect,
    ExchangingCode,
    Authenticated,
    Failed(String),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("credential storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to open {url}: {reason}")]
    Navigation { url: String, reason: String },
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Moves the user agent to another page.
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str) -> Result<(), AuthError>;
}

/// Opens URLs in the system browser.
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&self, url: &str) -> Result<(), AuthError> {
        open::that(url).map_err(|e| AuthError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Provider login page for `config`.
pub fn authorize_url(config: &RuntimeConfig) -> Result<String, AuthError> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("response_type", "code"),
        ("scope", LOGIN_SCOPES),
        ("redirect_uri", config.redirect_uri.as_str()),
    ];
    let query = serde_urlencoded::to_string(params).map_err(|e| AuthError::InvalidUrl {
        url: config.identity_origin(),
        reason: format!("failed to encode params: {e}"),
    })?;
    Ok(format!("{}/login?{}", config.identity_origin(), query))
}

/// Provider logout endpoint, returning to the configured post-logout page.
pub fn logout_url(config: &RuntimeConfig) -> Result<String, AuthError> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("logout_uri", config.logout_redirect_uri.as_str()),
    ];
    let query = serde_urlencoded::to_string(params).map_err(|e| AuthError::InvalidUrl {
        url: config.identity_origin(),
        reason: format!("failed to encode params: {e}"),
    })?;
    Ok(format!("{}/logout?{}", config.identity_origin(), query))
}

/// Application home: the origin the redirect URI belongs to.
pub fn home_url(redirect_uri: &str) -> Result<String, AuthError> {
    let url = Url::parse(redirect_uri).map_err(|e| AuthError::InvalidUrl {
        url: redirect_uri.to_string(),
        reason: e.to_string(),
    })?;
    Ok(format!("{}/", url.origin().ascii_serialization()))
}

fn query_params(url: &str) -> Option<HashMap<String, String>> {
    let parsed = Url::parse(url).ok()?;
    Some(parsed.query_pairs().into_owned().collect())
}

/// Turn the relayed token response into a credential.
fn credential_from(tokens: TokenResponse) -> Result<Credential, String> {
    if let Some(error) = tokens.error {
        return Err(tokens.error_description.unwrap_or(error));
    }
    match tokens.access_token {
        Some(access) if !access.is_empty() => Ok(Credential {
            id_token: tokens.id_token,
            access_token: Some(access),
            refresh_token: tokens.refresh_token,
        }),
        _ => Err("token response has no access token".to_string()),
    }
}

pub struct AuthFlow {
    api: ApiClient,
    credentials: Arc<CredentialStore>,
    navigator: Arc<dyn Navigator>,
    state: Mutex<AuthState>,
    consumed_codes: Mutex<HashSet<String>>,
}

impl AuthFlow {
    pub fn new(
        api: ApiClient,
        credentials: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            api,
            credentials,
            navigator,
            state: Mutex::new(AuthState::Idle),
            consumed_codes: Mutex::new(HashSet::new()),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.lock().unwrap().clone()
    }

    fn set_state(&self, state: AuthState) -> AuthState {
        *self.state.lock().unwrap() = state.clone();
        state
    }

    /// Navigate to the provider's login page. Returns the URL navigated to.
    pub async fn begin_login(&self) -> Result<String, AuthError> {
        let config = self.api.config().get().await?;
        let url = authorize_url(&config)?;

        info!("Redirecting to identity provider for login");
        self.navigator.navigate(&url)?;
        self.set_state(AuthState::AwaitingRedirect);
        Ok(url)
    }

    /// Complete a login from the URL the provider redirected back to.
    ///
    /// A URL without a code leaves the state unchanged. A code is
    /// exchanged at most once per instance, whatever the outcome.
    pub async fn handle_redirect(&self, return_url: &str) -> AuthState {
        let Some(params) = query_params(return_url) else {
            warn!("Ignoring unparseable return URL");
            return self.state();
        };

        if let Some(error) = params.get("error") {
            let description = params
                .get("error_description")
                .cloned()
                .unwrap_or_else(|| error.clone());
            warn!("Identity provider returned an error: {}", description);
            return self.set_state(AuthState::Failed(description));
        }

        let code = match params.get("code") {
            Some(code) if !code.is_empty() => code.clone(),
            _ => return self.state(),
        };

        if !self.consumed_codes.lock().unwrap().insert(code.clone()) {
            warn!("Authorization code already used, not exchanging it again");
            return self.state();
        }

        self.set_state(AuthState::ExchangingCode);
        info!("Received authorization code, exchanging for tokens");

        let credential = match self.api.exchange_code(&code).await {
            Ok(tokens) => credential_from(tokens),
            Err(e) => Err(e.to_string()),
        };
        let credential = match credential {
            Ok(credential) => credential,
            Err(reason) => {
                warn!("Code exchange failed: {}", reason);
                return self.set_state(AuthState::Failed(reason));
            }
        };

        if let Err(e) = self.credentials.set(&credential) {
            warn!("Failed to store credential: {}", e);
            return self.set_state(AuthState::Failed(e.to_string()));
        }

        info!("Signed in");
        let state = self.set_state(AuthState::Authenticated);
        self.go_home().await;
        state
    }

    async fn go_home(&self) {
        let home = match self.api.config().get().await {
            Ok(config) => home_url(&config.redirect_uri),
            Err(e) => Err(AuthError::Client(e)),
        };
        match home.and_then(|url| self.navigator.navigate(&url)) {
            Ok(()) => {}
            Err(e) => warn!("Could not return to home page: {}", e),
        }
    }

    /// Clear the credential and navigate to the provider's logout endpoint.
    pub async fn begin_logout(&self) -> Result<String, AuthError> {
        self.credentials.clear()?;
        self.set_state(AuthState::Idle);

        let config = self.api.config().get().await?;
        let url = logout_url(&config)?;
        info!("Redirecting to identity provider for logout");
        self.navigator.navigate(&url)?;
        Ok(url)
    }
}
