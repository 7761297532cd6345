//! One-shot loopback listener that captures the identity provider's
//! redirect back to the app.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::RawQuery;
use reqwest::Url;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

/// How long to wait for the user to finish signing in.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("redirect URI {0} is not a loopback http address")]
    NotLoopback(String),
    #[error("callback server error: {0}")]
    Server(String),
    #[error("timeout waiting for sign-in callback")]
    Timeout,
}

pub struct CallbackServer {
    rx: oneshot::Receiver<String>,
    handle: JoinHandle<()>,
}

impl CallbackServer {
    /// Listen on the redirect URI's port and path. Bind before navigating
    /// away so the redirect cannot arrive first.
    pub async fn bind(redirect_uri: &str) -> Result<Self, CallbackError> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| CallbackError::Server(format!("invalid redirect URI: {e}")))?;
        let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1"));
        if url.scheme() != "http" || !loopback {
            return Err(CallbackError::NotLoopback(redirect_uri.to_string()));
        }
        let port = url
            .port_or_known_default()
            .ok_or_else(|| CallbackError::NotLoopback(redirect_uri.to_string()))?;

        let mut base = url.clone();
        base.set_query(None);
        base.set_fragment(None);
        let base = base.to_string();

        let (tx, rx) = oneshot::channel::<String>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let app = axum::Router::new().route(
            url.path(),
            axum::routing::get(move |RawQuery(query): RawQuery| {
                let tx = tx.clone();
                let base = base.clone();
                async move {
                    if let Some(sender) = tx.lock().await.take() {
                        let return_url = match query {
                            Some(q) => format!("{base}?{q}"),
                            None => base,
                        };
                        let _ = sender.send(return_url);
                    }
                    axum::response::Html(
                        "<html><body><h1>Sign-in complete</h1>\
                         <p>You can close this window and return to the terminal.</p>\
                         <script>window.close()</script></body></html>",
                    )
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}"))
            .await
            .map_err(|e| CallbackError::Server(format!("failed to bind port {port}: {e}")))?;

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(tokio::time::sleep(CALLBACK_TIMEOUT))
                .await
                .ok();
        });

        info!("Waiting for sign-in callback on port {}", port);
        Ok(Self { rx, handle })
    }

    /// Full return URL, query included.
    pub async fn wait(self) -> Result<String, CallbackError> {
        let result = tokio::time::timeout(CALLBACK_TIMEOUT, self.rx).await;
        self.handle.abort();
        result
            .map_err(|_| CallbackError::Timeout)?
            .map_err(|_| CallbackError::Server("callback channel closed".to_string()))
    }
}

/// Query parameters of a return URL, for reporting.
pub fn query_params(url: &str) -> HashMap<String, String> {
    Url::parse(url)
        .map(|u| u.query_pairs().into_owned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_loopback_redirect() {
        let result = CallbackServer::bind("https://rym.example/callback").await;
        assert!(matches!(result, Err(CallbackError::NotLoopback(_))));
    }

    #[test]
    fn query_params_of_return_url() {
        let params = query_params("http://localhost:5173/callback?code=abc&state=1");
        assert_eq!(params.get("code").map(String::as_str), Some("abc"));
        assert!(query_params("not a url").is_empty());
    }
}
