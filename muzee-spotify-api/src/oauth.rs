use crate::error::SpotifyError;
use axum::{extract::Query, response::Html, routing::get, Router};
use muzee_core::{SpotifyConfig, StoredTokens};
use rspotify::{prelude::*, AuthCodeSpotify, Credentials, OAuth};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(600);

const DEFAULT_CALLBACK_PORT: u16 = 8888;

/// Result of a completed login: who the user is and the tokens to store.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub spotify_id: String,
    pub username: String,
    pub tokens: StoredTokens,
}

/// Interactive authorization-code login for a new or returning user
pub struct SpotifyLogin {
    client: AuthCodeSpotify,
}

impl SpotifyLogin {
    #[must_use]
    pub fn new(config: &SpotifyConfig) -> Self {
        let creds = Credentials::new(&config.client_id, &config.client_secret);

        let oauth = OAuth {
            redirect_uri: config.oauth_redirect_uri.clone(),
            scopes: config.scopes.iter().cloned().collect(),
            ..Default::default()
        };

        Self {
            client: AuthCodeSpotify::new(creds, oauth),
        }
    }

    /// Get the authorization URL for the user to visit
    ///
    /// # Errors
    ///
    /// Returns an error if the authorization URL cannot be generated.
    pub fn get_authorize_url(&self) -> Result<String, SpotifyError> {
        self.client
            .get_authorize_url(false)
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Failed to generate auth URL: {e}"),
            })
    }

    /// Exchange the callback code and look up the user's profile
    ///
    /// # Errors
    ///
    /// Returns an error if the token exchange or the profile lookup fails, or
    /// if Spotify did not issue a refresh token.
    pub async fn handle_callback(&self, code: &str) -> Result<LoginOutcome, SpotifyError> {
        self.client
            .request_token(code)
            .await
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Token exchange failed: {e}"),
            })?;

        let tokens = {
            let guard = self
                .client
                .token
                .lock()
                .await
                .map_err(|_| SpotifyError::AuthFailed {
                    reason: "Failed to acquire token lock".to_string(),
                })?;
            let token = guard.as_ref().ok_or_else(|| SpotifyError::AuthFailed {
                reason: "No token after code exchange".to_string(),
            })?;
            StoredTokens {
                access_token: token.access_token.clone(),
                refresh_token: token.refresh_token.clone().ok_or_else(|| {
                    SpotifyError::AuthFailed {
                        reason: "Spotify did not issue a refresh token".to_string(),
                    }
                })?,
            }
        };

        let me = self
            .client
            .me()
            .await
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Profile lookup failed: {e}"),
            })?;

        let spotify_id = me.id.id().to_string();
        let username = me.display_name.unwrap_or_else(|| spotify_id.clone());

        info!("Successfully authenticated {} with Spotify", spotify_id);
        Ok(LoginOutcome {
            spotify_id,
            username,
            tokens,
        })
    }

    /// Run the browser login: serve the redirect URI locally, open the consent
    /// page and exchange the code Spotify sends back.
    ///
    /// # Errors
    ///
    /// Returns [`SpotifyError::AuthFailed`] if the callback server cannot bind,
    /// the user denies access, no callback arrives within ten minutes, or the
    /// code exchange fails.
    pub async fn authenticate_interactive(&self) -> Result<LoginOutcome, SpotifyError> {
        let target = RedirectTarget::parse(&self.client.oauth.redirect_uri)?;
        let addr = target.bind_addr()?;
        let listener =
            TcpListener::bind(addr)
                .await
                .map_err(|e| SpotifyError::AuthFailed {
                    reason: format!("Failed to bind to {addr}: {e}"),
                })?;

        let (tx, rx) = oneshot::channel();
        let tx: CallbackSender = Arc::new(Mutex::new(Some(tx)));
        let app = Router::new().route(
            &target.path,
            get(move |Query(params): Query<CallbackParams>| receive_callback(params, tx.clone())),
        );

        let auth_url = self.get_authorize_url()?;
        if let Err(e) = open::that(&auth_url) {
            warn!("Could not open a browser ({}), visit this URL to log in:\n{}", e, auth_url);
        }
        info!("Waiting for Spotify to redirect to http://{}{}", addr, target.path);

        let code = tokio::select! {
            outcome = rx => match outcome {
                Ok(Ok(code)) => code,
                Ok(Err(reason)) => {
                    return Err(SpotifyError::AuthFailed {
                        reason: format!("Spotify login was not completed: {reason}"),
                    })
                }
                Err(_) => {
                    return Err(SpotifyError::AuthFailed {
                        reason: "Callback handler went away".into(),
                    })
                }
            },
            _ = axum::serve(listener, app) => {
                return Err(SpotifyError::AuthFailed {
                    reason: "Callback server stopped".into(),
                })
            }
            () = tokio::time::sleep(CALLBACK_TIMEOUT) => {
                return Err(SpotifyError::AuthFailed {
                    reason: format!(
                        "No login callback within {} minutes",
                        CALLBACK_TIMEOUT.as_secs() / 60
                    ),
                })
            }
        };

        info!("Received authorization code");
        self.handle_callback(&code).await
    }
}

/// Host, port and path Spotify redirects the browser to after consent.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RedirectTarget {
    host: String,
    port: u16,
    path: String,
}

impl RedirectTarget {
    fn parse(redirect_uri: &str) -> Result<Self, SpotifyError> {
        let url = url::Url::parse(redirect_uri).map_err(|e| SpotifyError::AuthFailed {
            reason: format!("Invalid redirect URI {redirect_uri}: {e}"),
        })?;

        Ok(Self {
            host: url.host_str().unwrap_or("127.0.0.1").to_string(),
            port: url.port().unwrap_or(DEFAULT_CALLBACK_PORT),
            path: url.path().to_string(),
        })
    }

    /// Loopback address to listen on; `localhost` binds IPv4 loopback.
    fn bind_addr(&self) -> Result<SocketAddr, SpotifyError> {
        let host = if self.host == "localhost" {
            "127.0.0.1"
        } else {
            self.host.as_str()
        };
        format!("{host}:{}", self.port)
            .parse()
            .map_err(|e| SpotifyError::AuthFailed {
                reason: format!("Redirect host {} is not a local address: {e}", self.host),
            })
    }
}

/// Authorization code, or the reason the browser came back without one.
type CallbackOutcome = std::result::Result<String, String>;

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>;

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

/// Forward the first callback to the waiting login and render a page for it.
async fn receive_callback(params: CallbackParams, tx: CallbackSender) -> Html<String> {
    let (outcome, page) = match (params.code, params.error) {
        (Some(code), _) => (
            Ok(code),
            callback_page(
                "🎧 Muzee is connected to Spotify",
                "You can close this window and return to the terminal.",
            ),
        ),
        (None, Some(error)) => {
            let error: String = error
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            let page = callback_page("Login cancelled", &format!("Spotify answered: {error}"));
            (Err(error), page)
        }
        (None, None) => (
            Err("callback carried no code".to_string()),
            callback_page("Login failed", "Spotify did not send an authorization code."),
        ),
    };

    if let Some(sender) = tx.lock().await.take() {
        let _ = sender.send(outcome);
    }
    Html(page)
}

fn callback_page(heading: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Muzee</title></head>
<body style="font-family: sans-serif; text-align: center; padding: 50px; background: #191414; color: white;">
    <h1>{heading}</h1>
    <p>{message}</p>
</body>
</html>"#
    )
}
