//! HTTP restart notifier: token login followed by a config reload.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;

use mirrorwatch_core::types::Credentials;
use mirrorwatch_sync::{NotifyError, RestartNotifier};

pub const LOGIN_PATH: &str = "/api/v1/token/login";
pub const RELOAD_PATH: &str = "/api/v1/reload_config";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Reloads a service through its REST API.
///
/// Every request shares one agent whose timeout bounds the whole call.
#[derive(Debug, Clone)]
pub struct HttpRestartNotifier {
    agent: ureq::Agent,
}

impl HttpRestartNotifier {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent }
    }

    fn login(&self, target: &str, credentials: &Credentials) -> Result<String, NotifyError> {
        let url = endpoint(target, LOGIN_PATH);
        let response = self
            .agent
            .post(&url)
            .set("Authorization", &basic_auth(credentials))
            .call()
            .map_err(|err| request_error(&url, err))?;
        let body: LoginResponse = response
            .into_json()
            .map_err(|err| NotifyError::Transport {
                url: url.clone(),
                message: format!("unreadable login response: {err}"),
            })?;
        Ok(body.access_token)
    }

    fn reload(&self, target: &str, token: Option<&str>) -> Result<(), NotifyError> {
        let url = endpoint(target, RELOAD_PATH);
        let mut request = self.agent.post(&url);
        if let Some(token) = token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        let response = request.call().map_err(|err| request_error(&url, err))?;
        match response.status() {
            200 => Ok(()),
            status => Err(NotifyError::Status { url, status }),
        }
    }
}

impl RestartNotifier for HttpRestartNotifier {
    fn notify(&self, target: &str, credentials: &Credentials) -> Result<(), NotifyError> {
        let token = match self.login(target, credentials) {
            Ok(token) => Some(token),
            Err(err) => {
                tracing::warn!(target_url = %target, error = %err, "login failed, reloading without token");
                None
            }
        };
        self.reload(target, token.as_deref())?;
        tracing::info!(target_url = %target, "service reload confirmed");
        Ok(())
    }
}

fn endpoint(target: &str, path: &str) -> String {
    format!("{}{path}", target.trim_end_matches('/'))
}

fn basic_auth(credentials: &Credentials) -> String {
    let raw = format!("{}:{}", credentials.username, credentials.password);
    format!("Basic {}", STANDARD.encode(raw))
}

fn request_error(url: &str, err: ureq::Error) -> NotifyError {
    match err {
        ureq::Error::Status(status, _) => NotifyError::Status {
            url: url.to_string(),
            status,
        },
        ureq::Error::Transport(transport) => NotifyError::Transport {
            url: url.to_string(),
            message: transport.to_string(),
        },
    }
}
