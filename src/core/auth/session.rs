// ─── Device code sign-in ───
// idle → device code issued → polling → authenticated | failed

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::error::{AuthStep, LauncherError, LauncherResult};

pub const SCOPE_SIGNIN: &str = "XboxLive.signin";
pub const SCOPE_OFFLINE: &str = "XboxLive.offline_access";
pub const REQUIRED_SCOPES: [&str; 2] = [SCOPE_SIGNIN, SCOPE_OFFLINE];

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
/// Added to the poll interval on `slow_down`.
const SLOW_DOWN_STEP: u64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthPhase {
    Idle,
    DeviceCodeIssued,
    Polling,
    Authenticated,
    Failed(String),
}

/// What the user needs to finish signing in on another device.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCode {
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
    device_code: String,
}

fn default_expires_in() -> u64 {
    900
}

fn default_interval() -> u64 {
    5
}

/// Federated Microsoft token granted by the device flow.
#[derive(Debug, Clone)]
pub struct MsaToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl MsaToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    scope: String,
}

#[derive(Deserialize)]
struct TokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// One device code sign-in. The result is handed out once by
/// [`AuthSession::auth_result`] and then discarded.
pub struct AuthSession {
    client: reqwest::Client,
    client_id: String,
    authority: String,
    phase: Arc<Mutex<AuthPhase>>,
    device_code: Option<DeviceCode>,
    poll: tokio::sync::Mutex<Option<JoinHandle<LauncherResult<MsaToken>>>>,
}

impl AuthSession {
    /// `authority` is the tenant base, e.g. `https://login.microsoftonline.com/consumers`.
    pub fn new(client: reqwest::Client, client_id: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            authority: authority.into().trim_end_matches('/').to_string(),
            phase: Arc::new(Mutex::new(AuthPhase::Idle)),
            device_code: None,
            poll: tokio::sync::Mutex::new(None),
        }
    }

    /// Request a device code and start polling for the token in the background.
    pub async fn start_login(&mut self) -> LauncherResult<DeviceCode> {
        if let Some(previous) = self.poll.get_mut().take() {
            debug!("Abandoning the previous sign-in poll");
            previous.abort();
        }
        self.device_code = None;
        set_phase(&self.phase, AuthPhase::Idle);

        let url = format!("{}/oauth2/v2.0/devicecode", self.authority);
        let scope = REQUIRED_SCOPES.join(" ");
        let response = self
            .client
            .post(&url)
            .form(&[("client_id", self.client_id.as_str()), ("scope", scope.as_str())])
            .send()
            .await
            .map_err(|e| device_code_failed(&self.phase, e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(device_code_failed(
                &self.phase,
                format!("HTTP {}: {}", status, body),
            ));
        }
        let code: DeviceCode = response
            .json()
            .await
            .map_err(|e| device_code_failed(&self.phase, e.to_string()))?;
        info!("Device code issued, visit {}", code.verification_uri);

        set_phase(&self.phase, AuthPhase::DeviceCodeIssued);
        self.device_code = Some(code.clone());

        let poller = TokenPoller {
            client: self.client.clone(),
            token_url: format!("{}/oauth2/v2.0/token", self.authority),
            client_id: self.client_id.clone(),
            device_code: code.device_code.clone(),
            interval: code.interval,
            expires_in: code.expires_in,
        };
        let phase = Arc::clone(&self.phase);
        let handle = tokio::spawn(async move {
            set_phase(&phase, AuthPhase::Polling);
            let result = poller.poll().await.and_then(check_scopes);
            match &result {
                Ok(_) => set_phase(&phase, AuthPhase::Authenticated),
                Err(e) => set_phase(&phase, AuthPhase::Failed(e.to_string())),
            }
            result
        });
        *self.poll.lock().await = Some(handle);
        Ok(code)
    }

    pub fn device_code(&self) -> Option<&DeviceCode> {
        self.device_code.as_ref()
    }

    /// Non-blocking view of the session.
    pub fn state(&self) -> AuthPhase {
        lock(&self.phase).clone()
    }

    /// Wait for the background poll and take its result.
    pub async fn auth_result(&self) -> LauncherResult<MsaToken> {
        let handle = self
            .poll
            .lock()
            .await
            .take()
            .ok_or(LauncherError::NotReady("no sign-in in progress"))?;
        handle
            .await
            .map_err(|e| LauncherError::auth(AuthStep::TokenPoll, e.to_string()))?
    }
}

struct TokenPoller {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    device_code: String,
    interval: u64,
    expires_in: u64,
}

impl TokenPoller {
    async fn poll(self) -> LauncherResult<MsaToken> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.expires_in);
        let mut interval = self.interval;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(LauncherError::auth(AuthStep::TokenPoll, "device code expired"));
            }
            tokio::time::sleep(Duration::from_secs(interval)).await;

            let response = self
                .client
                .post(&self.token_url)
                .form(&[
                    ("client_id", self.client_id.as_str()),
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("device_code", self.device_code.as_str()),
                ])
                .send()
                .await
                .map_err(|e| LauncherError::auth(AuthStep::TokenPoll, e.to_string()))?;

            if response.status().is_success() {
                let token: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| LauncherError::auth(AuthStep::TokenPoll, e.to_string()))?;
                return Ok(MsaToken {
                    access_token: token.access_token,
                    refresh_token: token.refresh_token,
                    expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
                    scopes: token.scope.split_whitespace().map(str::to_string).collect(),
                });
            }

            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let Ok(err) = serde_json::from_str::<TokenError>(&body) else {
                return Err(LauncherError::auth(
                    AuthStep::TokenPoll,
                    format!("HTTP {}: {}", status, body),
                ));
            };
            match err.error.as_str() {
                "authorization_pending" => {
                    debug!("Waiting for the user to sign in");
                }
                "slow_down" => {
                    interval += SLOW_DOWN_STEP;
                    debug!("Token endpoint asked to slow down, interval now {}s", interval);
                }
                other => {
                    return Err(LauncherError::auth(
                        AuthStep::TokenPoll,
                        format!(
                            "{}: {}",
                            other,
                            err.error_description.unwrap_or_default()
                        ),
                    ));
                }
            }
        }
    }
}

/// Fail closed unless both Xbox Live scopes were granted.
fn check_scopes(token: MsaToken) -> LauncherResult<MsaToken> {
    let missing: Vec<String> = REQUIRED_SCOPES
        .iter()
        .filter(|required| !token.scopes.iter().any(|s| s.eq_ignore_ascii_case(required)))
        .map(|s| s.to_string())
        .collect();
    if !missing.is_empty() {
        warn!("Sign-in granted {:?}, missing {:?}", token.scopes, missing);
        return Err(LauncherError::MissingScopes { missing });
    }
    Ok(token)
}

fn device_code_failed(phase: &Mutex<AuthPhase>, message: String) -> LauncherError {
    set_phase(phase, AuthPhase::Failed(message.clone()));
    LauncherError::auth(AuthStep::DeviceCode, message)
}

fn lock(phase: &Mutex<AuthPhase>) -> MutexGuard<'_, AuthPhase> {
    phase.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_phase(phase: &Mutex<AuthPhase>, next: AuthPhase) {
    *lock(phase) = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token(scopes: &[&str]) -> MsaToken {
        MsaToken {
            access_token: "t".into(),
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::hours(1),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn both_scopes_are_required() {
        assert!(check_scopes(token(&["XboxLive.signin", "XboxLive.offline_access", "openid"])).is_ok());
        match check_scopes(token(&["XboxLive.signin"])) {
            Err(LauncherError::MissingScopes { missing }) => {
                assert_eq!(missing, vec!["XboxLive.offline_access".to_string()])
            }
            other => panic!("unexpected {:?}", other.map(|t| t.scopes)),
        }
    }

    #[test]
    fn scope_comparison_ignores_case() {
        assert!(check_scopes(token(&["xboxlive.signin", "xboxlive.offline_access"])).is_ok());
    }

    #[tokio::test]
    async fn result_without_login_is_not_ready() {
        let session = AuthSession::new(reqwest::Client::new(), "id", "http://127.0.0.1:9");
        assert_eq!(session.state(), AuthPhase::Idle);
        assert!(matches!(
            session.auth_result().await,
            Err(LauncherError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_authority_marks_the_session_failed() {
        let mut session = AuthSession::new(reqwest::Client::new(), "id", "http://127.0.0.1:9");
        let err = session.start_login().await.unwrap_err();
        assert!(matches!(
            err,
            LauncherError::AuthStep {
                step: AuthStep::DeviceCode,
                ..
            }
        ));
        assert!(matches!(session.state(), AuthPhase::Failed(_)));
    }

    #[tokio::test]
    async fn garbled_device_code_marks_the_session_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v2.0/devicecode"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let mut session = AuthSession::new(reqwest::Client::new(), "id", server.uri());
        assert!(session.start_login().await.is_err());
        assert!(matches!(session.state(), AuthPhase::Failed(_)));
        assert!(session.device_code().is_none());
    }

    #[tokio::test]
    async fn restarting_login_abandons_the_previous_poll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v2.0/devicecode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device_code": "dev-1",
                "user_code": "CODE",
                "verification_uri": "https://microsoft.com/link",
                "expires_in": 60,
                "interval": 1
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "authorization_pending"})),
            )
            .mount(&server)
            .await;

        let mut session = AuthSession::new(reqwest::Client::new(), "id", server.uri());
        session.start_login().await.unwrap();
        let first = session.poll.get_mut().as_ref().map(|h| h.abort_handle()).unwrap();
        session.start_login().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(first.is_finished());
        assert!(session.poll.get_mut().as_ref().is_some_and(|h| !h.is_finished()));
    }
}
