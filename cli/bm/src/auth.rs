//! Session acquisition.
//!
//! A stored token is tried first. If it is missing or rejected, the user is
//! prompted for credentials, with a bounded number of attempts. A transport
//! failure is never treated as a bad password.

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, Source};
use crate::error::{credential_problem, CliError, EndpointError};
use crate::prompt::Prompter;

/// Number of credential attempts before giving up.
pub const CREDENTIAL_ATTEMPTS: u32 = 3;

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
}

/// One credential attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub yubikey_otp: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("yubikey_otp", &self.yubikey_otp.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// The auth endpoint.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Check a stored token and return the session it belongs to.
    async fn authenticate_token(&self, token: &str) -> Result<Session, EndpointError>;

    /// Exchange credentials for a new session.
    async fn authenticate_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, EndpointError>;
}

#[derive(Debug)]
enum State {
    TokenAuth,
    CredentialRetry { attempts_left: u32 },
    Authenticated(Session),
    Failed(EndpointError),
}

/// Produces an authenticated session from the config store.
pub struct SessionAuthenticator<A, P> {
    client: A,
    prompter: P,
}

impl<A: AuthClient, P: Prompter> SessionAuthenticator<A, P> {
    pub fn new(client: A, prompter: P) -> Self {
        Self { client, prompter }
    }

    /// Authenticate, prompting for credentials if the stored token does not
    /// work. On success via credentials the new token is persisted.
    pub async fn ensure_auth(&mut self, store: &mut ConfigStore) -> Result<Session, CliError> {
        let mut state = State::TokenAuth;
        loop {
            state = match state {
                State::TokenAuth => self.token_auth(store).await?,
                State::CredentialRetry { attempts_left } => {
                    self.credential_attempt(store, attempts_left).await?
                }
                State::Authenticated(session) => {
                    info!(user = %session.username, "Authenticated");
                    return Ok(session);
                }
                State::Failed(err) => return Err(err.into()),
            };
        }
    }

    async fn token_auth(&self, store: &ConfigStore) -> Result<State, CliError> {
        let retry = State::CredentialRetry {
            attempts_left: CREDENTIAL_ATTEMPTS,
        };

        let token = store.get("token")?;
        if token.is_empty() {
            debug!("No stored token");
            return Ok(retry);
        }

        match self.client.authenticate_token(&token).await {
            Ok(session) => Ok(State::Authenticated(session)),
            Err(err) if err.is_transport() => Ok(State::Failed(err)),
            Err(err) => {
                debug!(error = %err, "Stored token rejected");
                Ok(retry)
            }
        }
    }

    async fn credential_attempt(
        &mut self,
        store: &mut ConfigStore,
        attempts_left: u32,
    ) -> Result<State, CliError> {
        let credentials = self.collect_credentials(store)?;

        let err = match self.client.authenticate_credentials(&credentials).await {
            Ok(session) => {
                // The token is already in the memo; a failed write only
                // means the next run logs in again.
                if let Err(err) = store.set_persistent("token", session.token.clone(), Source::Auth)
                {
                    warn!(error = %err, "Couldn't save session token");
                }
                return Ok(State::Authenticated(session));
            }
            Err(err) => err,
        };

        let attempts_left = attempts_left.saturating_sub(1);
        debug!(user = %credentials.username, attempts_left, error = %err, "Credential authentication failed");

        if credential_problem(&err).is_some() && attempts_left > 0 {
            for name in ["user", "pass", "yubikey-otp"] {
                store.set(name, "", Source::Invalid);
            }
            self.prompter
                .notify("Invalid credentials, please try again.");
            return Ok(State::CredentialRetry { attempts_left });
        }

        Ok(State::Failed(err))
    }

    fn collect_credentials(&mut self, store: &mut ConfigStore) -> Result<Credentials, CliError> {
        let username = self.require(store, "user", "User", false)?;
        let password = self.require(store, "pass", "Pass", true)?;
        let yubikey_otp = if store.get_bool("yubikey")? {
            Some(self.require(store, "yubikey-otp", "Press yubikey", true)?)
        } else {
            None
        };

        Ok(Credentials {
            username,
            password,
            yubikey_otp,
        })
    }

    fn require(
        &mut self,
        store: &mut ConfigStore,
        name: &str,
        label: &str,
        secret: bool,
    ) -> Result<String, CliError> {
        let stored = store.get(name)?;
        if !stored.is_empty() {
            return Ok(stored);
        }

        let mut value = String::new();
        while value.is_empty() {
            value = self
                .prompter
                .prompt(label, secret)
                .map_err(CliError::Prompt)?;
        }
        store.set(name, value.clone(), Source::Interaction);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, FlagSet};
    use crate::error::{classify, Endpoint};
    use crate::prompt::ScriptedPrompter;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct NoFlags;

    impl FlagSet for NoFlags {
        fn config_flags(&self) -> Vec<(&'static str, String)> {
            Vec::new()
        }
    }

    fn store(dir: &TempDir) -> ConfigStore {
        ConfigStore::open(dir.path().to_path_buf(), Environment::default(), &NoFlags).unwrap()
    }

    /// Auth endpoint double that records every credential attempt.
    struct FakeAuth {
        valid_token: Option<&'static str>,
        password: &'static str,
        token_error: Option<EndpointError>,
        credential_error: Option<EndpointError>,
        attempts: Mutex<Vec<Credentials>>,
    }

    impl FakeAuth {
        fn new() -> Self {
            Self {
                valid_token: Some("good-token"),
                password: "hunter2",
                token_error: None,
                credential_error: None,
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> Vec<Credentials> {
            self.attempts.lock().unwrap().clone()
        }
    }

    fn rejected(message: &str) -> EndpointError {
        EndpointError::NotAuthorized {
            endpoint: Endpoint::Auth,
            message: message.to_string(),
        }
    }

    #[async_trait]
    impl AuthClient for &FakeAuth {
        async fn authenticate_token(&self, token: &str) -> Result<Session, EndpointError> {
            if let Some(err) = &self.token_error {
                return Err(err.clone());
            }
            if Some(token) == self.valid_token {
                Ok(Session {
                    token: token.to_string(),
                    username: "alice".to_string(),
                })
            } else {
                Err(rejected("Token not found"))
            }
        }

        async fn authenticate_credentials(
            &self,
            credentials: &Credentials,
        ) -> Result<Session, EndpointError> {
            self.attempts.lock().unwrap().push(credentials.clone());
            if let Some(err) = &self.credential_error {
                return Err(err.clone());
            }
            if credentials.password == self.password {
                Ok(Session {
                    token: "fresh-token".to_string(),
                    username: credentials.username.clone(),
                })
            } else {
                Err(rejected("Bad login credentials"))
            }
        }
    }

    #[tokio::test]
    async fn test_valid_token_needs_no_prompts() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.set("token", "good-token", Source::Code);

        let auth = FakeAuth::new();
        let mut prompter = ScriptedPrompter::new(Vec::<&str>::new());
        let session = SessionAuthenticator::new(&auth, &mut prompter)
            .ensure_auth(&mut store)
            .await
            .unwrap();

        assert_eq!(session.token, "good-token");
        assert_eq!(prompter.prompts(), 0);
        assert!(auth.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_credentials_persist_new_token() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.set("token", "stale-token", Source::Code);

        let auth = FakeAuth::new();
        let mut prompter = ScriptedPrompter::new(["alice", "hunter2"]);
        let session = SessionAuthenticator::new(&auth, &mut prompter)
            .ensure_auth(&mut store)
            .await
            .unwrap();

        assert_eq!(session.token, "fresh-token");
        assert_eq!(prompter.prompts(), 2);

        let token = store.get_v("token").unwrap();
        assert_eq!(token.value, "fresh-token");
        assert_eq!(token.source, Source::Auth);
        assert_eq!(store.get_v("user").unwrap().source, Source::Interaction);

        let reopened = self::store(&dir);
        assert_eq!(reopened.get("token").unwrap(), "fresh-token");
    }

    #[tokio::test]
    async fn test_unsaved_token_still_authenticates() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("token")).unwrap();
        let mut store = store(&dir);
        store.set("token", "", Source::Code);

        let auth = FakeAuth::new();
        let mut prompter = ScriptedPrompter::new(["alice", "hunter2"]);
        let session = SessionAuthenticator::new(&auth, &mut prompter)
            .ensure_auth(&mut store)
            .await
            .unwrap();

        assert_eq!(session.token, "fresh-token");
        let token = store.get_v("token").unwrap();
        assert_eq!(token.value, "fresh-token");
        assert_eq!(token.source, Source::Auth);
        assert!(dir.path().join("token").is_dir());
    }

    #[tokio::test]
    async fn test_empty_prompt_answers_are_asked_again() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);

        let auth = FakeAuth::new();
        let mut prompter = ScriptedPrompter::new(["", "", "alice", "", "hunter2"]);
        SessionAuthenticator::new(&auth, &mut prompter)
            .ensure_auth(&mut store)
            .await
            .unwrap();

        assert_eq!(prompter.prompts(), 5);
        assert_eq!(auth.attempts()[0].username, "alice");
    }

    #[tokio::test]
    async fn test_wrong_credentials_give_up_after_three_attempts() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);

        let auth = FakeAuth::new();
        let mut prompter = ScriptedPrompter::new([
            "alice", "wrong1", "bob", "wrong2", "carol", "wrong3", "unused",
        ]);
        let err = SessionAuthenticator::new(&auth, &mut prompter)
            .ensure_auth(&mut store)
            .await
            .unwrap_err();

        let attempts = auth.attempts();
        assert_eq!(attempts.len(), CREDENTIAL_ATTEMPTS as usize);
        let users: Vec<&str> = attempts.iter().map(|c| c.username.as_str()).collect();
        assert_eq!(users, ["alice", "bob", "carol"]);
        assert_eq!(prompter.prompts(), 6);
        assert_eq!(prompter.notices(), 2);

        assert_eq!(classify(Some(&err)).code.code(), 54);
        assert!(store.get("token").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preset_user_is_cleared_after_rejection() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.set("user", "alice", Source::Flag("user".into()));
        store.set("pass", "wrong", Source::Flag("pass".into()));

        let auth = FakeAuth::new();
        let mut prompter = ScriptedPrompter::new(["alice", "hunter2"]);
        SessionAuthenticator::new(&auth, &mut prompter)
            .ensure_auth(&mut store)
            .await
            .unwrap();

        // First attempt used the flags without prompting; second re-prompted
        // for both fields.
        assert_eq!(auth.attempts().len(), 2);
        assert_eq!(prompter.prompts(), 2);
    }

    #[tokio::test]
    async fn test_fields_are_marked_invalid_between_attempts() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.set("yubikey-otp", "stale", Source::Code);

        let mut auth = FakeAuth::new();
        auth.credential_error = Some(rejected("Bad login credentials"));
        let mut prompter = ScriptedPrompter::new(["alice", "pw"]);
        let mut authenticator = SessionAuthenticator::new(&auth, &mut prompter);

        let next = authenticator.credential_attempt(&mut store, 2).await.unwrap();
        assert!(matches!(next, State::CredentialRetry { attempts_left: 1 }));
        for name in ["user", "pass", "yubikey-otp"] {
            let var = store.get_v(name).unwrap();
            assert_eq!(var.value, "");
            assert_eq!(var.source, Source::Invalid);
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.set("token", "good-token", Source::Code);

        let mut auth = FakeAuth::new();
        auth.token_error = Some(EndpointError::Connect {
            endpoint: Endpoint::Auth,
            url: "https://auth.invalid".to_string(),
            detail: "connection refused".to_string(),
        });
        let mut prompter = ScriptedPrompter::new(["alice", "hunter2"]);
        let err = SessionAuthenticator::new(&auth, &mut prompter)
            .ensure_auth(&mut store)
            .await
            .unwrap_err();

        assert_eq!(prompter.prompts(), 0);
        assert!(auth.attempts().is_empty());
        assert_eq!(classify(Some(&err)).code.code(), 50);
    }

    #[tokio::test]
    async fn test_other_failures_stop_immediately() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);

        let mut auth = FakeAuth::new();
        auth.credential_error = Some(EndpointError::Internal {
            endpoint: Endpoint::Auth,
            status: 500,
            message: "database unavailable".to_string(),
        });
        let mut prompter = ScriptedPrompter::new(["alice", "hunter2"]);
        let err = SessionAuthenticator::new(&auth, &mut prompter)
            .ensure_auth(&mut store)
            .await
            .unwrap_err();

        assert_eq!(auth.attempts().len(), 1);
        assert_eq!(classify(Some(&err)).code.code(), 51);
    }

    #[tokio::test]
    async fn test_yubikey_otp_is_requested_when_enabled() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.set("yubikey", "true", Source::Flag("yubikey".into()));

        let auth = FakeAuth::new();
        let mut prompter = ScriptedPrompter::new(["alice", "hunter2", "cccccbhkevjk"]);
        SessionAuthenticator::new(&auth, &mut prompter)
            .ensure_auth(&mut store)
            .await
            .unwrap();

        assert_eq!(prompter.prompts(), 3);
        assert_eq!(
            auth.attempts()[0].yubikey_otp.as_deref(),
            Some("cccccbhkevjk")
        );
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = Credentials {
            username: "alice".into(),
            password: "hunter2".into(),
            yubikey_otp: Some("otp".into()),
        };
        let shown = format!("{creds:?}");
        assert!(shown.contains("alice"));
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("otp\""));
    }
}
