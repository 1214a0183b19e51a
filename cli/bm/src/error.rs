//! Error taxonomy, exit codes and classification.
//!
//! Every command returns `Result<(), CliError>`. `main` hands the result to
//! [`classify`] exactly once to pick the exit code and the message.

use std::fmt;
use std::io;
use std::path::Path;

use colored::Colorize;
use thiserror::Error;
use tracing::error;

use crate::config::ConfigError;
use crate::specs::{DiscSpecError, SizeSpecError};

/// Process exit codes.
///
/// Codes for the auth endpoint and the API endpoint share their last two
/// digits when they describe the same failure (52 and 152 both mean an
/// unparseable response).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    CantReadConfig = 3,
    CantWriteConfig = 4,
    UserExit = 5,
    WontDeleteNonEmpty = 6,
    Usage = 7,
    SubprocessFailed = 8,
    UnknownError = 49,
    CantConnectAuth = 50,
    AuthReportedError = 51,
    CantParseAuth = 52,
    CredentialsInvalid = 53,
    CredentialsWrong = 54,
    UnknownAuthError = 149,
    CantConnectApi = 150,
    ApiReportedError = 151,
    CantParseApi = 152,
    NotAuthorized = 155,
    NotFound = 156,
    BadRequest = 157,
    UnknownApiError = 249,
    TrappedInterrupt = 255,
}

impl ExitCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}

/// Which remote endpoint an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Auth,
    Api,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Auth => f.write_str("auth endpoint"),
            Endpoint::Api => f.write_str("API endpoint"),
        }
    }
}

/// Failures talking to a remote endpoint.
#[derive(Debug, Clone, Error)]
pub enum EndpointError {
    #[error("couldn't connect to the {endpoint} at {url}: {detail}")]
    Connect {
        endpoint: Endpoint,
        url: String,
        detail: String,
    },

    #[error("the {endpoint} reported an internal error (HTTP {status}): {message}")]
    Internal {
        endpoint: Endpoint,
        status: u16,
        message: String,
    },

    #[error("couldn't parse the response from the {endpoint}: {detail}")]
    Unparseable { endpoint: Endpoint, detail: String },

    #[error("not authorized by the {endpoint}: {message}")]
    NotAuthorized { endpoint: Endpoint, message: String },

    #[error("not found by the {endpoint}: {message}")]
    NotFound { endpoint: Endpoint, message: String },

    #[error("bad request to the {endpoint}: {message}")]
    BadRequest { endpoint: Endpoint, message: String },

    #[error("the {endpoint} returned HTTP {status}: {message}")]
    Unexpected {
        endpoint: Endpoint,
        status: u16,
        message: String,
    },
}

impl EndpointError {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            EndpointError::Connect { endpoint, .. }
            | EndpointError::Internal { endpoint, .. }
            | EndpointError::Unparseable { endpoint, .. }
            | EndpointError::NotAuthorized { endpoint, .. }
            | EndpointError::NotFound { endpoint, .. }
            | EndpointError::BadRequest { endpoint, .. }
            | EndpointError::Unexpected { endpoint, .. } => *endpoint,
        }
    }

    /// Whether the endpoint could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, EndpointError::Connect { .. })
    }

    /// The free-text message the endpoint sent, if any.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            EndpointError::Internal { message, .. }
            | EndpointError::NotAuthorized { message, .. }
            | EndpointError::NotFound { message, .. }
            | EndpointError::BadRequest { message, .. }
            | EndpointError::Unexpected { message, .. } => Some(message),
            EndpointError::Connect { .. } | EndpointError::Unparseable { .. } => None,
        }
    }
}

/// What was wrong with rejected credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialProblem {
    /// The auth endpoint could not make sense of them.
    Malformed,
    /// They did not match an account.
    Wrong,
}

const MALFORMED_CREDENTIALS: &str = "Badly-formed parameters";
const WRONG_CREDENTIALS: &str = "Bad login credentials";

/// Best-effort credential problem detection.
///
/// The auth endpoint only reports these as free text, so this is the one
/// place that matches on message contents.
pub fn credential_problem(err: &EndpointError) -> Option<CredentialProblem> {
    if err.endpoint() != Endpoint::Auth {
        return None;
    }
    let message = err.remote_message()?;
    if message.contains(MALFORMED_CREDENTIALS) {
        Some(CredentialProblem::Malformed)
    } else if message.contains(WRONG_CREDENTIALS) {
        Some(CredentialProblem::Wrong)
    } else {
        None
    }
}

/// Every error a command can return.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cancelled")]
    UserExit,

    #[error("group '{group}' still contains servers")]
    WontDeleteNonEmptyGroup { group: String },

    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Size(#[from] SizeSpecError),

    #[error(transparent)]
    Disc(#[from] DiscSpecError),

    #[error("{program} failed: {detail}")]
    Subprocess { program: String, detail: String },

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("couldn't read from the terminal: {0}")]
    Prompt(#[source] io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The outcome of classifying a command result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub code: ExitCode,
    /// Message for the user, or `None` when nothing more should be said.
    pub message: Option<String>,
    pub hint: Option<&'static str>,
    /// The error is not understood and should be reported as a bug.
    pub unknown: bool,
}

impl Classification {
    fn new(code: ExitCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            hint: None,
            unknown: false,
        }
    }

    fn hint(mut self, hint: &'static str) -> Self {
        self.hint = Some(hint);
        self
    }

    fn unknown(mut self) -> Self {
        self.unknown = true;
        self
    }
}

fn classify_endpoint(err: &EndpointError) -> Classification {
    use EndpointError as E;

    let message = err.to_string();

    if let Some(problem) = credential_problem(err) {
        return match problem {
            CredentialProblem::Malformed => Classification::new(
                ExitCode::CredentialsInvalid,
                "The supplied credentials contained invalid characters - please try again.",
            ),
            CredentialProblem::Wrong => Classification::new(
                ExitCode::CredentialsWrong,
                "A user account with those credentials could not be found. Check your details and try again.",
            ),
        };
    }

    match (err.endpoint(), err) {
        (Endpoint::Auth, E::Connect { .. }) => {
            Classification::new(ExitCode::CantConnectAuth, message)
                .hint("Check your network connection and auth endpoint.")
        }
        (Endpoint::Auth, E::Internal { .. }) => {
            Classification::new(ExitCode::AuthReportedError, message)
        }
        (Endpoint::Auth, E::Unparseable { .. }) => {
            Classification::new(ExitCode::CantParseAuth, message)
        }
        (Endpoint::Auth, _) => Classification::new(ExitCode::UnknownAuthError, message).unknown(),

        (Endpoint::Api, E::Connect { .. }) => Classification::new(ExitCode::CantConnectApi, message)
            .hint("Check your network connection and API endpoint."),
        (Endpoint::Api, E::Internal { .. }) => {
            Classification::new(ExitCode::ApiReportedError, message)
        }
        (Endpoint::Api, E::Unparseable { .. }) => {
            Classification::new(ExitCode::CantParseApi, message)
        }
        (Endpoint::Api, E::NotAuthorized { .. }) => {
            Classification::new(ExitCode::NotAuthorized, message)
                .hint("You may not have permission for this operation.")
        }
        (Endpoint::Api, E::NotFound { .. }) => Classification::new(ExitCode::NotFound, message),
        (Endpoint::Api, E::BadRequest { .. }) => {
            Classification::new(ExitCode::BadRequest, message)
        }
        (Endpoint::Api, E::Unexpected { .. }) => {
            Classification::new(ExitCode::UnknownApiError, message).unknown()
        }
    }
}

/// Map a command result to an exit code and user-facing message.
pub fn classify(err: Option<&CliError>) -> Classification {
    let Some(err) = err else {
        return Classification {
            code: ExitCode::Success,
            message: None,
            hint: None,
            unknown: false,
        };
    };

    match err {
        CliError::UserExit => Classification {
            code: ExitCode::UserExit,
            message: None,
            hint: None,
            unknown: false,
        },
        CliError::Config(ConfigError::Read { .. } | ConfigError::DirInvalid { .. }) => {
            Classification::new(ExitCode::CantReadConfig, err.to_string())
        }
        CliError::Config(ConfigError::Write { .. }) => {
            Classification::new(ExitCode::CantWriteConfig, err.to_string())
        }
        CliError::WontDeleteNonEmptyGroup { .. } => {
            Classification::new(ExitCode::WontDeleteNonEmpty, err.to_string())
                .hint("Use --recursive to delete the group and every server in it.")
        }
        CliError::Usage(_) | CliError::Size(_) | CliError::Disc(_) => {
            Classification::new(ExitCode::Usage, err.to_string())
        }
        CliError::Subprocess { .. } => {
            Classification::new(ExitCode::SubprocessFailed, err.to_string())
        }
        CliError::Endpoint(endpoint_err) => classify_endpoint(endpoint_err),
        CliError::Prompt(_) | CliError::Other(_) => {
            Classification::new(ExitCode::UnknownError, err.to_string()).unknown()
        }
    }
}

/// Print a classified error and record the full chain in the debug log.
pub fn print_error(err: &CliError, classification: &Classification, debug_log: &Path) {
    let Some(message) = classification.message.as_deref() else {
        return;
    };

    eprintln!("{} {}", "Error:".red().bold(), message);

    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }

    if let Some(hint) = classification.hint {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }

    if classification.unknown {
        error!(
            exit_code = classification.code.code(),
            error = ?err,
            backtrace = %std::backtrace::Backtrace::force_capture(),
            "Unclassified error"
        );
        eprintln!(
            "\n{}",
            format!(
                "This error wasn't recognised. Details have been written to {}; please include that file when reporting a bug.",
                debug_log.display()
            )
            .yellow()
        );
    }
}
