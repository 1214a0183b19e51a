//! CLI commands.

mod add;
mod config;
mod console;
mod delete;
mod list;
mod resize;
mod show;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use crate::auth::{Session, SessionAuthenticator};
use crate::client::{ApiClient, AuthEndpointClient};
use crate::config::{ConfigStore, Environment, FlagSet};
use crate::error::{classify, print_error, CliError, ExitCode};
use crate::logging::{self, Logging};
use crate::output::Output;
use crate::prompt::Prompter;

/// bm - manage cloud servers from the command line.
#[derive(Debug, Parser)]
#[command(name = "bm")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalFlags,

    #[command(subcommand)]
    command: Commands,
}

/// Flags accepted by every command. Each one overrides the configuration
/// variable of the same name.
#[derive(Debug, Default, Args)]
pub struct GlobalFlags {
    /// Directory holding configuration and the debug log.
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Account to operate on.
    #[arg(long, global = true)]
    account: Option<String>,

    /// Default group for server names without one.
    #[arg(long, global = true)]
    group: Option<String>,

    /// User to log in as.
    #[arg(long, global = true)]
    user: Option<String>,

    /// API endpoint URL.
    #[arg(long, global = true, value_name = "URL")]
    endpoint: Option<String>,

    /// Auth endpoint URL.
    #[arg(long, global = true, value_name = "URL")]
    auth_endpoint: Option<String>,

    /// Verbosity of stderr logging (0-3).
    #[arg(long, global = true, value_name = "LEVEL")]
    debug_level: Option<u8>,

    /// Require a yubikey one-time password when logging in.
    #[arg(long, global = true)]
    yubikey: bool,

    /// Suppress informational messages.
    #[arg(long, global = true)]
    silent: bool,
}

impl FlagSet for GlobalFlags {
    fn config_flags(&self) -> Vec<(&'static str, String)> {
        let strings = [
            ("account", &self.account),
            ("group", &self.group),
            ("user", &self.user),
            ("endpoint", &self.endpoint),
            ("auth-endpoint", &self.auth_endpoint),
        ];

        let mut flags: Vec<(&'static str, String)> = strings
            .into_iter()
            .filter_map(|(name, value)| value.clone().map(|value| (name, value)))
            .collect();

        if let Some(level) = self.debug_level {
            flags.push(("debug-level", level.to_string()));
        }
        if self.yubikey {
            flags.push(("yubikey", "true".to_string()));
        }
        if self.silent {
            flags.push(("silent", "true".to_string()));
        }
        flags
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show, set or unset configuration variables.
    Config(config::ConfigCommand),

    /// Show an account or a server.
    Show(show::ShowCommand),

    /// List servers in a group.
    List(list::ListCommand),

    /// Delete servers or groups.
    Delete(delete::DeleteCommand),

    /// Add discs to a server.
    Add(add::AddCommand),

    /// Resize a server's disc.
    Resize(resize::ResizeCommand),

    /// Open a server's serial console over SSH.
    Console(console::ConsoleCommand),

    /// Show CLI version.
    Version,
}

impl Commands {
    async fn run(self, ctx: &mut CommandContext) -> Result<(), CliError> {
        match self {
            Commands::Config(cmd) => cmd.run(ctx),
            Commands::Show(cmd) => cmd.run(ctx).await,
            Commands::List(cmd) => cmd.run(ctx).await,
            Commands::Delete(cmd) => cmd.run(ctx).await,
            Commands::Add(cmd) => cmd.run(ctx).await,
            Commands::Resize(cmd) => cmd.run(ctx).await,
            Commands::Console(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                ctx.output.line(format!("bm {}", env!("CARGO_PKG_VERSION")));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub store: ConfigStore,
    pub output: Output,
    prompter: Box<dyn Prompter>,
    logging: Logging,
}

impl CommandContext {
    /// Open the config store and set up logging.
    pub fn new(
        flags: &GlobalFlags,
        env: Environment,
        prompter: Box<dyn Prompter>,
    ) -> Result<Self, CliError> {
        let dir = ConfigStore::resolve_dir(flags.config_dir.as_deref(), &env)?;
        let rust_log = env.get("RUST_LOG").map(str::to_string);
        let store = ConfigStore::open(dir, env, flags)?;
        let logging = logging::init(
            store.dir(),
            rust_log.as_deref(),
            &store.get_ignore_err("debug-level"),
        );
        let output = Output {
            silent: store.get_bool("silent")?,
        };

        debug!(config_dir = %store.dir().display(), "Configuration loaded");

        Ok(Self {
            store,
            output,
            prompter,
            logging,
        })
    }

    /// Make sure there is a valid session, prompting if necessary.
    pub async fn authenticate(&mut self) -> Result<Session, CliError> {
        let auth = AuthEndpointClient::new(&self.store.get("auth-endpoint")?)?;
        SessionAuthenticator::new(auth, &mut *self.prompter)
            .ensure_auth(&mut self.store)
            .await
    }

    /// API client for an authenticated session.
    pub fn api_client(&self, session: &Session) -> Result<ApiClient, CliError> {
        Ok(ApiClient::new(&self.store.get("endpoint")?, session)?)
    }

    /// Authenticate and return an API client.
    pub async fn client(&mut self) -> Result<ApiClient, CliError> {
        let session = self.authenticate().await?;
        self.api_client(&session)
    }

    /// Ask for confirmation unless `force` is set. Declining is a
    /// [`CliError::UserExit`].
    pub fn confirm(&mut self, question: &str) -> Result<(), CliError> {
        if self.store.get_bool("force")? {
            return Ok(());
        }
        if self.prompter.confirm(question).map_err(CliError::Prompt)? {
            Ok(())
        } else {
            Err(CliError::UserExit)
        }
    }
}

/// Parse arguments. Usage errors map to [`ExitCode::Usage`]; help and
/// version output to [`ExitCode::Success`].
pub fn parse_args<I, T>(args: I) -> Result<Cli, ExitCode>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|err| {
        let _ = err.print();
        match err.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => ExitCode::Success,
            _ => ExitCode::Usage,
        }
    })
}

fn finish(result: Result<(), CliError>, debug_log: &Path) -> ExitCode {
    let classification = classify(result.as_ref().err());
    if let Err(err) = &result {
        print_error(err, &classification, debug_log);
    }
    debug!(exit_code = classification.code.code(), "Command finished");
    classification.code
}

/// Run a parsed command line and classify the outcome.
pub async fn run(cli: Cli, env: Environment, prompter: Box<dyn Prompter>) -> ExitCode {
    let mut ctx = match CommandContext::new(&cli.global, env, prompter) {
        Ok(ctx) => ctx,
        Err(err) => return finish(Err(err), Path::new(logging::DEBUG_LOG_FILE)),
    };

    let result = cli.command.run(&mut ctx).await;
    finish(result, ctx.logging.debug_log())
}
