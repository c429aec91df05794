//! The management command framework.
//!
//! A [`ManagementCommand`] names itself, declares its clap arguments and
//! handles a parsed invocation. [`CommandRegistry`] collects commands into a
//! single CLI and dispatches to the one the user asked for.
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use simple_authentication::command::ManagementCommand;
//! use simple_authentication::core::{AuthResult, Settings};
//!
//! struct CountUsers;
//!
//! #[async_trait]
//! impl ManagementCommand for CountUsers {
//!     fn name(&self) -> &str { "countusers" }
//!     fn help(&self) -> &str { "Print the number of users" }
//!
//!     async fn handle(&self, _matches: &clap::ArgMatches, _settings: &Settings) -> AuthResult<()> {
//!         Ok(())
//!     }
//! }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use simple_auth_core::{AuthError, AuthResult, Settings};

/// The binary name shown in usage text.
pub const PROG_NAME: &str = "simple-authentication";

/// A command invocable from the CLI.
#[async_trait]
pub trait ManagementCommand: Send + Sync {
    fn name(&self) -> &str;

    fn help(&self) -> &str;

    /// Adds the command's arguments. The default adds none.
    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd
    }

    async fn handle(&self, matches: &clap::ArgMatches, settings: &Settings) -> AuthResult<()>;
}

/// Commands by name.
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn ManagementCommand>>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.list_commands())
            .finish()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Registers `command`, replacing any command of the same name.
    pub fn register(&mut self, command: Box<dyn ManagementCommand>) {
        let name = command.name().to_string();
        self.commands.insert(name, command);
    }

    pub fn get(&self, name: &str) -> Option<&dyn ManagementCommand> {
        self.commands.get(name).map(AsRef::as_ref)
    }

    /// Registered command names, sorted.
    pub fn list_commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Builds the top-level CLI with one subcommand per registered command.
    ///
    /// Every invocation also accepts `--settings <FILE>`.
    pub fn build_cli(&self) -> clap::Command {
        let mut app = clap::Command::new(PROG_NAME)
            .about("Authentication server and management utility")
            .subcommand_required(true)
            .arg(
                clap::Arg::new("settings")
                    .long("settings")
                    .global(true)
                    .help("Path to a TOML or JSON settings file"),
            );

        let mut entries: Vec<_> = self.commands.iter().collect();
        entries.sort_by_key(|(name, _)| name.as_str());

        for (name, cmd) in entries {
            // clap wants 'static names; commands are registered once at startup.
            let static_name: &'static str = Box::leak(name.clone().into_boxed_str());
            let subcmd = clap::Command::new(static_name).about(cmd.help().to_string());
            app = app.subcommand(cmd.add_arguments(subcmd));
        }

        app
    }

    /// Dispatches `matches` to the chosen subcommand.
    pub async fn execute(&self, matches: &clap::ArgMatches, settings: &Settings) -> AuthResult<()> {
        let (name, sub_matches) = matches
            .subcommand()
            .ok_or_else(|| AuthError::ConfigurationError("No subcommand specified".to_string()))?;

        let cmd = self
            .get(name)
            .ok_or_else(|| AuthError::ConfigurationError(format!("Unknown command: {name}")))?;

        tracing::debug!(command = name, "executing management command");
        cmd.handle(sub_matches, settings).await
    }
}
