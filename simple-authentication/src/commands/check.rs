//! The `check` command: validates settings before serving.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use simple_auth::hashers::PasswordHashers;
use simple_auth::store::{open_store, InMemoryStore, UserStore};
use simple_auth_admin::views::ADMIN_NAMESPACE;
use simple_auth_admin::AdminContext;
use simple_auth_core::{AuthError, AuthResult, Settings};

use crate::command::ManagementCommand;
use crate::urlpatterns;

/// Runs the configuration checks and reports what they find.
pub struct CheckCommand;

/// One finding of a check.
#[derive(Debug, Clone)]
pub struct CheckMessage {
    pub level: CheckLevel,
    pub msg: String,
    pub hint: Option<String>,
    /// A stable identifier, e.g. `security.W001`.
    pub id: String,
}

impl CheckMessage {
    fn new(level: CheckLevel, id: &str, msg: impl Into<String>, hint: Option<&str>) -> Self {
        Self {
            level,
            msg: msg.into(),
            hint: hint.map(str::to_string),
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for CheckLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Checks `settings` without touching the configured database.
pub fn run_checks(settings: &Settings) -> Vec<CheckMessage> {
    let mut messages = Vec::new();

    if settings.secret_key.is_empty() {
        messages.push(CheckMessage::new(
            CheckLevel::Warning,
            "security.W001",
            "secret_key is empty",
            Some("Set a long, random secret_key; it signs session auth hashes"),
        ));
    }

    if !settings.debug && !settings.session.cookie_secure {
        messages.push(CheckMessage::new(
            CheckLevel::Warning,
            "security.W002",
            "session.cookie_secure is off with debug disabled",
            Some("Serve over HTTPS and set session.cookie_secure = true"),
        ));
    }

    if let Err(e) = PasswordHashers::from_names(&settings.auth.password_hashers) {
        messages.push(CheckMessage::new(
            CheckLevel::Error,
            "auth.E001",
            e.to_string(),
            Some("Choose from argon2, pbkdf2_sha256 and bcrypt"),
        ));
        return messages;
    }

    if settings.auth.admin_namespace != ADMIN_NAMESPACE {
        messages.push(CheckMessage::new(
            CheckLevel::Warning,
            "auth.W002",
            format!(
                "auth.admin_namespace is '{}' but the admin is mounted as '{ADMIN_NAMESPACE}'",
                settings.auth.admin_namespace
            ),
            Some("Users who must change their password will not be able to reach the admin"),
        ));
    }

    match routes_check(settings) {
        Ok(()) => {}
        Err(AuthError::NoReverseMatch(name)) => messages.push(CheckMessage::new(
            CheckLevel::Error,
            "urls.E001",
            format!("auth.password_change_url_name does not resolve: {name}"),
            Some("Use a name such as admin:password_change"),
        )),
        Err(e) => messages.push(CheckMessage::new(
            CheckLevel::Error,
            "urls.E002",
            e.to_string(),
            None,
        )),
    }

    match settings.database.engine.as_str() {
        "sqlite" | "memory" => {}
        other => messages.push(CheckMessage::new(
            CheckLevel::Error,
            "database.E001",
            format!("Unsupported database engine '{other}'"),
            Some("Use sqlite or memory"),
        )),
    }
    if settings.database.engine == "memory" && !settings.debug {
        messages.push(CheckMessage::new(
            CheckLevel::Warning,
            "database.W001",
            "The memory engine loses every user when the process exits",
            None,
        ));
    }

    messages
}

/// Builds the URL configuration and reverses the password-change route.
fn routes_check(settings: &Settings) -> AuthResult<()> {
    let ctx = Arc::new(AdminContext::from_settings(settings, Arc::new(InMemoryStore::new()))?);
    let urls = urlpatterns(settings, &ctx)?;
    urls.reverse(&settings.auth.password_change_url_name, &HashMap::new())?;
    Ok(())
}

#[async_trait]
impl ManagementCommand for CheckCommand {
    fn name(&self) -> &'static str {
        "check"
    }

    fn help(&self) -> &'static str {
        "Run configuration checks"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("database")
                .long("database")
                .action(clap::ArgAction::SetTrue)
                .help("Also open the configured database"),
        )
    }

    async fn handle(&self, matches: &clap::ArgMatches, settings: &Settings) -> AuthResult<()> {
        let mut messages = run_checks(settings);

        if matches.get_flag("database") {
            let opened = match open_store(&settings.database) {
                Ok(store) => store.count_users().await,
                Err(e) => Err(e),
            };
            match opened {
                Ok(users) => tracing::info!(users, "database reachable"),
                Err(e) => messages.push(CheckMessage::new(
                    CheckLevel::Critical,
                    "database.E002",
                    e.to_string(),
                    None,
                )),
            }
        }

        if messages.is_empty() {
            tracing::info!("System check identified no issues");
            return Ok(());
        }

        let errors = messages.iter().filter(|m| m.level >= CheckLevel::Error).count();
        for msg in &messages {
            let hint = msg.hint.as_ref().map_or(String::new(), |h| format!("\n\tHINT: {h}"));
            tracing::warn!("{} ({}): {}{}", msg.level, msg.id, msg.msg, hint);
        }
        tracing::info!(
            "System check identified {} issue(s) ({} error(s))",
            messages.len(),
            errors
        );

        if errors > 0 {
            return Err(AuthError::ConfigurationError(format!(
                "System check found {errors} error(s)"
            )));
        }
        Ok(())
    }
}
