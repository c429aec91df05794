//! The `simple-authentication` management utility.
//!
//! ```text
//! simple-authentication --settings site.toml createsuperuser --email root@example.com --password ...
//! simple-authentication --settings site.toml runserver --port 8000
//! ```
//!
//! Without `--settings`, defaults plus `SIMPLE_AUTH_*` environment variables
//! are used.

use anyhow::Context;
use simple_auth_core::logging::setup_logging;
use simple_auth_core::settings_loader;
use simple_authentication::command::CommandRegistry;
use simple_authentication::commands::register_builtin_commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut registry = CommandRegistry::new();
    register_builtin_commands(&mut registry);
    let matches = registry.build_cli().get_matches();

    let settings = match matches.get_one::<String>("settings") {
        Some(path) => settings_loader::from_file_with_env(path)
            .with_context(|| format!("loading settings from {path}"))?,
        None => settings_loader::from_env(),
    };
    setup_logging(&settings);

    registry
        .execute(&matches, &settings)
        .await
        .context("command failed")?;
    Ok(())
}
