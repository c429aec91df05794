//! The `runserver` command.

use async_trait::async_trait;
use simple_auth::store::open_store;
use simple_auth_core::{AuthResult, Settings};

use crate::build_application;
use crate::command::ManagementCommand;

/// Serves the application on `--host`:`--port` (default `127.0.0.1:8000`).
pub struct RunserverCommand;

impl RunserverCommand {
    /// The bind address from the parsed arguments.
    pub fn address(matches: &clap::ArgMatches) -> String {
        let host = matches.get_one::<String>("host").map_or("127.0.0.1", String::as_str);
        let port = matches.get_one::<u16>("port").copied().unwrap_or(8000);
        format!("{host}:{port}")
    }
}

#[async_trait]
impl ManagementCommand for RunserverCommand {
    fn name(&self) -> &'static str {
        "runserver"
    }

    fn help(&self) -> &'static str {
        "Starts the web server"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("host")
                .long("host")
                .default_value("127.0.0.1")
                .help("Host to bind to"),
        )
        .arg(
            clap::Arg::new("port")
                .long("port")
                .default_value("8000")
                .value_parser(clap::value_parser!(u16))
                .help("Port to bind to"),
        )
    }

    async fn handle(&self, matches: &clap::ArgMatches, settings: &Settings) -> AuthResult<()> {
        let addr = Self::address(matches);
        if settings.secret_key.is_empty() {
            tracing::warn!("secret_key is empty; session auth hashes are weak");
        }
        let store = open_store(&settings.database)?;
        let app = build_application(settings, store)?;
        tracing::info!(%addr, engine = %settings.database.engine, "starting server");
        app.run(&addr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<clap::ArgMatches, clap::Error> {
        RunserverCommand
            .add_arguments(clap::Command::new("runserver"))
            .try_get_matches_from(args)
    }

    #[test]
    fn test_default_address() {
        let matches = parse(&["runserver"]).unwrap();
        assert_eq!(RunserverCommand::address(&matches), "127.0.0.1:8000");
    }

    #[test]
    fn test_custom_address() {
        let matches = parse(&["runserver", "--host", "0.0.0.0", "--port", "9000"]).unwrap();
        assert_eq!(RunserverCommand::address(&matches), "0.0.0.0:9000");
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(parse(&["runserver", "--port", "http"]).is_err());
        assert!(parse(&["runserver", "--port", "70000"]).is_err());
    }
}
