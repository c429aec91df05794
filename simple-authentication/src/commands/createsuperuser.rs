//! The `createsuperuser` command.

use std::sync::Arc;

use async_trait::async_trait;
use simple_auth::hashers::PasswordHashers;
use simple_auth::manager::{ExtraFields, UserManager};
use simple_auth::store::{open_store, Store, UserStore};
use simple_auth::user::User;
use simple_auth_core::{AuthError, AuthResult, Settings};

use crate::command::ManagementCommand;

/// Creates a superuser in the configured store.
///
/// Without `--password` the account gets an unusable password and can only
/// log in once a password has been set for it.
pub struct CreatesuperuserCommand;

impl CreatesuperuserCommand {
    /// Creates the superuser described by `matches` in `store`.
    pub async fn create(
        matches: &clap::ArgMatches,
        settings: &Settings,
        store: Arc<dyn Store>,
    ) -> AuthResult<User> {
        let email = matches
            .get_one::<String>("email")
            .ok_or_else(|| AuthError::InvalidValue("--email is required".to_string()))?;
        let password = matches.get_one::<String>("password").map(String::as_str);

        let mut extra = ExtraFields::new();
        if let Some(first_name) = matches.get_one::<String>("first-name") {
            extra = extra.first_name(first_name);
        }
        if let Some(last_name) = matches.get_one::<String>("last-name") {
            extra = extra.last_name(last_name);
        }

        let hashers = PasswordHashers::from_names(&settings.auth.password_hashers)?;
        let manager = UserManager::new(store).with_hashers(hashers);
        if manager.store().get_user_by_email(email).await?.is_some() {
            return Err(AuthError::IntegrityError(format!(
                "User with this Email address already exists: {email}"
            )));
        }
        let mut user = manager.create_superuser(email, password, extra).await?;
        // Creation sets the password, which clears the flag.
        if matches.get_flag("force-password-change") {
            user.force_password_change = true;
            manager.store().save_user(&mut user).await?;
        }
        Ok(user)
    }
}

#[async_trait]
impl ManagementCommand for CreatesuperuserCommand {
    fn name(&self) -> &'static str {
        "createsuperuser"
    }

    fn help(&self) -> &'static str {
        "Create a superuser account"
    }

    fn add_arguments(&self, cmd: clap::Command) -> clap::Command {
        cmd.arg(
            clap::Arg::new("email")
                .long("email")
                .required(true)
                .help("Email address, used to log in"),
        )
        .arg(
            clap::Arg::new("password")
                .long("password")
                .help("Password; omit to create the account without a usable one"),
        )
        .arg(clap::Arg::new("first-name").long("first-name"))
        .arg(clap::Arg::new("last-name").long("last-name"))
        .arg(
            clap::Arg::new("force-password-change")
                .long("force-password-change")
                .action(clap::ArgAction::SetTrue)
                .help("Require a password change at first login"),
        )
    }

    async fn handle(&self, matches: &clap::ArgMatches, settings: &Settings) -> AuthResult<()> {
        let store = open_store(&settings.database)?;
        let user = Self::create(matches, settings, store).await?;
        if !user.has_usable_password() {
            tracing::warn!(email = %user.email, "superuser has no usable password");
        }
        tracing::info!(user_id = user.id, email = %user.email, "Superuser created successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use simple_auth::store::InMemoryStore;

    use super::*;

    fn parse(args: &[&str]) -> Result<clap::ArgMatches, clap::Error> {
        CreatesuperuserCommand
            .add_arguments(clap::Command::new("createsuperuser"))
            .try_get_matches_from(args)
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.auth.password_hashers = vec!["pbkdf2_sha256".to_string()];
        settings
    }

    #[test]
    fn test_email_is_required() {
        assert!(parse(&["createsuperuser", "--password", "pw"]).is_err());
    }

    #[tokio::test]
    async fn test_creates_flagged_superuser() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let matches = parse(&[
            "createsuperuser",
            "--email",
            "Root@EXAMPLE.com",
            "--password",
            "s3cret-pass",
            "--first-name",
            "Ro",
            "--force-password-change",
        ])
        .unwrap();

        let user = CreatesuperuserCommand::create(&matches, &settings(), store.clone())
            .await
            .unwrap();
        assert_eq!(user.email, "root@example.com");
        assert!(user.is_staff && user.is_superuser);
        assert!(user.force_password_change);
        let stored = store.get_user_by_email("root@example.com").await.unwrap().unwrap();
        assert!(stored.force_password_change);
        assert_eq!(user.first_name, "Ro");
        assert!(user.password.starts_with("pbkdf2_sha256$"));
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_without_password_is_unusable() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let matches = parse(&["createsuperuser", "--email", "root@example.com"]).unwrap();
        let user = CreatesuperuserCommand::create(&matches, &settings(), store).await.unwrap();
        assert!(!user.has_usable_password());
        assert!(!user.force_password_change);
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let matches = parse(&["createsuperuser", "--email", "root@example.com"]).unwrap();
        CreatesuperuserCommand::create(&matches, &settings(), store.clone()).await.unwrap();
        assert!(matches!(
            CreatesuperuserCommand::create(&matches, &settings(), store).await,
            Err(AuthError::IntegrityError(_))
        ));
    }
}
