//! Persistence for users and groups.
//!
//! [`UserStore`] and [`GroupStore`] are the seams the manager, the
//! authentication backend and the admin talk to. Two implementations are
//! provided:
//!
//! - [`InMemoryStore`] - maps behind an async `RwLock`, for tests and demos
//! - [`SqliteStore`] - `rusqlite` on `spawn_blocking`, one row per user with
//!   join tables for groups and permissions
//!
//! Both call [`User::pre_save`] before writing, compare emails
//! case-insensitively, and reject duplicates with
//! [`AuthError::IntegrityError`]. A failed save writes nothing.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use simple_auth_core::settings::DatabaseSettings;
use simple_auth_core::{AuthError, AuthResult};

use crate::group::Group;
use crate::user::User;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

pub(crate) fn duplicate_email() -> AuthError {
    AuthError::IntegrityError("UNIQUE constraint failed: simple_authentication_user.email".into())
}

pub(crate) fn duplicate_group_name() -> AuthError {
    AuthError::IntegrityError("UNIQUE constraint failed: simple_authentication_group.name".into())
}

pub(crate) fn unknown_group(name: &str) -> AuthError {
    AuthError::IntegrityError(format!("Group '{name}' does not exist"))
}

/// Storage of user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts `user` when it has no id (assigning one), updates it otherwise.
    async fn save_user(&self, user: &mut User) -> AuthResult<()>;

    async fn get_user(&self, id: i64) -> AuthResult<Option<User>>;

    /// Case-insensitive lookup.
    async fn get_user_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Returns `true` if another user (not `exclude_id`) has `email`.
    async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> AuthResult<bool>;

    /// Every user, by ascending id.
    async fn list_users(&self) -> AuthResult<Vec<User>>;

    async fn count_users(&self) -> AuthResult<usize> {
        Ok(self.list_users().await?.len())
    }
}

/// Storage of groups.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Inserts `group` when it has no id (assigning one), updates it otherwise.
    async fn save_group(&self, group: &mut Group) -> AuthResult<()>;

    async fn get_group(&self, id: i64) -> AuthResult<Option<Group>>;

    async fn get_group_by_name(&self, name: &str) -> AuthResult<Option<Group>>;

    /// Every group, by name.
    async fn list_groups(&self) -> AuthResult<Vec<Group>>;

    /// The groups named in `names`; unknown names are skipped.
    async fn groups_named(&self, names: &[String]) -> AuthResult<Vec<Group>> {
        Ok(self
            .list_groups()
            .await?
            .into_iter()
            .filter(|g| names.contains(&g.name))
            .collect())
    }
}

/// A store holding both users and groups.
pub trait Store: UserStore + GroupStore {}

impl<T: UserStore + GroupStore> Store for T {}

/// Opens the store selected by `settings.engine` (`sqlite` or `memory`).
pub fn open_store(settings: &DatabaseSettings) -> AuthResult<Arc<dyn Store>> {
    match settings.engine.as_str() {
        "sqlite" => Ok(Arc::new(SqliteStore::open(&settings.name)?)),
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        other => Err(AuthError::ConfigurationError(format!(
            "Unsupported database engine '{other}'"
        ))),
    }
}
