//! SQLite store using `rusqlite`.
//!
//! The connection sits behind an async `Mutex`; every operation runs on
//! `tokio::task::spawn_blocking`. Saves run in a transaction so that the user
//! row and its group/permission rows are written together or not at all.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tokio::sync::Mutex;

use simple_auth_core::{AuthError, AuthResult};

use super::{duplicate_email, duplicate_group_name, unknown_group, GroupStore, UserStore};
use crate::group::{Group, Permission};
use crate::user::User;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS simple_authentication_group (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS simple_authentication_group_permissions (
    group_id INTEGER NOT NULL REFERENCES simple_authentication_group(id) ON DELETE CASCADE,
    codename TEXT NOT NULL,
    name TEXT NOT NULL,
    content_type TEXT NOT NULL,
    UNIQUE (group_id, content_type, codename)
);
CREATE TABLE IF NOT EXISTS simple_authentication_user (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    password TEXT NOT NULL,
    last_login TEXT NULL,
    is_superuser INTEGER NOT NULL DEFAULT 0,
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    date_joined TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_staff INTEGER NOT NULL DEFAULT 0,
    force_password_change INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS simple_authentication_user_first_name
    ON simple_authentication_user (first_name);
CREATE INDEX IF NOT EXISTS simple_authentication_user_last_name
    ON simple_authentication_user (last_name);
CREATE INDEX IF NOT EXISTS simple_authentication_user_date_joined
    ON simple_authentication_user (date_joined);
CREATE TABLE IF NOT EXISTS simple_authentication_user_groups (
    user_id INTEGER NOT NULL REFERENCES simple_authentication_user(id) ON DELETE CASCADE,
    group_id INTEGER NOT NULL REFERENCES simple_authentication_group(id) ON DELETE CASCADE,
    UNIQUE (user_id, group_id)
);
CREATE TABLE IF NOT EXISTS simple_authentication_user_user_permissions (
    user_id INTEGER NOT NULL REFERENCES simple_authentication_user(id) ON DELETE CASCADE,
    permission TEXT NOT NULL,
    UNIQUE (user_id, permission)
);
";

const USER_COLUMNS: &str = "id, email, password, first_name, last_name, date_joined, \
     last_login, is_active, is_staff, is_superuser, force_password_change";

fn db_error(e: rusqlite::Error) -> AuthError {
    AuthError::DatabaseError(e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn parse_datetime(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let date_joined: String = row.get(5)?;
    let last_login: Option<String> = row.get(6)?;
    Ok(User {
        id: Some(row.get(0)?),
        email: row.get(1)?,
        password: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        date_joined: parse_datetime(5, &date_joined)?,
        last_login: last_login
            .as_deref()
            .map(|value| parse_datetime(6, value))
            .transpose()?,
        is_active: row.get(7)?,
        is_staff: row.get(8)?,
        is_superuser: row.get(9)?,
        force_password_change: row.get(10)?,
        groups: Vec::new(),
        user_permissions: Vec::new(),
    })
}

/// Fills in the group names and permissions of a loaded user.
fn load_user_relations(conn: &Connection, user: &mut User) -> rusqlite::Result<()> {
    let id = user.id.unwrap_or_default();
    let mut stmt = conn.prepare_cached(
        "SELECT g.name FROM simple_authentication_group g \
         JOIN simple_authentication_user_groups ug ON ug.group_id = g.id \
         WHERE ug.user_id = ?1 ORDER BY g.name",
    )?;
    user.groups = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT permission FROM simple_authentication_user_user_permissions \
         WHERE user_id = ?1 ORDER BY permission",
    )?;
    user.user_permissions = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(())
}

fn query_users(
    conn: &Connection,
    where_clause: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<User>> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM simple_authentication_user {where_clause} ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut users = stmt
        .query_map(params, user_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for user in &mut users {
        load_user_relations(conn, user)?;
    }
    Ok(users)
}

fn write_user(tx: &Transaction<'_>, user: &User) -> AuthResult<i64> {
    let write = |e: rusqlite::Error| {
        if is_constraint_violation(&e) {
            duplicate_email()
        } else {
            db_error(e)
        }
    };
    let last_login = user.last_login.map(|dt| dt.to_rfc3339());
    let id = if let Some(id) = user.id {
        let changed = tx
            .execute(
                "UPDATE simple_authentication_user SET email = ?1, password = ?2, first_name = ?3, \
                 last_name = ?4, date_joined = ?5, last_login = ?6, is_active = ?7, is_staff = ?8, \
                 is_superuser = ?9, force_password_change = ?10 WHERE id = ?11",
                params![
                    user.email,
                    user.password,
                    user.first_name,
                    user.last_name,
                    user.date_joined.to_rfc3339(),
                    last_login,
                    user.is_active,
                    user.is_staff,
                    user.is_superuser,
                    user.force_password_change,
                    id,
                ],
            )
            .map_err(write)?;
        if changed == 0 {
            return Err(AuthError::DoesNotExist(format!("User matching id {id}")));
        }
        id
    } else {
        tx.execute(
            "INSERT INTO simple_authentication_user (email, password, first_name, last_name, \
             date_joined, last_login, is_active, is_staff, is_superuser, force_password_change) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user.email,
                user.password,
                user.first_name,
                user.last_name,
                user.date_joined.to_rfc3339(),
                last_login,
                user.is_active,
                user.is_staff,
                user.is_superuser,
                user.force_password_change,
            ],
        )
        .map_err(write)?;
        tx.last_insert_rowid()
    };

    tx.execute(
        "DELETE FROM simple_authentication_user_groups WHERE user_id = ?1",
        [id],
    )
    .map_err(db_error)?;
    for name in &user.groups {
        let group_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM simple_authentication_group WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        let group_id = group_id.ok_or_else(|| unknown_group(name))?;
        tx.execute(
            "INSERT OR IGNORE INTO simple_authentication_user_groups (user_id, group_id) \
             VALUES (?1, ?2)",
            [id, group_id],
        )
        .map_err(db_error)?;
    }

    tx.execute(
        "DELETE FROM simple_authentication_user_user_permissions WHERE user_id = ?1",
        [id],
    )
    .map_err(db_error)?;
    for perm in &user.user_permissions {
        tx.execute(
            "INSERT OR IGNORE INTO simple_authentication_user_user_permissions \
             (user_id, permission) VALUES (?1, ?2)",
            params![id, perm],
        )
        .map_err(db_error)?;
    }
    Ok(id)
}

fn load_group_permissions(conn: &Connection, group: &mut Group) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "SELECT codename, name, content_type FROM simple_authentication_group_permissions \
         WHERE group_id = ?1 ORDER BY content_type, codename",
    )?;
    group.permissions = stmt
        .query_map([group.id.unwrap_or_default()], |row| {
            Ok(Permission::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(())
}

fn query_groups(
    conn: &Connection,
    where_clause: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Group>> {
    let sql = format!(
        "SELECT id, name FROM simple_authentication_group {where_clause} ORDER BY name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut groups = stmt
        .query_map(params, |row| {
            Ok(Group {
                id: Some(row.get(0)?),
                name: row.get(1)?,
                permissions: Vec::new(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    for group in &mut groups {
        load_group_permissions(conn, group)?;
    }
    Ok(groups)
}

fn write_group(tx: &Transaction<'_>, group: &Group) -> AuthResult<i64> {
    let write = |e: rusqlite::Error| {
        if is_constraint_violation(&e) {
            duplicate_group_name()
        } else {
            db_error(e)
        }
    };
    let id = if let Some(id) = group.id {
        let changed = tx
            .execute(
                "UPDATE simple_authentication_group SET name = ?1 WHERE id = ?2",
                params![group.name, id],
            )
            .map_err(write)?;
        if changed == 0 {
            return Err(AuthError::DoesNotExist(format!("Group matching id {id}")));
        }
        id
    } else {
        tx.execute(
            "INSERT INTO simple_authentication_group (name) VALUES (?1)",
            [&group.name],
        )
        .map_err(write)?;
        tx.last_insert_rowid()
    };

    tx.execute(
        "DELETE FROM simple_authentication_group_permissions WHERE group_id = ?1",
        [id],
    )
    .map_err(db_error)?;
    for perm in &group.permissions {
        tx.execute(
            "INSERT OR IGNORE INTO simple_authentication_group_permissions \
             (group_id, codename, name, content_type) VALUES (?1, ?2, ?3, ?4)",
            params![id, perm.codename, perm.name, perm.content_type],
        )
        .map_err(db_error)?;
    }
    Ok(id)
}

/// A store in a SQLite database file (or `:memory:`).
pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and its tables.
    ///
    /// WAL journaling is enabled for file databases.
    pub fn open(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref().to_path_buf();
        let in_memory = path.to_str() == Some(":memory:");
        let conn = if in_memory {
            Connection::open_in_memory()
        } else {
            Connection::open(&path)
        }
        .map_err(|e| AuthError::DatabaseError(format!("SQLite open failed: {e}")))?;

        if !in_memory {
            conn.execute_batch("PRAGMA journal_mode=WAL;")
                .map_err(|e| AuthError::DatabaseError(format!("Failed to set pragmas: {e}")))?;
        }
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| AuthError::DatabaseError(format!("Failed to set pragmas: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| AuthError::DatabaseError(format!("Failed to create tables: {e}")))?;

        tracing::debug!(path = %path.display(), "opened SQLite store");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> AuthResult<Self> {
        Self::open(":memory:")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> AuthResult<T>
    where
        F: FnOnce(&mut Connection) -> AuthResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| AuthError::DatabaseError(format!("Task join error: {e}")))?
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn save_user(&self, user: &mut User) -> AuthResult<()> {
        let mut candidate = user.clone();
        candidate.pre_save();
        let row = candidate.clone();

        let id = self
            .with_conn(move |conn| {
                let tx = conn.transaction().map_err(db_error)?;
                let id = write_user(&tx, &row)?;
                tx.commit().map_err(db_error)?;
                Ok(id)
            })
            .await?;

        candidate.id = Some(id);
        *user = candidate;
        Ok(())
    }

    async fn get_user(&self, id: i64) -> AuthResult<Option<User>> {
        self.with_conn(move |conn| {
            Ok(query_users(conn, "WHERE id = ?1", [id])
                .map_err(db_error)?
                .into_iter()
                .next())
        })
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        // NOCASE only folds ASCII; stored emails are already lower-cased.
        let email = email.to_lowercase();
        self.with_conn(move |conn| {
            Ok(query_users(conn, "WHERE email = ?1", [email])
                .map_err(db_error)?
                .into_iter()
                .next())
        })
        .await
    }

    async fn email_exists(&self, email: &str, exclude_id: Option<i64>) -> AuthResult<bool> {
        let email = email.to_lowercase();
        self.with_conn(move |conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM simple_authentication_user \
                     WHERE email = ?1 AND (?2 IS NULL OR id != ?2)",
                    params![email, exclude_id],
                    |row| row.get(0),
                )
                .map_err(db_error)?;
            Ok(count > 0)
        })
        .await
    }

    async fn list_users(&self) -> AuthResult<Vec<User>> {
        self.with_conn(|conn| query_users(conn, "", []).map_err(db_error))
            .await
    }

    async fn count_users(&self) -> AuthResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM simple_authentication_user", [], |row| row.get(0))
                .map_err(db_error)?;
            usize::try_from(count).map_err(|e| AuthError::DatabaseError(e.to_string()))
        })
        .await
    }
}

#[async_trait]
impl GroupStore for SqliteStore {
    async fn save_group(&self, group: &mut Group) -> AuthResult<()> {
        let row = group.clone();
        let id = self
            .with_conn(move |conn| {
                let tx = conn.transaction().map_err(db_error)?;
                let id = write_group(&tx, &row)?;
                tx.commit().map_err(db_error)?;
                Ok(id)
            })
            .await?;
        group.id = Some(id);
        Ok(())
    }

    async fn get_group(&self, id: i64) -> AuthResult<Option<Group>> {
        self.with_conn(move |conn| {
            Ok(query_groups(conn, "WHERE id = ?1", [id])
                .map_err(db_error)?
                .into_iter()
                .next())
        })
        .await
    }

    async fn get_group_by_name(&self, name: &str) -> AuthResult<Option<Group>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            Ok(query_groups(conn, "WHERE name = ?1", [name])
                .map_err(db_error)?
                .into_iter()
                .next())
        })
        .await
    }

    async fn list_groups(&self) -> AuthResult<Vec<Group>> {
        self.with_conn(|conn| query_groups(conn, "", []).map_err(db_error))
            .await
    }
}
