//! # simple-auth
//!
//! Email-keyed users for simple-authentication.
//!
//! - **Users** keyed by email with a forced-password-change flag (`user`)
//! - **Groups** and permissions (`group`)
//! - **A user factory** that validates and persists new users (`manager`)
//! - **Password hashing** with Argon2, PBKDF2 and bcrypt (`hashers`)
//! - **Stores** for users and groups, in memory or in SQLite (`store`)
//! - **Session authentication** and the model backend (`backends`)
//! - **Middleware** that authenticates requests and forces password changes (`middleware`)
//! - **Forms** for user creation, editing, login and password changes (`forms`)
//!
//! Password hashing and SQLite access run on `tokio::task::spawn_blocking`.

pub mod apps;
pub mod backends;
pub mod decorators;
pub mod forms;
pub mod group;
pub mod hashers;
pub mod manager;
pub mod middleware;
pub mod store;
pub mod user;

pub use apps::SimpleAuthenticationConfig;
pub use backends::{
    get_user_from_session, login, logout, update_session_auth_hash, AuthBackend, ModelBackend,
    RequestUserExt,
};
pub use forms::{
    AdminPasswordChangeForm, AuthenticationForm, PasswordChangeForm, UserChangeForm,
    UserCreationForm,
};
pub use group::{Group, Permission};
pub use hashers::{
    check_password, is_password_usable, make_password, PasswordHasher, PasswordHashers,
};
pub use manager::{ExtraFields, UserManager};
pub use middleware::{AuthenticationMiddleware, ForcePasswordChangeMiddleware};
pub use store::{open_store, GroupStore, InMemoryStore, SqliteStore, Store, UserStore};
pub use user::User;
