//! # simple-auth-core
//!
//! Settings, logging, app configuration and error types shared by the
//! simple-authentication crates.
//!
//! ## Modules
//!
//! - [`error`] - [`AuthError`], [`ValidationError`] and the [`AuthResult`] alias
//! - [`settings`] - Application settings with defaults
//! - [`settings_loader`] - TOML/JSON loading and `SIMPLE_AUTH_*` overrides
//! - [`apps`] - Application configuration and registry
//! - [`logging`] - Tracing subscriber setup and request spans

pub mod apps;
pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

pub use error::{AuthError, AuthResult, ValidationError};
pub use settings::Settings;
