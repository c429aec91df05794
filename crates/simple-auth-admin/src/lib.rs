//! # simple-auth-admin
//!
//! Admin tooling for simple-authentication users and groups.
//!
//! - [`model_admin`] - list, search and fieldset configuration
//! - [`user`] / [`group`] - the user and group admin configurations
//! - [`site`] - the registry of administered models
//! - [`changelist`] and [`filters`] - list views with filters, search, ordering and paging
//! - [`actions`] - bulk actions, including `hijack` (log in as a user)
//! - [`messages`] - one-time notifications kept in the session
//! - [`views`] - JSON admin views and their URLs

pub mod actions;
pub mod changelist;
pub mod filters;
pub mod group;
pub mod messages;
pub mod model_admin;
pub mod site;
pub mod user;
pub mod views;

pub use actions::{ActionRegistry, AdminAction, HijackAction};
pub use changelist::{AdminRecord, ChangeList};
pub use group::group_admin;
pub use model_admin::{Fieldset, ModelAdmin};
pub use site::AdminSite;
pub use user::user_admin;
pub use views::{urls, AdminContext};
