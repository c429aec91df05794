//! Built-in management commands.

pub mod check;
pub mod createsuperuser;
pub mod runserver;

pub use check::CheckCommand;
pub use createsuperuser::CreatesuperuserCommand;
pub use runserver::RunserverCommand;

use crate::command::CommandRegistry;

/// Registers the built-in commands into `registry`.
pub fn register_builtin_commands(registry: &mut CommandRegistry) {
    registry.register(Box::new(RunserverCommand));
    registry.register(Box::new(CreatesuperuserCommand));
    registry.register(Box::new(CheckCommand));
}
