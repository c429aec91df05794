//! URL routing.
//!
//! - [`pattern`]: routes in `path()` syntax with `int`, `str`, `slug` and `path` placeholders
//! - [`resolver`]: nested resolution with instance namespaces and application names
//! - [`reverse`]: building paths from namespaced route names

pub mod pattern;
pub mod resolver;
pub mod reverse;

pub use pattern::{path, RouteHandler, URLPattern};
pub use resolver::{include, root, ResolverMatch, URLEntry, URLResolver};
pub use reverse::reverse;
