//! Application layer: the session and its services
//!
//! This layer orchestrates domain logic and depends on I/O boundary traits.

mod commands;
pub mod error;
pub mod error_ext;
pub mod registry;
pub mod services;
pub mod session;
pub mod translate;

pub use error::{ApplicationError, ApplicationResult};
pub use error_ext::IoResultExt;
pub use registry::TransformRegistry;
pub use session::{Flags, OpenOptions, Session};
pub use translate::{ErrorTranslator, ERROR_HINT};
