//! Infrastructure layer: I/O implementations and DI container
//!
//! This layer implements I/O boundary traits, the built-in lenses, and wires
//! up services.

pub mod di;
pub mod error;
pub mod lenses;
pub mod traits;

pub use error::{InfraError, LensError};
