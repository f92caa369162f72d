//! augtree: a managed configuration tree
//!
//! Configuration files are parsed through lenses into a single labelled tree
//! rooted at `/files`, edited with path expressions and written back with
//! their formatting preserved.
//!
//! ```no_run
//! use augtree::{Flags, OpenOptions, Session};
//!
//! let mut aug = Session::open(OpenOptions::new().root("/tmp/root").flags(Flags::SAVE_BACKUP))?;
//! aug.set("/files/etc/hosts/1/alias[last()+1]", Some("myhost"))?;
//! aug.save()?;
//! # Ok::<(), augtree::AugError>(())
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod util;

pub use application::{Flags, OpenOptions, Session};
pub use config::{SaveMode, Settings};
pub use domain::{ErrorCode, ErrorRecord, Span};
pub use error::{AugError, AugResult};
