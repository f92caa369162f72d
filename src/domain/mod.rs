//! Domain layer: the configuration tree and the path language
//!
//! This layer is independent of external concerns (no I/O, no lens engine, no config loading).

pub mod error;
pub mod eval;
pub mod fragment;
pub mod path;
pub mod record;
pub mod transform;
pub mod tree;
pub mod tree_view;

pub use error::{DomainError, DomainResult};
pub use fragment::{Fragment, Span, SpanRange};
pub use path::PathExpr;
pub use record::{ErrorCode, ErrorRecord};
pub use transform::{derive_name, Glob, Transform};
pub use tree::{Tree, TreeNode};
pub use tree_view::TreeNodeConvert;
