//! Core module containing the types shared by compiler and runtime

pub mod context;
pub mod error;
pub mod path;

pub use context::{Context, Variables};
pub use error::{CompileError, FieldError, JitError, SchemaError};
pub use path::{PathSegment, ResponsePath};
