//! Crate-wide error type plus the extension traits used to attach context
//! (a message, or the object and function that failed) while propagating.

use std::fmt::Debug;
pub mod error;
pub mod result;

pub use error::{Error, LockError};
pub use result::Result;

/// Wraps an error with the debug form of the object being worked on and the
/// function that failed, usually filled in with `function_path!()`.
pub trait WithDebugObjectAndFnName<S: Into<String>, O: Debug + 'static> {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self;
}

/// Prefixes an error with a human readable message.
pub trait WithMsg<S: Into<String>> {
    fn with_msg(self, msg: S) -> Self;
}
