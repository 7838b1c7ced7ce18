pub mod error;

pub use error::{HookError, Result};
