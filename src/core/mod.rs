pub mod error;

pub use error::{FixError, Result};
