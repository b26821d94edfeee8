pub mod error;

pub use error::{AlertError, Result};
