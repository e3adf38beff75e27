pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod feature;
pub mod io;
pub mod paths;
pub mod progress;
pub mod validate;

pub use error::{PaceError, Result};
