pub mod config;
pub mod envelope;
pub mod error;

pub use config::{Config, InsertMode};
pub use envelope::*;
pub use error::*;
