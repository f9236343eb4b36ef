pub mod audio;
pub mod config;
pub mod disc;
pub mod display;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metadata;

pub use error::{PlayerError, Result};
