//! Tabwarden Core — option record, tab types, errors, configuration.

pub mod config;
pub mod error;
pub mod options;
pub mod types;

pub use config::{DataPaths, ServiceConfig};
pub use error::{Error, Result};
pub use options::{OptionKey, Options};
pub use types::*;
