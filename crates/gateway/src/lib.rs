//! Club AI gateway: HTTP front end over the chat orchestrator.

pub mod config;
pub mod error;
pub mod http;

pub use config::Config;
pub use error::{Error, Result};
pub use http::{ApiError, router};
