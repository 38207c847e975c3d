#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod config;
pub mod error;
pub mod notifications;
pub(crate) mod serde_helpers;
pub mod types;
pub mod ws;

pub use config::Config;
pub use error::Error;
pub use notifications::Client;

pub type Result<T> = std::result::Result<T, Error>;
