// src/lib.rs
pub mod commands;
pub mod config;
pub mod error;
pub mod services;
pub mod utils;

pub use commands::App;
pub use config::CoreConfig;
pub use error::{AdapterError, TuneError, TuneResult};
