//! Server module for Shellgate
//!
//! - `config`: configuration structures for every component
//! - `loader`: configuration loading from files and environment
//! - `validation`: startup checks
//! - `state`: stores shared by HTTP handlers and WebSocket connections
//! - `init`: router assembly and the run loop

pub mod config;
mod init;
mod loader;
mod state;
mod validation;

pub use init::{build_router, run};
pub use loader::load_config;
pub use state::AppState;
pub use validation::validate_config;
