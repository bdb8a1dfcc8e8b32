pub mod api;
pub mod config;
pub mod errors;
pub mod hitl;
pub mod logging;
pub mod models;
pub mod notify;
pub mod orchestrator;
pub mod phase;
pub mod progress;
pub mod resume;
pub mod retry;
pub mod routing;
pub mod server;
pub mod service;
pub mod signals;
pub mod store;
