pub mod cli;
pub mod config;
pub mod errors;
pub mod log;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod preview;
pub mod prompt;
pub mod provider;
pub mod sandbox;
pub mod schema;
pub mod store;
pub mod wire;
