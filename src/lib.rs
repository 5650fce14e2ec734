pub mod clock;
pub mod commands;
pub mod config;
pub mod fs;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod store;
pub mod validation;
