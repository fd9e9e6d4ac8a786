//! Lock agent library
//!
//! Core modules for the remote-command device lock agent.

pub mod app;
pub mod capability;
pub mod clock;
pub mod engine;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod installer;
pub mod logs;
pub mod models;
pub mod mqtt;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod utils;
pub mod workers;
