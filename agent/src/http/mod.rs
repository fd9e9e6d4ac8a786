//! Control server and local agent API clients

pub mod agent;
pub mod client;
pub mod status;
