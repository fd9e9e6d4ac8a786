//! MQTT push transport

pub mod client;
pub mod topics;
