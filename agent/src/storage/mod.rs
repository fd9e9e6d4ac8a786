//! Persistent storage

pub mod layout;
pub mod settings;
pub mod store;
