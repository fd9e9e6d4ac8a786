//! Data models

pub mod lock;
