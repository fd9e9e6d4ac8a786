//! Local status API models

pub mod models;
