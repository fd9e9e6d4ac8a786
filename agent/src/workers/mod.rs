//! Background workers feeding the reconciliation engine

pub mod poller;
pub mod push;

use futures::future::BoxFuture;

/// Resolves when the worker should stop
pub type ShutdownSignal = BoxFuture<'static, ()>;
