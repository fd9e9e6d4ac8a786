//! OS-level effect primitives invoked by the dispatcher

pub mod alert;
pub mod hooks;
pub mod lockdown;
