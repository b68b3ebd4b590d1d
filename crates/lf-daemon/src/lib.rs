//! Background service around the leadflow core: the periodic escalation
//! sweep, the notification worker and shutdown coordination.

pub mod daemon;
pub mod shutdown;
pub mod sweep;
