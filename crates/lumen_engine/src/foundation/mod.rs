//! Foundation utilities shared by every engine subsystem

pub mod ids;
pub mod logging;
pub mod math;
