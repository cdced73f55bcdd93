//! Reference service plugins. The core treats service delivery as a
//! plugin seam, not a fixed set of backends, but these three ship
//! alongside it so the engine is runnable out of the box.

pub mod file;
pub mod http;
pub mod log;
