//! Port traits: the seams between the signal pipeline and the outside world.

pub mod config_port;
pub mod data_port;
pub mod notification_port;
