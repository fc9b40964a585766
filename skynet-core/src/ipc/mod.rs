//! Serialisable types crossing the crate boundary.
//!
//! - [`events`]: status events broadcast to the UI shell.
//! - [`live`]: inbound live-session messages as delivered by the transport.

pub mod events;
pub mod live;
