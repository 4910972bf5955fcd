//! soniclink: short-range peer discovery and text messaging over an
//! inaudible ultrasonic 2-FSK acoustic link.
//!
//! The crate layers a framed datagram codec and a discovery/room session
//! on top of a software modem in the 17-20 kHz band. Audio I/O is a
//! JACK client at the binary's edge; everything below it runs on plain
//! PCM buffers and is testable offline.

pub mod device;
pub mod error;
pub mod frame;
pub mod link;
pub mod modem;
pub mod session;
pub mod ui;
pub mod utils;

pub use error::{LinkError, Result};
pub use link::{AcousticLink, LinkConfig, LinkEvent, LinkShared};
pub use modem::ModemMode;
