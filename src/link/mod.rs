pub mod audio;
pub mod event;
pub mod facade;
pub mod transmit;

pub use audio::{build_process_closure, LinkShared};
pub use event::{ChatMessage, InviteDetails, LinkEvent, RoomInfo};
pub use facade::{AcousticLink, LinkConfig};
pub use transmit::{FrameKind, TxScheduler};
