pub mod cipher;
pub mod datagram;
pub mod manager;
pub mod peer;
pub mod room;

pub use datagram::{room_display_name, Datagram};
pub use manager::{Effect, SessionManager, UNDECRYPTABLE};
pub use peer::{Peer, PeerTable};
pub use room::{Room, RoomOptions};
