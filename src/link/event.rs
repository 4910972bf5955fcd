//! The single event surface of the link: one tagged variant stream that
//! any number of listeners can drain from a channel clone, instead of
//! per-component callback slots.

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub message_id: String,
    pub room_id: String,
    pub from_user_id: String,
    pub from_username: String,
    pub content: String,
    pub is_encrypted: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InviteDetails {
    pub from_user_id: String,
    pub from_username: String,
    pub room_id: String,
    pub room_name: String,
    pub is_private: bool,
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    pub is_private: bool,
    pub member_count: usize,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A peer announced itself (heartbeat or discovery).
    PeerSeen { user_id: String, username: String },
    /// A peer aged out of the discovery table (10 s of silence).
    PeerLost { user_id: String, username: String },
    /// A peer aged out of the session table (30 s); it is now offline.
    PeerOffline { user_id: String, username: String },
    InviteReceived(InviteDetails),
    /// The local room changed: joined, left, or privacy flipped.
    RoomStateChanged { room: Option<RoomInfo> },
    /// Another device advertised a joinable public room.
    RoomAdvertised(RoomInfo),
    MessageReceived(ChatMessage),
    /// Local bookkeeping lines ("B joined the room", ...).
    SystemMessage { text: String },
    /// A foreground send failed; reported exactly once.
    SendFailed { reason: String },
    /// Discovery stopped, either on request or because the device died.
    DiscoveryStopped { reason: Option<String> },
}
