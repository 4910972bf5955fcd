//! Datagram model and its wire text codec.
//!
//! The frame payload budget is 32 bytes, so the wire form is a compact
//! `|`-delimited record with a one-letter type tag rather than full JSON.
//! Fields the receiver can reconstruct are not spent on the wire: room
//! display names are derived from the room id, sender usernames come from
//! the peer table, and timestamps are stamped by whichever side holds the
//! record. Chat content is always the final field and may itself contain
//! `|`.

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};
use crate::utils::epoch_millis;

/// Display name for a room, derived from its id on both ends.
pub fn room_display_name(room_id: &str) -> String {
    format!("Chat room {}", room_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Datagram {
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        user_id: String,
        username: String,
        timestamp: u64,
    },
    /// Identical payload to a heartbeat; sent once at startup to
    /// accelerate bootstrap.
    #[serde(rename_all = "camelCase")]
    Discovery {
        user_id: String,
        username: String,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    Invite {
        from_user_id: String,
        from_username: String,
        to_user_id: String,
        room_id: String,
        room_name: String,
        is_private: bool,
        key: Option<String>,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        user_id: String,
        username: String,
        room_id: String,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        user_id: String,
        username: String,
        room_id: String,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    RoomUpdate {
        room_id: String,
        room_name: String,
        is_private: bool,
        member_count: usize,
        created_by: String,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    PrivateKey {
        room_id: String,
        from_user_id: String,
        key: String,
        timestamp: u64,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        message_id: String,
        room_id: String,
        from_user_id: String,
        from_username: String,
        content: String,
        is_encrypted: bool,
        timestamp: u64,
    },
}

impl Datagram {
    /// The peer that originated this datagram, when the wire carries one.
    pub fn sender_id(&self) -> Option<&str> {
        match self {
            Datagram::Heartbeat { user_id, .. } => Some(user_id),
            Datagram::Discovery { user_id, .. } => Some(user_id),
            Datagram::Invite { from_user_id, .. } => Some(from_user_id),
            Datagram::JoinRoom { user_id, .. } => Some(user_id),
            Datagram::LeaveRoom { user_id, .. } => Some(user_id),
            Datagram::RoomUpdate { .. } => None,
            Datagram::PrivateKey { from_user_id, .. } => Some(from_user_id),
            Datagram::Chat { from_user_id, .. } => Some(from_user_id),
        }
    }

    /// Serialise to the wire text. Fails with `PayloadTooLarge` when the
    /// record cannot fit a frame payload.
    pub fn encode_wire(&self) -> Result<String> {
        let text = match self {
            Datagram::Heartbeat {
                user_id, username, ..
            } => format!("h|{}|{}", user_id, username),
            Datagram::Discovery {
                user_id, username, ..
            } => format!("d|{}|{}", user_id, username),
            Datagram::Invite {
                from_user_id,
                to_user_id,
                room_id,
                is_private,
                key,
                ..
            } => {
                let mut text = format!(
                    "i|{}|{}|{}|{}",
                    from_user_id,
                    to_user_id,
                    room_id,
                    *is_private as u8
                );
                // The key rides along only when it fits; otherwise the
                // joiner gets it from the creator's private_key
                // re-broadcast after join_room.
                if let Some(key) = key {
                    if text.len() + 1 + key.len() <= crate::utils::consts::MAX_PAYLOAD_BYTES {
                        text.push('|');
                        text.push_str(key);
                    }
                }
                text
            }
            Datagram::JoinRoom {
                user_id, room_id, ..
            } => format!("j|{}|{}", user_id, room_id),
            Datagram::LeaveRoom {
                user_id, room_id, ..
            } => format!("l|{}|{}", user_id, room_id),
            Datagram::RoomUpdate {
                room_id,
                member_count,
                created_by,
                ..
            } => format!("u|{}|{}|{}", room_id, member_count, created_by),
            Datagram::PrivateKey {
                room_id,
                from_user_id,
                key,
                ..
            } => format!("k|{}|{}|{}", room_id, from_user_id, key),
            Datagram::Chat {
                message_id,
                room_id,
                from_user_id,
                content,
                is_encrypted,
                ..
            } => format!(
                "c|{}|{}|{}|{}|{}",
                message_id,
                room_id,
                from_user_id,
                *is_encrypted as u8,
                content
            ),
        };

        if text.len() > crate::utils::consts::MAX_PAYLOAD_BYTES {
            return Err(LinkError::PayloadTooLarge(text.len()));
        }
        Ok(text)
    }

    /// Parse wire text back into a datagram. Usernames absent from the
    /// wire come back empty; the session manager resolves them from its
    /// peer table. The timestamp is the local receive time.
    pub fn parse_wire(text: &str) -> Result<Datagram> {
        let malformed = |why: &str| LinkError::DatagramMalformed(format!("{}: {:?}", why, text));
        let now = epoch_millis();

        let (tag, rest) = text
            .split_once('|')
            .ok_or_else(|| malformed("missing tag"))?;

        match tag {
            "h" | "d" => {
                let (user_id, username) = rest
                    .split_once('|')
                    .ok_or_else(|| malformed("announce needs id and name"))?;
                if user_id.is_empty() {
                    return Err(malformed("empty user id"));
                }
                let user_id = user_id.to_string();
                let username = username.to_string();
                Ok(if tag == "h" {
                    Datagram::Heartbeat {
                        user_id,
                        username,
                        timestamp: now,
                    }
                } else {
                    Datagram::Discovery {
                        user_id,
                        username,
                        timestamp: now,
                    }
                })
            }
            "i" => {
                let fields: Vec<&str> = rest.split('|').collect();
                if fields.len() != 4 && fields.len() != 5 {
                    return Err(malformed("invite needs 4 or 5 fields"));
                }
                let is_private = parse_flag(fields[3]).ok_or_else(|| malformed("bad flag"))?;
                Ok(Datagram::Invite {
                    from_user_id: fields[0].to_string(),
                    from_username: String::new(),
                    to_user_id: fields[1].to_string(),
                    room_id: fields[2].to_string(),
                    room_name: room_display_name(fields[2]),
                    is_private,
                    key: fields.get(4).map(|k| k.to_string()),
                    timestamp: now,
                })
            }
            "j" | "l" => {
                let (user_id, room_id) = rest
                    .split_once('|')
                    .ok_or_else(|| malformed("membership needs id and room"))?;
                if user_id.is_empty() || room_id.is_empty() {
                    return Err(malformed("empty membership field"));
                }
                let user_id = user_id.to_string();
                let room_id = room_id.to_string();
                Ok(if tag == "j" {
                    Datagram::JoinRoom {
                        user_id,
                        username: String::new(),
                        room_id,
                        timestamp: now,
                    }
                } else {
                    Datagram::LeaveRoom {
                        user_id,
                        username: String::new(),
                        room_id,
                        timestamp: now,
                    }
                })
            }
            "u" => {
                let fields: Vec<&str> = rest.split('|').collect();
                if fields.len() != 3 {
                    return Err(malformed("room update needs 3 fields"));
                }
                let member_count: usize = fields[1]
                    .parse()
                    .map_err(|_| malformed("bad member count"))?;
                Ok(Datagram::RoomUpdate {
                    room_id: fields[0].to_string(),
                    room_name: room_display_name(fields[0]),
                    is_private: false,
                    member_count,
                    created_by: fields[2].to_string(),
                    timestamp: now,
                })
            }
            "k" => {
                let fields: Vec<&str> = rest.split('|').collect();
                if fields.len() != 3 || fields[2].is_empty() {
                    return Err(malformed("key push needs 3 fields"));
                }
                Ok(Datagram::PrivateKey {
                    room_id: fields[0].to_string(),
                    from_user_id: fields[1].to_string(),
                    key: fields[2].to_string(),
                    timestamp: now,
                })
            }
            "c" => {
                // Content is the tail and may contain the delimiter.
                let fields: Vec<&str> = rest.splitn(5, '|').collect();
                if fields.len() != 5 {
                    return Err(malformed("chat needs 5 fields"));
                }
                let is_encrypted = parse_flag(fields[3]).ok_or_else(|| malformed("bad flag"))?;
                Ok(Datagram::Chat {
                    message_id: fields[0].to_string(),
                    room_id: fields[1].to_string(),
                    from_user_id: fields[2].to_string(),
                    from_username: String::new(),
                    content: fields[4].to_string(),
                    is_encrypted,
                    timestamp: now,
                })
            }
            _ => Err(malformed("unknown type tag")),
        }
    }
}

fn parse_flag(field: &str) -> Option<bool> {
    match field {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}
