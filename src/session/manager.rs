//! Session layer: routes incoming datagrams by type, owns the local room
//! and key, and keeps the connected-users view. All methods are
//! synchronous and return effects (events to publish, datagrams to send)
//! so the layer stays independent of threading and audio.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::cipher;
use super::datagram::{room_display_name, Datagram};
use super::peer::PeerTable;
use super::room::{Room, RoomOptions};
use crate::error::{LinkError, Result};
use crate::link::event::{ChatMessage, InviteDetails, LinkEvent, RoomInfo};
use crate::utils::consts::{MESSAGE_DEDUP_WINDOW_MS, SESSION_PEER_EXPIRY_MS};
use crate::utils::epoch_millis;

/// What the caller must do with the outcome of a session operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Emit(LinkEvent),
    Send(Datagram),
}

/// Placeholder surfaced when a private message cannot be read.
pub const UNDECRYPTABLE: &str = "[encrypted — undecryptable]";

pub struct SessionManager {
    user_id: String,
    username: String,
    peers: PeerTable,
    current_room: Option<Room>,
    recent_message_ids: VecDeque<(String, Instant)>,
}

impl SessionManager {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            peers: PeerTable::new(
                user_id.clone(),
                Duration::from_millis(SESSION_PEER_EXPIRY_MS),
            ),
            user_id,
            username: username.into(),
            current_room: None,
            recent_message_ids: VecDeque::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn current_room(&self) -> Option<&Room> {
        self.current_room.as_ref()
    }

    // ------------------------------------------------------------------
    // Outgoing datagrams
    // ------------------------------------------------------------------

    pub fn heartbeat(&self) -> Datagram {
        Datagram::Heartbeat {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            timestamp: epoch_millis(),
        }
    }

    /// One-shot startup announcement; same payload as a heartbeat.
    pub fn discovery_announce(&self) -> Datagram {
        Datagram::Discovery {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            timestamp: epoch_millis(),
        }
    }

    /// Periodic advertisement of the current room, while it is public.
    pub fn room_advert(&self) -> Option<Datagram> {
        let room = self.current_room.as_ref()?;
        if room.is_private {
            return None;
        }
        Some(Datagram::RoomUpdate {
            room_id: room.id.clone(),
            room_name: room.name.clone(),
            is_private: false,
            member_count: room.member_count(),
            created_by: room.created_by.clone(),
            timestamp: epoch_millis(),
        })
    }

    /// Build a chat datagram for the current room, obfuscating in private
    /// mode, plus the local echo for the UI.
    pub fn build_chat(&mut self, text: &str) -> Result<(Datagram, ChatMessage)> {
        let room = self.current_room.as_ref().ok_or(LinkError::NotInRoom)?;

        let message_id = generate_message_id();
        let timestamp = epoch_millis();

        let (content, is_encrypted) = match (&room.key, room.is_private) {
            (Some(key), true) => (cipher::obfuscate(text, key), true),
            _ => (text.to_string(), false),
        };

        let datagram = Datagram::Chat {
            message_id: message_id.clone(),
            room_id: room.id.clone(),
            from_user_id: self.user_id.clone(),
            from_username: self.username.clone(),
            content,
            is_encrypted,
            timestamp,
        };

        let echo = ChatMessage {
            message_id,
            room_id: room.id.clone(),
            from_user_id: self.user_id.clone(),
            from_username: self.username.clone(),
            content: text.to_string(),
            is_encrypted,
            timestamp,
        };

        Ok((datagram, echo))
    }

    pub fn build_invite(&self, to_user_id: &str) -> Result<Datagram> {
        let room = self.current_room.as_ref().ok_or(LinkError::NotInRoom)?;
        if !self.peers.contains(to_user_id) {
            return Err(LinkError::UnknownPeer(to_user_id.to_string()));
        }

        Ok(Datagram::Invite {
            from_user_id: self.user_id.clone(),
            from_username: self.username.clone(),
            to_user_id: to_user_id.to_string(),
            room_id: room.id.clone(),
            room_name: room.name.clone(),
            is_private: room.is_private,
            key: room.key.clone(),
            timestamp: epoch_millis(),
        })
    }

    // ------------------------------------------------------------------
    // Room state transitions
    // ------------------------------------------------------------------

    /// Enter a room (fresh id unless one is given). A held room is left
    /// first, so the one-current-room invariant cannot break.
    pub fn create_or_join_room(&mut self, opts: RoomOptions) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.current_room.is_some() {
            effects.extend(self.leave_room());
        }

        let room_id = opts.room_id.unwrap_or_else(Room::generate_id);
        let created_by = opts.created_by.unwrap_or_else(|| self.user_id.clone());
        let mut room = Room::new(room_id, created_by, epoch_millis());
        room.members.insert(self.user_id.clone());
        if opts.is_private {
            room.is_private = true;
            room.key = Some(cipher::generate_key());
        }

        info!("entering room {} (private: {})", room.id, room.is_private);
        effects.push(Effect::Send(Datagram::JoinRoom {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            room_id: room.id.clone(),
            timestamp: epoch_millis(),
        }));
        effects.push(Effect::Emit(LinkEvent::SystemMessage {
            text: format!("Joined {}", room.name),
        }));

        self.current_room = Some(room);
        effects.push(self.room_state_changed());
        effects
    }

    /// Accept a received invite: adopt the advertised room and announce
    /// the join.
    pub fn accept_invite(&mut self, invite: &InviteDetails) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.current_room.is_some() {
            effects.extend(self.leave_room());
        }

        let mut room = Room::new(
            invite.room_id.clone(),
            invite.from_user_id.clone(),
            epoch_millis(),
        );
        room.is_private = invite.is_private;
        room.key = invite.key.clone();
        room.members.insert(self.user_id.clone());

        info!("accepted invite into {}", room.id);
        effects.push(Effect::Send(Datagram::JoinRoom {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            room_id: room.id.clone(),
            timestamp: epoch_millis(),
        }));
        effects.push(Effect::Emit(LinkEvent::SystemMessage {
            text: format!("Joined {}", room.name),
        }));

        self.current_room = Some(room);
        effects.push(self.room_state_changed());
        effects
    }

    pub fn leave_room(&mut self) -> Vec<Effect> {
        let Some(room) = self.current_room.take() else {
            return Vec::new();
        };

        info!("leaving room {}", room.id);
        vec![
            Effect::Send(Datagram::LeaveRoom {
                user_id: self.user_id.clone(),
                username: self.username.clone(),
                room_id: room.id.clone(),
                timestamp: epoch_millis(),
            }),
            Effect::Emit(LinkEvent::SystemMessage {
                text: format!("Left {}", room.name),
            }),
            self.room_state_changed(),
        ]
    }

    /// Flip the room between public and private. Entering private mode
    /// mints a fresh key and pushes it to current members; going public
    /// clears the key locally (past messages stay as they were).
    pub fn toggle_privacy(&mut self) -> Result<Vec<Effect>> {
        let user_id = self.user_id.clone();
        let room = self.current_room.as_mut().ok_or(LinkError::NotInRoom)?;

        let mut effects = Vec::new();
        if room.is_private {
            room.is_private = false;
            room.key = None;
            effects.push(Effect::Emit(LinkEvent::SystemMessage {
                text: "Private mode disabled".to_string(),
            }));
        } else {
            let key = cipher::generate_key();
            room.is_private = true;
            room.key = Some(key.clone());
            effects.push(Effect::Send(Datagram::PrivateKey {
                room_id: room.id.clone(),
                from_user_id: user_id,
                key,
                timestamp: epoch_millis(),
            }));
            effects.push(Effect::Emit(LinkEvent::SystemMessage {
                text: "Private mode enabled".to_string(),
            }));
        }

        effects.push(self.room_state_changed());
        Ok(effects)
    }

    // ------------------------------------------------------------------
    // Incoming datagrams
    // ------------------------------------------------------------------

    pub fn handle_datagram(&mut self, datagram: Datagram, now: Instant) -> Vec<Effect> {
        // Our own frames loop back by acoustic reflection; drop them.
        if datagram.sender_id() == Some(self.user_id.as_str()) {
            debug!("dropped self-originated datagram");
            return Vec::new();
        }

        // Presence: any datagram carrying a sender refreshes its entry.
        if let Some(sender) = datagram.sender_id() {
            let username = match &datagram {
                Datagram::Heartbeat { username, .. } => username.clone(),
                Datagram::Discovery { username, .. } => username.clone(),
                _ => String::new(),
            };
            self.peers.observe(sender, &username, now);
        }

        match datagram {
            Datagram::Heartbeat {
                user_id, username, ..
            }
            | Datagram::Discovery {
                user_id, username, ..
            } => vec![Effect::Emit(LinkEvent::PeerSeen { user_id, username })],

            Datagram::Invite {
                from_user_id,
                to_user_id,
                room_id,
                room_name,
                is_private,
                key,
                ..
            } => {
                // Unicast-by-field: deliver only when addressed to us.
                if to_user_id != self.user_id {
                    return Vec::new();
                }
                let from_username = self.peers.username_of(&from_user_id);
                vec![Effect::Emit(LinkEvent::InviteReceived(InviteDetails {
                    from_user_id,
                    from_username,
                    room_id,
                    room_name,
                    is_private,
                    key,
                }))]
            }

            Datagram::JoinRoom {
                user_id, room_id, ..
            } => self.handle_join(user_id, room_id),

            Datagram::LeaveRoom {
                user_id, room_id, ..
            } => self.handle_leave(user_id, room_id),

            Datagram::RoomUpdate {
                room_id,
                room_name,
                member_count,
                created_by,
                ..
            } => {
                // Our own room's advert (possibly our echo) is not news.
                if self
                    .current_room
                    .as_ref()
                    .is_some_and(|room| room.id == room_id)
                {
                    return Vec::new();
                }
                vec![Effect::Emit(LinkEvent::RoomAdvertised(RoomInfo {
                    id: room_id,
                    name: room_name,
                    is_private: false,
                    member_count,
                    created_by,
                }))]
            }

            Datagram::PrivateKey { room_id, key, .. } => {
                let Some(room) = self.current_room.as_mut() else {
                    return Vec::new();
                };
                if room.id != room_id {
                    return Vec::new();
                }
                room.is_private = true;
                room.key = Some(key);
                vec![
                    Effect::Emit(LinkEvent::SystemMessage {
                        text: "Room is now private".to_string(),
                    }),
                    self.room_state_changed(),
                ]
            }

            Datagram::Chat {
                message_id,
                room_id,
                from_user_id,
                content,
                is_encrypted,
                timestamp,
                ..
            } => self.handle_chat(
                message_id,
                room_id,
                from_user_id,
                content,
                is_encrypted,
                timestamp,
                now,
            ),
        }
    }

    /// Session-layer sweep: peers silent past 30 s go offline.
    pub fn sweep(&mut self, now: Instant) -> Vec<Effect> {
        self.peers
            .sweep(now)
            .into_iter()
            .map(|peer| {
                Effect::Emit(LinkEvent::PeerOffline {
                    user_id: peer.user_id,
                    username: peer.username,
                })
            })
            .collect()
    }

    fn handle_join(&mut self, user_id: String, room_id: String) -> Vec<Effect> {
        let username = self.peers.username_of(&user_id);
        let self_id = self.user_id.clone();

        let Some(room) = self.current_room.as_mut() else {
            return Vec::new();
        };
        if room.id != room_id {
            return Vec::new();
        }
        if !room.members.insert(user_id) {
            return Vec::new();
        }

        let mut effects = vec![
            Effect::Emit(LinkEvent::SystemMessage {
                text: format!("{} joined the room", username),
            }),
            self.room_state_changed(),
        ];

        // The creator of a private room answers a join by re-pushing the
        // key, so members whose invite could not carry it still decrypt.
        if let Some(room) = self.current_room.as_ref() {
            if room.is_private && room.created_by == self_id {
                if let Some(key) = &room.key {
                    effects.push(Effect::Send(Datagram::PrivateKey {
                        room_id: room.id.clone(),
                        from_user_id: self_id,
                        key: key.clone(),
                        timestamp: epoch_millis(),
                    }));
                }
            }
        }
        effects
    }

    fn handle_leave(&mut self, user_id: String, room_id: String) -> Vec<Effect> {
        let username = self.peers.username_of(&user_id);

        let Some(room) = self.current_room.as_mut() else {
            return Vec::new();
        };
        if room.id != room_id || !room.members.remove(&user_id) {
            return Vec::new();
        }

        vec![
            Effect::Emit(LinkEvent::SystemMessage {
                text: format!("{} left the room", username),
            }),
            self.room_state_changed(),
        ]
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_chat(
        &mut self,
        message_id: String,
        room_id: String,
        from_user_id: String,
        content: String,
        is_encrypted: bool,
        timestamp: u64,
        now: Instant,
    ) -> Vec<Effect> {
        let room_key = match self.current_room.as_ref() {
            Some(room) if room.id == room_id => room.key.clone(),
            _ => return Vec::new(),
        };

        if self.is_duplicate(&message_id, now) {
            debug!("dropped duplicate message {}", message_id);
            return Vec::new();
        }

        // A private message without a matching key still reaches the UI,
        // as a placeholder; the envelope is never dropped.
        let text = if is_encrypted {
            match &room_key {
                Some(key) => cipher::deobfuscate(&content, key)
                    .unwrap_or_else(|_| UNDECRYPTABLE.to_string()),
                None => UNDECRYPTABLE.to_string(),
            }
        } else {
            content
        };

        let from_username = self.peers.username_of(&from_user_id);
        vec![Effect::Emit(LinkEvent::MessageReceived(ChatMessage {
            message_id,
            room_id,
            from_user_id,
            from_username,
            content: text,
            is_encrypted,
            timestamp,
        }))]
    }

    /// True when this id was seen inside the dedup window. Remembers the
    /// id either way.
    fn is_duplicate(&mut self, message_id: &str, now: Instant) -> bool {
        let window = Duration::from_millis(MESSAGE_DEDUP_WINDOW_MS);
        while let Some((_, seen)) = self.recent_message_ids.front() {
            if now.duration_since(*seen) > window {
                self.recent_message_ids.pop_front();
            } else {
                break;
            }
        }

        if self
            .recent_message_ids
            .iter()
            .any(|(id, _)| id == message_id)
        {
            return true;
        }
        self.recent_message_ids
            .push_back((message_id.to_string(), now));
        false
    }

    fn room_state_changed(&self) -> Effect {
        Effect::Emit(LinkEvent::RoomStateChanged {
            room: self.current_room.as_ref().map(|room| RoomInfo {
                id: room.id.clone(),
                name: room.name.clone(),
                is_private: room.is_private,
                member_count: room.member_count(),
                created_by: room.created_by.clone(),
            }),
        })
    }
}

/// Short random message id; four hex characters are plenty inside the
/// 60 s dedup window.
fn generate_message_id() -> String {
    use rand::Rng;
    format!("{:04x}", rand::rng().random_range(0..0x10000u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new("self00000", "Me")
    }

    fn heartbeat_from(user_id: &str, username: &str) -> Datagram {
        Datagram::Heartbeat {
            user_id: user_id.to_string(),
            username: username.to_string(),
            timestamp: 0,
        }
    }

    fn events(effects: &[Effect]) -> Vec<&LinkEvent> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Emit(event) => Some(event),
                Effect::Send(_) => None,
            })
            .collect()
    }

    fn sends(effects: &[Effect]) -> Vec<&Datagram> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Send(datagram) => Some(datagram),
                Effect::Emit(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_own_heartbeat_is_dropped() {
        let mut session = manager();
        let effects = session.handle_datagram(heartbeat_from("self00000", "Me"), Instant::now());
        assert!(effects.is_empty());
    }

    #[test]
    fn test_heartbeat_emits_peer_seen() {
        let mut session = manager();
        let effects =
            session.handle_datagram(heartbeat_from("a1b2c3d4e", "Alice"), Instant::now());
        assert_eq!(
            events(&effects),
            vec![&LinkEvent::PeerSeen {
                user_id: "a1b2c3d4e".to_string(),
                username: "Alice".to_string(),
            }]
        );
    }

    #[test]
    fn test_invite_for_someone_else_is_ignored() {
        let mut session = manager();
        let invite = Datagram::Invite {
            from_user_id: "a1b2c3d4e".to_string(),
            from_username: String::new(),
            to_user_id: "not-me-99".to_string(),
            room_id: "r42".to_string(),
            room_name: room_display_name("r42"),
            is_private: false,
            key: None,
            timestamp: 0,
        };
        assert!(session.handle_datagram(invite, Instant::now()).is_empty());
    }

    #[test]
    fn test_invite_to_self_surfaces_with_resolved_name() {
        let mut session = manager();
        let now = Instant::now();
        session.handle_datagram(heartbeat_from("a1b2c3d4e", "Alice"), now);

        let invite = Datagram::Invite {
            from_user_id: "a1b2c3d4e".to_string(),
            from_username: String::new(),
            to_user_id: "self00000".to_string(),
            room_id: "r42".to_string(),
            room_name: room_display_name("r42"),
            is_private: false,
            key: None,
            timestamp: 0,
        };
        let effects = session.handle_datagram(invite, now);
        match events(&effects).as_slice() {
            [LinkEvent::InviteReceived(details)] => {
                assert_eq!(details.from_username, "Alice");
                assert_eq!(details.room_id, "r42");
            }
            other => panic!("unexpected effects: {:?}", other),
        }
    }

    #[test]
    fn test_join_adds_member_and_announces() {
        let mut session = manager();
        let now = Instant::now();
        session.handle_datagram(heartbeat_from("a1b2c3d4e", "Alice"), now);
        session.create_or_join_room(RoomOptions {
            room_id: Some("r42".to_string()),
            is_private: false,
            ..Default::default()
        });

        let join = Datagram::JoinRoom {
            user_id: "a1b2c3d4e".to_string(),
            username: String::new(),
            room_id: "r42".to_string(),
            timestamp: 0,
        };
        let effects = session.handle_datagram(join, now);

        let room = session.current_room().unwrap();
        assert!(room.members.contains("self00000"));
        assert!(room.members.contains("a1b2c3d4e"));

        assert!(events(&effects).iter().any(|event| matches!(
            event,
            LinkEvent::SystemMessage { text } if text == "Alice joined the room"
        )));
    }

    #[test]
    fn test_join_for_other_room_ignored() {
        let mut session = manager();
        session.create_or_join_room(RoomOptions {
            room_id: Some("r42".to_string()),
            is_private: false,
            ..Default::default()
        });

        let join = Datagram::JoinRoom {
            user_id: "a1b2c3d4e".to_string(),
            username: String::new(),
            room_id: "other".to_string(),
            timestamp: 0,
        };
        assert!(session.handle_datagram(join, Instant::now()).is_empty());
        assert_eq!(session.current_room().unwrap().member_count(), 1);
    }

    #[test]
    fn test_private_room_creator_repushes_key_on_join() {
        let mut session = manager();
        session.create_or_join_room(RoomOptions {
            room_id: Some("r42".to_string()),
            is_private: true,
            ..Default::default()
        });
        let key = session.current_room().unwrap().key.clone().unwrap();

        let join = Datagram::JoinRoom {
            user_id: "a1b2c3d4e".to_string(),
            username: String::new(),
            room_id: "r42".to_string(),
            timestamp: 0,
        };
        let effects = session.handle_datagram(join, Instant::now());

        match sends(&effects).as_slice() {
            [Datagram::PrivateKey {
                room_id,
                key: sent_key,
                ..
            }] => {
                assert_eq!(room_id, "r42");
                assert_eq!(sent_key, &key);
            }
            other => panic!("expected key push, got {:?}", other),
        }
    }

    #[test]
    fn test_leave_removes_member() {
        let mut session = manager();
        let now = Instant::now();
        session.handle_datagram(heartbeat_from("a1b2c3d4e", "Alice"), now);
        session.create_or_join_room(RoomOptions {
            room_id: Some("r42".to_string()),
            is_private: false,
            ..Default::default()
        });
        session.handle_datagram(
            Datagram::JoinRoom {
                user_id: "a1b2c3d4e".to_string(),
                username: String::new(),
                room_id: "r42".to_string(),
                timestamp: 0,
            },
            now,
        );

        let effects = session.handle_datagram(
            Datagram::LeaveRoom {
                user_id: "a1b2c3d4e".to_string(),
                username: String::new(),
                room_id: "r42".to_string(),
                timestamp: 0,
            },
            now,
        );

        assert!(!session.current_room().unwrap().members.contains("a1b2c3d4e"));
        assert!(events(&effects).iter().any(|event| matches!(
            event,
            LinkEvent::SystemMessage { text } if text == "Alice left the room"
        )));
    }

    #[test]
    fn test_chat_in_current_room_is_delivered() {
        let mut session = manager();
        let now = Instant::now();
        session.handle_datagram(heartbeat_from("a1b2c3d4e", "Alice"), now);
        session.create_or_join_room(RoomOptions {
            room_id: Some("r42".to_string()),
            is_private: false,
            ..Default::default()
        });

        let chat = Datagram::Chat {
            message_id: "0001".to_string(),
            room_id: "r42".to_string(),
            from_user_id: "a1b2c3d4e".to_string(),
            from_username: String::new(),
            content: "hello".to_string(),
            is_encrypted: false,
            timestamp: 7,
        };
        let effects = session.handle_datagram(chat, now);

        match events(&effects).as_slice() {
            [LinkEvent::MessageReceived(message)] => {
                assert_eq!(message.content, "hello");
                assert_eq!(message.from_username, "Alice");
                assert!(!message.is_encrypted);
            }
            other => panic!("unexpected effects: {:?}", other),
        }
    }

    #[test]
    fn test_chat_for_other_room_is_ignored() {
        let mut session = manager();
        session.create_or_join_room(RoomOptions {
            room_id: Some("r42".to_string()),
            is_private: false,
            ..Default::default()
        });

        let chat = Datagram::Chat {
            message_id: "0001".to_string(),
            room_id: "other".to_string(),
            from_user_id: "a1b2c3d4e".to_string(),
            from_username: String::new(),
            content: "hello".to_string(),
            is_encrypted: false,
            timestamp: 0,
        };
        assert!(session.handle_datagram(chat, Instant::now()).is_empty());
    }

    #[test]
    fn test_duplicate_message_id_dropped_inside_window() {
        let mut session = manager();
        let now = Instant::now();
        session.create_or_join_room(RoomOptions {
            room_id: Some("r42".to_string()),
            is_private: false,
            ..Default::default()
        });

        let chat = |mid: &str| Datagram::Chat {
            message_id: mid.to_string(),
            room_id: "r42".to_string(),
            from_user_id: "a1b2c3d4e".to_string(),
            from_username: String::new(),
            content: "hello".to_string(),
            is_encrypted: false,
            timestamp: 0,
        };

        assert_eq!(session.handle_datagram(chat("0001"), now).len(), 1);
        assert!(session.handle_datagram(chat("0001"), now).is_empty());

        // Outside the 60 s window the same id is fresh again.
        let later = now + Duration::from_secs(61);
        assert_eq!(session.handle_datagram(chat("0001"), later).len(), 1);
    }

    #[test]
    fn test_private_chat_decrypts_with_key() {
        let mut session = manager();
        let now = Instant::now();
        session.create_or_join_room(RoomOptions {
            room_id: Some("r42".to_string()),
            is_private: false,
            ..Default::default()
        });
        session.handle_datagram(
            Datagram::PrivateKey {
                room_id: "r42".to_string(),
                from_user_id: "a1b2c3d4e".to_string(),
                key: "k".to_string(),
                timestamp: 0,
            },
            now,
        );

        let chat = Datagram::Chat {
            message_id: "0001".to_string(),
            room_id: "r42".to_string(),
            from_user_id: "a1b2c3d4e".to_string(),
            from_username: String::new(),
            content: "0302".to_string(),
            is_encrypted: true,
            timestamp: 0,
        };
        let effects = session.handle_datagram(chat, now);

        match events(&effects).as_slice() {
            [LinkEvent::MessageReceived(message)] => {
                assert_eq!(message.content, "hi");
                assert!(message.is_encrypted);
            }
            other => panic!("unexpected effects: {:?}", other),
        }
    }

    #[test]
    fn test_private_chat_without_key_shows_placeholder() {
        let mut session = manager();
        session.create_or_join_room(RoomOptions {
            room_id: Some("r42".to_string()),
            is_private: false,
            ..Default::default()
        });

        let chat = Datagram::Chat {
            message_id: "0001".to_string(),
            room_id: "r42".to_string(),
            from_user_id: "a1b2c3d4e".to_string(),
            from_username: String::new(),
            content: "0302".to_string(),
            is_encrypted: true,
            timestamp: 0,
        };
        let effects = session.handle_datagram(chat, Instant::now());

        match events(&effects).as_slice() {
            [LinkEvent::MessageReceived(message)] => {
                assert_eq!(message.content, UNDECRYPTABLE);
            }
            other => panic!("unexpected effects: {:?}", other),
        }
    }

    #[test]
    fn test_toggle_privacy_encrypts_outgoing() {
        let mut session = manager();
        session.create_or_join_room(RoomOptions {
            room_id: Some("r42".to_string()),
            is_private: false,
            ..Default::default()
        });

        let effects = session.toggle_privacy().unwrap();
        assert!(sends(&effects)
            .iter()
            .any(|datagram| matches!(datagram, Datagram::PrivateKey { .. })));

        let (datagram, echo) = session.build_chat("hi").unwrap();
        match datagram {
            Datagram::Chat {
                content,
                is_encrypted,
                ..
            } => {
                assert!(is_encrypted);
                assert_ne!(content, "hi");
                assert!(content.chars().all(|c| c.is_ascii_hexdigit()));
            }
            other => panic!("wrong datagram: {:?}", other),
        }
        assert_eq!(echo.content, "hi");

        // Back to public: outgoing chat is cleartext again.
        session.toggle_privacy().unwrap();
        let (datagram, _) = session.build_chat("hi").unwrap();
        match datagram {
            Datagram::Chat {
                content,
                is_encrypted,
                ..
            } => {
                assert!(!is_encrypted);
                assert_eq!(content, "hi");
            }
            other => panic!("wrong datagram: {:?}", other),
        }
    }

    #[test]
    fn test_chat_outside_room_fails() {
        let mut session = manager();
        assert!(matches!(
            session.build_chat("hello"),
            Err(LinkError::NotInRoom)
        ));
    }

    #[test]
    fn test_invite_requires_known_peer() {
        let mut session = manager();
        session.create_or_join_room(RoomOptions::default());
        assert!(matches!(
            session.build_invite("stranger99"),
            Err(LinkError::UnknownPeer(_))
        ));
    }

    #[test]
    fn test_session_sweep_marks_offline() {
        let mut session = manager();
        let t0 = Instant::now();
        session.handle_datagram(heartbeat_from("a1b2c3d4e", "Alice"), t0);

        // Quiet for 29 s: still connected. At 31 s: offline.
        assert!(session.sweep(t0 + Duration::from_secs(29)).is_empty());
        let effects = session.sweep(t0 + Duration::from_secs(31));
        assert_eq!(
            events(&effects),
            vec![&LinkEvent::PeerOffline {
                user_id: "a1b2c3d4e".to_string(),
                username: "Alice".to_string(),
            }]
        );
    }

    #[test]
    fn test_room_advert_only_when_public() {
        let mut session = manager();
        assert!(session.room_advert().is_none());

        session.create_or_join_room(RoomOptions {
            room_id: Some("r42".to_string()),
            is_private: false,
            ..Default::default()
        });
        match session.room_advert() {
            Some(Datagram::RoomUpdate {
                room_id,
                member_count,
                ..
            }) => {
                assert_eq!(room_id, "r42");
                assert_eq!(member_count, 1);
            }
            other => panic!("expected advert, got {:?}", other),
        }

        session.toggle_privacy().unwrap();
        assert!(session.room_advert().is_none());
    }

    #[test]
    fn test_advert_for_foreign_room_surfaces() {
        let mut session = manager();
        let advert = Datagram::RoomUpdate {
            room_id: "r77".to_string(),
            room_name: room_display_name("r77"),
            is_private: false,
            member_count: 2,
            created_by: "a1b2c3d4e".to_string(),
            timestamp: 0,
        };
        let effects = session.handle_datagram(advert, Instant::now());
        match events(&effects).as_slice() {
            [LinkEvent::RoomAdvertised(info)] => {
                assert_eq!(info.id, "r77");
                assert_eq!(info.member_count, 2);
            }
            other => panic!("unexpected effects: {:?}", other),
        }
    }
}
