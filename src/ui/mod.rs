pub mod progress;

use crate::link::{ChatMessage, LinkEvent};
use crate::session::Peer;

pub fn print_banner() {
    println!("soniclink — ultrasonic proximity chat");
}

/// One printable line per link event; returns None for events the
/// terminal front end does not surface.
pub fn render_event(event: &LinkEvent) -> Option<String> {
    match event {
        LinkEvent::PeerSeen { user_id, username } => {
            Some(format!("* {} ({}) is nearby", username, user_id))
        }
        LinkEvent::PeerLost { username, .. } => Some(format!("* {} went quiet", username)),
        LinkEvent::PeerOffline { username, .. } => Some(format!("* {} is offline", username)),
        LinkEvent::InviteReceived(invite) => Some(format!(
            "* {} invites you to {} — /accept to join",
            invite.from_username, invite.room_name
        )),
        LinkEvent::RoomStateChanged { room } => match room {
            Some(info) if info.is_private => {
                Some(format!("* now in {} (private)", info.name))
            }
            Some(info) => Some(format!("* now in {}", info.name)),
            None => Some("* not in a room".to_string()),
        },
        LinkEvent::RoomAdvertised(info) => Some(format!(
            "* {} is open nearby ({} members) — /join {}",
            info.name, info.member_count, info.id
        )),
        LinkEvent::MessageReceived(message) => Some(render_message(message)),
        LinkEvent::SystemMessage { text } => Some(format!("* {}", text)),
        LinkEvent::SendFailed { reason } => Some(format!("! send failed: {}", reason)),
        LinkEvent::DiscoveryStopped { reason } => match reason {
            Some(reason) => Some(format!("! discovery stopped: {}", reason)),
            None => Some("* discovery stopped".to_string()),
        },
    }
}

pub fn render_message(message: &ChatMessage) -> String {
    if message.is_encrypted {
        format!("<{}> [private] {}", message.from_username, message.content)
    } else {
        format!("<{}> {}", message.from_username, message.content)
    }
}

pub fn render_peer_list(peers: &[Peer]) -> String {
    if peers.is_empty() {
        return "no peers in earshot".to_string();
    }
    peers
        .iter()
        .map(|peer| format!("{} ({})", peer.username, peer.user_id))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_message() {
        let message = ChatMessage {
            message_id: "0001".to_string(),
            room_id: "r42".to_string(),
            from_user_id: "a1b2c3d4e".to_string(),
            from_username: "Alice".to_string(),
            content: "hello".to_string(),
            is_encrypted: false,
            timestamp: 0,
        };
        assert_eq!(render_message(&message), "<Alice> hello");
    }

    #[test]
    fn test_render_peer_list_empty() {
        assert_eq!(render_peer_list(&[]), "no peers in earshot");
    }
}
