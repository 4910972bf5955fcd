//! Local room state. At most one current room per device; its member set
//! always contains the local user while the room is held.

use std::collections::BTreeSet;

use super::datagram::room_display_name;

#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub is_private: bool,
    pub members: BTreeSet<String>,
    pub created_by: String,
    pub created_at: u64,
    pub key: Option<String>,
}

impl Room {
    pub fn new(id: impl Into<String>, created_by: impl Into<String>, created_at: u64) -> Self {
        let id = id.into();
        let created_by = created_by.into();
        let mut members = BTreeSet::new();
        members.insert(created_by.clone());

        Self {
            name: room_display_name(&id),
            id,
            is_private: false,
            members,
            created_by,
            created_at,
            key: None,
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Fresh room id: "r" plus four hex characters.
    pub fn generate_id() -> String {
        use rand::Rng;
        format!("r{:04x}", rand::rng().random_range(0..0x10000u32))
    }
}

/// Options accepted by the create-or-join operation.
#[derive(Debug, Clone, Default)]
pub struct RoomOptions {
    /// Join this id; a fresh id is generated when absent.
    pub room_id: Option<String>,
    pub is_private: bool,
    /// Creator of an advertised room being joined; the local user when
    /// creating.
    pub created_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_room_contains_creator() {
        let room = Room::new("r42", "a1b2c3d4e", 0);
        assert_eq!(room.name, "Chat room r42");
        assert!(room.members.contains("a1b2c3d4e"));
        assert_eq!(room.member_count(), 1);
        assert!(!room.is_private);
        assert!(room.key.is_none());
    }

    #[test]
    fn test_generated_id_shape() {
        let id = Room::generate_id();
        assert_eq!(id.len(), 5);
        assert!(id.starts_with('r'));
        assert!(id[1..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
