//! The shared room and the fixed set of named destinations.

use serde::Serialize;

pub const DEFAULT_ROOM: &str = "Staff Room";

pub const DEFAULT_DESTINATIONS: [&str; 6] = [
    "BMS-401",
    "Admin-103",
    "Block III-305",
    "Library",
    "Lab-201",
    "Cafeteria",
];

/// Canonical room name plus the enumerated destinations offered when a
/// scan checks someone out. The first destination is the default choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Places {
    room: String,
    destinations: Vec<String>,
}

impl Places {
    /// Blank entries are dropped; an empty room name or destination list
    /// falls back to the defaults.
    pub fn new(room: impl Into<String>, destinations: impl IntoIterator<Item = String>) -> Self {
        let room = room.into().trim().to_string();
        let destinations: Vec<String> = destinations
            .into_iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        let defaults = Self::default();
        Self {
            room: if room.is_empty() { defaults.room } else { room },
            destinations: if destinations.is_empty() {
                defaults.destinations
            } else {
                destinations
            },
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    pub fn default_destination(&self) -> &str {
        &self.destinations[0]
    }

    /// Look up a destination case-insensitively, returning its canonical
    /// spelling.
    pub fn find(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.destinations
            .iter()
            .find(|d| d.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }
}

impl Default for Places {
    fn default() -> Self {
        Self {
            room: DEFAULT_ROOM.to_string(),
            destinations: DEFAULT_DESTINATIONS.iter().map(|d| d.to_string()).collect(),
        }
    }
}
