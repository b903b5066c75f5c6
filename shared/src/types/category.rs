//! Category keys and packet direction

use serde::{Deserialize, Serialize};

/// Category stored for events whose key is empty or blank.
pub const UNKNOWN_CATEGORY: &str = "UNKNOWN";

/// Opaque event category, e.g. a packet type name.
pub type CategoryKey = String;

/// Trim a raw category key, falling back to [`UNKNOWN_CATEGORY`] when nothing is left.
pub fn normalize_category(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        UNKNOWN_CATEGORY
    } else {
        trimmed
    }
}

/// Which side of the connection emitted a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received by the host (client -> server)
    Incoming,
    /// Sent by the host (server -> client)
    Outgoing,
}

impl Direction {
    pub fn is_outgoing(self) -> bool {
        matches!(self, Direction::Outgoing)
    }
}

impl std::str::FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "out" | "outgoing" | "server" | "send" | ">" => Ok(Direction::Outgoing),
            "in" | "incoming" | "client" | "recv" | "<" => Ok(Direction::Incoming),
            _ => anyhow::bail!("Invalid direction: {}", s),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Incoming => f.write_str("incoming"),
            Direction::Outgoing => f.write_str("outgoing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category("Handshake"), "Handshake");
        assert_eq!(normalize_category("  KeepAlive\n"), "KeepAlive");
        assert_eq!(normalize_category(""), UNKNOWN_CATEGORY);
        assert_eq!(normalize_category("   "), UNKNOWN_CATEGORY);
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("out".parse::<Direction>().unwrap(), Direction::Outgoing);
        assert_eq!("Incoming".parse::<Direction>().unwrap(), Direction::Incoming);
        assert_eq!("<".parse::<Direction>().unwrap(), Direction::Incoming);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_direction_display() {
        assert!(Direction::Outgoing.is_outgoing());
        assert!(!Direction::Incoming.is_outgoing());
        assert_eq!(Direction::Outgoing.to_string(), "outgoing");
        assert_eq!(Direction::Incoming.to_string(), "incoming");
    }
}
