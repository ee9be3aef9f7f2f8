//! Message direction relative to the archive owner.

use jid::BareJid;

/// Which way an archived message travelled, seen from the owner's side.
///
/// Both encodings are part of the stored/wire format and must stay
/// stable: outgoing messages carry the numeric code `0` and render as a
/// `to` element, incoming messages carry `1` and render as `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl Direction {
    /// Classify a message by its nominal author: a message authored by
    /// the owner is outgoing, anything else is incoming.
    pub fn from_author(owner: &BareJid, author: &BareJid) -> Self {
        if owner == author {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }

    /// Compact numeric code used for storage.
    pub fn value(self) -> i64 {
        match self {
            Direction::Outgoing => 0,
            Direction::Incoming => 1,
        }
    }

    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Direction::Outgoing),
            1 => Some(Direction::Incoming),
            _ => None,
        }
    }

    /// Protocol element name for this direction.
    pub fn element_name(self) -> &'static str {
        match self {
            Direction::Outgoing => "to",
            Direction::Incoming => "from",
        }
    }

    pub fn from_element_name(name: &str) -> Option<Self> {
        match name {
            "to" => Some(Direction::Outgoing),
            "from" => Some(Direction::Incoming),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jid(s: &str) -> BareJid {
        BareJid::new(s).expect("valid jid")
    }

    #[test]
    fn outgoing_iff_owner_is_author() {
        let owner = jid("alice@example.com");
        assert_eq!(
            Direction::from_author(&owner, &jid("alice@example.com")),
            Direction::Outgoing
        );
        assert_eq!(
            Direction::from_author(&owner, &jid("bob@example.com")),
            Direction::Incoming
        );
    }

    #[test]
    fn numeric_round_trip() {
        for direction in [Direction::Outgoing, Direction::Incoming] {
            assert_eq!(Direction::from_value(direction.value()), Some(direction));
        }
        assert_eq!(Direction::from_value(0), Some(Direction::Outgoing));
        assert_eq!(Direction::from_value(1), Some(Direction::Incoming));
        assert_eq!(Direction::from_value(2), None);
        assert_eq!(Direction::from_value(-1), None);
    }

    #[test]
    fn element_name_round_trip() {
        for direction in [Direction::Outgoing, Direction::Incoming] {
            assert_eq!(
                Direction::from_element_name(direction.element_name()),
                Some(direction)
            );
        }
        assert_eq!(Direction::from_element_name("to"), Some(Direction::Outgoing));
        assert_eq!(
            Direction::from_element_name("from"),
            Some(Direction::Incoming)
        );
        assert_eq!(Direction::from_element_name("sideways"), None);
    }
}
