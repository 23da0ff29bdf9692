//! Layouts a record header can be found in.
//!
//! A live cell starts with `payload length, rowid, header length, type codes`.
//! Deleting it lets SQLite write a 4-byte freeblock header (next freeblock
//! pointer, freeblock length) over the first bytes of the cell. Depending on
//! the widths of the overwritten varints, a different amount of the original
//! header survives.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Live or undamaged cell.
    Intact,
    /// Freeblock covers the prefix and the first column's type code.
    FirstTypeOverwritten,
    /// Freeblock covers payload length, rowid and header length exactly.
    PrefixOverwritten,
    /// Freeblock covers payload length and rowid exactly.
    LengthAndRowidOverwritten,
    /// Freeblock covers the first byte of a 2-byte header length.
    ArrayLengthSplit,
    /// Freeblock ends inside a multi-byte rowid.
    RowidSplit,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Intact,
        Scenario::FirstTypeOverwritten,
        Scenario::PrefixOverwritten,
        Scenario::LengthAndRowidOverwritten,
        Scenario::ArrayLengthSplit,
        Scenario::RowidSplit,
    ];

    /// Numeric identifier (0-5) used in configuration and output.
    pub fn index(&self) -> u8 {
        match self {
            Scenario::Intact => 0,
            Scenario::FirstTypeOverwritten => 1,
            Scenario::PrefixOverwritten => 2,
            Scenario::LengthAndRowidOverwritten => 3,
            Scenario::ArrayLengthSplit => 4,
            Scenario::RowidSplit => 5,
        }
    }

    pub fn from_index(index: u8) -> Option<Scenario> {
        Scenario::ALL.get(usize::from(index)).copied()
    }

    /// Returns true if the match begins with a freeblock header.
    pub fn is_freeblock(&self) -> bool {
        !matches!(self, Scenario::Intact)
    }

    /// Label stored alongside every recovered record.
    pub fn label(&self) -> String {
        format!("scenario {}", self.index())
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scenario {}", self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_round_trip() {
        for scenario in Scenario::ALL {
            assert_eq!(Scenario::from_index(scenario.index()), Some(scenario));
        }
        assert_eq!(Scenario::from_index(6), None);
    }

    #[test]
    fn test_label() {
        assert_eq!(Scenario::Intact.label(), "scenario 0");
        assert_eq!(Scenario::RowidSplit.to_string(), "scenario 5");
        assert!(!Scenario::Intact.is_freeblock());
        assert!(Scenario::ArrayLengthSplit.is_freeblock());
    }
}
