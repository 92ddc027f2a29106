//! Investigation categories and their fixed ordering.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// State of an investigation session.
///
/// The six investigated categories sit between the `Start` and `Complete`
/// markers and are always visited in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Start,
    Functionality,
    Users,
    Demographics,
    Design,
    Market,
    Technical,
    Review,
    Complete,
}

impl Category {
    /// Every state in transition order.
    pub const ORDER: [Category; 9] = [
        Category::Start,
        Category::Functionality,
        Category::Users,
        Category::Demographics,
        Category::Design,
        Category::Market,
        Category::Technical,
        Category::Review,
        Category::Complete,
    ];

    /// Categories that produce questions, in order.
    pub const INVESTIGATED: [Category; 7] = [
        Category::Functionality,
        Category::Users,
        Category::Demographics,
        Category::Design,
        Category::Market,
        Category::Technical,
        Category::Review,
    ];

    /// The state that follows this one. `Complete` is a fixed point.
    pub fn next(self) -> Category {
        match self {
            Category::Start => Category::Functionality,
            Category::Functionality => Category::Users,
            Category::Users => Category::Demographics,
            Category::Demographics => Category::Design,
            Category::Design => Category::Market,
            Category::Market => Category::Technical,
            Category::Technical => Category::Review,
            Category::Review => Category::Complete,
            Category::Complete => Category::Complete,
        }
    }

    /// Position in [`Category::ORDER`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_terminal(self) -> bool {
        self == Category::Complete
    }

    /// Whether questions are asked in this state.
    pub fn is_investigated(self) -> bool {
        !matches!(self, Category::Start | Category::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Start => "start",
            Category::Functionality => "functionality",
            Category::Users => "users",
            Category::Demographics => "demographics",
            Category::Design => "design",
            Category::Market => "market",
            Category::Technical => "technical",
            Category::Review => "review",
            Category::Complete => "complete",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ORDER
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| Error::UnknownCategory(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_follows_order() {
        for pair in Category::ORDER.windows(2) {
            assert_eq!(pair[0].next(), pair[1]);
        }
        assert_eq!(Category::Complete.next(), Category::Complete);
    }

    #[test]
    fn test_index_matches_order() {
        for (i, category) in Category::ORDER.iter().enumerate() {
            assert_eq!(category.index(), i);
        }
    }

    #[test]
    fn test_parse_roundtrip_and_unknown() {
        assert_eq!("Technical".parse::<Category>().unwrap(), Category::Technical);
        assert_eq!(" review ".parse::<Category>().unwrap(), Category::Review);
        assert!("pricing".parse::<Category>().is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Category::Demographics).unwrap();
        assert_eq!(json, "\"demographics\"");
    }

    #[test]
    fn test_investigated_excludes_markers() {
        assert!(!Category::Start.is_investigated());
        assert!(!Category::Complete.is_investigated());
        assert!(Category::INVESTIGATED.iter().all(|c| c.is_investigated()));
    }
}
