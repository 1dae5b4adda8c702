use serde::{Deserialize, Serialize};

use crate::db::{Record, RecordKind};

const PATH_SEPARATOR: &str = ", ";

/// Organizational unit. `path` is the comma-joined ancestry ending in the
/// jurisdiction's own name, e.g. `USA, State 1, County 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub name: String,
    pub path: String,
}

impl Record for Jurisdiction {
    const KIND: RecordKind = RecordKind::Jurisdiction;
}

impl Jurisdiction {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = path
            .rsplit(PATH_SEPARATOR)
            .next()
            .unwrap_or(path.as_str())
            .to_string();
        Self { name, path }
    }

    /// True when `other` is this jurisdiction or one of its descendants.
    pub fn contains(&self, other: &Jurisdiction) -> bool {
        other.path == self.path
            || other
                .path
                .strip_prefix(self.path.as_str())
                .is_some_and(|rest| rest.starts_with(PATH_SEPARATOR))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub jurisdiction_id: i64,
}

impl Record for User {
    const KIND: RecordKind = RecordKind::User;
}

/// Audit record of a patient moving between jurisdictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub from_jurisdiction_id: i64,
    pub to_jurisdiction_id: i64,
    pub who_id: i64,
}

impl Record for Transfer {
    const KIND: RecordKind = RecordKind::Transfer;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_is_last_path_segment() {
        assert_eq!(Jurisdiction::new("USA, State 1, County 1").name, "County 1");
        assert_eq!(Jurisdiction::new("USA").name, "USA");
    }

    #[test]
    fn test_contains_descendants_only() {
        let state = Jurisdiction::new("USA, State 1");
        assert!(state.contains(&Jurisdiction::new("USA, State 1")));
        assert!(state.contains(&Jurisdiction::new("USA, State 1, County 1")));
        assert!(!state.contains(&Jurisdiction::new("USA, State 10")));
        assert!(!state.contains(&Jurisdiction::new("USA")));
        assert!(!state.contains(&Jurisdiction::new("USA, State 2, County 1")));
    }
}
