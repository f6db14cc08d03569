use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    #[serde(alias = "user_id")]
    pub user_id: String,
    pub name: String,
    #[serde(default, alias = "role")]
    pub privilege: u8,
}

/// Employees whose punches count, keyed by id.
///
/// Membership is checked at aggregation time so edits take effect on the
/// next cycle without re-reading old punches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    members: BTreeMap<String, RosterEntry>,
}

impl Roster {
    pub fn new(entries: impl IntoIterator<Item = RosterEntry>) -> Self {
        Self {
            members: entries
                .into_iter()
                .map(|entry| (entry.user_id.clone(), entry))
                .collect(),
        }
    }

    /// Keeps only enrolled users listed in `active_ids`. An empty list keeps
    /// everyone.
    pub fn from_enrolled(enrolled: Vec<RosterEntry>, active_ids: &[String]) -> Self {
        if active_ids.is_empty() {
            return Self::new(enrolled);
        }
        Self::new(
            enrolled
                .into_iter()
                .filter(|entry| active_ids.iter().any(|id| id == &entry.user_id)),
        )
    }

    pub fn contains(&self, employee_id: &str) -> bool {
        self.members.contains_key(employee_id)
    }

    pub fn name_of(&self, employee_id: &str) -> Option<&str> {
        self.members.get(employee_id).map(|entry| entry.name.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = &RosterEntry> {
        self.members.values()
    }

    pub fn to_vec(&self) -> Vec<RosterEntry> {
        self.members.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: &str) -> RosterEntry {
        RosterEntry {
            user_id: id.to_string(),
            name: name.to_string(),
            privilege: 0,
        }
    }

    #[test]
    fn active_ids_filter_enrolled_users() {
        let enrolled = vec![entry("36", "Ana"), entry("40", "Ben"), entry("424", "Lara")];
        let roster = Roster::from_enrolled(enrolled, &["40".into(), "424".into(), "999".into()]);

        assert_eq!(roster.len(), 2);
        assert!(!roster.contains("36"));
        assert_eq!(roster.name_of("424"), Some("Lara"));
    }

    #[test]
    fn empty_active_list_keeps_everyone() {
        let roster = Roster::from_enrolled(vec![entry("1", "A"), entry("2", "B")], &[]);
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn accepts_terminal_field_names() {
        let raw = r#"{"user_id":"1019","name":"Darlene","role":14}"#;
        let parsed: RosterEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.user_id, "1019");
        assert_eq!(parsed.privilege, 14);
    }
}
