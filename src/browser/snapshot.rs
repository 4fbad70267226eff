//! Snapshot parsing for agent-browser output
//!
//! Parses the accessibility tree JSON from agent-browser. Text and role
//! locators are resolved against it because the CLI has no selector syntax
//! for accessible names.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Parsed snapshot from agent-browser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Whether the operation succeeded
    #[serde(default)]
    pub success: bool,
    /// Snapshot data
    #[serde(default)]
    pub data: Option<SnapshotData>,
}

/// Snapshot data content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotData {
    /// Raw snapshot string (accessibility tree)
    #[serde(default)]
    pub snapshot: String,
    /// Element refs mapped to their info
    #[serde(default)]
    pub refs: HashMap<String, Element>,
}

/// An element in the snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    /// ARIA role
    #[serde(default)]
    pub role: String,
    /// Accessible name
    #[serde(default)]
    pub name: String,
    /// Element value (for inputs)
    #[serde(default)]
    pub value: Option<String>,
}

/// Numeric part of a ref like `e12`, used to restore document order
fn ref_order(ref_id: &str) -> (u64, &str) {
    let digits: String = ref_id.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.parse().unwrap_or(u64::MAX), ref_id)
}

impl Snapshot {
    /// Count the number of elements with refs
    pub fn count_elements(&self) -> usize {
        self.data.as_ref().map(|d| d.refs.len()).unwrap_or(0)
    }

    /// Refs in document order
    fn ordered(&self) -> Vec<(&String, &Element)> {
        let mut refs: Vec<_> = self
            .data
            .as_ref()
            .map(|d| d.refs.iter().collect())
            .unwrap_or_default();
        refs.sort_by(|(a, _), (b, _)| ref_order(a).cmp(&ref_order(b)));
        refs
    }

    /// First element whose name contains `text`, case-insensitive
    pub fn first_by_text(&self, text: &str) -> Option<&str> {
        let text_lower = text.to_lowercase();
        self.ordered()
            .into_iter()
            .find(|(_, el)| el.name.to_lowercase().contains(&text_lower))
            .map(|(ref_id, _)| ref_id.as_str())
    }

    /// First element with `role`, optionally narrowed by a name substring
    pub fn first_by_role(&self, role: &str, name: Option<&str>) -> Option<&str> {
        let name_lower = name.map(str::to_lowercase);
        self.ordered()
            .into_iter()
            .find(|(_, el)| {
                el.role.eq_ignore_ascii_case(role)
                    && name_lower
                        .as_deref()
                        .map_or(true, |n| el.name.to_lowercase().contains(n))
            })
            .map(|(ref_id, _)| ref_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(role: &str, name: &str) -> Element {
        Element {
            role: role.to_string(),
            name: name.to_string(),
            value: None,
        }
    }

    fn snapshot() -> Snapshot {
        let mut refs = HashMap::new();
        refs.insert("e10".to_string(), element("button", "Publish site"));
        refs.insert("e2".to_string(), element("button", "Create"));
        refs.insert("e3".to_string(), element("textbox", "Enter a site name"));
        refs.insert("e1".to_string(), element("link", "Create new site"));

        Snapshot {
            success: true,
            data: Some(SnapshotData {
                snapshot: String::new(),
                refs,
            }),
        }
    }

    #[test]
    fn test_text_match_follows_document_order() {
        let snapshot = snapshot();
        assert_eq!(snapshot.count_elements(), 4);
        assert_eq!(snapshot.first_by_text("create"), Some("e1"));
        assert_eq!(snapshot.first_by_text("nothing here"), None);
    }

    #[test]
    fn test_role_match_with_name() {
        let snapshot = snapshot();
        assert_eq!(snapshot.first_by_role("button", None), Some("e2"));
        assert_eq!(snapshot.first_by_role("button", Some("publish")), Some("e10"));
        assert_eq!(snapshot.first_by_role("checkbox", None), None);
    }

    #[test]
    fn test_parse_cli_json() {
        let json = r#"{"success":true,"data":{"snapshot":"- button \"Next\" [ref=e1]","refs":{"e1":{"role":"button","name":"Next"}}}}"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.first_by_role("button", Some("next")), Some("e1"));
    }
}
