//! Cached copy of the rendezvous service's peer table.
//!
//! The remote service owns this data.  The node only replaces its copy
//! wholesale on every push; it never merges or edits individual records.

use serde::{Deserialize, Serialize};

/// One remote peer as advertised by the rendezvous service.
///
/// Field names on the wire follow the service's JSON (`id`, `ip`, `files`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    #[serde(rename = "id")]
    pub identity_key: String,
    #[serde(rename = "ip")]
    pub address: String,
    pub port: u16,
    #[serde(rename = "files", default)]
    pub file_names: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PeerTable {
    records: Vec<PeerRecord>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole table.  Returns `true` if the contents differ.
    pub fn replace(&mut self, records: Vec<PeerRecord>) -> bool {
        if self.records == records {
            return false;
        }
        self.records = records;
        true
    }

    pub fn records(&self) -> &[PeerRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str, ip: &str) -> PeerRecord {
        PeerRecord {
            identity_key: id.to_string(),
            address: ip.to_string(),
            port: 5000,
            file_names: vec![],
        }
    }

    #[test]
    fn test_replace_discards_previous_records() {
        // Arrange
        let mut table = PeerTable::new();
        table.replace(vec![peer("old", "10.0.0.1")]);

        // Act
        let changed = table.replace(vec![peer("a", "10.0.0.2"), peer("b", "10.0.0.3")]);

        // Assert
        assert!(changed);
        assert_eq!(table.len(), 2);
        assert!(table.records().iter().all(|p| p.identity_key != "old"));
    }

    #[test]
    fn test_replace_with_identical_records_reports_unchanged() {
        let mut table = PeerTable::new();
        table.replace(vec![peer("a", "10.0.0.2")]);
        assert!(!table.replace(vec![peer("a", "10.0.0.2")]));
    }

    #[test]
    fn test_peer_record_uses_service_field_names() {
        let json = r#"{"id":"n1","ip":"192.168.1.20","port":5000,"files":["a.txt"]}"#;
        let record: PeerRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.identity_key, "n1");
        assert_eq!(record.address, "192.168.1.20");
        assert_eq!(record.file_names, vec!["a.txt".to_string()]);
    }

    #[test]
    fn test_peer_record_without_files_defaults_to_empty() {
        let json = r#"{"id":"n1","ip":"10.1.1.1","port":80}"#;
        let record: PeerRecord = serde_json::from_str(json).unwrap();
        assert!(record.file_names.is_empty());
    }
}
