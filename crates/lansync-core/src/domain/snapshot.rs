//! The consolidated state snapshot pushed to the presentation layer.
//!
//! A snapshot is an immutable value assembled after every state change.  It
//! deliberately excludes session tokens and absolute paths of shared files;
//! the passcode is included because the local user has to read it off the
//! screen.
//!
//! Serialised with camelCase keys so a web-based presentation layer can bind
//! to it directly.

use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use super::catalog::ReceivedFile;
use super::peers::PeerRecord;

/// Health of the rendezvous channel, shown to the user as the
/// public-reachability indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum TrackerStatus {
    /// No rendezvous URL configured.
    Disabled,
    /// Not connected; `reason` describes the last failure.
    Disconnected { reason: String },
    /// A connection attempt is in flight.
    Connecting { attempt: u32 },
    /// Registered with the service.
    Connected,
}

/// Presentation-facing view of a received file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedFileView {
    pub id: u64,
    pub name: String,
    pub sender: String,
    pub received_at_ms: u64,
}

impl From<&ReceivedFile> for ReceivedFileView {
    fn from(file: &ReceivedFile) -> Self {
        Self {
            id: file.id,
            name: file.name.clone(),
            sender: file.sender.clone(),
            received_at_ms: file
                .received_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub local_address: String,
    /// `None` when no public tunnel is available.
    pub public_address: Option<String>,
    pub shared_names: Vec<String>,
    pub received_files: Vec<ReceivedFileView>,
    pub presence_count: usize,
    pub passcode: String,
    pub port: u16,
    pub peers: Vec<PeerRecord>,
    pub rendezvous: TrackerStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn sample() -> StateSnapshot {
        StateSnapshot {
            local_address: "192.168.1.20".into(),
            public_address: None,
            shared_names: vec!["a.txt".into()],
            received_files: vec![],
            presence_count: 1,
            passcode: "4821".into(),
            port: 5000,
            peers: vec![],
            rendezvous: TrackerStatus::Connecting { attempt: 2 },
        }
    }

    #[test]
    fn test_snapshot_serialises_with_camel_case_keys() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["localAddress"], "192.168.1.20");
        assert!(json["publicAddress"].is_null());
        assert_eq!(json["sharedNames"][0], "a.txt");
        assert_eq!(json["presenceCount"], 1);
        assert_eq!(json["passcode"], "4821");
        assert_eq!(json["rendezvous"]["state"], "connecting");
        assert_eq!(json["rendezvous"]["attempt"], 2);
    }

    #[test]
    fn test_tracker_status_unit_variants_are_lowercase_tags() {
        let json = serde_json::to_string(&TrackerStatus::Connected).unwrap();
        assert_eq!(json, r#"{"state":"connected"}"#);
        let json = serde_json::to_string(&TrackerStatus::Disabled).unwrap();
        assert_eq!(json, r#"{"state":"disabled"}"#);
    }

    #[test]
    fn test_received_view_hides_storage_path() {
        let file = ReceivedFile {
            id: 7,
            name: "photo.jpg".into(),
            storage_path: PathBuf::from("/tmp/secret/photo.jpg"),
            sender: "Mobile-42".into(),
            received_at: UNIX_EPOCH + Duration::from_millis(1234),
        };

        let view = ReceivedFileView::from(&file);
        let json = serde_json::to_string(&view).unwrap();

        assert_eq!(view.received_at_ms, 1234);
        assert!(!json.contains("/tmp/secret"));
        assert!(json.contains("\"receivedAtMs\":1234"));
    }
}
