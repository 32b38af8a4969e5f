//! Badge documents for third-party badge renderers.

use serde::Serialize;
use serde_json::{json, Value};

use beehive_store::{CurrentPointer, MutationStatus};

use crate::status::{DeploySnapshot, DeployStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub schema_version: u8,
    pub label: String,
    pub message: String,
    pub color: String,
    pub extra: Value,
}

impl Badge {
    fn new(label: &str, message: &str, color: &str, extra: Value) -> Self {
        Self {
            schema_version: 1,
            label: label.to_string(),
            message: message.to_string(),
            color: color.to_string(),
            extra,
        }
    }
}

pub fn deploy_badge(current: Option<&DeploySnapshot>) -> Badge {
    let (message, color) = match current.map(|s| s.status) {
        Some(DeployStatus::Success) => ("success", "green"),
        Some(DeployStatus::Failed) => ("failed", "red"),
        Some(DeployStatus::Deploying) => ("deploying", "blue"),
        Some(DeployStatus::Building) => ("building", "yellow"),
        Some(DeployStatus::Queued) | None => ("unknown", "lightgrey"),
    };
    let extra = match current {
        Some(s) => json!({ "jobId": s.job_id, "previewUrl": s.preview_url }),
        None => json!({ "jobId": null, "previewUrl": null }),
    };
    Badge::new("beehive deploy", message, color, extra)
}

pub fn ritual_badge(current: Option<&CurrentPointer>) -> Badge {
    let (message, color) = match current.map(|c| c.status) {
        Some(MutationStatus::Ok) => ("OK", "green"),
        Some(MutationStatus::Fail) => ("FAIL", "red"),
        None => ("unknown", "lightgrey"),
    };
    let extra = match current {
        Some(c) => json!({ "ritual": c.ritual, "actor": c.actor, "updatedAt": c.timestamp }),
        None => json!({}),
    };
    Badge::new("beehive ritual", message, color, extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::DeployEcho;
    use beehive_store::MutationRecord;
    use chrono::Utc;

    fn snapshot(status: DeployStatus) -> DeploySnapshot {
        DeploySnapshot::from_echo(DeployEcho::new("J1", status), None, Utc::now())
    }

    #[test]
    fn test_deploy_color_mapping() {
        let cases = [
            (DeployStatus::Success, "success", "green"),
            (DeployStatus::Failed, "failed", "red"),
            (DeployStatus::Deploying, "deploying", "blue"),
            (DeployStatus::Building, "building", "yellow"),
            (DeployStatus::Queued, "unknown", "lightgrey"),
        ];
        for (status, message, color) in cases {
            let badge = deploy_badge(Some(&snapshot(status)));
            assert_eq!(badge.color, color);
            assert_eq!(badge.message, message);
            assert_eq!(badge.extra["jobId"], "J1");
        }
    }

    #[test]
    fn test_missing_current_is_unknown() {
        let badge = deploy_badge(None);
        assert_eq!(badge.message, "unknown");
        assert_eq!(badge.color, "lightgrey");
        assert_eq!(ritual_badge(None).message, "unknown");
    }

    #[test]
    fn test_badge_schema_fields() {
        let value = serde_json::to_value(deploy_badge(None)).unwrap();
        assert_eq!(value["schemaVersion"], 1);
        assert!(value.get("label").is_some());
        assert!(value.get("extra").is_some());
    }

    #[test]
    fn test_ritual_badge_from_pointer() {
        let ok = CurrentPointer::from(&MutationRecord::ok("bot", "orchestrator", "done"));
        assert_eq!(ritual_badge(Some(&ok)).color, "green");
        assert_eq!(ritual_badge(Some(&ok)).message, "OK");
        let fail = CurrentPointer::from(&MutationRecord::fail("bot", "broadcast", "x"));
        assert_eq!(ritual_badge(Some(&fail)).message, "FAIL");
    }
}
