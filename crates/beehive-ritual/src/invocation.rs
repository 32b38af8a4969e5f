//! Invocation record protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Additive metadata bag attached to an invocation.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Invocation state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl InvocationStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Forward-only transitions. Terminal states accept nothing.
    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Pending => matches!(target, Self::Running),
            Self::Running => matches!(target, Self::Completed | Self::Failed),
            Self::Completed | Self::Failed => false,
        }
    }

    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRecord {
    pub id: String,
    pub ritual: String,
    pub status: InvocationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl InvocationRecord {
    /// New pending invocation with a fresh id.
    pub fn new(
        ritual: impl Into<String>,
        payload: Option<serde_json::Value>,
        metadata: Option<Metadata>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("invocation-{}", uuid::Uuid::new_v4()),
            ritual: ritual.into(),
            status: InvocationStatus::Pending,
            created_at: now,
            updated_at: now,
            payload,
            metadata: metadata.unwrap_or_default(),
            notes: Vec::new(),
        }
    }

    /// Move to `status`, appending the note and merging metadata.
    ///
    /// Returns `None` when the transition is not allowed; the record is left untouched.
    pub fn advance(
        &self,
        status: InvocationStatus,
        note: Option<&str>,
        metadata: Option<&Metadata>,
    ) -> Option<Self> {
        if !self.status.can_transition_to(status) {
            return None;
        }
        let mut next = self.annotate(note, metadata);
        next.status = status;
        Some(next)
    }

    /// Append a note and merge metadata without touching the status.
    pub fn annotate(&self, note: Option<&str>, metadata: Option<&Metadata>) -> Self {
        let mut next = self.clone();
        next.updated_at = Utc::now();
        if let Some(note) = note {
            next.notes.push(note.to_string());
        }
        if let Some(metadata) = metadata {
            merge_metadata(&mut next.metadata, metadata);
        }
        next
    }
}

/// Shallow additive merge: later keys win, no key is ever removed.
pub fn merge_metadata(target: &mut Metadata, incoming: &Metadata) {
    for (key, value) in incoming {
        target.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_is_pending() {
        let record = InvocationRecord::new("risk-score", None, None);
        assert_eq!(record.status, InvocationStatus::Pending);
        assert!(record.id.starts_with("invocation-"));
        assert!(record.notes.is_empty());
    }

    #[test]
    fn test_transitions_are_forward_only() {
        use InvocationStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Running));
    }

    #[test]
    fn test_advance_rejects_backwards_move() {
        let record = InvocationRecord::new("label-pr", None, None);
        let running = record.advance(InvocationStatus::Running, Some("go"), None).unwrap();
        assert!(running.advance(InvocationStatus::Pending, None, None).is_none());
        assert_eq!(running.notes, vec!["go"]);
    }

    #[test]
    fn test_merge_is_additive_later_wins() {
        let mut target = meta(json!({"a": 1, "b": 1}));
        merge_metadata(&mut target, &meta(json!({"b": 2, "c": 3})));
        assert_eq!(serde_json::Value::Object(target), json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn test_annotate_keeps_status() {
        let record = InvocationRecord::new("ping", None, Some(meta(json!({"jobId": "j"}))));
        let annotated = record.annotate(Some("note"), Some(&meta(json!({"x": true}))));
        assert_eq!(annotated.status, InvocationStatus::Pending);
        assert_eq!(annotated.metadata["jobId"], "j");
        assert_eq!(annotated.metadata["x"], true);
    }
}
