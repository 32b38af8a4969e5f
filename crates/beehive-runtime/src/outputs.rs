//! Typed ritual results and the per-run output record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use beehive_core::{Error, Result};
use beehive_ritual::RitualResponse;

use crate::labels::LabelReport;
use crate::orchestrator::Phase;

/// TODO suggestions, normalized to three lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoSuggestions {
    #[serde(default)]
    pub immediate: Vec<Value>,
    #[serde(default, alias = "follow_ups")]
    pub follow_ups: Vec<Value>,
    #[serde(default)]
    pub notes: Vec<Value>,
}

impl TodoSuggestions {
    /// Accepts `{todos: ...}` or the bare suggestions; a bare list is treated as immediate.
    pub fn from_response(response: RitualResponse) -> Self {
        let value = match response {
            RitualResponse::Text(text) => {
                return Self {
                    notes: vec![Value::String(text)],
                    ..Default::default()
                }
            }
            RitualResponse::Json(value) => value,
        };
        let todos = match value {
            Value::Object(mut map) if map.contains_key("todos") => {
                map.remove("todos").unwrap_or(Value::Null)
            }
            other => other,
        };
        match todos {
            Value::Array(items) => Self {
                immediate: items,
                ..Default::default()
            },
            Value::Object(_) => serde_json::from_value(todos).unwrap_or_else(|_| Self {
                notes: vec![Value::String("Unrecognized TODO response".into())],
                ..Default::default()
            }),
            Value::Null => Self::default(),
            other => Self {
                notes: vec![other],
                ..Default::default()
            },
        }
    }

    pub fn total(&self) -> usize {
        self.immediate.len() + self.follow_ups.len() + self.notes.len()
    }
}

/// Result of the coherence check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceVerdict {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl CoherenceVerdict {
    pub fn from_response(ritual: &str, response: RitualResponse) -> Result<Self> {
        let value = response
            .as_json()
            .cloned()
            .ok_or_else(|| Error::malformed(ritual, "expected a JSON object"))?;
        serde_json::from_value(value).map_err(|e| Error::malformed(ritual, e.to_string()))
    }

    pub fn is_fail(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("FAIL")
    }

    pub fn reason_or_default(&self) -> &str {
        self.reason.as_deref().unwrap_or("Unknown cause")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub score: f64,
    pub level: RiskLevel,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
}

#[derive(Deserialize)]
struct RawRisk {
    score: Option<f64>,
    level: Option<String>,
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
}

impl RiskAssessment {
    pub fn from_response(ritual: &str, response: RitualResponse) -> Result<Self> {
        let value = response
            .as_json()
            .cloned()
            .ok_or_else(|| Error::malformed(ritual, "expected a JSON object"))?;
        let raw: RawRisk =
            serde_json::from_value(value).map_err(|e| Error::malformed(ritual, e.to_string()))?;

        let score = raw.score.ok_or_else(|| Error::malformed(ritual, "missing numeric score"))?;
        let level = raw
            .level
            .as_deref()
            .and_then(RiskLevel::parse)
            .ok_or_else(|| {
                Error::malformed(ritual, format!("unknown risk level {:?}", raw.level))
            })?;

        Ok(Self {
            score,
            level,
            reasons: raw.reasons,
            recommendations: raw.recommendations,
        })
    }

    pub fn is_high(&self) -> bool {
        self.level == RiskLevel::High
    }
}

/// Everything one run produced, phase by phase. Partial on failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RitualOutputs {
    pub job_id: String,
    pub current_phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub housekeeping: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub todos: Option<TodoSuggestions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<LabelReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forge: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coherence: Option<CoherenceVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewers: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preservation: Option<Value>,
}

impl RitualOutputs {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            current_phase: Phase::Initial,
            housekeeping: None,
            todos: None,
            labels: None,
            forge: None,
            coherence: None,
            risk: None,
            reviewers: None,
            gate: None,
            preservation: None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
