//! # Normalized Event Model
//!
//! Every feed converts its raw items into a [`NormalizedEvent`]: a common
//! envelope (id, timestamp, headline fields) plus an [`EventKind`] payload
//! selected by the `type` tag. Serialized, the tag and the payload fields are
//! flattened into the envelope so one record is one flat JSON object.

use chrono::{DateTime, Utc};
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Raised amounts at or above this are high severity.
    pub const HIGH_AMOUNT: f64 = 100_000_000.0;
    /// Raised amounts at or above this (and below `HIGH_AMOUNT`) are medium.
    pub const MEDIUM_AMOUNT: f64 = 10_000_000.0;

    /// Severity of a disclosed fundraising amount.
    pub fn from_amount(amount: f64) -> Self {
        if amount >= Self::HIGH_AMOUNT {
            Severity::High
        } else if amount >= Self::MEDIUM_AMOUNT {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Payload of a fundraising announcement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fundraising {
    pub company: String,
    /// Raised amount; `None` when undisclosed.
    pub amount: Option<f64>,
    pub currency: String,
    pub funding_type: String,
    pub investors: Vec<String>,
    /// The untouched upstream item.
    pub original: Value,
}

/// Type-specific part of an event, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventKind {
    Fundraising(Fundraising),
    Port,
    Weather,
    Infrastructure,
    Political,
}

impl EventKind {
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::Fundraising(_) => "fundraising",
            EventKind::Port => "port",
            EventKind::Weather => "weather",
            EventKind::Infrastructure => "infrastructure",
            EventKind::Political => "political",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub location: String,
    pub region: String,
    pub severity: Severity,
    pub impact: String,
    pub details: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl NormalizedEvent {
    pub fn event_type(&self) -> &'static str {
        self.kind.tag()
    }

    pub fn fundraising(&self) -> Option<&Fundraising> {
        match &self.kind {
            EventKind::Fundraising(details) => Some(details),
            _ => None,
        }
    }

    /// Returns a copy carrying a new identity, used to replay fixtures as live data.
    pub fn restamped(&self, id: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            timestamp,
            ..self.clone()
        }
    }
}

/// Generates an `evt-` prefixed id with nine random lowercase alphanumerics.
pub fn random_event_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("evt-{suffix}")
}
