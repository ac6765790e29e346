//! # Subscriber Filters
//!
//! An [`EventFilter`] maps field names to a wanted value. A field left out,
//! empty or set to `"all"` is unconstrained. The other fields are compared
//! according to their meaning:
//!
//! | field         | match                                              |
//! |---------------|----------------------------------------------------|
//! | `region`      | exact                                              |
//! | `severity`    | exact                                              |
//! | `type`        | exact on the event tag                             |
//! | `fundingType` | exact, fundraising events only                     |
//! | `amount`      | bucket: `high` >= 100M, `medium` >= 10M, `low`     |
//! | `company`     | case-insensitive substring, fundraising events only|
//!
//! A constrained field that the event's variant does not carry never matches.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::model::{NormalizedEvent, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountBucket {
    Low,
    Medium,
    High,
}

impl AmountBucket {
    /// Buckets share the fundraising severity thresholds.
    pub fn contains(&self, amount: f64) -> bool {
        let wanted = match self {
            AmountBucket::High => Severity::High,
            AmountBucket::Medium => Severity::Medium,
            AmountBucket::Low => Severity::Low,
        };
        Severity::from_amount(amount) == wanted
    }
}

impl FromStr for AmountBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(AmountBucket::Low),
            "medium" => Ok(AmountBucket::Medium),
            "high" => Ok(AmountBucket::High),
            other => Err(format!("unknown amount bucket '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventFilter {
    pub region: Option<String>,
    pub severity: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub funding_type: Option<String>,
    pub amount: Option<String>,
    pub company: Option<String>,
}

/// Returns the wanted value, or `None` when the field is unconstrained.
fn constraint(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

impl EventFilter {
    pub fn is_unconstrained(&self) -> bool {
        [
            &self.region,
            &self.severity,
            &self.event_type,
            &self.funding_type,
            &self.amount,
            &self.company,
        ]
        .into_iter()
        .all(|field| constraint(field).is_none())
    }

    pub fn matches(&self, event: &NormalizedEvent) -> bool {
        if let Some(region) = constraint(&self.region) {
            if event.region != region {
                return false;
            }
        }

        if let Some(severity) = constraint(&self.severity) {
            if event.severity.as_str() != severity {
                return false;
            }
        }

        if let Some(event_type) = constraint(&self.event_type) {
            if event.event_type() != event_type {
                return false;
            }
        }

        let fundraising = event.fundraising();

        if let Some(funding_type) = constraint(&self.funding_type) {
            match fundraising {
                Some(f) if f.funding_type == funding_type => {}
                _ => return false,
            }
        }

        // Unknown bucket names leave the field unconstrained.
        if let Some(bucket) = constraint(&self.amount).and_then(|a| a.parse::<AmountBucket>().ok()) {
            match fundraising {
                // Undisclosed amounts count as zero.
                Some(f) if bucket.contains(f.amount.unwrap_or(0.0)) => {}
                _ => return false,
            }
        }

        if let Some(company) = constraint(&self.company) {
            let needle = company.to_lowercase();
            match fundraising {
                Some(f) if f.company.to_lowercase().contains(&needle) => {}
                _ => return false,
            }
        }

        true
    }
}

/// Keeps the events accepted by `filter`, preserving their order.
pub fn filter_events<'a, I>(events: I, filter: &EventFilter) -> Vec<&'a NormalizedEvent>
where
    I: IntoIterator<Item = &'a NormalizedEvent>,
{
    events.into_iter().filter(|e| filter.matches(e)).collect()
}
