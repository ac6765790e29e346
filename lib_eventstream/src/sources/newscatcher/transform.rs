//! # Fundraising Transform
//!
//! Maps one raw Newscatcher fundraising item to a [`NormalizedEvent`].
//!
//! The mapping is total: an item that cannot be read (not an object, or a
//! `fundraising` block of the wrong shape) yields a degraded event that keeps
//! the raw item in `original`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::model::{random_event_id, EventKind, Fundraising, NormalizedEvent, Severity};

#[derive(Debug, Error)]
enum TransformError {
    #[error("event is not an object")]
    NotAnObject,
    #[error("field '{0}' has an unexpected shape")]
    Shape(&'static str),
}

/// Converts a raw item, falling back to a degraded event on malformed input.
pub fn transform_fundraising(raw: &Value) -> NormalizedEvent {
    match try_transform(raw) {
        Ok(event) => event,
        Err(e) => {
            log::error!("Error transforming event data: {}", e);
            degraded(raw)
        }
    }
}

fn try_transform(raw: &Value) -> Result<NormalizedEvent, TransformError> {
    let item = raw.as_object().ok_or(TransformError::NotAnObject)?;
    let block = match item.get("fundraising") {
        None | Some(Value::Null) => None,
        Some(Value::Object(block)) => Some(block),
        Some(_) => return Err(TransformError::Shape("fundraising")),
    };

    let company = text(item, "company_name");
    let amount = block.and_then(amount);
    let currency = block
        .and_then(|b| text(b, "currency"))
        .unwrap_or("USD")
        .to_string();
    let funding_type = block
        .and_then(|b| text(b, "funding_type"))
        .unwrap_or("Fundraising")
        .to_string();
    let investors = match block.and_then(|b| b.get("investors")) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(_) => return Err(TransformError::Shape("investors")),
    };
    let raised = amount.map(|a| format_currency(a, &currency));

    let title = match block.and_then(|b| text(b, "title")) {
        Some(title) => title.to_string(),
        None => {
            let who = company.unwrap_or("Company");
            match &raised {
                Some(r) => format!("{who} Raises {r} in {funding_type} Round"),
                None => format!("{who} Announces {funding_type} Round"),
            }
        }
    };

    let impact = {
        let who = company.unwrap_or("Company");
        match &raised {
            Some(r) => format!("{who} secured {r} in {funding_type} funding"),
            None => format!("{who} secured new {funding_type} funding"),
        }
    };

    let details = match block.and_then(|b| text(b, "summary").or_else(|| text(b, "company_description"))) {
        Some(d) => d.to_string(),
        None => {
            let who = company.unwrap_or("The company");
            let from = if investors.is_empty() {
                "investors".to_string()
            } else {
                investors.join(", ")
            };
            match &raised {
                Some(r) => format!("{who} has raised {r} in {funding_type} funding from {from}."),
                None => format!("{who} has secured {funding_type} funding from {from}."),
            }
        }
    };

    Ok(NormalizedEvent {
        id: event_id(item),
        timestamp: timestamp(item),
        title,
        location: "Global".to_string(),
        region: "all".to_string(),
        severity: severity(amount),
        impact,
        details,
        kind: EventKind::Fundraising(Fundraising {
            company: company.unwrap_or("Unknown Company").to_string(),
            amount,
            currency,
            funding_type,
            investors,
            original: raw.clone(),
        }),
    })
}

fn degraded(raw: &Value) -> NormalizedEvent {
    let item = raw.as_object();
    let company = item.and_then(|i| text(i, "company_name"));

    NormalizedEvent {
        id: item.map_or_else(random_event_id, event_id),
        timestamp: item.map_or_else(Utc::now, timestamp),
        title: company.map_or_else(
            || "Fundraising Event".to_string(),
            |c| format!("{c} Fundraising"),
        ),
        location: "Unknown".to_string(),
        region: "all".to_string(),
        severity: Severity::Medium,
        impact: "Investment activity detected".to_string(),
        details: "Details unavailable due to processing error".to_string(),
        kind: EventKind::Fundraising(Fundraising {
            company: company.unwrap_or("Unknown Company").to_string(),
            amount: None,
            currency: "USD".to_string(),
            funding_type: "Fundraising".to_string(),
            investors: Vec::new(),
            original: raw.clone(),
        }),
    }
}

/// Non-empty string field.
fn text<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn event_id(item: &Map<String, Value>) -> String {
    match item.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => random_event_id(),
    }
}

fn timestamp(item: &Map<String, Value>) -> DateTime<Utc> {
    text(item, "extraction_date")
        .and_then(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                        .map(|ts| ts.and_utc())
                        .ok()
                })
        })
        .unwrap_or_else(Utc::now)
}

/// Amount as a positive finite number, accepting numeric strings.
fn amount(block: &Map<String, Value>) -> Option<f64> {
    let value = match block.get("amount")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

fn severity(amount: Option<f64>) -> Severity {
    amount.map_or(Severity::Medium, Severity::from_amount)
}

fn format_currency(amount: f64, currency: &str) -> String {
    if amount >= 1_000_000_000.0 {
        format!("{:.1}B {currency}", amount / 1_000_000_000.0)
    } else if amount >= 1_000_000.0 {
        format!("{:.1}M {currency}", amount / 1_000_000.0)
    } else if amount >= 1_000.0 {
        format!("{:.1}K {currency}", amount / 1_000.0)
    } else {
        format!("{amount} {currency}")
    }
}
