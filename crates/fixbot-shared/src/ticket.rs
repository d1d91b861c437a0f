//! The materialization target: a persisted maintenance ticket.
//!
//! Field values carry the same display formatting as the rendered wizard
//! message, so the ticket matches what the reporter confirmed on screen.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::field::Priority;

/// Lifecycle status of a filed ticket. The wizard only ever creates
/// `Open` tickets; the rest belongs to the desk tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Closed,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::InProgress => write!(f, "in-progress"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A fully collected ticket, ready for the ticket sink. Every optional
/// field is `None` exactly when the category's rule did not require it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTicket {
    pub issue_text: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub priority: Priority,
    /// Flat location string, tree path joined for display.
    pub location: Option<String>,
    pub source_location: Option<String>,
    pub target_location: Option<String>,
    pub agency_involved: Option<bool>,
    pub agency_name: Option<String>,
    pub agency_date: Option<NaiveDate>,
    /// Rule-declared additional field values, by rule key.
    pub extra_fields: BTreeMap<String, String>,
    pub media_urls: Vec<String>,
    pub chat_id: String,
    pub created_by: String,
}

impl NewTicket {
    /// One-line summary for the permanent confirmation message.
    pub fn summary(&self) -> String {
        let mut parts = vec![self.category.clone(), self.priority.label().to_string()];
        if let Some(sub) = &self.subcategory {
            parts.push(sub.clone());
        }
        if let Some(loc) = &self.location {
            parts.push(loc.clone());
        }
        if let (Some(src), Some(dst)) = (&self.source_location, &self.target_location) {
            parts.push(format!("{} → {}", src, dst));
        }
        parts.join(" · ")
    }
}

/// A persisted ticket as the sink reports it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: NewTicket,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ticket() -> NewTicket {
        NewTicket {
            issue_text: "tap is leaking".into(),
            category: "Plumbing".into(),
            subcategory: None,
            priority: Priority::High,
            location: Some("Building A > Floor 2".into()),
            source_location: None,
            target_location: None,
            agency_involved: None,
            agency_name: None,
            agency_date: None,
            extra_fields: BTreeMap::new(),
            media_urls: vec![],
            chat_id: "c1".into(),
            created_by: "u1".into(),
        }
    }

    #[test]
    fn test_summary_includes_location() {
        assert_eq!(
            base_ticket().summary(),
            "Plumbing · High · Building A > Floor 2"
        );
    }

    #[test]
    fn test_summary_directional() {
        let mut t = base_ticket();
        t.location = None;
        t.source_location = Some("Warehouse".into());
        t.target_location = Some("Office".into());
        assert_eq!(t.summary(), "Plumbing · High · Warehouse → Office");
    }

    #[test]
    fn test_ticket_serde_flattens_fields() {
        let ticket = Ticket {
            id: "t-1".into(),
            status: TicketStatus::Open,
            created_at: Utc::now(),
            fields: base_ticket(),
        };
        let json = serde_json::to_value(&ticket).unwrap();
        assert_eq!(json["category"], "Plumbing");
        assert_eq!(json["status"], "open");
    }
}
