//! Per-category workflow rules.
//!
//! A rule declares which fields a ticket of its category must collect.
//! Rules live in the masters subsystem; the engine only reads them, and
//! re-reads them on every step so a mid-session edit takes effect
//! immediately (or degrades to the default schema if the rule vanished).

use serde::{Deserialize, Serialize};

use crate::field::ChoiceOption;

/// Input shape of a rule-declared additional field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdditionalFieldKind {
    #[default]
    Text,
    Date,
    Choice,
}

/// A rule-declared additional field, e.g. "room number" for cleaning
/// tickets. `options` only applies to [`AdditionalFieldKind::Choice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalFieldDef {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub kind: AdditionalFieldKind,
    #[serde(default)]
    pub options: Vec<ChoiceOption>,
}

/// Which fields a ticket of one category must collect. One rule per
/// category; read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowRule {
    pub category_id: String,
    #[serde(default)]
    pub has_subcategories: bool,
    #[serde(default)]
    pub requires_location: bool,
    #[serde(default)]
    pub requires_source_location: bool,
    #[serde(default)]
    pub requires_target_location: bool,
    #[serde(default)]
    pub requires_agency: bool,
    #[serde(default)]
    pub requires_agency_date: bool,
    #[serde(default)]
    pub additional_fields: Vec<AdditionalFieldDef>,
}

impl WorkflowRule {
    pub fn new(category_id: impl Into<String>) -> Self {
        Self {
            category_id: category_id.into(),
            ..Default::default()
        }
    }

    /// Source/target take precedence over the plain location whenever
    /// either of them is requested.
    pub fn wants_directional_locations(&self) -> bool {
        self.requires_source_location || self.requires_target_location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_deserializes_with_defaults() {
        let rule: WorkflowRule =
            serde_json::from_str(r#"{"category_id": "plumbing", "requires_location": true}"#)
                .unwrap();
        assert_eq!(rule.category_id, "plumbing");
        assert!(rule.requires_location);
        assert!(!rule.has_subcategories);
        assert!(rule.additional_fields.is_empty());
    }

    #[test]
    fn test_directional_precedence() {
        let mut rule = WorkflowRule::new("moving");
        rule.requires_location = true;
        assert!(!rule.wants_directional_locations());
        rule.requires_source_location = true;
        assert!(rule.wants_directional_locations());
    }
}
