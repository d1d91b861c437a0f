//! Field identity and kind for the dynamic wizard schema.
//!
//! The schema is defined by data (a per-category [`WorkflowRule`]), so field
//! identity is an enum with a stable wire name rather than bare strings
//! scattered through handlers. Rule-declared extra fields are namespaced
//! `field_<key>` on the wire.
//!
//! [`WorkflowRule`]: crate::rule::WorkflowRule

use serde::{Deserialize, Serialize};

/// Which of the up to three location trails a tree field drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationRole {
    Plain,
    Source,
    Target,
}

impl LocationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Source => "source",
            Self::Target => "target",
        }
    }

    pub fn field_key(&self) -> FieldKey {
        match self {
            Self::Plain => FieldKey::Location,
            Self::Source => FieldKey::SourceLocation,
            Self::Target => FieldKey::TargetLocation,
        }
    }
}

/// Stable identity of a wizard field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Category,
    Priority,
    Subcategory,
    Location,
    SourceLocation,
    TargetLocation,
    Agency,
    AgencyDate,
    /// Rule-declared additional field, identified by its rule key.
    Extra(String),
}

impl FieldKey {
    /// Wire name used in callback tokens and the pending-input marker.
    pub fn wire_name(&self) -> String {
        match self {
            Self::Category => "category".to_string(),
            Self::Priority => "priority".to_string(),
            Self::Subcategory => "subcategory".to_string(),
            Self::Location => "location".to_string(),
            Self::SourceLocation => "source_location".to_string(),
            Self::TargetLocation => "target_location".to_string(),
            Self::Agency => "agency".to_string(),
            Self::AgencyDate => "agency_date".to_string(),
            Self::Extra(key) => format!("field_{}", key),
        }
    }

    /// Parse a wire name back into a key. Unknown names are rejected so a
    /// stale or forged token can never address an arbitrary field.
    pub fn parse_wire(s: &str) -> Option<Self> {
        match s {
            "category" => Some(Self::Category),
            "priority" => Some(Self::Priority),
            "subcategory" => Some(Self::Subcategory),
            "location" => Some(Self::Location),
            "source_location" => Some(Self::SourceLocation),
            "target_location" => Some(Self::TargetLocation),
            "agency" => Some(Self::Agency),
            "agency_date" => Some(Self::AgencyDate),
            other => other
                .strip_prefix("field_")
                .filter(|k| !k.is_empty())
                .map(|k| Self::Extra(k.to_string())),
        }
    }

    /// The location role behind a tree field, if any.
    pub fn location_role(&self) -> Option<LocationRole> {
        match self {
            Self::Location => Some(LocationRole::Plain),
            Self::SourceLocation => Some(LocationRole::Source),
            Self::TargetLocation => Some(LocationRole::Target),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// One selectable option for a choice-shaped field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub value: String,
    pub label: String,
}

impl ChoiceOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Where a choice field's options come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupSource {
    Categories,
    Subcategories,
    Agencies,
}

/// Input shape of a field. All field behaviour (completion, options,
/// rendering) dispatches on this tag instead of on field-name strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Fixed options known at schema-resolution time.
    Choice(Vec<ChoiceOption>),
    /// Options looked up in the masters subsystem at render time.
    Lookup(LookupSource),
    Boolean,
    Date,
    FreeText,
    /// Tree navigation over the location forest.
    Tree(LocationRole),
}

impl FieldKind {
    /// Fields whose answer arrives as typed text rather than a button.
    pub fn expects_text(&self) -> bool {
        matches!(self, Self::Date | Self::FreeText)
    }
}

/// A resolved schema entry. Recomputed from the rule on every access,
/// never cached across session mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub key: FieldKey,
    pub label: String,
    pub kind: FieldKind,
    pub depends_on: Vec<FieldKey>,
}

/// Ticket priority, the fixed option domain of the `priority` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Low, Self::Normal, Self::High, Self::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Normal => "Normal",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
