//! The wizard session: ephemeral per-conversation progress state.
//!
//! One session per tracked chat message, reloaded fresh on every inbound
//! event and deleted on submit or cancel. There is deliberately no
//! process-resident session object; this struct is what the store
//! round-trips.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::field::{FieldKey, LocationRole, Priority};

/// A picked master record, e.g. a category or subcategory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRef {
    pub id: String,
    pub name: String,
}

impl SelectionRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One step of a location path, root toward current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationStep {
    pub id: String,
    pub name: String,
}

/// Progress of one location role through the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LocationTrail {
    /// Ordered path from root toward the current node.
    pub path: Vec<LocationStep>,
    /// Set when a leaf was selected; the role is then complete.
    pub complete: bool,
    /// Free-text override: the user typed the location instead of
    /// navigating. Only honoured for the plain role.
    pub manual_text: Option<String>,
    /// Node whose children are currently on screen. Back-navigation moves
    /// this pointer without touching the committed path.
    pub browse_parent: Option<String>,
}

impl LocationTrail {
    /// Append a step, skipping the append when it would duplicate the
    /// immediately preceding entry. Returns whether the path changed.
    pub fn push_step(&mut self, step: LocationStep) -> bool {
        if self.path.last().map(|last| last.id == step.id).unwrap_or(false) {
            return false;
        }
        self.path.push(step);
        true
    }

    /// Human-readable path, node names joined with a directional separator.
    pub fn display(&self) -> Option<String> {
        if let Some(text) = &self.manual_text {
            return Some(text.clone());
        }
        if self.path.is_empty() {
            return None;
        }
        Some(
            self.path
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(" > "),
        )
    }
}

/// The three location trails a session can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LocationSet {
    #[serde(default)]
    pub plain: LocationTrail,
    #[serde(default)]
    pub source: LocationTrail,
    #[serde(default)]
    pub target: LocationTrail,
}

impl LocationSet {
    pub fn trail(&self, role: LocationRole) -> &LocationTrail {
        match role {
            LocationRole::Plain => &self.plain,
            LocationRole::Source => &self.source,
            LocationRole::Target => &self.target,
        }
    }

    pub fn trail_mut(&mut self, role: LocationRole) -> &mut LocationTrail {
        match role {
            LocationRole::Plain => &mut self.plain,
            LocationRole::Source => &mut self.source,
            LocationRole::Target => &mut self.target,
        }
    }
}

/// Agency involvement answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgencyBlock {
    /// None = unanswered. Some(false) counts as a complete answer and
    /// suppresses the agency date.
    pub required: Option<bool>,
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    /// Explicit "skip the date" answer; treated like `required == false`
    /// for completion purposes.
    pub date_skipped: bool,
}

impl AgencyBlock {
    /// The agency date is excluded from the required set entirely once
    /// agency involvement was denied or the date explicitly skipped.
    pub fn date_suppressed(&self) -> bool {
        self.required == Some(false) || self.date_skipped
    }
}

/// Ephemeral per-conversation wizard state, keyed by the tracked chat
/// message id. Created on a qualifying inbound message, mutated on every
/// event, deleted on submit/cancel, reaped after a TTL when abandoned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardSession {
    pub message_id: String,
    pub chat_id: String,
    pub user_id: String,
    /// Original free-form issue text that opened the wizard.
    pub issue_text: String,

    pub category: Option<SelectionRef>,
    pub subcategory: Option<SelectionRef>,
    pub priority: Option<Priority>,
    pub locations: LocationSet,
    pub agency: AgencyBlock,
    /// Values of rule-declared additional fields, by rule key.
    pub extra_values: BTreeMap<String, String>,

    /// Set when the wizard is waiting for typed text, naming the field the
    /// next text event belongs to. Text arriving without this marker is
    /// ignored.
    pub pending_input: Option<FieldKey>,
    pub media_urls: Vec<String>,
    /// Label of the step currently on screen, for logs and health output.
    pub current_step: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WizardSession {
    pub fn new(
        message_id: impl Into<String>,
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
        issue_text: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            message_id: message_id.into(),
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            issue_text: issue_text.into(),
            category: None,
            subcategory: None,
            priority: None,
            locations: LocationSet::default(),
            agency: AgencyBlock::default(),
            extra_values: BTreeMap::new(),
            pending_input: None,
            media_urls: Vec::new(),
            current_step: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn category_id(&self) -> Option<&str> {
        self.category.as_ref().map(|c| c.id.as_str())
    }
}
