//! Completion evaluation and next-step finding.
//!
//! Pure predicates over a session and its resolved schema. The single
//! "active field" the UI shows and the submit gate both come from
//! [`next_incomplete_field`], so they can never disagree.

use crate::field::{FieldDefinition, FieldKey};
use crate::rule::WorkflowRule;
use crate::schema::required_fields;
use crate::session::WizardSession;

/// Is this field satisfied in the current session? Pure, no I/O.
///
/// Boolean "no" answers count as complete: a field is incomplete only
/// while genuinely unanswered.
pub fn is_field_complete(session: &WizardSession, key: &FieldKey) -> bool {
    match key {
        FieldKey::Category => session.category.is_some(),
        FieldKey::Priority => session.priority.is_some(),
        FieldKey::Subcategory => session.subcategory.is_some(),
        FieldKey::Location => {
            let trail = &session.locations.plain;
            trail.manual_text.is_some() || trail.complete
        }
        FieldKey::SourceLocation => session.locations.source.complete,
        FieldKey::TargetLocation => session.locations.target.complete,
        FieldKey::Agency => session.agency.required.is_some(),
        FieldKey::AgencyDate => session.agency.date_suppressed() || session.agency.date.is_some(),
        FieldKey::Extra(k) => session
            .extra_values
            .get(k)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false),
    }
}

/// Suppressed fields are excluded from the required set, not treated as
/// blocking. Today only the agency date is suppressible.
pub fn is_suppressed(session: &WizardSession, key: &FieldKey) -> bool {
    matches!(key, FieldKey::AgencyDate) && session.agency.date_suppressed()
}

fn deps_met(session: &WizardSession, def: &FieldDefinition) -> bool {
    def.depends_on.iter().all(|dep| is_field_complete(session, dep))
}

/// Walk the resolved schema in order and return the single field the
/// wizard should collect next, or `None` when the form is submit-ready.
///
/// `rule` is the current rule for the session's category, freshly loaded
/// by the caller; `None` degrades to the default single-location schema.
pub fn next_incomplete_field(
    session: &WizardSession,
    rule: Option<&WorkflowRule>,
) -> Option<FieldKey> {
    for def in required_fields(session.category_id(), rule) {
        if is_suppressed(session, &def.key) {
            continue;
        }
        if is_field_complete(session, &def.key) {
            continue;
        }
        if !deps_met(session, &def) {
            continue;
        }
        return Some(def.key);
    }
    None
}

/// Submit-readiness: true exactly when no incomplete field remains.
pub fn can_submit(session: &WizardSession, rule: Option<&WorkflowRule>) -> bool {
    next_incomplete_field(session, rule).is_none()
}

/// Schema entries that are neither complete nor the active field yet,
/// used for the "still to come" summary line.
pub fn remaining_fields(
    session: &WizardSession,
    rule: Option<&WorkflowRule>,
    active: Option<&FieldKey>,
) -> Vec<FieldDefinition> {
    required_fields(session.category_id(), rule)
        .into_iter()
        .filter(|def| {
            !is_suppressed(session, &def.key)
                && !is_field_complete(session, &def.key)
                && Some(&def.key) != active
        })
        .collect()
}
