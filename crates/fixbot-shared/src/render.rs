//! UI state builder: one wizard message, rendered purely from session +
//! reference data.
//!
//! The chat shows exactly one live wizard message per ticket form, edited
//! in place on every event. This module owns its full content, so any
//! delivery channel can reconstruct the UI from state alone; calling it
//! twice on an unmutated session yields identical output.

use serde::{Deserialize, Serialize};

use crate::field::{ChoiceOption, FieldDefinition, FieldKey, FieldKind, LocationRole, LookupSource};
use crate::progress::{is_field_complete, next_incomplete_field, remaining_fields};
use crate::rule::WorkflowRule;
use crate::schema::required_fields;
use crate::session::WizardSession;
use crate::token::{
    CallbackToken, ACTION_CANCEL, ACTION_SUBMIT, VALUE_BACK, VALUE_MANUAL, VALUE_NONE, VALUE_SKIP,
};

/// Calendar date display format, shared with the materializer.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One tappable button under the wizard message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageOption {
    pub label: String,
    /// Encoded callback token, round-tripped through the bot transport.
    pub data: String,
}

impl MessageOption {
    fn button(session: &WizardSession, field: &str, value: &str, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: CallbackToken::new(&session.message_id, field, value).encode(),
        }
    }
}

/// The rendered state of the tracked message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardView {
    pub text: String,
    pub options: Vec<MessageOption>,
}

/// Reference data the renderer cannot derive from the session: masters
/// lookups for the active field, resolved by the orchestrator right before
/// rendering.
#[derive(Debug, Clone, Default)]
pub struct RenderRefs {
    pub categories: Vec<ChoiceOption>,
    pub subcategories: Vec<ChoiceOption>,
    pub agencies: Vec<ChoiceOption>,
    /// Children of the node the active tree field is browsing.
    pub tree_children: Vec<ChoiceOption>,
    /// Reference node a "back" button should browse to; `None` hides the
    /// button (already at the forest root).
    pub tree_back: Option<String>,
}

/// Display value of a completed field, also used verbatim by the ticket
/// materializer so the ticket matches what the user saw.
pub fn display_value(session: &WizardSession, key: &FieldKey) -> Option<String> {
    match key {
        FieldKey::Category => session.category.as_ref().map(|c| c.name.clone()),
        FieldKey::Subcategory => session.subcategory.as_ref().map(|c| c.name.clone()),
        FieldKey::Priority => session.priority.map(|p| p.label().to_string()),
        FieldKey::Location => session.locations.plain.display(),
        FieldKey::SourceLocation => session.locations.source.display(),
        FieldKey::TargetLocation => session.locations.target.display(),
        FieldKey::Agency => session.agency.required.map(|required| {
            if required {
                match &session.agency.name {
                    Some(name) => format!("Yes ({})", name),
                    None => "Yes".to_string(),
                }
            } else {
                "No".to_string()
            }
        }),
        FieldKey::AgencyDate => session
            .agency
            .date
            .map(|d| d.format(DATE_FORMAT).to_string()),
        FieldKey::Extra(k) => session.extra_values.get(k).cloned(),
    }
}

fn choice_buttons(
    session: &WizardSession,
    field: &FieldKey,
    options: &[ChoiceOption],
) -> Vec<MessageOption> {
    let wire = field.wire_name();
    options
        .iter()
        .map(|opt| MessageOption::button(session, &wire, &opt.value, &opt.label))
        .collect()
}

/// Prompt line and buttons for the active field.
fn active_field_block(
    session: &WizardSession,
    def: &FieldDefinition,
    refs: &RenderRefs,
) -> (String, Vec<MessageOption>) {
    let wire = def.key.wire_name();
    match &def.kind {
        FieldKind::Choice(options) => (
            format!("➤ {}: pick one below.", def.label),
            choice_buttons(session, &def.key, options),
        ),
        FieldKind::Lookup(source) => match source {
            LookupSource::Categories => {
                let mut buttons = choice_buttons(session, &def.key, &refs.categories);
                buttons.push(MessageOption::button(
                    session,
                    &wire,
                    VALUE_MANUAL,
                    "Other…",
                ));
                (format!("➤ {}: pick one below.", def.label), buttons)
            }
            LookupSource::Subcategories => (
                format!("➤ {}: pick one below.", def.label),
                choice_buttons(session, &def.key, &refs.subcategories),
            ),
            LookupSource::Agencies => {
                let mut buttons = choice_buttons(session, &def.key, &refs.agencies);
                buttons.push(MessageOption::button(
                    session,
                    &wire,
                    VALUE_NONE,
                    "No agency",
                ));
                (
                    format!("➤ {}: is an outside agency involved?", def.label),
                    buttons,
                )
            }
        },
        FieldKind::Boolean => (
            format!("➤ {}?", def.label),
            vec![
                MessageOption::button(session, &wire, "yes", "Yes"),
                MessageOption::button(session, &wire, "no", "No"),
            ],
        ),
        FieldKind::Date => {
            let mut buttons = Vec::new();
            if def.key == FieldKey::AgencyDate {
                buttons.push(MessageOption::button(session, &wire, VALUE_SKIP, "Skip"));
            }
            (
                format!("➤ {}: reply with a date ({}).", def.label, "YYYY-MM-DD"),
                buttons,
            )
        }
        FieldKind::FreeText => (format!("➤ {}: reply with your answer.", def.label), vec![]),
        FieldKind::Tree(role) => {
            let mut buttons = choice_buttons(session, &def.key, &refs.tree_children);
            if let Some(back_ref) = &refs.tree_back {
                buttons.push(MessageOption::button(
                    session,
                    &wire,
                    &format!("{}{}", VALUE_BACK, back_ref),
                    "⬅ Back",
                ));
            }
            if *role == LocationRole::Plain {
                buttons.push(MessageOption::button(
                    session,
                    &wire,
                    VALUE_MANUAL,
                    "Type it instead",
                ));
            }
            let so_far = session
                .locations
                .trail(*role)
                .display()
                .map(|p| format!(" ({})", p))
                .unwrap_or_default();
            (
                format!("➤ {}{}: pick the area below.", def.label, so_far),
                buttons,
            )
        }
    }
}

/// Render the tracked message for the current session state.
///
/// Lines appear in schema order: header, completed fields, the single
/// active field with its options, a summary of fields still to come, and
/// the submit action once nothing is missing.
pub fn build_wizard_message(
    session: &WizardSession,
    rule: Option<&WorkflowRule>,
    refs: &RenderRefs,
) -> WizardView {
    let schema = required_fields(session.category_id(), rule);
    let active = next_incomplete_field(session, rule);

    let mut lines = vec![
        "🛠 New maintenance ticket".to_string(),
        format!("“{}”", session.issue_text),
        String::new(),
    ];
    let mut options = Vec::new();

    for def in &schema {
        if is_field_complete(session, &def.key) && !crate::progress::is_suppressed(session, &def.key)
        {
            if let Some(value) = display_value(session, &def.key) {
                lines.push(format!("✔ {}: {}", def.label, value));
            }
        }
    }

    if let Some(active_key) = &active {
        if let Some(def) = schema.iter().find(|d| &d.key == active_key) {
            let (prompt, buttons) = active_field_block(session, def, refs);
            lines.push(prompt);
            options.extend(buttons);
        }
        let upcoming = remaining_fields(session, rule, Some(active_key));
        if !upcoming.is_empty() {
            let labels: Vec<&str> = upcoming.iter().map(|d| d.label.as_str()).collect();
            lines.push(format!("… still to come: {}", labels.join(", ")));
        }
    } else {
        lines.push("✅ All set. Review above and submit.".to_string());
        options.push(MessageOption::button(session, ACTION_SUBMIT, "", "Submit ticket"));
    }

    if !session.media_urls.is_empty() {
        lines.push(format!("📎 {} attachment(s)", session.media_urls.len()));
    }

    options.push(MessageOption::button(session, ACTION_CANCEL, "", "Cancel"));

    WizardView {
        text: lines.join("\n"),
        options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Priority;
    use crate::session::SelectionRef;

    fn rule() -> WorkflowRule {
        let mut rule = WorkflowRule::new("plumbing");
        rule.requires_location = true;
        rule
    }

    #[test]
    fn test_fresh_session_offers_categories() {
        let session = WizardSession::new("m1", "c1", "u1", "leaky tap");
        let refs = RenderRefs {
            categories: vec![
                ChoiceOption::new("plumbing", "Plumbing"),
                ChoiceOption::new("electrical", "Electrical"),
            ],
            ..Default::default()
        };
        let view = build_wizard_message(&session, None, &refs);

        assert!(view.text.contains("leaky tap"));
        assert!(view.text.contains("➤ Category"));
        // Two categories, the manual fallback, and cancel.
        assert_eq!(view.options.len(), 4);
        assert!(view.options[0].data.starts_with("w1|m1|category|"));
        assert_eq!(view.options[2].label, "Other…");
    }

    #[test]
    fn test_completed_fields_render_in_schema_order() {
        let mut session = WizardSession::new("m1", "c1", "u1", "leaky tap");
        session.category = Some(SelectionRef::new("plumbing", "Plumbing"));
        session.priority = Some(Priority::High);
        let view = build_wizard_message(&session, Some(&rule()), &RenderRefs::default());

        let cat = view.text.find("✔ Category: Plumbing").unwrap();
        let prio = view.text.find("✔ Priority: High").unwrap();
        assert!(cat < prio);
        assert!(view.text.contains("➤ Location"));
    }

    #[test]
    fn test_submit_replaces_prompts_when_ready() {
        let mut session = WizardSession::new("m1", "c1", "u1", "leaky tap");
        session.category = Some(SelectionRef::new("plumbing", "Plumbing"));
        session.priority = Some(Priority::High);
        session.locations.plain.manual_text = Some("kitchen".into());
        let view = build_wizard_message(&session, Some(&rule()), &RenderRefs::default());

        assert!(view.text.contains("All set"));
        assert!(!view.text.contains("➤"));
        assert!(view
            .options
            .iter()
            .any(|o| o.data.starts_with("w1|m1|submit|")));
    }

    #[test]
    fn test_render_is_idempotent() {
        let mut session = WizardSession::new("m1", "c1", "u1", "leaky tap");
        session.category = Some(SelectionRef::new("plumbing", "Plumbing"));
        let refs = RenderRefs::default();
        let a = build_wizard_message(&session, Some(&rule()), &refs);
        let b = build_wizard_message(&session, Some(&rule()), &refs);
        assert_eq!(a, b);
    }

    #[test]
    fn test_still_to_come_summary() {
        let mut r = rule();
        r.requires_agency = true;
        let mut session = WizardSession::new("m1", "c1", "u1", "leaky tap");
        session.category = Some(SelectionRef::new("plumbing", "Plumbing"));
        let view = build_wizard_message(&session, Some(&r), &RenderRefs::default());
        // Priority is active; location and agency are still to come.
        assert!(view.text.contains("… still to come: Location, Agency"));
    }

    #[test]
    fn test_tree_field_shows_children_and_back() {
        let mut session = WizardSession::new("m1", "c1", "u1", "leaky tap");
        session.category = Some(SelectionRef::new("plumbing", "Plumbing"));
        session.priority = Some(Priority::Low);
        session.locations.plain.push_step(crate::session::LocationStep {
            id: "a".into(),
            name: "Building A".into(),
        });
        let refs = RenderRefs {
            tree_children: vec![ChoiceOption::new("f1", "Floor 1")],
            tree_back: Some("root".to_string()),
            ..Default::default()
        };
        let view = build_wizard_message(&session, Some(&rule()), &refs);

        assert!(view.text.contains("(Building A)"));
        assert!(view.options.iter().any(|o| o.data == "w1|m1|location|f1"));
        assert!(view
            .options
            .iter()
            .any(|o| o.data == "w1|m1|location|back:root"));
    }
}
