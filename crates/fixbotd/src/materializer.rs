//! Ticket materialization: the submit-ready session becomes a ticket.
//!
//! The single hard gate against partial tickets lives here; everything
//! upstream may race or retry, but nothing incomplete passes this
//! function. Field values reuse the render display formatting so the
//! ticket reads exactly like the confirmed wizard message.

use fixbot_shared::error::WizardError;
use fixbot_shared::field::FieldKey;
use fixbot_shared::progress::next_incomplete_field;
use fixbot_shared::render::display_value;
use fixbot_shared::rule::{AdditionalFieldKind, WorkflowRule};
use fixbot_shared::session::WizardSession;
use fixbot_shared::ticket::NewTicket;

/// Convert a submit-ready session into a ticket, or fail with
/// [`WizardError::SubmitBlocked`] naming the first missing field.
pub fn create_ticket_from_wizard(
    session: &WizardSession,
    rule: Option<&WorkflowRule>,
    created_by: &str,
) -> Result<NewTicket, WizardError> {
    if let Some(missing) = next_incomplete_field(session, rule) {
        return Err(WizardError::SubmitBlocked(missing.wire_name()));
    }

    // The rule may have been edited between the answer and the submit; a
    // choice value that left its option domain must not reach the ticket.
    if let Some(rule) = rule {
        for def in &rule.additional_fields {
            if def.kind != AdditionalFieldKind::Choice {
                continue;
            }
            if let Some(value) = session.extra_values.get(&def.key) {
                if !def.options.iter().any(|o| &o.value == value) {
                    return Err(WizardError::validation(
                        FieldKey::Extra(def.key.clone()).wire_name(),
                        "the chosen option is no longer offered",
                    ));
                }
            }
        }
    }

    // can_submit above guarantees category and priority are present.
    let category = display_value(session, &FieldKey::Category)
        .ok_or_else(|| WizardError::SubmitBlocked("category".to_string()))?;
    let priority = session
        .priority
        .ok_or_else(|| WizardError::SubmitBlocked("priority".to_string()))?;

    Ok(NewTicket {
        issue_text: session.issue_text.clone(),
        category,
        subcategory: display_value(session, &FieldKey::Subcategory),
        priority,
        location: display_value(session, &FieldKey::Location),
        source_location: display_value(session, &FieldKey::SourceLocation),
        target_location: display_value(session, &FieldKey::TargetLocation),
        agency_involved: session.agency.required,
        agency_name: session.agency.name.clone(),
        // A suppressed date never reaches the ticket, even if a stray
        // value is still sitting on the session.
        agency_date: if session.agency.date_suppressed() {
            None
        } else {
            session.agency.date
        },
        extra_fields: session.extra_values.clone(),
        media_urls: session.media_urls.clone(),
        chat_id: session.chat_id.clone(),
        created_by: created_by.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixbot_shared::field::{ChoiceOption, Priority};
    use fixbot_shared::rule::AdditionalFieldDef;
    use fixbot_shared::session::{LocationStep, SelectionRef};

    fn ready_session() -> (WizardSession, WorkflowRule) {
        let mut rule = WorkflowRule::new("plumbing");
        rule.requires_location = true;
        let mut s = WizardSession::new("m1", "c1", "u1", "tap is leaking");
        s.category = Some(SelectionRef::new("plumbing", "Plumbing"));
        s.priority = Some(Priority::High);
        s.locations.plain.push_step(LocationStep {
            id: "a".into(),
            name: "Building A".into(),
        });
        s.locations.plain.push_step(LocationStep {
            id: "k".into(),
            name: "Kitchen".into(),
        });
        s.locations.plain.complete = true;
        (s, rule)
    }

    #[test]
    fn test_blocked_while_incomplete() {
        let (mut s, rule) = ready_session();
        s.priority = None;
        let err = create_ticket_from_wizard(&s, Some(&rule), "u1").unwrap_err();
        assert!(matches!(err, WizardError::SubmitBlocked(ref f) if f == "priority"));
    }

    #[test]
    fn test_location_flattens_to_display_path() {
        let (s, rule) = ready_session();
        let ticket = create_ticket_from_wizard(&s, Some(&rule), "u1").unwrap();
        assert_eq!(ticket.category, "Plumbing");
        assert_eq!(ticket.priority, Priority::High);
        assert_eq!(ticket.location.as_deref(), Some("Building A > Kitchen"));
        assert_eq!(ticket.created_by, "u1");
    }

    #[test]
    fn test_choice_value_outside_current_options_is_rejected() {
        let (mut s, mut rule) = ready_session();
        rule.additional_fields.push(AdditionalFieldDef {
            key: "color".into(),
            label: "Colour".into(),
            kind: AdditionalFieldKind::Choice,
            options: vec![ChoiceOption::new("blue", "Blue")],
        });
        s.extra_values.insert("color".into(), "red".into());
        let err = create_ticket_from_wizard(&s, Some(&rule), "u1").unwrap_err();
        assert!(
            matches!(err, WizardError::Validation { ref field, .. } if field == "field_color")
        );

        s.extra_values.insert("color".into(), "blue".into());
        let ticket = create_ticket_from_wizard(&s, Some(&rule), "u1").unwrap();
        assert_eq!(
            ticket.extra_fields.get("color").map(String::as_str),
            Some("blue")
        );
    }

    #[test]
    fn test_agency_no_leaves_date_empty() {
        let (mut s, mut rule) = ready_session();
        rule.requires_agency = true;
        rule.requires_agency_date = true;
        s.agency.required = Some(false);
        s.agency.date = chrono::NaiveDate::from_ymd_opt(2025, 3, 1);
        let ticket = create_ticket_from_wizard(&s, Some(&rule), "u1").unwrap();
        assert_eq!(ticket.agency_involved, Some(false));
        assert_eq!(ticket.agency_date, None);
    }
}
