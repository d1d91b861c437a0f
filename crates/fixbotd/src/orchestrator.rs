//! Webhook orchestrator: the wizard state machine driver.
//!
//! Each inbound event reloads the session from the store, applies one
//! targeted mutation, recomputes the active field and edits the single
//! tracked message. Pre-event state is never trusted; the submit path in
//! particular reloads, re-checks and claims the session before a ticket
//! is created.

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use fixbot_shared::field::{ChoiceOption, FieldKey, FieldKind, Priority};
use fixbot_shared::progress::{can_submit, next_incomplete_field};
use fixbot_shared::render::{build_wizard_message, RenderRefs, WizardView, DATE_FORMAT};
use fixbot_shared::rule::WorkflowRule;
use fixbot_shared::schema::{field_definition, required_fields};
use fixbot_shared::session::{SelectionRef, WizardSession};
use fixbot_shared::token::{
    CallbackToken, ACTION_CANCEL, ACTION_SUBMIT, VALUE_BACK, VALUE_MANUAL, VALUE_NONE, VALUE_SKIP,
};

use crate::masters::{Catalog, LocationDirectory, TicketSink};
use crate::navigator::{self, NavOutcome};
use crate::store::SessionStore;
use crate::transport::BotTransport;

/// Sentinel category id for a manually typed category; it never has a
/// workflow rule, so the default schema applies.
const MANUAL_CATEGORY_ID: &str = "manual";

/// Accepted free-text date formats, first match wins.
const DATE_FORMATS: [&str; 2] = [DATE_FORMAT, "%d/%m/%Y"];

/// What an inbound event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A new wizard message was posted and its session created.
    Started { message_id: String },
    /// The tracked message was re-rendered after a mutation.
    Updated,
    /// The event was rejected (bad value, vanished node); the tracked
    /// message shows a retry prompt and the session is unmutated.
    Rejected { notice: String },
    /// The session expired or was already closed.
    Gone,
    /// Free text arrived while nothing was waiting for it.
    Ignored,
    Submitted { ticket_id: String },
    Cancelled,
}

pub struct Orchestrator {
    store: Arc<SessionStore>,
    catalog: Arc<dyn Catalog>,
    locations: Arc<dyn LocationDirectory>,
    tickets: Arc<dyn TicketSink>,
    transport: Arc<dyn BotTransport>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        catalog: Arc<dyn Catalog>,
        locations: Arc<dyn LocationDirectory>,
        tickets: Arc<dyn TicketSink>,
        transport: Arc<dyn BotTransport>,
    ) -> Self {
        Self {
            store,
            catalog,
            locations,
            tickets,
            transport,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Inbound chat message: either it answers a pending free-text prompt,
    /// or it opens a new wizard for the reported issue.
    pub async fn handle_message(
        &self,
        chat_id: &str,
        user_id: &str,
        text: &str,
        media_urls: &[String],
    ) -> Result<EventOutcome> {
        if let Some(session) = self.store.find_awaiting_text(chat_id)? {
            return self.apply_text(session, text, media_urls).await;
        }
        if text.trim().is_empty() && media_urls.is_empty() {
            return Ok(EventOutcome::Ignored);
        }
        self.start_wizard(chat_id, user_id, text, media_urls).await
    }

    /// Open a new wizard: send the tracked message, then key the session
    /// by the message id the platform assigned and re-render so the
    /// buttons carry real tokens.
    async fn start_wizard(
        &self,
        chat_id: &str,
        user_id: &str,
        issue_text: &str,
        media_urls: &[String],
    ) -> Result<EventOutcome> {
        let mut session = WizardSession::new("", chat_id, user_id, issue_text.trim());
        session.media_urls = media_urls.to_vec();

        // No buttons yet: their tokens would carry an empty message id,
        // which the callback parser rejects. The follow-up re-render
        // attaches real ones.
        let mut provisional = build_wizard_message(&session, None, &RenderRefs::default());
        provisional.options.clear();
        let message_id = self.transport.send_wizard(chat_id, &provisional).await?;

        session.message_id = message_id.clone();
        self.store.create(&session)?;
        info!("Wizard opened: message {} in chat {}", message_id, chat_id);

        self.rerender(&message_id, None, None).await?;
        Ok(EventOutcome::Started { message_id })
    }

    /// Inbound button press.
    pub async fn handle_button(&self, raw_token: &str) -> Result<EventOutcome> {
        let Some(token) = CallbackToken::parse(raw_token) else {
            debug!("Unparseable callback payload, ignoring");
            return Ok(EventOutcome::Ignored);
        };

        let Some(session) = self.store.load(&token.message_id)? else {
            return self.expire_notice(&token.message_id).await;
        };

        match token.field.as_str() {
            ACTION_CANCEL => self.cancel(session).await,
            ACTION_SUBMIT => self.submit(session).await,
            field => {
                let Some(key) = FieldKey::parse_wire(field) else {
                    debug!("Unknown field {} in callback, ignoring", field);
                    return Ok(EventOutcome::Ignored);
                };
                self.apply_button(session, key, &token.value).await
            }
        }
    }

    /// Apply one validated button value to its field.
    async fn apply_button(
        &self,
        session: WizardSession,
        key: FieldKey,
        value: &str,
    ) -> Result<EventOutcome> {
        let message_id = session.message_id.clone();

        // Tree navigation first: its values are node ids plus the
        // back/manual verbs, not an enumerable domain.
        if let Some(role) = key.location_role() {
            if value == VALUE_MANUAL {
                self.rerender(&message_id, Some(key), None).await?;
                return Ok(EventOutcome::Updated);
            }
            let outcome = if let Some(back_ref) = value.strip_prefix(VALUE_BACK) {
                navigator::browse_back(&self.store, self.locations.as_ref(), &session, role, back_ref)
                    .await?
            } else {
                navigator::select_node(&self.store, self.locations.as_ref(), &session, role, value)
                    .await?
            };
            if outcome == NavOutcome::NotFound {
                return self
                    .retry_notice(&message_id, "That location is no longer available.")
                    .await;
            }
            self.rerender(&message_id, None, None).await?;
            return Ok(EventOutcome::Updated);
        }

        match &key {
            FieldKey::Category => {
                if value == VALUE_MANUAL {
                    self.rerender(&message_id, Some(FieldKey::Category), None).await?;
                    return Ok(EventOutcome::Updated);
                }
                let categories = self.catalog.categories().await?;
                let Some(entry) = categories.iter().find(|c| c.id == value) else {
                    return self
                        .retry_notice(&message_id, "That category is no longer available.")
                        .await;
                };
                self.store
                    .set_category(&message_id, &SelectionRef::new(&entry.id, &entry.name))?;
            }
            FieldKey::Subcategory => {
                let Some(category_id) = session.category_id() else {
                    return self.retry_notice(&message_id, "Pick a category first.").await;
                };
                let subcategories = self.catalog.subcategories(category_id).await?;
                let Some(entry) = subcategories.iter().find(|c| c.id == value) else {
                    return self
                        .retry_notice(&message_id, "That subcategory is no longer available.")
                        .await;
                };
                self.store
                    .set_subcategory(&message_id, &SelectionRef::new(&entry.id, &entry.name))?;
            }
            FieldKey::Priority => {
                let Some(priority) = Priority::parse(value) else {
                    return self.retry_notice(&message_id, "Pick a priority below.").await;
                };
                self.store.set_priority(&message_id, priority)?;
            }
            FieldKey::Agency => {
                let mut agency = session.agency.clone();
                if value == VALUE_NONE {
                    agency.required = Some(false);
                    agency.name = None;
                } else {
                    let agencies = self.catalog.agencies().await?;
                    let Some(entry) = agencies.iter().find(|a| a.id == value) else {
                        return self
                            .retry_notice(&message_id, "That agency is no longer available.")
                            .await;
                    };
                    agency.required = Some(true);
                    agency.name = Some(entry.name.clone());
                }
                self.store.set_agency(&message_id, &agency)?;
            }
            FieldKey::AgencyDate => {
                if value != VALUE_SKIP {
                    return self
                        .retry_notice(&message_id, "Reply with the date as text.")
                        .await;
                }
                let mut agency = session.agency.clone();
                agency.date_skipped = true;
                self.store.set_agency(&message_id, &agency)?;
            }
            FieldKey::Extra(extra_key) => {
                let rule = self.rule_for(&session).await?;
                let def = field_definition(session.category_id(), rule.as_ref(), &key);
                let Some(def) = def else {
                    return self
                        .retry_notice(&message_id, "That field no longer applies.")
                        .await;
                };
                match def.kind {
                    FieldKind::Choice(ref options) if options.iter().any(|o| o.value == value) => {
                        self.store.set_extra(&message_id, extra_key, value)?;
                    }
                    FieldKind::Choice(_) => {
                        return self
                            .retry_notice(&message_id, "Pick one of the offered options.")
                            .await;
                    }
                    _ => {
                        // Typed fields answer via text, not buttons.
                        return self
                            .retry_notice(&message_id, "Reply with your answer as text.")
                            .await;
                    }
                }
            }
            FieldKey::Location | FieldKey::SourceLocation | FieldKey::TargetLocation => {
                unreachable!("tree fields handled above")
            }
        }

        self.rerender(&message_id, None, None).await?;
        Ok(EventOutcome::Updated)
    }

    /// Apply a free-text answer to the pending field.
    async fn apply_text(
        &self,
        session: WizardSession,
        text: &str,
        media_urls: &[String],
    ) -> Result<EventOutcome> {
        let message_id = session.message_id.clone();
        let Some(pending) = session.pending_input.clone() else {
            return Ok(EventOutcome::Ignored);
        };
        let text = text.trim();

        if !media_urls.is_empty() {
            self.store.add_media(&message_id, media_urls)?;
        }
        if text.is_empty() {
            self.rerender(&message_id, Some(pending), None).await?;
            return Ok(EventOutcome::Updated);
        }

        match &pending {
            FieldKey::Category => {
                self.store
                    .set_category(&message_id, &SelectionRef::new(MANUAL_CATEGORY_ID, text))?;
            }
            FieldKey::Location => {
                let mut trail = session.locations.plain.clone();
                trail.manual_text = Some(text.to_string());
                self.store
                    .set_trail(&message_id, fixbot_shared::field::LocationRole::Plain, &trail)?;
            }
            FieldKey::AgencyDate => {
                let Some(date) = parse_date(text) else {
                    return self
                        .retry_notice(&message_id, "Could not read that date. Use YYYY-MM-DD.")
                        .await;
                };
                let mut agency = session.agency.clone();
                agency.date = Some(date);
                self.store.set_agency(&message_id, &agency)?;
            }
            FieldKey::Extra(extra_key) => {
                let rule = self.rule_for(&session).await?;
                let def = field_definition(session.category_id(), rule.as_ref(), &pending);
                let value = match def.map(|d| d.kind) {
                    Some(FieldKind::Date) => {
                        let Some(date) = parse_date(text) else {
                            return self
                                .retry_notice(&message_id, "Could not read that date. Use YYYY-MM-DD.")
                                .await;
                        };
                        date.format(DATE_FORMAT).to_string()
                    }
                    _ => text.to_string(),
                };
                self.store.set_extra(&message_id, extra_key, &value)?;
            }
            other => {
                debug!("Pending marker {} does not take free text", other);
                return Ok(EventOutcome::Ignored);
            }
        }

        self.rerender(&message_id, None, None).await?;
        Ok(EventOutcome::Updated)
    }

    /// Submit: re-check readiness on the freshly loaded session, claim it,
    /// materialize, confirm. The claim (single-use delete) is what keeps
    /// rapid duplicate submits down to one ticket.
    async fn submit(&self, session: WizardSession) -> Result<EventOutcome> {
        let message_id = session.message_id.clone();
        let rule = self.rule_for(&session).await?;

        if !can_submit(&session, rule.as_ref()) {
            let missing = next_incomplete_field(&session, rule.as_ref())
                .map(|k| k.wire_name())
                .unwrap_or_default();
            info!("Submit blocked on {}: {}", message_id, missing);
            return self
                .retry_notice(&message_id, "Not everything is filled in yet.")
                .await;
        }

        let ticket =
            crate::materializer::create_ticket_from_wizard(&session, rule.as_ref(), &session.user_id)
                .map_err(anyhow::Error::new)?;

        if !self.store.claim_delete(&message_id)? {
            // A concurrent duplicate submit won the claim.
            return Ok(EventOutcome::Gone);
        }

        let summary = ticket.summary();
        let ticket_id = self.tickets.create_ticket(ticket).await?;
        info!("Ticket {} filed from wizard {}", ticket_id, message_id);

        let closing = WizardView {
            text: format!("✅ Ticket {} filed.\n{}", ticket_id, summary),
            options: vec![],
        };
        self.edit_swallowing(&session.chat_id, &message_id, &closing).await;
        if let Err(e) = self
            .transport
            .send_text(
                &session.chat_id,
                &format!("Your maintenance ticket {} has been filed: {}", ticket_id, summary),
            )
            .await
        {
            warn!("Confirmation send failed for {}: {}", ticket_id, e);
        }

        Ok(EventOutcome::Submitted { ticket_id })
    }

    async fn cancel(&self, session: WizardSession) -> Result<EventOutcome> {
        if !self.store.claim_delete(&session.message_id)? {
            return Ok(EventOutcome::Gone);
        }
        info!("Wizard {} cancelled", session.message_id);
        let closing = WizardView {
            text: "Ticket creation cancelled.".to_string(),
            options: vec![],
        };
        self.edit_swallowing(&session.chat_id, &session.message_id, &closing).await;
        Ok(EventOutcome::Cancelled)
    }

    /// Terminal notice for events against a vanished session.
    async fn expire_notice(&self, message_id: &str) -> Result<EventOutcome> {
        debug!("Event for unknown session {}", message_id);
        Ok(EventOutcome::Gone)
    }

    /// Surface a validation failure as a retry prompt on the tracked
    /// message; the session stays unmutated.
    async fn retry_notice(&self, message_id: &str, notice: &str) -> Result<EventOutcome> {
        self.rerender(message_id, None, Some(notice)).await?;
        Ok(EventOutcome::Rejected {
            notice: notice.to_string(),
        })
    }

    /// Reload the session, recompute the active field, arm or clear the
    /// pending-input marker, and edit the tracked message. Transport
    /// failures are logged and swallowed: state already moved, the next
    /// event re-renders it.
    async fn rerender(
        &self,
        message_id: &str,
        pending_override: Option<FieldKey>,
        notice: Option<&str>,
    ) -> Result<()> {
        let Some(session) = self.store.load(message_id)? else {
            return Ok(());
        };
        let rule = self.rule_for(&session).await?;

        let active = next_incomplete_field(&session, rule.as_ref());
        let manual_prompt = pending_override.is_some();
        let pending = pending_override.or_else(|| {
            active.clone().filter(|key| {
                field_definition(session.category_id(), rule.as_ref(), key)
                    .map(|def| def.kind.expects_text())
                    .unwrap_or(false)
            })
        });
        self.store.set_pending_input(message_id, pending.as_ref())?;

        let step_label = match &active {
            Some(key) => required_fields(session.category_id(), rule.as_ref())
                .into_iter()
                .find(|d| &d.key == key)
                .map(|d| d.label),
            None => Some("Review".to_string()),
        };
        self.store.set_current_step(message_id, step_label.as_deref())?;

        let refs = self.refs_for(&session, rule.as_ref()).await?;
        let mut view = build_wizard_message(&session, rule.as_ref(), &refs);
        if manual_prompt {
            view.text.push_str("\n✏ Reply with your answer as text.");
        }
        if let Some(notice) = notice {
            view.text = format!("⚠ {}\n\n{}", notice, view.text);
        }
        self.edit_swallowing(&session.chat_id, message_id, &view).await;
        Ok(())
    }

    async fn edit_swallowing(&self, chat_id: &str, message_id: &str, view: &WizardView) {
        if let Err(e) = self.transport.edit_wizard(chat_id, message_id, view).await {
            warn!("Message edit failed for {}: {}", message_id, e);
        }
    }

    /// The rule behind the session's category, re-read on every event.
    async fn rule_for(&self, session: &WizardSession) -> Result<Option<WorkflowRule>> {
        match session.category_id() {
            Some(category_id) => self.catalog.rule_for_category(category_id).await,
            None => Ok(None),
        }
    }

    /// Masters lookups the renderer needs for the active field.
    async fn refs_for(
        &self,
        session: &WizardSession,
        rule: Option<&WorkflowRule>,
    ) -> Result<RenderRefs> {
        let mut refs = RenderRefs::default();
        match next_incomplete_field(session, rule) {
            Some(FieldKey::Category) => {
                refs.categories = catalog_options(self.catalog.categories().await?);
            }
            Some(FieldKey::Subcategory) => {
                if let Some(category_id) = session.category_id() {
                    refs.subcategories =
                        catalog_options(self.catalog.subcategories(category_id).await?);
                }
            }
            Some(FieldKey::Agency) => {
                refs.agencies = catalog_options(self.catalog.agencies().await?);
            }
            Some(key) => {
                if let Some(role) = key.location_role() {
                    let (children, back) =
                        navigator::browse_menu(self.locations.as_ref(), session, role).await?;
                    refs.tree_children = children;
                    refs.tree_back = back;
                }
            }
            None => {}
        }
        Ok(refs)
    }
}

fn catalog_options(entries: Vec<crate::masters::CatalogEntry>) -> Vec<ChoiceOption> {
    entries
        .into_iter()
        .map(|e| ChoiceOption::new(e.id, e.name))
        .collect()
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}
