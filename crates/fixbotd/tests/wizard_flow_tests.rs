//! End-to-end wizard flows: webhook events in, targeted session mutations
//! and tracked-message edits out, ticket materialization at the end.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use fixbot_shared::field::Priority;
use fixbot_shared::render::WizardView;
use fixbot_shared::rule::WorkflowRule;
use fixbot_shared::ticket::NewTicket;
use fixbot_shared::token::CallbackToken;

use fixbotd::masters::{Catalog, CatalogEntry, LocationDirectory, LocationNode, TicketSink};
use fixbotd::orchestrator::{EventOutcome, Orchestrator};
use fixbotd::store::SessionStore;
use fixbotd::transport::BotTransport;

// ============================================================================
// In-memory collaborators
// ============================================================================

#[derive(Default)]
struct MemMasters {
    categories: Vec<CatalogEntry>,
    subcategories: HashMap<String, Vec<CatalogEntry>>,
    agencies: Vec<CatalogEntry>,
    rules: Mutex<HashMap<String, WorkflowRule>>,
    locations: Vec<LocationNode>,
}

impl MemMasters {
    fn entry(id: &str, name: &str) -> CatalogEntry {
        CatalogEntry {
            id: id.into(),
            name: name.into(),
        }
    }

    fn node(id: &str, name: &str, parent: Option<&str>) -> LocationNode {
        LocationNode {
            id: id.into(),
            name: name.into(),
            parent_id: parent.map(String::from),
        }
    }

    fn drop_rule(&self, category_id: &str) {
        self.rules.lock().unwrap().remove(category_id);
    }
}

#[async_trait]
impl Catalog for MemMasters {
    async fn categories(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self.categories.clone())
    }

    async fn subcategories(&self, category_id: &str) -> Result<Vec<CatalogEntry>> {
        Ok(self.subcategories.get(category_id).cloned().unwrap_or_default())
    }

    async fn agencies(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self.agencies.clone())
    }

    async fn rule_for_category(&self, category_id: &str) -> Result<Option<WorkflowRule>> {
        Ok(self.rules.lock().unwrap().get(category_id).cloned())
    }
}

#[async_trait]
impl LocationDirectory for MemMasters {
    async fn children(&self, parent: Option<&str>) -> Result<Vec<LocationNode>> {
        Ok(self
            .locations
            .iter()
            .filter(|n| n.parent_id.as_deref() == parent)
            .cloned()
            .collect())
    }

    async fn node(&self, id: &str) -> Result<Option<LocationNode>> {
        Ok(self.locations.iter().find(|n| n.id == id).cloned())
    }
}

#[derive(Default)]
struct MemTicketSink {
    created: Mutex<Vec<NewTicket>>,
}

#[async_trait]
impl TicketSink for MemTicketSink {
    async fn create_ticket(&self, ticket: NewTicket) -> Result<String> {
        let mut created = self.created.lock().unwrap();
        created.push(ticket);
        Ok(format!("FB-{:04}", created.len()))
    }
}

#[derive(Default)]
struct RecordingTransport {
    state: Mutex<TransportLog>,
}

#[derive(Default)]
struct TransportLog {
    next_id: u32,
    sends: Vec<(String, WizardView)>,
    edits: Vec<(String, WizardView)>,
    texts: Vec<(String, String)>,
}

impl RecordingTransport {
    fn last_edit(&self) -> WizardView {
        self.state.lock().unwrap().edits.last().unwrap().1.clone()
    }

    fn first_send(&self) -> WizardView {
        self.state.lock().unwrap().sends.first().unwrap().1.clone()
    }

    fn sent_texts(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .texts
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl BotTransport for RecordingTransport {
    async fn send_wizard(&self, chat_id: &str, view: &WizardView) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.sends.push((chat_id.to_string(), view.clone()));
        Ok(format!("m{}", state.next_id))
    }

    async fn edit_wizard(&self, _chat_id: &str, message_id: &str, view: &WizardView) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .edits
            .push((message_id.to_string(), view.clone()));
        Ok(())
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .texts
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    _dir: tempfile::TempDir,
    orchestrator: Orchestrator,
    masters: Arc<MemMasters>,
    tickets: Arc<MemTicketSink>,
    transport: Arc<RecordingTransport>,
}

impl Fixture {
    fn new(masters: MemMasters) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::open(dir.path().join("sessions.db"), 60).unwrap());
        let masters = Arc::new(masters);
        let tickets = Arc::new(MemTicketSink::default());
        let transport = Arc::new(RecordingTransport::default());
        let orchestrator = Orchestrator::new(
            store,
            masters.clone(),
            masters.clone(),
            tickets.clone(),
            transport.clone(),
        );
        Self {
            _dir: dir,
            orchestrator,
            masters,
            tickets,
            transport,
        }
    }

    async fn start(&self, issue: &str) -> String {
        match self
            .orchestrator
            .handle_message("chat-1", "user-1", issue, &[])
            .await
            .unwrap()
        {
            EventOutcome::Started { message_id } => message_id,
            other => panic!("expected Started, got {:?}", other),
        }
    }

    async fn press(&self, message_id: &str, field: &str, value: &str) -> EventOutcome {
        let token = CallbackToken::new(message_id, field, value).encode();
        self.orchestrator.handle_button(&token).await.unwrap()
    }

    async fn type_text(&self, text: &str) -> EventOutcome {
        self.orchestrator
            .handle_message("chat-1", "user-1", text, &[])
            .await
            .unwrap()
    }
}

/// Masters for the full IT flow: subcategories, one leaf location,
/// agency with date.
fn full_masters() -> MemMasters {
    let mut rule = WorkflowRule::new("it");
    rule.has_subcategories = true;
    rule.requires_location = true;
    rule.requires_agency = true;
    rule.requires_agency_date = true;

    MemMasters {
        categories: vec![MemMasters::entry("it", "IT")],
        subcategories: HashMap::from([(
            "it".to_string(),
            vec![MemMasters::entry("x", "X")],
        )]),
        agencies: vec![MemMasters::entry("ag1", "AgencyOne")],
        rules: Mutex::new(HashMap::from([("it".to_string(), rule)])),
        locations: vec![MemMasters::node("l", "L", None)],
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_scenario_a_full_flow_files_complete_ticket() {
    let fx = Fixture::new(full_masters());
    let m = fx.start("the projector is dead").await;

    assert_eq!(fx.press(&m, "category", "it").await, EventOutcome::Updated);
    assert_eq!(fx.press(&m, "priority", "high").await, EventOutcome::Updated);
    assert_eq!(fx.press(&m, "subcategory", "x").await, EventOutcome::Updated);
    assert_eq!(fx.press(&m, "location", "l").await, EventOutcome::Updated);
    assert_eq!(fx.press(&m, "agency", "ag1").await, EventOutcome::Updated);
    // Agency date is typed, not pressed.
    assert_eq!(fx.type_text("2025-03-01").await, EventOutcome::Updated);

    // The tracked message offers submit now.
    let view = fx.transport.last_edit();
    assert!(view.text.contains("All set"));

    let outcome = fx.press(&m, "submit", "").await;
    let EventOutcome::Submitted { ticket_id } = outcome else {
        panic!("expected Submitted, got {:?}", outcome);
    };

    let created = fx.tickets.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    let ticket = &created[0];
    assert_eq!(ticket.priority, Priority::High);
    assert_eq!(ticket.subcategory.as_deref(), Some("X"));
    assert_eq!(ticket.location.as_deref(), Some("L"));
    assert_eq!(ticket.agency_involved, Some(true));
    assert_eq!(ticket.agency_name.as_deref(), Some("AgencyOne"));
    assert_eq!(
        ticket.agency_date,
        chrono::NaiveDate::from_ymd_opt(2025, 3, 1)
    );
    drop(created);

    // Session is gone and the confirmation was a separate send.
    assert_eq!(fx.orchestrator.store().open_count().unwrap(), 0);
    assert!(fx.transport.sent_texts().iter().any(|t| t.contains(&ticket_id)));
}

#[tokio::test]
async fn test_scenario_b_agency_no_skips_date() {
    let fx = Fixture::new(full_masters());
    let m = fx.start("the projector is dead").await;

    fx.press(&m, "category", "it").await;
    fx.press(&m, "priority", "high").await;
    fx.press(&m, "subcategory", "x").await;
    fx.press(&m, "location", "l").await;
    fx.press(&m, "agency", "none").await;

    // Agency date was never prompted.
    let view = fx.transport.last_edit();
    assert!(!view.text.contains("Agency date"));
    assert!(view.text.contains("All set"));

    let outcome = fx.press(&m, "submit", "").await;
    assert!(matches!(outcome, EventOutcome::Submitted { .. }));
    let created = fx.tickets.created.lock().unwrap();
    assert_eq!(created[0].agency_involved, Some(false));
    assert_eq!(created[0].agency_date, None);
}

#[tokio::test]
async fn test_scenario_c_tree_descent() {
    let mut masters = full_masters();
    masters.locations = vec![
        MemMasters::node("a", "A", None),
        MemMasters::node("b", "B", Some("a")),
        MemMasters::node("c", "C", Some("a")),
        MemMasters::node("d", "D", Some("c")),
    ];
    let fx = Fixture::new(masters);
    let m = fx.start("broken light").await;

    fx.press(&m, "category", "it").await;
    fx.press(&m, "priority", "low").await;
    fx.press(&m, "subcategory", "x").await;

    // Selecting A lists B and C.
    fx.press(&m, "location", "a").await;
    let view = fx.transport.last_edit();
    assert!(view.options.iter().any(|o| o.data.ends_with("|location|b")));
    assert!(view.options.iter().any(|o| o.data.ends_with("|location|c")));

    // Selecting C lists D and does not complete the role.
    fx.press(&m, "location", "c").await;
    let view = fx.transport.last_edit();
    assert!(view.options.iter().any(|o| o.data.ends_with("|location|d")));
    let session = fx.orchestrator.store().load(&m).unwrap().unwrap();
    assert!(!session.locations.plain.complete);

    // Selecting the leaf D completes with path A > C > D.
    fx.press(&m, "location", "d").await;
    let session = fx.orchestrator.store().load(&m).unwrap().unwrap();
    assert!(session.locations.plain.complete);
    let ids: Vec<&str> = session
        .locations
        .plain
        .path
        .iter()
        .map(|p| p.id.as_str())
        .collect();
    assert_eq!(ids, vec!["a", "c", "d"]);
}

#[tokio::test]
async fn test_back_then_reselect_never_duplicates_path() {
    let mut masters = full_masters();
    masters.locations = vec![
        MemMasters::node("a", "A", None),
        MemMasters::node("b", "B", Some("a")),
    ];
    let fx = Fixture::new(masters);
    let m = fx.start("broken light").await;

    fx.press(&m, "category", "it").await;
    fx.press(&m, "priority", "low").await;
    fx.press(&m, "subcategory", "x").await;

    fx.press(&m, "location", "a").await;
    fx.press(&m, "location", "back:root").await;
    fx.press(&m, "location", "a").await;

    let session = fx.orchestrator.store().load(&m).unwrap().unwrap();
    let ids: Vec<&str> = session
        .locations
        .plain
        .path
        .iter()
        .map(|p| p.id.as_str())
        .collect();
    assert_eq!(ids, vec!["a"]);
}

#[tokio::test]
async fn test_out_of_domain_value_is_rejected_without_mutation() {
    let fx = Fixture::new(full_masters());
    let m = fx.start("help").await;
    fx.press(&m, "category", "it").await;

    let outcome = fx.press(&m, "priority", "catastrophic").await;
    assert!(matches!(outcome, EventOutcome::Rejected { .. }));
    let view = fx.transport.last_edit();
    assert!(view.text.starts_with("⚠"));

    let session = fx.orchestrator.store().load(&m).unwrap().unwrap();
    assert_eq!(session.priority, None);
}

#[tokio::test]
async fn test_submit_blocked_until_complete() {
    let fx = Fixture::new(full_masters());
    let m = fx.start("help").await;
    fx.press(&m, "category", "it").await;

    let outcome = fx.press(&m, "submit", "").await;
    assert!(matches!(outcome, EventOutcome::Rejected { .. }));
    assert!(fx.tickets.created.lock().unwrap().is_empty());
    // Session survives a blocked submit.
    assert!(fx.orchestrator.store().load(&m).unwrap().is_some());
}

#[tokio::test]
async fn test_duplicate_submit_files_one_ticket() {
    let fx = Fixture::new(full_masters());
    let m = fx.start("help").await;
    fx.press(&m, "category", "it").await;
    fx.press(&m, "priority", "high").await;
    fx.press(&m, "subcategory", "x").await;
    fx.press(&m, "location", "l").await;
    fx.press(&m, "agency", "none").await;

    let first = fx.press(&m, "submit", "").await;
    assert!(matches!(first, EventOutcome::Submitted { .. }));
    let second = fx.press(&m, "submit", "").await;
    assert_eq!(second, EventOutcome::Gone);
    assert_eq!(fx.tickets.created.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_deletes_without_ticket() {
    let fx = Fixture::new(full_masters());
    let m = fx.start("help").await;
    fx.press(&m, "category", "it").await;

    assert_eq!(fx.press(&m, "cancel", "").await, EventOutcome::Cancelled);
    assert!(fx.orchestrator.store().load(&m).unwrap().is_none());
    assert!(fx.tickets.created.lock().unwrap().is_empty());
    let view = fx.transport.last_edit();
    assert!(view.text.contains("cancelled"));
    assert!(view.options.is_empty());
}

#[tokio::test]
async fn test_event_on_expired_session_is_gone() {
    let fx = Fixture::new(full_masters());
    let outcome = fx.press("m999", "priority", "high").await;
    assert_eq!(outcome, EventOutcome::Gone);
}

#[tokio::test]
async fn test_rule_deleted_mid_session_degrades_to_default_schema() {
    let fx = Fixture::new(full_masters());
    let m = fx.start("help").await;
    fx.press(&m, "category", "it").await;

    fx.masters.drop_rule("it");
    fx.press(&m, "priority", "normal").await;

    // Default schema: plain location, no subcategory or agency.
    let view = fx.transport.last_edit();
    assert!(view.text.contains("➤ Location"));
    assert!(!view.text.contains("Subcategory"));

    // Manual location text completes the degraded schema.
    fx.press(&m, "location", "manual").await;
    assert_eq!(fx.type_text("behind the gym").await, EventOutcome::Updated);
    let view = fx.transport.last_edit();
    assert!(view.text.contains("All set"));

    let outcome = fx.press(&m, "submit", "").await;
    assert!(matches!(outcome, EventOutcome::Submitted { .. }));
    let created = fx.tickets.created.lock().unwrap();
    assert_eq!(created[0].location.as_deref(), Some("behind the gym"));
}

#[tokio::test]
async fn test_unparsable_date_prompts_retry() {
    let fx = Fixture::new(full_masters());
    let m = fx.start("help").await;
    fx.press(&m, "category", "it").await;
    fx.press(&m, "priority", "high").await;
    fx.press(&m, "subcategory", "x").await;
    fx.press(&m, "location", "l").await;
    fx.press(&m, "agency", "ag1").await;

    let outcome = fx.type_text("next tuesday").await;
    assert!(matches!(outcome, EventOutcome::Rejected { .. }));
    let session = fx.orchestrator.store().load(&m).unwrap().unwrap();
    assert_eq!(session.agency.date, None);

    // A valid date still lands afterwards.
    assert_eq!(fx.type_text("2025-03-01").await, EventOutcome::Updated);
}

#[tokio::test]
async fn test_stray_text_without_pending_marker_opens_new_wizard() {
    let fx = Fixture::new(full_masters());
    let m1 = fx.start("first issue").await;
    // No pending input: the next message is a new report, not an answer.
    let outcome = fx.type_text("second issue").await;
    let EventOutcome::Started { message_id: m2 } = outcome else {
        panic!("expected a second wizard");
    };
    assert_ne!(m1, m2);
    assert_eq!(fx.orchestrator.store().open_count().unwrap(), 2);
}

/// Masters for a move-style flow: source and target locations, no
/// subcategories or agency.
fn directional_masters() -> MemMasters {
    let mut rule = WorkflowRule::new("move");
    rule.requires_source_location = true;
    rule.requires_target_location = true;

    MemMasters {
        categories: vec![MemMasters::entry("move", "Furniture move")],
        rules: Mutex::new(HashMap::from([("move".to_string(), rule)])),
        locations: vec![
            MemMasters::node("wh", "Warehouse", None),
            MemMasters::node("off", "Office", None),
        ],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_directional_locations_flow() {
    let fx = Fixture::new(directional_masters());
    let m = fx.start("move the desks").await;

    fx.press(&m, "category", "move").await;
    fx.press(&m, "priority", "normal").await;

    // Source trail comes first; directional roles offer no typed fallback.
    let view = fx.transport.last_edit();
    assert!(view.text.contains("➤ From location"));
    assert!(view
        .options
        .iter()
        .any(|o| o.data.ends_with("|source_location|wh")));
    assert!(!view.options.iter().any(|o| o.label == "Type it instead"));

    fx.press(&m, "source_location", "wh").await;
    let view = fx.transport.last_edit();
    assert!(view.text.contains("✔ From location: Warehouse"));
    assert!(view.text.contains("➤ To location"));

    fx.press(&m, "target_location", "off").await;
    let view = fx.transport.last_edit();
    assert!(view.text.contains("All set"));

    let outcome = fx.press(&m, "submit", "").await;
    assert!(matches!(outcome, EventOutcome::Submitted { .. }));
    let created = fx.tickets.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].source_location.as_deref(), Some("Warehouse"));
    assert_eq!(created[0].target_location.as_deref(), Some("Office"));
    assert_eq!(created[0].location, None);
}

#[tokio::test]
async fn test_provisional_message_carries_no_buttons() {
    let fx = Fixture::new(full_masters());
    let m = fx.start("the projector is dead").await;

    // The first send predates the session; buttons only appear once the
    // follow-up edit can embed the platform-assigned message id.
    let sent = fx.transport.first_send();
    assert!(sent.options.is_empty());

    let view = fx.transport.last_edit();
    assert!(!view.options.is_empty());
    assert!(view
        .options
        .iter()
        .all(|o| o.data.starts_with(&format!("w1|{}|", m))));
}

#[tokio::test]
async fn test_agency_date_skip_button() {
    let fx = Fixture::new(full_masters());
    let m = fx.start("help").await;
    fx.press(&m, "category", "it").await;
    fx.press(&m, "priority", "high").await;
    fx.press(&m, "subcategory", "x").await;
    fx.press(&m, "location", "l").await;
    fx.press(&m, "agency", "ag1").await;

    fx.press(&m, "agency_date", "skip").await;
    let view = fx.transport.last_edit();
    assert!(view.text.contains("All set"));

    let outcome = fx.press(&m, "submit", "").await;
    assert!(matches!(outcome, EventOutcome::Submitted { .. }));
    let created = fx.tickets.created.lock().unwrap();
    assert_eq!(created[0].agency_date, None);
}
