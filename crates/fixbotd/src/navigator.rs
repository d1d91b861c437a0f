//! Location tree navigation.
//!
//! Selecting a node appends it to the role's committed path and either
//! descends (the node has children) or completes the role (leaf) in the
//! same operation. Back-navigation only moves the browse pointer; the
//! committed path is never rewritten by browsing.

use anyhow::Result;
use tracing::debug;

use fixbot_shared::field::{ChoiceOption, LocationRole};
use fixbot_shared::session::{LocationStep, WizardSession};
use fixbot_shared::token::BACK_ROOT;

use crate::masters::LocationDirectory;
use crate::store::SessionStore;

/// What a node selection did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    /// Node has children; the wizard stays on this field, one level deeper.
    Descended,
    /// Leaf node; the role is complete and the wizard advances.
    CompletedLeaf,
    /// Unknown node id; nothing was mutated.
    NotFound,
}

/// Handle a child-selected event for one location role.
pub async fn select_node(
    store: &SessionStore,
    directory: &dyn LocationDirectory,
    session: &WizardSession,
    role: LocationRole,
    node_id: &str,
) -> Result<NavOutcome> {
    let Some(node) = directory.node(node_id).await? else {
        debug!("Location node {} vanished, ignoring selection", node_id);
        return Ok(NavOutcome::NotFound);
    };

    let mut trail = session.locations.trail(role).clone();
    trail.push_step(LocationStep {
        id: node.id.clone(),
        name: node.name.clone(),
    });
    trail.browse_parent = Some(node.id.clone());

    let child_count = directory.children(Some(&node.id)).await?.len();
    let outcome = if child_count > 0 {
        NavOutcome::Descended
    } else {
        trail.complete = true;
        NavOutcome::CompletedLeaf
    };

    store.set_trail(&session.message_id, role, &trail)?;
    debug!(
        "Location {} for role {}: {} children, outcome {:?}",
        node.id,
        role.as_str(),
        child_count,
        outcome
    );
    Ok(outcome)
}

/// Handle a back event: re-browse from a reference node (or the forest
/// root) without mutating the committed path.
pub async fn browse_back(
    store: &SessionStore,
    directory: &dyn LocationDirectory,
    session: &WizardSession,
    role: LocationRole,
    back_ref: &str,
) -> Result<NavOutcome> {
    let browse_parent = if back_ref == BACK_ROOT {
        None
    } else {
        match directory.node(back_ref).await? {
            Some(node) => Some(node.id),
            None => return Ok(NavOutcome::NotFound),
        }
    };

    let mut trail = session.locations.trail(role).clone();
    trail.browse_parent = browse_parent;
    store.set_trail(&session.message_id, role, &trail)?;
    Ok(NavOutcome::Descended)
}

/// Menu data for the active tree field: children of the browse node and
/// the reference the back button should use (`None` hides it).
pub async fn browse_menu(
    directory: &dyn LocationDirectory,
    session: &WizardSession,
    role: LocationRole,
) -> Result<(Vec<ChoiceOption>, Option<String>)> {
    let trail = session.locations.trail(role);
    let children = directory
        .children(trail.browse_parent.as_deref())
        .await?
        .into_iter()
        .map(|n| ChoiceOption::new(n.id, n.name))
        .collect();

    let back = match &trail.browse_parent {
        None => None,
        Some(current) => match directory.node(current).await? {
            Some(node) => Some(node.parent_id.unwrap_or_else(|| BACK_ROOT.to_string())),
            // Browse node deleted mid-flow: offer the root as the way out.
            None => Some(BACK_ROOT.to_string()),
        },
    };
    Ok((children, back))
}
