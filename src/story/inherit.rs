//! Root-to-leaf overlay of every inheritable facet of a story chain.

use super::{ActionAttachment, Expectation, ScenarioAttachment, Story};
use crate::callback::CallbackMap;
use crate::capability;
use crate::data::DataBag;
use crate::timeout::Timeout;
use indexmap::IndexMap;

/// Everything a leaf inherits from its ancestors.
pub(crate) struct Resolved {
    pub(crate) fragments: String,
    pub(crate) scenarios: Vec<ScenarioAttachment>,
    pub(crate) actions: Vec<ActionAttachment>,
    pub(crate) callbacks: CallbackMap,
    pub(crate) data: DataBag,
    pub(crate) timeout: Timeout,
    pub(crate) expectation: Option<Expectation>,
}

/// Resolve `chain`, ordered root first, so the nearest definition wins.
///
/// Scenarios and actions are keyed by reference name; an override keeps the
/// position where the key first appeared.
pub(crate) fn resolve(chain: &[&Story]) -> Resolved {
    let mut scenarios: IndexMap<String, ScenarioAttachment> = IndexMap::new();
    let mut actions: IndexMap<String, ActionAttachment> = IndexMap::new();
    let mut data = DataBag::new();

    for story in chain {
        for attachment in &story.scenarios {
            scenarios.insert(attachment.reference.key(), attachment.clone());
        }
        for attachment in &story.actions {
            actions.insert(attachment.reference.key(), attachment.clone());
        }
        data.overlay(&story.data);
    }

    Resolved {
        fragments: capability::inherit_name(chain),
        scenarios: scenarios.into_values().collect(),
        actions: actions.into_values().collect(),
        callbacks: capability::inherit_callbacks(chain),
        data,
        timeout: capability::inherit_timeout(chain),
        expectation: chain.iter().rev().find_map(|story| story.expectation),
    }
}

