//! Flattens a story tree into runnable leaf cases.

use crate::performer::Authenticator;
use crate::registry::Registry;
use crate::story::{Case, Story};
use std::sync::Arc;
use tracing::debug;

/// Resolve every leaf of `root`, depth first in declaration order.
///
/// A childless root is itself the only leaf.
#[must_use]
pub fn walk(
    root: &Story,
    registry: &Registry,
    authenticator: &Arc<dyn Authenticator>,
) -> Vec<Case> {
    let mut leaves = Vec::new();
    let mut chain = Vec::new();
    visit(root, &mut chain, &mut |path| {
        leaves.push(Case::from_chain(path, registry, authenticator));
    });
    debug!(leaves = leaves.len(), "walked story tree");
    leaves
}

/// Call `on_leaf` with the root-first chain ending at each leaf of `story`.
pub fn visit<'a, F>(story: &'a Story, chain: &mut Vec<&'a Story>, on_leaf: &mut F)
where
    F: FnMut(&[&'a Story]),
{
    chain.push(story);
    if story.is_leaf() {
        on_leaf(chain);
    } else {
        for child in story.children() {
            visit(child, chain, on_leaf);
        }
    }
    chain.pop();
}
