//! Dependency-safe startup ordering
//!
//! A selection sort over a small batch: repeatedly pick the first candidate
//! that requires none of the other remaining candidates. Dependencies outside
//! the batch do not constrain the order. O(n²), which is fine for the set of
//! dependents of one changed plugin.

use hotswap_kernel::PluginDescriptor;
use thiserror::Error;
use tracing::warn;

/// No plugin in the remaining batch is free of in-batch dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SortError {
    #[error("No safe startup order among: {}", .remaining.join(", "))]
    Ambiguous { remaining: Vec<String> },
}

/// Order `plugins` so that none precedes a plugin it depends on.
pub fn sort_startup_order(plugins: &[PluginDescriptor]) -> Result<Vec<PluginDescriptor>, SortError> {
    let mut candidates = plugins.to_vec();
    let mut ordered = Vec::with_capacity(candidates.len());

    while !candidates.is_empty() {
        match removable_candidate(&candidates) {
            Some(idx) => ordered.push(candidates.remove(idx)),
            None => {
                return Err(SortError::Ambiguous {
                    remaining: candidates.into_iter().map(|p| p.id).collect(),
                });
            }
        }
    }

    Ok(ordered)
}

/// Like [`sort_startup_order`], but falls back to the input order.
///
/// The plugins in a reload batch were running together before the reload, so
/// an ambiguous order is logged rather than treated as fatal.
pub fn startup_order_or_original(plugins: &[PluginDescriptor]) -> Vec<PluginDescriptor> {
    match sort_startup_order(plugins) {
        Ok(ordered) => ordered,
        Err(e) => {
            warn!("Unable to determine suitable startup order, keeping original order: {}", e);
            plugins.to_vec()
        }
    }
}

fn removable_candidate(candidates: &[PluginDescriptor]) -> Option<usize> {
    candidates.iter().enumerate().position(|(i, candidate)| {
        candidates
            .iter()
            .enumerate()
            .all(|(j, other)| i == j || !candidate.requires(&other.id))
    })
}
