//! Conflict detection and resolution.
//!
//! Changes are grouped by conflict key. A group with more than one change
//! whose timestamps all lie within the conflict window is a conflict set
//! and is reduced to one change by the configured strategy. Other groups
//! pass through as independent changes in timestamp order.
//!
//! Every resolution is appended to a bounded history for diagnostics.

use std::collections::{HashMap, HashSet, VecDeque};

use ctxsync_core::{
    ChangeId, ChangeOperation, ChangeSource, ConflictKey, ConflictStrategy, ContextChange, Fields,
    SharedClock,
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

/// Changes sharing one conflict key, in first-seen order.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeGroup {
    /// Shared key.
    pub key: ConflictKey,
    /// Members in input order.
    pub changes: Vec<ContextChange>,
    /// Whether the members must be resolved together.
    pub conflicting: bool,
}

/// Group `changes` by conflict key, keeping first-seen key order.
///
/// Membership and the `conflicting` flag do not depend on input order.
pub fn detect_conflicts(changes: Vec<ContextChange>, window_secs: f64) -> Vec<ChangeGroup> {
    let mut order: Vec<ConflictKey> = Vec::new();
    let mut buckets: HashMap<ConflictKey, Vec<ContextChange>> = HashMap::new();
    for change in changes {
        let key = change.conflict_key();
        buckets
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(change);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let changes = buckets.remove(&key)?;
            let conflicting = changes.len() > 1 && spread(&changes) <= window_secs;
            Some(ChangeGroup {
                key,
                changes,
                conflicting,
            })
        })
        .collect()
}

fn spread(changes: &[ContextChange]) -> f64 {
    let (min, max) = changes.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
        (lo.min(c.timestamp), hi.max(c.timestamp))
    });
    max - min
}

/// One entry of the resolution history.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolutionRecord {
    /// Entity the conflict was on.
    pub key: ConflictKey,
    /// Strategy configured.
    pub strategy: ConflictStrategy,
    /// Inputs, in input order.
    pub inputs: Vec<ChangeId>,
    /// Change that was kept or synthesized.
    pub winner: ChangeId,
    /// Whether the strategy degraded to `latest_wins`.
    pub fallback: bool,
    /// Why it degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the resolution happened.
    pub resolved_at: f64,
}

/// Result of resolving a batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    /// Changes to apply, in order.
    pub changes: Vec<ContextChange>,
    /// Conflict sets found.
    pub conflicts_detected: usize,
    /// Conflict sets reduced to one change.
    pub conflicts_resolved: usize,
}

/// Applies the configured strategy to conflict sets.
#[derive(Debug)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
    window_secs: f64,
    history_limit: usize,
    history: Mutex<VecDeque<ResolutionRecord>>,
    clock: SharedClock,
}

impl ConflictResolver {
    /// Resolver with the given strategy, window, and history bound.
    pub fn new(
        strategy: ConflictStrategy,
        window_secs: f64,
        history_limit: usize,
        clock: SharedClock,
    ) -> Self {
        Self {
            strategy,
            window_secs,
            history_limit,
            history: Mutex::new(VecDeque::with_capacity(history_limit.min(128))),
            clock,
        }
    }

    /// Strategy in effect.
    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Conflict window in seconds.
    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    /// Detect and resolve conflicts in `changes`.
    ///
    /// Output follows group order; independent groups contribute their
    /// changes sorted by timestamp, conflict sets contribute one change.
    pub fn resolve(&self, changes: Vec<ContextChange>) -> Resolution {
        let mut resolution = Resolution::default();
        for group in detect_conflicts(changes, self.window_secs) {
            if group.conflicting {
                resolution.conflicts_detected += 1;
                if let Some(winner) = self.resolve_group(&group.key, &group.changes) {
                    resolution.conflicts_resolved += 1;
                    resolution.changes.push(winner);
                }
            } else {
                let mut independent = group.changes;
                independent.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
                resolution.changes.extend(independent);
            }
        }
        resolution
    }

    /// Reduce one conflict set to a single change. `None` for an empty set.
    pub fn resolve_group(
        &self,
        key: &ConflictKey,
        changes: &[ContextChange],
    ) -> Option<ContextChange> {
        let latest = latest_wins(changes)?;
        let (winner, fallback, reason) = match self.strategy {
            ConflictStrategy::LatestWins => (latest.clone(), false, None),
            ConflictStrategy::PriorityBased => {
                (priority_based(changes).unwrap_or(latest).clone(), false, None)
            }
            ConflictStrategy::MergeCompatible => match merge_compatible(key, changes) {
                Ok(merged) => (merged, false, None),
                Err(reason) => {
                    info!(key = %key, reason = %reason, "merge failed, falling back to latest_wins");
                    (latest.clone(), true, Some(reason))
                }
            },
            ConflictStrategy::ManualReview => {
                info!(
                    key = %key,
                    changes = changes.len(),
                    "manual review requested, applying latest_wins"
                );
                (
                    latest.clone(),
                    true,
                    Some("manual review not available in unattended sync".to_string()),
                )
            }
        };

        debug!(
            key = %key,
            strategy = %self.strategy,
            winner = %winner.change_id,
            inputs = changes.len(),
            "conflict resolved"
        );
        self.record(ResolutionRecord {
            key: key.clone(),
            strategy: self.strategy,
            inputs: changes.iter().map(|c| c.change_id.clone()).collect(),
            winner: winner.change_id.clone(),
            fallback,
            reason,
            resolved_at: self.clock.now(),
        });
        Some(winner)
    }

    fn record(&self, record: ResolutionRecord) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = self.history.lock();
        if history.len() >= self.history_limit {
            let _ = history.pop_front();
        }
        history.push_back(record);
    }

    /// Resolution history, oldest first.
    pub fn history(&self) -> Vec<ResolutionRecord> {
        self.history.lock().iter().cloned().collect()
    }

    /// Drop the history.
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

/// Change with the greatest timestamp; the first encountered wins ties.
pub fn latest_wins(changes: &[ContextChange]) -> Option<&ContextChange> {
    let (first, rest) = changes.split_first()?;
    Some(rest.iter().fold(first, |best, change| {
        if change.timestamp > best.timestamp { change } else { best }
    }))
}

/// Change with the greatest `(priority, timestamp)`; the first encountered
/// wins ties.
pub fn priority_based(changes: &[ContextChange]) -> Option<&ContextChange> {
    let (first, rest) = changes.split_first()?;
    Some(rest.iter().fold(first, |best, change| {
        let better = change.priority > best.priority
            || (change.priority == best.priority && change.timestamp > best.timestamp);
        if better { change } else { best }
    }))
}

/// Union of disjoint field sets, earliest change first.
///
/// Any key collision, or a delete in the set, aborts the whole merge.
pub fn merge_compatible(
    key: &ConflictKey,
    changes: &[ContextChange],
) -> Result<ContextChange, String> {
    if changes.is_empty() {
        return Err("nothing to merge".to_string());
    }
    if changes
        .iter()
        .any(|c| c.operation == ChangeOperation::Delete)
    {
        return Err("delete cannot be merged".to_string());
    }

    let mut ordered: Vec<&ContextChange> = changes.iter().collect();
    ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut fields = Fields::new();
    for change in &ordered {
        if let Some(collision) = change.fields.keys().find(|k| fields.contains_key(*k)) {
            return Err(format!("field '{collision}' set by more than one change"));
        }
        fields.extend(change.fields.clone());
    }

    let operations: HashSet<ChangeOperation> = changes.iter().map(|c| c.operation).collect();
    let operation = if operations.len() == 1 {
        changes[0].operation
    } else {
        ChangeOperation::Update
    };
    let timestamp = changes
        .iter()
        .map(|c| c.timestamp)
        .fold(f64::NEG_INFINITY, f64::max);
    let priority = changes.iter().map(|c| c.priority).max().unwrap_or_default();

    Ok(
        ContextChange::new(key.context_type, key.entity_id.clone(), operation, timestamp)
            .with_source(ChangeSource::ConflictResolver)
            .with_fields(fields)
            .with_priority(priority)
            .with_requires_sync(changes.iter().any(|c| c.requires_sync)),
    )
}
