//! Reconcile - Set-diff reconciliation of multi-valued associations
//!
//! Compares the old (state) and new (desired) members of a collection field
//! under a configurable equivalence, and applies the difference through
//! caller-supplied add and remove hooks. A failing item never aborts the
//! batch; outcomes are collected per item and turned into diagnostics.

use std::future::Future;

use log::{debug, warn};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{ProviderError, ProviderResult};

/// Equivalence relation over collection items
pub trait Equivalence<T> {
    fn equivalent(&self, a: &T, b: &T) -> bool;
}

/// Structural equality
#[derive(Debug, Clone, Copy, Default)]
pub struct Exact;

impl<T: PartialEq> Equivalence<T> for Exact {
    fn equivalent(&self, a: &T, b: &T) -> bool {
        a == b
    }
}

impl<T, F> Equivalence<T> for F
where
    F: Fn(&T, &T) -> bool,
{
    fn equivalent(&self, a: &T, b: &T) -> bool {
        self(a, b)
    }
}

fn contains<T>(items: &[T], item: &T, eq: &impl Equivalence<T>) -> bool {
    items.iter().any(|i| eq.equivalent(i, item))
}

fn unique<T: Clone>(items: &[T], eq: &impl Equivalence<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !contains(&out, item, eq) {
            out.push(item.clone());
        }
    }
    out
}

/// Add/remove partition of a collection change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDelta<T> {
    pub to_add: Vec<T>,
    pub to_remove: Vec<T>,
}

impl<T: Clone> CollectionDelta<T> {
    /// `to_add = new \ old`, `to_remove = old \ new`, under `eq`
    pub fn between(old: &[T], new: &[T], eq: &impl Equivalence<T>) -> Self {
        let old = unique(old, eq);
        let new = unique(new, eq);
        Self {
            to_add: new
                .iter()
                .filter(|n| !contains(&old, n, eq))
                .cloned()
                .collect(),
            to_remove: old
                .iter()
                .filter(|o| !contains(&new, o, eq))
                .cloned()
                .collect(),
        }
    }
}

impl<T> CollectionDelta<T> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// Items of `recorded` that are also present remotely. Used on read so that
/// members managed outside this record stay invisible.
pub fn intersect<T: Clone>(recorded: &[T], remote: &[T], eq: &impl Equivalence<T>) -> Vec<T> {
    recorded
        .iter()
        .filter(|r| contains(remote, r, eq))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Add,
    Remove,
}

/// Outcome of one hook call
#[derive(Debug)]
pub enum ItemOutcome {
    Applied,
    /// 404 on remove
    AlreadyGone,
    /// 409; someone else got there first
    Converged,
    /// 404 on add of a permission-like item
    Invalid,
    Failed(ProviderError),
}

impl ItemOutcome {
    /// Classify a hook result. The API layer reports 200 and 207 as `Ok`.
    pub fn classify(change: Change, result: ProviderResult<()>, permission_like: bool) -> Self {
        let err = match result {
            Ok(()) => return ItemOutcome::Applied,
            Err(e) => e,
        };
        match (err.status(), change) {
            (Some(404), Change::Remove) => ItemOutcome::AlreadyGone,
            (Some(404), Change::Add) if permission_like => ItemOutcome::Invalid,
            (Some(409), _) => ItemOutcome::Converged,
            _ => ItemOutcome::Failed(err),
        }
    }
}

/// Options for applying a delta
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Treat 404 on add as an invalid item (warning) rather than a failure
    pub permission_like: bool,
}

/// Per-item outcomes of an applied delta
#[derive(Debug)]
pub struct BatchReport<T> {
    pub items: Vec<(T, Change, ItemOutcome)>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> BatchReport<T> {
    pub fn has_failures(&self) -> bool {
        self.items
            .iter()
            .any(|(_, _, o)| matches!(o, ItemOutcome::Failed(_)))
    }

    /// Diagnostics for the batch: a warning per invalid item, an error per
    /// failed item
    pub fn diagnostics(&self, describe: impl Fn(&T) -> String) -> Diagnostics {
        let mut diags = Diagnostics::new();
        for (item, change, outcome) in &self.items {
            match outcome {
                ItemOutcome::Invalid => {
                    diags.push(
                        (&ProviderError::InvalidPermission(describe(item))).into(),
                    );
                }
                ItemOutcome::Failed(err) => {
                    let verb = match change {
                        Change::Add => "add",
                        Change::Remove => "remove",
                    };
                    diags.push(
                        Diagnostic::error(format!("failed to {} {}", verb, describe(item)))
                            .with_detail(err.to_string()),
                    );
                }
                _ => {}
            }
        }
        diags
    }
}

/// Apply a delta: removals first, then additions. Every item is attempted.
pub async fn apply_delta<T, R, RF, A, AF>(
    delta: CollectionDelta<T>,
    options: ApplyOptions,
    mut remove: R,
    mut add: A,
) -> BatchReport<T>
where
    T: Clone,
    R: FnMut(T) -> RF,
    RF: Future<Output = ProviderResult<()>>,
    A: FnMut(T) -> AF,
    AF: Future<Output = ProviderResult<()>>,
{
    let mut report = BatchReport::default();

    for item in delta.to_remove {
        let outcome = ItemOutcome::classify(Change::Remove, remove(item.clone()).await, false);
        log_outcome(Change::Remove, &outcome);
        report.items.push((item, Change::Remove, outcome));
    }

    for item in delta.to_add {
        let outcome =
            ItemOutcome::classify(Change::Add, add(item.clone()).await, options.permission_like);
        log_outcome(Change::Add, &outcome);
        report.items.push((item, Change::Add, outcome));
    }

    report
}

/// Compute and apply the delta between `old` and `new`. A no-op when the
/// collections are equal under `eq`.
pub async fn reconcile<T, E, R, RF, A, AF>(
    old: &[T],
    new: &[T],
    eq: &E,
    options: ApplyOptions,
    remove: R,
    add: A,
) -> BatchReport<T>
where
    T: Clone,
    E: Equivalence<T>,
    R: FnMut(T) -> RF,
    RF: Future<Output = ProviderResult<()>>,
    A: FnMut(T) -> AF,
    AF: Future<Output = ProviderResult<()>>,
{
    let delta = CollectionDelta::between(old, new, eq);
    if delta.is_empty() {
        return BatchReport::default();
    }
    debug!(
        "reconciling collection: {} to add, {} to remove",
        delta.to_add.len(),
        delta.to_remove.len()
    );
    apply_delta(delta, options, remove, add).await
}

fn log_outcome(change: Change, outcome: &ItemOutcome) {
    match outcome {
        ItemOutcome::Failed(err) => warn!("{:?} failed: {}", change, err),
        other => debug!("{:?}: {:?}", change, other),
    }
}
