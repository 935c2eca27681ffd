//! Single-flight registry: at most one in-flight build per graph type.
//!
//! The first caller for a key becomes the leader, publishes a shared
//! [`PendingBuild`] handle and runs the work. Callers arriving while the
//! handle is published wait on it and receive a clone of the leader's
//! outcome, success or failure. A successful outcome records whether the
//! leader actually built the graph, so callers that need a fresh build can
//! tell a shared build apart from a shared cache read.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use tracing::debug;

use crate::error::{GraphError, Result};
use crate::graph::{Graph, GraphType};

/// A successful flight.
#[derive(Debug, Clone)]
pub struct Landed {
    pub graph: Arc<Graph>,
    /// The run invoked a builder, as opposed to serving a snapshot or
    /// restoring a persisted entry.
    pub built: bool,
}

impl Landed {
    pub fn built(graph: Arc<Graph>) -> Self {
        Self { graph, built: true }
    }

    pub fn served(graph: Arc<Graph>) -> Self {
        Self { graph, built: false }
    }
}

pub type Outcome = Result<Landed>;

#[derive(Default)]
struct PendingBuild {
    outcome: Mutex<Option<Outcome>>,
    ready: Condvar,
}

impl PendingBuild {
    fn wait(&self) -> Outcome {
        let mut guard = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = guard.as_ref() {
                return outcome.clone();
            }
            guard = self.ready.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn complete(&self, outcome: Outcome) {
        let mut guard = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(outcome);
        self.ready.notify_all();
    }
}

#[derive(Default)]
pub struct SingleFlight {
    pending: Mutex<HashMap<GraphType, Arc<PendingBuild>>>,
}

/// Completes and unpublishes the leader's handle even if the work panics,
/// so followers are never left waiting forever.
struct LeaderGuard<'a> {
    flight: &'a SingleFlight,
    key: GraphType,
    pending: Arc<PendingBuild>,
    finished: bool,
}

impl LeaderGuard<'_> {
    fn finish(mut self, outcome: Outcome) -> Outcome {
        self.pending.complete(outcome.clone());
        self.flight.unpublish(self.key);
        self.finished = true;
        outcome
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.pending.complete(Err(GraphError::build_failed(
                self.key,
                "build aborted by a panic",
            )));
            self.flight.unpublish(self.key);
        }
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, or attach to the run already in flight.
    pub fn run<F>(&self, key: GraphType, work: F) -> Outcome
    where
        F: FnOnce() -> Outcome,
    {
        let (pending, leader) = {
            let mut map = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match map.get(&key) {
                Some(pending) => (Arc::clone(pending), false),
                None => {
                    let pending = Arc::new(PendingBuild::default());
                    map.insert(key, Arc::clone(&pending));
                    (pending, true)
                }
            }
        };

        if !leader {
            debug!(graph_type = %key, "attaching to in-flight build");
            return pending.wait();
        }

        let guard = LeaderGuard {
            flight: self,
            key,
            pending,
            finished: false,
        };
        let outcome = work();
        guard.finish(outcome)
    }

    /// Whether a build for `key` is currently in flight.
    pub fn in_flight(&self, key: GraphType) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }

    fn unpublish(&self, key: GraphType) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
    }
}
