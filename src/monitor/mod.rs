//! One monitoring cycle, end to end.
//!
//! A cycle reads the job topology and workable statuses at a pinned block,
//! advances the persisted streak counters of every scope, and sends a single
//! alert for all jobs that reached the threshold. Cycles hold no state of
//! their own between runs.

pub mod alert;
pub mod watch;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::Address;
use futures::future::try_join_all;
use opentelemetry::KeyValue;
use tracing::{Instrument, debug, info, warn};

use crate::chain::ChainReader;
use crate::error::Result;
use crate::model::{
    BlockNumber, JobAddress, NetworkId, ScopeKey, ScopeMode, StreakKey, UnworkedJob,
    WorkableSnapshot,
};
use crate::notify::Notifier;
use crate::storage::StateStore;
use crate::telemetry::cycle::{record_unworked, start_cycle_span};
use crate::telemetry::metrics;
use crate::tracker::StreakTracker;

pub use alert::compose_alert;
pub use watch::Watcher;

/// Deployment settings of the monitor.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Sequencer contract; names the scope in [`ScopeMode::Sequencer`].
    pub sequencer: Address,
    pub mode: ScopeMode,
}

/// What a completed cycle observed and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub block: BlockNumber,
    pub jobs: usize,
    /// Scopes whose counters were written, in processing order.
    pub scopes: Vec<ScopeKey>,
    /// Jobs at or above the threshold, network-major then in job order.
    pub unworked: Vec<UnworkedJob>,
}

impl CycleReport {
    /// Whether this cycle sent an alert.
    pub fn notified(&self) -> bool {
        !self.unworked.is_empty()
    }
}

/// Observations of one scope, ready for the tracker.
struct ScopeObservations {
    scope: ScopeKey,
    observations: Vec<(StreakKey, bool)>,
}

/// Runs monitoring cycles against injected collaborators.
pub struct MonitorCycle {
    chain: Arc<dyn ChainReader>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
}

impl MonitorCycle {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            chain,
            store,
            notifier,
            config,
        }
    }

    /// Most recent block known to the chain reader.
    pub async fn latest_block(&self) -> Result<BlockNumber> {
        self.chain.latest_block().await
    }

    /// Run one cycle at `block`, alerting on jobs workable for `threshold`
    /// or more consecutive cycles.
    ///
    /// Any chain or state failure fails the whole cycle. Every scope is read
    /// and advanced before the first write, so a chain or state read failure
    /// leaves all scopes untouched. Writes then commit one scope at a time;
    /// a [`StateWrite`](crate::error::Error::StateWrite) failure may follow
    /// earlier scopes that were already committed for `block`.
    pub async fn run(&self, block: BlockNumber, threshold: u64) -> Result<CycleReport> {
        let span = start_cycle_span(block, self.config.mode);
        let started = Instant::now();

        let result = self.run_cycle(block, threshold).instrument(span.clone()).await;

        let outcome = match &result {
            Ok(report) => {
                record_unworked(&span, report.unworked.len());
                "ok"
            }
            Err(_) => "error",
        };
        metrics::cycles().add(1, &[KeyValue::new("result", outcome)]);
        metrics::cycle_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &[]);

        result
    }

    async fn run_cycle(&self, block: BlockNumber, threshold: u64) -> Result<CycleReport> {
        let tracker = StreakTracker::new(threshold)?;
        info!(block, threshold, mode = %self.config.mode, "monitoring sequencer");

        let jobs = self.job_addresses(block).await?;
        let networks = self.networks(block).await?;
        debug!(jobs = jobs.len(), networks = networks.len(), "topology loaded");

        let snapshots = try_join_all(
            networks
                .iter()
                .map(|network| self.snapshot(*network, &jobs, block)),
        )
        .await?;

        let groups = self.group_by_scope(&snapshots);
        let priors =
            try_join_all(groups.iter().map(|group| self.store.get(&group.scope))).await?;
        let advances: Vec<_> = groups
            .iter()
            .zip(&priors)
            .map(|(group, prior)| (group, tracker.advance(prior, &group.observations)))
            .collect();

        let mut scopes = Vec::with_capacity(advances.len());
        let mut unworked = Vec::new();
        for (group, advance) in advances {
            self.store.put(&group.scope, &advance.streaks).await?;
            debug!(scope = %group.scope, crossed = advance.crossed.len(), "streaks updated");
            unworked.extend(unworked_jobs(group.scope, advance.crossed));
            scopes.push(group.scope);
        }

        if unworked.is_empty() {
            debug!(block, "no unworked jobs");
        } else {
            for job in &unworked {
                metrics::unworked_jobs()
                    .add(1, &[KeyValue::new("network", job.network.to_string())]);
            }
            info!(count = unworked.len(), "notifying unworked jobs");
            let message = compose_alert(block, threshold, &unworked);
            self.notifier.notify(&message).await;
        }

        Ok(CycleReport {
            block,
            jobs: jobs.len(),
            scopes,
            unworked,
        })
    }

    /// Job addresses in sequencer order, fetched concurrently by index.
    async fn job_addresses(&self, block: BlockNumber) -> Result<Vec<JobAddress>> {
        let count = self.chain.job_count(block).await?;
        let jobs = try_join_all((0..count).map(|i| self.chain.job_at(i, block))).await?;

        let mut seen = HashSet::with_capacity(jobs.len());
        let mut unique = Vec::with_capacity(jobs.len());
        for job in jobs {
            if seen.insert(job) {
                unique.push(job);
            } else {
                warn!(%job, "sequencer lists job twice, ignoring repeat");
            }
        }
        Ok(unique)
    }

    /// Networks to observe under the configured scope mode.
    async fn networks(&self, block: BlockNumber) -> Result<Vec<NetworkId>> {
        match self.config.mode {
            ScopeMode::Master => Ok(vec![self.chain.master_network(block).await?]),
            ScopeMode::Networks | ScopeMode::Sequencer => {
                let count = self.chain.network_count(block).await?;
                try_join_all((0..count).map(|i| self.chain.network_at(i, block))).await
            }
        }
    }

    async fn snapshot(
        &self,
        network: NetworkId,
        jobs: &[JobAddress],
        block: BlockNumber,
    ) -> Result<WorkableSnapshot> {
        let statuses = try_join_all(
            jobs.iter()
                .map(|job| self.chain.is_workable(*job, network, block)),
        )
        .await?;

        let snapshot = WorkableSnapshot {
            network,
            statuses: jobs.iter().copied().zip(statuses).collect(),
        };
        debug!(
            %network,
            workable = snapshot.workable_jobs().count(),
            "workable statuses loaded"
        );
        Ok(snapshot)
    }

    fn group_by_scope(&self, snapshots: &[WorkableSnapshot]) -> Vec<ScopeObservations> {
        let observe = |scope: ScopeKey, snapshot: &WorkableSnapshot| {
            snapshot
                .statuses
                .iter()
                .map(move |(job, workable)| (scope.streak_key(snapshot.network, *job), *workable))
                .collect::<Vec<_>>()
        };

        match self.config.mode {
            ScopeMode::Master | ScopeMode::Networks => snapshots
                .iter()
                .map(|snapshot| {
                    let scope = ScopeKey::Network(snapshot.network);
                    ScopeObservations {
                        scope,
                        observations: observe(scope, snapshot),
                    }
                })
                .collect(),
            ScopeMode::Sequencer => {
                let scope = ScopeKey::Sequencer(self.config.sequencer);
                vec![ScopeObservations {
                    scope,
                    observations: snapshots
                        .iter()
                        .flat_map(|snapshot| observe(scope, snapshot))
                        .collect(),
                }]
            }
        }
    }
}

/// Crossed keys of `scope` as alert entries.
fn unworked_jobs(scope: ScopeKey, crossed: Vec<(StreakKey, u64)>) -> Vec<UnworkedJob> {
    crossed
        .into_iter()
        .filter_map(|(key, streak)| {
            let network = scope.network_of(&key)?;
            Some(UnworkedJob {
                network,
                job: key.job,
                streak,
            })
        })
        .collect()
}
