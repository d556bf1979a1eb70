//! Integration tests for monitor cycles and the block watcher.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, address};
use async_trait::async_trait;
use sequencer_monitor::chain::ChainReader;
use sequencer_monitor::error::{Error, Result};
use sequencer_monitor::model::*;
use sequencer_monitor::monitor::{MonitorConfig, MonitorCycle, Watcher};
use sequencer_monitor::notify::Notifier;
use sequencer_monitor::storage::{MemoryStateStore, StateStore};

const SEQUENCER: Address = address!("5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e");

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct FakeChain {
    jobs: Vec<JobAddress>,
    networks: Vec<NetworkId>,
    master: NetworkId,
    head: Mutex<BlockNumber>,
    workable: Mutex<HashSet<(NetworkId, JobAddress)>>,
    fail_workable: AtomicBool,
    calls: AtomicUsize,
    blocks_read: Mutex<Vec<BlockNumber>>,
}

impl FakeChain {
    fn new(jobs: Vec<JobAddress>, networks: Vec<NetworkId>) -> Self {
        Self {
            master: networks[0],
            jobs,
            networks,
            head: Mutex::new(1),
            workable: Mutex::new(HashSet::new()),
            fail_workable: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            blocks_read: Mutex::new(Vec::new()),
        }
    }

    fn set_workable(&self, network: NetworkId, job: JobAddress, can_work: bool) {
        let mut workable = self.workable.lock().unwrap();
        if can_work {
            workable.insert((network, job));
        } else {
            workable.remove(&(network, job));
        }
    }

    fn set_head(&self, block: BlockNumber) {
        *self.head.lock().unwrap() = block;
    }

    fn read(&self, block: BlockNumber) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.blocks_read.lock().unwrap().push(block);
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn job_count(&self, block: BlockNumber) -> Result<u64> {
        self.read(block);
        Ok(self.jobs.len() as u64)
    }

    async fn job_at(&self, index: u64, block: BlockNumber) -> Result<JobAddress> {
        self.read(block);
        Ok(self.jobs[index as usize])
    }

    async fn network_count(&self, block: BlockNumber) -> Result<u64> {
        self.read(block);
        Ok(self.networks.len() as u64)
    }

    async fn network_at(&self, index: u64, block: BlockNumber) -> Result<NetworkId> {
        self.read(block);
        Ok(self.networks[index as usize])
    }

    async fn master_network(&self, block: BlockNumber) -> Result<NetworkId> {
        self.read(block);
        Ok(self.master)
    }

    async fn is_workable(
        &self,
        job: JobAddress,
        network: NetworkId,
        block: BlockNumber,
    ) -> Result<bool> {
        self.read(block);
        if self.fail_workable.load(Ordering::SeqCst) {
            return Err(Error::chain_read("workable", "node unavailable"));
        }
        Ok(self.workable.lock().unwrap().contains(&(network, job)))
    }

    async fn latest_block(&self) -> Result<BlockNumber> {
        Ok(*self.head.lock().unwrap())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Wraps a memory store and fails reads or writes of chosen scopes.
#[derive(Default)]
struct FaultyStore {
    inner: MemoryStateStore,
    fail_get: Option<ScopeKey>,
    fail_put: Option<ScopeKey>,
    puts: AtomicUsize,
}

#[async_trait]
impl StateStore for FaultyStore {
    async fn get(&self, scope: &ScopeKey) -> Result<StreakMap> {
        if self.fail_get == Some(*scope) {
            return Err(Error::StateRead {
                scope: scope.to_string(),
                source: "connection reset".into(),
            });
        }
        self.inner.get(scope).await
    }

    async fn put(&self, scope: &ScopeKey, streaks: &StreakMap) -> Result<()> {
        if self.fail_put == Some(*scope) {
            return Err(Error::StateWrite {
                scope: scope.to_string(),
                source: "table unavailable".into(),
            });
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(scope, streaks).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn job(byte: u8) -> JobAddress {
    JobAddress(Address::repeat_byte(byte))
}

fn network(name: &str) -> NetworkId {
    NetworkId::from_name(name).unwrap()
}

struct Harness {
    chain: Arc<FakeChain>,
    store: Arc<MemoryStateStore>,
    notifier: Arc<RecordingNotifier>,
    monitor: Arc<MonitorCycle>,
}

fn harness(chain: FakeChain, mode: ScopeMode) -> Harness {
    let chain = Arc::new(chain);
    let store = Arc::new(MemoryStateStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = Arc::new(MonitorCycle::new(
        chain.clone(),
        store.clone(),
        notifier.clone(),
        MonitorConfig {
            sequencer: SEQUENCER,
            mode,
        },
    ));
    Harness {
        chain,
        store,
        notifier,
        monitor,
    }
}

fn streaks(entries: &[(StreakKey, u64)]) -> StreakMap {
    entries.iter().copied().collect()
}

// ---------------------------------------------------------------------------
// Master network scope
// ---------------------------------------------------------------------------

#[tokio::test]
async fn alerts_once_job_stays_workable_for_threshold_cycles() {
    let main = network("MAINNET");
    let h = harness(FakeChain::new(vec![job(1), job(2)], vec![main]), ScopeMode::Master);
    h.chain.set_workable(main, job(1), true);

    for block in 1..=2 {
        let report = h.monitor.run(block, 3).await.unwrap();
        assert!(!report.notified(), "block {block} should not alert");
    }
    assert!(h.notifier.messages().is_empty());

    let report = h.monitor.run(3, 3).await.unwrap();
    assert_eq!(
        report.unworked,
        vec![UnworkedJob {
            network: main,
            job: job(1),
            streak: 3
        }]
    );

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains(&job(1).to_string()));
    assert!(!messages[0].contains(&job(2).to_string()));

    let stored = h.store.get(&ScopeKey::Network(main)).await.unwrap();
    assert_eq!(stored, streaks(&[(StreakKey::job(job(1)), 3)]));
}

#[tokio::test]
async fn advances_prior_state_and_notifies() {
    let main = network("MAINNET");
    let h = harness(FakeChain::new(vec![job(1), job(2)], vec![main]), ScopeMode::Master);
    h.chain.set_workable(main, job(1), true);

    let scope = ScopeKey::Network(main);
    h.store
        .put(
            &scope,
            &streaks(&[(StreakKey::job(job(1)), 2), (StreakKey::job(job(2)), 0)]),
        )
        .await
        .unwrap();

    h.monitor.run(1234, 3).await.unwrap();

    assert_eq!(
        h.store.get(&scope).await.unwrap(),
        streaks(&[(StreakKey::job(job(1)), 3), (StreakKey::job(job(2)), 0)])
    );
    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("unworked jobs detected"));
}

#[tokio::test]
async fn does_not_notify_below_threshold() {
    let main = network("MAINNET");
    let h = harness(FakeChain::new(vec![job(1), job(2)], vec![main]), ScopeMode::Master);
    h.chain.set_workable(main, job(1), true);
    h.store
        .put(&ScopeKey::Network(main), &streaks(&[(StreakKey::job(job(1)), 1)]))
        .await
        .unwrap();

    let report = h.monitor.run(10, 3).await.unwrap();
    assert!(report.unworked.is_empty());
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn resets_streak_when_job_becomes_unworkable() {
    let main = network("MAINNET");
    let h = harness(FakeChain::new(vec![job(1)], vec![main]), ScopeMode::Master);
    let scope = ScopeKey::Network(main);
    h.store
        .put(&scope, &streaks(&[(StreakKey::job(job(1)), 2)]))
        .await
        .unwrap();

    h.monitor.run(10, 3).await.unwrap();

    assert_eq!(
        h.store.get(&scope).await.unwrap(),
        streaks(&[(StreakKey::job(job(1)), 0)])
    );
    assert!(h.notifier.messages().is_empty());
}

#[tokio::test]
async fn keeps_alerting_while_job_stays_workable() {
    let main = network("MAINNET");
    let h = harness(FakeChain::new(vec![job(1)], vec![main]), ScopeMode::Master);
    h.chain.set_workable(main, job(1), true);

    for block in 1..=4 {
        h.monitor.run(block, 2).await.unwrap();
    }
    assert_eq!(h.notifier.messages().len(), 3);
}

#[tokio::test]
async fn sends_a_single_alert_for_many_jobs() {
    let main = network("MAINNET");
    let jobs = vec![job(1), job(2), job(3)];
    let h = harness(FakeChain::new(jobs.clone(), vec![main]), ScopeMode::Master);
    for j in &jobs {
        h.chain.set_workable(main, *j, true);
    }

    let report = h.monitor.run(1, 1).await.unwrap();
    let order: Vec<_> = report.unworked.iter().map(|u| u.job).collect();
    assert_eq!(order, jobs);
    assert_eq!(h.notifier.messages().len(), 1);
}

#[tokio::test]
async fn pins_every_read_to_the_cycle_block() {
    let main = network("MAINNET");
    let h = harness(FakeChain::new(vec![job(1), job(2)], vec![main]), ScopeMode::Master);

    h.monitor.run(42, 3).await.unwrap();

    let blocks = h.chain.blocks_read.lock().unwrap().clone();
    assert!(!blocks.is_empty());
    assert!(blocks.iter().all(|b| *b == 42));
}

#[tokio::test]
async fn follows_the_master_network_only() {
    let (main, other) = (network("MAINNET"), network("GELATO"));
    let h = harness(
        FakeChain::new(vec![job(1)], vec![main, other]),
        ScopeMode::Master,
    );
    h.chain.set_workable(other, job(1), true);

    let report = h.monitor.run(1, 1).await.unwrap();
    assert_eq!(report.scopes, vec![ScopeKey::Network(main)]);
    assert!(report.unworked.is_empty());
}

// ---------------------------------------------------------------------------
// Multi-network scopes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tracks_each_network_under_its_own_scope() {
    let (main, other) = (network("MAINNET"), network("GELATO"));
    let h = harness(
        FakeChain::new(vec![job(1), job(2)], vec![main, other]),
        ScopeMode::Networks,
    );
    h.chain.set_workable(main, job(1), true);
    h.chain.set_workable(other, job(2), true);
    h.chain.set_workable(other, job(1), false);

    h.monitor.run(1, 2).await.unwrap();
    let report = h.monitor.run(2, 2).await.unwrap();

    assert_eq!(
        report.scopes,
        vec![ScopeKey::Network(main), ScopeKey::Network(other)]
    );
    assert_eq!(
        report.unworked,
        vec![
            UnworkedJob { network: main, job: job(1), streak: 2 },
            UnworkedJob { network: other, job: job(2), streak: 2 },
        ]
    );
    assert_eq!(
        h.store.get(&ScopeKey::Network(other)).await.unwrap(),
        streaks(&[(StreakKey::job(job(2)), 2)])
    );

    let message = &h.notifier.messages()[0];
    let main_at = message.find("MAINNET").unwrap();
    let other_at = message.find("GELATO").unwrap();
    assert!(main_at < other_at, "alert should be network-major: {message}");
}

#[tokio::test]
async fn sequencer_scope_uses_composite_keys() {
    let (main, other) = (network("MAINNET"), network("GELATO"));
    let h = harness(
        FakeChain::new(vec![job(1)], vec![main, other]),
        ScopeMode::Sequencer,
    );
    h.chain.set_workable(main, job(1), true);
    h.chain.set_workable(other, job(1), true);

    let report = h.monitor.run(7, 1).await.unwrap();
    assert_eq!(report.scopes, vec![ScopeKey::Sequencer(SEQUENCER)]);
    assert_eq!(report.unworked.len(), 2);
    assert_eq!(report.unworked[0].network, main);
    assert_eq!(report.unworked[1].network, other);

    let stored = h.store.get(&ScopeKey::Sequencer(SEQUENCER)).await.unwrap();
    assert_eq!(
        stored,
        streaks(&[
            (StreakKey::network_job(main, job(1)), 1),
            (StreakKey::network_job(other, job(1)), 1),
        ])
    );
    assert_eq!(h.store.scopes(), vec![ScopeKey::Sequencer(SEQUENCER)]);
}

#[tokio::test]
async fn carries_through_jobs_that_left_the_sequencer() {
    let main = network("MAINNET");
    let h = harness(FakeChain::new(vec![job(1)], vec![main]), ScopeMode::Master);
    let scope = ScopeKey::Network(main);
    h.store
        .put(&scope, &streaks(&[(StreakKey::job(job(9)), 5)]))
        .await
        .unwrap();

    h.monitor.run(1, 3).await.unwrap();

    assert_eq!(
        h.store.get(&scope).await.unwrap(),
        streaks(&[(StreakKey::job(job(9)), 5)])
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chain_failure_fails_cycle_without_touching_state() {
    let main = network("MAINNET");
    let h = harness(FakeChain::new(vec![job(1)], vec![main]), ScopeMode::Master);
    h.chain.set_workable(main, job(1), true);
    h.chain.fail_workable.store(true, Ordering::SeqCst);

    let err = h.monitor.run(1, 1).await.unwrap_err();
    assert!(matches!(err, Error::ChainRead { call: "workable", .. }));
    assert!(h.store.scopes().is_empty());
    assert!(h.notifier.messages().is_empty());
}

fn monitor_with_store(
    chain: Arc<FakeChain>,
    store: Arc<FaultyStore>,
    notifier: Arc<RecordingNotifier>,
    mode: ScopeMode,
) -> Arc<MonitorCycle> {
    Arc::new(MonitorCycle::new(
        chain,
        store,
        notifier,
        MonitorConfig {
            sequencer: SEQUENCER,
            mode,
        },
    ))
}

#[tokio::test]
async fn state_write_failure_fails_cycle_before_alerting() {
    let main = network("MAINNET");
    let chain = Arc::new(FakeChain::new(vec![job(1)], vec![main]));
    chain.set_workable(main, job(1), true);
    let store = Arc::new(FaultyStore {
        fail_put: Some(ScopeKey::Network(main)),
        ..Default::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor_with_store(chain, store, notifier.clone(), ScopeMode::Master);

    let err = monitor.run(1, 1).await.unwrap_err();
    assert!(matches!(err, Error::StateWrite { .. }));
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn state_read_failure_fails_cycle_without_writing() {
    let main = network("MAINNET");
    let gelato = network("GELATO");
    let chain = Arc::new(FakeChain::new(vec![job(1)], vec![main, gelato]));
    chain.set_workable(main, job(1), true);
    chain.set_workable(gelato, job(1), true);
    let store = Arc::new(FaultyStore {
        fail_get: Some(ScopeKey::Network(gelato)),
        ..Default::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor_with_store(chain, store.clone(), notifier.clone(), ScopeMode::Networks);

    let err = monitor.run(1, 1).await.unwrap_err();
    assert!(matches!(err, Error::StateRead { .. }));
    assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    assert!(store.inner.scopes().is_empty());
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn write_failure_in_one_network_fails_the_whole_cycle() {
    let main = network("MAINNET");
    let gelato = network("GELATO");
    let chain = Arc::new(FakeChain::new(vec![job(1)], vec![main, gelato]));
    chain.set_workable(main, job(1), true);
    chain.set_workable(gelato, job(1), true);
    let store = Arc::new(FaultyStore {
        fail_put: Some(ScopeKey::Network(gelato)),
        ..Default::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor_with_store(chain, store.clone(), notifier.clone(), ScopeMode::Networks);

    let err = monitor.run(1, 1).await.unwrap_err();
    let failed = ScopeKey::Network(gelato).to_string();
    assert!(matches!(err, Error::StateWrite { ref scope, .. } if *scope == failed));
    assert!(notifier.messages().is_empty(), "a failed cycle never alerts");
    assert_eq!(
        store.inner.get(&ScopeKey::Network(main)).await.unwrap(),
        streaks(&[(StreakKey::job(job(1)), 1)])
    );
}

#[tokio::test]
async fn drops_repeated_job_addresses() {
    let main = network("MAINNET");
    let h = harness(
        FakeChain::new(vec![job(1), job(1), job(2)], vec![main]),
        ScopeMode::Master,
    );
    h.chain.set_workable(main, job(1), true);

    let report = h.monitor.run(1, 1).await.unwrap();
    assert_eq!(report.jobs, 2);
    assert_eq!(
        report.unworked,
        vec![UnworkedJob {
            network: main,
            job: job(1),
            streak: 1,
        }]
    );
    assert_eq!(h.notifier.messages().len(), 1);
    assert_eq!(
        h.store.get(&ScopeKey::Network(main)).await.unwrap(),
        streaks(&[(StreakKey::job(job(1)), 1)])
    );
}

#[tokio::test]
async fn zero_threshold_is_rejected_before_any_read() {
    let main = network("MAINNET");
    let h = harness(FakeChain::new(vec![job(1)], vec![main]), ScopeMode::Master);

    let err = h.monitor.run(1, 0).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(h.chain.calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn watcher_runs_once_per_new_head() {
    let main = network("MAINNET");
    let h = harness(FakeChain::new(vec![job(1)], vec![main]), ScopeMode::Master);
    h.chain.set_workable(main, job(1), true);
    let watcher = Watcher::new(h.monitor.clone(), 2, Duration::from_millis(10));

    let mut last_seen = None;
    h.chain.set_head(100);
    assert_eq!(watcher.tick(&mut last_seen).await.unwrap(), Some(100));
    assert_eq!(watcher.tick(&mut last_seen).await.unwrap(), None);
    assert_eq!(last_seen, Some(100));

    h.chain.set_head(101);
    assert_eq!(watcher.tick(&mut last_seen).await.unwrap(), Some(101));

    let stored = h.store.get(&ScopeKey::Network(main)).await.unwrap();
    assert_eq!(stored, streaks(&[(StreakKey::job(job(1)), 2)]));
    assert_eq!(h.notifier.messages().len(), 1);
}

#[tokio::test]
async fn watcher_does_not_rerun_a_partially_written_block() {
    let main = network("MAINNET");
    let gelato = network("GELATO");
    let chain = Arc::new(FakeChain::new(vec![job(1)], vec![main, gelato]));
    chain.set_workable(main, job(1), true);
    chain.set_head(100);
    let store = Arc::new(FaultyStore {
        fail_put: Some(ScopeKey::Network(gelato)),
        ..Default::default()
    });
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = monitor_with_store(chain, store.clone(), notifier, ScopeMode::Networks);
    let watcher = Watcher::new(monitor, 3, Duration::from_millis(10));

    let mut last_seen = None;
    let err = watcher.tick(&mut last_seen).await.unwrap_err();
    assert!(matches!(err, Error::StateWrite { .. }));
    assert_eq!(last_seen, Some(100));
    assert_eq!(watcher.tick(&mut last_seen).await.unwrap(), None);

    let main_streaks = store.inner.get(&ScopeKey::Network(main)).await.unwrap();
    assert_eq!(main_streaks, streaks(&[(StreakKey::job(job(1)), 1)]));
}

#[tokio::test]
async fn watcher_retries_a_block_after_a_read_failure() {
    let main = network("MAINNET");
    let h = harness(FakeChain::new(vec![job(1)], vec![main]), ScopeMode::Master);
    h.chain.set_workable(main, job(1), true);
    h.chain.set_head(100);
    let watcher = Watcher::new(h.monitor.clone(), 3, Duration::from_millis(10));

    let mut last_seen = None;
    h.chain.fail_workable.store(true, Ordering::SeqCst);
    assert!(watcher.tick(&mut last_seen).await.is_err());
    assert_eq!(last_seen, None);

    h.chain.fail_workable.store(false, Ordering::SeqCst);
    assert_eq!(watcher.tick(&mut last_seen).await.unwrap(), Some(100));
    assert_eq!(
        h.store.get(&ScopeKey::Network(main)).await.unwrap(),
        streaks(&[(StreakKey::job(job(1)), 1)])
    );
}

#[tokio::test]
async fn watcher_stops_on_shutdown() {
    let main = network("MAINNET");
    let h = harness(FakeChain::new(vec![job(1)], vec![main]), ScopeMode::Master);
    let watcher = Watcher::new(h.monitor.clone(), 3, Duration::from_millis(10));

    let handle = {
        let watcher = watcher.clone();
        tokio::spawn(async move { watcher.run().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    watcher.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("watcher did not stop")
        .unwrap();
    assert!(result.is_ok());
}
