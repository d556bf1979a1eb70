//! Core data model.
//!
//! Jobs are contracts registered with a sequencer. A job is observed on one
//! or more networks; each observation says whether the job is workable. The
//! persisted state is a per-scope map of streak counters.

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Block number every chain read of a cycle is pinned to.
pub type BlockNumber = u64;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Address of a job contract. Displays EIP-55 checksummed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobAddress(pub Address);

impl fmt::Display for JobAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Address::from_str(s)
            .map(JobAddress)
            .map_err(|e| Error::InvalidArgument(format!("bad job address {s:?}: {e}")))
    }
}

impl From<Address> for JobAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

/// A network the sequencer coordinates, as the `bytes32` the contract uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub B256);

impl NetworkId {
    /// Build an identifier from a short ASCII name, right-padded with zeros.
    pub fn from_name(name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > 32 {
            return Err(Error::InvalidArgument(format!(
                "network name must be 1..=32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut raw = [0u8; 32];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(B256::from(raw)))
    }

    /// Human-readable name when the id is zero-padded printable ASCII.
    pub fn label(&self) -> Option<String> {
        let bytes = self.0.as_slice();
        let end = bytes.iter().rposition(|b| *b != 0)? + 1;
        let name = &bytes[..end];
        if name.iter().all(|b| (0x20..=0x7e).contains(b)) {
            Some(String::from_utf8_lossy(name).into_owned())
        } else {
            None
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NetworkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        B256::from_str(s)
            .map(NetworkId)
            .map_err(|e| Error::InvalidArgument(format!("bad network id {s:?}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

/// How the streak counters are partitioned into persisted scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeMode {
    /// Only the master network at the observed block is tracked.
    #[default]
    Master,
    /// Every network is tracked under its own scope.
    Networks,
    /// Every network is tracked under one sequencer-wide scope.
    Sequencer,
}

impl fmt::Display for ScopeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScopeMode::Master => "master",
            ScopeMode::Networks => "networks",
            ScopeMode::Sequencer => "sequencer",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ScopeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master" => Ok(ScopeMode::Master),
            "networks" => Ok(ScopeMode::Networks),
            "sequencer" => Ok(ScopeMode::Sequencer),
            other => Err(Error::InvalidArgument(format!("unknown scope mode: {other}"))),
        }
    }
}

/// Partition key of the persisted streak state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    Network(NetworkId),
    Sequencer(Address),
}

impl ScopeKey {
    /// Streak key for `job` observed on `network` within this scope.
    ///
    /// Network scopes already pin the network, so only the job is kept.
    pub fn streak_key(&self, network: NetworkId, job: JobAddress) -> StreakKey {
        match self {
            ScopeKey::Network(_) => StreakKey::job(job),
            ScopeKey::Sequencer(_) => StreakKey::network_job(network, job),
        }
    }

    /// Network a streak key belongs to within this scope.
    pub fn network_of(&self, key: &StreakKey) -> Option<NetworkId> {
        match self {
            ScopeKey::Network(network) => Some(*network),
            ScopeKey::Sequencer(_) => key.network,
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Network(network) => write!(f, "{network}"),
            ScopeKey::Sequencer(address) => write!(f, "{address}"),
        }
    }
}

impl FromStr for ScopeKey {
    type Err = Error;

    /// 32-byte hex parses as a network scope, 20-byte hex as a sequencer scope.
    fn from_str(s: &str) -> Result<Self> {
        let hex = s.strip_prefix("0x").unwrap_or(s);
        match hex.len() {
            64 => Ok(ScopeKey::Network(s.parse()?)),
            40 => Ok(ScopeKey::Sequencer(s.parse::<JobAddress>()?.0)),
            _ => Err(Error::InvalidArgument(format!(
                "scope key must be a network id or a sequencer address: {s}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Streaks
// ---------------------------------------------------------------------------

/// Key of one streak counter inside a scope.
///
/// Renders as `"{job}"` or, when the scope spans networks, as
/// `"{network}-{job}"`. The string form is what gets persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StreakKey {
    pub network: Option<NetworkId>,
    pub job: JobAddress,
}

impl StreakKey {
    pub fn job(job: JobAddress) -> Self {
        Self { network: None, job }
    }

    pub fn network_job(network: NetworkId, job: JobAddress) -> Self {
        Self {
            network: Some(network),
            job,
        }
    }
}

impl fmt::Display for StreakKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.network {
            Some(network) => write!(f, "{network}-{}", self.job),
            None => write!(f, "{}", self.job),
        }
    }
}

impl FromStr for StreakKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('-') {
            Some((network, job)) => Ok(Self::network_job(network.parse()?, job.parse()?)),
            None => Ok(Self::job(s.parse()?)),
        }
    }
}

impl From<StreakKey> for String {
    fn from(key: StreakKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for StreakKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Persisted counters of one scope: consecutive workable observations per key.
pub type StreakMap = BTreeMap<StreakKey, u64>;

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// Workable status of every job on one network at one block, in the order
/// the sequencer enumerates the jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkableSnapshot {
    pub network: NetworkId,
    pub statuses: Vec<(JobAddress, bool)>,
}

impl WorkableSnapshot {
    /// Jobs currently workable, in enumeration order.
    pub fn workable_jobs(&self) -> impl Iterator<Item = JobAddress> + '_ {
        self.statuses
            .iter()
            .filter(|(_, workable)| *workable)
            .map(|(job, _)| *job)
    }
}

/// A job whose streak reached the alert threshold in this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnworkedJob {
    pub network: NetworkId,
    pub job: JobAddress,
    pub streak: u64,
}
