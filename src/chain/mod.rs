//! Read access to the sequencer and its jobs.
//!
//! Every call is pinned to an explicit block so that one cycle observes a
//! single consistent chain state.

pub mod sequencer;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{BlockNumber, JobAddress, NetworkId};

pub use sequencer::SequencerReader;

/// Chain state the monitor needs, as exposed by the sequencer contract.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Number of jobs registered with the sequencer.
    async fn job_count(&self, block: BlockNumber) -> Result<u64>;

    /// Address of the job at `index`.
    async fn job_at(&self, index: u64, block: BlockNumber) -> Result<JobAddress>;

    /// Number of networks the sequencer coordinates.
    async fn network_count(&self, block: BlockNumber) -> Result<u64>;

    /// Network at `index`.
    async fn network_at(&self, index: u64, block: BlockNumber) -> Result<NetworkId>;

    /// The authoritative network at `block`.
    async fn master_network(&self, block: BlockNumber) -> Result<NetworkId>;

    /// Whether `job` can be worked on `network` at `block`.
    async fn is_workable(
        &self,
        job: JobAddress,
        network: NetworkId,
        block: BlockNumber,
    ) -> Result<bool>;

    /// Most recent block known to the node.
    async fn latest_block(&self) -> Result<BlockNumber>;
}
