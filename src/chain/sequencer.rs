//! JSON-RPC implementation of [`ChainReader`] on top of alloy.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder, ReqwestProvider};
use alloy::rpc::types::BlockId;
use alloy::sol;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use tracing::debug;

use super::ChainReader;
use crate::error::{Error, Result};
use crate::model::{BlockNumber, JobAddress, NetworkId};

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface ISequencer {
        function numJobs() external view returns (uint256);
        function jobAt(uint256 index) external view returns (address);
        function numNetworks() external view returns (uint256);
        function networkAt(uint256 index) external view returns (bytes32);
        function getMaster() external view returns (bytes32);
    }

    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IJob {
        function workable(bytes32 network) external view returns (bool canWork, bytes memory args);
    }
}

type SequencerContract = ISequencer::ISequencerInstance<Http<Client>, ReqwestProvider>;
type JobContract = IJob::IJobInstance<Http<Client>, ReqwestProvider>;

/// Reads sequencer topology and job status over HTTP JSON-RPC.
///
/// Job contract handles are created on first use and kept for the lifetime
/// of the reader.
pub struct SequencerReader {
    provider: ReqwestProvider,
    sequencer: SequencerContract,
    jobs: Mutex<HashMap<Address, JobContract>>,
}

impl SequencerReader {
    /// Build a reader for the sequencer at `sequencer` behind `rpc_url`.
    pub fn connect(rpc_url: &str, sequencer: Address) -> Result<Self> {
        let url = rpc_url
            .parse()
            .map_err(|e| Error::Config(format!("invalid RPC url {rpc_url}: {e}")))?;
        let provider = ProviderBuilder::new().on_http(url);
        let sequencer = ISequencer::new(sequencer, provider.clone());

        Ok(Self {
            provider,
            sequencer,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    fn job_contract(&self, job: JobAddress) -> JobContract {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.entry(job.0)
            .or_insert_with(|| IJob::new(job.0, self.provider.clone()))
            .clone()
    }
}

fn at(block: BlockNumber) -> BlockId {
    BlockId::number(block)
}

fn to_u64(call: &'static str, value: U256) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(Error::chain_read(call, format!("count {value} does not fit in u64")));
    }
    Ok(value.to::<u64>())
}

#[async_trait]
impl ChainReader for SequencerReader {
    async fn job_count(&self, block: BlockNumber) -> Result<u64> {
        let count = self
            .sequencer
            .numJobs()
            .block(at(block))
            .call()
            .await
            .map_err(|e| Error::chain_read("numJobs", e))?
            ._0;
        to_u64("numJobs", count)
    }

    async fn job_at(&self, index: u64, block: BlockNumber) -> Result<JobAddress> {
        let job = self
            .sequencer
            .jobAt(U256::from(index))
            .block(at(block))
            .call()
            .await
            .map_err(|e| Error::chain_read("jobAt", e))?
            ._0;
        Ok(JobAddress(job))
    }

    async fn network_count(&self, block: BlockNumber) -> Result<u64> {
        let count = self
            .sequencer
            .numNetworks()
            .block(at(block))
            .call()
            .await
            .map_err(|e| Error::chain_read("numNetworks", e))?
            ._0;
        to_u64("numNetworks", count)
    }

    async fn network_at(&self, index: u64, block: BlockNumber) -> Result<NetworkId> {
        let network = self
            .sequencer
            .networkAt(U256::from(index))
            .block(at(block))
            .call()
            .await
            .map_err(|e| Error::chain_read("networkAt", e))?
            ._0;
        Ok(NetworkId(network))
    }

    async fn master_network(&self, block: BlockNumber) -> Result<NetworkId> {
        let master = self
            .sequencer
            .getMaster()
            .block(at(block))
            .call()
            .await
            .map_err(|e| Error::chain_read("getMaster", e))?
            ._0;
        Ok(NetworkId(master))
    }

    async fn is_workable(
        &self,
        job: JobAddress,
        network: NetworkId,
        block: BlockNumber,
    ) -> Result<bool> {
        let status = self
            .job_contract(job)
            .workable(network.0)
            .block(at(block))
            .call()
            .await
            .map_err(|e| Error::chain_read("workable", e))?;
        debug!(%job, %network, block, can_work = status.canWork, "workable status");
        Ok(status.canWork)
    }

    async fn latest_block(&self) -> Result<BlockNumber> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| Error::chain_read("eth_blockNumber", e))
    }
}
