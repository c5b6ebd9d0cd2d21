// src/pricing/chain.rs: Read-only chain access for on-chain price sources

use alloy::network::Ethereum;
use alloy::primitives::{Address, Bytes};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{BlockId, BlockNumberOrTag, TransactionRequest};
use alloy::sol_types::SolCall;
use alloy::transports::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use super::PriceError;

/// Contract reads at a given block.
#[async_trait]
pub trait ChainReader: Send + Sync {
    fn supports_chain(&self, chain_id: u64) -> bool;

    async fn call(
        &self,
        chain_id: u64,
        to: Address,
        input: Bytes,
        block: Option<u64>,
    ) -> Result<Bytes, PriceError>;

    /// Unix timestamp of `block`, when the node can report it.
    async fn block_timestamp(&self, chain_id: u64, block: u64) -> Result<Option<i64>, PriceError>;
}

/// Encode `call`, run it against `to` and decode its return values.
pub async fn call_view<C: SolCall>(
    reader: &dyn ChainReader,
    service: &str,
    chain_id: u64,
    to: Address,
    call: &C,
    block: Option<u64>,
) -> Result<C::Return, PriceError> {
    let out = reader
        .call(chain_id, to, Bytes::from(call.abi_encode()), block)
        .await?;
    C::abi_decode_returns(&out)
        .map_err(|e| PriceError::rejected(service, format!("undecodable {} response: {e}", C::SIGNATURE)))
}

fn rpc_error(method: &str, e: TransportError) -> PriceError {
    // A JSON-RPC error object is the node answering (revert, bad params).
    if e.as_error_resp().is_some() {
        PriceError::rejected("rpc", format!("{method}: {e}"))
    } else {
        PriceError::service("rpc", format!("{method}: {e}"))
    }
}

/// One HTTP provider per chain with a configured endpoint.
pub struct RpcReader {
    providers: HashMap<u64, RootProvider<Ethereum>>,
    timeout: Duration,
}

impl RpcReader {
    pub fn new(endpoints: HashMap<u64, String>, timeout: Duration) -> Self {
        let providers = endpoints
            .into_iter()
            .filter_map(|(chain_id, endpoint)| match url::Url::parse(&endpoint) {
                Ok(url) => Some((chain_id, RootProvider::<Ethereum>::new_http(url))),
                Err(e) => {
                    tracing::warn!(chain_id, "Ignoring unparseable RPC URL: {e}");
                    None
                }
            })
            .collect();
        Self { providers, timeout }
    }

    fn provider(&self, chain_id: u64) -> Result<&RootProvider<Ethereum>, PriceError> {
        self.providers
            .get(&chain_id)
            .ok_or_else(|| PriceError::rejected("rpc", format!("no endpoint for chain {chain_id}")))
    }
}

#[async_trait]
impl ChainReader for RpcReader {
    fn supports_chain(&self, chain_id: u64) -> bool {
        self.providers.contains_key(&chain_id)
    }

    async fn call(
        &self,
        chain_id: u64,
        to: Address,
        input: Bytes,
        block: Option<u64>,
    ) -> Result<Bytes, PriceError> {
        let provider = self.provider(chain_id)?;
        let tx = TransactionRequest::default().to(to).input(input.into());
        let request = provider
            .call(tx)
            .block(block.map_or(BlockId::latest(), BlockId::number));
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| PriceError::service("rpc", "eth_call timed out"))?
            .map_err(|e| rpc_error("eth_call", e))
    }

    async fn block_timestamp(&self, chain_id: u64, block: u64) -> Result<Option<i64>, PriceError> {
        let provider = self.provider(chain_id)?;
        let request = provider.get_block_by_number(BlockNumberOrTag::Number(block));
        let found = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| PriceError::service("rpc", "eth_getBlockByNumber timed out"))?
            .map_err(|e| rpc_error("eth_getBlockByNumber", e))?;
        Ok(found.map(|b| b.header.timestamp as i64))
    }
}
