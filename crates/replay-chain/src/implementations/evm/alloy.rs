//! Alloy-based chain connection for Substrate chains with an Ethereum layer.
//!
//! Uses a WebSocket provider for both the Substrate RPC methods (headers,
//! block hashes, runtime calls) and the Ethereum compatibility methods
//! (full blocks, raw submission, `newHeads` subscription).

use crate::{ChainError, ChainReader};
use alloy_primitives::{hex, Address, Bytes, B256, U256, U64};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_pubsub::PubSubFrontend;
use alloy_transport::{RpcError, TransportError};
use alloy_transport_ws::WsConnect;
use async_trait::async_trait;
use futures::StreamExt;
use replay_types::{
	AccountState, BlockNotification, EncodedTx, RawTx, SubmissionResult, SubmitError,
	TransactionHash,
};
use serde::Deserialize;
use tokio::sync::{mpsc, RwLock};

/// Runtime API method returning an account's basic EVM state.
const ACCOUNT_BASIC_METHOD: &str = "EthereumRuntimeRPCApi_account_basic";

/// Width of one SCALE-encoded `U256` word.
const WORD_LEN: usize = 32;

/// Header fields needed from `chain_getHeader` and `newHeads`.
#[derive(Debug, Deserialize)]
struct HeadNumber {
	number: U64,
}

/// Block body from `eth_getBlockByNumber(.., true)`.
///
/// Transactions stay untyped until [`RpcBlock::into_transactions`] so that one
/// unreadable entry does not take the rest of the block with it.
#[derive(Debug, Deserialize)]
struct RpcBlock {
	#[serde(default)]
	transactions: Vec<serde_json::Value>,
}

impl RpcBlock {
	fn into_transactions(self, height: u64) -> Vec<RawTx> {
		self.transactions
			.into_iter()
			.enumerate()
			.filter_map(|(index, value)| match serde_json::from_value::<RawTx>(value) {
				Ok(tx) => Some(tx),
				Err(e) => {
					tracing::warn!(height, index, error = %e, "Skipping unreadable transaction");
					None
				},
			})
			.collect()
	}
}

/// Account state exactly as `account_basic` labels it.
///
/// The runtime metadata names the first word `balance` and the second
/// `nonce`, but the first word actually holds the nonce. Keep the labels here
/// and correct them in one place, [`ReportedAccount::into_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReportedAccount {
	balance: U256,
	nonce: U256,
}

impl ReportedAccount {
	fn from_scale(bytes: &[u8]) -> Result<Self, ChainError> {
		if bytes.len() != 2 * WORD_LEN {
			return Err(ChainError::Malformed(format!(
				"account_basic returned {} bytes, expected {}",
				bytes.len(),
				2 * WORD_LEN
			)));
		}
		let (first, second) = bytes.split_at(WORD_LEN);
		Ok(Self {
			balance: U256::from_le_slice(first),
			nonce: U256::from_le_slice(second),
		})
	}

	/// Upstream reports the nonce under `balance`. Drop the swap once the
	/// runtime API labels its fields correctly.
	fn into_state(self) -> Result<AccountState, ChainError> {
		let nonce = u64::try_from(self.balance).map_err(|_| {
			ChainError::Malformed(format!("nonce {} does not fit in 64 bits", self.balance))
		})?;
		Ok(AccountState { nonce })
	}
}

/// Maps a transport error on a read request to a [`ChainError`].
fn classify(method: &str, err: TransportError) -> ChainError {
	match err {
		RpcError::ErrorResp(payload) => ChainError::Rpc(format!("{}: {}", method, payload)),
		RpcError::DeserError { err, .. } => {
			ChainError::Malformed(format!("{}: {}", method, err))
		},
		RpcError::NullResp => ChainError::Unavailable(format!("{}: null response", method)),
		other => ChainError::Connection(format!("{}: {}", method, other)),
	}
}

/// Maps a transport error on `eth_sendRawTransaction` to a [`SubmitError`].
fn classify_submit(err: TransportError) -> SubmitError {
	match err {
		RpcError::ErrorResp(payload) => SubmitError::Rejected(payload.to_string()),
		other => SubmitError::Transport(other.to_string()),
	}
}

/// Chain connection over an alloy WebSocket provider.
///
/// The provider sits behind an async lock so that [`ChainReader::reconnect`]
/// can swap it while other calls hold a cheap clone of the previous one.
pub struct AlloyChain {
	name: String,
	url: String,
	header_buffer: usize,
	provider: RwLock<RootProvider<PubSubFrontend>>,
}

impl AlloyChain {
	/// Opens a WebSocket connection to `url`.
	///
	/// `header_buffer` bounds the channel handed out by
	/// [`ChainReader::subscribe_headers`].
	pub async fn connect(
		name: impl Into<String>,
		url: impl Into<String>,
		header_buffer: usize,
	) -> Result<Self, ChainError> {
		let name = name.into();
		let url = url.into();
		let provider = Self::build_provider(&url).await?;
		tracing::info!(chain = %name, url = %url, "Connected");

		Ok(Self {
			name,
			url,
			header_buffer: header_buffer.max(1),
			provider: RwLock::new(provider),
		})
	}

	async fn build_provider(url: &str) -> Result<RootProvider<PubSubFrontend>, ChainError> {
		ProviderBuilder::new()
			.on_ws(WsConnect::new(url))
			.await
			.map_err(|e| ChainError::Connection(format!("Failed to connect to {}: {}", url, e)))
	}

	async fn current(&self) -> RootProvider<PubSubFrontend> {
		self.provider.read().await.clone()
	}
}

#[async_trait]
impl ChainReader for AlloyChain {
	fn name(&self) -> &str {
		&self.name
	}

	async fn head_height(&self) -> Result<u64, ChainError> {
		let header: HeadNumber = self
			.current()
			.await
			.raw_request("chain_getHeader".into(), ())
			.await
			.map_err(|e| classify("chain_getHeader", e))?;
		Ok(header.number.to::<u64>())
	}

	async fn block_hash(&self, height: u64) -> Result<Option<B256>, ChainError> {
		self.current()
			.await
			.raw_request("chain_getBlockHash".into(), (height,))
			.await
			.map_err(|e| classify("chain_getBlockHash", e))
	}

	async fn account_state(
		&self,
		address: &Address,
		block_hash: B256,
	) -> Result<AccountState, ChainError> {
		let result: Bytes = self
			.current()
			.await
			.raw_request(
				"state_call".into(),
				(ACCOUNT_BASIC_METHOD, hex::encode_prefixed(address), block_hash),
			)
			.await
			.map_err(|e| match classify("state_call", e) {
				// State pruned or not yet imported at that block.
				ChainError::Rpc(message) => ChainError::Unavailable(message),
				other => other,
			})?;

		ReportedAccount::from_scale(&result)?.into_state()
	}

	async fn block_transactions(&self, height: u64) -> Result<Vec<RawTx>, ChainError> {
		let block: Option<RpcBlock> = self
			.current()
			.await
			.raw_request("eth_getBlockByNumber".into(), (format!("0x{:x}", height), true))
			.await
			.map_err(|e| classify("eth_getBlockByNumber", e))?;

		block
			.map(|block| block.into_transactions(height))
			.ok_or_else(|| ChainError::Unavailable(format!("block {} not available", height)))
	}

	async fn submit_raw(&self, tx: &EncodedTx) -> SubmissionResult {
		let pending = self
			.current()
			.await
			.send_raw_transaction(tx.as_bytes())
			.await
			.map_err(classify_submit)?;

		Ok(TransactionHash(*pending.tx_hash()))
	}

	async fn subscribe_headers(&self) -> Result<mpsc::Receiver<BlockNotification>, ChainError> {
		let subscription = self
			.current()
			.await
			.subscribe::<_, HeadNumber>(("newHeads",))
			.await
			.map_err(|e| classify("eth_subscribe", e))?;

		let (tx, rx) = mpsc::channel(self.header_buffer);
		let chain = self.name.clone();

		tokio::spawn(async move {
			let mut stream = subscription.into_stream();
			while let Some(head) = stream.next().await {
				let notification = BlockNotification {
					height: head.number.to::<u64>(),
				};
				if tx.send(notification).await.is_err() {
					tracing::debug!(chain = %chain, "Header receiver dropped, stopping subscription");
					return;
				}
			}
			tracing::warn!(chain = %chain, "Header subscription stream ended");
		});

		Ok(rx)
	}

	async fn reconnect(&self) -> Result<(), ChainError> {
		tracing::info!(chain = %self.name, url = %self.url, "Reconnecting");
		let provider = Self::build_provider(&self.url).await?;
		*self.provider.write().await = provider;
		Ok(())
	}
}
