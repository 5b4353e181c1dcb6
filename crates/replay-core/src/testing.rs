//! In-memory chain for engine tests.
//!
//! Nonces are a per-account step function over heights that must never
//! decrease; violating that panics, since no real chain can produce it.

use async_trait::async_trait;
use replay_chain::{ChainError, ChainReader};
use replay_types::{
	AccountState, Address, BlockNotification, EncodedTx, RawTx, SubmissionResult, SubmitError,
	TransactionHash, B256,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

pub(crate) fn address(n: u8) -> Address {
	Address::repeat_byte(n)
}

fn hash_of(height: u64) -> B256 {
	B256::left_padding_from(&height.to_be_bytes())
}

fn height_of(hash: B256) -> u64 {
	let mut bytes = [0u8; 8];
	bytes.copy_from_slice(&hash[24..]);
	u64::from_be_bytes(bytes)
}

/// A signed legacy transaction from `sender` with the given nonce.
pub(crate) fn signed_tx(sender: Address, nonce: u64) -> RawTx {
	RawTx {
		hash: Some(format!("0x{:02x}{:062x}", sender[0], nonce)),
		from: Some(sender.to_string()),
		nonce: Some(format!("0x{:x}", nonce)),
		gas_price: Some("0x3b9aca00".into()),
		gas: Some("0x5208".into()),
		to: Some(format!("{}", address(0xee))),
		value: Some("0x0".into()),
		input: Some("0x".into()),
		v: Some("0x1b".into()),
		r: Some(format!("0x{:x}", sender[0])),
		s: Some("0x1".into()),
		tx_type: Some("0x0".into()),
	}
}

/// Polls `condition` until it holds, panicking after five seconds.
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while !condition() {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("condition not reached in time");
}

#[derive(Default)]
struct FakeState {
	head: u64,
	/// Transient failures left before the head can be read.
	head_failures: usize,
	/// Per account: height from which a nonce holds.
	nonces: HashMap<Address, BTreeMap<u64, u64>>,
	unavailable_state: HashSet<u64>,
	blocks: HashMap<u64, Vec<RawTx>>,
	/// Transient failures left before a block can be fetched.
	block_failures: HashMap<u64, usize>,
	/// Reads left that report the block as not yet produced.
	lagging_blocks: HashMap<u64, usize>,
	malformed_blocks: HashSet<u64>,
	/// Once the block at the key is fetched, the head moves to the value.
	head_bumps: HashMap<u64, u64>,
	fetched: Vec<u64>,
	submit_failures: VecDeque<SubmitError>,
	submit_attempts: usize,
	submissions: Vec<EncodedTx>,
	sessions: VecDeque<Vec<u64>>,
	subscriptions: usize,
	/// Keeps the channel of an unscripted subscription open.
	idle_senders: Vec<mpsc::Sender<BlockNotification>>,
	reconnects: usize,
}

pub(crate) struct FakeChain {
	name: String,
	state: Mutex<FakeState>,
}

impl FakeChain {
	pub(crate) fn new(name: &str, head: u64) -> Self {
		Self {
			name: name.to_string(),
			state: Mutex::new(FakeState {
				head,
				..Default::default()
			}),
		}
	}

	fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
		let mut state = self.state.lock().unwrap();
		f(&mut *state)
	}

	/// From `height` on, `account` has `nonce`, until the next scripted change.
	pub(crate) fn set_nonce(&self, account: Address, height: u64, nonce: u64) {
		self.with_state(|state| {
			let table = state.nonces.entry(account).or_default();
			if let Some((h, previous)) = table.range(..height).next_back() {
				assert!(
					*previous <= nonce,
					"nonce {} at {} would drop below {} at {}",
					nonce,
					height,
					previous,
					h
				);
			}
			if let Some((h, next)) = table.range(height + 1..).next() {
				assert!(
					nonce <= *next,
					"nonce {} at {} would exceed {} at {}",
					nonce,
					height,
					next,
					h
				);
			}
			table.insert(height, nonce);
		});
	}

	/// Appends a transaction to the block at `height` and bumps the sender's nonce there.
	pub(crate) fn add_tx(&self, height: u64, sender: Address, nonce: u64) {
		self.add_raw_tx(height, signed_tx(sender, nonce));
		self.set_nonce(sender, height, nonce + 1);
	}

	/// Appends a transaction without touching the nonce table.
	pub(crate) fn add_raw_tx(&self, height: u64, tx: RawTx) {
		self.with_state(|state| state.blocks.entry(height).or_default().push(tx));
	}

	pub(crate) fn make_state_unavailable(&self, height: u64) {
		self.with_state(|state| state.unavailable_state.insert(height));
	}

	pub(crate) fn fail_block(&self, height: u64, times: usize) {
		self.with_state(|state| state.block_failures.insert(height, times));
	}

	/// Makes the next `times` head reads fail with a dropped connection.
	pub(crate) fn fail_head(&self, times: usize) {
		self.with_state(|state| state.head_failures = times);
	}

	/// Reports the block as not yet produced for the next `times` reads.
	pub(crate) fn lag_block(&self, height: u64, times: usize) {
		self.with_state(|state| state.lagging_blocks.insert(height, times));
	}

	pub(crate) fn make_block_malformed(&self, height: u64) {
		self.with_state(|state| state.malformed_blocks.insert(height));
	}

	pub(crate) fn bump_head_after(&self, height: u64, new_head: u64) {
		self.with_state(|state| state.head_bumps.insert(height, new_head));
	}

	pub(crate) fn fail_submissions(&self, errors: impl IntoIterator<Item = SubmitError>) {
		self.with_state(|state| state.submit_failures.extend(errors));
	}

	/// Scripts one subscription: its notifications, then a dropped stream.
	pub(crate) fn push_session(&self, heights: &[u64]) {
		self.with_state(|state| state.sessions.push_back(heights.to_vec()));
	}

	pub(crate) fn fetched(&self) -> Vec<u64> {
		self.with_state(|state| state.fetched.clone())
	}

	pub(crate) fn submissions(&self) -> Vec<EncodedTx> {
		self.with_state(|state| state.submissions.clone())
	}

	pub(crate) fn submit_attempts(&self) -> usize {
		self.with_state(|state| state.submit_attempts)
	}

	pub(crate) fn reconnects(&self) -> usize {
		self.with_state(|state| state.reconnects)
	}

	pub(crate) fn subscriptions(&self) -> usize {
		self.with_state(|state| state.subscriptions)
	}

	/// Nonces of the recorded submissions, in submission order.
	pub(crate) fn submitted_nonces(&self) -> Vec<u64> {
		self.submissions()
			.iter()
			.map(|tx| {
				replay_codec::decode(tx.as_bytes())
					.unwrap()
					.nonce
					.to::<u64>()
			})
			.collect()
	}
}

#[async_trait]
impl ChainReader for FakeChain {
	fn name(&self) -> &str {
		&self.name
	}

	async fn head_height(&self) -> Result<u64, ChainError> {
		self.with_state(|state| {
			if state.head_failures > 0 {
				state.head_failures -= 1;
				return Err(ChainError::Connection("socket reset".into()));
			}
			Ok(state.head)
		})
	}

	async fn block_hash(&self, height: u64) -> Result<Option<B256>, ChainError> {
		Ok(self.with_state(|state| (height <= state.head).then(|| hash_of(height))))
	}

	async fn account_state(
		&self,
		address: &Address,
		block_hash: B256,
	) -> Result<AccountState, ChainError> {
		let height = height_of(block_hash);
		self.with_state(|state| {
			if state.unavailable_state.contains(&height) {
				return Err(ChainError::Unavailable(format!("state pruned at {}", height)));
			}
			let nonce = state
				.nonces
				.get(address)
				.and_then(|table| table.range(..=height).next_back())
				.map(|(_, nonce)| *nonce)
				.unwrap_or(0);
			Ok(AccountState { nonce })
		})
	}

	async fn block_transactions(&self, height: u64) -> Result<Vec<RawTx>, ChainError> {
		self.with_state(|state| {
			if let Some(left) = state.block_failures.get_mut(&height) {
				if *left > 0 {
					*left -= 1;
					return Err(ChainError::Connection("connection reset".into()));
				}
			}
			if let Some(left) = state.lagging_blocks.get_mut(&height) {
				if *left > 0 {
					*left -= 1;
					return Err(ChainError::Unavailable(format!("block {} not indexed", height)));
				}
			}
			if height > state.head {
				return Err(ChainError::Unavailable(format!("block {} not produced", height)));
			}
			state.fetched.push(height);
			if let Some(new_head) = state.head_bumps.remove(&height) {
				state.head = state.head.max(new_head);
			}
			if state.malformed_blocks.contains(&height) {
				return Err(ChainError::Malformed(format!("garbage at {}", height)));
			}
			Ok(state.blocks.get(&height).cloned().unwrap_or_default())
		})
	}

	async fn submit_raw(&self, tx: &EncodedTx) -> SubmissionResult {
		self.with_state(|state| {
			state.submit_attempts += 1;
			if let Some(err) = state.submit_failures.pop_front() {
				return Err(err);
			}
			state.submissions.push(tx.clone());
			Ok(TransactionHash(hash_of(state.submissions.len() as u64)))
		})
	}

	async fn subscribe_headers(&self) -> Result<mpsc::Receiver<BlockNotification>, ChainError> {
		self.with_state(|state| {
			state.subscriptions += 1;
			match state.sessions.pop_front() {
				Some(heights) => {
					let (tx, rx) = mpsc::channel(heights.len().max(1));
					for height in heights {
						state.head = state.head.max(height);
						let _ = tx.try_send(BlockNotification { height });
					}
					Ok(rx)
				},
				None => {
					let (tx, rx) = mpsc::channel(1);
					state.idle_senders.push(tx);
					Ok(rx)
				},
			}
		})
	}

	async fn reconnect(&self) -> Result<(), ChainError> {
		self.with_state(|state| state.reconnects += 1);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_nonce_table_is_a_step_function() {
		let chain = FakeChain::new("source", 10);
		chain.set_nonce(address(1), 3, 1);
		chain.set_nonce(address(1), 7, 4);

		assert_eq!(chain.nonce_at(&address(1), 2).await.unwrap(), 0);
		assert_eq!(chain.nonce_at(&address(1), 3).await.unwrap(), 1);
		assert_eq!(chain.nonce_at(&address(1), 6).await.unwrap(), 1);
		assert_eq!(chain.nonce_at(&address(1), 10).await.unwrap(), 4);
		assert!(matches!(
			chain.nonce_at(&address(1), 11).await,
			Err(ChainError::Unavailable(_))
		));
	}

	#[test]
	#[should_panic(expected = "would drop below")]
	fn test_rejects_decreasing_nonce() {
		let chain = FakeChain::new("source", 10);
		chain.set_nonce(address(1), 3, 5);
		chain.set_nonce(address(1), 6, 2);
	}

	#[test]
	#[should_panic(expected = "would exceed")]
	fn test_rejects_nonce_above_later_step() {
		let chain = FakeChain::new("source", 10);
		chain.set_nonce(address(1), 6, 2);
		chain.set_nonce(address(1), 3, 5);
	}

	#[test]
	fn test_signed_tx_encodes() {
		let tx = signed_tx(address(1), 9);
		let decoded = replay_codec::decode(replay_codec::encode(&tx).unwrap().as_bytes()).unwrap();
		assert_eq!(decoded.nonce.to::<u64>(), 9);
		assert_eq!(tx.sender(), Some(address(1)));
	}
}
