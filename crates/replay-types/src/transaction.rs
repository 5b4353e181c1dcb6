//! Transaction types in their fetched and encoded forms.
//!
//! A [`RawTx`] is the transaction object exactly as a JSON-RPC node returns
//! it from `eth_getBlockByNumber(.., true)`. Numeric fields stay as the hex
//! strings received so that decoding problems surface in the codec, where
//! they skip a single transaction instead of a whole block.

use crate::address::parse_address;
use alloy_primitives::{hex, Address, Bytes};
use serde::{Deserialize, Serialize};

/// A source-chain transaction as returned by the node.
///
/// Every field is optional at this level; the codec decides which ones are
/// required for a legacy encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTx {
	/// Transaction hash, used for logging only.
	pub hash: Option<String>,
	/// Sender address reported by the node.
	pub from: Option<String>,
	pub nonce: Option<String>,
	pub gas_price: Option<String>,
	/// Gas limit.
	pub gas: Option<String>,
	/// Recipient; `None` for contract creation.
	pub to: Option<String>,
	pub value: Option<String>,
	/// Call data.
	pub input: Option<String>,
	pub v: Option<String>,
	pub r: Option<String>,
	pub s: Option<String>,
	/// EIP-2718 envelope type, absent on nodes that only serve legacy transactions.
	#[serde(rename = "type")]
	pub tx_type: Option<String>,
}

impl RawTx {
	/// Parsed sender address, if the node reported a well-formed one.
	pub fn sender(&self) -> Option<Address> {
		self.from.as_deref().and_then(|from| parse_address(from).ok())
	}

	/// Hash for log lines, or `"<unknown>"`.
	pub fn display_hash(&self) -> &str {
		self.hash.as_deref().unwrap_or("<unknown>")
	}

	/// Nonce for log lines, parsed when possible.
	pub fn display_nonce(&self) -> Option<u64> {
		let nonce = self.nonce.as_deref()?;
		let digits = crate::without_0x_prefix(nonce);
		u64::from_str_radix(digits, 16).ok()
	}
}

/// Byte-exact wire encoding of a transaction, ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedTx(pub Bytes);

impl EncodedTx {
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// `0x`-prefixed lowercase hex, the form sent over the wire.
	pub fn to_hex(&self) -> String {
		hex::encode_prefixed(&self.0)
	}
}

impl std::fmt::Display for EncodedTx {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.to_hex())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_raw_tx_from_rpc_json() {
		let json = serde_json::json!({
			"hash": "0xabc",
			"from": "0x33A5E905FB83FCFB62B0DD1595DFBC06792E054E",
			"nonce": "0x5",
			"gasPrice": "0x1",
			"gas": "0x5208",
			"to": null,
			"value": "0x0",
			"input": "0x",
			"v": "0x1b",
			"r": "0x1",
			"s": "0x1",
			"blockNumber": "0x10",
			"transactionIndex": "0x0"
		});

		let tx: RawTx = serde_json::from_value(json).unwrap();
		assert_eq!(tx.gas_price.as_deref(), Some("0x1"));
		assert_eq!(tx.to, None);
		assert_eq!(tx.tx_type, None);
		assert_eq!(tx.display_nonce(), Some(5));
		assert_eq!(
			tx.sender(),
			Some(parse_address("0x33a5e905fb83fcfb62b0dd1595dfbc06792e054e").unwrap())
		);
	}

	#[test]
	fn test_missing_sender() {
		let tx = RawTx::default();
		assert_eq!(tx.sender(), None);
		assert_eq!(tx.display_hash(), "<unknown>");
	}

	#[test]
	fn test_encoded_tx_hex() {
		let encoded = EncodedTx(Bytes::from(vec![0xcb, 0x05, 0x01]));
		assert_eq!(encoded.to_hex(), "0xcb0501");
		assert_eq!(encoded.len(), 3);
	}
}
