//! Raw transaction codec for the transaction replayer.
//!
//! Rebuilds the legacy wire encoding of a transaction from the JSON-RPC
//! object a node returned for it. The result is the RLP list
//! `[nonce, gasPrice, gasLimit, to, value, data, v, r, s]`; the signature is
//! carried over untouched, so the receiving chain recovers the original
//! sender and nonce.

use alloy_primitives::{hex, Address, Bytes, U256};
use alloy_rlp::{BufMut, Decodable, Encodable, Header, EMPTY_STRING_CODE};
use replay_types::{without_0x_prefix, EncodedTx, RawTx};
use thiserror::Error;

/// Errors that can occur while encoding or decoding a transaction.
///
/// None of them are retryable: the same input always fails the same way.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
	/// A field required by the legacy format is absent.
	#[error("Missing field: {0}")]
	MissingField(&'static str),
	/// A field is not valid hex or does not fit its type.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidField {
		field: &'static str,
		message: String,
	},
	/// The transaction uses a typed envelope that has no legacy form.
	#[error("Unsupported transaction type: {0}")]
	UnsupportedType(String),
	/// The bytes are not a well-formed legacy transaction.
	#[error("Malformed encoding: {0}")]
	Malformed(String),
}

/// A legacy transaction with typed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
	pub nonce: U256,
	pub gas_price: U256,
	pub gas_limit: U256,
	/// Recipient; `None` creates a contract.
	pub to: Option<Address>,
	pub value: U256,
	pub input: Bytes,
	pub v: U256,
	pub r: U256,
	pub s: U256,
}

impl LegacyTx {
	fn to_length(&self) -> usize {
		match &self.to {
			Some(to) => to.length(),
			None => 1,
		}
	}

	fn payload_length(&self) -> usize {
		self.nonce.length()
			+ self.gas_price.length()
			+ self.gas_limit.length()
			+ self.to_length()
			+ self.value.length()
			+ self.input.length()
			+ self.v.length()
			+ self.r.length()
			+ self.s.length()
	}

	/// Wire bytes of this transaction.
	pub fn encoded(&self) -> EncodedTx {
		let mut out = Vec::with_capacity(self.length());
		self.encode(&mut out);
		EncodedTx(Bytes::from(out))
	}
}

impl Encodable for LegacyTx {
	fn encode(&self, out: &mut dyn BufMut) {
		Header {
			list: true,
			payload_length: self.payload_length(),
		}
		.encode(out);

		self.nonce.encode(out);
		self.gas_price.encode(out);
		self.gas_limit.encode(out);
		match &self.to {
			Some(to) => to.encode(out),
			None => out.put_u8(EMPTY_STRING_CODE),
		}
		self.value.encode(out);
		self.input.encode(out);
		self.v.encode(out);
		self.r.encode(out);
		self.s.encode(out);
	}

	fn length(&self) -> usize {
		let payload_length = self.payload_length();
		payload_length + alloy_rlp::length_of_length(payload_length)
	}
}

impl Decodable for LegacyTx {
	fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
		let header = Header::decode(buf)?;
		if !header.list {
			return Err(alloy_rlp::Error::UnexpectedString);
		}
		let started = buf.len();
		if started < header.payload_length {
			return Err(alloy_rlp::Error::InputTooShort);
		}

		let nonce = U256::decode(buf)?;
		let gas_price = U256::decode(buf)?;
		let gas_limit = U256::decode(buf)?;
		let to = if buf.first() == Some(&EMPTY_STRING_CODE) {
			*buf = &buf[1..];
			None
		} else {
			Some(Address::decode(buf)?)
		};
		let value = U256::decode(buf)?;
		let input = Bytes::decode(buf)?;
		let v = U256::decode(buf)?;
		let r = U256::decode(buf)?;
		let s = U256::decode(buf)?;

		let consumed = started - buf.len();
		if consumed != header.payload_length {
			return Err(alloy_rlp::Error::ListLengthMismatch {
				expected: header.payload_length,
				got: consumed,
			});
		}

		Ok(Self {
			nonce,
			gas_price,
			gas_limit,
			to,
			value,
			input,
			v,
			r,
			s,
		})
	}
}

impl TryFrom<&RawTx> for LegacyTx {
	type Error = CodecError;

	fn try_from(tx: &RawTx) -> Result<Self, Self::Error> {
		if let Some(tx_type) = tx.tx_type.as_deref() {
			if parse_quantity("type", tx_type)? != U256::ZERO {
				return Err(CodecError::UnsupportedType(tx_type.to_string()));
			}
		}

		Ok(Self {
			nonce: parse_quantity("nonce", required("nonce", &tx.nonce)?)?,
			gas_price: parse_quantity("gasPrice", required("gasPrice", &tx.gas_price)?)?,
			gas_limit: parse_quantity("gas", required("gas", &tx.gas)?)?,
			to: parse_recipient(tx.to.as_deref())?,
			value: parse_quantity("value", required("value", &tx.value)?)?,
			input: parse_data("input", required("input", &tx.input)?)?,
			v: parse_quantity("v", required("v", &tx.v)?)?,
			r: parse_quantity("r", required("r", &tx.r)?)?,
			s: parse_quantity("s", required("s", &tx.s)?)?,
		})
	}
}

/// Encodes a fetched transaction into its legacy wire form.
///
/// Deterministic: the same input always produces the same bytes.
pub fn encode(tx: &RawTx) -> Result<EncodedTx, CodecError> {
	LegacyTx::try_from(tx).map(|legacy| legacy.encoded())
}

/// Decodes legacy wire bytes back into typed fields.
pub fn decode(bytes: &[u8]) -> Result<LegacyTx, CodecError> {
	let mut buf = bytes;
	let tx = LegacyTx::decode(&mut buf).map_err(|e| CodecError::Malformed(e.to_string()))?;
	if !buf.is_empty() {
		return Err(CodecError::Malformed(format!(
			"{} trailing bytes after transaction",
			buf.len()
		)));
	}
	Ok(tx)
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, CodecError> {
	value.as_deref().ok_or(CodecError::MissingField(field))
}

/// Parses a base-16 quantity; the `0x` prefix is optional.
fn parse_quantity(field: &'static str, value: &str) -> Result<U256, CodecError> {
	let digits = without_0x_prefix(value.trim());
	if digits.is_empty() {
		return Err(CodecError::InvalidField {
			field,
			message: "empty quantity".to_string(),
		});
	}
	U256::from_str_radix(digits, 16).map_err(|e| CodecError::InvalidField {
		field,
		message: e.to_string(),
	})
}

fn parse_data(field: &'static str, value: &str) -> Result<Bytes, CodecError> {
	hex::decode(without_0x_prefix(value.trim()))
		.map(Bytes::from)
		.map_err(|e| CodecError::InvalidField {
			field,
			message: e.to_string(),
		})
}

/// An absent, empty or `0x` recipient means contract creation.
fn parse_recipient(value: Option<&str>) -> Result<Option<Address>, CodecError> {
	let Some(value) = value else {
		return Ok(None);
	};
	let bytes = parse_data("to", value)?;
	match bytes.len() {
		0 => Ok(None),
		20 => Ok(Some(Address::from_slice(&bytes))),
		n => Err(CodecError::InvalidField {
			field: "to",
			message: format!("expected 20 bytes, got {}", n),
		}),
	}
}
