//! Tracked account addresses.
//!
//! Addresses are compared case-insensitively: every input string is parsed
//! into a 20-byte [`Address`], so `0xFF..` and `0xff..` denote the same account.

use alloy_primitives::Address;
use std::str::FromStr;

/// Parses a hex account address, ignoring letter case and an optional `0x` prefix.
pub fn parse_address(value: &str) -> Result<Address, String> {
	let trimmed = value.trim();
	if trimmed.is_empty() {
		return Err("address is empty".to_string());
	}
	// Mixed-case input must not be treated as a checksum assertion.
	Address::from_str(&trimmed.to_ascii_lowercase())
		.map_err(|e| format!("invalid address '{}': {}", trimmed, e))
}

/// The fixed set of accounts whose transactions are replayed.
///
/// Insertion order is preserved (it is the order addresses were given on the
/// command line) and duplicates are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedAddresses {
	addresses: Vec<Address>,
}

impl TrackedAddresses {
	/// Builds the set from already-parsed addresses.
	pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
		addresses.into_iter().collect()
	}

	/// Parses every string, failing on the first invalid address.
	pub fn parse<S: AsRef<str>>(values: &[S]) -> Result<Self, String> {
		values
			.iter()
			.map(|v| parse_address(v.as_ref()))
			.collect::<Result<Vec<_>, _>>()
			.map(Self::new)
	}

	pub fn contains(&self, address: &Address) -> bool {
		self.addresses.contains(address)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Address> {
		self.addresses.iter()
	}

	pub fn len(&self) -> usize {
		self.addresses.len()
	}

	pub fn is_empty(&self) -> bool {
		self.addresses.is_empty()
	}

	/// Returns a copy without the given addresses.
	pub fn without(&self, dropped: &[Address]) -> Self {
		self.addresses
			.iter()
			.filter(|a| !dropped.contains(a))
			.copied()
			.collect()
	}
}

impl FromIterator<Address> for TrackedAddresses {
	fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
		let mut addresses = Vec::new();
		for address in iter {
			if !addresses.contains(&address) {
				addresses.push(address);
			}
		}
		Self { addresses }
	}
}

impl<'a> IntoIterator for &'a TrackedAddresses {
	type Item = &'a Address;
	type IntoIter = std::slice::Iter<'a, Address>;

	fn into_iter(self) -> Self::IntoIter {
		self.addresses.iter()
	}
}
