//! Hex string helpers shared by the codec, the chain connections and log output.

/// Shortens a hex identifier for log lines.
///
/// Keeps the first 10 characters (`0x` plus eight digits) followed by "..".
/// Identifiers come from the node verbatim, so this counts characters rather
/// than bytes.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(10) {
		Some((end, _)) => format!("{}..", &id[..end]),
		None => id.to_string(),
	}
}

/// Removes "0x" or "0X" prefix from a hex string if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}
