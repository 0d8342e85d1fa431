//! ETag computation for daily tallies.
//!
//! Every committed tally write bumps its version, so the pair
//! (station_id, version) identifies one state of the resource.

use axum::http::{HeaderMap, header};
use sha2::{Digest, Sha256};
use turnout_core::tally::DailyTally;

/// Compute the quoted ETag for `tally`.
pub fn tally_etag(tally: &DailyTally) -> String {
  let mut hasher = Sha256::new();
  hasher.update(tally.station_id.as_bytes());
  hasher.update(tally.version.to_le_bytes());
  format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// The `If-Match` header, if present and readable.
pub fn if_match(headers: &HeaderMap) -> Option<&str> {
  headers.get(header::IF_MATCH).and_then(|v| v.to_str().ok())
}

/// Whether an `If-Match` value admits `current`. `*` matches anything; a
/// comma-separated list matches if any entry does.
pub fn matches(if_match: &str, current: &str) -> bool {
  let current = strip_etag(current);
  if_match.split(',').map(str::trim).any(|tag| tag == "*" || strip_etag(tag) == current)
}

/// Strip a weak prefix and surrounding double-quotes from an ETag value.
fn strip_etag(s: &str) -> &str {
  s.trim_start_matches("W/").trim_matches('"')
}
