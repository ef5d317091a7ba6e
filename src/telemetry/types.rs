//! Shared telemetry helpers: timestamps and trace/span id generation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Current time as milliseconds since Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

fn derive_id(seed: &str, bytes: usize) -> String {
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed.as_bytes());
    hasher.update(&seq.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(&now_nanos().to_le_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..bytes])
}

/// 32 hex character trace id seeded by the request id.
pub fn new_trace_id(request_id: &str) -> String {
    derive_id(request_id, 16)
}

/// 16 hex character span id.
pub fn new_span_id(trace_id: &str) -> String {
    derive_id(trace_id, 8)
}
