//! Time-derived identifier generation for sessions and tasks.
//!
//! Uniqueness within a process is guaranteed by an atomic counter; the
//! timestamp and pid components keep ids distinct across restarts. Callers
//! that supply their own ids are responsible for uniqueness (the session
//! store documents last-write-wins on collision).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Generate a unique, loosely time-ordered identifier.
pub fn generate_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    let pid = std::process::id();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mixed = timestamp ^ (pid as u128 * 6_364_136_223_846_793_005) ^ ((seq as u128) << 32);

    format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        (mixed >> 96) as u32,
        (mixed >> 80) as u16,
        (mixed >> 64) as u16 & 0x0FFF,
        ((mixed >> 48) as u16 & 0x3FFF) | 0x8000,
        mixed as u64 & 0xFFFF_FFFF_FFFF,
    )
}
