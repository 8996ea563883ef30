//! Retry delay helper: exponential backoff with jitter, driven off the
//! coordinator's `retryDelayMs` as a base.
//!
//! Not invoked by the coordinator itself — scheduling the retry is the
//! driver's responsibility. This lives under `sync` because it is
//! exercised by the driver against the coordinator's `retry_delay_ms`,
//! not because the coordinator calls it.

use rand::Rng;

/// `base_ms * 2^attempt`, capped at `max_ms`, plus up to 20% jitter.
pub fn next_delay_ms(base_ms: u64, attempt: u32, max_ms: u64) -> u64 {
	let exponential = base_ms.saturating_mul(1u64 << attempt.min(20));
	let capped = exponential.min(max_ms);
	let jitter_span = capped / 5;
	if jitter_span == 0 {
		return capped;
	}
	capped + rand::thread_rng().gen_range(0..=jitter_span)
}


// vim: ts=4
