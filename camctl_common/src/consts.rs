//! System-wide constants for the camctl workspace.
//!
//! Single source of truth for queue sizes, timer granularity and the
//! default remote endpoint.

use static_assertions::const_assert;

/// Capacity of every actor mailbox.
pub const MAILBOX_CAPACITY: usize = 100;

/// Capacity of the per-machine deferred event queue.
pub const DEFERRED_CAPACITY: usize = 100;

/// Capacity of the transport's outbound frame queue.
pub const OUTBOUND_CAPACITY: usize = 1000;

/// Shortest delay the broker timer will honour, in milliseconds.
pub const MIN_DELAY_MS: u64 = 50;

/// Default TCP port of the remote control server.
pub const DEFAULT_PORT: u16 = 60099;

/// Upper bound on a single frame body (1 MiB).
pub const MAX_FRAME_LEN: u32 = 1 << 20;

/// Size of the big-endian length prefix in front of every frame.
pub const FRAME_HEADER_LEN: usize = 4;

/// JSON key carrying the event discriminant.
pub const EVENT_ID_KEY: &str = "event_id";

const_assert!(MAILBOX_CAPACITY > 0);
const_assert!(DEFERRED_CAPACITY > 0);
const_assert!(OUTBOUND_CAPACITY >= MAILBOX_CAPACITY);
const_assert!(MIN_DELAY_MS > 0);
const_assert!(FRAME_HEADER_LEN == core::mem::size_of::<u32>());
