//! # Audio Module
//!
//! Per-guild queue and playback coordination.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Management
//! - Ordered entries, loop flags and the equal-playback interleave
//! - Cancellable playlist imports and the "cancel last add" window
//! - Mix playlist continuation and related-track auto add
//!
//! ### [`player`] - Playback Manager
//! - State machine `Idle → Preparing → Playing ⇄ Paused`
//! - Track completion, failure skipping and disconnect on exhaustion
//! - Elapsed time tracking across pauses
//!
//! ### [`stream`] / [`voice`] - Transport
//! - Traits the player talks to, so the core runs without Discord
//! - Songbird adapters used in production
//!
//! Everything is keyed by plain `u64` ids; the bot layer converts from
//! serenity ids at the edge.

pub mod cancellation;
pub mod notify;
pub mod player;
pub mod queue;
pub mod state;
pub mod stream;
pub mod voice;
