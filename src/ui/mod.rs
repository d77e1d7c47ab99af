//! Presentación en Discord: embeds y botones.

pub mod buttons;
pub mod embeds;
