//! Playback activity metering.
//!
//! The meter watches the *outbound* (assistant playback) signal and derives a
//! coarse turn-taking indicator for the UI. It is deliberately UI-only: the
//! conversational engine has its own server-side voice activity detection,
//! this one just decides which of three states the orb should show.

pub mod energy;

pub use energy::EnergyMeter;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Coarse turn-taking indicator exposed to the presentation layer.
///
/// Ephemeral — recomputed continuously, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// No assistant audio playing and no user speech detected.
    #[default]
    Idle,
    /// Waiting on the user (or user speech in flight).
    Listening,
    /// Assistant audio is audibly playing.
    Speaking,
}

/// Tuning for the energy meter.
#[derive(Debug, Clone)]
pub struct MeterConfig {
    /// Sampling ticks per second. Default: 12.
    pub tick_hz: u32,
    /// Time-domain window length in samples per tick. Default: 1024.
    pub window_len: usize,
    /// Normalised RMS amplitude above which playback counts as audible
    /// speech. Default: 0.022 (empirical, just above codec noise floor).
    pub energy_threshold: f32,
    /// How long the speaking state is held after the last energetic window
    /// (hysteresis across pauses between words). Default: 500 ms.
    pub speak_decay: Duration,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            tick_hz: 12,
            window_len: 1024,
            energy_threshold: 0.022,
            speak_decay: Duration::from_millis(500),
        }
    }
}

/// Read access to the live outbound audio signal.
///
/// Implementations wrap whatever the host plays assistant audio through
/// (an analyser node, a rodio sink probe, ...). When the host has no tap to
/// offer, the session simply runs without a meter and the mode degrades to
/// idle rather than failing.
pub trait PlaybackTap: Send + 'static {
    /// Fill `buf` with the most recent time-domain samples, newest last.
    /// Returns the number of samples written; zero means no data yet.
    fn read_window(&mut self, buf: &mut [f32]) -> usize;

    /// Whether the output sink is actively playing.
    fn is_playing(&self) -> bool;
}
