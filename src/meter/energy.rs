//! Energy-based mode derivation using an RMS threshold + decay window.
//!
//! ## Algorithm (per tick)
//!
//! 1. Compute RMS of the sampled window.
//! 2. Sink playing and RMS above `energy_threshold` → `Speaking`, stamp the
//!    energetic-sample time.
//! 3. Sink playing, quiet, but within `speak_decay` of the last energetic
//!    sample → hold whatever mode is current (prevents flicker during pauses
//!    between words).
//! 4. Sink playing and quiet past the decay window → `Listening`.
//! 5. Sink not playing → `Idle`.
//!
//! The meter itself is clock-injectable and pure; the session feeds it from
//! a timer task and publishes only actual changes.

use std::time::Instant;

use super::{MeterConfig, Mode};

/// Hysteresis state machine turning playback energy into a [`Mode`].
#[derive(Debug)]
pub struct EnergyMeter {
    threshold: f32,
    speak_decay: std::time::Duration,
    /// When the last above-threshold window was observed.
    last_energetic_at: Option<Instant>,
}

impl EnergyMeter {
    pub fn new(config: &MeterConfig) -> Self {
        Self {
            threshold: config.energy_threshold,
            speak_decay: config.speak_decay,
            last_energetic_at: None,
        }
    }

    /// Evaluate one sampled window.
    ///
    /// Returns the mode the UI should settle to, or `None` when the decision
    /// is "hold whatever is current" (quiet gap inside the decay window).
    /// Never blocks, never fails.
    pub fn update(&mut self, window: &[f32], sink_playing: bool, now: Instant) -> Option<Mode> {
        if !sink_playing {
            return Some(Mode::Idle);
        }

        let energy = Self::rms(window);
        if energy > self.threshold {
            self.last_energetic_at = Some(now);
            return Some(Mode::Speaking);
        }

        if let Some(last) = self.last_energetic_at {
            if now.duration_since(last) < self.speak_decay {
                // Quiet gap between words — hold the current mode.
                return None;
            }
        }

        Some(Mode::Listening)
    }

    /// Clear hysteresis state (between sessions).
    pub fn reset(&mut self) {
        self.last_energetic_at = None;
    }

    /// Root-mean-square of a sample window.
    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}
