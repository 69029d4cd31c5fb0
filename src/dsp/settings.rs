//! # Delay Settings
//!
//! The engine reads its user-facing parameters once per block as a plain
//! [`DelaySettings`] value. Where those values come from is up to the host:
//! anything implementing [`DelayControls`] can drive the engine. The plugin
//! uses its `nih_plug` parameter set; other hosts can share an
//! [`AtomicDelayParams`] between a UI thread and the audio thread.
//!
//! ## Lock-Free Parameter Sharing
//!
//! Every parameter lives in its own atomic. A UI thread stores new values
//! while the audio thread loads them; neither ever waits for the other, and
//! each load observes either the old or the new value of that parameter,
//! never a half-written one. Floats are stored as their raw bit pattern in
//! an `AtomicU32`, since `f32::to_bits()` / `f32::from_bits()` are lossless.
//!
//! Two parameters changed in the same UI gesture may be picked up one block
//! apart. That is harmless for a delay, so `Ordering::Relaxed` is enough.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use nih_plug::prelude::Enum;
use serde::{Deserialize, Serialize};

/// Fixed attenuation applied to the input as it is written into the store.
pub const INPUT_GAIN: f32 = 0.8;

/// Largest feedback gain the engine will apply. Anything at or above 1.0
/// would make the repeats grow instead of decay.
pub const MAX_FEEDBACK_GAIN: f32 = 0.95;

/// How the delayed signal is combined with the dry signal.
#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MixPolicy {
    /// `dry * (1 - wet) + delayed * wet`. At 100% only the echo is heard.
    #[name = "Crossfade"]
    Crossfade,

    /// `dry + delayed * wet`. The dry signal always passes at full level and
    /// the echo is layered on top.
    #[name = "Additive"]
    Additive,
}

impl Default for MixPolicy {
    fn default() -> Self {
        MixPolicy::Crossfade
    }
}

impl MixPolicy {
    fn to_u8(self) -> u8 {
        match self {
            MixPolicy::Crossfade => 0,
            MixPolicy::Additive => 1,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => MixPolicy::Additive,
            _ => MixPolicy::Crossfade,
        }
    }

    /// Blend one dry sample with one delayed sample. `wet` is in `[0, 1]`.
    #[inline]
    pub fn mix(self, dry: f32, delayed: f32, wet: f32) -> f32 {
        match self {
            MixPolicy::Crossfade => dry * (1.0 - wet) + delayed * wet,
            MixPolicy::Additive => dry + delayed * wet,
        }
    }
}

/// A plain snapshot of every user-facing delay parameter.
///
/// This is also the persistence format: hosts that save and restore state
/// serialize this struct as an opaque blob.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelaySettings {
    /// Target delay length in milliseconds.
    pub delay_time_ms: f32,

    /// Share of delayed signal in the output, 0–100.
    pub wet_dry_mix_percent: f32,

    /// Whether the delayed signal is fed back into the store (repeating
    /// echoes) or heard once.
    pub feedback_enabled: bool,

    /// Level of each repeat relative to the one before it.
    pub feedback_gain: f32,

    pub mix_policy: MixPolicy,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            delay_time_ms: 500.0,
            wet_dry_mix_percent: 50.0,
            feedback_enabled: false,
            feedback_gain: 0.8,
            mix_policy: MixPolicy::Crossfade,
        }
    }
}

impl DelaySettings {
    /// Clamp every field into its valid range.
    ///
    /// Non-finite values fall back to the closest safe choice (no delay, dry
    /// only, no feedback) so a misconfigured host can never push NaN into the
    /// buffers or make the feedback loop diverge.
    pub fn sanitized(self) -> Self {
        Self {
            delay_time_ms: finite_or(self.delay_time_ms, 0.0).max(0.0),
            wet_dry_mix_percent: finite_or(self.wet_dry_mix_percent, 0.0).clamp(0.0, 100.0),
            feedback_enabled: self.feedback_enabled,
            feedback_gain: finite_or(self.feedback_gain, 0.0).clamp(0.0, MAX_FEEDBACK_GAIN),
            mix_policy: self.mix_policy,
        }
    }

    /// Wet proportion in `[0, 1]`.
    pub fn wet(&self) -> f32 {
        self.wet_dry_mix_percent / 100.0
    }

    /// The feedback gain actually applied this block: zero when feedback is
    /// switched off.
    pub fn effective_feedback_gain(&self) -> f32 {
        if self.feedback_enabled {
            self.feedback_gain
        } else {
            0.0
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// A source of delay settings, read by the audio thread once per block.
///
/// Implementations must not block or allocate.
pub trait DelayControls {
    fn settings(&self) -> DelaySettings;
}

impl DelayControls for DelaySettings {
    fn settings(&self) -> DelaySettings {
        *self
    }
}

/// Delay parameters shared between a control thread and the audio thread,
/// one atomic per parameter.
#[derive(Debug)]
pub struct AtomicDelayParams {
    delay_time_ms: AtomicU32,
    wet_dry_mix_percent: AtomicU32,
    feedback_enabled: AtomicBool,
    feedback_gain: AtomicU32,
    mix_policy: AtomicU8,
}

impl Default for AtomicDelayParams {
    fn default() -> Self {
        Self::new(DelaySettings::default())
    }
}

impl AtomicDelayParams {
    pub fn new(settings: DelaySettings) -> Self {
        Self {
            delay_time_ms: AtomicU32::new(settings.delay_time_ms.to_bits()),
            wet_dry_mix_percent: AtomicU32::new(settings.wet_dry_mix_percent.to_bits()),
            feedback_enabled: AtomicBool::new(settings.feedback_enabled),
            feedback_gain: AtomicU32::new(settings.feedback_gain.to_bits()),
            mix_policy: AtomicU8::new(settings.mix_policy.to_u8()),
        }
    }

    pub fn set_delay_time_ms(&self, value: f32) {
        self.delay_time_ms.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn set_wet_dry_mix_percent(&self, value: f32) {
        self.wet_dry_mix_percent.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn set_feedback_enabled(&self, value: bool) {
        self.feedback_enabled.store(value, Ordering::Relaxed);
    }

    pub fn set_feedback_gain(&self, value: f32) {
        self.feedback_gain.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn set_mix_policy(&self, value: MixPolicy) {
        self.mix_policy.store(value.to_u8(), Ordering::Relaxed);
    }

    pub fn delay_time_ms(&self) -> f32 {
        f32::from_bits(self.delay_time_ms.load(Ordering::Relaxed))
    }

    pub fn wet_dry_mix_percent(&self) -> f32 {
        f32::from_bits(self.wet_dry_mix_percent.load(Ordering::Relaxed))
    }

    pub fn feedback_enabled(&self) -> bool {
        self.feedback_enabled.load(Ordering::Relaxed)
    }

    pub fn feedback_gain(&self) -> f32 {
        f32::from_bits(self.feedback_gain.load(Ordering::Relaxed))
    }

    pub fn mix_policy(&self) -> MixPolicy {
        MixPolicy::from_u8(self.mix_policy.load(Ordering::Relaxed))
    }

    /// Current values as plain data, for saving.
    pub fn snapshot(&self) -> DelaySettings {
        DelaySettings {
            delay_time_ms: self.delay_time_ms(),
            wet_dry_mix_percent: self.wet_dry_mix_percent(),
            feedback_enabled: self.feedback_enabled(),
            feedback_gain: self.feedback_gain(),
            mix_policy: self.mix_policy(),
        }
    }

    /// Overwrite every parameter from a saved snapshot.
    pub fn restore(&self, settings: &DelaySettings) {
        self.set_delay_time_ms(settings.delay_time_ms);
        self.set_wet_dry_mix_percent(settings.wet_dry_mix_percent);
        self.set_feedback_enabled(settings.feedback_enabled);
        self.set_feedback_gain(settings.feedback_gain);
        self.set_mix_policy(settings.mix_policy);
    }
}

impl DelayControls for AtomicDelayParams {
    fn settings(&self) -> DelaySettings {
        self.snapshot()
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sanitize_clamps_out_of_range() {
        let settings = DelaySettings {
            delay_time_ms: -20.0,
            wet_dry_mix_percent: 140.0,
            feedback_enabled: true,
            feedback_gain: 1.5,
            mix_policy: MixPolicy::Additive,
        }
        .sanitized();

        assert_eq!(settings.delay_time_ms, 0.0);
        assert_eq!(settings.wet_dry_mix_percent, 100.0);
        assert_eq!(settings.feedback_gain, MAX_FEEDBACK_GAIN);
        assert!(settings.feedback_gain < 1.0);
        assert_eq!(settings.mix_policy, MixPolicy::Additive);
    }

    #[test]
    fn test_sanitize_replaces_non_finite() {
        let settings = DelaySettings {
            delay_time_ms: f32::NAN,
            wet_dry_mix_percent: f32::INFINITY,
            feedback_enabled: true,
            feedback_gain: f32::NAN,
            mix_policy: MixPolicy::Crossfade,
        }
        .sanitized();

        assert_eq!(settings.delay_time_ms, 0.0);
        assert_eq!(settings.wet_dry_mix_percent, 0.0);
        assert_eq!(settings.feedback_gain, 0.0);
    }

    #[test]
    fn test_effective_feedback_gain() {
        let mut settings = DelaySettings::default();
        settings.feedback_gain = 0.6;
        assert_eq!(settings.effective_feedback_gain(), 0.0);
        settings.feedback_enabled = true;
        assert_eq!(settings.effective_feedback_gain(), 0.6);
    }

    #[test]
    fn test_mix_policies() {
        assert!((MixPolicy::Crossfade.mix(1.0, 0.5, 0.0) - 1.0).abs() < 1e-6);
        assert!((MixPolicy::Crossfade.mix(1.0, 0.5, 1.0) - 0.5).abs() < 1e-6);
        assert!((MixPolicy::Crossfade.mix(1.0, 0.5, 0.5) - 0.75).abs() < 1e-6);
        assert!((MixPolicy::Additive.mix(1.0, 0.5, 1.0) - 1.5).abs() < 1e-6);
        assert!((MixPolicy::Additive.mix(1.0, 0.5, 0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_atomic_params_snapshot_and_restore() {
        let params = AtomicDelayParams::default();
        assert_eq!(params.snapshot(), DelaySettings::default());

        let saved = DelaySettings {
            delay_time_ms: 250.5,
            wet_dry_mix_percent: 33.0,
            feedback_enabled: true,
            feedback_gain: 0.42,
            mix_policy: MixPolicy::Additive,
        };
        params.restore(&saved);
        assert_eq!(params.snapshot(), saved);
        assert_eq!(params.settings(), saved);
    }

    #[test]
    fn test_settings_persist_as_json() {
        let saved = DelaySettings {
            delay_time_ms: 120.0,
            wet_dry_mix_percent: 75.0,
            feedback_enabled: true,
            feedback_gain: 0.5,
            mix_policy: MixPolicy::Additive,
        };
        let blob = serde_json::to_string(&saved).unwrap();
        let restored: DelaySettings = serde_json::from_str(&blob).unwrap();
        assert_eq!(restored, saved);
    }

    /// A control thread hammering the parameters must never produce a value
    /// the audio side didn't see written: every load is either an old or a
    /// new value, never a torn mix of the two.
    #[test]
    fn test_concurrent_updates_never_tear() {
        let params = Arc::new(AtomicDelayParams::default());
        let writer_params = Arc::clone(&params);

        let writer = thread::spawn(move || {
            for i in 0..20_000 {
                let (time, mix) = if i % 2 == 0 { (125.0, 10.0) } else { (875.0, 90.0) };
                writer_params.set_delay_time_ms(time);
                writer_params.set_wet_dry_mix_percent(mix);
                writer_params.set_feedback_enabled(i % 3 == 0);
            }
        });

        for _ in 0..20_000 {
            let settings = params.settings();
            assert!([500.0, 125.0, 875.0].contains(&settings.delay_time_ms));
            assert!([50.0, 10.0, 90.0].contains(&settings.wet_dry_mix_percent));
        }

        writer.join().unwrap();
    }
}
