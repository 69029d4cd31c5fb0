//! # Plugin Parameters
//!
//! Parameters are the knobs and switches the user sees in the DAW. Each
//! parameter has:
//!
//! - A **unique string ID** (`#[id = "..."]`) that the host uses to
//!   save and recall presets. Once published, never change these IDs
//!   or existing presets will break.
//! - A **human-readable name** shown in the DAW's UI.
//! - A **range** (min, max, and optional skew).
//! - A **default value**.
//!
//! Every `nih_plug` parameter stores its value in an atomic, so the host or
//! the generic editor can change it from any thread while the audio thread
//! reads it, with no locks involved. The audio thread reads them once per
//! block through [`DelayControls`], which hands the engine a plain
//! [`DelaySettings`] snapshot.
//!
//! ## No Smoothing Here
//!
//! The engine ramps the feedback gain itself and changes the delay time in
//! whole-sample steps at block boundaries, so these parameters carry no
//! smoothers. Reading `.value()` gives the latest value directly.

use nih_plug::prelude::*;

use crate::dsp::settings::{DelayControls, DelaySettings, MixPolicy, MAX_FEEDBACK_GAIN};

/// All user-facing parameters for the Circular Delay plugin.
///
/// The `#[derive(Params)]` macro automatically generates the code that
/// registers these parameters with the host DAW and handles serialization
/// for presets.
#[derive(Params)]
pub struct DelayPluginParams {
    /// **Delay Time** — how long before you hear the echo.
    ///
    /// Range: 0ms to 2000ms. 0ms puts the echo on top of the dry signal.
    /// Default: 500ms.
    ///
    /// The skewed range gives the first few hundred milliseconds, where
    /// small changes are most audible, more knob travel.
    #[id = "delay"]
    pub delay_time: FloatParam,

    /// **Dry/Wet** — percentage of delayed signal in the output.
    ///
    /// - 0% = dry only (no delay audible)
    /// - 100% = in Crossfade mode, the echo only; in Additive mode, the
    ///   full dry signal plus the echo at full level
    #[id = "drywet"]
    pub wet_dry_mix: FloatParam,

    /// **Feedback On/Off** — whether the echo repeats.
    ///
    /// Off gives a single echo. On sends the delayed signal back into the
    /// delay line so each repeat produces another, quieter one.
    #[id = "fbon"]
    pub feedback_enabled: BoolParam,

    /// **Feedback Amount** — level of each repeat relative to the previous
    /// one, while feedback is on.
    ///
    /// Capped at 95%. At 100% the repeats would never decay; above that
    /// they would grow with every pass.
    #[id = "fdbk"]
    pub feedback_amount: FloatParam,

    /// **Mix Mode** — how the echo is combined with the dry signal.
    #[id = "mixmode"]
    pub mix_mode: EnumParam<MixPolicy>,
}

impl Default for DelayPluginParams {
    fn default() -> Self {
        let defaults = DelaySettings::default();

        Self {
            delay_time: FloatParam::new(
                "Delay Time",
                defaults.delay_time_ms,
                FloatRange::Skewed {
                    min: 0.0,
                    max: 2000.0,
                    // Negative skew = more resolution at the low end.
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_unit(" ms")
            // The engine works in whole samples anyway; 1ms steps match the
            // original control surface.
            .with_step_size(1.0),

            wet_dry_mix: FloatParam::new(
                "Dry/Wet",
                defaults.wet_dry_mix_percent,
                FloatRange::Linear {
                    min: 0.0,
                    max: 100.0,
                },
            )
            .with_unit("%")
            .with_step_size(1.0),

            feedback_enabled: BoolParam::new("Feedback", defaults.feedback_enabled),

            feedback_amount: FloatParam::new(
                "Feedback Amount",
                defaults.feedback_gain,
                FloatRange::Linear {
                    min: 0.0,
                    max: MAX_FEEDBACK_GAIN, // Capped below 1.0 for stability
                },
            )
            .with_unit("%")
            // Display as percentage: 0.80 → "80.0%"
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            mix_mode: EnumParam::new("Mix Mode", defaults.mix_policy),
        }
    }
}

impl DelayControls for DelayPluginParams {
    fn settings(&self) -> DelaySettings {
        DelaySettings {
            delay_time_ms: self.delay_time.value(),
            wet_dry_mix_percent: self.wet_dry_mix.value(),
            feedback_enabled: self.feedback_enabled.value(),
            feedback_gain: self.feedback_amount.value(),
            mix_policy: self.mix_mode.value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_defaults() {
        let params = DelayPluginParams::default();
        assert_eq!(params.settings(), DelaySettings::default());
    }

    #[test]
    fn test_default_settings_are_already_in_range() {
        let settings = DelayPluginParams::default().settings();
        assert_eq!(settings.sanitized(), settings);
    }
}
