//! # Circular Delay — An AU/VST3/CLAP Delay Plugin
//!
//! A block-based echo built around a multi-channel ring buffer, packaged with
//! [nih-plug](https://github.com/robbert-vdh/nih-plug). Outputs Audio Unit
//! (AUv2), VST3, and CLAP formats from a single codebase.
//!
//! The DSP in [`dsp`] knows nothing about plugins: it is a
//! `prepare` / `process_block` engine any host adapter can drive. This file
//! is the nih-plug adapter.
//!
//! ## Signal Flow
//!
//! ```text
//! Input ──┬────────────────────────────────────── × (1 - mix) ──────┐
//!         │                                                         │
//!         │            ┌──────── FEEDBACK LOOP ────────┐            │
//!         │            │                               │            │
//!         └─► × 0.8 ─►(+)─► [Ring Buffer / Store] ─────┤            │
//!                      ▲     (stores & retrieves       │            │
//!                      │      past blocks after N ms)  │            │
//!                      │                               ▼            │
//!                      └──────── × feedback ◄─── delayed block      │
//!                                                      │            │
//!                                                      └── × mix ─►(+)──► Output
//! ```
//!
//! In Additive mix mode the dry path skips the `× (1 - mix)` stage.

pub mod dsp;
mod params;

use std::num::NonZeroU32;
use std::sync::Arc;

use dsp::{DelayControls, DelayEngine};
use nih_plug::prelude::*;
use params::DelayPluginParams;

/// The main plugin struct.
///
/// Parameters (`DelayPluginParams`) are shared with the host via `Arc` and
/// can be written from any thread. The engine, with its ring buffer, is
/// owned exclusively by the audio thread and only touched in `initialize()`,
/// `reset()` and `process()`, which the host never runs concurrently.
struct CircularDelay {
    params: Arc<DelayPluginParams>,

    /// Ring buffers, cursor and feedback state for every channel. Sized in
    /// `initialize()` once the sample rate and channel count are known.
    engine: DelayEngine,
}

impl Default for CircularDelay {
    fn default() -> Self {
        Self {
            params: Arc::new(DelayPluginParams::default()),
            engine: DelayEngine::new(),
        }
    }
}

impl Plugin for CircularDelay {
    const NAME: &'static str = "Circular Delay";
    const VENDOR: &'static str = "Circular Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo first since most DAW tracks are stereo; mono as a fallback.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // Settings are read once per block, so there is nothing to gain from
    // having the host split blocks at automation points.
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Called when the plugin is first loaded, or when the sample rate or
    /// channel layout changes. This is the only place the ring buffers are
    /// allocated; `process()` never allocates.
    ///
    /// Returning `false` tells the host the plugin can't run with this
    /// configuration.
    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        let num_channels = audio_io_layout
            .main_input_channels
            .map(|c| c.get() as usize)
            .unwrap_or(2);

        match self.engine.prepare(buffer_config.sample_rate, num_channels) {
            Ok(()) => {
                nih_log!(
                    "delay store ready: {} channel(s), {} samples at {} Hz",
                    num_channels,
                    self.engine.capacity(),
                    buffer_config.sample_rate
                );
                true
            }
            Err(err) => {
                nih_error!("could not prepare the delay engine: {err}");
                false
            }
        }
    }

    /// Called when playback stops or the plugin is bypassed. Clears the
    /// ring buffers so stale echoes don't bleed into the next playback.
    fn reset(&mut self) {
        self.engine.clear();
    }

    /// Runs once per audio block on the real-time thread.
    ///
    /// The parameters are read once into a plain snapshot, the engine
    /// processes every channel in place, and the host is told how long the
    /// echo tail lasts so it keeps calling us after the input goes silent.
    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let settings = self.params.settings();

        self.engine.process_in_place(buffer.as_slice(), &settings);

        ProcessStatus::Tail(self.engine.tail_samples(&settings))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Plugin format trait implementations
// ─────────────────────────────────────────────────────────────────────

impl ClapPlugin for CircularDelay {
    const CLAP_ID: &'static str = "com.circular-audio.circular-delay";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A ring-buffer delay with switchable feedback and mix modes");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Mono,
        ClapFeature::Delay,
    ];
}

impl Vst3Plugin for CircularDelay {
    // `*b"..."` turns a 16-character ASCII literal into the `[u8; 16]` class ID.
    const VST3_CLASS_ID: [u8; 16] = *b"CircularDelay001";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Delay];
}

// ─────────────────────────────────────────────────────────────────────
// Export macros
// ─────────────────────────────────────────────────────────────────────
//
// nih_export_clap! exports the `clap_entry` symbol for CLAP hosts.
// nih_export_vst3! exports `GetPluginFactory` for VST3 hosts.
// clap_wrapper re-exports the CLAP entry point as AUv2 so Logic Pro
// (Audio Units only) can load it.

nih_export_clap!(CircularDelay);
nih_export_vst3!(CircularDelay);

clap_wrapper::export_auv2!();
