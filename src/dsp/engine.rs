//! # Delay Engine
//!
//! Turns a block of live audio into a block of delayed-and-mixed audio using
//! a [`DelayStore`]. For every span of samples, per channel:
//!
//! 1. **Fill**: write the live input into the store at the write cursor,
//!    attenuated by [`INPUT_GAIN`].
//! 2. **Map** the delay time to a whole number of samples:
//!    `floor(sample_rate * delay_ms / 1000)`, clamped below the capacity.
//! 3. **Locate** the read cursor `delay_samples` behind the write cursor,
//!    using the cursor from *before* this span is advanced.
//! 4. **Read** the delayed samples back.
//! 5. **Mix** delayed and dry according to the [`MixPolicy`].
//! 6. **Feed back** (if enabled) the delayed signal into the store on top of
//!    the fresh input, so it comes around again one delay later, quieter.
//! 7. **Advance** the write cursor.
//!
//! ## Sub-Block Spans
//!
//! A host block is processed as consecutive spans. A span never reaches
//! further than `capacity - delay_samples` ahead, so a read can't land on a
//! slot this same call is about to overwrite, and with feedback running it
//! is never longer than the delay itself, so an echo shorter than the host
//! block still gets recirculated sample-exactly. This also makes a host block
//! larger than the whole store legal.
//!
//! ## Feedback Stability
//!
//! Each trip around the loop multiplies the signal by the feedback gain `g`.
//! After `n` repeats the level is `INPUT_GAIN * g^(n-1)`, which only decays
//! for `g < 1`. Settings are clamped to
//! [`MAX_FEEDBACK_GAIN`](super::settings::MAX_FEEDBACK_GAIN) before use.

use thiserror::Error;

use super::delay_store::DelayStore;
use super::settings::{DelaySettings, MixPolicy, INPUT_GAIN};

/// Store length the engine allocates in [`DelayEngine::prepare`].
///
/// The longest delay the plugin offers is 2000ms; the extra 100ms keeps the
/// top of the range away from the capacity clamp.
pub const MAX_DELAY_SECONDS: f64 = 2.1;

/// Longest span processed in one go. Bounds the scratch buffers.
const SCRATCH_LEN: usize = 4096;

/// Reasons a processing session can't be set up.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum PrepareError {
    #[error("sample rate must be a positive, finite number of Hz, got {0}")]
    InvalidSampleRate(f32),
    #[error("at least one audio channel is required")]
    NoChannels,
    #[error("delay store capacity must be at least one sample")]
    ZeroCapacity,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EngineState {
    Uninitialized,
    Ready { sample_rate: f32 },
}

/// Convert a delay time to a whole number of samples for a store of
/// `capacity` samples.
///
/// ```text
/// delay_samples = floor(sample_rate * delay_ms / 1000)
/// ```
///
/// At 44100 Hz, 500ms is exactly 22050 samples. The product is formed in
/// `f64` so such exact values don't round down by one. Delays the store
/// can't hold are clamped to `capacity - 1`; negative or NaN times map to 0.
pub fn delay_time_to_samples(delay_time_ms: f32, sample_rate: f32, capacity: usize) -> usize {
    let samples = (f64::from(sample_rate) * f64::from(delay_time_ms) / 1000.0).floor();
    if samples.is_nan() || samples <= 0.0 {
        return 0;
    }
    (samples as usize).min(capacity.saturating_sub(1))
}

/// Everything the per-span work needs, resolved once per block.
#[derive(Debug, Clone, Copy)]
struct BlockPlan {
    delay_samples: usize,
    wet: f32,
    policy: MixPolicy,
    feedback_gain: f32,
}

/// The delay processor: a multi-channel ring buffer plus the write, read,
/// mix and feedback steps that run once per audio block.
///
/// Nothing here depends on a plugin framework. A host calls
/// [`prepare`](Self::prepare) during setup and then
/// [`process_block`](Self::process_block) (or
/// [`process_in_place`](Self::process_in_place)) from its audio callback.
#[derive(Debug)]
pub struct DelayEngine {
    state: EngineState,
    store: DelayStore,

    /// Copy of the dry input for in-place processing, where the input is
    /// overwritten by the output.
    dry: Vec<f32>,

    /// Samples read back from the store for the current span.
    delayed: Vec<f32>,

    /// Feedback gain applied at the end of the previous span. The next span
    /// ramps from here to the new target so toggling feedback doesn't click.
    feedback_gain: f32,
}

impl Default for DelayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DelayEngine {
    /// Create an engine in the uninitialized state. Nothing is allocated
    /// until [`prepare`](Self::prepare).
    pub fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
            store: DelayStore::new(),
            dry: Vec::new(),
            delayed: Vec::new(),
            feedback_gain: 0.0,
        }
    }

    /// Size the store for [`MAX_DELAY_SECONDS`] of audio at `sample_rate`
    /// and make the engine ready to process.
    ///
    /// Allocates. Call it from session setup only, and again whenever the
    /// sample rate or channel count changes.
    pub fn prepare(&mut self, sample_rate: f32, channel_count: usize) -> Result<(), PrepareError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(PrepareError::InvalidSampleRate(sample_rate));
        }
        let capacity = (MAX_DELAY_SECONDS * f64::from(sample_rate)).ceil() as usize;
        self.prepare_with_capacity(sample_rate, channel_count, capacity)
    }

    /// Like [`prepare`](Self::prepare), with an explicit store length in
    /// samples.
    pub fn prepare_with_capacity(
        &mut self,
        sample_rate: f32,
        channel_count: usize,
        capacity: usize,
    ) -> Result<(), PrepareError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(PrepareError::InvalidSampleRate(sample_rate));
        }
        if channel_count == 0 {
            return Err(PrepareError::NoChannels);
        }
        if capacity == 0 {
            return Err(PrepareError::ZeroCapacity);
        }

        self.store.reset(channel_count, capacity);
        let scratch_len = SCRATCH_LEN.min(capacity);
        self.dry = vec![0.0; scratch_len];
        self.delayed = vec![0.0; scratch_len];
        self.feedback_gain = 0.0;
        self.state = EngineState::Ready { sample_rate };

        Ok(())
    }

    /// Silence the store without reallocating it, e.g. when the host stops
    /// the transport.
    pub fn clear(&mut self) {
        self.store.clear();
        self.feedback_gain = 0.0;
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, EngineState::Ready { .. })
    }

    pub fn sample_rate(&self) -> Option<f32> {
        match self.state {
            EngineState::Ready { sample_rate } => Some(sample_rate),
            EngineState::Uninitialized => None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn channel_count(&self) -> usize {
        self.store.channel_count()
    }

    /// The sample delay the engine would use for `delay_time_ms` right now.
    ///
    /// # Panics
    ///
    /// Panics if the engine hasn't been prepared.
    pub fn delay_samples(&self, delay_time_ms: f32) -> usize {
        delay_time_to_samples(delay_time_ms, self.ready_sample_rate(), self.store.capacity())
    }

    /// How many samples of echo tail follow the input going silent.
    ///
    /// Without feedback this is one delay period. With feedback it is the
    /// number of repeats needed for `g^N` to reach -60 dB (`0.001`), times the
    /// delay period: `N = log10(0.001) / log10(g) = -3 / log10(g)`.
    pub fn tail_samples(&self, settings: &DelaySettings) -> u32 {
        let settings = settings.sanitized();
        let delay = self.delay_samples(settings.delay_time_ms) as f32;
        let gain = settings.effective_feedback_gain();

        if gain > 0.001 {
            let repeats = -3.0 / gain.log10();
            (repeats * delay) as u32
        } else {
            delay as u32
        }
    }

    /// Process one block from separate input and output buffers.
    ///
    /// `inputs[c]` and `outputs[c]` are channel `c`; every slice must have
    /// the same length, which is the block length. Exactly that many samples
    /// are written to each output. An empty block does nothing.
    ///
    /// # Panics
    ///
    /// Panics if the engine hasn't been prepared, if input and output channel
    /// counts differ or exceed the prepared channel count, or if the slices
    /// have different lengths. These are host integration bugs.
    pub fn process_block(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        settings: &DelaySettings,
    ) {
        let plan = self.plan(settings);
        assert_eq!(inputs.len(), outputs.len(), "input and output channel counts differ");
        assert!(
            inputs.len() <= self.store.channel_count(),
            "{} channels passed to an engine prepared for {}",
            inputs.len(),
            self.store.channel_count()
        );

        let block_len = inputs.first().map_or(0, |channel| channel.len());
        for (input, output) in inputs.iter().zip(outputs.iter()) {
            assert!(
                input.len() == block_len && output.len() == block_len,
                "channel buffers must all be {block_len} samples long"
            );
        }

        let mut offset = 0;
        while offset < block_len {
            let len = self.span_len(block_len - offset, &plan);
            let span = offset..offset + len;

            for (channel, (input, output)) in inputs.iter().zip(outputs.iter_mut()).enumerate() {
                render_span(
                    &mut self.store,
                    &mut self.delayed[..len],
                    channel,
                    &input[span.clone()],
                    &mut output[span.clone()],
                    &plan,
                    self.feedback_gain,
                );
            }

            self.finish_span(len, &plan);
            offset += len;
        }
    }

    /// Process one block in place: each channel slice holds the input on
    /// entry and the output on return. Same contract as
    /// [`process_block`](Self::process_block).
    pub fn process_in_place(&mut self, channels: &mut [&mut [f32]], settings: &DelaySettings) {
        let plan = self.plan(settings);
        assert!(
            channels.len() <= self.store.channel_count(),
            "{} channels passed to an engine prepared for {}",
            channels.len(),
            self.store.channel_count()
        );

        let block_len = channels.first().map_or(0, |channel| channel.len());
        assert!(
            channels.iter().all(|channel| channel.len() == block_len),
            "channel buffers must all be {block_len} samples long"
        );

        let mut offset = 0;
        while offset < block_len {
            let len = self.span_len(block_len - offset, &plan);
            let span = offset..offset + len;

            for (channel, samples) in channels.iter_mut().enumerate() {
                let dry = &mut self.dry[..len];
                dry.copy_from_slice(&samples[span.clone()]);

                render_span(
                    &mut self.store,
                    &mut self.delayed[..len],
                    channel,
                    dry,
                    &mut samples[span.clone()],
                    &plan,
                    self.feedback_gain,
                );
            }

            self.finish_span(len, &plan);
            offset += len;
        }
    }

    fn ready_sample_rate(&self) -> f32 {
        match self.state {
            EngineState::Ready { sample_rate } => sample_rate,
            EngineState::Uninitialized => {
                panic!("DelayEngine used before prepare() was called")
            }
        }
    }

    fn plan(&self, settings: &DelaySettings) -> BlockPlan {
        let sample_rate = self.ready_sample_rate();
        let settings = settings.sanitized();

        BlockPlan {
            delay_samples: delay_time_to_samples(
                settings.delay_time_ms,
                sample_rate,
                self.store.capacity(),
            ),
            wet: settings.wet(),
            policy: settings.mix_policy,
            feedback_gain: settings.effective_feedback_gain(),
        }
    }

    /// Length of the next span, given `remaining` samples left in the block.
    fn span_len(&self, remaining: usize, plan: &BlockPlan) -> usize {
        let mut len = remaining.min(self.delayed.len());

        if plan.delay_samples > 0 {
            len = len.min(self.store.capacity() - plan.delay_samples);

            let recirculating = plan.feedback_gain > 0.0 || self.feedback_gain > 0.0;
            if recirculating {
                len = len.min(plan.delay_samples);
            }
        }

        len
    }

    fn finish_span(&mut self, len: usize, plan: &BlockPlan) {
        self.feedback_gain = plan.feedback_gain;
        self.store.advance_write_cursor(len);
    }
}

/// Run the fill, read, mix and feedback steps for one channel of one span.
/// The write cursor is left where it was.
fn render_span(
    store: &mut DelayStore,
    delayed: &mut [f32],
    channel: usize,
    dry: &[f32],
    output: &mut [f32],
    plan: &BlockPlan,
    feedback_from: f32,
) {
    store.write_segment(channel, dry, INPUT_GAIN, INPUT_GAIN);

    let read_start = store.read_start(plan.delay_samples);
    store.read_segment(channel, read_start, delayed);

    for ((out, dry), delayed) in output.iter_mut().zip(dry).zip(delayed.iter()) {
        *out = plan.policy.mix(*dry, *delayed, plan.wet);
    }

    if feedback_from > 0.0 || plan.feedback_gain > 0.0 {
        store.add_segment(channel, delayed, feedback_from, plan.feedback_gain);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
