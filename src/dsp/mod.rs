//! # DSP (Digital Signal Processing) Core
//!
//! The delay effect itself, independent of any plugin framework:
//!
//! - **`delay_store`**: per-channel ring buffers with a shared write cursor
//!   and wrap-safe segment reads and writes. This is where every piece of
//!   modular index arithmetic lives.
//!
//! - **`engine`**: the per-block fill, read, mix, feedback and advance steps
//!   that turn live audio into delayed audio.
//!
//! - **`settings`**: the parameter snapshot the engine reads each block, and
//!   the lock-free atomic parameter set a control thread can write to.

pub mod delay_store;
pub mod engine;
pub mod settings;

pub use delay_store::DelayStore;
pub use engine::{delay_time_to_samples, DelayEngine, PrepareError, MAX_DELAY_SECONDS};
pub use settings::{
    AtomicDelayParams, DelayControls, DelaySettings, MixPolicy, INPUT_GAIN, MAX_FEEDBACK_GAIN,
};
