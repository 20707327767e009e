//! Audio output backends for the phonics synthesizer.
//!
//! The engine renders mono `f32` samples; backends take them through a
//! lock-free queue and fan them out to the device's channels.

mod cpal_backend;
mod traits;

pub use cpal_backend::CpalOutput;
pub use traits::{AudioError, AudioOutput};
