//! Built-in generator nodes.

mod adsr;
mod arith;
mod cycle;
mod delay;
mod envelope;
mod history;
mod meter;
mod oscillators;
mod smear;
mod stutter;

pub use adsr::{Adsr, AdsrTimes};
pub use arith::{Add, Amplify, Batch, Binary, BinaryOp, Lerp, Mad, ShapeOp, Shaper};
pub use cycle::Cycle;
pub use delay::Delay;
pub use envelope::{LinearAttack, LinearDecay, Release};
pub use history::SampleHistory;
pub use meter::{Meter, MeterTap};
pub use oscillators::{noise_table, Dc, Oscillator, Shape, WhiteNoise, Zero};
pub use smear::Smear;
pub use stutter::Stutter;
