//! Generator graph runtime for the phonics synthesizer.
//!
//! Spawns graph instances from patch templates, evaluates them block by
//! block, and manages the voices they play through.

mod config;
pub mod generator;
pub mod graph;
pub mod nodes;
mod spawn;
mod voice;
mod voice_manager;

pub use config::EngineConfig;
pub use generator::{Clock, Generator};
pub use graph::{blocks, Graph, NodeKey, Nodes, Render};
pub use spawn::spawn;
pub use voice::{OutputChannel, Voice, VoiceId, VoiceState};
pub use voice_manager::VoiceManager;
