//! Core data types for the phonics generator graph.
//!
//! This crate defines the leaf types shared by the editor-facing patch
//! templates and the runtime engine: play states and their resolution
//! rule, pooled sample buffers, time conversion, and the template arena
//! that graph instances are spawned from.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod fpcm;
mod play_state;
mod pool;
mod template;
mod time;

pub use fpcm::Fpcm;
pub use play_state::{resolve, PlayState};
pub use pool::{BufferPool, PersistentBuf, Scratch};
pub use template::{ClampMode, NodeKind, PatchError, PatchTemplate, TemplateKey, TemplateNode};
pub use time::{samples_for, Pitch, SpawnParams, Time};
