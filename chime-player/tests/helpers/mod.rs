//! Test helper modules for chime-player integration tests
//!
//! - ThemeTree: temporary XDG sound theme directories with generated WAVs
//! - ScriptedBackend: backend double that records calls and can hold voices

#![allow(dead_code)]

pub mod scripted_backend;
pub mod theme_tree;

pub use scripted_backend::{BackendScript, ScriptedBackend};
pub use theme_tree::{write_wav, ThemeTree};
