//! Wiring of capture, transcription, completion and playback into turns

pub mod config;
pub mod controller;

pub use config::{AppConfig, TurnConfig};
pub use controller::{Adapters, TurnCommand, TurnController, TurnEvent, TurnHandle, TurnState};
