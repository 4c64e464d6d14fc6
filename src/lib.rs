//! Streaming audio transcoding and waveform-analysis engine.
//!
//! Every public operation opens its own container reader/writer and codec
//! pump, runs to completion on the calling thread, and releases all codec
//! and file handles on every exit path. There is no shared engine state;
//! callers that want background execution spawn their own worker threads.

/// Engine configuration passed into each operation.
pub mod config;
/// Container reading and writing (access-unit level).
pub mod container;
/// Engine error taxonomy.
pub mod error;
/// Logging setup.
pub mod logging;
/// Public editing operations.
pub mod ops;
/// Pure PCM math and the raw WAV companion path.
pub mod pcm;
/// Codec buffer-exchange devices and the decode/encode pumps.
pub mod pump;
/// Selection math over reduced waveform previews.
pub mod selection;
/// Streaming waveform reduction.
pub mod waveform;

pub use config::EngineConfig;
pub use error::EngineError;
