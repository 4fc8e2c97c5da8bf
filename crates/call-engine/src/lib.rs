//! Peer-to-peer audio/video call engine.
//!
//! This crate sits between a black-box P2P transport and the application:
//! it owns call lifecycle (invite, answer, cancel, state transitions,
//! teardown) for one-to-one and group calls, multiplexes the per-call audio
//! and video pipelines, and routes captured media through the shared filter
//! chain of [`peercall_media_core`] on its way to the transport.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐
//! │       Application       │  control commands, events, status queries
//! └───────────┬─────────────┘
//!             │
//! ┌───────────▼─────────────┐     ┌──────────────────────┐
//! │        AvEngine         │◄────┤  capture pipelines   │ send paths
//! │  registry · sessions    │     └──────────────────────┘
//! │  send paths · callbacks │
//! └───────────┬─────────────┘
//!             │ AvTransport trait + on_* callbacks
//! ┌───────────▼─────────────┐
//! │   P2P transport (black  │
//! │   box: codecs, wire)    │
//! └─────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use peercall_call_engine::{AvEngine, NullAudioBackend, StaticSettings};
//! # use peercall_call_engine::{AvTransport, FriendId};
//! # async fn example(transport: Arc<dyn AvTransport>) -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Arc::new(StaticSettings::default());
//! let engine = AvEngine::new(
//!     transport,
//!     Arc::new(NullAudioBackend),
//!     settings.clone(),
//!     settings,
//! )?;
//! engine.start().await?;
//!
//! let events = engine.take_event_receiver().await.unwrap();
//! engine.start_call(FriendId(42), true).await;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod call;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod state;
pub mod transport;
pub mod video;

pub use audio::{AudioBackend, AudioSink, NullAudioBackend};
pub use call::{FriendCall, FriendId, GroupCall, GroupId, PeerId};
pub use config::{AudioSettings, GroupSettings, StaticSettings};
pub use engine::{AvEngine, VIDEO_DEFAULT_BITRATE};
pub use error::{Error, Result};
pub use events::AvEvent;
pub use state::CallStateFlags;
pub use transport::{
    AvTransport, CallCommInfo, CallControl, EncoderOption, TransportError, TransportResult,
};
pub use video::{CapturedFrame, PixelFormat, VideoSource, YuvFrame, VIDEO_MAX_HEIGHT, VIDEO_MAX_WIDTH};
