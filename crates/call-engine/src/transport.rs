//! The black-box P2P transport interface.
//!
//! The engine never speaks the wire protocol itself; everything below the
//! call-management layer is delegated to an [`AvTransport`] implementation
//! that encodes and routes frames and call signaling. The transport also
//! drives the engine back through the callback adapter (`AvEngine::on_*`)
//! from its own execution context.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::call::{FriendId, GroupId};

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors surfaced by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Transient internal lock contention; the operation may be retried
    #[error("transport busy, retry")]
    Sync,

    /// The peer is not connected
    #[error("peer not connected")]
    Disconnected,

    /// A parameter was rejected (unknown id, bad bitrate, bad frame)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other transport-internal failure
    #[error("transport failure: {0}")]
    Failed(String),
}

/// Call control verbs understood by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallControl {
    /// Terminate the call (also rejects a pending invite)
    Cancel,
    /// Put the call on hold
    Pause,
    /// Resume a held call
    Resume,
}

/// Subject of a call-communication info callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallCommInfo {
    /// Live sample of the encoder's current video bitrate
    EncoderCurrentBitrate,
    /// Live sample of the decoder's current video bitrate
    DecoderCurrentBitrate,
}

/// Per-call encoder options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderOption {
    /// Enable (1) or disable (0) the encoder's own video rate control
    VideoBitrateAutoset,
    /// Upper video bitrate bound
    VideoMaxBitrate,
    /// Lower video bitrate bound
    VideoMinBitrate,
}

/// The transport's call and media surface, as consumed by the engine.
///
/// Frame-send primitives may fail with [`TransportError::Sync`] when the
/// transport's internal lock is contended; that code is transient and
/// retryable, every other error is final for the frame.
#[async_trait]
pub trait AvTransport: Send + Sync {
    /// Request a call to a friend.
    async fn call(
        &self,
        friend: FriendId,
        audio_bitrate: u32,
        video_bitrate: u32,
    ) -> TransportResult<()>;

    /// Answer a pending incoming call.
    async fn answer(
        &self,
        friend: FriendId,
        audio_bitrate: u32,
        video_bitrate: u32,
    ) -> TransportResult<()>;

    /// Issue a call control verb.
    async fn call_control(&self, friend: FriendId, control: CallControl) -> TransportResult<()>;

    /// Set the outgoing audio bitrate for a call.
    async fn audio_set_bit_rate(&self, friend: FriendId, bitrate: u32) -> TransportResult<()>;

    /// Set the outgoing video bitrate for a call. Zero signals "not sending
    /// video" without ending the call.
    async fn video_set_bit_rate(&self, friend: FriendId, bitrate: u32) -> TransportResult<()>;

    /// Set a per-call encoder option.
    async fn option_set(
        &self,
        friend: FriendId,
        option: EncoderOption,
        value: i64,
    ) -> TransportResult<()>;

    /// Send one PCM audio frame to a friend call.
    async fn audio_send_frame(
        &self,
        friend: FriendId,
        pcm: &[i16],
        channels: u8,
        rate: u32,
    ) -> TransportResult<()>;

    /// Send one planar YUV420 video frame to a friend call.
    async fn video_send_frame(
        &self,
        friend: FriendId,
        width: u16,
        height: u16,
        y: &[u8],
        u: &[u8],
        v: &[u8],
    ) -> TransportResult<()>;

    /// Send one PCM audio frame into a group call.
    async fn group_send_audio(
        &self,
        group: GroupId,
        pcm: &[i16],
        channels: u8,
        rate: u32,
    ) -> TransportResult<()>;

    /// Run one step of the transport's internal call processing and
    /// callback dispatch.
    async fn iterate(&self);

    /// The transport's suggested delay before the next [`Self::iterate`].
    async fn iteration_interval(&self) -> Duration;
}
