//! Transport callback adapter.
//!
//! These entry points are invoked by the transport glue from its media
//! execution context. They translate transport events into registry
//! mutations and outward notifications. Every notification goes out after
//! the registry guard is dropped; a handler on the application context may
//! synchronously call back into the engine.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::call::{FriendCall, FriendId, GroupId, PeerId};
use crate::engine::AvEngine;
use crate::events::AvEvent;
use crate::state::CallStateFlags;
use crate::transport::{CallCommInfo, CallControl};
use crate::video::YuvFrame;

impl AvEngine {
    /// A friend is calling us.
    ///
    /// A duplicate invite (an entry already exists for this friend) is
    /// rejected with a transport-level cancel and causes no state change.
    pub async fn on_call_invite(&self, friend: FriendId, audio: bool, video: bool) {
        let mut calls = self.calls.write().await;
        if calls.contains_key(&friend) {
            warn!("rejecting call invite from {}, we're already in that call", friend);
            if let Err(e) = self.transport.call_control(friend, CallControl::Cancel).await {
                warn!("cancel of duplicate invite from {} failed: {}", friend, e);
            }
            return;
        }
        debug!("received call invite from {}", friend);

        let mut call = FriendCall::new(video, self.audio.create_source());
        // No state callback arrives when we answer, so fill the state from
        // the invite's requested capabilities in advance.
        let mut state = CallStateFlags::empty();
        if audio {
            state.insert(CallStateFlags::SENDING_AUDIO | CallStateFlags::ACCEPTING_AUDIO);
        }
        if video {
            state.insert(CallStateFlags::SENDING_VIDEO | CallStateFlags::ACCEPTING_VIDEO);
        }
        call.state = state;
        calls.insert(friend, call);
        drop(calls);

        let _ = self.event_tx.send(AvEvent::Invited { friend, video });
    }

    /// The transport reports a new state bitmask for a call.
    pub async fn on_call_state(&self, friend: FriendId, state: CallStateFlags) {
        let mut calls = self.calls.write().await;
        if !calls.contains_key(&friend) {
            warn!("state callback for {}, but that call is already dead", friend);
            return;
        }

        if state.contains(CallStateFlags::ERROR) {
            warn!("call with friend {} died of unnatural causes", friend);
            calls.remove(&friend);
            drop(calls);
            let _ = self.event_tx.send(AvEvent::Ended {
                friend,
                error: true,
            });
            return;
        }

        if state.contains(CallStateFlags::FINISHED) {
            debug!("call with friend {} finished quietly", friend);
            calls.remove(&friend);
            drop(calls);
            let _ = self.event_tx.send(AvEvent::Ended {
                friend,
                error: false,
            });
            return;
        }

        let Some(call) = calls.get_mut(&friend) else {
            return;
        };
        let previous = call.state;
        if previous.is_empty() && !state.is_empty() {
            // We started this call and it was still ringing.
            call.media.active = true;
            call.state = state;
            let video = call.video_enabled;
            drop(calls);
            let _ = self.event_tx.send(AvEvent::Started { friend, video });
        } else if previous.contains(CallStateFlags::SENDING_VIDEO)
            && !state.contains(CallStateFlags::SENDING_VIDEO)
        {
            debug!("friend {} stopped sending video", friend);
            call.video_source.stop();
            call.state = state;
        } else if !previous.contains(CallStateFlags::SENDING_VIDEO)
            && state.contains(CallStateFlags::SENDING_VIDEO)
        {
            // The transport sometimes delivers "last frame" and "stopped
            // sending" out of order; the source stays quiet while the peer
            // says it is not sending and is restarted here.
            call.video_source.restart();
            call.state = state;
        } else {
            call.state = state;
        }
    }

    /// An audio frame arrived for a friend call.
    ///
    /// Eligible frames first prime the echo canceller's far-end reference;
    /// the played audio itself is delivered unfiltered.
    pub async fn on_audio_frame(&self, friend: FriendId, pcm: &[i16], channels: u8, rate: u32) {
        let sink = {
            let calls = self.calls.read().await;
            let Some(call) = calls.get(&friend) else {
                return;
            };
            if call.media.mute_vol {
                return;
            }
            Arc::clone(&call.audio_sink)
        };

        if self.audio_settings.echo_cancellation() {
            let mut processor = self.processor.lock().await;
            processor.buffer_playback_frame(pcm, channels, rate);
        }

        sink.play(pcm, channels, rate);
    }

    /// A video frame arrived for a friend call.
    ///
    /// The raw planar frame is forwarded verbatim to the session's video
    /// source; unknown ids drop the frame.
    pub async fn on_video_frame(
        &self,
        friend: FriendId,
        width: u16,
        height: u16,
        y: &[u8],
        u: &[u8],
        v: &[u8],
        y_stride: u32,
        u_stride: u32,
        v_stride: u32,
    ) {
        let calls = self.calls.read().await;
        let Some(call) = calls.get(&friend) else {
            return;
        };
        call.video_source.push_frame(YuvFrame {
            width,
            height,
            y: Bytes::copy_from_slice(y),
            u: Bytes::copy_from_slice(u),
            v: Bytes::copy_from_slice(v),
            y_stride,
            u_stride,
            v_stride,
        });
    }

    /// The transport suggests a new audio bitrate. Advisory only.
    pub async fn on_audio_bitrate(&self, friend: FriendId, rate: u32) {
        debug!("recommended audio bitrate with {} is now {}, ignoring it", friend, rate);
    }

    /// The transport suggests a new video bitrate. Advisory only.
    pub async fn on_video_bitrate(&self, friend: FriendId, rate: u32) {
        debug!("recommended video bitrate with {} is now {}, ignoring it", friend, rate);
    }

    /// The transport reports call-communication info.
    ///
    /// On a live encoder bitrate sample the bitrate tier is re-applied, so
    /// the tier holds even after the transport's own rate control adjusted
    /// the encoder mid-call.
    pub async fn on_call_comm(&self, friend: FriendId, info: CallCommInfo, value: i64) {
        if info == CallCommInfo::EncoderCurrentBitrate {
            debug!("encoder bitrate for {} now {}, re-applying tier", friend, value);
            self.apply_video_quality_tier(friend).await;
        }
    }

    /// Audio from a peer in a group call.
    ///
    /// Allocates the peer's playback source on first use. Peers blocked by
    /// the group settings are dropped before any notification.
    pub async fn on_group_audio(
        &self,
        group: GroupId,
        peer: PeerId,
        pcm: &[i16],
        channels: u8,
        rate: u32,
    ) {
        if self.group_settings.is_peer_blocked(&peer) {
            return;
        }

        let source = {
            let mut group_calls = self.group_calls.write().await;
            let Some(call) = group_calls.get_mut(&group) else {
                return;
            };
            if call.media.mute_vol || !call.media.active {
                return;
            }
            Arc::clone(
                call.sources
                    .entry(peer.clone())
                    .or_insert_with(|| self.audio.create_source()),
            )
        };

        let _ = self.event_tx.send(AvEvent::GroupPeerAudio {
            group,
            peer,
        });
        source.play(pcm, channels, rate);
    }
}
