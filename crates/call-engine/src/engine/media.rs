//! Send paths for locally captured media.
//!
//! These run on the capture pipelines' execution contexts and take the
//! registry lock in shared mode only. The video path first probes the lock
//! without blocking: the capture thread may hold a device lock of its own,
//! and blocking here while a writer waits could deadlock the pipeline.

use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use peercall_media_core::FilterSettings;

use crate::call::{FriendId, GroupId};
use crate::engine::{AvEngine, SEND_RETRIES, SEND_RETRY_DELAY, VIDEO_DEFAULT_BITRATE};
use crate::state::CallStateFlags;
use crate::transport::TransportError;
use crate::video::{CapturedFrame, VIDEO_MAX_HEIGHT, VIDEO_MAX_WIDTH};

impl AvEngine {
    /// Push one captured audio frame into a friend call.
    ///
    /// Applies the capture filter chain (when enabled and applicable) in
    /// place, then hands the frame to the transport, retrying a bounded
    /// number of times on transient contention.
    ///
    /// Returns false only for an unknown id; a muted, inactive or
    /// not-accepting call swallows the frame and reports true.
    pub async fn send_call_audio(
        &self,
        friend: FriendId,
        pcm: &mut [i16],
        channels: u8,
        rate: u32,
    ) -> bool {
        let (muted, active, accepting) = {
            let calls = self.calls.read().await;
            let Some(call) = calls.get(&friend) else {
                return false;
            };
            (
                call.media.mute_mic,
                call.media.active,
                call.state.contains(CallStateFlags::ACCEPTING_AUDIO),
            )
        };
        if muted || !active || !accepting {
            return true;
        }

        if self.audio_settings.echo_cancellation() {
            let settings = FilterSettings {
                echo_latency_ms: self.audio_settings.echo_latency_ms(),
                echo_mode: self.audio_settings.echo_mode(),
                noise_mode: self.audio_settings.noise_suppression_mode(),
            };
            let mut processor = self.processor.lock().await;
            if let Err(e) = processor.process_capture_frame(pcm, channels, rate, &settings) {
                warn!("capture filtering failed, sending unfiltered audio: {}", e);
            }
        }

        let mut attempts = 0;
        loop {
            match self
                .transport
                .audio_send_frame(friend, pcm, channels, rate)
                .await
            {
                Ok(()) => break,
                Err(TransportError::Sync) if attempts < SEND_RETRIES => {
                    attempts += 1;
                    tokio::time::sleep(SEND_RETRY_DELAY).await;
                }
                Err(TransportError::Sync) => {
                    debug!("audio send to {}: transport busy, dropping frame", friend);
                    break;
                }
                Err(e) => {
                    debug!("audio send to {} failed: {}", friend, e);
                    break;
                }
            }
        }
        true
    }

    /// Push one captured video frame into a friend call.
    ///
    /// No-op when the call is unknown, has no video, is inactive, or the
    /// peer does not accept video. A previously zeroed video bitrate is
    /// restored before sending, which transparently resumes video after a
    /// `send_no_video` broadcast. Conversion failures abort silently.
    pub async fn send_call_video(&self, friend: FriendId, frame: &CapturedFrame) {
        match self.calls.try_read() {
            Ok(probe) => drop(probe),
            Err(_) => {
                debug!("video send: registry contended, dropping frame");
                return;
            }
        }
        let calls = self.calls.read().await;

        let Some(call) = calls.get(&friend) else {
            return;
        };
        if !call.video_enabled
            || !call.media.active
            || !call.state.contains(CallStateFlags::ACCEPTING_VIDEO)
        {
            return;
        }

        if call.video_suspended() {
            debug!("restarting video stream to friend {}", friend);
            if let Err(e) = self
                .transport
                .video_set_bit_rate(friend, VIDEO_DEFAULT_BITRATE)
                .await
            {
                warn!("restoring video bitrate for {} failed: {}", friend, e);
                return;
            }
            call.null_video_bitrate.store(false, Ordering::Release);
        }

        let Some(yuv) = frame.to_yuv420((VIDEO_MAX_WIDTH, VIDEO_MAX_HEIGHT)) else {
            return;
        };

        if let Err(e) = self
            .transport
            .video_send_frame(friend, yuv.width, yuv.height, &yuv.y, &yuv.u, &yuv.v)
            .await
        {
            debug!("video send to {} failed: {}", friend, e);
        }
    }

    /// Push one captured audio frame into a group call.
    ///
    /// Returns false only for an unknown group; inactive or muted group
    /// calls swallow the frame and report true.
    pub async fn send_group_audio(
        &self,
        group: GroupId,
        pcm: &[i16],
        channels: u8,
        rate: u32,
    ) -> bool {
        let group_calls = self.group_calls.read().await;
        let Some(call) = group_calls.get(&group) else {
            return false;
        };
        if !call.media.active || call.media.mute_mic {
            return true;
        }

        if let Err(e) = self
            .transport
            .group_send_audio(group, pcm, channels, rate)
            .await
        {
            debug!("group audio send to {} failed: {}", group, e);
        }
        true
    }
}
