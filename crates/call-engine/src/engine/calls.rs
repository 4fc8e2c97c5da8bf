//! Control operations on the call registry.
//!
//! All operations here run on the application context. They acquire the
//! registry write lock, mutate, release, and only then notify; the
//! transport-blocking cancel control additionally runs with the lock
//! released so a stalled transport cannot hold the registry hostage.

use tracing::{debug, error, warn};

use crate::call::{FriendCall, FriendId, GroupCall, GroupId, PeerId};
use crate::engine::{AvEngine, VIDEO_DEFAULT_BITRATE};
use crate::events::AvEvent;
use crate::transport::CallControl;

impl AvEngine {
    /// Start a call with a friend.
    ///
    /// Returns false when a call with this friend already exists or the
    /// transport rejects the request; no session is created in either case.
    pub async fn start_call(&self, friend: FriendId, with_video: bool) -> bool {
        let mut calls = self.calls.write().await;
        debug!("starting call with {}", friend);
        if calls.contains_key(&friend) {
            warn!("can't start call with {}, already in this call", friend);
            return false;
        }

        let video_bitrate = if with_video { VIDEO_DEFAULT_BITRATE } else { 0 };
        if let Err(e) = self
            .transport
            .call(friend, self.audio_settings.audio_bitrate(), video_bitrate)
            .await
        {
            warn!("call request to {} failed: {}", friend, e);
            return false;
        }

        calls.insert(friend, FriendCall::new(with_video, self.audio.create_source()));
        drop(calls);

        self.apply_video_quality_tier(friend).await;
        true
    }

    /// Answer a pending incoming call.
    ///
    /// The session must already exist, created by the invite callback; a
    /// missing entry is a broken invite-path invariant. On transport
    /// failure the invite is cancelled and the session erased.
    pub async fn answer_call(&self, friend: FriendId, with_video: bool) -> bool {
        let mut calls = self.calls.write().await;
        debug!("answering call {}", friend);

        let exists = calls.contains_key(&friend);
        debug_assert!(exists, "answer_call without an invite-created session");
        if !exists {
            error!("answer_call: no pending invite for {}", friend);
            return false;
        }

        let video_bitrate = if with_video { VIDEO_DEFAULT_BITRATE } else { 0 };
        match self
            .transport
            .answer(friend, self.audio_settings.audio_bitrate(), video_bitrate)
            .await
        {
            Ok(()) => {
                if let Some(call) = calls.get_mut(&friend) {
                    call.media.active = true;
                }
                drop(calls);
                self.apply_video_quality_tier(friend).await;
                true
            }
            Err(e) => {
                warn!("failed to answer call with {}: {}", friend, e);
                if let Err(e) = self.transport.call_control(friend, CallControl::Cancel).await {
                    warn!("cancel after failed answer of {} failed too: {}", friend, e);
                }
                calls.remove(&friend);
                false
            }
        }
    }

    /// Cancel a call (or reject a pending invite).
    ///
    /// Only a successful transport cancel erases the entry and emits
    /// `Ended`; on failure the registry is untouched and callers must not
    /// assume the call is gone.
    pub async fn cancel_call(&self, friend: FriendId) -> bool {
        // Serialize behind any in-flight registry mutation, then release:
        // the cancel control can block inside the transport.
        let calls = self.calls.write().await;
        debug!("cancelling call with {}", friend);
        drop(calls);

        if let Err(e) = self.transport.call_control(friend, CallControl::Cancel).await {
            warn!("failed to cancel call with {}: {}", friend, e);
            return false;
        }

        let mut calls = self.calls.write().await;
        calls.remove(&friend);
        drop(calls);

        let _ = self.event_tx.send(AvEvent::Ended {
            friend,
            error: false,
        });
        true
    }

    /// Cancel a call whose ring timed out.
    pub async fn timeout_call(&self, friend: FriendId) {
        if !self.cancel_call(friend).await {
            warn!("failed to timeout call with {}", friend);
            return;
        }
        debug!("call with friend {} timed out", friend);
    }

    /// Toggle the microphone mute state of a call. No-op on unknown ids.
    pub async fn toggle_mute_input(&self, friend: FriendId) {
        let mut calls = self.calls.write().await;
        if let Some(call) = calls.get_mut(&friend) {
            call.media.mute_mic = !call.media.mute_mic;
        }
    }

    /// Toggle the speaker mute state of a call. No-op on unknown ids.
    pub async fn toggle_mute_output(&self, friend: FriendId) {
        let mut calls = self.calls.write().await;
        if let Some(call) = calls.get_mut(&friend) {
            call.media.mute_vol = !call.media.mute_vol;
        }
    }

    /// Signal every peer that we are not sending video right now.
    ///
    /// The audio bitrate is untouched; each call's video bitrate is zeroed
    /// and flagged, and the next successful video send restores it.
    pub async fn send_no_video(&self) {
        let calls = self.calls.write().await;
        debug!("signaling end of video sending");
        for (friend, call) in calls.iter() {
            if let Err(e) = self.transport.video_set_bit_rate(*friend, 0).await {
                warn!("zeroing video bitrate for {} failed: {}", friend, e);
                continue;
            }
            call.null_video_bitrate
                .store(true, std::sync::atomic::Ordering::Release);
        }
    }

    // ===== group calls =====

    /// Start participating in a group call. Duplicate joins are rejected.
    pub async fn join_group_call(&self, group: GroupId) {
        let mut group_calls = self.group_calls.write().await;
        debug!("joining group call {}", group);
        if group_calls.contains_key(&group) {
            warn!("this group call already exists, not joining");
            return;
        }
        group_calls.insert(group, GroupCall::new());
    }

    /// Stop the group call without leaving the group itself.
    pub async fn leave_group_call(&self, group: GroupId) {
        let mut group_calls = self.group_calls.write().await;
        debug!("leaving group call {}", group);
        group_calls.remove(&group);
    }

    /// Mute or unmute the group call's microphone.
    pub async fn mute_group_input(&self, group: GroupId, mute: bool) {
        let mut group_calls = self.group_calls.write().await;
        if let Some(call) = group_calls.get_mut(&group) {
            call.media.mute_mic = mute;
        }
    }

    /// Mute or unmute the group call's output.
    pub async fn mute_group_output(&self, group: GroupId, mute: bool) {
        let mut group_calls = self.group_calls.write().await;
        if let Some(call) = group_calls.get_mut(&group) {
            call.media.mute_vol = mute;
        }
    }

    /// Invalidate a peer's audio source when they leave the group.
    pub async fn remove_group_peer(&self, group: GroupId, peer: &PeerId) {
        let mut group_calls = self.group_calls.write().await;
        if let Some(call) = group_calls.get_mut(&group) {
            call.remove_peer(peer);
        }
    }
}
