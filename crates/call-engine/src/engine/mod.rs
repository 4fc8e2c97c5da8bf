//! The call engine: registry, lifecycle, and the media iteration loop.
//!
//! `AvEngine` owns the authoritative mapping of active calls. Three
//! execution contexts meet here: the transport's media context delivering
//! callbacks, the application context issuing control commands, and the
//! capture pipelines pushing frames through the send paths. Each registry
//! map is guarded by one reader-writer lock; the shared filter chain has
//! its own mutex so concurrent send/receive paths on different calls only
//! contend on the DSP itself.
//!
//! Outward notifications are sent strictly after registry guards are
//! released. Handlers may synchronously re-enter the engine, so sending
//! while holding a guard would deadlock against the control path.

mod callbacks;
mod calls;
mod media;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use peercall_media_core::AudioProcessor;

use crate::audio::AudioBackend;
use crate::call::{FriendCall, FriendId, GroupCall, GroupId};
use crate::config::{AudioSettings, GroupSettings};
use crate::error::{Error, Result};
use crate::events::AvEvent;
use crate::transport::{AvTransport, EncoderOption};
use crate::video::VideoSource;

/// Default outgoing video bitrate.
pub const VIDEO_DEFAULT_BITRATE: u32 = 2500;

/// Extra attempts after the first send fails with the transient sync error.
pub(crate) const SEND_RETRIES: u32 = 3;

/// Pause between send retries. Possibly arbitrary, see DESIGN notes.
pub(crate) const SEND_RETRY_DELAY: Duration = Duration::from_micros(500);

/// Floor applied to the transport's suggested iteration interval.
const MIN_ITERATION_INTERVAL: Duration = Duration::from_millis(10);

/// The peer-to-peer audio/video call engine.
pub struct AvEngine {
    pub(crate) transport: Arc<dyn AvTransport>,
    pub(crate) audio_settings: Arc<dyn AudioSettings>,
    pub(crate) group_settings: Arc<dyn GroupSettings>,
    pub(crate) audio: Arc<dyn AudioBackend>,

    /// Friend-call registry
    pub(crate) calls: RwLock<HashMap<FriendId, FriendCall>>,
    /// Group-call registry
    pub(crate) group_calls: RwLock<HashMap<GroupId, GroupCall>>,

    /// Shared filter chain; its lock is disjoint from the registry locks
    pub(crate) processor: Mutex<AudioProcessor>,

    pub(crate) event_tx: mpsc::UnboundedSender<AvEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<AvEvent>>>,

    iterate_task: Mutex<Option<JoinHandle<()>>>,
    is_running: AtomicBool,
}

impl AvEngine {
    /// Create an engine over the given transport and collaborators.
    ///
    /// The filter engines are constructed here and live exactly as long as
    /// the engine; there is no process-global DSP state.
    pub fn new(
        transport: Arc<dyn AvTransport>,
        audio: Arc<dyn AudioBackend>,
        audio_settings: Arc<dyn AudioSettings>,
        group_settings: Arc<dyn GroupSettings>,
    ) -> Result<Self> {
        let processor = AudioProcessor::new()?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Self {
            transport,
            audio_settings,
            group_settings,
            audio,
            calls: RwLock::new(HashMap::new()),
            group_calls: RwLock::new(HashMap::new()),
            processor: Mutex::new(processor),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            iterate_task: Mutex::new(None),
            is_running: AtomicBool::new(false),
        })
    }

    /// Take the event receiver. Returns `None` after the first call.
    pub async fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<AvEvent>> {
        self.event_rx.lock().await.take()
    }

    /// Start the media iteration loop.
    ///
    /// The loop steps the transport's internal processing, asks it for the
    /// next interval, clamps that to a floor and reschedules itself, for
    /// the lifetime of the engine.
    pub async fn start(&self) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidState("engine already started".into()));
        }
        let transport = Arc::clone(&self.transport);
        let handle = tokio::spawn(async move {
            loop {
                transport.iterate().await;
                let mut interval = transport.iteration_interval().await;
                if interval <= Duration::from_millis(5) {
                    interval = MIN_ITERATION_INTERVAL;
                }
                tokio::time::sleep(interval).await;
            }
        });
        *self.iterate_task.lock().await = Some(handle);
        debug!("call engine started");
        Ok(())
    }

    /// Tear the engine down.
    ///
    /// Every outstanding friend and group call is cancelled before the
    /// iteration loop stops, so no transport callback can land in a
    /// half-destroyed registry. Idempotent.
    pub async fn shutdown(&self) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!("call engine shutting down");

        let friends: Vec<FriendId> = self.calls.read().await.keys().copied().collect();
        for friend in friends {
            if !self.cancel_call(friend).await {
                warn!("cancel of call {} failed during shutdown, dropping entry", friend);
                self.calls.write().await.remove(&friend);
            }
        }

        let groups: Vec<GroupId> = self.group_calls.read().await.keys().copied().collect();
        for group in groups {
            self.leave_group_call(group).await;
        }

        if let Some(handle) = self.iterate_task.lock().await.take() {
            handle.abort();
        }

        debug_assert!(self.calls.read().await.is_empty());
        debug_assert!(self.group_calls.read().await.is_empty());
    }

    /// Whether [`Self::start`] has been called and not yet undone
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    // ===== status queries =====

    /// Whether a call (ringing or active) exists for the friend
    pub async fn is_call_started(&self, friend: FriendId) -> bool {
        self.calls.read().await.contains_key(&friend)
    }

    /// Whether a fully established call exists for the friend
    pub async fn is_call_active(&self, friend: FriendId) -> bool {
        self.calls
            .read()
            .await
            .get(&friend)
            .map(|call| call.media.active)
            .unwrap_or(false)
    }

    /// Whether video was negotiated for the friend's call
    pub async fn is_call_video_enabled(&self, friend: FriendId) -> bool {
        self.calls
            .read()
            .await
            .get(&friend)
            .map(|call| call.video_enabled)
            .unwrap_or(false)
    }

    /// Whether the call's microphone is muted
    pub async fn is_call_input_muted(&self, friend: FriendId) -> bool {
        self.calls
            .read()
            .await
            .get(&friend)
            .map(|call| call.media.mute_mic)
            .unwrap_or(false)
    }

    /// Whether the call's speaker is muted
    pub async fn is_call_output_muted(&self, friend: FriendId) -> bool {
        self.calls
            .read()
            .await
            .get(&friend)
            .map(|call| call.media.mute_vol)
            .unwrap_or(false)
    }

    /// Whether the call's outbound video bitrate is currently zeroed
    pub async fn is_video_suspended(&self, friend: FriendId) -> bool {
        self.calls
            .read()
            .await
            .get(&friend)
            .map(|call| call.video_suspended())
            .unwrap_or(false)
    }

    /// Whether a call exists for the group
    pub async fn is_group_call_started(&self, group: GroupId) -> bool {
        self.group_calls.read().await.contains_key(&group)
    }

    /// Whether the group call's microphone is muted
    pub async fn is_group_input_muted(&self, group: GroupId) -> bool {
        self.group_calls
            .read()
            .await
            .get(&group)
            .map(|call| call.media.mute_mic)
            .unwrap_or(false)
    }

    /// Whether the group call's output is muted
    pub async fn is_group_output_muted(&self, group: GroupId) -> bool {
        self.group_calls
            .read()
            .await
            .get(&group)
            .map(|call| call.media.mute_vol)
            .unwrap_or(false)
    }

    /// Display-facing video source of the friend's call.
    pub async fn video_source(&self, friend: FriendId) -> Option<Arc<VideoSource>> {
        let calls = self.calls.read().await;
        match calls.get(&friend) {
            Some(call) => Some(Arc::clone(&call.video_source)),
            None => {
                warn!("video_source: no call with {}, possibly cancelled", friend);
                None
            }
        }
    }

    // ===== internal helpers =====

    /// Apply the video-quality bitrate tier derived from the frame-rate
    /// preference. Used on start, on answer, and whenever the transport
    /// reports a live encoder bitrate sample, so the tier survives the
    /// transport's own rate control.
    pub(crate) async fn apply_video_quality_tier(&self, friend: FriendId) {
        let options: &[(EncoderOption, i64)] = match self.audio_settings.video_fps() {
            30 | 25 => {
                debug!("call {}: pinning high-quality video bitrate band", friend);
                &[
                    (EncoderOption::VideoBitrateAutoset, 0),
                    (EncoderOption::VideoMaxBitrate, 11_000),
                    (EncoderOption::VideoMinBitrate, 10_000),
                ]
            }
            20 => {
                debug!("call {}: constrained auto video bitrate", friend);
                &[
                    (EncoderOption::VideoBitrateAutoset, 1),
                    (EncoderOption::VideoMaxBitrate, 180),
                    (EncoderOption::VideoMinBitrate, 2_700),
                ]
            }
            _ => return,
        };
        for &(option, value) in options {
            if let Err(e) = self.transport.option_set(friend, option, value).await {
                warn!("call {}: setting {:?} failed: {}", friend, option, e);
            }
        }
    }
}

impl std::fmt::Debug for AvEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvEngine")
            .field("running", &self.is_running())
            .finish()
    }
}
