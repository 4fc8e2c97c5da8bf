//! Shared test fixtures: a scriptable mock transport and engine builders.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use peercall_call_engine::{
    AvEngine, AvTransport, CallControl, EncoderOption, FriendId, GroupId, NullAudioBackend,
    StaticSettings, TransportError, TransportResult,
};

/// Scriptable in-memory transport.
///
/// Tracks which friends the transport considers in a call so that cancel
/// controls fail for unknown ids, the way a real transport rejects them.
#[derive(Default)]
pub struct MockTransport {
    pub fail_call: AtomicBool,
    pub fail_answer: AtomicBool,
    pub fail_control: AtomicBool,
    /// Number of upcoming audio sends to fail with the transient sync code
    pub sync_failures: AtomicU32,

    /// Friends with a live transport-side call
    pub in_call: Mutex<HashSet<FriendId>>,

    pub audio_attempts: AtomicU32,
    pub audio_sent: Mutex<Vec<Vec<i16>>>,
    pub video_sent: Mutex<Vec<(u16, u16)>>,
    pub group_audio_sent: AtomicU32,
    pub cancels: Mutex<Vec<FriendId>>,
    pub video_bitrates: Mutex<Vec<(FriendId, u32)>>,
    pub option_sets: Mutex<Vec<(FriendId, EncoderOption, i64)>>,
    pub iterations: AtomicU32,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pretend the remote side opened a call (used before invite callbacks).
    pub fn seed_remote_call(&self, friend: FriendId) {
        self.in_call.lock().unwrap().insert(friend);
    }

    pub fn cancelled(&self) -> Vec<FriendId> {
        self.cancels.lock().unwrap().clone()
    }

    pub fn video_bitrate_log(&self) -> Vec<(FriendId, u32)> {
        self.video_bitrates.lock().unwrap().clone()
    }
}

#[async_trait]
impl AvTransport for MockTransport {
    async fn call(
        &self,
        friend: FriendId,
        _audio_bitrate: u32,
        _video_bitrate: u32,
    ) -> TransportResult<()> {
        if self.fail_call.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("call rejected".into()));
        }
        self.in_call.lock().unwrap().insert(friend);
        Ok(())
    }

    async fn answer(
        &self,
        friend: FriendId,
        _audio_bitrate: u32,
        _video_bitrate: u32,
    ) -> TransportResult<()> {
        if self.fail_answer.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("answer rejected".into()));
        }
        self.in_call.lock().unwrap().insert(friend);
        Ok(())
    }

    async fn call_control(&self, friend: FriendId, control: CallControl) -> TransportResult<()> {
        if self.fail_control.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("control rejected".into()));
        }
        if control == CallControl::Cancel {
            if !self.in_call.lock().unwrap().remove(&friend) {
                return Err(TransportError::InvalidArgument(format!(
                    "friend {} not in a call",
                    friend
                )));
            }
            self.cancels.lock().unwrap().push(friend);
        }
        Ok(())
    }

    async fn audio_set_bit_rate(&self, _friend: FriendId, _bitrate: u32) -> TransportResult<()> {
        Ok(())
    }

    async fn video_set_bit_rate(&self, friend: FriendId, bitrate: u32) -> TransportResult<()> {
        self.video_bitrates.lock().unwrap().push((friend, bitrate));
        Ok(())
    }

    async fn option_set(
        &self,
        friend: FriendId,
        option: EncoderOption,
        value: i64,
    ) -> TransportResult<()> {
        self.option_sets.lock().unwrap().push((friend, option, value));
        Ok(())
    }

    async fn audio_send_frame(
        &self,
        _friend: FriendId,
        pcm: &[i16],
        _channels: u8,
        _rate: u32,
    ) -> TransportResult<()> {
        self.audio_attempts.fetch_add(1, Ordering::SeqCst);
        if self.sync_failures.load(Ordering::SeqCst) > 0 {
            self.sync_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(TransportError::Sync);
        }
        self.audio_sent.lock().unwrap().push(pcm.to_vec());
        Ok(())
    }

    async fn video_send_frame(
        &self,
        _friend: FriendId,
        width: u16,
        height: u16,
        _y: &[u8],
        _u: &[u8],
        _v: &[u8],
    ) -> TransportResult<()> {
        self.video_sent.lock().unwrap().push((width, height));
        Ok(())
    }

    async fn group_send_audio(
        &self,
        _group: GroupId,
        _pcm: &[i16],
        _channels: u8,
        _rate: u32,
    ) -> TransportResult<()> {
        self.group_audio_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn iterate(&self) {
        self.iterations.fetch_add(1, Ordering::SeqCst);
    }

    async fn iteration_interval(&self) -> Duration {
        Duration::from_millis(20)
    }
}

/// Engine over a mock transport with default settings.
pub fn make_engine(transport: Arc<MockTransport>) -> (AvEngine, Arc<StaticSettings>) {
    init_tracing();
    let settings = Arc::new(StaticSettings::default());
    let engine = AvEngine::new(
        transport,
        Arc::new(NullAudioBackend),
        settings.clone(),
        settings.clone(),
    )
    .expect("engine construction");
    (engine, settings)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
