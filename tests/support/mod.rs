// SPDX-License-Identifier: MPL-2.0
//! Shared fakes for the playback integration tests: a scripted extractor
//! and sources, an identity decoder factory, a recording renderer, a
//! clock-backed fake audio player, and a notification-recording listener.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

use storyboard_player::audio::{
    AudioMixSettings, AudioObserver, AudioPlayer, AudioPlayerFactory, AudioSink, PcmFileHandle,
    SharedAudioPlayer,
};
use storyboard_player::error::{PlayerError, Result};
use storyboard_player::listener::{Notification, PlayerListener};
use storyboard_player::media::{
    DataSource, DecoderFactory, ExtractorFactory, ExtractorFlags, FrameBuffer, MediaExtractor,
    MediaFormat, MediaSource, ReadEvent, ReadOptions, SharedSource, StreamStatus,
};
use storyboard_player::player::{PlayerComponents, PreviewPlayer};
use storyboard_player::render::{RenderInput, RendererFactory, RenderingMode, TargetWindow};

// ---------------------------------------------------------------------------
// Listener

pub struct RecordingListener {
    tx: Sender<Notification>,
    log: Mutex<Vec<Notification>>,
}

impl RecordingListener {
    pub fn create() -> (Arc<RecordingListener>, Receiver<Notification>) {
        let (tx, rx) = unbounded();
        (
            Arc::new(RecordingListener {
                tx,
                log: Mutex::new(Vec::new()),
            }),
            rx,
        )
    }

    pub fn log(&self) -> Vec<Notification> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PlayerListener for RecordingListener {
    fn notify(&self, notification: Notification) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
        let _ = self.tx.send(notification);
    }
}

/// Blocks until a notification matching `pred` arrives, or the timeout
/// elapses.
pub fn wait_for(
    rx: &Receiver<Notification>,
    timeout: Duration,
    pred: impl Fn(&Notification) -> bool,
) -> Option<Notification> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match rx.recv_timeout(remaining) {
            Ok(notification) if pred(&notification) => return Some(notification),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted sources and extractor

/// Shape of a scripted clip behind the fake extractor.
#[derive(Clone)]
pub struct ClipSpec {
    pub duration_us: i64,
    pub frame_interval_us: i64,
    pub with_video: bool,
    pub with_audio: bool,
    pub can_seek: bool,
    /// Extra decode latency injected before the frame at a given pts.
    pub read_delays: HashMap<i64, Duration>,
    pub width: u32,
    pub height: u32,
}

impl Default for ClipSpec {
    fn default() -> Self {
        Self {
            duration_us: 10_000_000,
            frame_interval_us: 100_000,
            with_video: true,
            with_audio: true,
            can_seek: true,
            read_delays: HashMap::new(),
            width: 320,
            height: 240,
        }
    }
}

/// Video source emitting zero-filled frames on a fixed timestamp grid.
pub struct ScriptedVideoSource {
    spec: ClipSpec,
    next_ts_us: i64,
    started: bool,
}

impl ScriptedVideoSource {
    pub fn new(spec: ClipSpec) -> Self {
        Self {
            spec,
            next_ts_us: 0,
            started: false,
        }
    }
}

impl MediaSource for ScriptedVideoSource {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        self.next_ts_us = 0;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn read(&mut self, options: &ReadOptions) -> ReadEvent {
        if !self.started {
            return ReadEvent::Error(PlayerError::InvalidState("scripted source not started"));
        }
        if let Some((target_us, _mode)) = options.seek_target() {
            let interval = self.spec.frame_interval_us;
            self.next_ts_us = (target_us + interval - 1) / interval * interval;
        }
        if self.next_ts_us >= self.spec.duration_us {
            return ReadEvent::EndOfStream;
        }
        if let Some(delay) = self.spec.read_delays.get(&self.next_ts_us) {
            std::thread::sleep(*delay);
        }
        let frame = FrameBuffer::new(vec![0u8; 16], self.next_ts_us);
        self.next_ts_us += self.spec.frame_interval_us;
        ReadEvent::Frame(frame)
    }

    fn format(&self) -> MediaFormat {
        MediaFormat {
            mime: "video/avc".into(),
            decoder_component: "ScriptedVideoSource".into(),
            width: self.spec.width,
            height: self.spec.height,
            duration_us: Some(self.spec.duration_us),
            ..MediaFormat::default()
        }
    }
}

/// Raw PCM audio source that is deliberately *not* a dummy source, so the
/// audio-player swap rules treat it as real audio.
pub struct ScriptedAudioSource {
    duration_us: i64,
    position_us: i64,
    started: bool,
}

impl ScriptedAudioSource {
    pub fn new(duration_us: i64) -> Self {
        Self {
            duration_us,
            position_us: 0,
            started: false,
        }
    }
}

impl MediaSource for ScriptedAudioSource {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        self.position_us = 0;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn read(&mut self, options: &ReadOptions) -> ReadEvent {
        if !self.started {
            return ReadEvent::Error(PlayerError::InvalidState("scripted source not started"));
        }
        if let Some((target_us, _mode)) = options.seek_target() {
            self.position_us = target_us.clamp(0, self.duration_us);
        }
        if self.position_us >= self.duration_us {
            return ReadEvent::EndOfStream;
        }
        let chunk_us = 20_000.min(self.duration_us - self.position_us);
        let samples = (32_000 * chunk_us / 1_000_000) as usize * 2;
        let frame = FrameBuffer::new(vec![0u8; samples * 2], self.position_us);
        self.position_us += chunk_us;
        ReadEvent::Frame(frame)
    }

    fn format(&self) -> MediaFormat {
        MediaFormat {
            mime: "audio/raw".into(),
            decoder_component: "ScriptedPcmSource".into(),
            duration_us: Some(self.duration_us),
            sample_rate: 32_000,
            channel_count: 2,
            ..MediaFormat::default()
        }
    }
}

pub struct FakeExtractor {
    spec: ClipSpec,
}

impl MediaExtractor for FakeExtractor {
    fn track_count(&self) -> usize {
        usize::from(self.spec.with_video) + usize::from(self.spec.with_audio)
    }

    fn track_format(&self, index: usize) -> Option<MediaFormat> {
        match (self.spec.with_video, index) {
            (true, 0) => Some(ScriptedVideoSource::new(self.spec.clone()).format()),
            (true, 1) | (false, 0) if self.spec.with_audio => {
                Some(ScriptedAudioSource::new(self.spec.duration_us).format())
            }
            _ => None,
        }
    }

    fn track(&mut self, index: usize) -> Result<Box<dyn MediaSource>> {
        match (self.spec.with_video, index) {
            (true, 0) => Ok(Box::new(ScriptedVideoSource::new(self.spec.clone()))),
            (true, 1) | (false, 0) if self.spec.with_audio => {
                Ok(Box::new(ScriptedAudioSource::new(self.spec.duration_us)))
            }
            _ => Err(PlayerError::SourceOpen(format!("no track {index}")).into()),
        }
    }

    fn flags(&self) -> ExtractorFlags {
        if self.spec.can_seek {
            ExtractorFlags::default().with(ExtractorFlags::CAN_SEEK)
        } else {
            ExtractorFlags::default()
        }
    }
}

#[derive(Default)]
pub struct FakeExtractorFactory {
    clips: Mutex<HashMap<String, ClipSpec>>,
}

impl FakeExtractorFactory {
    pub fn insert(&self, uri: &str, spec: ClipSpec) {
        self.clips
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.to_string(), spec);
    }
}

impl ExtractorFactory for FakeExtractorFactory {
    fn create(&self, source: &DataSource) -> Result<Box<dyn MediaExtractor>> {
        let uri = source
            .uri()
            .ok_or_else(|| PlayerError::SourceOpen("file ranges unsupported".into()))?;
        let spec = self
            .clips
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
            .ok_or_else(|| PlayerError::SourceOpen(format!("unknown clip {uri}")))?;
        Ok(Box::new(FakeExtractor { spec }))
    }
}

/// Tracks from the fake extractor are already decoded; pass them through.
pub struct IdentityDecoders;

impl DecoderFactory for IdentityDecoders {
    fn create_video_decoder(
        &self,
        track: Box<dyn MediaSource>,
        _target: TargetWindow,
    ) -> Result<Box<dyn MediaSource>> {
        Ok(track)
    }

    fn create_audio_decoder(&self, track: Box<dyn MediaSource>) -> Result<Box<dyn MediaSource>> {
        Ok(track)
    }
}

// ---------------------------------------------------------------------------
// Renderer

#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub time_us: i64,
    pub effects: u32,
    pub mode: RenderingMode,
    pub is_still: bool,
}

pub type FrameLog = Arc<Mutex<Vec<RenderedFrame>>>;

pub struct RecordingRendererFactory {
    pub frames: FrameLog,
    pub overlays: Arc<Mutex<Vec<(usize, bool)>>>,
}

impl RecordingRendererFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frames: Arc::new(Mutex::new(Vec::new())),
            overlays: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

impl RendererFactory for RecordingRendererFactory {
    fn create_render_input(&self) -> Box<dyn RenderInput> {
        Box::new(RecordingRenderer {
            frames: Arc::clone(&self.frames),
        })
    }

    fn set_framing_overlay(&self, effect_index: usize, rgba: Option<Arc<Vec<u8>>>) {
        self.overlays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((effect_index, rgba.is_some()));
    }
}

struct RecordingRenderer {
    frames: FrameLog,
}

impl RenderInput for RecordingRenderer {
    fn render(
        &mut self,
        frame: &FrameBuffer,
        effects: storyboard_player::effects::EffectMask,
        mode: RenderingMode,
        is_still_image: bool,
    ) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RenderedFrame {
                time_us: frame.time_us,
                effects: effects.bits(),
                mode,
                is_still: is_still_image,
            });
    }

    fn update_video_size(&mut self, _format: &MediaFormat) {}

    fn target_window(&self) -> TargetWindow {
        TargetWindow(1)
    }
}

// ---------------------------------------------------------------------------
// Audio player

struct FakeAudioState {
    source: Option<SharedSource>,
    observer: Option<Arc<dyn AudioObserver>>,
    started: bool,
    paused: bool,
    base_us: i64,
    anchor: Option<Instant>,
    eos: Option<StreamStatus>,
    skim_calls: Vec<(u32, u32, u32)>,
}

/// A clock-backed audio player: the media clock advances in real time
/// while running, freezes on pause, and jumps on seek. Seek completion and
/// (optionally) end-of-stream are reported through the observer from a
/// helper thread, never synchronously.
pub struct FakeAudioPlayer {
    state: Arc<Mutex<FakeAudioState>>,
    seeking: Arc<AtomicBool>,
    announce_eos_after: Option<Duration>,
}

impl FakeAudioPlayer {
    pub fn create() -> SharedAudioPlayer {
        Self::create_with_eos_after(None)
    }

    pub fn create_with_eos_after(eos_after: Option<Duration>) -> SharedAudioPlayer {
        Arc::new(Mutex::new(FakeAudioPlayer {
            state: Arc::new(Mutex::new(FakeAudioState {
                source: None,
                observer: None,
                started: false,
                paused: false,
                base_us: 0,
                anchor: None,
                eos: None,
                skim_calls: Vec::new(),
            })),
            seeking: Arc::new(AtomicBool::new(false)),
            announce_eos_after: eos_after,
        }))
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, FakeAudioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_us(state: &FakeAudioState) -> i64 {
        state.base_us
            + state
                .anchor
                .map(|anchor| anchor.elapsed().as_micros() as i64)
                .unwrap_or(0)
    }
}

impl AudioPlayer for FakeAudioPlayer {
    fn set_source(&mut self, source: SharedSource) -> Result<()> {
        self.lock_state().source = Some(source);
        Ok(())
    }

    fn source(&self) -> Option<SharedSource> {
        self.lock_state().source.clone()
    }

    fn set_observer(&mut self, observer: Arc<dyn AudioObserver>) {
        self.lock_state().observer = Some(observer);
    }

    fn set_mix_settings(&mut self, _settings: AudioMixSettings) {}

    fn set_mix_pcm_handle(&mut self, _handle: Option<PcmFileHandle>) {}

    fn set_mix_storyboard_skim(
        &mut self,
        storyboard_ts_ms: u32,
        begin_cut_ms: u32,
        primary_volume: u32,
    ) {
        self.lock_state()
            .skim_calls
            .push((storyboard_ts_ms, begin_cut_ms, primary_volume));
    }

    fn start(&mut self, _source_already_started: bool) -> Result<()> {
        let observer = {
            let mut state = self.lock_state();
            state.started = true;
            state.paused = false;
            state.anchor = Some(Instant::now());
            state.observer.clone()
        };
        if let (Some(delay), Some(observer)) = (self.announce_eos_after, observer) {
            let state = Arc::clone(&self.state);
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .eos = Some(StreamStatus::EndOfStream);
                observer.post_audio_eos(Duration::ZERO);
            });
        }
        Ok(())
    }

    fn pause(&mut self, _play_pending_samples: bool) {
        let mut state = self.lock_state();
        state.base_us = FakeAudioPlayer::now_us(&state);
        state.anchor = None;
        state.paused = true;
    }

    fn resume(&mut self) {
        let mut state = self.lock_state();
        if state.anchor.is_none() {
            state.anchor = Some(Instant::now());
        }
        state.paused = false;
    }

    fn seek_to(&mut self, time_us: i64) -> Result<()> {
        let observer = {
            let mut state = self.lock_state();
            state.base_us = time_us;
            if state.anchor.is_some() {
                state.anchor = Some(Instant::now());
            }
            state.observer.clone()
        };
        self.seeking.store(true, Ordering::SeqCst);
        let seeking = Arc::clone(&self.seeking);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            seeking.store(false, Ordering::SeqCst);
            if let Some(observer) = observer {
                observer.post_audio_seek_complete();
            }
        });
        Ok(())
    }

    fn media_time_us(&self) -> i64 {
        let state = self.lock_state();
        FakeAudioPlayer::now_us(&state)
    }

    fn media_time_mapping(&self) -> Option<(i64, i64)> {
        None
    }

    fn reached_eos(&self) -> Option<StreamStatus> {
        self.lock_state().eos.clone()
    }

    fn is_seeking(&self) -> bool {
        self.seeking.load(Ordering::SeqCst)
    }

    fn is_started(&self) -> bool {
        self.lock_state().started
    }
}

pub struct FakeAudioPlayerFactory {
    pub created: Mutex<Vec<SharedAudioPlayer>>,
    eos_after: Option<Duration>,
}

impl FakeAudioPlayerFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            created: Mutex::new(Vec::new()),
            eos_after: None,
        })
    }

    pub fn with_eos_after(eos_after: Duration) -> Arc<Self> {
        Arc::new(Self {
            created: Mutex::new(Vec::new()),
            eos_after: Some(eos_after),
        })
    }
}

impl AudioPlayerFactory for FakeAudioPlayerFactory {
    fn create(&self, _sink: Arc<dyn AudioSink>) -> SharedAudioPlayer {
        let player = FakeAudioPlayer::create_with_eos_after(self.eos_after);
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&player));
        player
    }
}

pub struct FakeSink;

impl AudioSink for FakeSink {
    fn sample_rate(&self) -> u32 {
        32_000
    }

    fn channel_count(&self) -> u16 {
        2
    }
}

// ---------------------------------------------------------------------------
// Harness

pub struct Harness {
    pub player: PreviewPlayer,
    pub listener: Arc<RecordingListener>,
    pub notifications: Receiver<Notification>,
    pub frames: FrameLog,
    pub overlays: Arc<Mutex<Vec<(usize, bool)>>>,
    pub extractors: Arc<FakeExtractorFactory>,
    pub audio_players: Arc<FakeAudioPlayerFactory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_audio_players(FakeAudioPlayerFactory::new())
    }

    pub fn with_audio_players(audio_players: Arc<FakeAudioPlayerFactory>) -> Self {
        let extractors = Arc::new(FakeExtractorFactory::default());
        let renderers = RecordingRendererFactory::new();
        let frames = Arc::clone(&renderers.frames);
        let overlays = Arc::clone(&renderers.overlays);

        let player = PreviewPlayer::new(PlayerComponents {
            extractors: Arc::clone(&extractors) as Arc<dyn ExtractorFactory>,
            decoders: Arc::new(IdentityDecoders),
            renderers,
            audio_players: Arc::clone(&audio_players) as Arc<dyn AudioPlayerFactory>,
        });
        player.set_surface(TargetWindow(1));

        let (listener, notifications) = RecordingListener::create();
        let listener_dyn: Arc<dyn PlayerListener> = Arc::clone(&listener) as Arc<dyn PlayerListener>;
        player.set_listener(&listener_dyn);

        Self {
            player,
            listener,
            notifications,
            frames,
            overlays,
            extractors,
            audio_players,
        }
    }

    pub fn rendered(&self) -> Vec<RenderedFrame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn rendered_times(&self) -> Vec<i64> {
        self.rendered().iter().map(|frame| frame.time_us).collect()
    }

    pub fn wait_for(
        &self,
        timeout: Duration,
        pred: impl Fn(&Notification) -> bool,
    ) -> Option<Notification> {
        wait_for(&self.notifications, timeout, pred)
    }
}

/// Writes a raw RGB888 still-image clip and returns its path as a URI.
pub fn write_rgb_clip(dir: &tempfile::TempDir, name: &str, width: u32, height: u32) -> String {
    let path = dir.path().join(name);
    let data = vec![0x55u8; width as usize * height as usize * 3];
    fs::write(&path, data).expect("write rgb fixture");
    path.to_string_lossy().into_owned()
}
