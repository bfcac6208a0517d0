//! Scanner controller: the capture state machine.
//!
//! `Idle → Streaming → Uploading → ShowingResults`, back to `Streaming` when re-armed.
//! All transitions happen under one lock that is never held across an `.await`,
//! so a second trigger while `Uploading` is a no-op and exactly one upload goes out.
//! The stream is stopped before the upload starts and on every switch to portrait.

use crate::camera::{Camera, CameraError, CameraStream};
use crate::config::{CaptureMode, ScannerConfig};
use crate::frame::FrozenFrame;
use crate::results::ScanOutcome;
use crate::sharpness::{is_in_focus, sharpness_score};
use crate::upload::{ScanError, ScanUploader};
use image::DynamicImage;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const SCANNING_MESSAGE: &str = "Scan en cours...";
const FRAME_ERROR_MESSAGE: &str = "Impossible de préparer l'image capturée.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScannerState {
    Idle,
    Streaming,
    Uploading,
    ShowingResults,
}

impl fmt::Display for ScannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScannerState::Idle => write!(f, "idle"),
            ScannerState::Streaming => write!(f, "streaming"),
            ScannerState::Uploading => write!(f, "uploading"),
            ScannerState::ShowingResults => write!(f, "showing results"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn classify(width: u32, height: u32) -> Self {
        if height > width {
            Orientation::Portrait
        } else {
            Orientation::Landscape
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub main_visible: bool,
    pub results_visible: bool,
    pub rotate_prompt_visible: bool,
}

impl Layout {
    fn for_view(orientation: Orientation, showing_results: bool) -> Self {
        match orientation {
            Orientation::Portrait if !showing_results => Layout {
                main_visible: false,
                results_visible: false,
                rotate_prompt_visible: true,
            },
            _ => Layout {
                main_visible: true,
                results_visible: showing_results,
                rotate_prompt_visible: false,
            },
        }
    }
}

/// Role of the single capture button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureButton {
    Capture,
    Busy,
    Reset,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

impl StatusMessage {
    fn info(text: &str) -> Self {
        StatusMessage {
            text: text.to_string(),
            is_error: false,
        }
    }

    fn error(text: &str) -> Self {
        StatusMessage {
            text: text.to_string(),
            is_error: true,
        }
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("failed to encode frame: {0}")]
    Frame(#[from] image::ImageError),

    #[error(transparent)]
    Upload(#[from] ScanError),
}

impl CaptureError {
    pub fn user_message(&self) -> &str {
        match self {
            CaptureError::Camera(e) => e.user_message(),
            CaptureError::Frame(_) => FRAME_ERROR_MESSAGE,
            CaptureError::Upload(e) => e.user_message(),
        }
    }
}

#[derive(Debug)]
pub enum CaptureOutcome {
    /// Busy, or nothing to capture from in this orientation.
    Ignored,
    /// Results cleared or camera reacquired; ready for the next capture.
    Rearmed,
    Completed(ScanOutcome),
    Failed(CaptureError),
}

#[derive(Debug)]
pub enum TickOutcome {
    Skipped,
    Blurry { score: f64 },
    Captured { score: f64, outcome: CaptureOutcome },
    CameraLost(CameraError),
}

/// Inputs the scanner reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScannerInput {
    CaptureRequested,
    FrameTick,
    Resized { width: u32, height: u32 },
}

#[derive(Debug)]
pub enum ScannerUpdate {
    Capture(CaptureOutcome),
    Tick(TickOutcome),
    Layout(Layout),
}

struct Inner {
    state: ScannerState,
    stream: Option<Box<dyn CameraStream>>,
    orientation: Orientation,
    message: Option<StatusMessage>,
    results: Option<ScanOutcome>,
    frozen: Option<FrozenFrame>,
}

impl Inner {
    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!("camera stream released");
        }
    }
}

pub struct ScannerController<C, U> {
    camera: C,
    uploader: U,
    config: ScannerConfig,
    inner: Mutex<Inner>,
}

impl<C: Camera, U: ScanUploader> ScannerController<C, U> {
    pub fn new(camera: C, uploader: U, config: ScannerConfig) -> Self {
        ScannerController {
            camera,
            uploader,
            config,
            inner: Mutex::new(Inner {
                state: ScannerState::Idle,
                stream: None,
                orientation: Orientation::Landscape,
                message: None,
                results: None,
                frozen: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn state(&self) -> ScannerState {
        self.lock().state
    }

    pub fn message(&self) -> Option<StatusMessage> {
        self.lock().message.clone()
    }

    pub fn results(&self) -> Option<ScanOutcome> {
        self.lock().results.clone()
    }

    pub fn frozen_frame(&self) -> Option<FrozenFrame> {
        self.lock().frozen.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().stream.as_ref().is_some_and(|stream| stream.is_active())
    }

    pub fn layout(&self) -> Layout {
        let inner = self.lock();
        Layout::for_view(inner.orientation, inner.state == ScannerState::ShowingResults)
    }

    pub fn capture_button(&self) -> CaptureButton {
        match self.state() {
            ScannerState::Uploading => CaptureButton::Busy,
            ScannerState::ShowingResults => CaptureButton::Reset,
            ScannerState::Idle | ScannerState::Streaming => CaptureButton::Capture,
        }
    }

    pub async fn handle(&self, input: ScannerInput) -> ScannerUpdate {
        match input {
            ScannerInput::CaptureRequested => ScannerUpdate::Capture(self.capture().await),
            ScannerInput::FrameTick => ScannerUpdate::Tick(self.on_frame_tick().await),
            ScannerInput::Resized { width, height } => {
                ScannerUpdate::Layout(self.on_resize(width, height))
            }
        }
    }

    /// Starts the camera if it is not already running and the orientation allows it.
    /// A stream that ended on its own is dropped and reopened.
    /// Returns whether a stream is active afterwards.
    fn ensure_camera(&self, inner: &mut Inner) -> Result<bool, CameraError> {
        match inner.stream.as_ref().map(|stream| stream.is_active()) {
            Some(true) => return Ok(true),
            Some(false) => {
                warn!("camera stream ended, reopening");
                inner.release_stream();
            }
            None => {}
        }
        if inner.orientation == Orientation::Portrait || inner.state == ScannerState::Uploading {
            return Ok(false);
        }

        let wanted = self.config.constraints.facing_mode;
        if self.camera.facing() != wanted {
            warn!(
                ?wanted,
                provided = ?self.camera.facing(),
                "no source with the requested facing, using the available one"
            );
        }

        match self.camera.open(&self.config.constraints) {
            Ok(stream) => {
                inner.stream = Some(stream);
                if inner.state == ScannerState::Idle {
                    inner.state = ScannerState::Streaming;
                    inner.message = None;
                }
                info!(state = %inner.state, "camera started");
                Ok(true)
            }
            Err(e) => {
                error!("camera access failed: {}", e);
                inner.message = Some(StatusMessage::error(e.user_message()));
                Err(e)
            }
        }
    }

    pub async fn capture(&self) -> CaptureOutcome {
        let frozen = {
            let mut inner = self.lock();
            match inner.state {
                ScannerState::Uploading => {
                    debug!("capture ignored: upload in flight");
                    return CaptureOutcome::Ignored;
                }
                ScannerState::ShowingResults => {
                    inner.results = None;
                    inner.frozen = None;
                    inner.state = if inner.stream.is_some() {
                        ScannerState::Streaming
                    } else {
                        ScannerState::Idle
                    };
                    return self.rearm(&mut inner);
                }
                ScannerState::Idle => return self.rearm(&mut inner),
                ScannerState::Streaming => {}
            }

            let frame = match self.grab(&mut inner) {
                Ok(frame) => frame,
                Err(e) => return CaptureOutcome::Failed(e.into()),
            };
            match self.freeze(&mut inner, frame) {
                Ok(frozen) => frozen,
                Err(e) => return CaptureOutcome::Failed(e),
            }
        };

        self.submit(frozen).await
    }

    fn rearm(&self, inner: &mut Inner) -> CaptureOutcome {
        match self.ensure_camera(inner) {
            Ok(true) => CaptureOutcome::Rearmed,
            Ok(false) => CaptureOutcome::Ignored,
            Err(e) => CaptureOutcome::Failed(e.into()),
        }
    }

    /// Sharpness gate; only acts while streaming in auto mode.
    pub async fn on_frame_tick(&self) -> TickOutcome {
        let (score, frozen) = {
            let mut inner = self.lock();
            if self.config.capture_mode != CaptureMode::Auto || inner.state != ScannerState::Streaming {
                return TickOutcome::Skipped;
            }

            let frame = match self.grab(&mut inner) {
                Ok(frame) => frame,
                Err(e) => return TickOutcome::CameraLost(e),
            };
            let score = sharpness_score(&frame);
            if !is_in_focus(score, self.config.sharpness_threshold) {
                return TickOutcome::Blurry { score };
            }

            info!(score, threshold = self.config.sharpness_threshold, "frame in focus, capturing");
            match self.freeze(&mut inner, frame) {
                Ok(frozen) => (score, frozen),
                Err(e) => {
                    return TickOutcome::Captured {
                        score,
                        outcome: CaptureOutcome::Failed(e),
                    };
                }
            }
        };

        let outcome = self.submit(frozen).await;
        TickOutcome::Captured { score, outcome }
    }

    pub fn on_resize(&self, width: u32, height: u32) -> Layout {
        let mut inner = self.lock();
        inner.orientation = Orientation::classify(width, height);

        match inner.orientation {
            Orientation::Portrait => {
                inner.release_stream();
                if inner.state == ScannerState::Streaming {
                    inner.state = ScannerState::Idle;
                }
            }
            Orientation::Landscape => {
                if inner.state != ScannerState::Uploading {
                    // Failure is already reported through the status message.
                    let _ = self.ensure_camera(&mut inner);
                }
            }
        }

        debug!(width, height, orientation = ?inner.orientation, state = %inner.state, "viewport resized");
        Layout::for_view(inner.orientation, inner.state == ScannerState::ShowingResults)
    }

    fn grab(&self, inner: &mut Inner) -> Result<DynamicImage, CameraError> {
        let grabbed = match inner.stream.as_mut() {
            Some(stream) => stream.grab_frame(),
            None => Err(CameraError::Stopped),
        };
        grabbed.inspect_err(|e| {
            warn!("lost camera frame: {}", e);
            inner.release_stream();
            inner.state = ScannerState::Idle;
            inner.message = Some(StatusMessage::error(e.user_message()));
        })
    }

    /// Freezes `frame`: releases the camera, enters `Uploading`, encodes the JPEG.
    fn freeze(&self, inner: &mut Inner, frame: DynamicImage) -> Result<FrozenFrame, CaptureError> {
        inner.release_stream();
        inner.state = ScannerState::Uploading;
        inner.message = Some(StatusMessage::info(SCANNING_MESSAGE));

        match FrozenFrame::encode(&frame, self.config.frame_mode, self.config.jpeg_quality) {
            Ok(frozen) => {
                info!(
                    width = frozen.width,
                    height = frozen.height,
                    size_kb = frozen.size_kb(),
                    "frame frozen"
                );
                inner.frozen = Some(frozen.clone());
                Ok(frozen)
            }
            Err(e) => {
                error!("failed to encode frame: {}", e);
                inner.state = ScannerState::Idle;
                inner.message = Some(StatusMessage::error(FRAME_ERROR_MESSAGE));
                Err(e.into())
            }
        }
    }

    async fn submit(&self, frozen: FrozenFrame) -> CaptureOutcome {
        let result = self.uploader.upload(frozen.jpeg).await;

        let mut inner = self.lock();
        match result {
            Ok(outcome) => {
                inner.results = Some(outcome.clone());
                inner.state = ScannerState::ShowingResults;
                inner.message = None;
                // A failed restart leaves its own message; results stay visible.
                let _ = self.ensure_camera(&mut inner);
                CaptureOutcome::Completed(outcome)
            }
            Err(e) => {
                inner.state = ScannerState::Idle;
                inner.message = Some(StatusMessage::error(e.user_message()));
                CaptureOutcome::Failed(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameMode;
    use crate::upload::GENERIC_SCAN_ERROR;
    use async_trait::async_trait;
    use image::{GrayImage, Luma};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum FakeFrame {
        Flat,
        Sharp,
    }

    impl FakeFrame {
        fn render(self) -> DynamicImage {
            match self {
                FakeFrame::Flat => DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 40, Luma([120]))),
                FakeFrame::Sharp => DynamicImage::ImageLuma8(GrayImage::from_fn(64, 40, |x, y| {
                    if ((x / 4) + (y / 4)) % 2 == 0 { Luma([0]) } else { Luma([255]) }
                })),
            }
        }
    }

    #[derive(Clone, Default)]
    struct Counters {
        opens: Arc<AtomicUsize>,
        live: Arc<AtomicIsize>,
        uploads: Arc<AtomicUsize>,
        uploaded_while_streaming: Arc<AtomicBool>,
    }

    struct FakeCamera {
        counters: Counters,
        frames: Vec<FakeFrame>,
        fail_with: Option<fn() -> CameraError>,
    }

    struct FakeStream {
        counters: Counters,
        frames: Vec<FakeFrame>,
        cursor: usize,
        active: bool,
    }

    impl Camera for FakeCamera {
        fn open(&self, _: &crate::camera::CameraConstraints) -> Result<Box<dyn CameraStream>, CameraError> {
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            self.counters.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                counters: self.counters.clone(),
                frames: self.frames.clone(),
                cursor: 0,
                active: true,
            }))
        }
    }

    impl CameraStream for FakeStream {
        fn grab_frame(&mut self) -> Result<DynamicImage, CameraError> {
            if !self.active {
                return Err(CameraError::Stopped);
            }
            let frame = self.frames[self.cursor.min(self.frames.len() - 1)];
            self.cursor += 1;
            Ok(frame.render())
        }

        fn stop(&mut self) {
            if self.active {
                self.active = false;
                self.counters.live.fetch_sub(1, Ordering::SeqCst);
            }
        }

        fn is_active(&self) -> bool {
            self.active
        }
    }

    struct FakeUploader {
        counters: Counters,
        reply: Result<ScanOutcome, ScanError>,
    }

    #[async_trait]
    impl ScanUploader for FakeUploader {
        async fn upload(&self, jpeg: Vec<u8>) -> Result<ScanOutcome, ScanError> {
            assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
            self.counters.uploads.fetch_add(1, Ordering::SeqCst);
            if self.counters.live.load(Ordering::SeqCst) != 0 {
                self.counters.uploaded_while_streaming.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.reply.clone()
        }
    }

    fn extracted() -> ScanOutcome {
        let raw = json!({ "nom": "MARTIN", "prenom": "Léa", "licence": "1234567B" });
        ScanOutcome::Extracted {
            result: serde_json::from_value(raw.clone()).unwrap(),
            raw,
        }
    }

    fn controller(
        frames: Vec<FakeFrame>,
        reply: Result<ScanOutcome, ScanError>,
        mode: CaptureMode,
    ) -> (ScannerController<FakeCamera, FakeUploader>, Counters) {
        let counters = Counters::default();
        let config = ScannerConfig {
            capture_mode: mode,
            frame_mode: FrameMode::Fit { width: 80, height: 50 },
            ..ScannerConfig::default()
        };
        let camera = FakeCamera { counters: counters.clone(), frames, fail_with: None };
        let uploader = FakeUploader { counters: counters.clone(), reply };
        (ScannerController::new(camera, uploader, config), counters)
    }

    #[tokio::test]
    async fn test_manual_capture_full_cycle() {
        let (ctrl, counters) = controller(vec![FakeFrame::Flat], Ok(extracted()), CaptureMode::Manual);
        ctrl.on_resize(1280, 720);
        assert_eq!(ctrl.state(), ScannerState::Streaming);
        assert_eq!(ctrl.capture_button(), CaptureButton::Capture);

        let outcome = ctrl.capture().await;
        assert!(matches!(outcome, CaptureOutcome::Completed(ScanOutcome::Extracted { .. })));
        assert_eq!(ctrl.state(), ScannerState::ShowingResults);
        assert_eq!(ctrl.capture_button(), CaptureButton::Reset);
        assert!(ctrl.results().is_some());
        assert_eq!(ctrl.message(), None);
        assert!(!counters.uploaded_while_streaming.load(Ordering::SeqCst));
        // Camera restarted behind the results.
        assert!(ctrl.is_streaming());
        assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
        let frozen = ctrl.frozen_frame().unwrap();
        assert_eq!((frozen.width, frozen.height), (80, 50));

        // Reset role: clears results and goes back to streaming.
        assert!(matches!(ctrl.capture().await, CaptureOutcome::Rearmed));
        assert_eq!(ctrl.state(), ScannerState::Streaming);
        assert!(ctrl.results().is_none());
    }

    #[tokio::test]
    async fn test_double_trigger_sends_one_upload() {
        let (ctrl, counters) = controller(vec![FakeFrame::Flat], Ok(extracted()), CaptureMode::Manual);
        ctrl.on_resize(1280, 720);

        let (first, second) = tokio::join!(ctrl.capture(), ctrl.capture());
        assert!(matches!(first, CaptureOutcome::Completed(_)));
        assert!(matches!(second, CaptureOutcome::Ignored));
        assert_eq!(counters.uploads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_shows_exact_message_and_is_retryable() {
        let reply = Err(ScanError::Server { status: 500, message: "X".to_string() });
        let (ctrl, counters) = controller(vec![FakeFrame::Flat], reply, CaptureMode::Manual);
        ctrl.on_resize(1280, 720);

        let outcome = ctrl.capture().await;
        assert!(matches!(outcome, CaptureOutcome::Failed(CaptureError::Upload(_))));
        assert_eq!(ctrl.message(), Some(StatusMessage { text: "X".to_string(), is_error: true }));
        assert_eq!(ctrl.state(), ScannerState::Idle);
        assert_eq!(ctrl.capture_button(), CaptureButton::Capture);
        // No automatic reacquisition after a failure.
        assert!(!ctrl.is_streaming());
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);

        // Retry: first press reacquires, second press uploads again.
        assert!(matches!(ctrl.capture().await, CaptureOutcome::Rearmed));
        assert!(matches!(ctrl.capture().await, CaptureOutcome::Failed(_)));
        assert_eq!(counters.uploads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unparseable_error_uses_fallback_message() {
        let reply = Err(ScanError::Server { status: 502, message: GENERIC_SCAN_ERROR.to_string() });
        let (ctrl, _) = controller(vec![FakeFrame::Flat], reply, CaptureMode::Manual);
        ctrl.on_resize(1280, 720);
        ctrl.capture().await;
        assert_eq!(ctrl.message().unwrap().text, GENERIC_SCAN_ERROR);
        assert_eq!(ctrl.state(), ScannerState::Idle);
    }

    #[tokio::test]
    async fn test_auto_capture_waits_for_sharp_frame() {
        let frames = vec![FakeFrame::Flat, FakeFrame::Flat, FakeFrame::Sharp];
        let (ctrl, counters) = controller(frames, Ok(extracted()), CaptureMode::Auto);
        ctrl.on_resize(1280, 720);

        assert!(matches!(ctrl.on_frame_tick().await, TickOutcome::Blurry { score } if score == 0.0));
        assert!(matches!(ctrl.on_frame_tick().await, TickOutcome::Blurry { .. }));
        match ctrl.on_frame_tick().await {
            TickOutcome::Captured { score, outcome } => {
                assert!(score > 100.0);
                assert!(matches!(outcome, CaptureOutcome::Completed(_)));
            }
            other => panic!("expected capture, got {:?}", other),
        }
        assert_eq!(counters.uploads.load(Ordering::SeqCst), 1);
        assert!(!counters.uploaded_while_streaming.load(Ordering::SeqCst));
        // Ticks are no-ops while results are shown.
        assert!(matches!(ctrl.on_frame_tick().await, TickOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_threshold_is_configurable() {
        let counters = Counters::default();
        let config = ScannerConfig {
            capture_mode: CaptureMode::Auto,
            sharpness_threshold: f64::MAX,
            ..ScannerConfig::default()
        };
        let camera = FakeCamera { counters: counters.clone(), frames: vec![FakeFrame::Sharp], fail_with: None };
        let uploader = FakeUploader { counters: counters.clone(), reply: Ok(extracted()) };
        let ctrl = ScannerController::new(camera, uploader, config);
        ctrl.on_resize(1280, 720);
        assert!(matches!(ctrl.on_frame_tick().await, TickOutcome::Blurry { .. }));
        assert_eq!(counters.uploads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_manual_mode_ignores_ticks() {
        let (ctrl, _) = controller(vec![FakeFrame::Sharp], Ok(extracted()), CaptureMode::Manual);
        ctrl.on_resize(1280, 720);
        assert!(matches!(ctrl.on_frame_tick().await, TickOutcome::Skipped));
    }

    #[test]
    fn test_portrait_stops_stream_and_landscape_restarts() {
        let (ctrl, counters) = controller(vec![FakeFrame::Flat], Ok(extracted()), CaptureMode::Manual);
        let layout = ctrl.on_resize(1280, 720);
        assert!(layout.main_visible && !layout.rotate_prompt_visible);
        assert_eq!(counters.live.load(Ordering::SeqCst), 1);

        let layout = ctrl.on_resize(720, 1280);
        assert_eq!(
            layout,
            Layout { main_visible: false, results_visible: false, rotate_prompt_visible: true }
        );
        assert_eq!(ctrl.state(), ScannerState::Idle);
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);

        ctrl.on_resize(1280, 720);
        assert_eq!(ctrl.state(), ScannerState::Streaming);
        assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_portrait_keeps_results_visible() {
        let (ctrl, counters) = controller(vec![FakeFrame::Flat], Ok(extracted()), CaptureMode::Manual);
        ctrl.on_resize(1280, 720);
        ctrl.capture().await;

        let layout = ctrl.on_resize(720, 1280);
        assert_eq!(
            layout,
            Layout { main_visible: true, results_visible: true, rotate_prompt_visible: false }
        );
        assert_eq!(ctrl.state(), ScannerState::ShowingResults);
        assert_eq!(counters.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_camera_errors_leave_scanner_idle_with_message() {
        let cases: [(fn() -> CameraError, &str); 3] = [
            (|| CameraError::PermissionDenied("denied".into()), "refusé"),
            (|| CameraError::NotFound("none".into()), "Aucune caméra"),
            (|| CameraError::Other("boom".into()), "Impossible d'accéder"),
        ];
        for (fail, expected) in cases {
            let counters = Counters::default();
            let camera = FakeCamera { counters: counters.clone(), frames: vec![FakeFrame::Flat], fail_with: Some(fail) };
            let uploader = FakeUploader { counters, reply: Ok(extracted()) };
            let ctrl = ScannerController::new(camera, uploader, ScannerConfig::default());
            ctrl.on_resize(1280, 720);
            assert_eq!(ctrl.state(), ScannerState::Idle);
            let message = ctrl.message().unwrap();
            assert!(message.is_error);
            assert!(message.text.contains(expected), "{:?} should mention {:?}", message.text, expected);
        }
    }

    #[tokio::test]
    async fn test_resize_during_upload_does_not_reopen_camera() {
        let (ctrl, counters) = controller(vec![FakeFrame::Flat], Ok(extracted()), CaptureMode::Manual);
        ctrl.on_resize(1280, 720);

        let (outcome, (seen, opens_during)) = tokio::join!(ctrl.capture(), async {
            let seen = ctrl.state();
            ctrl.on_resize(720, 1280);
            let layout = ctrl.on_resize(1280, 720);
            assert!(layout.main_visible);
            (seen, counters.opens.load(Ordering::SeqCst))
        });

        assert_eq!(seen, ScannerState::Uploading);
        assert_eq!(opens_during, 1);
        assert!(matches!(outcome, CaptureOutcome::Completed(_)));
        // Only the post-success restart opens the camera again.
        assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
        assert_eq!(counters.live.load(Ordering::SeqCst), 1);
        assert_eq!(ctrl.state(), ScannerState::ShowingResults);
    }

    #[tokio::test]
    async fn test_portrait_mid_upload_suppresses_restart() {
        let (ctrl, counters) = controller(vec![FakeFrame::Flat], Ok(extracted()), CaptureMode::Manual);
        ctrl.on_resize(1280, 720);

        let (outcome, _) = tokio::join!(ctrl.capture(), async { ctrl.on_resize(720, 1280) });
        assert!(matches!(outcome, CaptureOutcome::Completed(_)));
        assert_eq!(ctrl.state(), ScannerState::ShowingResults);
        assert!(!ctrl.is_streaming());
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
        assert_eq!(
            ctrl.layout(),
            Layout { main_visible: true, results_visible: true, rotate_prompt_visible: false }
        );

        ctrl.on_resize(1280, 720);
        assert!(ctrl.is_streaming());
        assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
        assert_eq!(ctrl.state(), ScannerState::ShowingResults);
    }

    #[tokio::test]
    async fn test_ended_stream_is_reopened() {
        let (ctrl, counters) = controller(vec![FakeFrame::Flat], Ok(extracted()), CaptureMode::Manual);
        ctrl.on_resize(1280, 720);
        if let Some(stream) = ctrl.lock().stream.as_mut() {
            stream.stop();
        }
        ctrl.on_resize(1280, 720);
        assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
        assert!(matches!(ctrl.capture().await, CaptureOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_input_dispatch() {
        let (ctrl, _) = controller(vec![FakeFrame::Flat], Ok(extracted()), CaptureMode::Manual);
        let update = ctrl.handle(ScannerInput::Resized { width: 720, height: 1280 }).await;
        assert!(matches!(update, ScannerUpdate::Layout(Layout { rotate_prompt_visible: true, .. })));
        // Portrait: nothing to capture from.
        let update = ctrl.handle(ScannerInput::CaptureRequested).await;
        assert!(matches!(update, ScannerUpdate::Capture(CaptureOutcome::Ignored)));
        assert!(!ctrl.is_streaming());
    }
}
