// src/video.rs

use crate::error::{Error, Result};
use crate::image_io::{bgr_mat_to_frame, frame_to_bgr_mat};
use crate::pipeline::TrackedFrameOutcome;
use crate::storage::ArtifactStore;
use crate::types::{Frame, TrackState, VideoSummary};
use opencv::{
    core::{Mat, Size},
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Lazy, forward-only frame producer. A video decodes once; there is no
/// rewind.
pub trait FrameSource {
    fn fps(&self) -> f64;
    fn frame_size(&self) -> (usize, usize);
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Ordered frame consumer that encodes into a byte artifact on `finish`.
pub trait FrameSink {
    fn write(&mut self, frame: &Frame) -> Result<()>;
    fn finish(&mut self) -> Result<Vec<u8>>;
}

/// OpenCV-backed video decoder.
pub struct VideoReader {
    cap: VideoCapture,
    fps: f64,
    total_frames: i32,
    current_frame: i32,
    width: i32,
    height: i32,
}

impl VideoReader {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening video: {}", path.display());

        let path_str = path
            .to_str()
            .ok_or_else(|| Error::InvalidInput("non-UTF-8 video path".into()))?;
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)
            .map_err(|e| Error::InvalidInput(format!("video open: {e}")))?;
        if !cap.is_opened().map_err(video_err)? {
            return Err(Error::InvalidInput("could not open video file".into()));
        }

        let fps = cap.get(videoio::CAP_PROP_FPS).map_err(video_err)?;
        let total_frames = cap.get(videoio::CAP_PROP_FRAME_COUNT).map_err(video_err)? as i32;
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).map_err(video_err)? as i32;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).map_err(video_err)? as i32;

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames",
            width, height, fps, total_frames
        );

        Ok(Self {
            cap,
            fps,
            total_frames,
            current_frame: 0,
            width,
            height,
        })
    }

    pub fn progress(&self) -> f32 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (self.current_frame as f32 / self.total_frames as f32) * 100.0
    }
}

impl FrameSource for VideoReader {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_size(&self) -> (usize, usize) {
        (self.width as usize, self.height as usize)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();
        if !self.cap.read(&mut mat).map_err(video_err)? || mat.empty() {
            return Ok(None);
        }

        self.current_frame += 1;
        let timestamp_ms = if self.fps > 0.0 {
            (self.current_frame as f64 / self.fps) * 1000.0
        } else {
            0.0
        };

        Ok(Some(bgr_mat_to_frame(&mat, timestamp_ms)?))
    }
}

/// Encodes frames into a scoped temp file; the file is removed when the
/// sink drops, so aborted runs never leave a partial artifact behind.
pub struct VideoFileSink {
    writer: VideoWriter,
    temp: NamedTempFile,
}

impl VideoFileSink {
    pub fn create(fps: f64, width: usize, height: usize) -> Result<Self> {
        let temp = tempfile::Builder::new()
            .suffix(".mp4")
            .tempfile()
            .map_err(|e| Error::Encoding(format!("output temp file: {e}")))?;

        let path_str = temp
            .path()
            .to_str()
            .ok_or_else(|| Error::Encoding("non-UTF-8 temp path".into()))?;
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v').map_err(encode_err)?;
        let writer = VideoWriter::new(
            path_str,
            fourcc,
            fps,
            Size::new(width as i32, height as i32),
            true,
        )
        .map_err(encode_err)?;
        if !writer.is_opened().map_err(encode_err)? {
            return Err(Error::Encoding("video encoder failed to open".into()));
        }

        Ok(Self { writer, temp })
    }
}

impl FrameSink for VideoFileSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let mat = frame_to_bgr_mat(frame)?;
        self.writer.write(&mat).map_err(encode_err)
    }

    fn finish(&mut self) -> Result<Vec<u8>> {
        self.writer.release().map_err(encode_err)?;
        let bytes = std::fs::read(self.temp.path())?;
        if bytes.is_empty() {
            return Err(Error::Encoding("encoded video artifact is empty".into()));
        }
        Ok(bytes)
    }
}

/// Drive one video through the pipeline.
///
/// Every `frame_skip`-th frame (0-indexed, so frame 0 always) goes through
/// `pipeline_fn`; the rest are written through display-normalized but
/// untouched, keeping output duration equal to input. Area contributions
/// accumulate into one session-local `TrackState` that dies with this
/// call. The video either fully succeeds or fails with an error — a
/// truncated artifact is never stored.
pub fn process_video<S, K, F>(
    source: &mut S,
    frame_skip: usize,
    mut pipeline_fn: F,
    sink: &mut K,
    store: &dyn ArtifactStore,
) -> Result<VideoSummary>
where
    S: FrameSource,
    K: FrameSink,
    F: FnMut(Frame, &mut TrackState) -> Result<TrackedFrameOutcome>,
{
    if frame_skip == 0 {
        return Err(Error::InvalidInput("frame_skip must be at least 1".into()));
    }

    let mut state = TrackState::new();
    let mut index: u64 = 0;
    let mut sampled: u64 = 0;

    while let Some(frame) = source.next_frame()? {
        if index % frame_skip as u64 == 0 {
            let outcome = pipeline_fn(frame, &mut state)?;
            state.absorb(outcome.total_area, outcome.affected_area);
            sink.write(&outcome.frame)?;
            sampled += 1;
            if sampled % 50 == 0 {
                debug!("sampled {} frames so far", sampled);
            }
        } else {
            sink.write(&frame.into_display())?;
        }
        index += 1;
    }

    if index == 0 {
        return Err(Error::Encoding("video opened but yielded no frames".into()));
    }

    let artifact = sink.finish()?;
    if artifact.is_empty() {
        return Err(Error::Encoding("encoded video artifact is empty".into()));
    }
    let output_ref = store.store(&artifact, "annotated.mp4")?;

    info!(
        "✓ Video complete: {} frames ({} sampled), coverage {:.2}%, {} unique corals",
        index,
        sampled,
        state.coverage_ratio() * 100.0,
        state.unique_corals()
    );

    Ok(VideoSummary {
        output_ref,
        coverage_ratio: state.coverage_ratio(),
        unique_corals: state.unique_corals(),
    })
}

fn video_err(err: opencv::Error) -> Error {
    Error::InvalidInput(format!("video decode: {err}"))
}

fn encode_err(err: opencv::Error) -> Error {
    Error::Encoding(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelOrder;
    use std::cell::RefCell;

    struct VecSource {
        frames: Vec<Frame>,
        cursor: usize,
    }

    impl VecSource {
        fn with_frames(count: usize) -> Self {
            let frames = (0..count)
                .map(|i| Frame::new(vec![i as u8; 4 * 4 * 3], 4, 4, i as f64, PixelOrder::Bgr))
                .collect();
            Self { frames, cursor: 0 }
        }
    }

    impl FrameSource for VecSource {
        fn fps(&self) -> f64 {
            20.0
        }

        fn frame_size(&self) -> (usize, usize) {
            (4, 4)
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            let frame = self.frames.get(self.cursor).cloned();
            self.cursor += 1;
            Ok(frame)
        }
    }

    struct VecSink {
        written: Vec<Frame>,
        artifact: Vec<u8>,
    }

    impl VecSink {
        fn new() -> Self {
            Self {
                written: Vec::new(),
                artifact: b"encoded".to_vec(),
            }
        }
    }

    impl FrameSink for VecSink {
        fn write(&mut self, frame: &Frame) -> Result<()> {
            self.written.push(frame.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<Vec<u8>> {
            Ok(self.artifact.clone())
        }
    }

    struct RecordingStore {
        stored: RefCell<Vec<Vec<u8>>>,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                stored: RefCell::new(Vec::new()),
            }
        }
    }

    impl ArtifactStore for RecordingStore {
        fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
            self.stored.borrow_mut().push(bytes.to_vec());
            Ok(format!("local://{suggested_name}"))
        }
    }

    fn passthrough(frame: Frame, _state: &mut TrackState) -> Result<TrackedFrameOutcome> {
        Ok(TrackedFrameOutcome {
            frame: frame.into_display(),
            coverage_ratio: 0.0,
            total_area: 0.0,
            affected_area: 0.0,
        })
    }

    #[test]
    fn test_frame_skip_five_samples_indices_0_and_5() {
        let mut source = VecSource::with_frames(10);
        let mut sink = VecSink::new();
        let store = RecordingStore::new();

        let sampled = RefCell::new(Vec::new());
        process_video(
            &mut source,
            5,
            |frame, state| {
                sampled.borrow_mut().push(frame.timestamp_ms);
                passthrough(frame, state)
            },
            &mut sink,
            &store,
        )
        .unwrap();

        assert_eq!(*sampled.borrow(), vec![0.0, 5.0]);
        // Unsampled frames still reach the sink, in order.
        assert_eq!(sink.written.len(), 10);
    }

    #[test]
    fn test_frame_skip_one_samples_everything() {
        let mut source = VecSource::with_frames(3);
        let mut sink = VecSink::new();
        let store = RecordingStore::new();

        let count = RefCell::new(0u32);
        process_video(
            &mut source,
            1,
            |frame, state| {
                *count.borrow_mut() += 1;
                passthrough(frame, state)
            },
            &mut sink,
            &store,
        )
        .unwrap();

        assert_eq!(*count.borrow(), 3);
    }

    #[test]
    fn test_zero_frame_skip_is_invalid_input() {
        let mut source = VecSource::with_frames(3);
        let mut sink = VecSink::new();
        let store = RecordingStore::new();

        let err = process_video(&mut source, 0, passthrough, &mut sink, &store).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_zero_frames_decoded_is_encoding_error() {
        let mut source = VecSource::with_frames(0);
        let mut sink = VecSink::new();
        let store = RecordingStore::new();

        let err = process_video(&mut source, 1, passthrough, &mut sink, &store).unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
        assert!(store.stored.borrow().is_empty());
    }

    #[test]
    fn test_empty_artifact_is_encoding_error() {
        let mut source = VecSource::with_frames(2);
        let mut sink = VecSink::new();
        sink.artifact = Vec::new();
        let store = RecordingStore::new();

        let err = process_video(&mut source, 1, passthrough, &mut sink, &store).unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
        assert!(store.stored.borrow().is_empty());
    }

    #[test]
    fn test_summary_accumulates_area_totals() {
        let mut source = VecSource::with_frames(4);
        let mut sink = VecSink::new();
        let store = RecordingStore::new();

        let summary = process_video(
            &mut source,
            1,
            |frame, state| {
                state.observe(1);
                Ok(TrackedFrameOutcome {
                    frame: frame.into_display(),
                    coverage_ratio: 0.25,
                    total_area: 100.0,
                    affected_area: 25.0,
                })
            },
            &mut sink,
            &store,
        )
        .unwrap();

        assert!((summary.coverage_ratio - 0.25).abs() < 1e-9);
        assert_eq!(summary.unique_corals, 1);
        assert_eq!(summary.output_ref, "local://annotated.mp4");
        assert_eq!(store.stored.borrow().len(), 1);
    }

    #[test]
    fn test_pipeline_error_aborts_without_storing() {
        let mut source = VecSource::with_frames(4);
        let mut sink = VecSink::new();
        let store = RecordingStore::new();

        let err = process_video(
            &mut source,
            1,
            |_frame, _state| Err(Error::ModelInference("detector died".into())),
            &mut sink,
            &store,
        )
        .unwrap_err();

        assert!(matches!(err, Error::ModelInference(_)));
        assert!(store.stored.borrow().is_empty());
    }
}
