// THEORY:
// Frame sources are external collaborators: the pipeline only asks for
// metadata once and then pulls raw row-major pixel buffers until the stream
// ends. This module ships two of them: a directory of numbered images
// decoded with the `image` crate for real content, and a synthetic gradient
// generator for benchmarks and tests. Neither knows anything about bands,
// cascades or glyphs.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{FrameSource, StreamInfo};

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Decodes a directory of image files, sorted by file name, as consecutive
/// video frames. Every frame is converted to 8-bit RGB; all frames must
/// share the first frame's dimensions.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    frame_rate: u32,
    info: Option<StreamInfo>,
}

impl ImageSequenceSource {
    /// Scans `dir` for frame images. Fails if the directory holds none.
    pub fn open(dir: &Path, frame_rate: u32) -> PipelineResult<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                    })
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(PipelineError::frame_source(format!(
                "no frame images found in {}",
                dir.display()
            )));
        }
        debug!(frames = paths.len(), dir = %dir.display(), "opened image sequence");
        Ok(Self { paths, cursor: 0, frame_rate, info: None })
    }
}

impl FrameSource for ImageSequenceSource {
    fn metadata(&mut self) -> PipelineResult<StreamInfo> {
        let (width, height) = image::image_dimensions(&self.paths[0])
            .map_err(|e| PipelineError::frame_source(e.to_string()))?;
        let info = StreamInfo {
            frames: self.paths.len() as u64,
            width,
            height,
            frame_rate: self.frame_rate,
        };
        self.info = Some(info);
        Ok(info)
    }

    fn next_frame(&mut self) -> PipelineResult<Option<Vec<u8>>> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let decoded = image::open(path)
            .map_err(|e| {
                PipelineError::frame_source(format!("{}: {e}", path.display()))
            })?
            .to_rgb8();
        if let Some(info) = self.info
            && (decoded.width() != info.width || decoded.height() != info.height)
        {
            return Err(PipelineError::frame_source(format!(
                "{} is {}x{}, stream is {}x{}",
                path.display(),
                decoded.width(),
                decoded.height(),
                info.width,
                info.height
            )));
        }
        Ok(Some(decoded.into_raw()))
    }
}

/// Deterministic procedural source used by the benchmark harness and tests:
/// a diagonal gradient that scrolls one step per frame.
pub struct SyntheticSource {
    info: StreamInfo,
    cursor: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, frames: u64, frame_rate: u32) -> Self {
        Self {
            info: StreamInfo { frames, width, height, frame_rate },
            cursor: 0,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn metadata(&mut self) -> PipelineResult<StreamInfo> {
        Ok(self.info)
    }

    fn next_frame(&mut self) -> PipelineResult<Option<Vec<u8>>> {
        if self.cursor >= self.info.frames {
            return Ok(None);
        }
        let shift = self.cursor as usize;
        self.cursor += 1;

        let width = self.info.width as usize;
        let height = self.info.height as usize;
        let mut frame = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                let v = ((x + y + shift) % 256) as u8;
                frame.extend_from_slice(&[v, v, v]);
            }
        }
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_honors_its_frame_count() {
        let mut source = SyntheticSource::new(4, 3, 2, 24);
        let info = source.metadata().unwrap();
        assert_eq!(info.frames, 2);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.len(), 4 * 3 * 3);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn synthetic_frames_scroll_between_frames() {
        let mut source = SyntheticSource::new(4, 2, 2, 24);
        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        assert_ne!(first, second);
        // Frame n+1 is frame n shifted by one cell.
        assert_eq!(first[3], second[0]);
    }

    #[test]
    fn missing_directory_is_a_frame_source_error() {
        let err = ImageSequenceSource::open(Path::new("/nonexistent/frames"), 24).unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = std::env::temp_dir().join("glyphcast-empty-frames");
        std::fs::create_dir_all(&dir).unwrap();
        let err = ImageSequenceSource::open(&dir, 24).unwrap_err();
        assert!(matches!(err, PipelineError::FrameSource(_)));
    }
}
