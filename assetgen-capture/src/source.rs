//! Common capture source types and traits.

use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during capture and image processing.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Source contains no frames: {0}")]
    NoFrames(PathBuf),

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid sampling rate {0}; it must be positive")]
    InvalidSamplingRate(f64),

    #[error("Invalid source frame rate {0}; it must be positive")]
    InvalidFrameRate(f64),

    #[error("Background removal failed: {0}")]
    Matte(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CaptureError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> CaptureError + '_ {
        move |source| CaptureError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Raw frame data from a capture source.
#[derive(Debug, Clone)]
pub struct FrameData {
    /// RGB image data.
    pub image: RgbImage,
    /// Frame timestamp in seconds (relative to stream start).
    pub timestamp: f64,
    /// Frame number.
    pub frame_number: u64,
}

impl FrameData {
    pub fn new(image: RgbImage, timestamp: f64, frame_number: u64) -> Self {
        Self {
            image,
            timestamp,
            frame_number,
        }
    }

    /// Get image dimensions (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Trait for sources that yield frames in presentation order.
pub trait CaptureSource {
    /// Get the next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<FrameData>, CaptureError>;

    /// Get the frame rate, if known.
    fn frame_rate(&self) -> Option<f64>;
}

/// Extensions recognized as frame images.
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

pub(crate) fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// A directory of still images played back as a stream at a declared rate.
///
/// Frames are ordered by file name, which matches numbered exports such as
/// `frame_0000.png, frame_0001.png, ...`.
pub struct ImageSequenceSource {
    frames: Vec<PathBuf>,
    frame_rate: f64,
    next: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, frame_rate: f64) -> Result<Self, CaptureError> {
        let dir = dir.as_ref();
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(CaptureError::InvalidFrameRate(frame_rate));
        }
        if !dir.is_dir() {
            return Err(CaptureError::SourceNotFound(dir.to_path_buf()));
        }
        let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(CaptureError::io(dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        if frames.is_empty() {
            return Err(CaptureError::NoFrames(dir.to_path_buf()));
        }
        frames.sort();
        info!(
            "Opened image sequence {} ({} frames @ {} fps)",
            dir.display(),
            frames.len(),
            frame_rate
        );
        Ok(Self {
            frames,
            frame_rate,
            next: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl CaptureSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<FrameData>, CaptureError> {
        let Some(path) = self.frames.get(self.next) else {
            return Ok(None);
        };
        let image = image::open(path)
            .map_err(|source| CaptureError::Decode {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        let frame_number = self.next as u64;
        self.next += 1;
        debug!("Read frame {} from {}", frame_number, path.display());
        Ok(Some(FrameData::new(
            image,
            frame_number as f64 / self.frame_rate,
            frame_number,
        )))
    }

    fn frame_rate(&self) -> Option<f64> {
        Some(self.frame_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "assetgen-capture-{}-{}",
            std::process::id(),
            tag
        ));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_sequence_is_sorted_and_timed() {
        let dir = scratch_dir("sequence");
        for (name, shade) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
            RgbImage::from_pixel(2, 2, Rgb([shade, 0, 0]))
                .save(dir.join(name))
                .unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageSequenceSource::open(&dir, 4.0).unwrap();
        assert_eq!(source.len(), 3);
        let mut shades = Vec::new();
        let mut stamps = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            shades.push(frame.image.get_pixel(0, 0)[0]);
            stamps.push(frame.timestamp);
        }
        assert_eq!(shades, vec![10, 20, 30]);
        assert_eq!(stamps, vec![0.0, 0.25, 0.5]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_and_empty_sources() {
        let dir = scratch_dir("empty");
        assert!(matches!(
            ImageSequenceSource::open(&dir, 30.0),
            Err(CaptureError::NoFrames(_))
        ));
        assert!(matches!(
            ImageSequenceSource::open(dir.join("missing"), 30.0),
            Err(CaptureError::SourceNotFound(_))
        ));
        assert!(matches!(
            ImageSequenceSource::open(&dir, 0.0),
            Err(CaptureError::InvalidFrameRate(_))
        ));
        std::fs::remove_dir_all(&dir).ok();
    }
}
