//! Fixed-rate frame sampling.

use crate::source::{CaptureError, CaptureSource};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of a sampling run.
#[derive(Debug, Clone, Default)]
pub struct SampleReport {
    pub frames_read: u64,
    pub interval: u64,
    pub saved: Vec<PathBuf>,
}

/// Keep every `interval`-th frame so that roughly `rate` frames per second
/// survive from a source running at `fps`.
///
/// The quotient is truncated and clamped to at least 1, so a rate above the
/// source rate keeps every frame.
pub fn frame_interval(fps: f64, rate: f64) -> Result<u64, CaptureError> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(CaptureError::InvalidSamplingRate(rate));
    }
    if !(fps.is_finite() && fps > 0.0) {
        return Err(CaptureError::InvalidFrameRate(fps));
    }
    Ok(((fps / rate).trunc() as u64).max(1))
}

/// File name of the `index`-th saved frame.
pub fn frame_file_name(index: usize) -> String {
    format!("frame_{index:04}.jpg")
}

/// Pull frames from `source` and save every `frame_interval`-th one as a
/// numbered JPEG under `output_dir`. The first frame is always kept.
///
/// `source_fps` overrides the rate the source reports; one of the two must
/// be available.
#[tracing::instrument(skip_all, fields(output = %output_dir.as_ref().display(), rate = rate))]
pub fn sample_frames(
    source: &mut dyn CaptureSource,
    output_dir: impl AsRef<Path>,
    rate: f64,
    source_fps: Option<f64>,
) -> Result<SampleReport, CaptureError> {
    let output_dir = output_dir.as_ref();
    let fps = source_fps
        .or_else(|| source.frame_rate())
        .ok_or(CaptureError::InvalidFrameRate(0.0))?;
    let interval = frame_interval(fps, rate)?;
    std::fs::create_dir_all(output_dir).map_err(CaptureError::io(output_dir))?;

    let mut report = SampleReport {
        interval,
        ..SampleReport::default()
    };
    while let Some(frame) = source.next_frame()? {
        let count = report.frames_read;
        report.frames_read += 1;
        if count % interval != 0 {
            continue;
        }
        let path = output_dir.join(frame_file_name(report.saved.len()));
        frame
            .image
            .save(&path)
            .map_err(|source| CaptureError::Encode {
                path: path.clone(),
                source,
            })?;
        debug!("Saved frame {} as {}", frame.frame_number, path.display());
        report.saved.push(path);
    }

    info!(
        "Sampled {} of {} frames (every {} @ {} fps)",
        report.saved.len(),
        report.frames_read,
        interval,
        fps
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FrameData;
    use image::{Rgb, RgbImage};

    struct Synthetic {
        remaining: u64,
        emitted: u64,
        fps: Option<f64>,
    }

    impl CaptureSource for Synthetic {
        fn next_frame(&mut self) -> Result<Option<FrameData>, CaptureError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            let n = self.emitted;
            self.emitted += 1;
            Ok(Some(FrameData::new(
                RgbImage::from_pixel(4, 4, Rgb([n as u8, 0, 0])),
                n as f64,
                n,
            )))
        }

        fn frame_rate(&self) -> Option<f64> {
            self.fps
        }
    }

    fn synthetic(frames: u64, fps: Option<f64>) -> Synthetic {
        Synthetic {
            remaining: frames,
            emitted: 0,
            fps,
        }
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "assetgen-sampler-{}-{}",
            std::process::id(),
            tag
        ));
        std::fs::remove_dir_all(&dir).ok();
        dir
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(frame_interval(30.0, 1.0).unwrap(), 30);
        assert_eq!(frame_interval(29.97, 2.0).unwrap(), 14);
        assert_eq!(frame_interval(24.0, 60.0).unwrap(), 1);
        assert!(matches!(
            frame_interval(30.0, 0.0),
            Err(CaptureError::InvalidSamplingRate(_))
        ));
        assert!(matches!(
            frame_interval(30.0, -1.0),
            Err(CaptureError::InvalidSamplingRate(_))
        ));
    }

    #[test]
    fn test_samples_every_interval() {
        let dir = scratch_dir("interval");
        let mut source = synthetic(10, Some(30.0));
        let report = sample_frames(&mut source, &dir, 10.0, None).unwrap();
        assert_eq!(report.interval, 3);
        assert_eq!(report.frames_read, 10);
        // Frames 0, 3, 6, 9.
        assert_eq!(report.saved.len(), 4);
        assert_eq!(report.saved[0], dir.join("frame_0000.jpg"));
        assert_eq!(report.saved[3], dir.join("frame_0003.jpg"));
        assert!(report.saved.iter().all(|p| p.exists()));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_source_fps_override_and_fast_rate() {
        let dir = scratch_dir("override");
        let mut source = synthetic(3, None);
        let report = sample_frames(&mut source, &dir, 100.0, Some(25.0)).unwrap();
        assert_eq!(report.interval, 1);
        assert_eq!(report.saved.len(), 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_fps_is_rejected() {
        let dir = scratch_dir("unknown");
        let mut source = synthetic(3, None);
        assert!(sample_frames(&mut source, &dir, 1.0, None).is_err());
        assert!(!dir.exists());
    }
}
