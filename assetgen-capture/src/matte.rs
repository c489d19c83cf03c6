//! Batch background removal.
//!
//! The segmentation itself sits behind [`BackgroundRemover`]; the batch
//! driver handles file discovery, per-file failures and output layout.

use crate::source::{CaptureError, is_image};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A per-image background segmentation backend.
pub trait BackgroundRemover {
    /// Return the image with background pixels made transparent.
    fn remove(&self, image: &DynamicImage) -> Result<RgbaImage, CaptureError>;
}

/// Keys out pixels close to the mean color of the image border.
///
/// Suited to turntable captures against a plain backdrop.
#[derive(Debug, Clone, Copy)]
pub struct BorderKeyRemover {
    /// Largest per-channel difference still treated as background.
    pub tolerance: u8,
}

impl Default for BorderKeyRemover {
    fn default() -> Self {
        Self { tolerance: 24 }
    }
}

impl BorderKeyRemover {
    fn border_color(image: &RgbaImage) -> [f64; 3] {
        let (w, h) = image.dimensions();
        let mut sum = [0.0f64; 3];
        let mut count: f64 = 0.0;
        for (x, y, px) in image.enumerate_pixels() {
            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                for c in 0..3 {
                    sum[c] += px[c] as f64;
                }
                count += 1.0;
            }
        }
        sum.map(|s| s / count.max(1.0))
    }
}

impl BackgroundRemover for BorderKeyRemover {
    fn remove(&self, image: &DynamicImage) -> Result<RgbaImage, CaptureError> {
        let mut rgba = image.to_rgba8();
        if rgba.width() == 0 || rgba.height() == 0 {
            return Err(CaptureError::Matte("image has no pixels".to_string()));
        }
        let key = Self::border_color(&rgba);
        let tolerance = self.tolerance as f64;
        for px in rgba.pixels_mut() {
            let background = (0..3).all(|c| (px[c] as f64 - key[c]).abs() <= tolerance);
            if background {
                *px = Rgba([0, 0, 0, 0]);
            }
        }
        Ok(rgba)
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    /// Listed files that did not exist.
    pub missing: Vec<PathBuf>,
    /// Files that failed to decode, segment or encode, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

/// Read the image list file: one file name per line, blank lines ignored.
pub fn read_image_list(list_file: &Path) -> Result<Vec<String>, CaptureError> {
    let text = std::fs::read_to_string(list_file).map_err(CaptureError::io(list_file))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Run `remover` over images in `input_dir`, writing `<name>.png` files with
/// the alpha channel dropped into `output_dir`.
///
/// With `list_file`, only the names it lists are processed and missing ones
/// are skipped. A failure on one image is logged and the batch continues.
#[tracing::instrument(skip_all, fields(input = %input_dir.display()))]
pub fn remove_backgrounds(
    remover: &dyn BackgroundRemover,
    input_dir: &Path,
    output_dir: &Path,
    list_file: Option<&Path>,
) -> Result<BatchReport, CaptureError> {
    if !input_dir.is_dir() {
        return Err(CaptureError::SourceNotFound(input_dir.to_path_buf()));
    }
    let names = match list_file {
        Some(list) => read_image_list(list)?,
        None => list_images(input_dir)?,
    };
    std::fs::create_dir_all(output_dir).map_err(CaptureError::io(output_dir))?;

    let mut report = BatchReport::default();
    for name in names {
        let input = input_dir.join(&name);
        if !input.is_file() {
            warn!("Skipping missing image {}", input.display());
            report.missing.push(input);
            continue;
        }
        let output = output_dir.join(format!("{name}.png"));
        match process(remover, &input, &output) {
            Ok(()) => report.written.push(output),
            Err(err) => {
                warn!("Failed on {}: {}", input.display(), err);
                report.failed.push((input, err.to_string()));
            }
        }
    }

    info!(
        "Removed backgrounds from {} images ({} missing, {} failed)",
        report.written.len(),
        report.missing.len(),
        report.failed.len()
    );
    Ok(report)
}

fn list_images(dir: &Path) -> Result<Vec<String>, CaptureError> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map_err(CaptureError::io(dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    Ok(names)
}

fn process(
    remover: &dyn BackgroundRemover,
    input: &Path,
    output: &Path,
) -> Result<(), CaptureError> {
    let image = image::open(input).map_err(|source| CaptureError::Decode {
        path: input.to_path_buf(),
        source,
    })?;
    let matte = remover.remove(&image)?;
    flatten(&matte)
        .save(output)
        .map_err(|source| CaptureError::Encode {
            path: output.to_path_buf(),
            source,
        })
}

/// Drop the alpha channel, keeping each pixel's color values.
fn flatten(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgba([r, g, b, _]) = *image.get_pixel(x, y);
        Rgb([r, g, b])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "assetgen-matte-{}-{}",
            std::process::id(),
            tag
        ));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// White backdrop with a red square in the middle.
    fn subject() -> RgbImage {
        RgbImage::from_fn(8, 8, |x, y| {
            if (2..6).contains(&x) && (2..6).contains(&y) {
                Rgb([200, 20, 20])
            } else {
                Rgb([250, 250, 250])
            }
        })
    }

    struct Failing;

    impl BackgroundRemover for Failing {
        fn remove(&self, _image: &DynamicImage) -> Result<RgbaImage, CaptureError> {
            Err(CaptureError::Matte("backend unavailable".to_string()))
        }
    }

    #[test]
    fn test_border_key_clears_backdrop() {
        let matte = BorderKeyRemover::default()
            .remove(&DynamicImage::ImageRgb8(subject()))
            .unwrap();
        assert_eq!(matte.get_pixel(0, 0)[3], 0);
        assert_eq!(*matte.get_pixel(3, 3), Rgba([200, 20, 20, 255]));
        let flat = flatten(&matte);
        assert_eq!(*flat.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*flat.get_pixel(4, 4), Rgb([200, 20, 20]));
    }

    #[test]
    fn test_batch_over_directory() {
        let input = scratch_dir("dir-in");
        let output = input.join("out");
        subject().save(input.join("a.png")).unwrap();
        subject().save(input.join("b.jpg")).unwrap();
        std::fs::write(input.join("readme.txt"), "skip me").unwrap();

        let report =
            remove_backgrounds(&BorderKeyRemover::default(), &input, &output, None).unwrap();
        assert_eq!(
            report.written,
            vec![output.join("a.png.png"), output.join("b.jpg.png")]
        );
        assert!(report.missing.is_empty());
        assert!(report.failed.is_empty());
        let saved = image::open(output.join("a.png.png")).unwrap();
        assert!(matches!(saved, DynamicImage::ImageRgb8(_)));
        std::fs::remove_dir_all(&input).ok();
    }

    #[test]
    fn test_list_file_skips_missing_entries() {
        let input = scratch_dir("list-in");
        let output = input.join("out");
        subject().save(input.join("keep.png")).unwrap();
        subject().save(input.join("ignored.png")).unwrap();
        let list = input.join("list.txt");
        std::fs::write(&list, "keep.png\n\n  gone.png  \n").unwrap();

        let report =
            remove_backgrounds(&BorderKeyRemover::default(), &input, &output, Some(&list))
                .unwrap();
        assert_eq!(report.written, vec![output.join("keep.png.png")]);
        assert_eq!(report.missing, vec![input.join("gone.png")]);
        assert!(!output.join("ignored.png.png").exists());
        std::fs::remove_dir_all(&input).ok();
    }

    #[test]
    fn test_failures_do_not_stop_the_batch() {
        let input = scratch_dir("fail-in");
        let output = input.join("out");
        subject().save(input.join("a.png")).unwrap();
        std::fs::write(input.join("b.png"), b"not a png").unwrap();

        let report = remove_backgrounds(&Failing, &input, &output, None).unwrap();
        assert!(report.written.is_empty());
        assert_eq!(report.failed.len(), 2);

        let report =
            remove_backgrounds(&BorderKeyRemover::default(), &input, &output, None).unwrap();
        assert_eq!(report.written.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, input.join("b.png"));
        std::fs::remove_dir_all(&input).ok();
    }
}
