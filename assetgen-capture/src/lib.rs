//! Assetgen Capture - image preparation ahead of reconstruction
//!
//! This crate covers the steps that turn raw footage into photogrammetry input:
//!
//! - Frame sources behind the [`CaptureSource`] trait (image sequences today)
//! - Fixed-rate frame sampling into numbered JPEGs
//! - Batch background removal behind the [`BackgroundRemover`] trait
//!
//! ## Example
//!
//! ```ignore
//! use assetgen_capture::{ImageSequenceSource, sample_frames};
//!
//! let mut source = ImageSequenceSource::open("footage/", 30.0)?;
//! let report = sample_frames(&mut source, "frames/", 2.0, None)?;
//! println!("kept {} frames", report.saved.len());
//! ```

mod matte;
mod sampler;
mod source;

pub use matte::{
    BackgroundRemover, BatchReport, BorderKeyRemover, read_image_list, remove_backgrounds,
};
pub use sampler::{SampleReport, frame_file_name, frame_interval, sample_frames};
pub use source::{CaptureError, CaptureSource, FrameData, ImageSequenceSource};
