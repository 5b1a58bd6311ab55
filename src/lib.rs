//! Rectify Tools Library
//!
//! A Rust library for loading stored pinhole camera calibrations and
//! rectifying raw Bayer sensor frames with a per-pixel undistortion lookup
//! table (LUT). The crate covers:
//! - Calibration loading: intrinsic parameter table and binary LUT
//! - LUT-based image rectification with bilinear interpolation
//! - Bayer demosaicing for the BG, GB, RG and GR mosaic patterns
//! - Frame sequencing and video muxing through an injected sink
//!
//! The per-pixel resampling hot path is parallelized with rayon and is
//! deterministic: sequential and parallel runs produce identical output.

pub mod bayer;
pub mod camera;
pub mod rectify;
pub mod video;

// Re-export commonly used types
pub use bayer::{demosaic, BayerPattern};
pub use camera::{CalibConfig, Camera, CameraError, CameraModel};
pub use rectify::{undistort, RectifyError};
pub use video::{
    frames_to_video, frames_to_video_tagged, list_frames, load_frames, Codec, VideoConfig,
    VideoError, VideoSink,
};
