//! Frame sequencing and video muxing.
//!
//! The crate does not encode video itself. It enumerates and loads raw
//! frames, demosaics them, and hands the resulting color sequence to an
//! injected [`VideoSink`] together with the target frame rate and output
//! path. Container writing stays behind that trait.

use crate::bayer::{demosaic, BayerPattern};
use image::{GrayImage, RgbImage};
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum VideoError {
    #[error("Frame source not found: {0}")]
    NotFound(String),
    #[error("No PNG frames found in {0}")]
    EmptySource(String),
    #[error("Failed to decode frame {path}: {source}")]
    Decode {
        path: String,
        source: image::ImageError,
    },
    #[error("Frame rate must be positive")]
    InvalidFps,
    #[error("Video sink failure: {0}")]
    Sink(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for VideoError {
    fn from(err: std::io::Error) -> Self {
        VideoError::IOError(err.to_string())
    }
}

/// Supported output codecs. Each codec fixes the container extension of the
/// muxed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    Divx,
    X264,
    Mjpg,
}

impl Codec {
    /// Parses a codec tag, case-insensitively. The container aliases `mkv`
    /// and `mp4` are accepted for X264 and MJPG respectively. Unrecognized
    /// tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Codec> {
        match tag.to_ascii_lowercase().as_str() {
            "divx" => Some(Codec::Divx),
            "x264" | "mkv" => Some(Codec::X264),
            "mjpg" | "mp4" => Some(Codec::Mjpg),
            _ => None,
        }
    }

    /// File extension of the container written for this codec.
    pub fn extension(&self) -> &'static str {
        match self {
            Codec::Divx => "avi",
            Codec::X264 => "mkv",
            Codec::Mjpg => "mp4",
        }
    }
}

/// Muxing parameters: which codec to use and the output frame rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    pub codec: Codec,
    pub fps: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        VideoConfig {
            codec: Codec::Divx,
            fps: 12,
        }
    }
}

/// External collaborator that writes an ordered sequence of same-shaped
/// color frames as a single video file.
pub trait VideoSink {
    fn write_video(
        &mut self,
        frames: &[RgbImage],
        fps: u32,
        path: &Path,
    ) -> Result<(), VideoError>;
}

/// Lists the PNG frames of a directory in lexicographic order.
///
/// # Errors
///
/// [`VideoError::NotFound`] if `source` is not a directory.
pub fn list_frames<P: AsRef<Path>>(source: P) -> Result<Vec<PathBuf>, VideoError> {
    let dir = source.as_ref();
    if !dir.is_dir() {
        return Err(VideoError::NotFound(dir.display().to_string()));
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .map_or(false, |ext| ext.eq_ignore_ascii_case("png"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Loads a list of frames as single-channel rasters, in parallel. The
/// returned order matches the input order.
pub fn load_frames(files: &[PathBuf]) -> Result<Vec<GrayImage>, VideoError> {
    files
        .par_iter()
        .map(|path| {
            image::open(path)
                .map(|img| img.to_luma8())
                .map_err(|source| VideoError::Decode {
                    path: path.display().to_string(),
                    source,
                })
        })
        .collect()
}

/// Muxes every PNG frame under `source` into `<destination>/out.<ext>`.
///
/// Frames are loaded in parallel, demosaiced with the GR pattern (the
/// sensor layout of the recording rig), and written through `sink` at
/// `config.fps` frames per second. Returns the path of the written file.
///
/// # Errors
///
/// [`VideoError::InvalidFps`] for a zero frame rate,
/// [`VideoError::EmptySource`] if the directory holds no PNG frames, plus
/// any enumeration, decode, or sink error.
pub fn frames_to_video<P, Q>(
    source: P,
    destination: Q,
    config: &VideoConfig,
    sink: &mut dyn VideoSink,
) -> Result<PathBuf, VideoError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    if config.fps == 0 {
        return Err(VideoError::InvalidFps);
    }

    let files = list_frames(&source)?;
    if files.is_empty() {
        return Err(VideoError::EmptySource(
            source.as_ref().display().to_string(),
        ));
    }

    let raw = load_frames(&files)?;
    let frames: Vec<RgbImage> = raw
        .par_iter()
        .map(|frame| demosaic(frame, BayerPattern::Gr))
        .collect();

    let out_path = destination
        .as_ref()
        .join(format!("out.{}", config.codec.extension()));
    sink.write_video(&frames, config.fps, &out_path)?;

    debug!("wrote {} frames to {}", frames.len(), out_path.display());
    Ok(out_path)
}

/// Tag-based variant of [`frames_to_video`] matching the recording
/// pipeline's loose interface: an unrecognized codec tag is a soft failure
/// that logs a warning and writes nothing, returning `Ok(None)`.
pub fn frames_to_video_tagged<P, Q>(
    source: P,
    destination: Q,
    codec_tag: &str,
    fps: u32,
    sink: &mut dyn VideoSink,
) -> Result<Option<PathBuf>, VideoError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let Some(codec) = Codec::from_tag(codec_tag) else {
        warn!("video format {codec_tag:?} is not supported; skipping mux");
        return Ok(None);
    };
    frames_to_video(source, destination, &VideoConfig { codec, fps }, sink).map(Some)
}
