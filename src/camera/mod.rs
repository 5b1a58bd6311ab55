//! Calibrated camera model loading.
//!
//! This module reads the on-disk calibration layout produced by the sensor
//! rig: a whitespace-delimited intrinsic table (`intrinsic_parameters.txt`)
//! and a raw binary undistortion lookup table (`lut.bin`). The parsed state
//! is exposed as a [`CameraModel`] and held by a [`Camera`], which starts
//! empty and is populated exactly once per [`Camera::read_model`] call.

use log::{debug, warn};
use nalgebra::{DMatrix, Matrix4};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default file name of the intrinsic parameter table inside a model directory.
pub const INTRINSIC_FILENAME: &str = "intrinsic_parameters.txt";

/// Default file name of the binary undistortion lookup table.
pub const LUT_FILENAME: &str = "lut.bin";

#[derive(thiserror::Error, Debug)]
pub enum CameraError {
    #[error("Calibration file not found: {0}")]
    NotFound(String),
    #[error("Malformed calibration data: {0}")]
    Format(String),
    #[error("Focal length must be positive")]
    FocalLengthMustBePositive,
    #[error("Principal point must be finite")]
    PrincipalPointMustBeFinite,
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        CameraError::IOError(err.to_string())
    }
}

/// File names of the two calibration artifacts inside a model directory.
///
/// The defaults mirror the rig's layout. The two files are always read
/// separately; configuring the same name for both is almost certainly a
/// mistake and is logged as such.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibConfig {
    pub intrinsic_filename: String,
    pub lut_filename: String,
}

impl Default for CalibConfig {
    fn default() -> Self {
        CalibConfig {
            intrinsic_filename: INTRINSIC_FILENAME.to_string(),
            lut_filename: LUT_FILENAME.to_string(),
        }
    }
}

/// Intrinsic calibration state of one camera lens.
///
/// All fields are read straight from the calibration files and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraModel {
    /// Horizontal focal length in pixels.
    pub fx: f64,
    /// Vertical focal length in pixels.
    pub fy: f64,
    /// Horizontal principal point in pixels.
    pub cx: f64,
    /// Vertical principal point in pixels.
    pub cy: f64,
    /// 4x4 transform between the camera body frame and this lens's image
    /// frame, stored row-major exactly as it appears in the intrinsic table.
    /// It is not validated as a proper rigid transform; the calibration
    /// source is trusted.
    pub camera_to_image: Matrix4<f64>,
    /// Undistortion lookup table with one `(u, v)` row per pixel of the
    /// calibrated resolution. Maps pixels in the undistorted image to pixels
    /// in the distorted image.
    pub lut: DMatrix<f64>,
}

impl CameraModel {
    /// Number of pixels the LUT was calibrated for (`width * height`).
    pub fn pixel_count(&self) -> usize {
        self.lut.nrows()
    }

    fn validate(&self) -> Result<(), CameraError> {
        if self.fx <= 0.0 || self.fy <= 0.0 {
            return Err(CameraError::FocalLengthMustBePositive);
        }
        if !self.cx.is_finite() || !self.cy.is_finite() {
            return Err(CameraError::PrincipalPointMustBeFinite);
        }
        Ok(())
    }
}

/// Holder for a camera model that may not have been loaded yet.
///
/// [`Camera::model`] returns `None` until the first successful
/// [`Camera::read_model`]; this is the well-defined "not loaded" state and
/// the only sentinel the type exposes.
#[derive(Debug, Default)]
pub struct Camera {
    model: Option<CameraModel>,
}

impl Camera {
    pub fn new() -> Self {
        Camera { model: None }
    }

    /// Reads the intrinsic table and the undistortion LUT from `model_dir`.
    ///
    /// The intrinsic file is a whitespace-delimited numeric table of at
    /// least 5 rows by 4 columns: row 0 carries `fx fy cx cy`, rows 1-4 the
    /// camera-to-image transform in row-major order. The LUT file is a flat
    /// stream of little-endian `f64` values holding all `u` coordinates
    /// followed by all `v` coordinates (planar halves).
    ///
    /// Any previously loaded model is replaced.
    ///
    /// # Errors
    ///
    /// * [`CameraError::NotFound`] if either file is missing.
    /// * [`CameraError::Format`] if the table is shorter than 5x4, a token
    ///   does not parse, or the LUT element count cannot be split into two
    ///   equal halves.
    /// * [`CameraError::FocalLengthMustBePositive`] /
    ///   [`CameraError::PrincipalPointMustBeFinite`] for invalid intrinsics.
    pub fn read_model<P: AsRef<Path>>(
        &mut self,
        model_dir: P,
        config: &CalibConfig,
    ) -> Result<&CameraModel, CameraError> {
        if config.intrinsic_filename == config.lut_filename {
            warn!(
                "intrinsic and LUT file names are both {:?}; the calibration layout stores them in separate files",
                config.lut_filename
            );
        }

        let dir = model_dir.as_ref();

        let intrinsic_path = dir.join(&config.intrinsic_filename);
        if !intrinsic_path.is_file() {
            return Err(CameraError::NotFound(intrinsic_path.display().to_string()));
        }
        let contents = fs::read_to_string(&intrinsic_path)?;
        let (fx, fy, cx, cy, camera_to_image) = parse_intrinsics(&contents)?;

        let lut_path = dir.join(&config.lut_filename);
        if !lut_path.is_file() {
            return Err(CameraError::NotFound(lut_path.display().to_string()));
        }
        let bytes = fs::read(&lut_path)?;
        let lut = parse_lut(&bytes)?;

        let model = CameraModel {
            fx,
            fy,
            cx,
            cy,
            camera_to_image,
            lut,
        };
        model.validate()?;

        debug!(
            "loaded camera model from {}: fx={fx}, fy={fy}, cx={cx}, cy={cy}, lut entries={}",
            dir.display(),
            model.pixel_count()
        );

        Ok(self.model.insert(model))
    }

    /// The currently loaded model, or `None` if nothing has been loaded yet.
    pub fn model(&self) -> Option<&CameraModel> {
        self.model.as_ref()
    }
}

fn parse_intrinsics(contents: &str) -> Result<(f64, f64, f64, f64, Matrix4<f64>), CameraError> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let row = trimmed
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|_| {
                    CameraError::Format(format!(
                        "invalid number {token:?} on line {} of the intrinsic table",
                        line_no + 1
                    ))
                })
            })
            .collect::<Result<Vec<f64>, CameraError>>()?;
        rows.push(row);
    }

    if rows.len() < 5 {
        return Err(CameraError::Format(format!(
            "intrinsic table needs at least 5 rows, got {}",
            rows.len()
        )));
    }
    for (i, row) in rows.iter().take(5).enumerate() {
        if row.len() < 4 {
            return Err(CameraError::Format(format!(
                "intrinsic table row {i} needs at least 4 columns, got {}",
                row.len()
            )));
        }
    }

    let mut camera_to_image = Matrix4::zeros();
    for r in 0..4 {
        for c in 0..4 {
            camera_to_image[(r, c)] = rows[r + 1][c];
        }
    }

    Ok((rows[0][0], rows[0][1], rows[0][2], rows[0][3], camera_to_image))
}

/// Decodes the planar binary LUT stream into an `N x 2` matrix with columns
/// `(u, v)`: the file holds every pixel's `u` coordinate followed by every
/// pixel's `v` coordinate, equivalent to a `2 x N` matrix that is transposed
/// on load.
fn parse_lut(bytes: &[u8]) -> Result<DMatrix<f64>, CameraError> {
    if bytes.len() % 8 != 0 {
        return Err(CameraError::Format(format!(
            "LUT byte length {} is not a multiple of 8",
            bytes.len()
        )));
    }

    let values: Vec<f64> = bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            f64::from_le_bytes(buf)
        })
        .collect();

    if values.len() % 2 != 0 {
        return Err(CameraError::Format(format!(
            "LUT element count {} cannot be split into two equal coordinate planes",
            values.len()
        )));
    }

    let half = values.len() / 2;
    let mut lut = DMatrix::zeros(half, 2);
    for i in 0..half {
        lut[(i, 0)] = values[i];
        lut[(i, 1)] = values[half + i];
    }
    Ok(lut)
}
