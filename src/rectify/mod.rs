//! LUT-based image rectification.
//!
//! Geometric correction is an inverse mapping: for every pixel of the output
//! image the LUT names a sub-pixel location in the distorted source image,
//! and the output value is obtained by bilinear interpolation of the source
//! at that location, independently per color channel.

use image::{ImageBuffer, Pixel, Primitive, Rgb};
use log::debug;
use nalgebra::DMatrix;
use num_traits::{Bounded, NumCast};
use rayon::prelude::*;

#[derive(thiserror::Error, Debug)]
pub enum RectifyError {
    #[error("LUT carries {lut_pixels} pixel entries but the image has {image_pixels} pixels")]
    ShapeMismatch {
        lut_pixels: usize,
        image_pixels: usize,
    },
    #[error("LUT must have exactly 2 columns, got {0}")]
    LutColumns(usize),
}

/// Rectifies a color image with a per-pixel undistortion LUT.
///
/// `lut` is the `N x 2` table loaded by [`crate::camera::Camera`], with one
/// `(u, v)` row per output pixel in row-major order (`N = height * width`).
/// The stored pairs are consumed as `(v, u)`, i.e. for output pixel
/// `(r, c)` the source is sampled at row `v` and column `u` of entry
/// `r * width + c`, with bilinear interpolation per channel.
///
/// Coordinates outside the source bounds are clamped to the nearest edge
/// pixel (clamp-to-edge boundary policy). Interpolation runs in `f64`; the
/// result is clamped to the subpixel type's range and converted back with
/// truncation toward zero for integer subpixels, so output dimensions and
/// pixel type always equal the input's. Neither input is mutated, and the
/// result is a pure function of `(image, lut)` regardless of the rayon
/// thread count.
///
/// # Errors
///
/// [`RectifyError::ShapeMismatch`] if the LUT row count does not equal the
/// image pixel count, [`RectifyError::LutColumns`] if it is not two columns
/// wide.
pub fn undistort<T>(
    image: &ImageBuffer<Rgb<T>, Vec<T>>,
    lut: &DMatrix<f64>,
) -> Result<ImageBuffer<Rgb<T>, Vec<T>>, RectifyError>
where
    T: Primitive + Send + Sync + 'static,
    Rgb<T>: Pixel<Subpixel = T>,
{
    const CHANNELS: usize = Rgb::<u8>::CHANNEL_COUNT as usize;

    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let pixels = w * h;

    if lut.ncols() != 2 {
        return Err(RectifyError::LutColumns(lut.ncols()));
    }
    if lut.nrows() != pixels {
        return Err(RectifyError::ShapeMismatch {
            lut_pixels: lut.nrows(),
            image_pixels: pixels,
        });
    }
    if pixels == 0 {
        return Ok(image.clone());
    }

    debug!("rectifying {w}x{h} image through {} LUT entries", lut.nrows());

    let src = image.as_raw().as_slice();
    let mut out = image.clone();

    // Scanlines are disjoint, so resampling them in parallel is safe and
    // bit-identical to the sequential order.
    out.par_chunks_mut(w * CHANNELS)
        .enumerate()
        .for_each(|(r, row_buf)| {
            for c in 0..w {
                let idx = r * w + c;
                let source_row = lut[(idx, 1)];
                let source_col = lut[(idx, 0)];
                let value = sample_bilinear(src, w, h, source_row, source_col);
                for (k, &v) in value.iter().enumerate() {
                    row_buf[c * CHANNELS + k] = cast_subpixel(v);
                }
            }
        });

    Ok(out)
}

/// Bilinear sample of a packed RGB raster at a fractional `(row, col)`
/// location, clamping out-of-bounds coordinates to the nearest edge pixel.
fn sample_bilinear<T: Primitive>(
    data: &[T],
    width: usize,
    height: usize,
    row: f64,
    col: f64,
) -> [f64; 3] {
    let r = row.clamp(0.0, (height - 1) as f64);
    let c = col.clamp(0.0, (width - 1) as f64);

    let r0 = r.floor() as usize;
    let c0 = c.floor() as usize;
    let r1 = (r0 + 1).min(height - 1);
    let c1 = (c0 + 1).min(width - 1);

    let fr = r - r0 as f64;
    let fc = c - c0 as f64;

    let w00 = (1.0 - fr) * (1.0 - fc);
    let w01 = (1.0 - fr) * fc;
    let w10 = fr * (1.0 - fc);
    let w11 = fr * fc;

    let base00 = (r0 * width + c0) * 3;
    let base01 = (r0 * width + c1) * 3;
    let base10 = (r1 * width + c0) * 3;
    let base11 = (r1 * width + c1) * 3;

    let mut value = [0.0f64; 3];
    for (k, v) in value.iter_mut().enumerate() {
        *v = data[base00 + k].to_f64().unwrap_or(0.0) * w00
            + data[base01 + k].to_f64().unwrap_or(0.0) * w01
            + data[base10 + k].to_f64().unwrap_or(0.0) * w10
            + data[base11 + k].to_f64().unwrap_or(0.0) * w11;
    }
    value
}

/// Narrows an interpolated `f64` back to the image's subpixel type: clamp to
/// the destination range, then truncate toward zero for integer types
/// (float subpixels pass through unchanged).
fn cast_subpixel<T: Primitive>(value: f64) -> T {
    let lo = <T as Bounded>::min_value().to_f64().unwrap_or(f64::MIN);
    let hi = <T as Bounded>::max_value().to_f64().unwrap_or(f64::MAX);
    NumCast::from(value.clamp(lo, hi)).unwrap_or_else(<T as Bounded>::min_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// LUT mapping every output pixel to the same location in the source.
    fn identity_lut(width: usize, height: usize) -> DMatrix<f64> {
        let mut lut = DMatrix::zeros(width * height, 2);
        for r in 0..height {
            for c in 0..width {
                let idx = r * width + c;
                lut[(idx, 0)] = c as f64;
                lut[(idx, 1)] = r as f64;
            }
        }
        lut
    }

    fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = (y * width + x) as u8;
            Rgb([v, v.wrapping_add(40), v.wrapping_add(80)])
        })
    }

    #[test]
    fn test_identity_lut_is_exact() {
        let image = gradient_image(4, 3);
        let lut = identity_lut(4, 3);
        let rectified = undistort(&image, &lut).unwrap();
        assert_eq!(rectified, image);
    }

    #[test]
    fn test_output_shape_matches_input() {
        let image = gradient_image(7, 5);
        let lut = identity_lut(7, 5);
        let rectified = undistort(&image, &lut).unwrap();
        assert_eq!(rectified.dimensions(), image.dimensions());
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let image = gradient_image(4, 3);
        let lut = identity_lut(4, 4);
        let err = undistort(&image, &lut).unwrap_err();
        assert!(matches!(
            err,
            RectifyError::ShapeMismatch {
                lut_pixels: 16,
                image_pixels: 12
            }
        ));
    }

    #[test]
    fn test_wrong_lut_width_is_rejected() {
        let image = gradient_image(2, 2);
        let lut = DMatrix::zeros(4, 3);
        let err = undistort(&image, &lut).unwrap_err();
        assert!(matches!(err, RectifyError::LutColumns(3)));
    }

    #[test]
    fn test_fractional_coordinates_interpolate() {
        // 2x2 image, red channel values 10 20 / 30 40; the center of the
        // quad interpolates to their mean.
        let mut image = RgbImage::new(2, 2);
        image.put_pixel(0, 0, Rgb([10, 0, 0]));
        image.put_pixel(1, 0, Rgb([20, 0, 0]));
        image.put_pixel(0, 1, Rgb([30, 0, 0]));
        image.put_pixel(1, 1, Rgb([40, 0, 0]));

        let mut lut = DMatrix::zeros(4, 2);
        for idx in 0..4 {
            lut[(idx, 0)] = 0.5;
            lut[(idx, 1)] = 0.5;
        }

        let rectified = undistort(&image, &lut).unwrap();
        for pixel in rectified.pixels() {
            assert_eq!(pixel[0], 25);
        }
    }

    #[test]
    fn test_out_of_bounds_clamps_to_edge() {
        let image = gradient_image(4, 3);

        let mut low = DMatrix::zeros(12, 2);
        let mut high = DMatrix::zeros(12, 2);
        for idx in 0..12 {
            low[(idx, 0)] = -5.0;
            low[(idx, 1)] = -7.5;
            high[(idx, 0)] = 100.0;
            high[(idx, 1)] = 100.0;
        }

        let top_left = *image.get_pixel(0, 0);
        for pixel in undistort(&image, &low).unwrap().pixels() {
            assert_eq!(*pixel, top_left);
        }

        let bottom_right = *image.get_pixel(3, 2);
        for pixel in undistort(&image, &high).unwrap().pixels() {
            assert_eq!(*pixel, bottom_right);
        }
    }

    #[test]
    fn test_repeated_calls_are_bit_identical() {
        let image = gradient_image(16, 9);
        let mut lut = identity_lut(16, 9);
        for idx in 0..lut.nrows() {
            lut[(idx, 0)] += 0.37;
            lut[(idx, 1)] += 0.61;
        }

        let first = undistort(&image, &lut).unwrap();
        let second = undistort(&image, &lut).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_float_subpixels_keep_fractions() {
        let mut image: ImageBuffer<Rgb<f32>, Vec<f32>> = ImageBuffer::new(2, 1);
        image.put_pixel(0, 0, Rgb([0.0, 0.0, 0.0]));
        image.put_pixel(1, 0, Rgb([1.0, 1.0, 1.0]));

        let mut lut = DMatrix::zeros(2, 2);
        lut[(0, 0)] = 0.5;
        lut[(1, 0)] = 0.5;

        let rectified = undistort(&image, &lut).unwrap();
        for pixel in rectified.pixels() {
            assert!((pixel[0] - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rectify_with_loaded_fixture_lut() {
        // The sample calibration stores an identity LUT for a 4x3 frame, so
        // rectification through the loaded model is a no-op.
        let mut camera = crate::camera::Camera::new();
        let model = camera
            .read_model("samples/calib", &crate::camera::CalibConfig::default())
            .unwrap();

        let image = gradient_image(4, 3);
        let rectified = undistort(&image, &model.lut).unwrap();
        assert_eq!(rectified, image);
    }

    #[test]
    fn test_integer_narrowing_truncates_toward_zero() {
        // Interpolating 10 and 21 at 0.5 gives 15.5, which truncates to 15.
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([10, 10, 10]));
        image.put_pixel(1, 0, Rgb([21, 21, 21]));

        let mut lut = DMatrix::zeros(2, 2);
        lut[(0, 0)] = 0.5;
        lut[(1, 0)] = 0.5;

        let rectified = undistort(&image, &lut).unwrap();
        for pixel in rectified.pixels() {
            assert_eq!(*pixel, Rgb([15, 15, 15]));
        }
    }
}
