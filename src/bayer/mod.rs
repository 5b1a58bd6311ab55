//! Bayer mosaic to color conversion.
//!
//! Raw sensor frames carry one color sample per pixel, arranged in a 2x2
//! mosaic. [`demosaic`] reconstructs a full RGB raster by bilinear averaging
//! of the neighboring samples of each missing color.

use image::{GrayImage, Rgb, RgbImage};
use log::debug;

/// The four supported 2x2 Bayer mosaics, named by the colors of the top-left
/// tile read row-major. `Bg` means the frame starts `B G / G R`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BayerPattern {
    Bg,
    Gb,
    Rg,
    Gr,
}

/// Color of one CFA sample site.
#[derive(Clone, Copy, PartialEq, Eq)]
enum CfaColor {
    R,
    G,
    B,
}

impl BayerPattern {
    /// Color filter in front of pixel `(row, col)`.
    fn color_at(self, row: u32, col: u32) -> CfaColor {
        let tile = match self {
            BayerPattern::Bg => [[CfaColor::B, CfaColor::G], [CfaColor::G, CfaColor::R]],
            BayerPattern::Gb => [[CfaColor::G, CfaColor::B], [CfaColor::R, CfaColor::G]],
            BayerPattern::Rg => [[CfaColor::R, CfaColor::G], [CfaColor::G, CfaColor::B]],
            BayerPattern::Gr => [[CfaColor::G, CfaColor::R], [CfaColor::B, CfaColor::G]],
        };
        tile[(row % 2) as usize][(col % 2) as usize]
    }
}

/// Converts a single-channel Bayer-mosaic frame to RGB.
///
/// For every pixel, each color channel is the average of all samples of
/// that color inside the pixel's 3x3 neighborhood (the pixel's own sample
/// passes through unchanged). Neighborhoods are clipped at the image
/// border. The output always has the input's dimensions with 3 channels.
pub fn demosaic(bayer: &GrayImage, pattern: BayerPattern) -> RgbImage {
    let (width, height) = bayer.dimensions();
    debug!("demosaicing {width}x{height} frame with pattern {pattern:?}");

    RgbImage::from_fn(width, height, |x, y| {
        let mut sums = [0u32; 3];
        let mut counts = [0u32; 3];

        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let ny = y as i64 + dy;
                let nx = x as i64 + dx;
                if ny < 0 || ny >= height as i64 || nx < 0 || nx >= width as i64 {
                    continue;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                let channel = match pattern.color_at(ny, nx) {
                    CfaColor::R => 0,
                    CfaColor::G => 1,
                    CfaColor::B => 2,
                };
                sums[channel] += bayer.get_pixel(nx, ny)[0] as u32;
                counts[channel] += 1;
            }
        }

        let own = bayer.get_pixel(x, y)[0];
        let own_channel = match pattern.color_at(y, x) {
            CfaColor::R => 0,
            CfaColor::G => 1,
            CfaColor::B => 2,
        };

        let mut pixel = [0u8; 3];
        for (k, value) in pixel.iter_mut().enumerate() {
            *value = if k == own_channel {
                own
            } else if counts[k] > 0 {
                (sums[k] / counts[k]) as u8
            } else {
                0
            };
        }
        Rgb(pixel)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERNS: [BayerPattern; 4] = [
        BayerPattern::Bg,
        BayerPattern::Gb,
        BayerPattern::Rg,
        BayerPattern::Gr,
    ];

    fn gradient_frame(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| image::Luma([(y * width + x) as u8]))
    }

    #[test]
    fn test_all_patterns_keep_dimensions() {
        let frame = gradient_frame(6, 4);
        for pattern in PATTERNS {
            let color = demosaic(&frame, pattern);
            assert_eq!(color.dimensions(), frame.dimensions());
        }
    }

    #[test]
    fn test_constant_frame_stays_constant() {
        let frame = GrayImage::from_pixel(5, 5, image::Luma([128]));
        for pattern in PATTERNS {
            let color = demosaic(&frame, pattern);
            for pixel in color.pixels() {
                assert_eq!(*pixel, Rgb([128, 128, 128]));
            }
        }
    }

    #[test]
    fn test_native_samples_pass_through() {
        let frame = gradient_frame(4, 4);
        // Rg pattern: (0, 0) is a red site, (1, 1) a blue site.
        let color = demosaic(&frame, BayerPattern::Rg);
        assert_eq!(color.get_pixel(0, 0)[0], frame.get_pixel(0, 0)[0]);
        assert_eq!(color.get_pixel(1, 1)[2], frame.get_pixel(1, 1)[0]);
    }

    #[test]
    fn test_single_pixel_frame() {
        let frame = GrayImage::from_pixel(1, 1, image::Luma([7]));
        for pattern in PATTERNS {
            let color = demosaic(&frame, pattern);
            assert_eq!(color.dimensions(), (1, 1));
        }
    }
}
