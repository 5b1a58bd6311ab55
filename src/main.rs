//! Frame Rectification Tool
//!
//! Loads a stored camera calibration and rectifies a directory of raw
//! Bayer frames through its undistortion LUT.
//!
//! Usage:
//!   cargo run -- -m calib/ -f frames/ -o rectified/

use clap::Parser;
use rectify_tools::bayer::{demosaic, BayerPattern};
use rectify_tools::camera::{CalibConfig, Camera, INTRINSIC_FILENAME, LUT_FILENAME};
use rectify_tools::rectify::undistort;
use rectify_tools::video::list_frames;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Rectify raw Bayer frames with a calibrated undistortion LUT")]
struct Cli {
    /// Calibration directory holding the intrinsic table and the LUT
    #[arg(short = 'm', long)]
    model_dir: PathBuf,

    /// Directory of raw sensor frames (*.png)
    #[arg(short = 'f', long)]
    frames: PathBuf,

    /// Output directory for rectified frames
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Bayer pattern of the sensor (bg, gb, rg, gr)
    #[arg(short = 'p', long, default_value = "gr")]
    pattern: String,

    /// Intrinsic parameter file name inside the calibration directory
    #[arg(long, default_value = INTRINSIC_FILENAME)]
    intrinsic_file: String,

    /// LUT file name inside the calibration directory
    #[arg(long, default_value = LUT_FILENAME)]
    lut_file: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let pattern = match cli.pattern.to_lowercase().as_str() {
        "bg" => BayerPattern::Bg,
        "gb" => BayerPattern::Gb,
        "rg" => BayerPattern::Rg,
        "gr" => BayerPattern::Gr,
        _ => return Err(format!("unsupported Bayer pattern: {}", cli.pattern).into()),
    };

    let config = CalibConfig {
        intrinsic_filename: cli.intrinsic_file,
        lut_filename: cli.lut_file,
    };
    let mut camera = Camera::new();
    let model = camera.read_model(&cli.model_dir, &config)?;
    println!(
        "Loaded camera model: fx={:.6}, fy={:.6}, cx={:.6}, cy={:.6} ({} LUT entries)",
        model.fx,
        model.fy,
        model.cx,
        model.cy,
        model.pixel_count()
    );

    let files = list_frames(&cli.frames)?;
    fs::create_dir_all(&cli.output)?;

    for path in &files {
        let bayer = image::open(path)?.to_luma8();
        let color = demosaic(&bayer, pattern);
        let rectified = undistort(&color, &model.lut)?;

        let name = path.file_name().ok_or("invalid frame file name")?;
        rectified.save(cli.output.join(name))?;
    }

    println!(
        "Rectified {} frames into {}",
        files.len(),
        cli.output.display()
    );
    Ok(())
}
