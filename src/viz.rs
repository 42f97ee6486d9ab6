//! Optical-flow color coding (Baker et al., "A Database and Evaluation
//! Methodology for Optical Flow").
//!
//! Hue encodes direction, saturation encodes magnitude relative to the
//! largest vector in the field.

use anyhow::{Context, Result};
use image::{GenericImage, RgbImage};
use std::path::{Path, PathBuf};
use tracing::debug;

const RY: usize = 15;
const YG: usize = 6;
const GC: usize = 4;
const CB: usize = 11;
const BM: usize = 13;
const MR: usize = 6;
const NCOLS: usize = RY + YG + GC + CB + BM + MR;

fn ramp(i: usize, n: usize) -> f32 {
    (255.0 * i as f32 / n as f32).floor()
}

pub fn colorwheel() -> [[f32; 3]; NCOLS] {
    let mut wheel = [[0.0; 3]; NCOLS];
    let mut col = 0;
    for i in 0..RY {
        wheel[col + i] = [255.0, ramp(i, RY), 0.0];
    }
    col += RY;
    for i in 0..YG {
        wheel[col + i] = [255.0 - ramp(i, YG), 255.0, 0.0];
    }
    col += YG;
    for i in 0..GC {
        wheel[col + i] = [0.0, 255.0, ramp(i, GC)];
    }
    col += GC;
    for i in 0..CB {
        wheel[col + i] = [0.0, 255.0 - ramp(i, CB), 255.0];
    }
    col += CB;
    for i in 0..BM {
        wheel[col + i] = [ramp(i, BM), 0.0, 255.0];
    }
    col += BM;
    for i in 0..MR {
        wheel[col + i] = [255.0, 0.0, 255.0 - ramp(i, MR)];
    }
    wheel
}

/// Colors a single normalised flow vector.
pub fn uv_to_rgb(wheel: &[[f32; 3]; NCOLS], u: f32, v: f32) -> [u8; 3] {
    let rad = (u * u + v * v).sqrt();
    let a = (-v).atan2(-u) / std::f32::consts::PI;
    let fk = (a + 1.0) / 2.0 * (NCOLS - 1) as f32;
    let k0 = (fk.floor() as usize).min(NCOLS - 1);
    let k1 = if k0 + 1 == NCOLS { 0 } else { k0 + 1 };
    let f = fk - k0 as f32;

    let mut rgb = [0u8; 3];
    for (ch, out) in rgb.iter_mut().enumerate() {
        let col0 = wheel[k0][ch] / 255.0;
        let col1 = wheel[k1][ch] / 255.0;
        let mut col = (1.0 - f) * col0 + f * col1;
        if rad <= 1.0 {
            col = 1.0 - rad * (1.0 - col);
        } else {
            col *= 0.75;
        }
        *out = (255.0 * col).floor().clamp(0.0, 255.0) as u8;
    }
    rgb
}

/// Renders a `(2, H, W)` flow field, optionally clamping components to `[0, clip]`.
pub fn flow_to_image(flow: &[Vec<Vec<f32>>], clip: Option<f32>) -> RgbImage {
    let (Some(us), Some(vs)) = (flow.first(), flow.get(1)) else {
        return RgbImage::new(0, 0);
    };
    let h = us.len();
    let w = us.first().map(Vec::len).unwrap_or(0);
    let clip_value = |x: f32| match clip {
        Some(c) => x.clamp(0.0, c),
        None => x,
    };

    let mut rad_max = 0.0f32;
    for (urow, vrow) in us.iter().zip(vs) {
        for (&u, &v) in urow.iter().zip(vrow) {
            let (u, v) = (clip_value(u), clip_value(v));
            rad_max = rad_max.max((u * u + v * v).sqrt());
        }
    }
    let scale = rad_max + 1e-5;
    debug!(rad_max, width = w, height = h, "rendering flow");

    let wheel = colorwheel();
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let u = clip_value(us[y][x]) / scale;
        let v = clip_value(vs[y][x]) / scale;
        image::Rgb(uv_to_rgb(&wheel, u, v))
    })
}

/// Stacks `frame` above `flow`.
pub fn compose(frame: &RgbImage, flow: &RgbImage) -> Result<RgbImage> {
    let width = frame.width().max(flow.width());
    let mut out = RgbImage::new(width, frame.height() + flow.height());
    out.copy_from(frame, 0, 0)
        .context("failed to place frame")?;
    out.copy_from(flow, 0, frame.height())
        .context("failed to place flow")?;
    Ok(out)
}

pub fn output_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{index:05}.png"))
}

pub fn write_frame(dir: &Path, index: usize, image: &RgbImage) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    let path = output_path(dir, index);
    image
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
