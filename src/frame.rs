use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::debug;

const FRAME_EXTENSIONS: [&str; 2] = ["png", "jpg"];

fn is_frame(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            FRAME_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Sorted list of the `png`/`jpg` files directly inside `dir`.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let rd = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read frame directory {}", dir.display()))?;
    let mut paths: Vec<PathBuf> = rd
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_frame(p))
        .collect();
    paths.sort();
    debug!(count = paths.len(), dir = %dir.display(), "listed frames");
    Ok(paths)
}

/// Pairs every frame with the one `frame_len` positions after it.
pub fn frame_pairs(frames: &[PathBuf], frame_len: usize) -> Vec<(PathBuf, PathBuf)> {
    if frame_len == 0 || frames.len() <= frame_len {
        return Vec::new();
    }
    frames
        .iter()
        .zip(&frames[frame_len..])
        .map(|(a, b)| (a.clone(), b.clone()))
        .collect()
}

/// Decodes a frame to RGB8 and builds the `(1, 3, H, W)` network input in `0..=255`.
pub fn load_image(path: &Path, device: &Device) -> Result<(RgbImage, Tensor)> {
    let img = image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .into_rgb8();
    let (w, h) = img.dimensions();
    let tensor = Tensor::from_vec(img.as_raw().clone(), (h as usize, w as usize, 3), device)
        .and_then(|t| t.permute((2, 0, 1)))
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t.unsqueeze(0))
        .with_context(|| format!("failed to build tensor for {}", path.display()))?;
    Ok((img, tensor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    #[test]
    fn lists_only_frames_sorted() {
        let dir = tempdir().unwrap();
        for name in ["b.png", "a.JPG", "c.txt", "d.jpeg"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("e.png")).unwrap();
        let frames = list_frames(dir.path()).unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.JPG", "b.png"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(list_frames(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn pairs_use_stride() {
        let frames: Vec<PathBuf> = (0..5).map(|i| PathBuf::from(format!("{i}.png"))).collect();
        let pairs = frame_pairs(&frames, 2);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], (frames[0].clone(), frames[2].clone()));
        assert_eq!(pairs[2], (frames[2].clone(), frames[4].clone()));
    }

    #[test]
    fn too_few_frames_gives_no_pairs() {
        let frames = vec![PathBuf::from("0.png"), PathBuf::from("1.png")];
        assert!(frame_pairs(&frames, 2).is_empty());
        assert!(frame_pairs(&frames, 0).is_empty());
        assert_eq!(frame_pairs(&frames, 1).len(), 1);
    }

    #[test]
    fn load_image_is_nchw_float() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let mut img = RgbImage::new(4, 3);
        img.put_pixel(1, 2, Rgb([10, 20, 30]));
        img.save(&path).unwrap();

        let (decoded, tensor) = load_image(&path, &Device::Cpu).unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(tensor.dims(), &[1, 3, 3, 4]);
        let values = tensor.squeeze(0).unwrap().to_vec3::<f32>().unwrap();
        assert_eq!(values[0][2][1], 10.0);
        assert_eq!(values[1][2][1], 20.0);
        assert_eq!(values[2][2][1], 30.0);
        assert_eq!(values[0][0][0], 0.0);
    }
}
