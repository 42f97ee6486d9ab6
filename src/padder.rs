use candle_core::{Result, Tensor};

const ALIGN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PadMode {
    /// Split padding evenly on all sides.
    #[default]
    Sintel,
    /// Split horizontal padding evenly, put all vertical padding at the bottom.
    Kitti,
}

/// Replicate-pads `(N, C, H, W)` tensors so both spatial dims are multiples of 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPadder {
    height: usize,
    width: usize,
    left: usize,
    right: usize,
    top: usize,
    bottom: usize,
}

impl InputPadder {
    pub fn new(height: usize, width: usize, mode: PadMode) -> Self {
        let pad_h = (ALIGN - height % ALIGN) % ALIGN;
        let pad_w = (ALIGN - width % ALIGN) % ALIGN;
        let (top, bottom) = match mode {
            PadMode::Sintel => (pad_h / 2, pad_h - pad_h / 2),
            PadMode::Kitti => (0, pad_h),
        };
        Self {
            height,
            width,
            left: pad_w / 2,
            right: pad_w - pad_w / 2,
            top,
            bottom,
        }
    }

    pub fn for_tensor(t: &Tensor, mode: PadMode) -> Result<Self> {
        let (_, _, h, w) = t.dims4()?;
        Ok(Self::new(h, w, mode))
    }

    pub fn pad(&self, t: &Tensor) -> Result<Tensor> {
        t.pad_with_same(2, self.top, self.bottom)?
            .pad_with_same(3, self.left, self.right)
    }

    pub fn unpad(&self, t: &Tensor) -> Result<Tensor> {
        t.narrow(2, self.top, self.height)?
            .narrow(3, self.left, self.width)
    }
}
