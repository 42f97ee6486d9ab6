use candle_core::{Result, Tensor};
use clap::ValueEnum;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FilterType {
    #[default]
    None,
    Mean,
    Median,
}

/// Temporal smoothing over the last `size` flow fields.
///
/// The ring buffer starts zero-filled, so the first `size - 1` outputs are
/// pulled toward zero motion.
pub struct TemporalFilter {
    kind: FilterType,
    size: usize,
    slots: Vec<Tensor>,
    count: usize,
}

impl TemporalFilter {
    pub fn new(kind: FilterType, size: usize) -> Self {
        Self {
            kind,
            size: size.max(1),
            slots: Vec::new(),
            count: 0,
        }
    }

    /// Records `flow` (shape `(1, 2, H, W)`) and returns the filtered field.
    pub fn push(&mut self, flow: &Tensor) -> Result<Tensor> {
        let reduce: fn(&Tensor) -> Result<Tensor> = match self.kind {
            FilterType::None => return Ok(flow.clone()),
            FilterType::Mean => |t| t.mean_keepdim(0),
            FilterType::Median => median_by_magnitude,
        };
        if self.slots.first().map(|s| s.dims() != flow.dims()).unwrap_or(true) {
            if !self.slots.is_empty() {
                warn!(
                    from = ?self.slots[0].dims(),
                    to = ?flow.dims(),
                    "flow shape changed, resetting temporal filter"
                );
            }
            let zeros = flow.zeros_like()?;
            self.slots = vec![zeros; self.size];
            self.count = 0;
        }
        let slot = self.count % self.size;
        self.slots[slot] = flow.clone();
        self.count += 1;
        debug!(slot, kind = ?self.kind, "filter slot updated");

        reduce(&Tensor::cat(&self.slots, 0)?)
    }
}

/// For each pixel, picks the `(u, v)` vector whose squared magnitude is the
/// lower median over the first axis of `stacked` (`(N, 2, H, W)`).
fn median_by_magnitude(stacked: &Tensor) -> Result<Tensor> {
    let (n, c, h, w) = stacked.dims4()?;
    let order = stacked
        .sqr()?
        .sum_keepdim(1)?
        .permute((1, 2, 3, 0))?
        .contiguous()?
        .arg_sort_last_dim(true)?;
    let index = order
        .narrow(3, (n - 1) / 2, 1)?
        .permute((3, 0, 1, 2))?
        .broadcast_as((1, c, h, w))?
        .contiguous()?;
    stacked.gather(&index, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn field(u: f32, v: f32) -> Tensor {
        Tensor::from_vec(vec![u, u, v, v], (1, 2, 1, 2), &Device::Cpu).unwrap()
    }

    fn values(t: &Tensor) -> Vec<f32> {
        t.flatten_all().unwrap().to_vec1::<f32>().unwrap()
    }

    #[test]
    fn none_passes_through() {
        let mut f = TemporalFilter::new(FilterType::None, 4);
        let out = f.push(&field(3.0, 4.0)).unwrap();
        assert_eq!(values(&out), vec![3.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn mean_includes_warmup_zeros() {
        let mut f = TemporalFilter::new(FilterType::Mean, 4);
        let out = f.push(&field(4.0, 8.0)).unwrap();
        assert_eq!(out.dims(), &[1, 2, 1, 2]);
        assert_eq!(values(&out), vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn mean_window_wraps() {
        let mut f = TemporalFilter::new(FilterType::Mean, 2);
        f.push(&field(2.0, 0.0)).unwrap();
        f.push(&field(4.0, 0.0)).unwrap();
        // overwrites the first slot
        let out = f.push(&field(8.0, 0.0)).unwrap();
        assert_eq!(values(&out), vec![6.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    fn median_picks_middle_magnitude_vector() {
        let mut f = TemporalFilter::new(FilterType::Median, 3);
        f.push(&field(10.0, 0.0)).unwrap();
        f.push(&field(0.0, 1.0)).unwrap();
        let out = f.push(&field(3.0, 4.0)).unwrap();
        assert_eq!(out.dims(), &[1, 2, 1, 2]);
        assert_eq!(values(&out), vec![3.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn median_per_pixel() {
        let mut f = TemporalFilter::new(FilterType::Median, 3);
        let a = Tensor::from_vec(vec![1.0f32, 9.0, 0.0, 0.0], (1, 2, 1, 2), &Device::Cpu).unwrap();
        let b = Tensor::from_vec(vec![5.0f32, 5.0, 0.0, 0.0], (1, 2, 1, 2), &Device::Cpu).unwrap();
        let c = Tensor::from_vec(vec![3.0f32, 2.0, 0.0, 0.0], (1, 2, 1, 2), &Device::Cpu).unwrap();
        f.push(&a).unwrap();
        f.push(&b).unwrap();
        let out = f.push(&c).unwrap();
        assert_eq!(values(&out), vec![3.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn even_window_uses_lower_median() {
        let mut f = TemporalFilter::new(FilterType::Median, 2);
        f.push(&field(1.0, 0.0)).unwrap();
        let out = f.push(&field(2.0, 0.0)).unwrap();
        assert_eq!(values(&out), vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn shape_change_resets_buffer() {
        let mut f = TemporalFilter::new(FilterType::Mean, 2);
        f.push(&field(2.0, 2.0)).unwrap();
        let bigger = Tensor::ones((1, 2, 2, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
        let out = f.push(&bigger).unwrap();
        assert_eq!(out.dims(), &[1, 2, 2, 2]);
        assert_eq!(values(&out), vec![0.5; 8]);
    }
}
