/* Handle how burned pixels are recorded depending on the output */

use crate::rasterization::pixel_functions::PixelFn;
use fixedbitset::FixedBitSet;
use ndarray::ArrayViewMut2;
use num_traits::Num;

pub trait PixelWriter<N: Num> {
    fn write(&mut self, y: usize, x: usize, value: N, background: N);
}

// writer for dense 2-D bands
pub struct DenseArrayWriter<'a, N> {
    band: ArrayViewMut2<'a, N>,
    pxfn: PixelFn<N>,
}

impl<N: Num> PixelWriter<N> for DenseArrayWriter<'_, N> {
    fn write(&mut self, y: usize, x: usize, value: N, background: N) {
        (self.pxfn)(&mut self.band, y, x, value, background);
    }
}

impl<'a, N: Num> DenseArrayWriter<'a, N> {
    pub fn new(band: ArrayViewMut2<'a, N>, pxfn: PixelFn<N>) -> Self {
        Self { band, pxfn }
    }
}

/// Row-major membership mask of burned pixels.
pub struct MaskWriter {
    bits: FixedBitSet,
    ncols: usize,
    nrows: usize,
}

impl MaskWriter {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            bits: FixedBitSet::with_capacity(nrows * ncols),
            ncols,
            nrows,
        }
    }

    #[inline]
    pub fn contains(&self, y: usize, x: usize) -> bool {
        y < self.nrows && x < self.ncols && self.bits.contains(y * self.ncols + x)
    }
}

impl<N: Num> PixelWriter<N> for MaskWriter {
    fn write(&mut self, y: usize, x: usize, _value: N, _background: N) {
        if y < self.nrows && x < self.ncols {
            self.bits.insert(y * self.ncols + x);
        }
    }
}
