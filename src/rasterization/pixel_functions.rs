/* On-demand functions deciding how a burned value lands on a pixel */

use ndarray::ArrayViewMut2;
use num_traits::Num;

pub type PixelFn<N> = fn(&mut ArrayViewMut2<N>, usize, usize, N, N);

// always set last value
pub fn last_values<N: Num + Copy>(array: &mut ArrayViewMut2<N>, y: usize, x: usize, value: N, _bg: N) {
    array[[y, x]] = value;
}

