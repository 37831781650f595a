//! Small image filters used by region isolation.
//!
//! All filters operate on `ndarray` images indexed `(row, col)` and never
//! mutate their input.

use ndarray::Array2;

/// Linearly rescale a non-negative image so that `max` maps to 255
pub fn to_ubyte(image: &Array2<f64>, max: f64) -> Array2<u8> {
    image.mapv(|v| (v / max * 255.0).round().clamp(0.0, 255.0) as u8)
}

/// Offsets `(dy, dx)` of a disk footprint with `dy² + dx² <= radius²`
pub fn disk_offsets(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if dy * dy + dx * dx <= r * r {
                offsets.push((dy, dx));
            }
        }
    }
    offsets
}

/// Median over a disk footprint.
///
/// Near the borders only the in-image part of the footprint is used. With an
/// even number of samples the upper median is taken.
pub fn median_disk(image: &Array2<u8>, radius: usize) -> Array2<u8> {
    let (rows, cols) = image.dim();
    let offsets = disk_offsets(radius);
    let mut window = Vec::with_capacity(offsets.len());

    Array2::from_shape_fn((rows, cols), |(r, c)| {
        window.clear();
        for &(dy, dx) in &offsets {
            let y = r as isize + dy;
            let x = c as isize + dx;
            if y >= 0 && x >= 0 && (y as usize) < rows && (x as usize) < cols {
                window.push(image[[y as usize, x as usize]]);
            }
        }
        window.sort_unstable();
        window[window.len() / 2]
    })
}

/// Mirror an out-of-range index back into `0..len` (edge sample repeated)
fn reflect(i: isize, len: usize) -> usize {
    let n = len as isize;
    let period = 2 * n;
    let mut m = i.rem_euclid(period);
    if m >= n {
        m = period - 1 - m;
    }
    m as usize
}

/// Sobel gradient magnitude of an 8-bit image scaled to `[0, 1]`.
///
/// Uses the normalized kernels `[1, 2, 1] / 4 ⊗ [1, 0, -1]` with reflected
/// borders and combines both directions as `sqrt((gx² + gy²) / 2)`.
pub fn sobel(image: &Array2<u8>) -> Array2<f64> {
    let (rows, cols) = image.dim();
    let at = |r: isize, c: isize| -> f64 {
        image[[reflect(r, rows), reflect(c, cols)]] as f64 / 255.0
    };
    const SMOOTH: [f64; 3] = [0.25, 0.5, 0.25];

    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let (r, c) = (r as isize, c as isize);
        let mut gx = 0.0;
        let mut gy = 0.0;
        for (k, w) in SMOOTH.iter().enumerate() {
            let d = k as isize - 1;
            gy += w * (at(r - 1, c + d) - at(r + 1, c + d));
            gx += w * (at(r + d, c - 1) - at(r + d, c + 1));
        }
        ((gx * gx + gy * gy) / 2.0).sqrt()
    })
}
