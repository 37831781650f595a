use ndarray::{s, Array2, Axis as NdAxis, Zip};
use std::ops::Range;
use tracing::debug;

use super::filters::{median_disk, sobel, to_ubyte};
use super::watershed::watershed;
use crate::config::IsolationParams;
use crate::error::{Axis, ImagingError};

const BACKGROUND: u8 = 1;
const FOREGROUND: u8 = 2;

/// Raw camera frame together with its physical pixel pitch
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub pixels: Array2<f64>,
    /// Physical size of one pixel
    pub resolution: f64,
    pub resolution_units: String,
}

/// Foreground region cropped out of a frame
#[derive(Debug, Clone, PartialEq)]
pub struct IsolatedRegion {
    pub pixels: Array2<f64>,
    /// Row span of the crop within the source frame (half-open)
    pub rows: Range<usize>,
    /// Column span of the crop within the source frame (half-open)
    pub cols: Range<usize>,
}

impl IsolatedRegion {
    pub fn shape(&self) -> (usize, usize) {
        self.pixels.dim()
    }
}

/// Isolate the bright foreground region of a noisy frame.
///
/// Pixels under `clip_fraction * max` are clipped, a median-filtered 8-bit copy
/// seeds a watershed over its Sobel gradient, and everything the watershed does
/// not label as foreground is zeroed. The crop box comes from the nonzero
/// row/column projections of the median-filtered copy, not from the zeroed
/// frame.
pub fn isolate(frame: &Array2<f64>, params: &IsolationParams) -> Result<IsolatedRegion, ImagingError> {
    if frame.is_empty() {
        return Err(ImagingError::DegenerateFrame { min: 0.0, max: 0.0 });
    }

    // f64::min/max skip NaN, so non-finite pixels must be caught up front
    if let Some(&bad) = frame.iter().find(|v| !v.is_finite()) {
        return Err(ImagingError::DegenerateFrame { min: bad, max: bad });
    }

    let (min, max) = frame
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !min.is_finite() || !max.is_finite() || max <= min || max <= 0.0 {
        return Err(ImagingError::DegenerateFrame { min, max });
    }

    let threshold = max * params.clip_fraction;
    let clipped = frame.mapv(|v| if v < threshold { 0.0 } else { v });

    let denoised = median_disk(&to_ubyte(&clipped, max), params.median_radius);
    let elevation = sobel(&denoised);

    let markers = denoised.mapv(|v| {
        let level = v as f64 / 255.0;
        if level < params.low_marker {
            BACKGROUND
        } else if level > params.high_marker {
            FOREGROUND
        } else {
            0
        }
    });
    let labels = watershed(&elevation, &markers);

    let mut masked = clipped;
    Zip::from(&mut masked).and(&labels).for_each(|px, &label| {
        if label != FOREGROUND {
            *px = 0.0;
        }
    });

    let rows = nonzero_span(&denoised, NdAxis(1)).ok_or(ImagingError::EmptyRegion { axis: Axis::Rows })?;
    let cols = nonzero_span(&denoised, NdAxis(0)).ok_or(ImagingError::EmptyRegion { axis: Axis::Cols })?;

    debug!(
        rows = ?rows,
        cols = ?cols,
        frame_rows = frame.nrows(),
        frame_cols = frame.ncols(),
        "isolated region"
    );

    let pixels = masked.slice(s![rows.clone(), cols.clone()]).to_owned();
    Ok(IsolatedRegion { pixels, rows, cols })
}

/// Span from the first to one past the last nonzero sum along `sum_axis`
fn nonzero_span(image: &Array2<u8>, sum_axis: NdAxis) -> Option<Range<usize>> {
    let sums = image.map(|&v| v as u64).sum_axis(sum_axis);
    let first = sums.iter().position(|&s| s != 0)?;
    let last = sums.iter().rposition(|&s| s != 0)?;
    Some(first..last + 1)
}
