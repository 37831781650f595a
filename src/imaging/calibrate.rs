use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use super::isolate::IsolatedRegion;
use crate::error::ImagingError;

pub const IMAGE2D: &str = "image2d";

/// Physical extent of a distribution, centered on the origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub units: String,
}

impl Bounds {
    pub fn width_x(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn width_y(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Calibrated 2-D distribution handed to the simulation pipeline.
///
/// `pixel_data` row 0 is the bottom of the image (y increasing upward).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub bounds: Bounds,
    pub pixel_data: Array2<f64>,
}

impl DistributionDescriptor {
    /// Render in the distgen `xy_dist` text layout: a two line header with
    /// width, center and units per axis, then one whitespace separated line
    /// per pixel row.
    pub fn to_xy_dist(&self) -> String {
        let b = &self.bounds;
        let center_x = (b.max_x + b.min_x) / 2.0;
        let center_y = (b.max_y + b.min_y) / 2.0;

        let mut out = String::new();
        let _ = writeln!(out, "x {} {} [{}]", b.width_x(), center_x, b.units);
        let _ = writeln!(out, "y {} {}  [{}]", b.width_y(), center_y, b.units);
        for row in self.pixel_data.rows() {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            let _ = writeln!(out, "{}", line.join(" "));
        }
        out
    }
}

/// Convert an isolated region into a physically scaled distribution.
///
/// Widths are `resolution * shape` (rows give y, columns give x), the box is
/// centered on the origin and rows are flipped so that y grows upward. Units
/// are carried through unchanged.
pub fn calibrate(
    region: &IsolatedRegion,
    resolution: f64,
    resolution_units: &str,
) -> Result<DistributionDescriptor, ImagingError> {
    if !resolution.is_finite() || resolution <= 0.0 {
        return Err(ImagingError::InvalidResolution(resolution));
    }

    let (rows, cols) = region.shape();
    let width_x = resolution * cols as f64;
    let width_y = resolution * rows as f64;

    Ok(DistributionDescriptor {
        kind: IMAGE2D.to_string(),
        bounds: Bounds {
            min_x: -width_x / 2.0,
            max_x: width_x / 2.0,
            min_y: -width_y / 2.0,
            max_y: width_y / 2.0,
            units: resolution_units.to_string(),
        },
        pixel_data: region.pixels.slice(s![..;-1, ..]).to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn region(pixels: Array2<f64>) -> IsolatedRegion {
        let (rows, cols) = pixels.dim();
        IsolatedRegion { pixels, rows: 0..rows, cols: 0..cols }
    }

    #[test]
    fn test_bounds_are_centered() {
        let dist = calibrate(&region(Array2::zeros((4, 6))), 2.0, "um").unwrap();
        assert_eq!(dist.kind, "image2d");
        assert_eq!(dist.bounds.min_x, -6.0);
        assert_eq!(dist.bounds.max_x, 6.0);
        assert_eq!(dist.bounds.min_y, -4.0);
        assert_eq!(dist.bounds.max_y, 4.0);
        assert_eq!(dist.bounds.units, "um");
    }

    #[test]
    fn test_rows_are_flipped() {
        let dist = calibrate(&region(array![[1.0, 2.0], [3.0, 4.0]]), 1.0, "m").unwrap();
        assert_eq!(dist.pixel_data, array![[3.0, 4.0], [1.0, 2.0]]);
    }

    #[test]
    fn test_invalid_resolution() {
        let r = region(Array2::zeros((2, 2)));
        assert_eq!(calibrate(&r, 0.0, "um"), Err(ImagingError::InvalidResolution(0.0)));
        assert!(calibrate(&r, -1.0, "um").is_err());
        assert!(calibrate(&r, f64::NAN, "um").is_err());
    }

    #[test]
    fn test_symmetry_over_shapes() {
        for &res in &[0.5, 2.0, 9.0] {
            for &(h, w) in &[(1usize, 1usize), (3, 7), (480, 640)] {
                let dist = calibrate(&region(Array2::zeros((h, w))), res, "um").unwrap();
                assert!((dist.bounds.width_x() - res * w as f64).abs() < 1e-9);
                assert!((dist.bounds.width_y() - res * h as f64).abs() < 1e-9);
                assert!((dist.bounds.max_x + dist.bounds.min_x).abs() < 1e-9);
                assert!((dist.bounds.max_y + dist.bounds.min_y).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_xy_dist_text() {
        let dist = calibrate(&region(array![[1.0, 2.0], [3.0, 4.0]]), 3.0, "um").unwrap();
        let text = dist.to_xy_dist();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "x 6 0 [um]");
        assert_eq!(lines[1], "y 6 0  [um]");
        assert_eq!(lines[2], "3 4");
        assert_eq!(lines[3], "1 2");
    }
}
