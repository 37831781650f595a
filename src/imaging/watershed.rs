use ndarray::Array2;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Label of pixels no marker could reach
pub const UNLABELED: u8 = 0;

/// Pending pixel in the flood queue
struct FloodEntry {
    elevation: f64,
    age: u64,
    index: (usize, usize),
}

impl PartialEq for FloodEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FloodEntry {}

impl PartialOrd for FloodEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloodEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: lowest elevation first, then FIFO by age
        other
            .elevation
            .total_cmp(&self.elevation)
            .then_with(|| other.age.cmp(&self.age))
    }
}

/// Marker-driven watershed over an elevation map.
///
/// Every nonzero marker seeds its label; labels then flood outward through
/// 4-connected neighbours in order of increasing elevation. Equal elevations
/// are processed in insertion order, so the result only depends on the inputs.
pub fn watershed(elevation: &Array2<f64>, markers: &Array2<u8>) -> Array2<u8> {
    assert_eq!(elevation.dim(), markers.dim(), "elevation and markers must share a shape");

    let (rows, cols) = elevation.dim();
    let mut labels = markers.clone();
    let mut queue = BinaryHeap::new();
    let mut age = 0u64;

    for ((r, c), &label) in markers.indexed_iter() {
        if label != UNLABELED {
            queue.push(FloodEntry {
                elevation: elevation[[r, c]],
                age,
                index: (r, c),
            });
            age += 1;
        }
    }

    while let Some(entry) = queue.pop() {
        let (r, c) = entry.index;
        let label = labels[[r, c]];

        let neighbours = [
            (r.wrapping_sub(1), c),
            (r + 1, c),
            (r, c.wrapping_sub(1)),
            (r, c + 1),
        ];
        for (nr, nc) in neighbours {
            if nr >= rows || nc >= cols || labels[[nr, nc]] != UNLABELED {
                continue;
            }
            labels[[nr, nc]] = label;
            queue.push(FloodEntry {
                elevation: elevation[[nr, nc]],
                age,
                index: (nr, nc),
            });
            age += 1;
        }
    }

    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_ridge_separates_basins() {
        // two basins split by a high ridge in the middle column
        let elevation = array![
            [0.0, 0.1, 0.9, 0.1, 0.0],
            [0.0, 0.1, 0.9, 0.1, 0.0],
            [0.0, 0.1, 0.9, 0.1, 0.0],
        ];
        let mut markers = Array2::<u8>::zeros((3, 5));
        markers[[1, 0]] = 1;
        markers[[1, 4]] = 2;

        let labels = watershed(&elevation, &markers);
        for r in 0..3 {
            assert_eq!(labels[[r, 0]], 1);
            assert_eq!(labels[[r, 1]], 1);
            assert_eq!(labels[[r, 3]], 2);
            assert_eq!(labels[[r, 4]], 2);
            assert_ne!(labels[[r, 2]], UNLABELED);
        }
    }

    #[test]
    fn test_markers_are_kept() {
        let elevation = Array2::<f64>::zeros((4, 4));
        let markers = Array2::from_shape_fn((4, 4), |(r, _)| if r < 2 { 1u8 } else { 2 });
        assert_eq!(watershed(&elevation, &markers), markers);
    }

    #[test]
    fn test_no_markers_leaves_unlabeled() {
        let elevation = Array2::<f64>::zeros((3, 3));
        let markers = Array2::<u8>::zeros((3, 3));
        assert!(watershed(&elevation, &markers).iter().all(|&l| l == UNLABELED));
    }

    #[test]
    fn test_deterministic() {
        let elevation = Array2::from_shape_fn((8, 8), |(r, c)| ((r * 7 + c * 3) % 5) as f64 / 5.0);
        let mut markers = Array2::<u8>::zeros((8, 8));
        markers[[0, 0]] = 1;
        markers[[7, 7]] = 2;
        markers[[3, 4]] = 2;
        assert_eq!(watershed(&elevation, &markers), watershed(&elevation, &markers));
    }
}
