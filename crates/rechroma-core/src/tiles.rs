//! Overlapping tile grid and soft blend weights
//!
//! The tiled pass covers the image with a grid of equal-size windows that
//! overlap by at least 40% along each axis. Each window is blended with a
//! soft weight mask that is ~1 in the interior and falls to ~0 near the
//! window edges, so neighboring predictions cross-fade instead of seaming.

use image::Luma;

use crate::plane::{self, Plane};

/// Placement of an overlapping window grid over an image.
#[derive(Debug, Clone)]
pub struct TileGrid {
    pub window_width: u32,
    pub window_height: u32,
    /// Left edges of the window columns.
    pub xs: Vec<u32>,
    /// Top edges of the window rows.
    pub ys: Vec<u32>,
}

impl TileGrid {
    /// Lay out `grid_size` x `grid_size` windows over a `width` x `height`
    /// image.
    ///
    /// Window size is `dim / (grid_size * overlap_factor)`, capped at the
    /// image size. Offsets are evenly spaced from 0 to `dim - window`
    /// inclusive, so the first window starts at the image origin and the
    /// last one ends exactly at the far edge.
    pub fn new(width: u32, height: u32, grid_size: u32, overlap_factor: f32) -> Self {
        let grid = grid_size.max(1);

        let window_for = |dim: u32| -> u32 {
            if grid == 1 {
                return dim;
            }
            ((dim as f32 / (grid as f32 * overlap_factor)) as u32).min(dim)
        };
        let window_width = window_for(width);
        let window_height = window_for(height);

        Self {
            window_width,
            window_height,
            xs: spaced_offsets(width - window_width, grid),
            ys: spaced_offsets(height - window_height, grid),
        }
    }

    /// Top-left corners of every window, row-major.
    pub fn offsets(&self) -> Vec<(u32, u32)> {
        let mut offsets = Vec::with_capacity(self.ys.len() * self.xs.len());
        for &y in &self.ys {
            for &x in &self.xs {
                offsets.push((x, y));
            }
        }
        offsets
    }

    pub fn len(&self) -> usize {
        self.xs.len() * self.ys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `count` evenly spaced integer offsets from 0 to `max` inclusive.
fn spaced_offsets(max: u32, count: u32) -> Vec<u32> {
    if count <= 1 {
        return vec![0];
    }
    (0..count)
        .map(|i| (max as f64 * i as f64 / (count - 1) as f64) as u32)
        .collect()
}

/// Soft blend weight for a window of the given size.
///
/// All ones with a `border`-wide strip zeroed on every side, then blurred
/// with a `ksize` Gaussian. The same mask is shared by every window of a
/// pass. A window too small to keep an interior comes out near-zero
/// everywhere; the pipeline falls back to the global estimate wherever
/// the accumulated weight stays at zero.
pub fn soft_weight_mask(width: u32, height: u32, border: u32, ksize: u32) -> Plane {
    let mut mask = Plane::from_pixel(width, height, Luma([1.0f32]));
    for (x, y, pixel) in mask.enumerate_pixels_mut() {
        if x < border || y < border || x + border >= width || y + border >= height {
            pixel[0] = 0.0;
        }
    }
    plane::gaussian_blur(&mask, ksize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_span_full_range() {
        for (dim, grid) in [(1000u32, 3u32), (1024, 4), (333, 2), (4096, 5)] {
            let tiles = TileGrid::new(dim, dim, grid, 0.6);
            assert_eq!(tiles.xs.len(), grid as usize);
            assert_eq!(tiles.xs[0], 0, "first window must start at 0");
            assert_eq!(
                tiles.xs[grid as usize - 1] + tiles.window_width,
                dim,
                "last window must end at the image edge (dim={}, grid={})",
                dim,
                grid
            );
        }
    }

    #[test]
    fn test_full_coverage() {
        // Every pixel must be inside at least one window: consecutive
        // offsets never step further than the window size.
        for (dim, grid) in [(257u32, 3u32), (1000, 4), (640, 2), (119, 3)] {
            let tiles = TileGrid::new(dim, dim, grid, 0.6);
            for pair in tiles.xs.windows(2) {
                assert!(
                    pair[1] - pair[0] <= tiles.window_width,
                    "gap between windows at dim={}, grid={}",
                    dim,
                    grid
                );
            }
        }
    }

    #[test]
    fn test_single_window_grid() {
        let tiles = TileGrid::new(640, 480, 1, 0.6);
        assert_eq!(tiles.window_width, 640);
        assert_eq!(tiles.window_height, 480);
        assert_eq!(tiles.offsets(), vec![(0, 0)]);
    }

    #[test]
    fn test_window_never_exceeds_image() {
        let tiles = TileGrid::new(50, 40, 2, 0.6);
        assert!(tiles.window_width <= 50);
        assert!(tiles.window_height <= 40);
    }

    #[test]
    fn test_soft_weight_mask_shape() {
        let mask = soft_weight_mask(200, 160, 10, 31);

        let mut max = f32::MIN;
        let mut min = f32::MAX;
        for pixel in mask.pixels() {
            max = max.max(pixel[0]);
            min = min.min(pixel[0]);
        }
        assert!((0.0..=1.0).contains(&min), "min = {}", min);
        assert!(max <= 1.0 + 1e-4, "max = {}", max);

        // Interior stays at full weight, corners fall close to zero.
        assert!(mask.get_pixel(100, 80)[0] > 0.99);
        assert!(mask.get_pixel(0, 0)[0] < 0.05);
        assert!(mask.get_pixel(199, 159)[0] < 0.05);
    }
}
