//! Engine options and shared request types
//!
//! Every tuning constant of the pipeline lives here with a documented
//! default, so behavior can be adjusted (and tested) without touching the
//! algorithms.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Options for the full-image colorization pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorizeOptions {
    /// Number of tile windows per axis. 1 disables the tiled pass and
    /// uses the global prediction alone.
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,

    /// Window size divisor relative to the even partition:
    /// window = dim / (grid * overlap_factor). 0.6 gives adjacent windows
    /// at least 40% overlap along each axis.
    #[serde(default = "default_overlap_factor")]
    pub overlap_factor: f32,

    /// Width in pixels of the zeroed border strip in the tile weight mask.
    #[serde(default = "default_tile_border")]
    pub tile_border: u32,

    /// Gaussian kernel size that feathers the tile weight mask.
    #[serde(default = "default_mask_kernel")]
    pub mask_kernel: u32,

    /// Share of the tiled pass in the final chroma mix; the global pass
    /// contributes the remainder. Raising the global share trades fine
    /// detail for fewer local hue swings.
    #[serde(default = "default_tile_mix")]
    pub tile_mix: f32,

    /// How colorful the output should be. The strongest chroma in the
    /// image is remapped to roughly `vibrancy * stretch_target`.
    #[serde(default = "default_vibrancy")]
    pub vibrancy: f32,

    /// Gamma applied to each chroma channel during the adaptive stretch.
    /// Values below 1 lift faint color more than strong color.
    #[serde(default = "default_stretch_gamma")]
    pub stretch_gamma: f32,

    /// Chroma magnitude the strongest pixel reaches per unit of vibrancy.
    #[serde(default = "default_stretch_target")]
    pub stretch_target: f32,
}

fn default_grid_size() -> u32 {
    4
}

fn default_overlap_factor() -> f32 {
    0.6
}

fn default_tile_border() -> u32 {
    10
}

fn default_mask_kernel() -> u32 {
    31
}

fn default_tile_mix() -> f32 {
    0.8
}

fn default_vibrancy() -> f32 {
    2.0
}

fn default_stretch_gamma() -> f32 {
    0.6
}

fn default_stretch_target() -> f32 {
    25.0
}

impl Default for ColorizeOptions {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
            overlap_factor: default_overlap_factor(),
            tile_border: default_tile_border(),
            mask_kernel: default_mask_kernel(),
            tile_mix: default_tile_mix(),
            vibrancy: default_vibrancy(),
            stretch_gamma: default_stretch_gamma(),
            stretch_target: default_stretch_target(),
        }
    }
}

/// Options for mask-guided refinement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineOptions {
    /// Multiplier on the local prediction. Larger than the global
    /// vibrancy so a brushed edit reads clearly against the background.
    #[serde(default = "default_refine_vibrancy")]
    pub refine_vibrancy: f32,

    /// Pixels whose chroma magnitude lands in (neutral_cutoff,
    /// saturation_floor) are rescaled up to exactly the floor, keeping
    /// their hue.
    #[serde(default = "default_saturation_floor")]
    pub saturation_floor: f32,

    /// Magnitudes at or below this are treated as noise and left alone.
    #[serde(default = "default_neutral_cutoff")]
    pub neutral_cutoff: f32,

    /// Share of the target color in the guidance blend; the prediction
    /// keeps the rest for texture and shading variation.
    #[serde(default = "default_guidance_weight")]
    pub guidance_weight: f32,

    /// Margin added around the mask bounding box, as a fraction of its
    /// larger side.
    #[serde(default = "default_crop_margin")]
    pub crop_margin: f32,

    /// Floor for the feathering-mask dilation kernel.
    #[serde(default = "default_dilate_kernel_min")]
    pub dilate_kernel_min: u32,

    /// Crop minor dimension divided by this gives the dilation kernel.
    #[serde(default = "default_dilate_kernel_divisor")]
    pub dilate_kernel_divisor: u32,

    /// Floor for the feathering Gaussian kernel.
    #[serde(default = "default_feather_kernel_min")]
    pub feather_kernel_min: u32,

    /// Crop minor dimension divided by this gives the feathering kernel.
    #[serde(default = "default_feather_kernel_divisor")]
    pub feather_kernel_divisor: u32,

    /// New chroma above this magnitude counts as newly vibrant for the
    /// vibrancy guard.
    #[serde(default = "default_guard_new_min")]
    pub guard_new_min: f32,

    /// Existing chroma below this magnitude counts as near-neutral for
    /// the vibrancy guard.
    #[serde(default = "default_guard_old_max")]
    pub guard_old_max: f32,

    /// Gaussian kernel size that softens the guard edges.
    #[serde(default = "default_guard_kernel")]
    pub guard_kernel: u32,

    /// Options for the full colorization computed when no background is
    /// supplied.
    #[serde(default)]
    pub colorize: ColorizeOptions,
}

fn default_refine_vibrancy() -> f32 {
    4.5
}

fn default_saturation_floor() -> f32 {
    20.0
}

fn default_neutral_cutoff() -> f32 {
    2.0
}

fn default_guidance_weight() -> f32 {
    0.85
}

fn default_crop_margin() -> f32 {
    0.1
}

fn default_dilate_kernel_min() -> u32 {
    5
}

fn default_dilate_kernel_divisor() -> u32 {
    20
}

fn default_feather_kernel_min() -> u32 {
    11
}

fn default_feather_kernel_divisor() -> u32 {
    6
}

fn default_guard_new_min() -> f32 {
    2.0
}

fn default_guard_old_max() -> f32 {
    8.0
}

fn default_guard_kernel() -> u32 {
    15
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            refine_vibrancy: default_refine_vibrancy(),
            saturation_floor: default_saturation_floor(),
            neutral_cutoff: default_neutral_cutoff(),
            guidance_weight: default_guidance_weight(),
            crop_margin: default_crop_margin(),
            dilate_kernel_min: default_dilate_kernel_min(),
            dilate_kernel_divisor: default_dilate_kernel_divisor(),
            feather_kernel_min: default_feather_kernel_min(),
            feather_kernel_divisor: default_feather_kernel_divisor(),
            guard_new_min: default_guard_new_min(),
            guard_old_max: default_guard_old_max(),
            guard_kernel: default_guard_kernel(),
            colorize: ColorizeOptions::default(),
        }
    }
}

/// Cooperative cancellation handle.
///
/// Checked between tile predictions and before the refinement's local
/// prediction; a tile already running is never interrupted mid-flight.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
