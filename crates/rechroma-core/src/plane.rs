//! Single-channel f32 plane utilities
//!
//! The engine works on per-channel planes: one luma plane in [0, 255] and
//! two signed chroma planes. This module wraps the resampling and filter
//! primitives those planes need.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use imageproc::filter::{filter3x3, gaussian_blur_f32};

/// One image channel stored as f32.
pub type Plane = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Build a plane filled with a constant value.
pub fn filled(width: u32, height: u32, value: f32) -> Plane {
    Plane::from_pixel(width, height, Luma([value]))
}

/// Resample a plane with cubic interpolation.
pub fn resize(plane: &Plane, width: u32, height: u32) -> Plane {
    if plane.dimensions() == (width, height) {
        return plane.clone();
    }
    imageops::resize(plane, width, height, FilterType::CatmullRom)
}

/// Copy out a rectangular region.
pub fn crop(plane: &Plane, x: u32, y: u32, width: u32, height: u32) -> Plane {
    imageops::crop_imm(plane, x, y, width, height).to_image()
}

/// Sigma that gives an odd Gaussian kernel of size `ksize` its usual support.
pub fn kernel_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Gaussian blur parameterized by kernel size rather than sigma.
pub fn gaussian_blur(plane: &Plane, ksize: u32) -> Plane {
    gaussian_blur_f32(plane, kernel_sigma(ksize))
}

/// 3x3 mean filter, used to soften resampling blockiness.
pub fn mean_blur3(plane: &Plane) -> Plane {
    const KERNEL: [f32; 9] = [1.0 / 9.0; 9];
    filter3x3::<Luma<f32>, f32, f32>(plane, &KERNEL)
}

/// Clamp every sample into `[min, max]`.
pub fn clamp(plane: &mut Plane, min: f32, max: f32) {
    for pixel in plane.pixels_mut() {
        pixel[0] = pixel[0].clamp(min, max);
    }
}

/// Multiply every sample by `factor`.
pub fn scale(plane: &mut Plane, factor: f32) {
    for pixel in plane.pixels_mut() {
        pixel[0] *= factor;
    }
}
