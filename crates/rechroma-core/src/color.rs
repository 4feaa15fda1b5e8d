//! Color space decomposition
//!
//! Splits an 8-bit RGB image into a luma plane in [0, 255] and two signed
//! chroma planes centered on zero, and recombines them. Zero chroma is
//! neutral gray, which is what the magnitude and gamma math in the
//! pipeline relies on. Conversions go through CIE LAB with a D65 white
//! point; 8-bit values are fed to the transform directly, so the pair of
//! functions is exactly inverse of itself up to rounding.

use image::RgbImage;
use rayon::prelude::*;

use crate::error::EngineError;
use crate::plane::Plane;

/// Use parallel conversion above this many pixels.
const PARALLEL_THRESHOLD: usize = 100_000;

/// LAB color representation (CIE L*a*b*)
/// - L: 0.0-100.0 (lightness)
/// - a: approximately -128 to +128 (green-red axis)
/// - b: approximately -128 to +128 (blue-yellow axis)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lab {
    pub l: f32,
    pub a: f32,
    pub b: f32,
}

/// D65 standard illuminant reference white point
const D65_X: f32 = 0.95047;
const D65_Y: f32 = 1.00000;
const D65_Z: f32 = 1.08883;

/// sRGB to XYZ matrix (D65)
const SRGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.119_192, 0.9503041],
];

/// XYZ to sRGB matrix (D65)
const XYZ_TO_SRGB: [[f32; 3]; 3] = [
    [3.2404542, -1.5371385, -0.4985314],
    [-0.969_266, 1.8760108, 0.0415560],
    [0.0556434, -0.2040259, 1.0572252],
];

/// LAB f(t) function
#[inline]
fn lab_f(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    const DELTA_CUBED: f32 = DELTA * DELTA * DELTA; // ~0.008856

    if t > DELTA_CUBED {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

/// LAB f^-1(t) inverse function
#[inline]
fn lab_f_inv(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;

    if t > DELTA {
        t * t * t
    } else {
        3.0 * DELTA * DELTA * (t - 4.0 / 29.0)
    }
}

/// Convert RGB to CIE LAB (D65 illuminant)
///
/// Input: RGB values in range 0.0-1.0
/// Output: LAB where L is 0-100, a and b are approximately -128 to +128
#[inline]
pub fn rgb_to_lab(r: f32, g: f32, b: f32) -> Lab {
    let r = r.max(0.0);
    let g = g.max(0.0);
    let b = b.max(0.0);

    let x = SRGB_TO_XYZ[0][0] * r + SRGB_TO_XYZ[0][1] * g + SRGB_TO_XYZ[0][2] * b;
    let y = SRGB_TO_XYZ[1][0] * r + SRGB_TO_XYZ[1][1] * g + SRGB_TO_XYZ[1][2] * b;
    let z = SRGB_TO_XYZ[2][0] * r + SRGB_TO_XYZ[2][1] * g + SRGB_TO_XYZ[2][2] * b;

    // Normalize by reference white
    let fx = lab_f(x / D65_X);
    let fy = lab_f(y / D65_Y);
    let fz = lab_f(z / D65_Z);

    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let b = 200.0 * (fy - fz);

    Lab { l, a, b }
}

/// Convert CIE LAB to RGB (D65 illuminant)
///
/// Input: LAB where L is 0-100, a and b are approximately -128 to +128
/// Output: RGB values (may be outside 0.0-1.0 for out-of-gamut colors)
#[inline]
pub fn lab_to_rgb(lab: Lab) -> (f32, f32, f32) {
    let Lab { l, a, b } = lab;

    let fy = (l + 16.0) / 116.0;
    let fx = a / 500.0 + fy;
    let fz = fy - b / 200.0;

    let x = D65_X * lab_f_inv(fx);
    let y = D65_Y * lab_f_inv(fy);
    let z = D65_Z * lab_f_inv(fz);

    let r = XYZ_TO_SRGB[0][0] * x + XYZ_TO_SRGB[0][1] * y + XYZ_TO_SRGB[0][2] * z;
    let g = XYZ_TO_SRGB[1][0] * x + XYZ_TO_SRGB[1][1] * y + XYZ_TO_SRGB[1][2] * z;
    let b = XYZ_TO_SRGB[2][0] * x + XYZ_TO_SRGB[2][1] * y + XYZ_TO_SRGB[2][2] * z;

    (r, g, b)
}

/// Luma and signed chroma planes of one image.
///
/// Luma is scaled to [0, 255]; chroma is signed, nominally in [-128, 127].
pub struct LabPlanes {
    pub luma: Plane,
    pub chroma_a: Plane,
    pub chroma_b: Plane,
}

#[inline]
fn pixel_to_lab8(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let lab = rgb_to_lab(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    (lab.l * 255.0 / 100.0, lab.a, lab.b)
}

#[inline]
fn lab8_to_pixel(l: f32, a: f32, b: f32) -> [u8; 3] {
    let (r, g, b) = lab_to_rgb(Lab {
        l: l * 100.0 / 255.0,
        a,
        b,
    });
    [
        (r.clamp(0.0, 1.0) * 255.0).round() as u8,
        (g.clamp(0.0, 1.0) * 255.0).round() as u8,
        (b.clamp(0.0, 1.0) * 255.0).round() as u8,
    ]
}

/// Split an RGB image into luma and chroma planes.
pub fn decompose(image: &RgbImage) -> LabPlanes {
    let (width, height) = image.dimensions();
    let num_pixels = (width * height) as usize;
    let raw = image.as_raw().as_slice();

    let mut lab = vec![0.0f32; num_pixels * 3];
    if num_pixels >= PARALLEL_THRESHOLD {
        lab.par_chunks_mut(3)
            .zip(raw.par_chunks(3))
            .for_each(|(dst, src)| {
                let (l, a, b) = pixel_to_lab8(src[0], src[1], src[2]);
                dst[0] = l;
                dst[1] = a;
                dst[2] = b;
            });
    } else {
        for (dst, src) in lab.chunks_exact_mut(3).zip(raw.chunks_exact(3)) {
            let (l, a, b) = pixel_to_lab8(src[0], src[1], src[2]);
            dst[0] = l;
            dst[1] = a;
            dst[2] = b;
        }
    }

    let mut luma = Vec::with_capacity(num_pixels);
    let mut chroma_a = Vec::with_capacity(num_pixels);
    let mut chroma_b = Vec::with_capacity(num_pixels);
    for pixel in lab.chunks_exact(3) {
        luma.push(pixel[0]);
        chroma_a.push(pixel[1]);
        chroma_b.push(pixel[2]);
    }

    LabPlanes {
        luma: Plane::from_raw(width, height, luma).expect("plane buffer matches dimensions"),
        chroma_a: Plane::from_raw(width, height, chroma_a)
            .expect("plane buffer matches dimensions"),
        chroma_b: Plane::from_raw(width, height, chroma_b)
            .expect("plane buffer matches dimensions"),
    }
}

/// Recombine luma and chroma planes into an RGB image.
///
/// Chroma is clamped to [-128, 127] before the inverse transform; output
/// components are clamped to [0, 255]. All planes must share dimensions.
pub fn compose(luma: &Plane, chroma_a: &Plane, chroma_b: &Plane) -> RgbImage {
    let (width, height) = luma.dimensions();
    debug_assert_eq!(chroma_a.dimensions(), (width, height));
    debug_assert_eq!(chroma_b.dimensions(), (width, height));

    let num_pixels = (width * height) as usize;
    let l_raw = luma.as_raw().as_slice();
    let a_raw = chroma_a.as_raw().as_slice();
    let b_raw = chroma_b.as_raw().as_slice();

    let mut rgb = vec![0u8; num_pixels * 3];
    let convert = |i: usize, dst: &mut [u8]| {
        let pixel = lab8_to_pixel(
            l_raw[i],
            a_raw[i].clamp(-128.0, 127.0),
            b_raw[i].clamp(-128.0, 127.0),
        );
        dst.copy_from_slice(&pixel);
    };

    if num_pixels >= PARALLEL_THRESHOLD {
        rgb.par_chunks_mut(3)
            .enumerate()
            .for_each(|(i, dst)| convert(i, dst));
    } else {
        for (i, dst) in rgb.chunks_exact_mut(3).enumerate() {
            convert(i, dst);
        }
    }

    RgbImage::from_raw(width, height, rgb).expect("pixel buffer matches dimensions")
}

/// A user-supplied target color, reduced to its chroma offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetColor {
    pub chroma_a: f32,
    pub chroma_b: f32,
}

/// Parse a `#RRGGBB` color into chroma offsets.
///
/// Validation happens up front so callers can reject a malformed color
/// instead of silently dropping the guidance step.
pub fn parse_hex_color(value: &str) -> Result<TargetColor, EngineError> {
    let hex = value.strip_prefix('#').unwrap_or(value);
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(EngineError::InvalidColor(value.to_string()));
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|_| EngineError::InvalidColor(value.to_string()))
    };
    let r = channel(0..2)?;
    let g = channel(2..4)?;
    let b = channel(4..6)?;

    let lab = rgb_to_lab(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    Ok(TargetColor {
        chroma_a: lab.a,
        chroma_b: lab.b,
    })
}
