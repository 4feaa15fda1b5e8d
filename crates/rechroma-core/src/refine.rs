//! Mask-guided local refinement
//!
//! Re-predicts color inside a brushed region and feathers it back into a
//! previously colorized background. A vibrancy guard keeps a weak new
//! prediction from washing out color that is already strong, while still
//! letting genuinely new color land on near-neutral areas.

use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use tracing::debug;

use crate::color::{self, TargetColor};
use crate::error::EngineError;
use crate::models::{CancelToken, RefineOptions};
use crate::pipeline::{self, CHROMA_MAX, CHROMA_MIN, EPSILON};
use crate::plane::{self, Plane};
use crate::predictor::ChromaPredictor;

/// Inputs for one refinement pass.
pub struct RefineRequest<'a> {
    /// The original photograph.
    pub image: &'a RgbImage,
    /// Brush mask; non-zero pixels mark the region to re-color. May be a
    /// different resolution than the image.
    pub mask: &'a GrayImage,
    /// Previous composite to refine. When absent, a fresh full
    /// colorization is computed and used as the background.
    pub background: Option<&'a RgbImage>,
    /// Optional color the user wants the region to take.
    pub target_color: Option<TargetColor>,
}

/// Refine the masked region and return the updated background image.
pub fn refine_image(
    request: &RefineRequest,
    predictor: &dyn ChromaPredictor,
    options: &RefineOptions,
    cancel: &CancelToken,
) -> Result<RgbImage, EngineError> {
    let (width, height) = request.image.dimensions();

    let mask = conform_mask(request.mask, width, height);

    // An empty mask is a no-op, not an error: hand back the background
    // (computing it first if the caller did not supply one).
    let Some((box_x, box_y, box_w, box_h)) = mask_bounding_box(&mask) else {
        return match request.background {
            Some(background) => Ok(conform_background(background, width, height)),
            None => pipeline::colorize_image_cancellable(
                request.image,
                predictor,
                &options.colorize,
                cancel,
            ),
        };
    };

    let background = match request.background {
        Some(background) => conform_background(background, width, height),
        None => pipeline::colorize_image_cancellable(
            request.image,
            predictor,
            &options.colorize,
            cancel,
        )?,
    };

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    // Expand the box by a margin of its larger side, clipped to bounds.
    let margin = (box_w.max(box_h) as f32 * options.crop_margin) as u32;
    let x1 = box_x.saturating_sub(margin);
    let y1 = box_y.saturating_sub(margin);
    let x2 = (box_x + box_w + margin).min(width);
    let y2 = (box_y + box_h + margin).min(height);
    let crop_w = x2 - x1;
    let crop_h = y2 - y1;
    debug!(x1, y1, crop_w, crop_h, "refining region");

    // Localized prediction over the expanded crop.
    let planes = color::decompose(request.image);
    let patch = pipeline::predict_window(&planes.luma, x1, y1, crop_w, crop_h, predictor)?;
    let mut chroma_a = patch.chroma_a;
    let mut chroma_b = patch.chroma_b;
    plane::scale(&mut chroma_a, options.refine_vibrancy);
    plane::scale(&mut chroma_b, options.refine_vibrancy);

    saturation_floor(
        &mut chroma_a,
        &mut chroma_b,
        options.saturation_floor,
        options.neutral_cutoff,
    );

    if let Some(target) = request.target_color {
        apply_guidance(&mut chroma_a, &mut chroma_b, target, options.guidance_weight);
    }

    // Light blur so the upscaled patch does not read as small squares.
    chroma_a = plane::mean_blur3(&chroma_a);
    chroma_b = plane::mean_blur3(&chroma_b);
    plane::clamp(&mut chroma_a, CHROMA_MIN, CHROMA_MAX);
    plane::clamp(&mut chroma_b, CHROMA_MIN, CHROMA_MAX);

    let up_a = plane::resize(&chroma_a, crop_w, crop_h);
    let up_b = plane::resize(&chroma_b, crop_w, crop_h);

    // The refined crop keeps the original luma; only chroma is replaced.
    let luma_crop = plane::crop(&planes.luma, x1, y1, crop_w, crop_h);
    let refined_crop = color::compose(&luma_crop, &up_a, &up_b);

    let alpha = feather_alpha(&mask, crop_w, crop_h, options);

    let background_crop = imageops::crop_imm(&background, x1, y1, crop_w, crop_h).to_image();
    let current = color::decompose(&background_crop);
    let refined = color::decompose(&refined_crop);
    let guard = vibrancy_guard(
        &current.chroma_a,
        &current.chroma_b,
        &refined.chroma_a,
        &refined.chroma_b,
        options,
    );

    // Composite the refined crop back into the background.
    let mut output = background;
    for dy in 0..crop_h {
        for dx in 0..crop_w {
            let blend = (alpha.get_pixel(x1 + dx, y1 + dy)[0] * guard.get_pixel(dx, dy)[0])
                .clamp(0.0, 1.0);
            let base = output.get_pixel(x1 + dx, y1 + dy);
            let new = refined_crop.get_pixel(dx, dy);
            let mut pixel = [0u8; 3];
            for c in 0..3 {
                pixel[c] = ((1.0 - blend) * base[c] as f32 + blend * new[c] as f32).round() as u8;
            }
            output.put_pixel(x1 + dx, y1 + dy, Rgb(pixel));
        }
    }

    Ok(output)
}

/// Bring the mask to image resolution.
fn conform_mask(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
    if mask.dimensions() == (width, height) {
        mask.clone()
    } else {
        imageops::resize(mask, width, height, FilterType::Triangle)
    }
}

/// Bring a caller-supplied background to image resolution.
fn conform_background(background: &RgbImage, width: u32, height: u32) -> RgbImage {
    if background.dimensions() == (width, height) {
        background.clone()
    } else {
        imageops::resize(background, width, height, FilterType::Triangle)
    }
}

/// Bounding box (x, y, w, h) of the mask's non-zero pixels.
pub(crate) fn mask_bounding_box(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut found = false;

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] > 0 {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Rescale weakly colored pixels up to the floor magnitude, keeping hue.
///
/// Pixels at or below `neutral_cutoff` are left alone so noise is not
/// inflated into color; pixels already at or above the floor are left
/// alone too.
pub(crate) fn saturation_floor(
    chroma_a: &mut Plane,
    chroma_b: &mut Plane,
    floor: f32,
    neutral_cutoff: f32,
) {
    for (a, b) in chroma_a.pixels_mut().zip(chroma_b.pixels_mut()) {
        let magnitude = (a[0] * a[0] + b[0] * b[0]).sqrt();
        if magnitude > neutral_cutoff && magnitude < floor {
            let gain = floor / (magnitude + EPSILON);
            a[0] *= gain;
            b[0] *= gain;
        }
    }
}

/// Blend the prediction toward the user's target color.
pub(crate) fn apply_guidance(
    chroma_a: &mut Plane,
    chroma_b: &mut Plane,
    target: TargetColor,
    weight: f32,
) {
    let keep = 1.0 - weight;
    for (a, b) in chroma_a.pixels_mut().zip(chroma_b.pixels_mut()) {
        a[0] = a[0] * keep + target.chroma_a * weight;
        b[0] = b[0] * keep + target.chroma_b * weight;
    }
}

/// Soft per-pixel blend weight from the brush mask, at image resolution.
///
/// The mask is dilated first so the stroke center keeps full strength,
/// then Gaussian-blurred into a feather. Kernel sizes scale with the
/// crop's minor dimension.
pub(crate) fn feather_alpha(
    mask: &GrayImage,
    crop_w: u32,
    crop_h: u32,
    options: &RefineOptions,
) -> Plane {
    let min_dim = crop_w.min(crop_h);

    let dilate_kernel = options
        .dilate_kernel_min
        .max(min_dim / options.dilate_kernel_divisor);
    // Two passes with a k-square structuring element equal one pass with
    // a (2k-1)-square, i.e. Chebyshev radius k-1.
    let radius = (dilate_kernel - 1).min(255) as u8;
    let dilated = dilate(mask, Norm::LInf, radius);

    let feather_kernel = options
        .feather_kernel_min
        .max(min_dim / options.feather_kernel_divisor)
        | 1;

    let (width, height) = mask.dimensions();
    let raw: Vec<f32> = dilated.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
    let alpha = Plane::from_raw(width, height, raw).expect("plane buffer matches dimensions");
    let mut alpha = plane::gaussian_blur(&alpha, feather_kernel);
    plane::clamp(&mut alpha, 0.0, 1.0);
    alpha
}

/// Per-pixel guard keeping weak new color off already-vibrant areas.
///
/// 1 where the new chroma is non-trivial or the existing chroma is
/// near-neutral, 0 elsewhere; the additive form is clipped and then
/// blurred to soften its edges.
pub(crate) fn vibrancy_guard(
    current_a: &Plane,
    current_b: &Plane,
    new_a: &Plane,
    new_b: &Plane,
    options: &RefineOptions,
) -> Plane {
    let (width, height) = current_a.dimensions();
    let mut guard = Plane::new(width, height);

    for (((guard, cur_a), cur_b), (new_a, new_b)) in guard
        .pixels_mut()
        .zip(current_a.pixels())
        .zip(current_b.pixels())
        .zip(new_a.pixels().zip(new_b.pixels()))
    {
        let current_mag = (cur_a[0] * cur_a[0] + cur_b[0] * cur_b[0]).sqrt();
        let new_mag = (new_a[0] * new_a[0] + new_b[0] * new_b[0]).sqrt();
        let is_new_vibrant = (new_mag > options.guard_new_min) as u32 as f32;
        let is_old_gray = (current_mag < options.guard_old_max) as u32 as f32;
        guard[0] = (is_new_vibrant + is_old_gray).clamp(0.0, 1.0);
    }

    let mut guard = plane::gaussian_blur(&guard, options.guard_kernel);
    plane::clamp(&mut guard, 0.0, 1.0);
    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColorizeOptions;
    use crate::pipeline::colorize_image;
    use crate::testing::{gray_image, uniform_field, UniformPredictor};

    fn blob_mask(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        for y in y0..y1 {
            for x in x0..x1 {
                mask.put_pixel(x, y, image::Luma([255]));
            }
        }
        mask
    }

    #[test]
    fn test_mask_bounding_box() {
        let mask = blob_mask(64, 64, 10, 20, 30, 25);
        assert_eq!(mask_bounding_box(&mask), Some((10, 20, 20, 5)));

        let empty = GrayImage::new(64, 64);
        assert_eq!(mask_bounding_box(&empty), None);
    }

    #[test]
    fn test_empty_mask_returns_background_unchanged() {
        let image = gray_image(64, 64, 120);
        let mask = GrayImage::new(64, 64);
        let background = RgbImage::from_pixel(64, 64, Rgb([5, 200, 77]));
        let predictor = UniformPredictor {
            chroma_a: 30.0,
            chroma_b: 0.0,
        };

        let result = refine_image(
            &RefineRequest {
                image: &image,
                mask: &mask,
                background: Some(&background),
                target_color: None,
            },
            &predictor,
            &RefineOptions::default(),
            &CancelToken::new(),
        )
        .expect("refine");

        assert_eq!(result, background);
    }

    #[test]
    fn test_empty_mask_without_background_colorizes() {
        let image = gray_image(64, 64, 120);
        let mask = GrayImage::new(64, 64);
        let predictor = UniformPredictor {
            chroma_a: 15.0,
            chroma_b: -5.0,
        };
        let options = RefineOptions {
            colorize: ColorizeOptions {
                grid_size: 2,
                ..ColorizeOptions::default()
            },
            ..RefineOptions::default()
        };

        let result = refine_image(
            &RefineRequest {
                image: &image,
                mask: &mask,
                background: None,
                target_color: None,
            },
            &predictor,
            &options,
            &CancelToken::new(),
        )
        .expect("refine");

        let expected = colorize_image(&image, &predictor, &options.colorize).expect("colorize");
        assert_eq!(result, expected);
    }

    #[test]
    fn test_saturation_floor_scenarios() {
        // Magnitude 10 sits inside (2, 20) and snaps to the floor;
        // 1 is treated as noise, 25 is already strong enough.
        let mut a = uniform_field(3, 1, 0.0);
        let mut b = uniform_field(3, 1, 0.0);
        a.put_pixel(0, 0, image::Luma([10.0]));
        a.put_pixel(1, 0, image::Luma([1.0]));
        a.put_pixel(2, 0, image::Luma([25.0]));

        saturation_floor(&mut a, &mut b, 20.0, 2.0);

        assert!((a.get_pixel(0, 0)[0] - 20.0).abs() < 1e-3);
        assert_eq!(a.get_pixel(1, 0)[0], 1.0);
        assert_eq!(a.get_pixel(2, 0)[0], 25.0);
    }

    #[test]
    fn test_saturation_floor_preserves_hue() {
        let mut a = uniform_field(1, 1, 6.0);
        let mut b = uniform_field(1, 1, 8.0);
        saturation_floor(&mut a, &mut b, 20.0, 2.0);

        let av = a.get_pixel(0, 0)[0];
        let bv = b.get_pixel(0, 0)[0];
        let magnitude = (av * av + bv * bv).sqrt();
        assert!((magnitude - 20.0).abs() < 1e-2);
        // Direction unchanged: a/b ratio stays 6/8.
        assert!((av / bv - 0.75).abs() < 1e-4);
    }

    #[test]
    fn test_guidance_blend_dominates() {
        // A neutral prediction plus a target must land at exactly
        // weight * target.
        let mut a = uniform_field(4, 4, 0.0);
        let mut b = uniform_field(4, 4, 0.0);
        let target = TargetColor {
            chroma_a: 80.0,
            chroma_b: 67.0,
        };

        apply_guidance(&mut a, &mut b, target, 0.85);

        for (a, b) in a.pixels().zip(b.pixels()) {
            assert!((a[0] - 0.85 * 80.0).abs() < 1e-4);
            assert!((b[0] - 0.85 * 67.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_feather_alpha_in_unit_range() {
        let mask = blob_mask(128, 128, 40, 40, 80, 80);
        let alpha = feather_alpha(&mask, 48, 48, &RefineOptions::default());

        for pixel in alpha.pixels() {
            assert!((0.0..=1.0).contains(&pixel[0]));
        }
        // Stroke center keeps full strength, far corners stay clear.
        assert!(alpha.get_pixel(60, 60)[0] > 0.99);
        assert_eq!(alpha.get_pixel(0, 0)[0], 0.0);
    }

    #[test]
    fn test_vibrancy_guard_blocks_weak_over_vibrant() {
        let options = RefineOptions::default();
        // Existing color strong (mag 50), new color negligible (mag 1):
        // the guard must stay closed.
        let closed = vibrancy_guard(
            &uniform_field(32, 32, 50.0),
            &uniform_field(32, 32, 0.0),
            &uniform_field(32, 32, 1.0),
            &uniform_field(32, 32, 0.0),
            &options,
        );
        for pixel in closed.pixels() {
            assert!(pixel[0] < 1e-4, "guard leaked: {}", pixel[0]);
        }

        // Existing color near-neutral: the guard opens even for weak new
        // color.
        let open = vibrancy_guard(
            &uniform_field(32, 32, 1.0),
            &uniform_field(32, 32, 0.0),
            &uniform_field(32, 32, 1.0),
            &uniform_field(32, 32, 0.0),
            &options,
        );
        for pixel in open.pixels() {
            assert!(pixel[0] > 1.0 - 1e-4, "guard closed: {}", pixel[0]);
        }
    }

    #[test]
    fn test_refine_changes_masked_region_only() {
        let image = gray_image(200, 200, 140);
        let mask = blob_mask(200, 200, 30, 30, 50, 50);
        let background = RgbImage::from_pixel(200, 200, Rgb([128, 128, 128]));
        let predictor = UniformPredictor {
            chroma_a: 30.0,
            chroma_b: 0.0,
        };

        let result = refine_image(
            &RefineRequest {
                image: &image,
                mask: &mask,
                background: Some(&background),
                target_color: None,
            },
            &predictor,
            &RefineOptions::default(),
            &CancelToken::new(),
        )
        .expect("refine");

        assert_eq!(result.dimensions(), (200, 200));
        // The stroke center takes the new color.
        assert_ne!(result.get_pixel(40, 40), background.get_pixel(40, 40));
        // Far outside the feather everything is untouched.
        assert_eq!(result.get_pixel(150, 150), background.get_pixel(150, 150));
        assert_eq!(result.get_pixel(199, 0), background.get_pixel(199, 0));
    }

    #[test]
    fn test_refine_resizes_mismatched_mask() {
        let image = gray_image(120, 120, 100);
        // Half-resolution mask covering the same relative region.
        let mask = blob_mask(60, 60, 10, 10, 20, 20);
        let background = RgbImage::from_pixel(120, 120, Rgb([128, 128, 128]));
        let predictor = UniformPredictor {
            chroma_a: 25.0,
            chroma_b: 10.0,
        };

        let result = refine_image(
            &RefineRequest {
                image: &image,
                mask: &mask,
                background: Some(&background),
                target_color: None,
            },
            &predictor,
            &RefineOptions::default(),
            &CancelToken::new(),
        )
        .expect("refine");

        assert_eq!(result.dimensions(), (120, 120));
        assert_ne!(result.get_pixel(30, 30), background.get_pixel(30, 30));
    }

    #[test]
    fn test_refine_cancelled() {
        let image = gray_image(64, 64, 100);
        let mask = blob_mask(64, 64, 10, 10, 20, 20);
        let background = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
        let predictor = UniformPredictor {
            chroma_a: 10.0,
            chroma_b: 10.0,
        };
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = refine_image(
            &RefineRequest {
                image: &image,
                mask: &mask,
                background: Some(&background),
                target_color: None,
            },
            &predictor,
            &RefineOptions::default(),
            &cancel,
        );
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
