//! HSV histogram appearance descriptor.
//!
//! The descriptor concatenates three normalized histograms computed over a
//! person crop: hue ([`HUE_BINS`]), saturation ([`SATURATION_BINS`]) and value
//! ([`VALUE_BINS`]). Each histogram is normalized to unit mass before
//! concatenation, so the result does not depend on crop resolution. Hue is
//! only accumulated for pixels that are saturated and bright enough for hue
//! to be meaningful.
//!
//! A crop with zero area produces [`AppearanceFeature::unmatchable`].

use image::RgbImage;
use rayon::prelude::*;
use roomsense_models::{
    AppearanceFeature, BoundingBox, FEATURE_DIM, HUE_BINS, SATURATION_BINS, VALUE_BINS,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Descriptor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorConfig {
    /// Minimum saturation (0-1) for a pixel to contribute to the hue histogram (default: 0.2)
    pub min_hue_saturation: f32,
    /// Minimum value (0-1) for a pixel to contribute to the hue histogram (default: 0.2)
    pub min_hue_value: f32,
    /// Longest side sampled per crop; larger crops are strided (default: 128)
    pub max_sample_side: u32,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            min_hue_saturation: 0.2,
            min_hue_value: 0.2,
            max_sample_side: 128,
        }
    }
}

/// Computes appearance features from RGB crops.
///
/// Stateless apart from its configuration; safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct AppearanceDescriptor {
    config: DescriptorConfig,
}

impl AppearanceDescriptor {
    /// Create a descriptor with the given configuration.
    pub fn new(config: DescriptorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DescriptorConfig {
        &self.config
    }

    /// Describe a whole crop.
    pub fn describe_crop(&self, crop: &RgbImage) -> AppearanceFeature {
        let (width, height) = crop.dimensions();
        self.describe_window(crop, 0, 0, width, height)
    }

    /// Describe the region of `frame` covered by `bbox`, clipped to the frame.
    pub fn describe_region(&self, frame: &RgbImage, bbox: &BoundingBox) -> AppearanceFeature {
        if bbox.is_degenerate() {
            return AppearanceFeature::unmatchable();
        }
        let (frame_w, frame_h) = frame.dimensions();
        let x0 = bbox.x.max(0.0).floor().min(f64::from(frame_w)) as u32;
        let y0 = bbox.y.max(0.0).floor().min(f64::from(frame_h)) as u32;
        let x1 = bbox.x2().max(0.0).ceil().min(f64::from(frame_w)) as u32;
        let y1 = bbox.y2().max(0.0).ceil().min(f64::from(frame_h)) as u32;
        self.describe_window(frame, x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }

    /// Describe many crops in parallel.
    pub fn describe_batch(&self, crops: &[RgbImage]) -> Vec<AppearanceFeature> {
        crops
            .par_iter()
            .map(|crop| self.describe_crop(crop))
            .collect()
    }

    fn describe_window(
        &self,
        image: &RgbImage,
        x0: u32,
        y0: u32,
        width: u32,
        height: u32,
    ) -> AppearanceFeature {
        if width == 0 || height == 0 {
            debug!(width, height, "Degenerate crop, returning unmatchable feature");
            return AppearanceFeature::unmatchable();
        }

        let step = (width.max(height) / self.config.max_sample_side.max(1)).max(1);
        let mut hue = [0f32; HUE_BINS];
        let mut saturation = [0f32; SATURATION_BINS];
        let mut value = [0f32; VALUE_BINS];

        let mut y = y0;
        while y < y0 + height {
            let mut x = x0;
            while x < x0 + width {
                let pixel = image.get_pixel(x, y);
                let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);

                saturation[bin(s, SATURATION_BINS)] += 1.0;
                value[bin(v, VALUE_BINS)] += 1.0;
                if s >= self.config.min_hue_saturation && v >= self.config.min_hue_value {
                    hue[bin(h / 360.0, HUE_BINS)] += 1.0;
                }
                x += step;
            }
            y += step;
        }

        let mut values = Vec::with_capacity(FEATURE_DIM);
        values.extend(unit_mass(&hue));
        values.extend(unit_mass(&saturation));
        values.extend(unit_mass(&value));

        // Components are finite by construction and the length is fixed.
        AppearanceFeature::new(values).unwrap_or_else(|_| AppearanceFeature::unmatchable())
    }
}

/// Convert 8-bit RGB to (hue degrees in [0, 360), saturation [0, 1], value [0, 1]).
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = f32::from(r) / 255.0;
    let g = f32::from(g) / 255.0;
    let b = f32::from(b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    (hue.rem_euclid(360.0), saturation, max)
}

fn bin(fraction: f32, bins: usize) -> usize {
    ((fraction * bins as f32) as usize).min(bins - 1)
}

fn unit_mass(histogram: &[f32]) -> impl Iterator<Item = f32> + '_ {
    let total: f32 = histogram.iter().sum();
    histogram
        .iter()
        .map(move |count| if total > 0.0 { count / total } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(color))
    }

    /// Person-like crop: shirt color on top, trousers color below.
    fn outfit(width: u32, height: u32, shirt: [u8; 3], trousers: [u8; 3]) -> RgbImage {
        RgbImage::from_fn(width, height, |_, y| {
            if y < height / 2 {
                Rgb(shirt)
            } else {
                Rgb(trousers)
            }
        })
    }

    #[test]
    fn test_rgb_to_hsv_primaries() {
        let (h, s, v) = rgb_to_hsv(255, 0, 0);
        assert_eq!((h, s, v), (0.0, 1.0, 1.0));
        let (h, _, _) = rgb_to_hsv(0, 255, 0);
        assert!((h - 120.0).abs() < 1e-4);
        let (h, _, _) = rgb_to_hsv(0, 0, 255);
        assert!((h - 240.0).abs() < 1e-4);
        let (_, s, v) = rgb_to_hsv(0, 0, 0);
        assert_eq!((s, v), (0.0, 0.0));
    }

    #[test]
    fn test_feature_has_fixed_dimension() {
        let descriptor = AppearanceDescriptor::default();
        let feature = descriptor.describe_crop(&solid(20, 40, [200, 30, 30]));
        assert_eq!(feature.as_slice().len(), FEATURE_DIM);
        assert!(!feature.is_unmatchable());
    }

    #[test]
    fn test_deterministic() {
        let descriptor = AppearanceDescriptor::default();
        let crop = outfit(32, 64, [20, 40, 200], [90, 90, 90]);
        assert_eq!(descriptor.describe_crop(&crop), descriptor.describe_crop(&crop));
    }

    #[test]
    fn test_scale_invariant() {
        let descriptor = AppearanceDescriptor::default();
        let small = outfit(16, 32, [200, 40, 40], [30, 30, 120]);
        let large = outfit(64, 128, [200, 40, 40], [30, 30, 120]);
        let similarity = descriptor
            .describe_crop(&small)
            .cosine_similarity(&descriptor.describe_crop(&large));
        assert!(similarity > 0.999, "similarity was {}", similarity);
    }

    #[test]
    fn test_same_outfit_more_similar_than_different_outfit() {
        let descriptor = AppearanceDescriptor::default();
        let a = descriptor.describe_crop(&outfit(32, 64, [200, 40, 40], [30, 30, 120]));
        let a_darker = descriptor.describe_crop(&outfit(32, 64, [180, 36, 36], [27, 27, 110]));
        let b = descriptor.describe_crop(&outfit(32, 64, [40, 200, 60], [220, 220, 220]));
        assert!(a.cosine_similarity(&a_darker) > a.cosine_similarity(&b));
    }

    #[test]
    fn test_zero_area_crop_is_unmatchable() {
        let descriptor = AppearanceDescriptor::default();
        assert!(descriptor.describe_crop(&RgbImage::new(0, 10)).is_unmatchable());
    }

    #[test]
    fn test_region_outside_frame_is_unmatchable() {
        let descriptor = AppearanceDescriptor::default();
        let frame = solid(100, 100, [10, 200, 10]);
        let outside = BoundingBox::new(150.0, 150.0, 20.0, 20.0);
        assert!(descriptor.describe_region(&frame, &outside).is_unmatchable());
        let degenerate = BoundingBox::new(10.0, 10.0, 0.0, 20.0);
        assert!(descriptor.describe_region(&frame, &degenerate).is_unmatchable());
    }

    #[test]
    fn test_region_matches_equivalent_crop() {
        let descriptor = AppearanceDescriptor::default();
        let mut frame = solid(100, 100, [0, 0, 0]);
        for y in 20..60 {
            for x in 10..30 {
                frame.put_pixel(x, y, Rgb([220, 120, 10]));
            }
        }
        let region = descriptor.describe_region(&frame, &BoundingBox::new(10.0, 20.0, 20.0, 40.0));
        let crop = descriptor.describe_crop(&solid(20, 40, [220, 120, 10]));
        assert!(region.cosine_similarity(&crop) > 0.999);
    }

    #[test]
    fn test_grey_crop_has_no_hue_mass() {
        let descriptor = AppearanceDescriptor::default();
        let feature = descriptor.describe_crop(&solid(10, 10, [128, 128, 128]));
        assert!(feature.as_slice()[..HUE_BINS].iter().all(|v| *v == 0.0));
        assert!(!feature.is_unmatchable());
    }

    #[test]
    fn test_batch_matches_sequential() {
        let descriptor = AppearanceDescriptor::default();
        let crops = vec![
            solid(10, 20, [255, 0, 0]),
            solid(0, 0, [0, 0, 0]),
            outfit(12, 24, [0, 0, 255], [255, 255, 0]),
        ];
        let batch = descriptor.describe_batch(&crops);
        assert_eq!(batch.len(), 3);
        for (crop, feature) in crops.iter().zip(batch.iter()) {
            assert_eq!(&descriptor.describe_crop(crop), feature);
        }
        assert!(batch[1].is_unmatchable());
    }
}
