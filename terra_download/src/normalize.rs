/// Whole-array min/max float-to-`u8` normalization (spec §4.5 step 3).
/// Matches the original's `normalize8`: a single `(min, max)` over the
/// entire buffer, not per-channel (resolved ambiguity, `SPEC_FULL.md` §2).
pub fn normalize8(values: &[f32]) -> Vec<u8> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut min = values[0];
    let mut max = values[0];
    for &v in values {
        if v < min {
            min = v;
        }
        if v > max {
            max = v;
        }
    }
    let span = (max - min).max(f32::EPSILON);
    values
        .iter()
        .map(|&v| (((v - min) / span) * 255.0).clamp(0.0, 255.0) as u8)
        .collect()
}

/// RGB↔BGR channel swap (spec §4.5 step 4). Fires only when the pixel has
/// exactly 3 channels — 4-channel (RGBA) buffers pass through untouched
/// (resolved ambiguity, `SPEC_FULL.md` §2).
pub fn swap_rgb_bgr(pixels: &mut [u8], channels: u8) {
    if channels != 3 {
        return;
    }
    for px in pixels.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

/// Center-crops a `(height, width, channels)` buffer down to
/// `(target_h, target_w, channels)` (spec §4.5 step 2). A no-op if the
/// buffer is already at or under the target size in either dimension.
pub fn center_crop(
    pixels: &[u8],
    width: u32,
    height: u32,
    channels: u8,
    target_w: u32,
    target_h: u32,
) -> (Vec<u8>, u32, u32) {
    terra_shared::pixels::crop_centered(pixels, width, height, channels, target_w, target_h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize8_spans_the_whole_array() {
        let values = [0.0f32, 5.0, 10.0];
        let out = normalize8(&values);
        assert_eq!(out, vec![0, 127, 255]);
    }

    #[test]
    fn swap_only_fires_for_three_channels() {
        let mut rgb = vec![10u8, 20, 30];
        swap_rgb_bgr(&mut rgb, 3);
        assert_eq!(rgb, vec![30, 20, 10]);

        let mut rgba = vec![10u8, 20, 30, 40];
        swap_rgb_bgr(&mut rgba, 4);
        assert_eq!(rgba, vec![10, 20, 30, 40]);
    }

    #[test]
    fn center_crop_trims_the_halo() {
        // 4x4 single-channel buffer, crop to 2x2
        let pixels: Vec<u8> = (0..16).collect();
        let (out, w, h) = center_crop(&pixels, 4, 4, 1, 2, 2);
        assert_eq!((w, h), (2, 2));
        assert_eq!(out, vec![5, 6, 9, 10]);
    }

    #[test]
    fn center_crop_is_noop_when_already_small_enough() {
        let pixels = vec![1u8, 2, 3, 4];
        let (out, w, h) = center_crop(&pixels, 2, 2, 1, 4, 4);
        assert_eq!((w, h), (2, 2));
        assert_eq!(out, pixels);
    }
}
