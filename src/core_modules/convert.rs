// THEORY:
// The `convert` module is the only place pixels become glyphs. It is a pure,
// stateless mapping so that every participant produces identical output for
// identical bands no matter where in the chain it sits.
//
// The rule: average the three channels with integer truncation, bucket the
// result into one of `RAMP_LEN` density-ordered glyphs. Channel order is
// whatever the frame source supplied; luminance is order-insensitive and the
// color cells pass through untouched, so the core never needs to know whether
// it is looking at RGB or BGR.

/// Printable glyphs ordered by increasing ink density.
pub const GLYPH_RAMP: &[u8] = b" .:-=+*#%@";

/// Length of the glyph ramp, fixed at design time.
pub const RAMP_LEN: usize = GLYPH_RAMP.len();

/// Integer-truncating channel average.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((r as u16 + g as u16 + b as u16) / 3) as u8
}

/// Buckets a luminance value into a glyph ramp index, clamped to the ramp.
#[inline]
pub fn glyph_index(luminance: u8) -> u8 {
    let idx = luminance as usize * RAMP_LEN / 256;
    idx.min(RAMP_LEN - 1) as u8
}

/// Converts one pixel triplet into `(glyph index, display color)`.
///
/// The color is the input triplet passed through unchanged; any channel
/// reordering needed for display belongs to the sink.
#[inline]
pub fn convert(px: [u8; 3]) -> (u8, [u8; 3]) {
    (glyph_index(luminance(px[0], px[1], px[2])), px)
}

/// Converts a band of raw pixels (3 bytes per cell, row-major) into parallel
/// glyph-index and color buffers.
pub fn convert_band(pixels: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let cells = pixels.len() / 3;
    let mut glyphs = Vec::with_capacity(cells);
    let mut colors = Vec::with_capacity(cells * 3);
    for px in pixels.chunks_exact(3) {
        let (idx, color) = convert([px[0], px[1], px[2]]);
        glyphs.push(idx);
        colors.extend_from_slice(&color);
    }
    (glyphs, colors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_gray_maps_to_bucket_five() {
        // (128+128+128)/3 = 128; 128 * 10 / 256 = 5.
        let (idx, color) = convert([128, 128, 128]);
        assert_eq!(idx, 5);
        assert_eq!(color, [128, 128, 128]);
    }

    #[test]
    fn extremes_stay_on_the_ramp() {
        assert_eq!(glyph_index(0), 0);
        assert_eq!(glyph_index(255), 9);
        let (dark, _) = convert([0, 0, 0]);
        let (bright, _) = convert([255, 255, 255]);
        assert_eq!(dark, 0);
        assert_eq!(bright as usize, RAMP_LEN - 1);
    }

    #[test]
    fn luminance_truncates_instead_of_rounding() {
        // (1+1+0)/3 = 0 remainder 2, truncated.
        assert_eq!(luminance(1, 1, 0), 0);
        assert_eq!(luminance(255, 255, 254), 254);
    }

    #[test]
    fn index_in_range_for_every_triplet() {
        for r in (0..=255).step_by(17) {
            for g in (0..=255).step_by(17) {
                for b in (0..=255).step_by(17) {
                    let (idx, _) = convert([r, g, b]);
                    assert!((idx as usize) < RAMP_LEN);
                    // Deterministic: a second call agrees.
                    assert_eq!(convert([r, g, b]).0, idx);
                }
            }
        }
    }

    #[test]
    fn channel_order_does_not_change_the_glyph() {
        assert_eq!(convert([10, 200, 90]).0, convert([90, 200, 10]).0);
    }

    #[test]
    fn color_passes_through_in_source_order() {
        let (_, color) = convert([7, 99, 201]);
        assert_eq!(color, [7, 99, 201]);
    }

    #[test]
    fn band_conversion_matches_per_pixel_rule() {
        let pixels = [0u8, 0, 0, 128, 128, 128, 255, 255, 255];
        let (glyphs, colors) = convert_band(&pixels);
        assert_eq!(glyphs, vec![0, 5, 9]);
        assert_eq!(colors, pixels.to_vec());
    }
}
