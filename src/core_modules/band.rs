// THEORY:
// The `band` module decides, once per run, which contiguous run of frame rows
// each participant converts. The assignment is deliberately rigid: every
// participant, the source included, gets exactly `floor(totalRows / W)`
// rows, in identity order starting at row 0.
//
// When `totalRows` does not divide evenly, the trailing `totalRows mod W`
// rows belong to no band. They are never converted and never appear in the
// assembled output. The drop is deliberate: every cascade length formula
// depends on it. See DESIGN.md before changing it.

/// The fixed row range one participant converts every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    /// First frame row this band covers.
    pub start_row: usize,
    /// Number of rows in the band. Identical for every participant.
    pub rows: usize,
    /// Pixels per row, identical to the frame width.
    pub row_width: usize,
}

impl Band {
    /// Cells (pixels) in the band.
    pub fn cells(&self) -> usize {
        self.rows * self.row_width
    }

    /// Size of the band in raw pixel bytes (3 channels per cell).
    pub fn pixel_bytes(&self) -> usize {
        self.cells() * 3
    }
}

/// Computes every participant's band for a frame of `total_rows` x `row_width`
/// pixels split across `world` participants.
///
/// Called exactly once, before the frame loop starts; the result is never
/// recomputed even if later frames disagree with the broadcast metadata.
pub fn partition(total_rows: usize, row_width: usize, world: usize) -> Vec<Band> {
    let rows = total_rows / world;
    (0..world)
        .map(|id| Band {
            start_row: id * rows,
            rows,
            row_width,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split_covers_every_row() {
        let bands = partition(9, 2, 3);
        assert_eq!(bands.len(), 3);
        for (id, band) in bands.iter().enumerate() {
            assert_eq!(band.rows, 3);
            assert_eq!(band.start_row, id * 3);
            assert_eq!(band.row_width, 2);
        }
        let covered: usize = bands.iter().map(|b| b.rows).sum();
        assert_eq!(covered, 9);
    }

    #[test]
    fn remainder_rows_are_dropped_not_reassigned() {
        // 10 rows across 3 participants: one trailing row belongs to nobody.
        let bands = partition(10, 4, 3);
        let covered: usize = bands.iter().map(|b| b.rows).sum();
        assert_eq!(covered, 9);
        assert_eq!(10 - covered, 10 % 3);
        assert!(bands.iter().all(|b| b.rows == 3));
    }

    #[test]
    fn coverage_never_exceeds_total_rows() {
        for world in 1..8 {
            for total in 0..40 {
                let bands = partition(total, 5, world);
                let covered: usize = bands.iter().map(|b| b.rows).sum();
                assert!(covered <= total);
                assert_eq!(total - covered, total % world);
            }
        }
    }

    #[test]
    fn fewer_rows_than_participants_yields_empty_bands() {
        let bands = partition(2, 8, 4);
        assert!(bands.iter().all(|b| b.rows == 0 && b.cells() == 0));
    }

    #[test]
    fn band_byte_sizes() {
        let band = Band { start_row: 3, rows: 3, row_width: 2 };
        assert_eq!(band.cells(), 6);
        assert_eq!(band.pixel_bytes(), 18);
    }
}
