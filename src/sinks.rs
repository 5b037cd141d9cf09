// THEORY:
// Rendering sinks are the other external collaborator: they accept a
// finished glyph grid plus its color grid and draw them. The terminal sink
// paints with 24-bit ANSI colors; the null sink swallows frames so the
// benchmark harness can measure the pipeline alone. Channel-order fixups
// (RGB vs BGR) belong here, never in the core; both sinks in this crate
// assume the RGB order our sources produce.

use std::io::{self, Stdout, Write};

use crate::core_modules::convert::GLYPH_RAMP;
use crate::error::PipelineResult;
use crate::pipeline::{GlyphFrame, RenderSink};

/// Draws each frame as colored glyphs on an ANSI terminal, repainting in
/// place from the home position.
pub struct AnsiSink<W: Write + Send> {
    out: W,
    /// Horizontal repetitions per cell; terminal cells are taller than they
    /// are wide, so small values like 2 roughly square them up.
    pixel_scale: usize,
}

impl AnsiSink<io::BufWriter<Stdout>> {
    /// Sink writing to stdout. `pixel_scale` below 1 is treated as 1.
    pub fn stdout(pixel_scale: u32) -> Self {
        AnsiSink::new(io::BufWriter::new(io::stdout()), pixel_scale)
    }
}

impl<W: Write + Send> AnsiSink<W> {
    pub fn new(out: W, pixel_scale: u32) -> Self {
        Self { out, pixel_scale: (pixel_scale as usize).max(1) }
    }
}

impl<W: Write + Send> RenderSink for AnsiSink<W> {
    fn present(&mut self, frame: GlyphFrame<'_>) -> PipelineResult<()> {
        // Cursor home, then repaint over the previous frame.
        self.out.write_all(b"\x1b[H")?;
        for row in 0..frame.rows {
            for col in 0..frame.width {
                let cell = row * frame.width + col;
                let glyph = GLYPH_RAMP[frame.glyphs[cell] as usize];
                let color = &frame.colors[cell * 3..cell * 3 + 3];
                write!(self.out, "\x1b[38;2;{};{};{}m", color[0], color[1], color[2])?;
                for _ in 0..self.pixel_scale {
                    self.out.write_all(&[glyph])?;
                }
            }
            self.out.write_all(b"\x1b[0m\n")?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Discards every frame; used for headless benchmark runs.
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
}

impl NullSink {
    /// Frames swallowed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RenderSink for NullSink {
    fn present(&mut self, _frame: GlyphFrame<'_>) -> PipelineResult<()> {
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame<'a>(glyphs: &'a [u8], colors: &'a [u8], width: usize) -> GlyphFrame<'a> {
        GlyphFrame { glyphs, colors, width, rows: glyphs.len() / width }
    }

    #[test]
    fn ansi_sink_paints_ramp_glyphs_with_cell_colors() {
        let mut out = Vec::new();
        {
            let mut sink = AnsiSink::new(&mut out, 1);
            sink.present(frame(&[0, 5, 9], &[1, 2, 3, 4, 5, 6, 7, 8, 9], 3))
                .unwrap();
        }
        let painted = String::from_utf8(out).unwrap();
        assert!(painted.starts_with("\x1b[H"));
        assert!(painted.contains("\x1b[38;2;1;2;3m "));
        assert!(painted.contains("\x1b[38;2;4;5;6m+"));
        assert!(painted.contains("\x1b[38;2;7;8;9m@"));
    }

    #[test]
    fn pixel_scale_repeats_cells_horizontally() {
        let mut out = Vec::new();
        {
            let mut sink = AnsiSink::new(&mut out, 3);
            sink.present(frame(&[9], &[0, 0, 0], 1)).unwrap();
        }
        let painted = String::from_utf8(out).unwrap();
        assert!(painted.contains("@@@"));
    }

    #[test]
    fn zero_row_frame_paints_nothing_but_the_home_escape() {
        let mut out = Vec::new();
        {
            let mut sink = AnsiSink::new(&mut out, 1);
            sink.present(frame(&[], &[], 4)).unwrap();
        }
        assert_eq!(out, b"\x1b[H");
    }

    #[test]
    fn null_sink_counts_frames() {
        let mut sink = NullSink::default();
        sink.present(frame(&[1], &[0, 0, 0], 1)).unwrap();
        sink.present(frame(&[1], &[0, 0, 0], 1)).unwrap();
        assert_eq!(sink.frames(), 2);
    }
}
