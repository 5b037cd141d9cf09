// THEORY:
// This crate renders video as character art by splitting every frame's rows
// across a fixed chain of cooperating participants. The source participant
// decodes, keeps the first band of rows and cascades the rest down the
// chain; every participant converts its own band of pixels to glyph indices
// locally; the converted bands cascade back and are reassembled, in row
// order, into full glyph and color grids that go to a rendering sink.
//
// `core_modules` holds the protocol leaves (topology, banding, conversion,
// transport, cascades); `pipeline` is the public orchestration API; the
// `sources` and `sinks` modules are stock implementations of the two
// external collaborators. The binary in `main.rs` wires them together.

pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod sinks;
pub mod sources;

pub use error::{PipelineError, PipelineResult};
pub use pipeline::{
    FrameSource, GlyphFrame, PipelineConfig, RenderSink, RunStats, StreamInfo, run,
};
