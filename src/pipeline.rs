// THEORY:
// The `pipeline` module is the top-level API for the banded renderer. It owns
// the SPMD execution model: one tokio task per participant, all running the
// same per-frame schedule (quit broadcast, forward cascade, local
// conversion, backward cascade plus color gather), with the source
// participant additionally driving the external frame source and handing
// each completed frame to the rendering sink.
//
// Key architectural principles:
// 1.  **Same program, different data**: source and relay participants run
//     the same frame schedule; only their halves of each cascade differ.
// 2.  **Metadata flows once**: the source queries the frame source a single
//     time and broadcasts the result; every participant then derives its
//     band locally and never recomputes it.
// 3.  **No blocked survivor**: every exit path of the source ends with a
//     quit broadcast and tears down its links, so a participant parked in a
//     probe observes closure instead of hanging forever.

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core_modules::band::{self, Band};
use crate::core_modules::cascade;
use crate::core_modules::convert;
use crate::core_modules::topology::ChainTopology;
use crate::core_modules::transport::{ChannelLink, Control, Transport, build_chain};
use crate::error::{PipelineError, PipelineResult};

/// Stream metadata, queried once from the frame source and broadcast to the
/// whole chain before the frame loop starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    /// Total frames the source expects to decode.
    pub frames: u64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Nominal playback rate in frames per second.
    pub frame_rate: u32,
}

/// External decoder collaborating with the pipeline. Frames are row-major,
/// 3 bytes per pixel, channel order owned by the source.
pub trait FrameSource: Send {
    /// Queried exactly once, on the source participant, before the loop.
    fn metadata(&mut self) -> PipelineResult<StreamInfo>;

    /// `Ok(None)` signals a clean end of stream; an error is fatal for the
    /// whole pipeline and triggers a synchronized shutdown.
    fn next_frame(&mut self) -> PipelineResult<Option<Vec<u8>>>;
}

/// One completed character-art frame, exposed read-only to the sink after
/// the backward cascade and color gather finish.
#[derive(Debug, Clone, Copy)]
pub struct GlyphFrame<'a> {
    /// Glyph ramp indices, `rows * width` cells in row-major order.
    pub glyphs: &'a [u8],
    /// Display colors, 3 bytes per cell in the frame source's channel order.
    pub colors: &'a [u8],
    /// Cells per row.
    pub width: usize,
    /// Converted rows. May be fewer than the stream height: remainder rows
    /// that fit no band are dropped.
    pub rows: usize,
}

/// External display collaborating with the pipeline.
pub trait RenderSink: Send {
    /// Receives each completed frame. The grids behind the borrow are
    /// overwritten between calls and must not be retained.
    fn present(&mut self, frame: GlyphFrame<'_>) -> PipelineResult<()>;

    /// Consulted by the source before each frame; a `true` is broadcast to
    /// the whole chain and ends the run at that frame boundary.
    fn quit_requested(&mut self) -> bool {
        false
    }
}

/// Pipeline-lifetime settings. The core interprets `participants` only;
/// `pixel_scale` is carried through for sinks.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Number of cooperating participants in the chain.
    pub participants: usize,
    /// Display cell scaling hint, uninterpreted by the core.
    pub pixel_scale: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            participants: num_cpus::get(),
            pixel_scale: 1,
        }
    }
}

/// Per-run constants every component reads. Built once per participant from
/// the metadata broadcast, immutable for the run's duration.
#[derive(Debug, Clone, Copy)]
pub struct PipelineContext {
    pub info: StreamInfo,
    pub world: usize,
}

impl PipelineContext {
    fn new(info: StreamInfo, world: usize) -> Self {
        Self { info, world }
    }

    fn total_rows(&self) -> usize {
        self.info.height as usize
    }

    fn row_width(&self) -> usize {
        self.info.width as usize
    }
}

/// What a finished run reports back to the caller.
#[derive(Debug, Clone, Copy)]
pub struct RunStats {
    /// Frames fully converted and delivered to the sink.
    pub frames_converted: u64,
    /// The metadata the run was driven by.
    pub info: StreamInfo,
}

/// Runs the whole banded pipeline to completion: builds the chain, spawns
/// one task per relay participant, drives the source on the calling task and
/// joins everything.
pub async fn run<S, R>(config: PipelineConfig, source: S, sink: R) -> PipelineResult<RunStats>
where
    S: FrameSource,
    R: RenderSink,
{
    let topo = ChainTopology::new(config.participants);
    info!(world = topo.world(), "starting banded pipeline");

    let mut links = build_chain(&topo);
    let source_link = links.remove(0);
    let relays: Vec<JoinHandle<PipelineResult<()>>> = links
        .into_iter()
        .enumerate()
        .map(|(i, link)| tokio::spawn(run_relay(link, topo, i + 1)))
        .collect();

    let (stats, mut primary) = match run_source(source_link, topo, source, sink).await {
        Ok(stats) => (Some(stats), None),
        Err(e) => (None, Some(e)),
    };

    // The source's verdict wins unless it only saw the secondary symptom of
    // a relay failure (its links closing under it).
    for joined in futures::future::join_all(relays).await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => match &primary {
                None => primary = Some(e),
                Some(PipelineError::Disconnected)
                    if !matches!(e, PipelineError::Disconnected) =>
                {
                    primary = Some(e);
                }
                Some(_) => debug!(error = %e, "relay error shadowed by primary failure"),
            },
            Err(join) => {
                error!(error = %join, "relay task aborted");
                primary.get_or_insert(PipelineError::Disconnected);
            }
        }
    }

    match (stats, primary) {
        (Some(stats), None) => Ok(stats),
        (_, Some(e)) => Err(e),
        (None, None) => Err(PipelineError::Disconnected),
    }
}

/// The source participant's frame loop.
async fn run_source<S, R>(
    mut link: ChannelLink,
    topo: ChainTopology,
    mut source: S,
    mut sink: R,
) -> PipelineResult<RunStats>
where
    S: FrameSource,
    R: RenderSink,
{
    let info = match source.metadata() {
        Ok(info) => info,
        Err(e) => {
            // Participants are parked on the metadata broadcast; they must
            // observe the abort, not block forever.
            let _ = link.broadcast_from_source(Some(Control::Quit(true))).await;
            return Err(e);
        }
    };
    link.broadcast_from_source(Some(Control::Metadata(info)))
        .await?;

    let ctx = PipelineContext::new(info, topo.world());
    let bands = band::partition(ctx.total_rows(), ctx.row_width(), ctx.world);
    let own_band = bands[0];
    let processed_rows = own_band.rows * ctx.world;
    let cells = processed_rows * ctx.row_width();
    if processed_rows < ctx.total_rows() {
        warn!(
            dropped = ctx.total_rows() - processed_rows,
            "frame rows do not divide evenly, trailing rows will never be converted"
        );
    }

    let mut glyph_grid = vec![0u8; cells];
    let mut color_grid = vec![0u8; cells * 3];
    let mut frames_converted = 0u64;
    info!(
        frames = info.frames,
        width = info.width,
        height = info.height,
        frame_rate = info.frame_rate,
        "stream metadata broadcast, entering frame loop"
    );

    for i in 0..info.frames {
        let quit = sink.quit_requested();
        link.broadcast_from_source(Some(Control::Quit(quit))).await?;
        if quit {
            info!(frame = i, "quit requested, stopping at frame boundary");
            break;
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(frame = i, "stream exhausted before the advertised frame count");
                let _ = link.broadcast_from_source(Some(Control::Quit(true))).await;
                break;
            }
            Err(e) => {
                error!(frame = i, error = %e, "frame decode failed, shutting the chain down");
                let _ = link.broadcast_from_source(Some(Control::Quit(true))).await;
                return Err(e);
            }
        };

        let own_pixels =
            cascade::distribute_from_source(&mut link, &topo, &own_band, ctx.total_rows(), frame)
                .await?;
        let (own_glyphs, own_colors) = convert::convert_band(&own_pixels);
        cascade::collect_at_source(&mut link, &topo, &own_band, &own_glyphs, &mut glyph_grid)
            .await?;
        cascade::gather_colors_at_source(&mut link, &own_band, own_colors, &mut color_grid)
            .await?;

        sink.present(GlyphFrame {
            glyphs: &glyph_grid,
            colors: &color_grid,
            width: ctx.row_width(),
            rows: processed_rows,
        })?;
        frames_converted += 1;
        if i % 10 == 0 {
            debug!("converted {i} frames out of {}", info.frames);
        }
    }

    Ok(RunStats { frames_converted, info })
}

/// Every non-source participant's frame loop.
async fn run_relay(mut link: ChannelLink, topo: ChainTopology, id: usize) -> PipelineResult<()> {
    let info = match link.broadcast_from_source(None).await {
        Ok(Control::Metadata(info)) => info,
        // Source aborted before streaming anything, or went away entirely.
        Ok(Control::Quit(_)) | Err(PipelineError::Disconnected) => return Ok(()),
        Err(e) => return Err(e),
    };

    let ctx = PipelineContext::new(info, topo.world());
    let bands = band::partition(ctx.total_rows(), ctx.row_width(), ctx.world);
    let own_band = bands[id];

    for _ in 0..info.frames {
        match link.broadcast_from_source(None).await {
            Ok(Control::Quit(false)) => {}
            Ok(Control::Quit(true)) | Err(PipelineError::Disconnected) => break,
            Ok(Control::Metadata(_)) => {
                debug!(id, "unexpected metadata rebroadcast mid-run");
                return Err(PipelineError::Disconnected);
            }
            Err(e) => return Err(e),
        }

        match relay_frame(&mut link, &topo, id, &own_band, ctx.total_rows()).await {
            Ok(()) => {}
            // A closed link during the frame is a synchronized teardown if
            // the source signalled quit, a genuine fault otherwise.
            Err(PipelineError::Disconnected) if link.shutdown_pending() => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// One relay participant's share of a single frame.
async fn relay_frame<T: Transport>(
    link: &mut T,
    topo: &ChainTopology,
    id: usize,
    own_band: &Band,
    total_rows: usize,
) -> PipelineResult<()> {
    let own_pixels = cascade::distribute_relay(link, topo, id, own_band, total_rows).await?;
    let (own_glyphs, own_colors) = convert::convert_band(&own_pixels);
    cascade::collect_relay(link, topo, id, own_band, own_glyphs).await?;
    cascade::gather_colors_relay(link, own_colors).await
}
