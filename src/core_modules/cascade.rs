// THEORY:
// The `cascade` module implements the two multi-hop relays that move pixel
// data out to the chain and glyph data back, plus the fixed-size color
// gather. Everything here is written against the `Transport` trait only, so
// the same protocol runs over tokio channels today and could run over
// sockets tomorrow.
//
// Forward pass: the source keeps the leading band of the frame and sends the
// rest downstream in one message. Each relay keeps the leading band of what
// it receives and forwards the tail, so the payload shrinks by exactly one
// band per hop. The sink's message is its own band plus any dropped
// remainder rows, which it discards.
//
// Backward pass: the sink starts with its converted band; each relay puts
// its own band *before* the payload it received from downstream, so the
// buffer grows by one band per hop and always represents a contiguous,
// correctly ordered run of rows. Placement is decided by row order, never by
// arrival timing.
//
// Every hop re-derives the payload length it must see from the banding
// arithmetic and treats any disagreement with the probe as a fatal protocol
// violation.

use crate::core_modules::band::Band;
use crate::core_modules::topology::ChainTopology;
use crate::core_modules::transport::{Peer, Transport};
use crate::error::{PipelineError, PipelineResult};

/// Bytes of raw pixel data participant `id` must receive on the forward
/// pass: every row from its own band onward, remainder rows included.
pub fn expected_forward_len(total_rows: usize, band: &Band, id: usize) -> usize {
    (total_rows - id * band.rows) * band.row_width * 3
}

/// Glyph cells participant `id` must receive on the backward pass: one band
/// per participant strictly below it in the chain.
pub fn expected_backward_len(world: usize, band: &Band, id: usize) -> usize {
    (world - 1 - id) * band.cells()
}

/// Source half of the forward cascade: keep the leading band of `frame`
/// locally, ship every remaining byte downstream in a single message.
///
/// Returns the source's own band of pixels. Ownership of the tail moves to
/// the transport; nothing of the frame is retained.
pub async fn distribute_from_source<T: Transport>(
    link: &mut T,
    topo: &ChainTopology,
    band: &Band,
    total_rows: usize,
    mut frame: Vec<u8>,
) -> PipelineResult<Vec<u8>> {
    let frame_bytes = total_rows * band.row_width * 3;
    if frame.len() != frame_bytes {
        return Err(PipelineError::frame_source(format!(
            "decoded frame is {} bytes, metadata promised {frame_bytes}",
            frame.len()
        )));
    }

    let tail = frame.split_off(band.pixel_bytes());
    if topo.downstream(topo.source()).is_some() {
        link.send(Peer::Downstream, tail)?;
    }
    // With no downstream the tail is only the dropped remainder rows.
    Ok(frame)
}

/// Relay half of the forward cascade, for every non-source participant:
/// probe, receive, keep the leading band, forward the tail unchanged.
pub async fn distribute_relay<T: Transport>(
    link: &mut T,
    topo: &ChainTopology,
    id: usize,
    band: &Band,
    total_rows: usize,
) -> PipelineResult<Vec<u8>> {
    let expected = expected_forward_len(total_rows, band, id);
    let probed = link.probe_len(Peer::Upstream).await?;
    if probed != expected {
        return Err(PipelineError::LengthMismatch {
            participant: id,
            expected,
            actual: probed,
        });
    }

    let mut payload = link.recv(Peer::Upstream, probed).await?;
    let tail = payload.split_off(band.pixel_bytes());
    if topo.downstream(id).is_some() {
        link.send(Peer::Downstream, tail)?;
    }
    Ok(payload)
}

/// Relay half of the backward cascade, for every non-source participant.
///
/// The sink is simply the relay with no downstream payload to wait for. Own
/// rows go in front of the downstream rows before the combined buffer moves
/// upstream.
pub async fn collect_relay<T: Transport>(
    link: &mut T,
    topo: &ChainTopology,
    id: usize,
    band: &Band,
    glyphs: Vec<u8>,
) -> PipelineResult<()> {
    let mut combined = glyphs;
    if topo.downstream(id).is_some() {
        let expected = expected_backward_len(topo.world(), band, id);
        let probed = link.probe_len(Peer::Downstream).await?;
        if probed != expected {
            return Err(PipelineError::LengthMismatch {
                participant: id,
                expected,
                actual: probed,
            });
        }
        let payload = link.recv(Peer::Downstream, probed).await?;
        combined
            .try_reserve_exact(payload.len())
            .map_err(|_| PipelineError::Allocation(payload.len()))?;
        combined.extend_from_slice(&payload);
    }
    link.send(Peer::Upstream, combined)
}

/// Source half of the backward cascade: write the local band at row offset
/// zero and the combined payload from downstream right after it.
pub async fn collect_at_source<T: Transport>(
    link: &mut T,
    topo: &ChainTopology,
    band: &Band,
    own_glyphs: &[u8],
    grid: &mut [u8],
) -> PipelineResult<()> {
    let cells = band.cells();
    grid[..cells].copy_from_slice(own_glyphs);

    if topo.downstream(topo.source()).is_some() {
        let expected = expected_backward_len(topo.world(), band, topo.source());
        let probed = link.probe_len(Peer::Downstream).await?;
        if probed != expected {
            return Err(PipelineError::LengthMismatch {
                participant: topo.source(),
                expected,
                actual: probed,
            });
        }
        let payload = link.recv(Peer::Downstream, probed).await?;
        grid[cells..cells + payload.len()].copy_from_slice(&payload);
    }
    Ok(())
}

/// Non-source half of the color gather: contribute the fixed-size color band
/// and return.
pub async fn gather_colors_relay<T: Transport>(
    link: &mut T,
    colors: Vec<u8>,
) -> PipelineResult<()> {
    link.gather_to_source(colors).await?;
    Ok(())
}

/// Source half of the color gather: concatenate every participant's color
/// band into `grid` in identity order. Bands are uniformly sized, so unlike
/// the cascades no per-hop resizing arithmetic is involved.
pub async fn gather_colors_at_source<T: Transport>(
    link: &mut T,
    band: &Band,
    own_colors: Vec<u8>,
    grid: &mut [u8],
) -> PipelineResult<()> {
    let stride = band.cells() * 3;
    let parts = link
        .gather_to_source(own_colors)
        .await?
        .ok_or(PipelineError::Disconnected)?;
    for (id, part) in parts.into_iter().enumerate() {
        if part.len() != stride {
            return Err(PipelineError::LengthMismatch {
                participant: id,
                expected: stride,
                actual: part.len(),
            });
        }
        grid[id * stride..(id + 1) * stride].copy_from_slice(&part);
    }
    Ok(())
}
