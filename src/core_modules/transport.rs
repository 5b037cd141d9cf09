// THEORY:
// The `transport` module hides the message-passing medium behind a small
// trait so the cascade logic never knows whether its neighbors are tokio
// tasks, OS processes or remote machines. The protocol only ever needs four
// primitives: a non-blocking nearest-neighbor send, a blocking length probe,
// a consuming receive, and two collectives rooted at the source (a broadcast
// and an identity-ordered gather).
//
// Key architectural principles:
// 1.  **Single-owner buffers**: a send moves the `Vec<u8>` into the
//     transport; a receive hands back a freshly owned buffer sized by the
//     probe. No payload is ever aliased across a hop.
// 2.  **FIFO per link**: messages between one fixed neighbor pair arrive in
//     send order. Nothing is assumed across different links.
// 3.  **Blocking receives, non-blocking sends**: a participant waiting for
//     its neighbor parks until the matching send arrives; there are no
//     timeouts and no supervision.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::debug;

use crate::core_modules::topology::ChainTopology;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::StreamInfo;

/// The only two parties a participant ever exchanges cascade payloads with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    Upstream,
    Downstream,
}

/// Control-lane messages broadcast from the source to every participant.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    /// Stream metadata, broadcast exactly once before the frame loop starts.
    Metadata(StreamInfo),
    /// The per-frame quit decision. `true` terminates every participant at
    /// the current frame boundary.
    Quit(bool),
}

/// Message-passing medium between chain neighbors.
pub trait Transport {
    /// Enqueues `payload` toward a neighbor without blocking. Ownership of
    /// the buffer moves to the transport.
    fn send(&mut self, to: Peer, payload: Vec<u8>) -> PipelineResult<()>;

    /// Blocks until a message from `from` is pending and returns its exact
    /// byte length without consuming it.
    fn probe_len(&mut self, from: Peer) -> impl Future<Output = PipelineResult<usize>> + Send;

    /// Consumes the pending message from `from`. `len` must equal the probed
    /// length; a disagreement is a protocol violation.
    fn recv(&mut self, from: Peer, len: usize)
    -> impl Future<Output = PipelineResult<Vec<u8>>> + Send;

    /// One-to-all broadcast rooted at the source. The source passes
    /// `Some(value)`; everyone else passes `None` and blocks for the value.
    fn broadcast_from_source(
        &mut self,
        value: Option<Control>,
    ) -> impl Future<Output = PipelineResult<Control>> + Send;

    /// All-to-one gather rooted at the source. Returns `Some` with every
    /// contribution in identity order at the source, `None` elsewhere.
    fn gather_to_source(
        &mut self,
        part: Vec<u8>,
    ) -> impl Future<Output = PipelineResult<Option<Vec<Vec<u8>>>>> + Send;

    /// Whether the source has already signalled shutdown on the control
    /// lane. Consulted when a blocking receive fails, to tell a synchronized
    /// teardown apart from a crashed neighbor.
    fn shutdown_pending(&mut self) -> bool {
        false
    }
}

/// One direction of a participant's neighbor wiring.
#[derive(Debug, Default)]
struct LinkHalf {
    tx: Option<UnboundedSender<Vec<u8>>>,
    rx: Option<UnboundedReceiver<Vec<u8>>>,
    /// A message pulled off the wire by a probe, waiting for its `recv`.
    probed: Option<Vec<u8>>,
}

/// In-process [`Transport`]: one participant per tokio task, one unbounded
/// channel per link direction, a control lane for broadcasts and a direct
/// lane to the source for gathers.
#[derive(Debug)]
pub struct ChannelLink {
    id: usize,
    world: usize,
    up: LinkHalf,
    down: LinkHalf,
    /// Source only: one control sender per non-source participant.
    ctrl_txs: Vec<UnboundedSender<Control>>,
    /// Non-source only: the receiving end of the control lane.
    ctrl_rx: Option<UnboundedReceiver<Control>>,
    /// Non-source only: direct lane to the source, tagged with the sender id.
    gather_tx: Option<UnboundedSender<(usize, Vec<u8>)>>,
    /// Source only: receiving end of the gather lane.
    gather_rx: Option<UnboundedReceiver<(usize, Vec<u8>)>>,
}

impl ChannelLink {
    fn half(&mut self, peer: Peer) -> &mut LinkHalf {
        match peer {
            Peer::Upstream => &mut self.up,
            Peer::Downstream => &mut self.down,
        }
    }

    /// Participant identity this endpoint belongs to.
    pub fn id(&self) -> usize {
        self.id
    }
}

/// Builds the full wiring for `topo`, one [`ChannelLink`] per participant in
/// identity order.
pub fn build_chain(topo: &ChainTopology) -> Vec<ChannelLink> {
    let world = topo.world();
    let mut links: Vec<ChannelLink> = (0..world)
        .map(|id| ChannelLink {
            id,
            world,
            up: LinkHalf::default(),
            down: LinkHalf::default(),
            ctrl_txs: Vec::new(),
            ctrl_rx: None,
            gather_tx: None,
            gather_rx: None,
        })
        .collect();

    // Data lanes between each neighbor pair, one channel per direction.
    for k in 0..world.saturating_sub(1) {
        let (down_tx, down_rx) = mpsc::unbounded_channel();
        let (up_tx, up_rx) = mpsc::unbounded_channel();
        links[k].down.tx = Some(down_tx);
        links[k].down.rx = Some(up_rx);
        links[k + 1].up.rx = Some(down_rx);
        links[k + 1].up.tx = Some(up_tx);
    }

    // Control lane from the source to every other participant.
    for k in 1..world {
        let (tx, rx) = mpsc::unbounded_channel();
        links[0].ctrl_txs.push(tx);
        links[k].ctrl_rx = Some(rx);
    }

    // Gather lane from every other participant back to the source.
    if world > 1 {
        let (tx, rx) = mpsc::unbounded_channel();
        links[0].gather_rx = Some(rx);
        for link in links.iter_mut().skip(1) {
            link.gather_tx = Some(tx.clone());
        }
    }

    links
}

impl Transport for ChannelLink {
    fn send(&mut self, to: Peer, payload: Vec<u8>) -> PipelineResult<()> {
        let tx = self
            .half(to)
            .tx
            .as_ref()
            .ok_or(PipelineError::Disconnected)?;
        tx.send(payload).map_err(|_| PipelineError::Disconnected)
    }

    async fn probe_len(&mut self, from: Peer) -> PipelineResult<usize> {
        let half = self.half(from);
        if half.probed.is_none() {
            let rx = half.rx.as_mut().ok_or(PipelineError::Disconnected)?;
            let payload = rx.recv().await.ok_or(PipelineError::Disconnected)?;
            half.probed = Some(payload);
        }
        Ok(half.probed.as_ref().map(Vec::len).unwrap_or_default())
    }

    async fn recv(&mut self, from: Peer, len: usize) -> PipelineResult<Vec<u8>> {
        let id = self.id;
        let half = self.half(from);
        let payload = match half.probed.take() {
            Some(payload) => payload,
            None => {
                let rx = half.rx.as_mut().ok_or(PipelineError::Disconnected)?;
                rx.recv().await.ok_or(PipelineError::Disconnected)?
            }
        };
        if payload.len() != len {
            return Err(PipelineError::LengthMismatch {
                participant: id,
                expected: len,
                actual: payload.len(),
            });
        }
        Ok(payload)
    }

    async fn broadcast_from_source(
        &mut self,
        value: Option<Control>,
    ) -> PipelineResult<Control> {
        match value {
            Some(value) => {
                for tx in &self.ctrl_txs {
                    // A participant that already left the chain is the
                    // broadcast's problem to tolerate, not to report.
                    if tx.send(value.clone()).is_err() {
                        debug!(id = self.id, "control receiver already gone");
                    }
                }
                Ok(value)
            }
            None => {
                let rx = self.ctrl_rx.as_mut().ok_or(PipelineError::Disconnected)?;
                rx.recv().await.ok_or(PipelineError::Disconnected)
            }
        }
    }

    async fn gather_to_source(
        &mut self,
        part: Vec<u8>,
    ) -> PipelineResult<Option<Vec<Vec<u8>>>> {
        if let Some(tx) = &self.gather_tx {
            tx.send((self.id, part))
                .map_err(|_| PipelineError::Disconnected)?;
            return Ok(None);
        }

        // Source: its own contribution plus one message per other
        // participant, reordered by identity regardless of arrival order.
        let mut parts: Vec<Option<Vec<u8>>> = (0..self.world).map(|_| None).collect();
        parts[self.id] = Some(part);
        if let Some(rx) = self.gather_rx.as_mut() {
            for _ in 1..self.world {
                let (from, payload) = rx.recv().await.ok_or(PipelineError::Disconnected)?;
                parts[from] = Some(payload);
            }
        }
        let parts = parts
            .into_iter()
            .map(|p| p.ok_or(PipelineError::Disconnected))
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(Some(parts))
    }

    fn shutdown_pending(&mut self) -> bool {
        let Some(rx) = self.ctrl_rx.as_mut() else {
            return false;
        };
        loop {
            match rx.try_recv() {
                Ok(Control::Quit(true)) => return true,
                Ok(_) => continue,
                Err(TryRecvError::Disconnected) => return true,
                Err(TryRecvError::Empty) => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(world: usize) -> Vec<ChannelLink> {
        build_chain(&ChainTopology::new(world))
    }

    #[tokio::test]
    async fn messages_on_one_link_arrive_in_send_order() {
        let mut links = chain(2);
        let mut right = links.pop().unwrap();
        let mut left = links.pop().unwrap();

        left.send(Peer::Downstream, vec![1]).unwrap();
        left.send(Peer::Downstream, vec![2, 2]).unwrap();
        assert_eq!(right.probe_len(Peer::Upstream).await.unwrap(), 1);
        assert_eq!(right.recv(Peer::Upstream, 1).await.unwrap(), vec![1]);
        assert_eq!(right.probe_len(Peer::Upstream).await.unwrap(), 2);
        assert_eq!(right.recv(Peer::Upstream, 2).await.unwrap(), vec![2, 2]);
    }

    #[tokio::test]
    async fn probe_does_not_consume() {
        let mut links = chain(2);
        let mut right = links.pop().unwrap();
        let mut left = links.pop().unwrap();

        right.send(Peer::Upstream, vec![9; 5]).unwrap();
        assert_eq!(left.probe_len(Peer::Downstream).await.unwrap(), 5);
        assert_eq!(left.probe_len(Peer::Downstream).await.unwrap(), 5);
        assert_eq!(left.recv(Peer::Downstream, 5).await.unwrap(), vec![9; 5]);
    }

    #[tokio::test]
    async fn recv_with_wrong_length_is_a_protocol_violation() {
        let mut links = chain(2);
        let mut right = links.pop().unwrap();
        let mut left = links.pop().unwrap();

        left.send(Peer::Downstream, vec![0; 4]).unwrap();
        let err = right.recv(Peer::Upstream, 7).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::LengthMismatch { participant: 1, expected: 7, actual: 4 }
        ));
    }

    #[tokio::test]
    async fn broadcast_reaches_every_participant() {
        let mut links = chain(3);
        let mut c = links.pop().unwrap();
        let mut b = links.pop().unwrap();
        let mut a = links.pop().unwrap();

        let sent = a
            .broadcast_from_source(Some(Control::Quit(true)))
            .await
            .unwrap();
        assert_eq!(sent, Control::Quit(true));
        assert_eq!(
            b.broadcast_from_source(None).await.unwrap(),
            Control::Quit(true)
        );
        assert_eq!(
            c.broadcast_from_source(None).await.unwrap(),
            Control::Quit(true)
        );
    }

    #[tokio::test]
    async fn gather_orders_parts_by_identity() {
        let mut links = chain(3);
        let mut c = links.pop().unwrap();
        let mut b = links.pop().unwrap();
        let mut a = links.pop().unwrap();

        // Deliberately contribute out of identity order.
        assert_eq!(c.gather_to_source(vec![2, 2]).await.unwrap(), None);
        assert_eq!(b.gather_to_source(vec![1, 1]).await.unwrap(), None);
        let parts = a.gather_to_source(vec![0, 0]).await.unwrap().unwrap();
        assert_eq!(parts, vec![vec![0, 0], vec![1, 1], vec![2, 2]]);
    }

    #[tokio::test]
    async fn dropped_neighbor_surfaces_as_disconnect() {
        let mut links = chain(2);
        let mut right = links.pop().unwrap();
        drop(links); // the source endpoint goes away

        let err = right.probe_len(Peer::Upstream).await.unwrap_err();
        assert!(matches!(err, PipelineError::Disconnected));
        assert!(right.shutdown_pending());
    }

    #[tokio::test]
    async fn shutdown_pending_sees_a_queued_quit() {
        let mut links = chain(2);
        let mut right = links.pop().unwrap();
        let mut left = links.pop().unwrap();

        assert!(!right.shutdown_pending());
        left.broadcast_from_source(Some(Control::Quit(false)))
            .await
            .unwrap();
        left.broadcast_from_source(Some(Control::Quit(true)))
            .await
            .unwrap();
        assert!(right.shutdown_pending());
    }
}
