// THEORY:
// The `topology` module fixes the shape of the worker group for the lifetime
// of the process: a non-periodic line of W participants, identity 0 at one
// end and identity W-1 at the other. Every cascade in this crate is expressed
// purely in terms of "my upstream neighbor" and "my downstream neighbor", so
// this is the only place that knows how identities relate to each other.
//
// Key architectural principles:
// 1.  **Line, not ring**: there is no wraparound. The source has no upstream
//     and the sink has no downstream, which is exactly what terminates the
//     forward and backward cascades.
// 2.  **Degenerate worlds degrade**: a requested world size below one is not
//     an error. It collapses to a single participant that is both source and
//     sink and performs no network hops at all.

use tracing::warn;

/// The fixed, non-periodic 1-D ordering of all cooperating participants.
///
/// Immutable once built; participants hold a copy for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTopology {
    world: usize,
}

impl ChainTopology {
    /// Builds the chain for `world` participants, degrading a degenerate
    /// request to a single self-contained participant.
    pub fn new(world: usize) -> Self {
        if world < 1 {
            warn!(requested = world, "degenerate world size, running single-participant");
            return Self { world: 1 };
        }
        Self { world }
    }

    /// Number of participants in the chain.
    pub fn world(&self) -> usize {
        self.world
    }

    /// Identity of the distinguished source endpoint.
    pub fn source(&self) -> usize {
        0
    }

    /// Identity of the distinguished sink endpoint.
    pub fn sink(&self) -> usize {
        self.world - 1
    }

    pub fn is_source(&self, id: usize) -> bool {
        id == self.source()
    }

    pub fn is_sink(&self, id: usize) -> bool {
        id == self.sink()
    }

    /// The neighbor a participant receives frame data from, if any.
    pub fn upstream(&self, id: usize) -> Option<usize> {
        (id > 0).then(|| id - 1)
    }

    /// The neighbor a participant forwards frame data to, if any.
    pub fn downstream(&self, id: usize) -> Option<usize> {
        (id + 1 < self.world).then_some(id + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_of_four_links_up_correctly() {
        let topo = ChainTopology::new(4);
        assert_eq!(topo.world(), 4);
        assert!(topo.is_source(0));
        assert!(topo.is_sink(3));
        assert_eq!(topo.upstream(0), None);
        assert_eq!(topo.downstream(0), Some(1));
        assert_eq!(topo.upstream(2), Some(1));
        assert_eq!(topo.downstream(2), Some(3));
        assert_eq!(topo.downstream(3), None);
    }

    #[test]
    fn no_wraparound() {
        let topo = ChainTopology::new(3);
        assert_ne!(topo.upstream(0), Some(2));
        assert_ne!(topo.downstream(2), Some(0));
    }

    #[test]
    fn single_participant_is_both_endpoints() {
        let topo = ChainTopology::new(1);
        assert!(topo.is_source(0));
        assert!(topo.is_sink(0));
        assert_eq!(topo.upstream(0), None);
        assert_eq!(topo.downstream(0), None);
    }

    #[test]
    fn zero_world_degrades_to_one() {
        let topo = ChainTopology::new(0);
        assert_eq!(topo.world(), 1);
        assert!(topo.is_source(0) && topo.is_sink(0));
    }
}
