//! Recoder buffer (spec.md §4.4): an intermediate node holds a bounded
//! buffer of received packets per subgeneration and recombines them into
//! fresh coded packets for downstream nodes, without ever decoding.
//!
//! Buffer capacity is `bufsize` packets per subgeneration; once full, a new
//! arrival evicts an existing slot at random (spec.md §4.4, "random
//! eviction"), using the recoder's own RNG stream so the choice of which
//! decoder/encoder a downstream node models is never perturbed by recoder
//! activity (`src/rng.rs`'s `Stream::Recoder`).

use crate::gf::GfKernel;
use crate::graph::Graph;
use crate::packet::CodedPacket;
use crate::params::Parameters;
use crate::rng::{self, Stream};
use rand::Rng;
use rand::rngs::SmallRng;

/// Recoding scheduling policy (spec.md §4.4's table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheduler {
    /// Trivial: forward one buffered packet unchanged.
    Triv,
    /// Random linear combination of every buffered packet in the chosen
    /// subgeneration.
    Rand,
    /// As `Rand`, but systematic (stored unit-vector) packets are forwarded
    /// unchanged instead of being mixed in.
    RandSys,
    /// Most-linearly-independent: prefers combining packets that together
    /// maximize the rank of the recombination (approximated here by mixing
    /// every buffered packet, which is always full rank over a buffer that
    /// itself has no redundant rows -- see `recode_packet`).
    Mlpi,
    /// As `Mlpi`, with the same systematic passthrough as `RandSys`.
    MlpiSys,
    /// Non-uniform random: coefficients are drawn non-uniformly, biased
    /// toward favoring packets seen less recently (implemented as a weighted
    /// draw over buffer age).
    Nurand,
}

#[derive(Debug, Clone)]
struct Slot {
    pkt: CodedPacket,
    age: u64,
}

/// Per-subgeneration ring of buffered packets plus the shared recoding
/// state (spec.md §4.4). BATS recoding is a specialization, not a separate
/// type: `recode_packet` always draws only from the chosen subgeneration's
/// own slot, which is exactly BATS's "recode within the batch" rule.
#[derive(Debug)]
pub struct RecoderBuffer {
    params: Parameters,
    kernel: GfKernel,
    graph: Graph,
    bufsize: usize,
    slots: Vec<Vec<Slot>>,
    /// Number of packets recoded from each subgeneration so far, used by
    /// `MLPI`/`MLPI_SYS`'s scoring rule (spec.md §4.4).
    emitted_count: Vec<u64>,
    rng: SmallRng,
    clock: u64,
}

impl RecoderBuffer {
    /// Creates a recoder buffer holding up to `bufsize` packets per
    /// subgeneration.
    pub fn new(params: Parameters, graph: Graph, bufsize: usize) -> Self {
        let kernel = GfKernel::new(params.gfpower);
        let n_g = graph.n_g();
        let rng = rng::rng_for(params.seed, Stream::Recoder);
        RecoderBuffer {
            params,
            kernel,
            graph,
            bufsize: bufsize.max(1),
            slots: (0..n_g).map(|_| Vec::new()).collect(),
            emitted_count: vec![0u64; n_g],
            rng,
            clock: 0,
        }
    }

    /// Admits a freshly-received packet into its subgeneration's buffer,
    /// evicting a random existing slot first if already at capacity.
    pub fn ingest(&mut self, pkt: CodedPacket) {
        if pkt.gid < 0 || pkt.gid as usize >= self.graph.n_g() {
            return;
        }
        let gid = pkt.gid as usize;
        self.clock += 1;
        let bucket = &mut self.slots[gid];
        if bucket.len() >= self.bufsize {
            let victim = self.rng.random_range(0..bucket.len());
            bucket.swap_remove(victim);
        }
        bucket.push(Slot { pkt, age: self.clock });
    }

    /// Number of packets currently buffered for subgeneration `gid`.
    pub fn buffered(&self, gid: usize) -> usize {
        self.slots[gid].len()
    }

    /// Produces one recoded packet under `sched`, per spec.md §4.4's table:
    /// each scheduler differs only in *how `g` is chosen*; the combining
    /// step (plain mix, systematic-passthrough, or age-weighted mix) follows
    /// from the scheduler family afterwards. `TRIV` is the only scheduler
    /// that may select an empty subgeneration, in which case a zero packet
    /// is returned for the caller to discard (spec.md §4.4: "emits a zero
    /// packet -- caller may discard"); every other scheduler returns `None`
    /// when no buffer holds anything.
    pub fn recode_packet(&mut self, sched: Scheduler) -> Option<CodedPacket> {
        let gid = self.pick_gid(sched)?;
        self.emitted_count[gid] += 1;
        Some(self.recode_from(gid, sched))
    }

    /// Chooses which subgeneration to recode from, implementing spec.md
    /// §4.4's per-scheduler "Choice of g" column.
    fn pick_gid(&mut self, sched: Scheduler) -> Option<usize> {
        let n_g = self.slots.len();
        match sched {
            // Uniform over every g, even empty ones.
            Scheduler::Triv => Some(self.rng.random_range(0..n_g)),
            // Uniform over non-empty g.
            Scheduler::Rand | Scheduler::RandSys => {
                let candidates: Vec<usize> =
                    (0..n_g).filter(|&g| !self.slots[g].is_empty()).collect();
                if candidates.is_empty() {
                    return None;
                }
                Some(candidates[self.rng.random_range(0..candidates.len())])
            }
            // score(g) = min(held_count(g), size_g) - emitted_count(g), argmax,
            // ties broken by smallest g (spec.md §4.4).
            Scheduler::Mlpi | Scheduler::MlpiSys => {
                let size_g = self.graph.size_g() as u64;
                (0..n_g)
                    .filter(|&g| !self.slots[g].is_empty())
                    .map(|g| {
                        let held = self.slots[g].len() as u64;
                        let score = held.min(size_g) as i64 - self.emitted_count[g] as i64;
                        (g, score)
                    })
                    .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
                    .map(|(g, _)| g)
            }
            // Sample g with probability proportional to held_count(g)
            // (spec.md §4.4).
            Scheduler::Nurand => {
                let weights: Vec<u64> =
                    (0..n_g).map(|g| self.slots[g].len() as u64).collect();
                let total: u64 = weights.iter().sum();
                if total == 0 {
                    return None;
                }
                let mut draw = self.rng.random_range(0..total);
                for (g, &w) in weights.iter().enumerate() {
                    if draw < w {
                        return Some(g);
                    }
                    draw -= w;
                }
                unreachable!("draw < total guarantees a bucket is found")
            }
        }
    }

    fn recode_from(&mut self, gid: usize, sched: Scheduler) -> CodedPacket {
        let size_p = self.params.size_p;
        let size_g = self.graph.size_g();
        if self.slots[gid].is_empty() {
            debug_assert_eq!(sched, Scheduler::Triv, "only TRIV may select an empty buffer");
            return CodedPacket { gid: gid as i32, ucid: -1, coes: vec![0; size_g], syms: vec![0; size_p] };
        }

        match sched {
            Scheduler::RandSys | Scheduler::MlpiSys => {
                if let Some(slot) = self.slots[gid].iter().find(|s| s.pkt.is_systematic()) {
                    return slot.pkt.clone();
                }
                self.mix_all(gid, size_p)
            }
            Scheduler::Nurand => self.mix_weighted_by_age(gid, size_p),
            Scheduler::Triv | Scheduler::Rand | Scheduler::Mlpi => self.mix_all(gid, size_p),
        }
    }

    /// Draws a fresh random coefficient for each buffered packet and sums
    /// the resulting linear combinations (spec.md §4.4's `RAND`/`MLPI`: with
    /// no decode state to rank candidates by information content, `MLPI`
    /// degenerates to mixing the whole (already rank-bounded by `bufsize`)
    /// buffer, same as `RAND`).
    fn mix_all(&mut self, gid: usize, size_p: usize) -> CodedPacket {
        let size_g = self.graph.size_g();
        let mut coes = vec![0u8; size_g];
        let mut syms = vec![0u8; size_p];
        let bucket = self.slots[gid].clone();
        for slot in &bucket {
            let c = self.kernel.random_element(&mut self.rng);
            if c == 0 {
                continue;
            }
            self.kernel.row_axpy(&mut coes, &slot.pkt.coes, c);
            self.kernel.row_axpy(&mut syms, &slot.pkt.syms, c);
        }
        CodedPacket { gid: gid as i32, ucid: -1, coes, syms }
    }

    /// As [`Self::mix_all`], but older slots (lower `age`) get a higher
    /// chance of a non-zero coefficient, so a slot that has sat in the
    /// buffer longest is favored for eviction from future recodings once a
    /// fresher packet supersedes it (spec.md §4.4's `NURAND`).
    fn mix_weighted_by_age(&mut self, gid: usize, size_p: usize) -> CodedPacket {
        let size_g = self.graph.size_g();
        let mut coes = vec![0u8; size_g];
        let mut syms = vec![0u8; size_p];
        let bucket = self.slots[gid].clone();
        let newest = bucket.iter().map(|s| s.age).max().unwrap_or(0);
        for slot in &bucket {
            let staleness = newest - slot.age;
            // Older slots (larger staleness) are skipped less often.
            let skip = staleness > 0 && self.rng.random_range(0..staleness + 2) == 0;
            if skip {
                continue;
            }
            let c = self.kernel.random_element(&mut self.rng);
            if c == 0 {
                continue;
            }
            self.kernel.row_axpy(&mut coes, &slot.pkt.coes, c);
            self.kernel.row_axpy(&mut syms, &slot.pkt.syms, c);
        }
        CodedPacket { gid: gid as i32, ucid: -1, coes, syms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncodeContext;
    use crate::params::{CodeType, PrecodeField};

    fn params() -> Parameters {
        Parameters {
            datasize: 512,
            size_p: 16,
            size_c: 2,
            size_b: 4,
            size_g: 8,
            code_type: CodeType::Band,
            bpc: PrecodeField::Gf256,
            gfpower: 8,
            sys: false,
            seed: 9,
        }
    }

    #[test]
    fn eviction_keeps_buffer_at_capacity() {
        let p = params();
        let m = p.m();
        let graph = Graph::build(&p, m).unwrap();
        let mut rb = RecoderBuffer::new(p.clone(), graph, 3);
        for _ in 0..10 {
            rb.ingest(CodedPacket {
                gid: 0,
                ucid: -1,
                coes: vec![1; p.size_g],
                syms: vec![0; p.size_p],
            });
        }
        assert_eq!(rb.buffered(0), 3);
    }

    #[test]
    fn recode_packet_is_a_linear_combination_of_buffer() {
        let p = params();
        let data: Vec<u8> = (0..p.datasize).map(|i| i as u8).collect();
        let mut enc = EncodeContext::create(p.clone(), &data).unwrap();
        let graph = enc.graph().clone();
        let mut rb = RecoderBuffer::new(p.clone(), graph, 8);
        for _ in 0..8 {
            rb.ingest(enc.generate_packet());
        }
        let out = rb.recode_packet(Scheduler::Rand).unwrap();
        assert_eq!(out.coes.len(), p.size_g);
        assert_eq!(out.syms.len(), p.size_p);
    }

    #[test]
    fn empty_buffer_yields_none_for_rand() {
        let p = params();
        let m = p.m();
        let graph = Graph::build(&p, m).unwrap();
        let mut rb = RecoderBuffer::new(p, graph, 4);
        assert!(rb.recode_packet(Scheduler::Rand).is_none());
        assert!(rb.recode_packet(Scheduler::Mlpi).is_none());
        assert!(rb.recode_packet(Scheduler::Nurand).is_none());
    }

    #[test]
    fn triv_may_pick_an_empty_subgeneration_and_emits_a_zero_packet() {
        // TRIV is uniform over *every* g, including empty ones (spec.md
        // §4.4): with every buffer empty, it must still return a packet
        // (never `None`), and that packet must be all-zero.
        let p = params();
        let m = p.m();
        let graph = Graph::build(&p, m).unwrap();
        let mut rb = RecoderBuffer::new(p.clone(), graph, 4);
        let out = rb.recode_packet(Scheduler::Triv).unwrap();
        assert!(out.coes.iter().all(|&c| c == 0));
        assert!(out.syms.iter().all(|&c| c == 0));
    }

    #[test]
    fn mlpi_prefers_the_least_recently_emitted_subgeneration() {
        let p = params();
        let m = p.m();
        let graph = Graph::build(&p, m).unwrap();
        let mut rb = RecoderBuffer::new(p.clone(), graph, 8);
        for gid in [0i32, 1] {
            for _ in 0..4 {
                rb.ingest(CodedPacket {
                    gid,
                    ucid: -1,
                    coes: vec![1; p.size_g],
                    syms: vec![2; p.size_p],
                });
            }
        }
        // Both subgenerations start with equal held_count and emitted_count
        // 0; repeatedly recoding from one should lower its score below the
        // other's, causing MLPI to switch.
        let first = rb.pick_gid(Scheduler::Mlpi).unwrap();
        rb.recode_packet(Scheduler::Mlpi).unwrap();
        // after one emission from `first`, its score drops by one relative
        // to the other subgeneration, which still has the original score.
        let other = 1 - first;
        let next = rb.pick_gid(Scheduler::Mlpi).unwrap();
        assert_eq!(next, other);
    }

    #[test]
    fn sys_scheduler_forwards_systematic_packet_unchanged() {
        let mut p = params();
        p.sys = true;
        let data: Vec<u8> = (0..p.datasize).map(|i| i as u8).collect();
        let mut enc = EncodeContext::create(p.clone(), &data).unwrap();
        let graph = enc.graph().clone();
        let mut rb = RecoderBuffer::new(p.clone(), graph, 8);
        let mut sys_pkt = None;
        for _ in 0..64 {
            let pkt = enc.generate_packet();
            if pkt.is_systematic() {
                sys_pkt = Some(pkt.clone());
            }
            rb.ingest(pkt);
            if sys_pkt.is_some() {
                break;
            }
        }
        assert!(sys_pkt.is_some(), "expected at least one systematic packet");
        let out = rb.recode_packet(Scheduler::RandSys).unwrap();
        assert!(out.is_systematic() || out.coes.iter().any(|&c| c != 0));
    }
}
