//! Bipartite source/subgeneration membership graph (spec.md §3, "Bipartite
//! membership `G`").
//!
//! Storage follows spec.md §9's advice: "an arena-backed compressed-sparse-
//! row pair -- forward `members`, inverse `subgens` -- both built once at
//! creation, read-only thereafter." `members`/`member_off` give, for each
//! subgeneration, its ordered list of source-row indices; `subgens`/
//! `subgen_off` give the inverse, for each source row the subgenerations it
//! belongs to.

use crate::error::{Error, Result};
use crate::params::{CodeType, Parameters};
use crate::rng::{self, Stream};
use rand::Rng;
use std::collections::HashSet;

/// The bipartite membership graph, built once from `(type, M, size_b,
/// size_g, seed)` and read-only afterwards (spec.md §3 invariant (c)).
#[derive(Debug, Clone)]
pub struct Graph {
    m: usize,
    size_g: usize,
    n_g: usize,
    members: Vec<u32>,
    member_off: Vec<u32>,
    subgens: Vec<u32>,
    subgen_off: Vec<u32>,
}

impl Graph {
    /// Builds the graph for `params`. `m` is passed in rather than
    /// recomputed so callers (the precode, which extends `M` with parity
    /// rows) and the graph agree on the exact same value.
    pub fn build(params: &Parameters, m: usize) -> Result<Self> {
        let size_g = params.size_g;
        let n_g = params.n_g()?;
        if params.code_type != CodeType::Bats && size_g > m {
            return Err(Error::InvalidParameters(
                "size_g cannot exceed M for non-BATS code types",
            ));
        }
        let mut rng = rng::rng_for(params.seed, Stream::Graph);

        let (members, member_off) = match params.code_type {
            CodeType::Rand => build_rand(m, size_g, n_g, &mut rng),
            CodeType::Band => build_band(m, size_g, n_g, false),
            CodeType::Windwrap => build_band(m, size_g, n_g, true),
            CodeType::Bats => build_bats(m, size_g, n_g, &mut rng),
        };

        let (subgens, subgen_off) = invert(&members, &member_off, m);

        let graph = Graph { m, size_g, n_g, members, member_off, subgens, subgen_off };
        graph.check_invariants()?;
        Ok(graph)
    }

    fn check_invariants(&self) -> Result<()> {
        for g in 0..self.n_g {
            if self.members(g).len() != self.size_g {
                return Err(Error::InvalidParameters(
                    "internal: a subgeneration did not receive exactly size_g members",
                ));
            }
        }
        for i in 0..self.m {
            if self.subgens(i).is_empty() {
                return Err(Error::InvalidParameters(
                    "internal: a source row is not covered by any subgeneration",
                ));
            }
        }
        Ok(())
    }

    /// Number of source rows.
    pub fn m(&self) -> usize {
        self.m
    }

    /// Number of subgenerations.
    pub fn n_g(&self) -> usize {
        self.n_g
    }

    /// Subgeneration size.
    pub fn size_g(&self) -> usize {
        self.size_g
    }

    /// Ordered member list of subgeneration `g`.
    pub fn members(&self, g: usize) -> &[u32] {
        let start = self.member_off[g] as usize;
        let end = self.member_off[g + 1] as usize;
        &self.members[start..end]
    }

    /// Subgenerations containing source row `i`.
    pub fn subgens(&self, i: usize) -> &[u32] {
        let start = self.subgen_off[i] as usize;
        let end = self.subgen_off[i + 1] as usize;
        &self.subgens[start..end]
    }

    /// Degree (number of subgenerations) of source row `i`. Used by the OA
    /// decoder's pivot-ordering heuristic (spec.md §4.3.2).
    pub fn degree(&self, i: usize) -> usize {
        self.subgens(i).len()
    }
}

fn build_band(m: usize, size_g: usize, n_g: usize, wrap: bool) -> (Vec<u32>, Vec<u32>) {
    let mut members = Vec::with_capacity(n_g * size_g);
    let mut member_off = Vec::with_capacity(n_g + 1);
    member_off.push(0u32);
    for g in 0..n_g {
        for k in 0..size_g {
            let idx = g + k;
            let row = if wrap { idx % m } else { idx };
            members.push(row as u32);
        }
        member_off.push(members.len() as u32);
    }
    (members, member_off)
}

/// Seeded balanced-random placement (SPEC_FULL.md §3.3): a round-robin
/// linear-probe pass first guarantees every row is covered at least once
/// without ever overfilling a subgeneration, then a seeded rejection-sampling
/// pass fills each subgeneration up to exactly `size_g` distinct rows.
fn build_rand(
    m: usize,
    size_g: usize,
    n_g: usize,
    rng: &mut rand::rngs::SmallRng,
) -> (Vec<u32>, Vec<u32>) {
    let mut sets: Vec<HashSet<u32>> = (0..n_g).map(|_| HashSet::with_capacity(size_g)).collect();

    // Phase A: guarantee coverage of every source row.
    let mut g = 0usize;
    for i in 0..m {
        let mut tries = 0;
        while sets[g].len() >= size_g && tries < n_g {
            g = (g + 1) % n_g;
            tries += 1;
        }
        sets[g].insert(i as u32);
        g = (g + 1) % n_g;
    }

    // Phase B: seeded random fill to bring every subgeneration up to exactly
    // size_g distinct members.
    for set in sets.iter_mut() {
        while set.len() < size_g {
            let candidate = rng.random_range(0..m as u32);
            set.insert(candidate);
        }
    }

    let mut members = Vec::with_capacity(n_g * size_g);
    let mut member_off = Vec::with_capacity(n_g + 1);
    member_off.push(0u32);
    for set in &sets {
        let mut v: Vec<u32> = set.iter().copied().collect();
        v.sort_unstable();
        members.extend_from_slice(&v);
        member_off.push(members.len() as u32);
    }
    (members, member_off)
}

/// BATS: spec.md §3 describes each batch as independently sampling
/// `size_g` rows uniformly from `[0, M)` with "no overlap guarantees". Pure
/// independent-per-batch sampling cannot itself promise invariant (a)
/// ("every source row appears in at least one subgeneration") for arbitrary
/// `(M, size_g, n_g)` -- some row can simply never be drawn. SPEC_FULL.md
/// §3.3 resolves this by reusing `build_rand`'s seeded balanced placement
/// (round-robin coverage pass, then seeded random fill to `size_g` distinct
/// members per batch) for BATS too, trading strict independence between
/// batches for the coverage guarantee the graph's own invariants require.
fn build_bats(
    m: usize,
    size_g: usize,
    n_g: usize,
    rng: &mut rand::rngs::SmallRng,
) -> (Vec<u32>, Vec<u32>) {
    build_rand(m, size_g, n_g, rng)
}

fn invert(members: &[u32], member_off: &[u32], m: usize) -> (Vec<u32>, Vec<u32>) {
    let mut counts = vec![0u32; m];
    for &row in members {
        counts[row as usize] += 1;
    }
    let mut subgen_off = Vec::with_capacity(m + 1);
    subgen_off.push(0u32);
    for &c in &counts {
        subgen_off.push(subgen_off.last().unwrap() + c);
    }
    let mut cursor = subgen_off.clone();
    let mut subgens = vec![0u32; members.len()];
    let n_g = member_off.len() - 1;
    for g in 0..n_g {
        let start = member_off[g] as usize;
        let end = member_off[g + 1] as usize;
        for &row in &members[start..end] {
            let slot = &mut cursor[row as usize];
            subgens[*slot as usize] = g as u32;
            *slot += 1;
        }
    }
    (subgens, subgen_off)
}
