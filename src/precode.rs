//! Inner precode (spec.md §3, glossary: "Precode"): `size_c` parity rows
//! appended to the `M - size_c` source-data rows so that the complete `M`-row
//! matrix `S` is what the bipartite graph and the encoder/decoder operate on.
//!
//! spec.md leaves the exact parity-check construction for `bpc=0` as an
//! explicit Open Question ("the implementation must publish its precode
//! matrix construction as part of the wire spec since decoders must apply
//! its inverse"). SPEC_FULL.md §3.4 resolves it: a staircase/accumulate tap
//! set (same family as LT/Raptor precodes) plus a handful of seeded random
//! taps per parity row, weighted by `1` for the binary precode or by a
//! nonzero seeded GF(256) coefficient for the GF(256) precode.
//!
//! Because parity rows are ordinary rows of the same `M`-row system that the
//! bipartite graph is built over (`Graph::build` is always called with the
//! full `M`, parity included), "running the precode backwards" reduces to
//! the decoder's ordinary full-rank completion over all `M` rows -- no
//! separate inverse solver is needed. `recover_data` simply strips the
//! trailing `size_c` parity rows.

use crate::gf::GfKernel;
use crate::params::PrecodeField;
use crate::rng::{self, Stream};
use rand::Rng;

/// One parity row's tap set: `(source_row, coefficient)` pairs contributing
/// to it.
#[derive(Debug, Clone)]
pub struct ParityRow {
    taps: Vec<(u32, u8)>,
}

/// The full precode: `size_c` parity rows over `m_data` source-data rows.
#[derive(Debug, Clone)]
pub struct Precode {
    m_data: usize,
    rows: Vec<ParityRow>,
}

impl Precode {
    /// Builds the (seed-determined, data-independent) tap structure. Safe to
    /// call once and reuse across repeated `apply` calls whenever the
    /// underlying data changes (spec.md §4.2's `load_file_to_context`
    /// "re-runs the precode").
    pub fn build(m_data: usize, size_c: usize, field: PrecodeField, gfpower: u8, seed: u64) -> Self {
        let kernel = GfKernel::new(gfpower);
        let mut rng = rng::rng_for(seed, Stream::Precode);
        let mut rows = Vec::with_capacity(size_c);
        if size_c == 0 || m_data == 0 {
            return Precode { m_data, rows };
        }
        for r in 0..size_c {
            let mut taps = Vec::new();
            // Staircase/accumulate taps: every size_c-th data row starting at r.
            let mut idx = r;
            while idx < m_data {
                taps.push(idx as u32);
                idx += size_c;
            }
            // A handful of additional seeded random taps to raise the
            // parity row's degree and spread its dependency on the data.
            let extra = size_c.min(m_data);
            for _ in 0..extra {
                taps.push(rng.random_range(0..m_data as u32));
            }
            taps.sort_unstable();
            taps.dedup();
            let weighted = taps
                .into_iter()
                .map(|row| {
                    let coeff = match field {
                        PrecodeField::Binary => 1u8,
                        PrecodeField::Gf256 => {
                            // any nonzero field element
                            let max = kernel.field_size() - 1;
                            1 + rng.random_range(0..max) as u8
                        }
                    };
                    (row, coeff)
                })
                .collect();
            rows.push(ParityRow { taps: weighted });
        }
        Precode { m_data, rows }
    }

    /// Number of parity rows.
    pub fn size_c(&self) -> usize {
        self.rows.len()
    }

    /// Computes and writes the `size_c` parity rows of `s` (a flat, row-major
    /// `(m_data + size_c) * size_p` buffer) from its `m_data` data rows.
    pub fn apply(&self, s: &mut [u8], size_p: usize, kernel: &GfKernel) {
        for (r, row) in self.rows.iter().enumerate() {
            let mut acc = vec![0u8; size_p];
            for &(src_row, coeff) in &row.taps {
                let start = src_row as usize * size_p;
                kernel.row_axpy(&mut acc, &s[start..start + size_p], coeff);
            }
            let prow = self.m_data + r;
            s[prow * size_p..(prow + 1) * size_p].copy_from_slice(&acc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_fixed_seed() {
        let a = Precode::build(100, 4, PrecodeField::Gf256, 8, 7);
        let b = Precode::build(100, 4, PrecodeField::Gf256, 8, 7);
        assert_eq!(a.rows.len(), b.rows.len());
        for (ra, rb) in a.rows.iter().zip(&b.rows) {
            assert_eq!(ra.taps, rb.taps);
        }
    }

    #[test]
    fn apply_fills_parity_rows() {
        let kernel = GfKernel::new(8);
        let m_data = 20;
        let size_c = 3;
        let size_p = 8;
        let precode = Precode::build(m_data, size_c, PrecodeField::Gf256, 8, 1);
        let mut s = vec![0u8; (m_data + size_c) * size_p];
        for (i, b) in s.iter_mut().enumerate().take(m_data * size_p) {
            *b = (i * 37 + 5) as u8;
        }
        precode.apply(&mut s, size_p, &kernel);
        // parity rows shouldn't be trivially all-zero given nonzero data and taps
        let parity_start = m_data * size_p;
        assert!(s[parity_start..].iter().any(|&b| b != 0));
    }

    #[test]
    fn binary_precode_uses_unit_coefficients() {
        let precode = Precode::build(50, 2, PrecodeField::Binary, 1, 3);
        for row in &precode.rows {
            assert!(row.taps.iter().all(|&(_, c)| c == 1));
        }
    }
}
