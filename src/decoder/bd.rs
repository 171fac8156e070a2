//! Band decoder (spec.md §4.3.3), valid only for `BAND`/`WINDWRAP` code
//! types.
//!
//! Exploits the contiguous-window membership these code types guarantee:
//! each row's nonzero coefficients span a short run of columns starting at
//! its subgeneration id, so pivot rows are stored as `(anchor, coes)` --
//! `anchor` is the lowest column the row touches, `coes[k]` the coefficient
//! for column `anchor + k` -- instead of scattering into a full `M`-wide
//! vector. Forward elimination walks columns in ascending order the same
//! way GG does within one generation, just across the whole `M`-row system;
//! fill-in (described in SPEC_FULL.md §3.7) can widen a row's band but never
//! collapses it back to the naive dense `O(M)` case for `BAND`. `WINDWRAP`
//! generations whose window wraps past `M-1` back to `0` fall back to a
//! dense `M`-wide row (`anchor = 0`) -- there are only `size_g - 1` of
//! those, so the fast path still dominates.

use crate::error::{Error, Result};
use crate::gf::GfKernel;
use crate::graph::Graph;
use crate::packet::CodedPacket;
use crate::params::{CodeType, Parameters};

#[derive(Debug, Clone)]
struct BandRow {
    anchor: usize,
    coes: Vec<u8>,
    sym: Vec<u8>,
}

/// The BD decoder (spec.md §4.3.3).
#[derive(Debug)]
pub struct BdDecoder {
    params: Parameters,
    kernel: GfKernel,
    graph: Graph,
    m: usize,
    size_g: usize,
    size_p: usize,
    pivots: Vec<Option<BandRow>>,
    rank: usize,
    finished: bool,
    recovered: Option<Vec<u8>>,
    operations: u64,
    received: u64,
    malformed: u64,
}

impl BdDecoder {
    pub(crate) fn new(params: Parameters) -> Result<Self> {
        if !matches!(params.code_type, CodeType::Band | CodeType::Windwrap) {
            return Err(Error::UnsupportedDecoder(
                "BD requires a BAND or WINDWRAP code type",
            ));
        }
        let kernel = GfKernel::new(params.gfpower);
        let m = params.m();
        let graph = Graph::build(&params, m)?;
        let size_g = graph.size_g();
        let size_p = params.size_p;
        Ok(BdDecoder {
            params,
            kernel,
            graph,
            m,
            size_g,
            size_p,
            pivots: vec![None; m],
            rank: 0,
            finished: false,
            recovered: None,
            operations: 0,
            received: 0,
            malformed: 0,
        })
    }

    /// Builds the `(anchor, coes)` pair for an incoming packet's
    /// subgeneration, using the tight `size_g`-wide window when the
    /// membership is a contiguous run and falling back to a dense `M`-wide
    /// row otherwise (only possible for a wrapping `WINDWRAP` generation).
    fn scatter(&self, gid: usize, coes_in: &[u8]) -> (usize, Vec<u8>) {
        let members = self.graph.members(gid);
        let contiguous = members
            .windows(2)
            .all(|w| w[1] == w[0] + 1);
        if contiguous {
            (members[0] as usize, coes_in.to_vec())
        } else {
            let mut row = vec![0u8; self.m];
            for (j, &r) in members.iter().enumerate() {
                row[r as usize] = coes_in[j];
            }
            (0, row)
        }
    }

    fn forward_eliminate(&mut self, anchor0: usize, mut coes: Vec<u8>, mut sym: Vec<u8>) {
        let mut anchor = anchor0;
        loop {
            let first_nz = coes.iter().position(|&c| c != 0);
            let off = match first_nz {
                None => return,
                Some(off) => off,
            };
            let col = anchor + off;
            if col >= self.m {
                return;
            }
            if let Some(prow) = self.pivots[col].clone() {
                let c = self.kernel.div(coes[off], prow.coes[0]);
                self.operations += 1;
                let needed_end = col + prow.coes.len();
                let cur_end = anchor + coes.len();
                if needed_end > cur_end {
                    coes.resize(needed_end - anchor, 0);
                }
                for (k, &pc) in prow.coes.iter().enumerate() {
                    coes[off + k] ^= self.kernel.mul(pc, c);
                }
                self.operations += prow.coes.len() as u64;
                self.operations += self.kernel.row_axpy(&mut sym, &prow.sym, c);
                let trim = off + 1;
                anchor += trim;
                coes.drain(0..trim);
            } else {
                if off > 0 {
                    anchor += off;
                    coes.drain(0..off);
                }
                self.pivots[col] = Some(BandRow { anchor, coes, sym });
                self.rank += 1;
                return;
            }
        }
    }

    fn try_finish(&mut self) {
        if self.rank < self.m {
            return;
        }
        let mut values: Vec<Option<Vec<u8>>> = vec![None; self.m];
        for col in (0..self.m).rev() {
            let prow = self.pivots[col]
                .as_ref()
                .expect("rank == M implies every column has a pivot");
            let mut rhs = prow.sym.clone();
            for (k, &c) in prow.coes.iter().enumerate().skip(1) {
                if c == 0 {
                    continue;
                }
                let other_col = col + k;
                if other_col < self.m {
                    let val = values[other_col]
                        .as_ref()
                        .expect("higher columns solved first in descending pass");
                    self.operations += self.kernel.row_axpy(&mut rhs, val, c);
                }
            }
            let inv = self.kernel.inv(prow.coes[0]);
            self.operations += self.kernel.row_scale(&mut rhs, inv);
            values[col] = Some(rhs);
        }
        let m_data = self.m - self.params.size_c;
        let mut out = Vec::with_capacity(m_data * self.size_p);
        for row in &values[..m_data] {
            out.extend_from_slice(row.as_ref().unwrap());
        }
        out.truncate(self.params.datasize);
        self.recovered = Some(out);
        self.finished = true;
    }
}

impl super::Decoder for BdDecoder {
    fn process_packet(&mut self, pkt: &CodedPacket) {
        self.received += 1;
        if pkt.gid < 0 || pkt.gid as usize >= self.graph.n_g() {
            self.malformed += 1;
            log::warn!("BD: dropping packet with out-of-range gid {}", pkt.gid);
            return;
        }
        if pkt.ucid < -1 || pkt.ucid >= self.size_g as i32 {
            self.malformed += 1;
            log::warn!("BD: dropping packet with out-of-range ucid {}", pkt.ucid);
            return;
        }
        if pkt.coes.len() != self.size_g || pkt.syms.len() != self.size_p {
            self.malformed += 1;
            return;
        }
        if self.finished {
            return;
        }
        let gid = pkt.gid as usize;
        let (anchor, coes) = self.scatter(gid, &pkt.coes);
        self.forward_eliminate(anchor, coes, pkt.syms.clone());
        if self.rank == self.m {
            self.try_finish();
        }
    }

    fn finished(&self) -> bool {
        self.finished
    }

    fn dof(&self) -> usize {
        self.rank
    }

    fn overhead(&self) -> f64 {
        self.received as f64 / self.m as f64
    }

    fn cost(&self) -> f64 {
        self.operations as f64 / (self.m * self.size_p) as f64
    }

    fn operations(&self) -> u64 {
        self.operations
    }

    fn malformed_dropped(&self) -> u64 {
        self.malformed
    }

    fn recover(&self) -> Result<Vec<u8>> {
        self.recovered.clone().ok_or(Error::NotFinished)
    }
}

#[cfg(test)]
mod tests {
    use super::super::Decoder;
    use super::*;
    use crate::encoder::EncodeContext;
    use crate::params::PrecodeField;

    fn params(code_type: CodeType) -> Parameters {
        Parameters {
            datasize: 640,
            size_p: 16,
            size_c: 2,
            size_b: 8,
            size_g: 10,
            code_type,
            bpc: PrecodeField::Gf256,
            gfpower: 8,
            sys: false,
            seed: 3,
        }
    }

    #[test]
    fn decodes_band_code_end_to_end() {
        let p = params(CodeType::Band);
        let data: Vec<u8> = (0..p.datasize).map(|i| (i * 3 + 5) as u8).collect();
        let mut enc = EncodeContext::create(p.clone(), &data).unwrap();
        let mut dec = BdDecoder::new(p).unwrap();
        let mut guard = 0;
        while !dec.finished() {
            let pkt = enc.generate_packet();
            dec.process_packet(&pkt);
            guard += 1;
            assert!(guard < 20_000, "decoder failed to converge");
        }
        assert_eq!(dec.recover().unwrap(), data);
    }

    #[test]
    fn decodes_windwrap_code_end_to_end() {
        let p = params(CodeType::Windwrap);
        let data: Vec<u8> = (0..p.datasize).map(|i| (i * 9 + 2) as u8).collect();
        let mut enc = EncodeContext::create(p.clone(), &data).unwrap();
        let mut dec = BdDecoder::new(p).unwrap();
        let mut guard = 0;
        while !dec.finished() {
            let pkt = enc.generate_packet();
            dec.process_packet(&pkt);
            guard += 1;
            assert!(guard < 20_000, "decoder failed to converge");
        }
        assert_eq!(dec.recover().unwrap(), data);
    }

    #[test]
    fn rejects_rand_code_type() {
        let p = params(CodeType::Rand);
        assert!(matches!(BdDecoder::new(p), Err(Error::UnsupportedDecoder(_))));
    }
}
