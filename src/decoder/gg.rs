//! Generation-by-generation decoder (spec.md §4.3.1).
//!
//! For each subgeneration `g`, maintains an upper-triangular `size_g x
//! size_g` coefficient system `C_g` and its matching symbol rows `Y_g`.
//! Arriving rows are forward-eliminated against existing pivots; once
//! `rank_g == size_g`, the subgeneration is back-substituted once to recover
//! its member source rows. Decoding finishes once the union of recovered
//! rows across all locally-full subgenerations spans all `M` source rows.

use crate::error::{Error, Result};
use crate::gf::GfKernel;
use crate::graph::Graph;
use crate::packet::CodedPacket;
use crate::params::Parameters;

#[derive(Debug)]
struct Generation {
    /// `pivots[j]` is `Some((coeffs, syms))` once column `j` has a pivot row,
    /// with `coeffs[k] == 0` for `k < j` by construction (each row is
    /// eliminated against lower-column pivots before being installed).
    pivots: Vec<Option<(Vec<u8>, Vec<u8>)>>,
    rank: usize,
    recovered: bool,
}

impl Generation {
    fn new(size_g: usize) -> Self {
        Generation { pivots: vec![None; size_g], rank: 0, recovered: false }
    }
}

/// The GG decoder (spec.md §4.3.1).
#[derive(Debug)]
pub struct GgDecoder {
    params: Parameters,
    kernel: GfKernel,
    graph: Graph,
    m: usize,
    size_g: usize,
    size_p: usize,
    generations: Vec<Generation>,
    recovered_rows: Vec<Option<Vec<u8>>>,
    recovered_count: usize,
    operations: u64,
    received: u64,
    malformed: u64,
}

impl GgDecoder {
    pub(crate) fn new(params: Parameters) -> Result<Self> {
        let kernel = GfKernel::new(params.gfpower);
        let m = params.m();
        let graph = Graph::build(&params, m)?;
        let n_g = graph.n_g();
        let size_g = graph.size_g();
        let size_p = params.size_p;
        Ok(GgDecoder {
            params,
            kernel,
            graph,
            m,
            size_g,
            size_p,
            generations: (0..n_g).map(|_| Generation::new(size_g)).collect(),
            recovered_rows: vec![None; m],
            recovered_count: 0,
            operations: 0,
            received: 0,
            malformed: 0,
        })
    }

    fn back_substitute(&mut self, g: usize) {
        let size_g = self.size_g;
        let gen = &self.generations[g];
        let mut values: Vec<Option<Vec<u8>>> = vec![None; size_g];
        for j in (0..size_g).rev() {
            let (pc, py) = gen.pivots[j].as_ref().expect("rank == size_g implies every column has a pivot");
            let mut rhs = py.clone();
            for k in (j + 1)..size_g {
                if pc[k] != 0 {
                    let valk = values[k].as_ref().expect("higher columns solved first");
                    self.operations += self.kernel.row_axpy(&mut rhs, valk, pc[k]);
                }
            }
            let inv = self.kernel.inv(pc[j]);
            self.operations += self.kernel.row_scale(&mut rhs, inv);
            values[j] = Some(rhs);
        }
        let members = self.graph.members(g).to_vec();
        for (j, &row) in members.iter().enumerate() {
            let row = row as usize;
            if self.recovered_rows[row].is_none() {
                self.recovered_rows[row] = values[j].take();
                self.recovered_count += 1;
            }
        }
        self.generations[g].recovered = true;
    }

    fn process_valid(&mut self, gid: usize, mut row_c: Vec<u8>, mut row_y: Vec<u8>) {
        if self.generations[gid].recovered {
            return;
        }
        let size_g = self.size_g;
        let mut installed = false;
        for j in 0..size_g {
            if row_c[j] == 0 {
                continue;
            }
            let has_pivot = self.generations[gid].pivots[j].is_some();
            if has_pivot {
                let (pc, py) = self.generations[gid].pivots[j].clone().unwrap();
                let c = self.kernel.div(row_c[j], pc[j]);
                self.operations += 1;
                self.operations += self.kernel.row_axpy(&mut row_c, &pc, c);
                self.operations += self.kernel.row_axpy(&mut row_y, &py, c);
            } else {
                self.generations[gid].pivots[j] = Some((row_c, row_y));
                self.generations[gid].rank += 1;
                installed = true;
                break;
            }
        }
        let _ = installed;
        if self.generations[gid].rank == size_g {
            self.back_substitute(gid);
        }
    }
}

impl super::Decoder for GgDecoder {
    fn process_packet(&mut self, pkt: &CodedPacket) {
        self.received += 1;
        if pkt.gid < 0 || pkt.gid as usize >= self.graph.n_g() {
            self.malformed += 1;
            log::warn!("GG: dropping packet with out-of-range gid {}", pkt.gid);
            return;
        }
        if pkt.ucid < -1 || pkt.ucid >= self.size_g as i32 {
            self.malformed += 1;
            log::warn!("GG: dropping packet with out-of-range ucid {}", pkt.ucid);
            return;
        }
        if pkt.coes.len() != self.size_g || pkt.syms.len() != self.size_p {
            self.malformed += 1;
            return;
        }
        let gid = pkt.gid as usize;
        self.process_valid(gid, pkt.coes.clone(), pkt.syms.clone());
    }

    fn finished(&self) -> bool {
        self.recovered_count == self.m
    }

    fn dof(&self) -> usize {
        self.recovered_count
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
        if !self.finished() {
            return Err(Error::NotFinished);
        }
        let m_data = self.m - self.params.size_c;
        let mut out = Vec::with_capacity(m_data * self.size_p);
        for row in &self.recovered_rows[..m_data] {
            out.extend_from_slice(row.as_ref().unwrap());
        }
        out.truncate(self.params.datasize);
        Ok(out)
    }
}
