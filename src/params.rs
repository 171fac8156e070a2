//! Code parameters (spec.md §3: "Code parameters (immutable for a
//! session)").

use crate::error::{Error, Result};
use std::io::{Read, Write};

/// Bipartite membership construction rule (spec.md §3's `type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeType {
    /// Seeded balanced-random placement; every subgeneration has exactly
    /// `size_g` members.
    Rand,
    /// Contiguous windows, `members(g) = [g, g+1, ..., g+size_g-1]`.
    Band,
    /// As `Band`, but indices wrap modulo `M`.
    Windwrap,
    /// Fixed-degree `size_g` batches sampled uniformly from `[0, M)`.
    Bats,
}

/// Inner precode field (spec.md §3: "bpc").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrecodeField {
    /// GF(256) precode.
    Gf256,
    /// Binary (GF(2)) precode.
    Binary,
}

/// Code parameters, immutable for the lifetime of a session (spec.md §3).
#[derive(Debug, Clone)]
pub struct Parameters {
    /// Size of the source data, in bytes.
    pub datasize: usize,
    /// Symbols (bytes) per packet / per source row.
    pub size_p: usize,
    /// Number of precode parity rows.
    pub size_c: usize,
    /// Base subgeneration size (average degree for RAND/BATS batch size).
    pub size_b: usize,
    /// Subgeneration size (`>= size_b`).
    pub size_g: usize,
    /// Bipartite membership construction rule.
    pub code_type: CodeType,
    /// Precode field.
    pub bpc: PrecodeField,
    /// GF(2^q) field power, `q` in `1..=8`.
    pub gfpower: u8,
    /// Systematic emission flag.
    pub sys: bool,
    /// Session seed; deterministically drives graph construction and every
    /// RNG stream derived from it (`src/rng.rs`).
    pub seed: u64,
}

impl Parameters {
    /// Validates the parameter set and computes `M`, per spec.md §3/§4.2:
    /// "Fails if parameters violate invariants (e.g. `size_g < size_b`,
    /// `gfpower not in [1,8]`, `datasize=0`)."
    pub fn validate(&self) -> Result<()> {
        if self.datasize == 0 {
            return Err(Error::InvalidParameters("datasize must be nonzero"));
        }
        if self.size_p == 0 {
            return Err(Error::InvalidParameters("size_p must be nonzero"));
        }
        if !(1..=8).contains(&self.gfpower) {
            return Err(Error::InvalidParameters("gfpower must be in 1..=8"));
        }
        if self.size_g < self.size_b {
            return Err(Error::InvalidParameters("size_g must be >= size_b"));
        }
        if self.size_b == 0 || self.size_g == 0 {
            return Err(Error::InvalidParameters("size_b and size_g must be nonzero"));
        }
        let field_size = 1usize << self.gfpower;
        if self.size_g > field_size {
            return Err(Error::InvalidParameters(
                "size_g cannot exceed the field size (not enough distinct nonzero coefficients to guarantee full rank in one generation)",
            ));
        }
        Ok(())
    }

    /// Writes the fixed-size little-endian parameters block used by
    /// `src/persist.rs`'s decoder context file (spec.md §6: "fixed-size
    /// parameters header (`struct snc_parameters`)"). 9 `u64` fields plus a
    /// `u8` code-type tag, a `u8` precode-field tag, a `u8` `gfpower`, and a
    /// `u8` `sys` flag.
    pub fn write_le(&self, mut w: impl Write) -> Result<()> {
        for field in [
            self.datasize as u64,
            self.size_p as u64,
            self.size_c as u64,
            self.size_b as u64,
            self.size_g as u64,
            self.seed,
        ] {
            w.write_all(&field.to_le_bytes())?;
        }
        let code_type_tag: u8 = match self.code_type {
            CodeType::Rand => 0,
            CodeType::Band => 1,
            CodeType::Windwrap => 2,
            CodeType::Bats => 3,
        };
        let bpc_tag: u8 = match self.bpc {
            PrecodeField::Gf256 => 0,
            PrecodeField::Binary => 1,
        };
        w.write_all(&[code_type_tag, bpc_tag, self.gfpower, self.sys as u8])?;
        Ok(())
    }

    /// Inverse of [`Self::write_le`].
    pub fn read_le(mut r: impl Read) -> Result<Self> {
        let mut u64s = [0u8; 8];
        let mut read_u64 = |r: &mut dyn Read| -> Result<u64> {
            r.read_exact(&mut u64s)?;
            Ok(u64::from_le_bytes(u64s))
        };
        let datasize = read_u64(&mut r)? as usize;
        let size_p = read_u64(&mut r)? as usize;
        let size_c = read_u64(&mut r)? as usize;
        let size_b = read_u64(&mut r)? as usize;
        let size_g = read_u64(&mut r)? as usize;
        let seed = read_u64(&mut r)?;
        let mut tags = [0u8; 4];
        r.read_exact(&mut tags)?;
        let code_type = match tags[0] {
            0 => CodeType::Rand,
            1 => CodeType::Band,
            2 => CodeType::Windwrap,
            3 => CodeType::Bats,
            _ => {
                return Err(Error::IoFailure(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "unknown code type tag in persisted parameters block",
                )));
            }
        };
        let bpc = match tags[1] {
            0 => PrecodeField::Gf256,
            1 => PrecodeField::Binary,
            _ => {
                return Err(Error::IoFailure(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "unknown precode field tag in persisted parameters block",
                )));
            }
        };
        let gfpower = tags[2];
        let sys = tags[3] != 0;
        Ok(Parameters { datasize, size_p, size_c, size_b, size_g, code_type, bpc, gfpower, sys, seed })
    }

    /// `M`: total source rows including precode parity, spec.md §3:
    /// `ceil(datasize / size_p) + size_c`.
    pub fn m(&self) -> usize {
        self.datasize.div_ceil(self.size_p) + self.size_c
    }

    /// `N_g`: number of subgenerations, per the table in spec.md §3 /
    /// SPEC_FULL.md §3.3.
    pub fn n_g(&self) -> Result<usize> {
        let m = self.m();
        match self.code_type {
            CodeType::Rand => Ok((m * self.size_b).div_ceil(self.size_g)),
            CodeType::Band => {
                if m < self.size_g {
                    return Err(Error::InvalidParameters(
                        "M must be >= size_g for BAND codes",
                    ));
                }
                Ok(m - self.size_g + 1)
            }
            CodeType::Windwrap => Ok(m),
            CodeType::Bats => Ok(m.div_ceil(self.size_b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Parameters {
        Parameters {
            datasize: 1024,
            size_p: 32,
            size_c: 4,
            size_b: 8,
            size_g: 16,
            code_type: CodeType::Band,
            bpc: PrecodeField::Gf256,
            gfpower: 8,
            sys: false,
            seed: 1,
        }
    }

    #[test]
    fn rejects_zero_datasize() {
        let mut p = base();
        p.datasize = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_gfpower_out_of_range() {
        let mut p = base();
        p.gfpower = 9;
        assert!(p.validate().is_err());
        p.gfpower = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn rejects_size_g_below_size_b() {
        let mut p = base();
        p.size_g = 4;
        assert!(p.validate().is_err());
    }

    #[test]
    fn band_n_g_is_m_minus_size_g_plus_one() {
        let p = base();
        assert_eq!(p.n_g().unwrap(), p.m() - p.size_g + 1);
    }

    #[test]
    fn windwrap_n_g_is_m() {
        let mut p = base();
        p.code_type = CodeType::Windwrap;
        assert_eq!(p.n_g().unwrap(), p.m());
    }

    #[test]
    fn parameters_block_round_trips() {
        for (code_type, bpc) in [
            (CodeType::Rand, PrecodeField::Gf256),
            (CodeType::Band, PrecodeField::Binary),
            (CodeType::Windwrap, PrecodeField::Gf256),
            (CodeType::Bats, PrecodeField::Binary),
        ] {
            let mut p = base();
            p.code_type = code_type;
            p.bpc = bpc;
            p.gfpower = 3;
            p.sys = true;
            let mut buf = Vec::new();
            p.write_le(&mut buf).unwrap();
            let back = Parameters::read_le(&buf[..]).unwrap();
            assert_eq!(back.datasize, p.datasize);
            assert_eq!(back.size_p, p.size_p);
            assert_eq!(back.size_c, p.size_c);
            assert_eq!(back.size_b, p.size_b);
            assert_eq!(back.size_g, p.size_g);
            assert_eq!(back.seed, p.seed);
            assert_eq!(back.code_type, p.code_type);
            assert_eq!(back.bpc, p.bpc);
            assert_eq!(back.gfpower, p.gfpower);
            assert_eq!(back.sys, p.sys);
        }
    }
}
