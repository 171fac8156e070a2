//! Decoders (spec.md §4.3): four algorithms sharing one contract.
//!
//! Per spec.md §9 ("Decoder polymorphism: dispatch over a tagged variant
//! {GG, OA, BD, CBD}... avoid virtual-dispatch-per-row-op -- the hot loop
//! should be monomorphic inside one algorithm"), [`AnyDecoder`] is a tagged
//! enum: dispatch happens once per `process_packet` call, never per row
//! operation inside an algorithm's own elimination loop.

mod bd;
mod cbd;
mod gg;
mod oa;

pub use bd::BdDecoder;
pub use cbd::CbdDecoder;
pub use gg::GgDecoder;
pub use oa::OaDecoder;

use crate::error::{Error, Result};
use crate::packet::CodedPacket;
use crate::params::{CodeType, Parameters};

/// Selects which decoding algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderKind {
    /// Generation-by-generation (spec.md §4.3.1).
    Gg,
    /// Overlap-aware (spec.md §4.3.2).
    Oa,
    /// Band decoder, requires `CodeType::Band`/`Windwrap` (spec.md §4.3.3).
    Bd,
    /// Compact band decoder, same restriction as `Bd` (spec.md §4.3.4).
    Cbd,
    /// Reserved partial-pivoting variant (spec.md §4.3.5): creation always
    /// fails, since its semantics are explicitly left undefined.
    Pp,
}

/// Shared decoder contract (spec.md §4.3): "process_packet(pkt),
/// finished() -> bool, dof() -> int, overhead() -> N_received/M, cost() ->
/// ops/(M*size_p)".
pub trait Decoder {
    /// Feeds one received coded packet to the decoder. Malformed packets
    /// (`gid` out of range, `ucid` outside `[-1, size_g)`) are silently
    /// dropped and counted, per spec.md §7's propagation policy -- they do
    /// not return an error.
    fn process_packet(&mut self, pkt: &CodedPacket);

    /// Has the decoder accumulated enough degrees of freedom to recover all
    /// of `S`?
    fn finished(&self) -> bool;

    /// Current degrees of freedom (accumulated rank).
    fn dof(&self) -> usize;

    /// `N_received / M`.
    fn overhead(&self) -> f64;

    /// `operations / (M * size_p)`.
    fn cost(&self) -> f64;

    /// Raw accumulated GF-op counter (spec.md §3's `operations` field), used
    /// verbatim -- not normalized like [`Self::cost`] -- by the decoder
    /// context file format (spec.md §6).
    fn operations(&self) -> u64;

    /// Number of malformed packets silently dropped so far.
    fn malformed_dropped(&self) -> u64;

    /// Recovers the original `datasize`-byte source, or
    /// [`Error::NotFinished`] if `finished()` is `false` (spec.md §7).
    fn recover(&self) -> Result<Vec<u8>>;
}

/// Tagged-variant dispatcher over the four (well, five, with `Pp` always
/// failing) decoder algorithms.
#[derive(Debug)]
pub enum AnyDecoder {
    Gg(GgDecoder),
    Oa(OaDecoder),
    Bd(BdDecoder),
    Cbd(CbdDecoder),
}

impl AnyDecoder {
    /// Creates a decoder of the given `kind` for `params`. Fails with
    /// [`Error::UnsupportedDecoder`] for `(type, decoder)` combinations
    /// spec.md §4.3 disallows, and always for `DecoderKind::Pp`.
    pub fn create(kind: DecoderKind, params: Parameters) -> Result<Self> {
        params.validate()?;
        match kind {
            DecoderKind::Gg => Ok(AnyDecoder::Gg(GgDecoder::new(params)?)),
            DecoderKind::Oa => Ok(AnyDecoder::Oa(OaDecoder::new(params)?)),
            DecoderKind::Bd => {
                check_banded(&params)?;
                Ok(AnyDecoder::Bd(BdDecoder::new(params)?))
            }
            DecoderKind::Cbd => {
                check_banded(&params)?;
                Ok(AnyDecoder::Cbd(CbdDecoder::new(params)?))
            }
            DecoderKind::Pp => Err(Error::UnsupportedDecoder(
                "PP_DECODER is reserved; its semantics are not defined",
            )),
        }
    }
}

fn check_banded(params: &Parameters) -> Result<()> {
    match params.code_type {
        CodeType::Band | CodeType::Windwrap => Ok(()),
        _ => Err(Error::UnsupportedDecoder(
            "BD/CBD require a BAND or WINDWRAP code type",
        )),
    }
}

impl Decoder for AnyDecoder {
    fn process_packet(&mut self, pkt: &CodedPacket) {
        match self {
            AnyDecoder::Gg(d) => d.process_packet(pkt),
            AnyDecoder::Oa(d) => d.process_packet(pkt),
            AnyDecoder::Bd(d) => d.process_packet(pkt),
            AnyDecoder::Cbd(d) => d.process_packet(pkt),
        }
    }

    fn finished(&self) -> bool {
        match self {
            AnyDecoder::Gg(d) => d.finished(),
            AnyDecoder::Oa(d) => d.finished(),
            AnyDecoder::Bd(d) => d.finished(),
            AnyDecoder::Cbd(d) => d.finished(),
        }
    }

    fn dof(&self) -> usize {
        match self {
            AnyDecoder::Gg(d) => d.dof(),
            AnyDecoder::Oa(d) => d.dof(),
            AnyDecoder::Bd(d) => d.dof(),
            AnyDecoder::Cbd(d) => d.dof(),
        }
    }

    fn overhead(&self) -> f64 {
        match self {
            AnyDecoder::Gg(d) => d.overhead(),
            AnyDecoder::Oa(d) => d.overhead(),
            AnyDecoder::Bd(d) => d.overhead(),
            AnyDecoder::Cbd(d) => d.overhead(),
        }
    }

    fn cost(&self) -> f64 {
        match self {
            AnyDecoder::Gg(d) => d.cost(),
            AnyDecoder::Oa(d) => d.cost(),
            AnyDecoder::Bd(d) => d.cost(),
            AnyDecoder::Cbd(d) => d.cost(),
        }
    }

    fn operations(&self) -> u64 {
        match self {
            AnyDecoder::Gg(d) => d.operations(),
            AnyDecoder::Oa(d) => d.operations(),
            AnyDecoder::Bd(d) => d.operations(),
            AnyDecoder::Cbd(d) => d.operations(),
        }
    }

    fn malformed_dropped(&self) -> u64 {
        match self {
            AnyDecoder::Gg(d) => d.malformed_dropped(),
            AnyDecoder::Oa(d) => d.malformed_dropped(),
            AnyDecoder::Bd(d) => d.malformed_dropped(),
            AnyDecoder::Cbd(d) => d.malformed_dropped(),
        }
    }

    fn recover(&self) -> Result<Vec<u8>> {
        match self {
            AnyDecoder::Gg(d) => d.recover(),
            AnyDecoder::Oa(d) => d.recover(),
            AnyDecoder::Bd(d) => d.recover(),
            AnyDecoder::Cbd(d) => d.recover(),
        }
    }
}
