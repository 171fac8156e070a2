//! `sparsenc`: sparse network coding, subgeneration-based random linear
//! network coding over GF(2^q).
//!
//! A source buffer is split into `M` fixed-size rows (plus a handful of
//! precode parity rows, spec.md §3/glossary: "Precode"), grouped into
//! overlapping subgenerations by a bipartite membership graph
//! ([`graph::Graph`]), and coded by drawing random linear combinations
//! within one subgeneration at a time ([`encoder::EncodeContext`]). Four
//! decoder algorithms ([`decoder`]) recover the source from enough coded
//! packets, trading memory and per-packet cost against how aggressively
//! they exploit cross-subgeneration structure. An optional recoder
//! ([`recoder::RecoderBuffer`]) lets an intermediate node re-mix buffered
//! packets for downstream nodes without ever fully decoding.
//!
//! ```no_run
//! use sparsenc::{CodeType, Decoder, DecoderKind, EncodeContext, Parameters, PrecodeField};
//! use sparsenc::decoder::AnyDecoder;
//!
//! let params = Parameters {
//!     datasize: 1024,
//!     size_p: 32,
//!     size_c: 4,
//!     size_b: 8,
//!     size_g: 16,
//!     code_type: CodeType::Band,
//!     bpc: PrecodeField::Gf256,
//!     gfpower: 8,
//!     sys: false,
//!     seed: 1,
//! };
//! let data = vec![0u8; params.datasize];
//! let mut enc = EncodeContext::create(params.clone(), &data)?;
//! let mut dec = AnyDecoder::create(DecoderKind::Cbd, params)?;
//! while !dec.finished() {
//!     dec.process_packet(&enc.generate_packet());
//! }
//! assert_eq!(dec.recover()?, data);
//! # Ok::<(), sparsenc::Error>(())
//! ```

pub mod decoder;
mod encoder;
mod error;
mod gf;
mod graph;
mod packet;
mod params;
mod precode;
mod recoder;
mod rng;
mod persist;

pub use decoder::{AnyDecoder, Decoder, DecoderKind};
pub use encoder::EncodeContext;
pub use error::{Error, Result};
pub use gf::GfKernel;
pub use graph::Graph;
pub use packet::CodedPacket;
pub use params::{CodeType, Parameters, PrecodeField};
pub use persist::PersistentDecoder;
pub use recoder::{RecoderBuffer, Scheduler};
