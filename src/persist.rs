//! Decoder context persistence (spec.md §4.3.6/§6): save enough state to
//! resume a decoder later without re-receiving every packet from the start.
//!
//! spec.md §6 lays out the file as "magic, version, fixed-size parameters
//! header, 4-byte decoder type, 8-byte `dof`, 8-byte `operations`, then
//! decoder-specific payload". This module follows that framing exactly for
//! the magic/version/parameters/type/dof/operations prefix (using
//! `Parameters::write_le`/`read_le` for the parameters block, so `restore`
//! is fully self-contained and does not need the caller to already know the
//! code parameters -- spec.md's `restore_decoder(path)` takes only a path).
//!
//! For the "decoder-specific payload" itself, rather than dump each
//! algorithm's internal pivot matrices in four different on-disk shapes,
//! this crate records the ordered log of packets the decoder has processed
//! and replays that log through a freshly-created decoder of the recorded
//! kind on restore. The `operations`/`dof` counters are persisted and
//! checked against the replayed decoder's own counters, so any divergence
//! between the recorded and replayed state is caught rather than silently
//! accepted. This keeps one `save`/`restore` pair instead of one per
//! algorithm, at the cost of disk usage proportional to packets received
//! rather than to in-memory decoder state -- a reasonable trade given
//! `size_p`-byte packets are already the unit `src/packet.rs`'s wire format
//! works in.

use crate::decoder::{AnyDecoder, Decoder, DecoderKind};
use crate::error::{Error, Result};
use crate::packet::CodedPacket;
use crate::params::Parameters;
use std::io::{Read, Write};

const MAGIC: &[u8; 4] = b"SNCD";
const VERSION: u32 = 1;

fn kind_tag(kind: DecoderKind) -> u32 {
    match kind {
        DecoderKind::Gg => 0,
        DecoderKind::Oa => 1,
        DecoderKind::Bd => 2,
        DecoderKind::Cbd => 3,
        DecoderKind::Pp => 4,
    }
}

fn tag_kind(tag: u32) -> Result<DecoderKind> {
    match tag {
        0 => Ok(DecoderKind::Gg),
        1 => Ok(DecoderKind::Oa),
        2 => Ok(DecoderKind::Bd),
        3 => Ok(DecoderKind::Cbd),
        4 => Ok(DecoderKind::Pp),
        _ => Err(Error::IoFailure(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "unknown decoder kind tag in persisted context",
        ))),
    }
}

/// A decoder paired with the ordered log of packets it has processed, so
/// that saving and restoring can round-trip through a full packet replay
/// (spec.md §4.5, Testable Property 6).
pub struct PersistentDecoder {
    kind: DecoderKind,
    params: Parameters,
    decoder: AnyDecoder,
    log: Vec<CodedPacket>,
}

impl PersistentDecoder {
    /// Wraps a freshly-created decoder of the given `kind`.
    pub fn new(kind: DecoderKind, params: Parameters) -> Result<Self> {
        let decoder = AnyDecoder::create(kind, params.clone())?;
        Ok(PersistentDecoder { kind, params, decoder, log: Vec::new() })
    }

    /// Feeds `pkt` to the wrapped decoder and appends it to the replay log.
    pub fn process_packet(&mut self, pkt: &CodedPacket) {
        self.decoder.process_packet(pkt);
        self.log.push(pkt.clone());
    }

    pub fn decoder(&self) -> &AnyDecoder {
        &self.decoder
    }

    pub fn kind(&self) -> DecoderKind {
        self.kind
    }

    /// Writes magic, version, the parameters block, decoder kind tag,
    /// current `dof`, current `operations`, packet count, then every logged
    /// packet in wire format (spec.md §6) to `w`.
    pub fn save(&self, mut w: impl Write) -> Result<()> {
        w.write_all(MAGIC)?;
        w.write_all(&VERSION.to_le_bytes())?;
        self.params.write_le(&mut w)?;
        w.write_all(&kind_tag(self.kind).to_le_bytes())?;
        w.write_all(&(self.decoder.dof() as u64).to_le_bytes())?;
        w.write_all(&self.decoder.operations().to_le_bytes())?;
        w.write_all(&(self.log.len() as u64).to_le_bytes())?;
        for pkt in &self.log {
            w.write_all(&pkt.serialize(self.params.gfpower))?;
        }
        Ok(())
    }

    /// Reads back a context saved by [`Self::save`], reconstructing the
    /// code parameters, a fresh decoder of the recorded kind, and replaying
    /// every logged packet into it. A magic or version mismatch, or a
    /// recorded `dof`/`operations` that disagrees with what replay
    /// produces, is a fatal `Error::IoFailure` (spec.md §7).
    pub fn restore(mut r: impl Read) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::IoFailure(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "bad magic in persisted decoder context",
            )));
        }
        let mut buf4 = [0u8; 4];
        r.read_exact(&mut buf4)?;
        if u32::from_le_bytes(buf4) != VERSION {
            return Err(Error::IoFailure(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "unsupported decoder context version",
            )));
        }
        let params = Parameters::read_le(&mut r)?;
        r.read_exact(&mut buf4)?;
        let kind = tag_kind(u32::from_le_bytes(buf4))?;
        let mut buf8 = [0u8; 8];
        r.read_exact(&mut buf8)?;
        let saved_dof = u64::from_le_bytes(buf8);
        r.read_exact(&mut buf8)?;
        let saved_operations = u64::from_le_bytes(buf8);
        r.read_exact(&mut buf8)?;
        let count = u64::from_le_bytes(buf8) as usize;

        let mut decoder = AnyDecoder::create(kind, params.clone())?;
        let wire_len = CodedPacket::wire_len(params.size_g, params.size_p, params.gfpower);
        let mut log = Vec::with_capacity(count);
        let mut bytes = vec![0u8; wire_len];
        for _ in 0..count {
            r.read_exact(&mut bytes)?;
            let pkt =
                CodedPacket::deserialize(&bytes, params.size_g, params.size_p, params.gfpower)?;
            decoder.process_packet(&pkt);
            log.push(pkt);
        }
        if decoder.dof() as u64 != saved_dof || decoder.operations() != saved_operations {
            return Err(Error::IoFailure(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "replayed decoder state does not match the persisted dof/operations counters",
            )));
        }
        log::debug!("restored {kind:?} decoder context: dof={saved_dof}, {count} packets replayed");
        Ok(PersistentDecoder { kind, params, decoder, log })
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
            seed: 13,
        }
    }

    #[test]
    fn round_trips_partial_context() {
        let p = params();
        let data: Vec<u8> = (0..p.datasize).map(|i| (i * 3 + 1) as u8).collect();
        let mut enc = EncodeContext::create(p.clone(), &data).unwrap();
        let mut ctx = PersistentDecoder::new(DecoderKind::Gg, p.clone()).unwrap();
        for _ in 0..(p.m() / 2) {
            let pkt = enc.generate_packet();
            ctx.process_packet(&pkt);
        }
        let dof_before = ctx.decoder().dof();

        let mut buf = Vec::new();
        ctx.save(&mut buf).unwrap();
        let restored = PersistentDecoder::restore(&buf[..]).unwrap();
        assert_eq!(restored.decoder().dof(), dof_before);
        assert_eq!(restored.kind(), DecoderKind::Gg);
    }

    #[test]
    fn finishes_after_restore_with_more_packets() {
        let p = params();
        let data: Vec<u8> = (0..p.datasize).map(|i| (i * 5 + 2) as u8).collect();
        let mut enc = EncodeContext::create(p.clone(), &data).unwrap();
        let mut ctx = PersistentDecoder::new(DecoderKind::Gg, p.clone()).unwrap();
        for _ in 0..(p.m() / 2) {
            ctx.process_packet(&enc.generate_packet());
        }
        let mut buf = Vec::new();
        ctx.save(&mut buf).unwrap();
        let mut restored = PersistentDecoder::restore(&buf[..]).unwrap();

        let mut guard = 0;
        while !restored.decoder().finished() {
            let pkt = enc.generate_packet();
            restored.process_packet(&pkt);
            guard += 1;
            assert!(guard < 200_000);
        }
        assert_eq!(restored.decoder().recover().unwrap(), data);
    }

    #[test]
    fn rejects_bad_magic() {
        let bogus = vec![0u8; 32];
        assert!(matches!(PersistentDecoder::restore(&bogus[..]), Err(Error::IoFailure(_))));
    }

    #[test]
    fn restore_is_self_contained_and_recovers_parameters() {
        let p = params();
        let data: Vec<u8> = (0..p.datasize).map(|i| (i * 17 + 4) as u8).collect();
        let mut enc = EncodeContext::create(p.clone(), &data).unwrap();
        let mut ctx = PersistentDecoder::new(DecoderKind::Cbd, p.clone()).unwrap();
        for _ in 0..p.m() {
            ctx.process_packet(&enc.generate_packet());
        }
        let mut buf = Vec::new();
        ctx.save(&mut buf).unwrap();
        // `restore` takes only the byte stream -- no caller-supplied
        // `Parameters` -- so the parameters block must be enough on its own.
        let restored = PersistentDecoder::restore(&buf[..]).unwrap();
        assert_eq!(restored.params.datasize, p.datasize);
        assert_eq!(restored.params.size_g, p.size_g);
    }
}
