//! Coded packet representation and wire codec (spec.md §3 "Coded packet",
//! §6 "Packet wire format").
//!
//! ```text
//! offset 0         : gid             (4 bytes, little-endian signed)
//! offset 4         : ucid            (4 bytes, little-endian signed)
//! offset 8         : coes[0..size_g) ((size_g * gfpower + 7)/8 bytes, packed)
//! offset 8+ceil    : syms[0..size_p) (size_p bytes)
//! ```
//!
//! Serialization is a pure byte copy with LSB-first bit-packing of `coes`
//! for `gfpower < 8`; the format carries no length prefix or checksum, as
//! specified.

use crate::error::{Error, Result};

/// A single coded packet: a subgeneration id, an optional systematic-row
/// marker, a coefficient vector, and the resulting symbol vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedPacket {
    /// Subgeneration id this packet was coded from.
    pub gid: i32,
    /// `-1` for a genuinely coded packet; otherwise the index, within the
    /// subgeneration's member list, of the systematic (uncoded) row this
    /// packet equals.
    pub ucid: i32,
    /// Coefficients, one element per subgeneration member, each in
    /// `[0, 2^gfpower)`.
    pub coes: Vec<u8>,
    /// Resulting symbol vector, `size_p` bytes.
    pub syms: Vec<u8>,
}

impl CodedPacket {
    /// Is this a systematic (uncoded) packet?
    pub fn is_systematic(&self) -> bool {
        self.ucid >= 0
    }

    /// Wire length, in bytes, of a packet with the given `size_g`, `size_p`
    /// and `gfpower`.
    pub fn wire_len(size_g: usize, size_p: usize, gfpower: u8) -> usize {
        8 + packed_coes_len(size_g, gfpower) + size_p
    }

    /// Serializes this packet per spec.md §6's layout.
    pub fn serialize(&self, gfpower: u8) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::wire_len(self.coes.len(), self.syms.len(), gfpower));
        out.extend_from_slice(&self.gid.to_le_bytes());
        out.extend_from_slice(&self.ucid.to_le_bytes());
        out.extend_from_slice(&pack_bits(&self.coes, gfpower));
        out.extend_from_slice(&self.syms);
        out
    }

    /// Deserializes a packet with known `(size_g, size_p, gfpower)` -- the
    /// format carries no self-describing length, so the receiver must know
    /// these out of band, per spec.md §6.
    pub fn deserialize(data: &[u8], size_g: usize, size_p: usize, gfpower: u8) -> Result<Self> {
        let expected = Self::wire_len(size_g, size_p, gfpower);
        if data.len() != expected {
            return Err(Error::InvalidParameters(
                "packet buffer length does not match (size_g, size_p, gfpower)",
            ));
        }
        let gid = i32::from_le_bytes(data[0..4].try_into().unwrap());
        let ucid = i32::from_le_bytes(data[4..8].try_into().unwrap());
        let coes_bytes = packed_coes_len(size_g, gfpower);
        let coes = unpack_bits(&data[8..8 + coes_bytes], size_g, gfpower);
        let syms = data[8 + coes_bytes..].to_vec();
        if ucid < -1 || ucid >= size_g as i32 {
            return Err(Error::InvalidParameters("ucid out of range [-1, size_g)"));
        }
        Ok(CodedPacket { gid, ucid, coes, syms })
    }
}

fn packed_coes_len(size_g: usize, gfpower: u8) -> usize {
    (size_g * gfpower as usize).div_ceil(8)
}

/// Packs `values` (each assumed `< 2^bits`) LSB-first into a byte buffer.
fn pack_bits(values: &[u8], bits: u8) -> Vec<u8> {
    if bits == 8 {
        return values.to_vec();
    }
    let mut out = Vec::with_capacity(packed_coes_len(values.len(), bits));
    let mut acc: u32 = 0;
    let mut acc_bits: u32 = 0;
    for &v in values {
        acc |= (v as u32) << acc_bits;
        acc_bits += bits as u32;
        while acc_bits >= 8 {
            out.push((acc & 0xff) as u8);
            acc >>= 8;
            acc_bits -= 8;
        }
    }
    if acc_bits > 0 {
        out.push((acc & 0xff) as u8);
    }
    out
}

/// Inverse of [`pack_bits`]: unpacks `count` values of `bits` bits each.
fn unpack_bits(data: &[u8], count: usize, bits: u8) -> Vec<u8> {
    if bits == 8 {
        return data.to_vec();
    }
    let mask = (1u32 << bits) - 1;
    let mut out = Vec::with_capacity(count);
    let mut acc: u32 = 0;
    let mut acc_bits: u32 = 0;
    let mut byte_iter = data.iter();
    for _ in 0..count {
        while acc_bits < bits as u32 {
            let byte = *byte_iter.next().unwrap_or(&0) as u32;
            acc |= byte << acc_bits;
            acc_bits += 8;
        }
        out.push((acc & mask) as u8);
        acc >>= bits as u32;
        acc_bits -= bits as u32;
    }
    out
}
