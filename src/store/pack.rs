// Copyright 2024 The gitcore Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Packfile reading: entry headers, delta chains (offset- and ref-delta),
//! and delta application.

use flate2::{Decompress, FlushDecompress, Status};

use crate::digest::Digest;
use crate::error::PackError;
use crate::object::ObjectType;
use crate::store::pack_index::PackIndex;

const PACK_SIGNATURE: &[u8; 4] = b"PACK";

/// A pack entry's type tag, including the two delta variants that must be
/// resolved against a base object before they have an [`ObjectType`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Base(ObjectType),
    OfsDelta { base_offset: u64 },
    RefDelta { base_digest: Digest },
}

#[derive(Debug)]
pub struct PackFile {
    data: Vec<u8>,
    pub index: PackIndex,
}

fn read_u32_be(data: &[u8], pos: usize) -> Result<u32, PackError> {
    let bytes = data.get(pos..pos + 4).ok_or(PackError::Truncated)?;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

/// Decompresses a zlib stream starting at `data[start..]`, returning the
/// decoded bytes and the number of compressed bytes consumed so the caller
/// can locate the next entry.
fn zlib_inflate_at(data: &[u8], start: usize) -> Result<(Vec<u8>, usize), PackError> {
    let mut decompress = Decompress::new(true);
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let input = data.get(start + decompress.total_in() as usize..).ok_or(PackError::Truncated)?;
        if input.is_empty() {
            return Err(PackError::Truncated);
        }
        let before_out = decompress.total_out();
        let status = decompress
            .decompress(input, &mut buf, FlushDecompress::None)
            .map_err(|_| PackError::Truncated)?;
        let produced = (decompress.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        if status == Status::StreamEnd {
            break;
        }
        if produced == 0 {
            return Err(PackError::Truncated);
        }
    }
    Ok((out, decompress.total_in() as usize))
}

/// Reads the variable-length "type | size" entry header at `pos`, returning
/// the kind (resolving the ofs-delta/ref-delta base reference inline), the
/// declared inflated size, and the offset where the compressed payload
/// starts.
fn read_entry_header(data: &[u8], pos: usize) -> Result<(EntryKind, u64, usize), PackError> {
    let mut cursor = pos;
    let first = *data.get(cursor).ok_or(PackError::Truncated)?;
    cursor += 1;
    let type_num = (first >> 4) & 0x7;
    let mut size: u64 = (first & 0x0f) as u64;
    let mut shift = 4;
    let mut byte = first;
    while byte & 0x80 != 0 {
        byte = *data.get(cursor).ok_or(PackError::Truncated)?;
        cursor += 1;
        size |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    let kind = match type_num {
        1 => EntryKind::Base(ObjectType::Commit),
        2 => EntryKind::Base(ObjectType::Tree),
        3 => EntryKind::Base(ObjectType::Blob),
        4 => EntryKind::Base(ObjectType::Tag),
        6 => {
            // Offset delta: base128 big-endian, MSB-continuation, each byte
            // after the first adds 1 (per git's pack-format.txt encoding).
            let mut value: u64 = 0;
            loop {
                let b = *data.get(cursor).ok_or(PackError::Truncated)?;
                cursor += 1;
                value = (value << 7) | (b & 0x7f) as u64;
                if b & 0x80 == 0 {
                    break;
                }
                value += 1;
            }
            let base_offset = (pos as u64)
                .checked_sub(value)
                .ok_or(PackError::BadDeltaOffset)?;
            EntryKind::OfsDelta { base_offset }
        }
        7 => {
            let bytes = data.get(cursor..cursor + 20).ok_or(PackError::Truncated)?;
            cursor += 20;
            EntryKind::RefDelta {
                base_digest: Digest::from_slice(bytes).unwrap(),
            }
        }
        _ => return Err(PackError::Truncated),
    };
    Ok((kind, size, cursor))
}

impl PackFile {
    pub fn open(data: Vec<u8>, index: PackIndex) -> Result<Self, PackError> {
        if data.get(0..4) != Some(PACK_SIGNATURE.as_slice()) {
            return Err(PackError::BadSignature);
        }
        let version = read_u32_be(&data, 4)?;
        if version != 2 {
            return Err(PackError::Truncated);
        }
        tracing::debug!(size = data.len(), entries = index.len(), "loaded pack file");
        Ok(Self { data, index })
    }

    pub fn has(&self, digest: &Digest) -> bool {
        self.index.find(digest).is_some()
    }

    /// Resolves `digest` through however many delta links separate it from
    /// a base object, applying each delta in turn.
    pub fn read(&self, digest: &Digest) -> Result<(ObjectType, Vec<u8>), PackError> {
        let (offset, _crc) = self.index.find(digest).ok_or(PackError::Truncated)?;
        self.read_at(offset)
    }

    fn read_at(&self, offset: u64) -> Result<(ObjectType, Vec<u8>), PackError> {
        let (kind, _declared_size, payload_start) = read_entry_header(&self.data, offset as usize)?;
        let (payload, _consumed) = zlib_inflate_at(&self.data, payload_start)?;
        match kind {
            EntryKind::Base(object_type) => Ok((object_type, payload)),
            EntryKind::OfsDelta { base_offset } => {
                let (base_type, base_data) = self.read_at(base_offset)?;
                Ok((base_type, apply_delta(&base_data, &payload)?))
            }
            EntryKind::RefDelta { base_digest } => {
                let (base_type, base_data) = self.read(&base_digest)?;
                Ok((base_type, apply_delta(&base_data, &payload)?))
            }
        }
    }
}

fn read_delta_varint(delta: &[u8], pos: &mut usize) -> Option<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *delta.get(*pos)?;
        *pos += 1;
        value |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Some(value)
}

/// Applies a git-format delta stream to `base`, producing the target object
/// bytes. The stream is `source_size varint, target_size varint`, then a
/// sequence of copy (`1xxxxxxx`) and insert (`0xxxxxxx` literal-length)
/// instructions.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut pos = 0;
    let source_size = read_delta_varint(delta, &mut pos)
        .ok_or_else(|| PackError::BadDelta("truncated source size".to_owned()))?;
    if source_size as usize != base.len() {
        return Err(PackError::BadDelta(format!(
            "base size mismatch: delta expects {source_size}, have {}",
            base.len()
        )));
    }
    let target_size = read_delta_varint(delta, &mut pos)
        .ok_or_else(|| PackError::BadDelta("truncated target size".to_owned()))?;

    let mut out = Vec::with_capacity(target_size as usize);
    while pos < delta.len() {
        let op = delta[pos];
        pos += 1;
        if op & 0x80 != 0 {
            let mut copy_offset: u32 = 0;
            let mut copy_size: u32 = 0;
            for i in 0..4 {
                if op & (1 << i) != 0 {
                    let byte = *delta.get(pos).ok_or_else(|| PackError::BadDelta("truncated copy offset".to_owned()))?;
                    pos += 1;
                    copy_offset |= (byte as u32) << (8 * i);
                }
            }
            for i in 0..3 {
                if op & (1 << (4 + i)) != 0 {
                    let byte = *delta.get(pos).ok_or_else(|| PackError::BadDelta("truncated copy size".to_owned()))?;
                    pos += 1;
                    copy_size |= (byte as u32) << (8 * i);
                }
            }
            if copy_size == 0 {
                copy_size = 0x10000;
            }
            let start = copy_offset as usize;
            let end = start
                .checked_add(copy_size as usize)
                .ok_or_else(|| PackError::BadDelta("copy range overflow".to_owned()))?;
            let slice = base
                .get(start..end)
                .ok_or_else(|| PackError::BadDelta("copy range out of bounds".to_owned()))?;
            out.extend_from_slice(slice);
        } else if op != 0 {
            let len = op as usize;
            let slice = delta
                .get(pos..pos + len)
                .ok_or_else(|| PackError::BadDelta("truncated insert literal".to_owned()))?;
            out.extend_from_slice(slice);
            pos += len;
        } else {
            return Err(PackError::BadDelta("reserved opcode 0".to_owned()));
        }
    }
    if out.len() as u64 != target_size {
        return Err(PackError::BadDelta(format!(
            "produced {} bytes, expected {target_size}",
            out.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint(mut value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            out.push(byte);
            if value == 0 {
                break;
            }
        }
        out
    }

    #[test]
    fn apply_delta_copy_and_insert() {
        let base = b"hello world".to_vec();
        let mut delta = varint(base.len() as u64);
        delta.extend(varint(16));
        // copy "hello" (offset 0, size 5): op 1000_0011 (offset byte0, size byte0)
        delta.push(0b1000_0011);
        delta.push(0); // offset low byte
        delta.push(5); // size low byte
        // insert literal " there "
        let literal = b" there ";
        delta.push(literal.len() as u8);
        delta.extend(literal);
        // copy "world" (offset 6, size 5)
        delta.push(0b1000_0011);
        delta.push(6);
        delta.push(5);

        let result = apply_delta(&base, &delta).unwrap();
        assert_eq!(result, b"hello there world");
    }

    #[test]
    fn apply_delta_rejects_base_size_mismatch() {
        let base = b"abc".to_vec();
        let mut delta = varint(99);
        delta.extend(varint(0));
        assert!(matches!(apply_delta(&base, &delta), Err(PackError::BadDelta(_))));
    }
}
