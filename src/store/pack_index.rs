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

//! Pack index (`.idx`) v2 reader: fanout table, sorted digest table, CRC32
//! table, and 32/64-bit offset tables.

use crate::digest::Digest;
use crate::error::PackError;

const IDX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63];
const IDX_VERSION_2: u32 = 2;

#[derive(Debug)]
pub struct PackIndex {
    fanout: [u32; 256],
    digests: Vec<Digest>,
    crcs: Vec<u32>,
    offsets: Vec<u64>,
}

fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32, PackError> {
    let bytes = data.get(*pos..*pos + 4).ok_or(PackError::Truncated)?;
    *pos += 4;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}

fn read_u64(data: &[u8], pos: &mut usize) -> Result<u64, PackError> {
    let bytes = data.get(*pos..*pos + 8).ok_or(PackError::Truncated)?;
    *pos += 8;
    Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
}

impl PackIndex {
    /// Parses a complete `.idx` v2 file already read into memory.
    pub fn parse(data: &[u8]) -> Result<Self, PackError> {
        let mut pos = 0;
        let signature = data.get(0..4).ok_or(PackError::Truncated)?;
        if signature != IDX_SIGNATURE {
            return Err(PackError::BadSignature);
        }
        pos += 4;
        let version = read_u32(data, &mut pos)?;
        if version != IDX_VERSION_2 {
            return Err(PackError::UnsupportedIndexVersion(version));
        }

        let mut fanout = [0u32; 256];
        for slot in &mut fanout {
            *slot = read_u32(data, &mut pos)?;
        }
        let count = *fanout.last().unwrap() as usize;

        let mut digests = Vec::with_capacity(count);
        for _ in 0..count {
            let bytes = data.get(pos..pos + 20).ok_or(PackError::Truncated)?;
            digests.push(Digest::from_slice(bytes).unwrap());
            pos += 20;
        }

        let mut crcs = Vec::with_capacity(count);
        for _ in 0..count {
            crcs.push(read_u32(data, &mut pos)?);
        }

        let mut small_offsets = Vec::with_capacity(count);
        for _ in 0..count {
            small_offsets.push(read_u32(data, &mut pos)?);
        }

        let large_count = small_offsets.iter().filter(|&&o| o & 0x8000_0000 != 0).count();
        let mut large_offsets = Vec::with_capacity(large_count);
        for _ in 0..large_count {
            large_offsets.push(read_u64(data, &mut pos)?);
        }

        let offsets = small_offsets
            .iter()
            .map(|&o| {
                if o & 0x8000_0000 != 0 {
                    large_offsets[(o & 0x7fff_ffff) as usize]
                } else {
                    o as u64
                }
            })
            .collect();

        Ok(Self {
            fanout,
            digests,
            crcs,
            offsets,
        })
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Binary-searches the range implied by the fanout table for `digest`'s
    /// first byte, returning its pack offset and CRC if found.
    pub fn find(&self, digest: &Digest) -> Option<(u64, u32)> {
        let first_byte = digest.as_bytes()[0] as usize;
        let lo = if first_byte == 0 { 0 } else { self.fanout[first_byte - 1] as usize };
        let hi = self.fanout[first_byte] as usize;
        let slice = &self.digests[lo..hi];
        let index = slice.binary_search(digest).ok()?;
        let i = lo + index;
        Some((self.offsets[i], self.crcs[i]))
    }

    pub fn digests(&self) -> &[Digest] {
        &self.digests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(byte: u8) -> Digest {
        let mut bytes = [0u8; 20];
        bytes[0] = byte;
        Digest::from_bytes(bytes)
    }

    fn build_idx(entries: &[(Digest, u32, u32)]) -> Vec<u8> {
        let mut sorted = entries.to_vec();
        sorted.sort_by_key(|(d, _, _)| *d);
        let mut fanout = [0u32; 256];
        for (d, _, _) in &sorted {
            for slot in &mut fanout[d.as_bytes()[0] as usize..] {
                *slot += 1;
            }
        }
        let mut out = Vec::new();
        out.extend(IDX_SIGNATURE);
        out.extend(IDX_VERSION_2.to_be_bytes());
        for f in fanout {
            out.extend(f.to_be_bytes());
        }
        for (d, _, _) in &sorted {
            out.extend(d.as_bytes());
        }
        for (_, crc, _) in &sorted {
            out.extend(crc.to_be_bytes());
        }
        for (_, _, offset) in &sorted {
            out.extend(offset.to_be_bytes());
        }
        out
    }

    #[test]
    fn finds_known_entries() {
        let entries = [(digest(1), 0xaaaa, 10), (digest(5), 0xbbbb, 20)];
        let data = build_idx(&entries);
        let idx = PackIndex::parse(&data).unwrap();
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.find(&digest(1)), Some((10, 0xaaaa)));
        assert_eq!(idx.find(&digest(5)), Some((20, 0xbbbb)));
        assert_eq!(idx.find(&digest(9)), None);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut data = build_idx(&[(digest(1), 0, 0)]);
        data[0] = 0;
        assert!(matches!(PackIndex::parse(&data), Err(PackError::BadSignature)));
    }
}
