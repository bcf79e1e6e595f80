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

//! Loose objects: one zlib-deflated file per object, at
//! `<odb>/<first-2-hex-digits>/<remaining-38-hex-digits>`.

use std::io::Read as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use sha1::{Digest as _, Sha1};

use crate::digest::Digest;
use crate::error::{IoResultExt as _, ObjectError};
use crate::object::ObjectType;

pub fn loose_path(odb: &Path, digest: &Digest) -> PathBuf {
    let hex = digest.to_hex();
    odb.join(&hex[0..2]).join(&hex[2..])
}

pub fn exists(odb: &Path, digest: &Digest) -> bool {
    loose_path(odb, digest).is_file()
}

/// Computes the digest of `<type> SP <size> NUL <payload>`, the form that
/// identifies the object regardless of storage layout.
pub fn hash_object(object_type: ObjectType, payload: &[u8]) -> Digest {
    let mut hasher = Sha1::new();
    hasher.update(object_type.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(payload.len().to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(payload);
    let bytes: [u8; 20] = hasher.finalize().into();
    Digest::from_bytes(bytes)
}

#[tracing::instrument(skip(odb))]
pub fn read(odb: &Path, digest: &Digest) -> Result<(ObjectType, Vec<u8>), ObjectError> {
    let path = loose_path(odb, digest);
    let raw = std::fs::read(&path).context(&path)?;
    let mut decoder = ZlibDecoder::new(raw.as_slice());
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(ObjectError::Zlib)?;

    let nul = decompressed
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ObjectError::Corrupt {
            digest: *digest,
            reason: "missing NUL after object header".to_owned(),
        })?;
    let header = std::str::from_utf8(&decompressed[..nul]).map_err(|_| ObjectError::Corrupt {
        digest: *digest,
        reason: "object header is not valid UTF-8".to_owned(),
    })?;
    let (type_str, size_str) = header.split_once(' ').ok_or(ObjectError::MalformedHeader)?;
    let object_type = ObjectType::from_str(type_str).ok_or_else(|| ObjectError::Corrupt {
        digest: *digest,
        reason: format!("unknown object type {type_str:?}"),
    })?;
    let declared_size: usize = size_str.parse().map_err(|_| ObjectError::Corrupt {
        digest: *digest,
        reason: format!("non-numeric size {size_str:?}"),
    })?;
    let payload = decompressed[nul + 1..].to_vec();
    if payload.len() != declared_size {
        return Err(ObjectError::Corrupt {
            digest: *digest,
            reason: format!("declared size {declared_size} != actual {}", payload.len()),
        });
    }

    let computed = hash_object(object_type, &payload);
    if computed != *digest {
        return Err(ObjectError::DigestMismatch { computed });
    }
    tracing::trace!(%digest, ?object_type, size = payload.len(), "read loose object");
    Ok((object_type, payload))
}

/// Writes `payload` as a loose object if not already present. Write is
/// crash-safe: the compressed bytes land in a sibling temp file first, which
/// is then renamed into place.
#[tracing::instrument(skip(odb, payload))]
pub fn write(odb: &Path, object_type: ObjectType, payload: &[u8]) -> Result<Digest, ObjectError> {
    let digest = hash_object(object_type, payload);
    let path = loose_path(odb, &digest);
    if path.is_file() {
        tracing::trace!(%digest, "loose object already present");
        return Ok(digest);
    }
    let dir = path.parent().unwrap();
    std::fs::create_dir_all(dir).context(dir)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(object_type.as_str().as_bytes())
        .map_err(ObjectError::Zlib)?;
    encoder.write_all(b" ").map_err(ObjectError::Zlib)?;
    encoder
        .write_all(payload.len().to_string().as_bytes())
        .map_err(ObjectError::Zlib)?;
    encoder.write_all(&[0u8]).map_err(ObjectError::Zlib)?;
    encoder.write_all(payload).map_err(ObjectError::Zlib)?;
    let compressed = encoder.finish().map_err(ObjectError::Zlib)?;

    let tmp = tempfile::NamedTempFile::new_in(dir).context(dir)?;
    std::fs::write(tmp.path(), &compressed).context(tmp.path())?;
    tmp.persist(&path)
        .map_err(|e| e.error)
        .context(&path)?;
    tracing::debug!(%digest, ?object_type, size = payload.len(), "wrote loose object");
    Ok(digest)
}
