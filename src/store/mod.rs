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

//! Content-addressed object store: loose objects, packed objects, and the
//! `objects/info/alternates` search chain that lets one store borrow
//! another's objects.

pub mod loose;
pub mod pack;
pub mod pack_index;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::digest::Digest;
use crate::error::{IoResultExt as _, ObjectError, PackError};
use crate::object::ObjectType;
use pack::PackFile;
use pack_index::PackIndex;

/// One `objects/` directory: its loose objects plus whatever `.pack` files
/// sit in `objects/pack/`.
#[derive(Debug)]
struct Link {
    dir: PathBuf,
    packs: Vec<PackFile>,
}

impl Link {
    fn open(dir: PathBuf) -> Result<Self, ObjectError> {
        let pack_dir = dir.join("pack");
        let mut packs = Vec::new();
        if pack_dir.is_dir() {
            let mut idx_paths: Vec<PathBuf> = std::fs::read_dir(&pack_dir)
                .context(&pack_dir)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|ext| ext == "idx"))
                .collect();
            idx_paths.sort();
            for idx_path in idx_paths {
                let idx_bytes = std::fs::read(&idx_path).context(&idx_path)?;
                let index = PackIndex::parse(&idx_bytes).map_err(pack_error_to_object_error)?;
                let pack_path = idx_path.with_extension("pack");
                let pack_bytes = std::fs::read(&pack_path).context(&pack_path)?;
                let pack = PackFile::open(pack_bytes, index).map_err(pack_error_to_object_error)?;
                packs.push(pack);
            }
        }
        Ok(Self { dir, packs })
    }

    fn alternates(&self) -> Result<Vec<PathBuf>, ObjectError> {
        let path = self.dir.join("info").join("alternates");
        if !path.is_file() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&path).context(&path)?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let candidate = Path::new(line);
                if candidate.is_absolute() {
                    candidate.to_path_buf()
                } else {
                    self.dir.join(candidate)
                }
            })
            .collect())
    }
}

fn pack_error_to_object_error(err: PackError) -> ObjectError {
    match err {
        PackError::Io(path_error) => ObjectError::Io(path_error),
        other => ObjectError::Corrupt {
            digest: Digest::NULL,
            reason: other.to_string(),
        },
    }
}

/// Reads and writes objects across the primary store and any alternates it
/// names, in the order git itself searches: primary loose, primary packs,
/// then each alternate in turn, never revisiting a directory twice.
#[derive(Debug)]
pub struct ObjectStore {
    links: Vec<Link>,
}

impl ObjectStore {
    /// Opens `primary_dir` and resolves its `info/alternates` chain,
    /// breaking cycles by tracking canonicalized directories already seen.
    #[tracing::instrument]
    pub fn open(primary_dir: impl Into<PathBuf> + std::fmt::Debug) -> Result<Self, ObjectError> {
        let primary_dir = primary_dir.into();
        let mut visited = HashSet::new();
        let mut links = Vec::new();
        let mut queue = vec![primary_dir];
        while let Some(dir) = queue.pop() {
            let canonical = dir.canonicalize().unwrap_or_else(|_| dir.clone());
            if !visited.insert(canonical) {
                continue;
            }
            let link = Link::open(dir)?;
            queue.extend(link.alternates()?);
            links.push(link);
        }
        tracing::info!(link_count = links.len(), "opened object store");
        Ok(Self { links })
    }

    fn primary_dir(&self) -> &Path {
        &self.links[0].dir
    }

    pub fn has(&self, digest: &Digest) -> bool {
        self.links
            .iter()
            .any(|link| loose::exists(&link.dir, digest) || link.packs.iter().any(|pack| pack.has(digest)))
    }

    pub fn read(&self, digest: &Digest) -> Result<(ObjectType, Vec<u8>), ObjectError> {
        for link in &self.links {
            if loose::exists(&link.dir, digest) {
                return loose::read(&link.dir, digest);
            }
            for pack in &link.packs {
                if pack.has(digest) {
                    return pack.read(digest).map_err(pack_error_to_object_error);
                }
            }
        }
        Err(ObjectError::NotFound(*digest))
    }

    /// Writes a new loose object into the primary directory, regardless of
    /// where in the alternates chain an existing copy might already live.
    pub fn write(&self, object_type: ObjectType, payload: &[u8]) -> Result<Digest, ObjectError> {
        loose::write(self.primary_dir(), object_type, payload)
    }

    /// Verifies that `digest` really is the content-hash of `payload` under
    /// `object_type`, independent of where the bytes came from.
    pub fn verify_signature(digest: &Digest, object_type: ObjectType, payload: &[u8]) -> Result<(), ObjectError> {
        let computed = loose::hash_object(object_type, payload);
        if computed != *digest {
            return Err(ObjectError::DigestMismatch { computed });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_land_in_primary_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).unwrap();
        let digest = store.write(ObjectType::Blob, b"payload").unwrap();
        assert!(store.has(&digest));
        let (object_type, payload) = store.read(&digest).unwrap();
        assert_eq!(object_type, ObjectType::Blob);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn reads_fall_through_to_alternate() {
        let alt_dir = tempfile::tempdir().unwrap();
        let alt_store = ObjectStore::open(alt_dir.path()).unwrap();
        let digest = alt_store.write(ObjectType::Blob, b"from alternate").unwrap();

        let main_dir = tempfile::tempdir().unwrap();
        let info_dir = main_dir.path().join("info");
        std::fs::create_dir_all(&info_dir).unwrap();
        std::fs::write(
            info_dir.join("alternates"),
            alt_dir.path().to_str().unwrap().as_bytes(),
        )
        .unwrap();

        let store = ObjectStore::open(main_dir.path()).unwrap();
        assert!(store.has(&digest));
        let (_, payload) = store.read(&digest).unwrap();
        assert_eq!(payload, b"from alternate");
    }

    #[test]
    fn missing_object_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path()).unwrap();
        let digest = Digest::NULL;
        assert!(matches!(store.read(&digest), Err(ObjectError::NotFound(_))));
    }
}
