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

//! Layered error taxonomy shared across subsystems.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::digest::Digest;

/// A path together with the I/O error that occurred while accessing it.
#[derive(Debug, Error)]
#[error("failed to access {path}")]
pub struct PathError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

pub trait IoResultExt<T> {
    fn context(self, path: impl Into<PathBuf>) -> Result<T, PathError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn context(self, path: impl Into<PathBuf>) -> Result<T, PathError> {
        self.map_err(|source| PathError {
            path: path.into(),
            source,
        })
    }
}

/// Errors reading or writing objects in the content-addressed store.
#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("object {0} not found")]
    NotFound(Digest),
    #[error("object failed digest verification: computed {computed}")]
    DigestMismatch { computed: Digest },
    #[error("corrupt object {digest}: {reason}")]
    Corrupt { digest: Digest, reason: String },
    #[error("malformed object header")]
    MalformedHeader,
    #[error(transparent)]
    Io(#[from] PathError),
    #[error("zlib stream error: {0}")]
    Zlib(#[from] io::Error),
}

/// Errors from the pack reader/writer.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("pack index {0} has unsupported version")]
    UnsupportedIndexVersion(u32),
    #[error("pack signature mismatch")]
    BadSignature,
    #[error("truncated pack data")]
    Truncated,
    #[error("delta base offset out of range")]
    BadDeltaOffset,
    #[error("delta application failed: {0}")]
    BadDelta(String),
    #[error(transparent)]
    Io(#[from] PathError),
}

/// Errors resolving or updating references.
#[derive(Debug, Error)]
pub enum RefError {
    #[error("invalid reference name {0:?}")]
    InvalidName(String),
    #[error("reference {0} not found")]
    NotFound(String),
    #[error("compare-and-swap failed for {name}: expected {expected:?}")]
    Cas { name: String, expected: Option<Digest> },
    #[error("reference {0} resolves to itself")]
    SelfReferential(String),
    #[error("symbolic reference chain for {0} is too deep")]
    ChainTooDeep(String),
    #[error(transparent)]
    Io(#[from] PathError),
}

/// Errors manipulating the lock-file protocol.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("{path} is already locked")]
    AlreadyLocked { path: PathBuf },
    #[error(transparent)]
    Io(#[from] PathError),
}

/// Errors reading or writing the staged index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index signature mismatch")]
    BadSignature,
    #[error("unsupported index version {0}")]
    UnsupportedVersion(u32),
    #[error("index checksum mismatch")]
    BadChecksum,
    #[error("index entries are not sorted at position {0}")]
    NotSorted(usize),
    #[error("unrecognized required index extension {0:?}")]
    UnknownExtension(String),
    #[error(transparent)]
    Io(#[from] PathError),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Top-level error type aggregating every subsystem's errors.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error(transparent)]
    Pack(#[from] PackError),
    #[error(transparent)]
    Ref(#[from] RefError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigGetError),
    #[error(transparent)]
    Io(#[from] PathError),
    #[error("{0} is not inside a repository and has no parent directory left to search")]
    NotARepository(PathBuf),
    #[error("unsupported core.repositoryformatversion {0}")]
    UnsupportedRepositoryFormatVersion(u32),
}
