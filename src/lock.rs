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

//! Lock-file protocol for atomically replacing a file `P`: create `P.lock`
//! exclusively, write the new content, then rename it onto `P`. Outstanding
//! locks are tracked process-wide so a signal or an early return still
//! unlinks them.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use crate::error::{IoResultExt as _, LockError};

fn registry() -> &'static Mutex<HashSet<PathBuf>> {
    static REGISTRY: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashSet::new()))
}

#[cfg(unix)]
fn install_signal_handler() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| unsafe {
        libc::signal(libc::SIGINT, cleanup_and_reraise as libc::sighandler_t);
        libc::signal(libc::SIGTERM, cleanup_and_reraise as libc::sighandler_t);
    });
}

#[cfg(unix)]
extern "C" fn cleanup_and_reraise(signal: libc::c_int) {
    // Signal-safety: only unlink() and re-raising the default handler, no
    // allocation beyond the already-initialized registry's internal buffer.
    if let Ok(paths) = registry().lock() {
        for path in paths.iter() {
            let _ = fs::remove_file(path);
        }
    }
    unsafe {
        libc::signal(signal, libc::SIG_DFL);
        libc::raise(signal);
    }
}

#[cfg(not(unix))]
fn install_signal_handler() {}

fn lock_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// An acquired lock on `target`'s `.lock` sibling. Dropping without calling
/// [`LockFile::commit`] rolls back (unlinks the `.lock` file).
pub struct LockFile {
    target: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
    done: bool,
}

impl LockFile {
    /// Exclusively creates `target`'s `.lock` sibling and registers it for
    /// signal/at-exit cleanup.
    pub fn acquire(target: impl Into<PathBuf>) -> Result<Self, LockError> {
        let target = target.into();
        let lock_path = lock_path(&target);
        install_signal_handler();

        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&lock_path)
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::AlreadyExists {
                    LockError::AlreadyLocked {
                        path: lock_path.clone(),
                    }
                } else {
                    LockError::Io(crate::error::PathError {
                        path: lock_path.clone(),
                        source,
                    })
                }
            })?;

        registry().lock().unwrap().insert(lock_path.clone());
        Ok(Self {
            target,
            lock_path,
            file: Some(file),
            done: false,
        })
    }

    pub fn write_all(&mut self, content: &[u8]) -> Result<(), LockError> {
        self.file
            .as_mut()
            .expect("lock file still open")
            .write_all(content)
            .context(&self.lock_path)
            .map_err(LockError::Io)
    }

    /// Renames the `.lock` file onto the target path, then clears the
    /// registration so cleanup becomes a no-op.
    pub fn commit(mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            file.sync_data().context(&self.lock_path).map_err(LockError::Io)?;
        }
        fs::rename(&self.lock_path, &self.target)
            .context(&self.lock_path)
            .map_err(LockError::Io)?;
        registry().lock().unwrap().remove(&self.lock_path);
        self.done = true;
        Ok(())
    }

    /// Unlinks the `.lock` file without touching the target.
    pub fn rollback(mut self) {
        self.drop_impl();
    }

    fn drop_impl(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.file = None;
        let _ = fs::remove_file(&self.lock_path);
        registry().lock().unwrap().remove(&self.lock_path);
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        self.drop_impl();
    }
}
