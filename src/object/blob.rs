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

//! Opaque byte payload. Parsing a blob is a no-op beyond recording that it
//! exists; the object store never interprets its contents.

use crate::digest::BlobId;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Blob {
    id: BlobId,
    data: Vec<u8>,
}

impl Blob {
    pub fn parse(id: BlobId, data: Vec<u8>) -> Self {
        Self { id, data }
    }

    pub fn id(&self) -> BlobId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
