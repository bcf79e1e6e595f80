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

//! Annotated tag objects: a pointer to a tagged object plus a name, tagger
//! identity, and message.

use thiserror::Error;

use crate::digest::{Digest, TagId};
use crate::object::ObjectType;
use crate::object::commit::Signature;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TagParseError {
    #[error("tag has no `object` line")]
    MissingTagged,
    #[error("malformed hex digest in object line")]
    MalformedHex,
    #[error("tag has no `type` line")]
    MissingType,
    #[error("unrecognized object type {0:?}")]
    UnknownType(String),
    #[error("tag has no `tag` (name) line")]
    MissingName,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    id: TagId,
    tagged: Digest,
    tagged_type: ObjectType,
    name: String,
    tagger: Option<Signature>,
    message: String,
}

impl Tag {
    pub fn parse(id: TagId, text: &str) -> Result<Self, TagParseError> {
        let mut lines = text.split('\n');
        let mut tagged = None;
        let mut tagged_type = None;
        let mut name = None;
        let mut tagger = None;
        let mut line = lines.next();
        while let Some(text) = line {
            if let Some(hex) = text.strip_prefix("object ") {
                tagged = Some(Digest::from_hex(hex).map_err(|_| TagParseError::MalformedHex)?);
            } else if let Some(t) = text.strip_prefix("type ") {
                tagged_type =
                    Some(ObjectType::from_str(t).ok_or_else(|| TagParseError::UnknownType(t.to_owned()))?);
            } else if let Some(n) = text.strip_prefix("tag ") {
                name = Some(n.to_owned());
            } else if let Some(rest) = text.strip_prefix("tagger ") {
                tagger = crate::object::commit::parse_ident_line(rest).ok();
            } else if text.is_empty() {
                break;
            }
            line = lines.next();
        }
        let message = lines.collect::<Vec<_>>().join("\n");
        Ok(Self {
            id,
            tagged: tagged.ok_or(TagParseError::MissingTagged)?,
            tagged_type: tagged_type.ok_or(TagParseError::MissingType)?,
            name: name.ok_or(TagParseError::MissingName)?,
            tagger,
            message,
        })
    }

    pub fn id(&self) -> TagId {
        self.id
    }

    pub fn tagged(&self) -> Digest {
        self.tagged
    }

    pub fn tagged_type(&self) -> ObjectType {
        self.tagged_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tagger(&self) -> Option<&Signature> {
        self.tagger.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
