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

//! Content-addressed object database, commit-graph engine, and staged-index
//! pipeline for a distributed version control system.

pub mod config;
pub mod digest;
pub mod error;
pub mod graph;
pub mod index;
pub mod lock;
pub mod object;
pub mod path;
pub mod pretty;
pub mod refs;
pub mod repo;
pub mod store;
pub mod table;
