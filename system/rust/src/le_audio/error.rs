// Copyright 2024, The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Errors reported by the group registry and CIS bookkeeping.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeAudioError {
    #[error("group {0} already exists")]
    GroupAlreadyExists(i32),
    #[error("no such group: {0}")]
    NoSuchGroup(i32),
    #[error("controller returned {actual} CIS handles for {expected} CIS slots")]
    CisHandleCountMismatch { expected: usize, actual: usize },
}
