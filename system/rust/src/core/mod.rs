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

//! Entry points bringing the LE Audio module thread up and down.

use std::thread::{self, JoinHandle};

use crate::le_audio::codec_manager::CodecManager;
use crate::{utils, RustModuleRunner};

/// Spawns the module thread. `on_started` runs on it once callbacks can be
/// posted with [`crate::do_in_rust_thread`].
pub fn start(
    codec_manager: CodecManager,
    on_started: impl FnOnce() + Send + 'static,
) -> JoinHandle<()> {
    utils::init_logging();
    thread::spawn(move || {
        RustModuleRunner::run(codec_manager, on_started);
    })
}

/// Stops the module thread after the callbacks already queued have run.
pub fn stop() {
    RustModuleRunner::stop();
}
