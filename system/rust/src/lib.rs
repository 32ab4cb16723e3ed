// Copyright 2022, The Android Open Source Project
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

//! The core event loop for the LE Audio group engine. All group state lives
//! on one thread and is only touched from callbacks posted into it.

use log::{error, info, warn};

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::runtime::Builder;

use tokio::sync::mpsc;

use crate::le_audio::codec_manager::CodecManager;
use crate::le_audio::devices::LeAudioDevices;
use crate::le_audio::groups::LeAudioDeviceGroups;

pub mod core;
pub mod le_audio;
pub mod utils;

/// The Rust Modules runner. Starts and processes posted callbacks while the
/// Rust thread is running. Starts in an idle state.
#[derive(Default, Debug)]
enum RustModuleRunner {
    /// Not started yet
    #[default]
    NotStarted,
    /// Main event loop is running and messages can be processed.
    /// Use [`RustModuleRunner::send`] to queue a callback to be sent.
    Running { tx: mpsc::UnboundedSender<BoxedMainThreadCallback> },
    /// The event loop has been asked to stop and will stop when all
    /// messages in the queue are processed. No further messages can be sent.
    Stopping,
    /// The event loop has ended.  `result` holds an error if the thread ended not gracefully.
    Ended { result: Result<(), String> },
}

/// The ModuleViews lets us access the LE Audio state from other threads
/// while the stack is running.
pub struct ModuleViews<'a> {
    /// Every group known to the stack
    pub groups: &'a mut LeAudioDeviceGroups,
    /// Every LE Audio device, grouped or not
    pub devices: &'a mut LeAudioDevices,
    pub codec_manager: &'a mut CodecManager,
}

static GLOBAL_MODULE_RUNNER: Mutex<RustModuleRunner> = Mutex::new(RustModuleRunner::new());

fn global_runner() -> MutexGuard<'static, RustModuleRunner> {
    GLOBAL_MODULE_RUNNER.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RustModuleRunner {
    const fn new() -> Self {
        Self::NotStarted
    }

    /// Runs the event loop on the calling thread until [`Self::stop`].
    ///
    /// This function can only be run once, if it is run more than once it will panic.
    pub fn run(codec_manager: CodecManager, on_started: impl FnOnce()) {
        info!("starting LE Audio module");
        let mut main_thread_rx = match global_runner().start() {
            Ok(main_thread_rx) => main_thread_rx,
            Err(reason) => {
                error!("Cannot start rust modules: {reason}");
                panic!("Bluetooth Rust modules: {reason}");
            }
        };
        let rt = match Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                error!("failed to start tokio runtime: {e}");
                panic!("Bluetooth Rust modules: {e}");
            }
        };

        let result = rt.block_on(async move {
            let mut groups = LeAudioDeviceGroups::new();
            let mut devices = LeAudioDevices::new();
            let mut codec_manager = codec_manager;

            let mut modules = ModuleViews {
                groups: &mut groups,
                devices: &mut devices,
                codec_manager: &mut codec_manager,
            };

            // notify upper layer that we are ready to receive messages
            on_started();

            // Serializes every incoming request into this thread.
            // do_in_rust_thread lets us post into here from foreign threads.
            info!("starting event loop");
            while let Some(f) = main_thread_rx.recv().await {
                f(&mut modules);
            }

            let pending = modules.groups.cleanup(modules.devices, modules.codec_manager);
            if !pending.is_empty() {
                warn!("stopped with {} CISes still connected", pending.len());
            }
            Ok(())
        });
        warn!("RustModuleRunner has stopped, shutting down executor thread");

        if let Err(e) = global_runner().finished(result) {
            warn!("failed to record runner finish: {e:?}");
        }
    }

    /// Externally stop the global runner.
    pub fn stop() {
        global_runner().shutdown();
    }

    fn send(&self, f: BoxedMainThreadCallback) -> Result<(), (String, BoxedMainThreadCallback)> {
        match self {
            Self::NotStarted => Err(("Not started yet".to_string(), f)),
            Self::Ended { .. } | Self::Stopping => Err(("Runner ended".to_string(), f)),
            Self::Running { tx } => tx.send(f).map_err(|e| ("Failed to send".to_string(), e.0)),
        }
    }

    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<BoxedMainThreadCallback>, String> {
        match self {
            Self::Running { .. } => {
                return Err("Already started".to_string());
            }
            Self::Ended { result } => {
                return Err(format!("Already finished: {result:?}"));
            }
            Self::Stopping => {
                return Err("Can't start, finishing".to_string());
            }
            Self::NotStarted => {}
        };

        let (tx, rx) = mpsc::unbounded_channel();

        *self = Self::Running { tx };
        Ok(rx)
    }

    fn shutdown(&mut self) {
        match std::mem::replace(self, Self::Stopping) {
            Self::NotStarted => {
                warn!("Runner being stopped when it hasn't been started");
                *self = Self::Ended { result: Err("Never started".to_string()) };
            }
            Self::Stopping => {
                warn!("Asked to shutdown twice before stopped");
            }
            Self::Ended { result } => {
                warn!("Runner already ended");
                *self = Self::Ended { result };
            }
            Self::Running { .. } => {}
        }
    }

    fn finished(&mut self, result: Result<(), String>) -> Result<(), String> {
        match self {
            Self::NotStarted => return Err("Not started".to_string()),
            Self::Ended { result } => return Err(format!("Already finished with {result:?}")),
            Self::Running { .. } | Self::Stopping => {}
        }

        *self = Self::Ended { result };
        Ok(())
    }
}

type BoxedMainThreadCallback = Box<dyn for<'a> FnOnce(&'a mut ModuleViews) + Send + 'static>;

/// Posts a callback to the Rust thread and gives it access to the LE Audio
/// state.
///
/// Do not call this from the Rust thread itself, callbacks running there
/// already hold the [`ModuleViews`].
pub fn do_in_rust_thread<F>(f: F)
where
    F: for<'a> FnOnce(&'a mut ModuleViews) + Send + 'static,
{
    if let Err((s, _f)) = global_runner().send(Box::new(f)) {
        error!("Failed to do_in_rust_thread, panicking: {s}");
        panic!("Rust call failed");
    }
}
