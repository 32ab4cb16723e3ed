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

//! Access to Bluetooth system properties.
//!
//! On Android these live in the platform property store. Host builds read
//! them from the environment: `namespace.prop` maps to the variable
//! `BLUETOOTH_<NAMESPACE>_<PROP>`. A missing or unparseable value yields the
//! supplied default.

use log::warn;
use std::str::FromStr;

/// Reads `namespace.prop`, returning `default` if it is unset.
///
/// ```ignore
/// let swb = get_sysprop!(bta, le_audio_dual_bidir_swb_supported, false);
/// ```
#[macro_export]
macro_rules! get_sysprop {
    ($namespace:ident, $prop:ident, $default:expr) => {
        $crate::utils::sysprop::get(stringify!($namespace), stringify!($prop), $default)
    };
}

fn env_key(namespace: &str, prop: &str) -> String {
    format!("BLUETOOTH_{}_{}", namespace.to_uppercase(), prop.to_uppercase())
}

/// Non-macro form of [`get_sysprop!`].
pub fn get<T: FromStr>(namespace: &str, prop: &str, default: T) -> T {
    let key = env_key(namespace, prop);
    match std::env::var(&key) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Ignoring malformed value {value:?} for {namespace}.{prop}");
                default
            }
        },
        Err(_) => default,
    }
}
