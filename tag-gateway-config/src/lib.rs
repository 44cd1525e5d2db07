/*
 *     Copyright 2026 The Tag Gateway Authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::path::PathBuf;

pub mod gateway;

/// SERVICE_NAME is the name of the service.
pub const SERVICE_NAME: &str = "tag";

/// NAME is the name of the package.
pub const NAME: &str = "gateway";

/// CARGO_PKG_VERSION is the version of the cargo package.
pub const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// default_config_dir is the default config directory for the tag gateway.
pub fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/tag-gateway/")
}

/// default_log_dir is the default log directory for the tag gateway.
pub fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/tag-gateway/")
}
