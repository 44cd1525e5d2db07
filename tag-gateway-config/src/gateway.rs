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

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tag_gateway_core::{
    error::{ErrorType, OrErr},
    Result,
};
use tokio::fs;
use tracing::instrument;
use validator::{Validate, ValidationError};

/// NAME is the name of the tag gateway binary.
pub const NAME: &str = "tag-gateway";

/// Returns the default config path for the tag gateway.
#[inline]
pub fn default_gateway_config_path() -> PathBuf {
    crate::default_config_dir().join("gateway.yaml")
}

/// Returns the default log directory for the tag gateway.
#[inline]
pub fn default_gateway_log_dir() -> PathBuf {
    crate::default_log_dir().join(NAME)
}

/// Returns the default port of the shared grpc and http listener.
#[inline]
pub fn default_server_port() -> u16 {
    8004
}

/// Returns the default address of the upstream tag api.
#[inline]
fn default_upstream_addr() -> String {
    "http://127.0.0.1:8080".to_string()
}

/// Returns the default timeout of a single request to the upstream tag api.
#[inline]
fn default_upstream_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Returns the default deadline attached to outbound calls that carry none,
/// default is 60 seconds.
#[inline]
pub fn default_client_default_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Returns the default service name reported to the tracing backend.
#[inline]
fn default_tracing_service_name() -> String {
    "tour-service".to_string()
}

/// Returns the default path to report traces when the protocol is http.
#[inline]
fn default_tracing_path() -> Option<String> {
    Some("/v1/traces".to_string())
}

/// validate_client_default_timeout rejects default deadlines shorter than a second.
fn validate_client_default_timeout(timeout: &Duration) -> std::result::Result<(), ValidationError> {
    if *timeout < Duration::from_secs(1) {
        return Err(ValidationError::new("default timeout must be at least 1s"));
    }

    Ok(())
}

/// validate_tracing_protocol accepts the protocols supported by the trace exporter.
fn validate_tracing_protocol(protocol: &str) -> std::result::Result<(), ValidationError> {
    match protocol {
        "grpc" | "http" | "https" => Ok(()),
        _ => Err(ValidationError::new("protocol must be one of grpc, http or https")),
    }
}

/// Server is the listener configuration, grpc and the http gateway share it.
#[derive(Debug, Clone, Validate, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Server {
    /// IP is the listen ip of the server, default is the unspecified ipv4 address.
    pub ip: Option<IpAddr>,

    /// Port is the listen port of the server.
    #[serde(default = "default_server_port")]
    pub port: u16,
}

/// Server implements Default.
impl Default for Server {
    fn default() -> Self {
        Server {
            ip: None,
            port: default_server_port(),
        }
    }
}

/// Upstream is the configuration of the external tag api.
#[derive(Debug, Clone, Validate, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Upstream {
    /// Addr is the base address of the tag api, example: "http://127.0.0.1:8080".
    #[serde(default = "default_upstream_addr")]
    #[validate(url)]
    pub addr: String,

    /// Timeout is the timeout of a single request to the tag api.
    #[serde(default = "default_upstream_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// Upstream implements Default.
impl Default for Upstream {
    fn default() -> Self {
        Upstream {
            addr: default_upstream_addr(),
            timeout: default_upstream_timeout(),
        }
    }
}

/// Client is the configuration of the outbound calls.
#[derive(Debug, Clone, Validate, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Client {
    /// Default timeout is the deadline attached to an outbound call whose context
    /// has none. An explicit deadline of the caller is never shortened.
    #[serde(
        default = "default_client_default_timeout",
        with = "humantime_serde"
    )]
    #[validate(custom = "validate_client_default_timeout")]
    pub default_timeout: Duration,
}

/// Client implements Default.
impl Default for Client {
    fn default() -> Self {
        Client {
            default_timeout: default_client_default_timeout(),
        }
    }
}

/// Tracing is the tracing configuration.
#[derive(Debug, Clone, Validate, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Tracing {
    /// Protocol specifies the communication protocol for the tracing server.
    /// Supported values: "http", "https", "grpc" (default: "grpc" when an
    /// endpoint is set).
    #[validate(custom = "validate_tracing_protocol")]
    pub protocol: Option<String>,

    /// Endpoint is the endpoint to report traces, example: "localhost:4317".
    /// Spans are still created and propagated when it is not set.
    pub endpoint: Option<String>,

    /// Path is the path to report traces, example: "/v1/traces" if the protocol is
    /// "http" or "https".
    #[serde(default = "default_tracing_path")]
    pub path: Option<String>,

    /// Service name is the name of the service reported with every span.
    #[serde(default = "default_tracing_service_name")]
    pub service_name: String,
}

/// Tracing implements Default.
impl Default for Tracing {
    fn default() -> Self {
        Self {
            protocol: None,
            endpoint: None,
            path: default_tracing_path(),
            service_name: default_tracing_service_name(),
        }
    }
}

/// Config is the configuration for the tag gateway.
#[derive(Debug, Clone, Default, Validate, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Server is the listener configuration.
    #[validate]
    pub server: Server,

    /// Upstream is the configuration of the external tag api.
    #[validate]
    pub upstream: Upstream,

    /// Client is the configuration of the outbound calls.
    #[validate]
    pub client: Client,

    /// Tracing is the tracing configuration.
    #[validate]
    pub tracing: Tracing,
}

/// Config implements the config operation of the tag gateway.
impl Config {
    /// load loads configuration from file.
    #[instrument(skip_all)]
    pub async fn load(path: &PathBuf) -> Result<Config> {
        // Load configuration from file.
        let content = fs::read_to_string(path).await?;
        let mut config: Config = serde_yaml::from_str(&content).or_err(ErrorType::ConfigError)?;

        // Convert configuration.
        config.convert();

        // Validate configuration.
        config.validate().or_err(ErrorType::ValidationError)?;
        Ok(config)
    }

    /// convert converts the configuration.
    fn convert(&mut self) {
        // Convert listen ip.
        if self.server.ip.is_none() {
            self.server.ip = Some(Ipv4Addr::UNSPECIFIED.into());
        }

        // Convert tracing protocol, grpc is used when only the endpoint is set.
        if self.tracing.endpoint.is_some() && self.tracing.protocol.is_none() {
            self.tracing.protocol = Some("grpc".to_string());
        }
    }

    /// server_addr returns the socket address of the shared listener.
    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.server
                .ip
                .unwrap_or_else(|| Ipv4Addr::UNSPECIFIED.into()),
            self.server.port,
        )
    }
}
