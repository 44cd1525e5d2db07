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

use crate::context::CallContext;
use crate::grpc::interceptor::{Call, Chain, Reply};
use http::header::{HeaderMap, HeaderName, CONTENT_TYPE, TE, USER_AGENT};
use reqwest::RequestBuilder;
use tag_gateway_api::tag::v1::{GetTagListReply, GetTagListRequest};
use tag_gateway_config::gateway::Upstream as UpstreamConfig;
use tag_gateway_core::error::{ErrorCode, UpstreamError};
use tag_gateway_core::{Error, Result};
use tonic::metadata::MetadataMap;
use tonic::Status;
use tracing::{debug, error};
use url::Url;

/// TAG_LIST_PATH is the path of the tag list api of the upstream.
pub const TAG_LIST_PATH: &str = "/api/v1/tags";

/// Upstream is the HTTP client of the upstream tag api. Every request runs through
/// the client chain, so it carries the trace context and the call deadline.
#[derive(Clone)]
pub struct Upstream {
    /// client is the reqwest client of the tag api.
    client: reqwest::Client,

    /// url is the url of the tag list api.
    url: Url,

    /// chain is the client chain wrapping every request.
    chain: Chain,
}

/// Upstream implements the upstream tag api client.
impl Upstream {
    /// new creates the upstream client of the config.
    pub fn new(config: &UpstreamConfig, chain: Chain) -> Result<Self> {
        let url = Url::parse(&config.addr)?.join(TAG_LIST_PATH)?;
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, url, chain })
    }

    /// get_tag_list requests the tag list as a child call of the context. Upstream
    /// failures are reported as GetTagListFail and undecodable bodies as
    /// DecodeTagListFail.
    pub async fn get_tag_list(
        &self,
        context: &CallContext,
        request: &GetTagListRequest,
    ) -> std::result::Result<GetTagListReply, Status> {
        let client = self.client.clone();
        let url = self.url.clone();
        let transport = move |call: Call| {
            let client = client.clone();
            let url = url.clone();
            async move {
                let (context, request) = call.into_parts::<GetTagListRequest>()?;
                let state = request.state.to_string();
                let mut builder = client
                    .get(url)
                    .query(&[("name", request.name.as_str()), ("state", state.as_str())])
                    .headers(forward_headers(context.metadata()));
                if let Some(remaining) = context.remaining() {
                    builder = builder.timeout(remaining);
                }

                let reply = context
                    .run(fetch(builder))
                    .await?
                    .map_err(|err| to_status(&err))?;
                Ok::<_, Status>(Reply::unary(reply))
            }
        };

        let method = format!("HTTP GET {}", self.url.path());
        self.chain
            .run(Call::new(context.child(method), request.clone()), &transport)
            .await?
            .into_unary::<GetTagListReply>()
    }
}

/// forward_headers returns the metadata of the call to send upstream, the grpc
/// transport headers of the inbound call stay behind.
fn forward_headers(metadata: &MetadataMap) -> HeaderMap {
    let mut headers = metadata.clone().into_headers();
    for name in [CONTENT_TYPE, TE, USER_AGENT] {
        headers.remove(name);
    }

    let grpc: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with("grpc-"))
        .cloned()
        .collect();
    for name in grpc {
        headers.remove(name);
    }

    headers
}

/// fetch sends the request and decodes the tag list of the response.
async fn fetch(builder: RequestBuilder) -> Result<GetTagListReply> {
    let response = builder.send().await.inspect_err(|err| {
        error!("request tag list failed: {}", err);
    })?;

    let status_code = response.status();
    if !status_code.is_success() {
        let message = response.text().await.unwrap_or_default();
        error!("upstream responded {}: {}", status_code, message);
        return Err(Error::UpstreamError(UpstreamError {
            message,
            status_code: Some(status_code),
        }));
    }

    let body = response.bytes().await?;
    debug!("upstream responded {} bytes", body.len());
    serde_json::from_slice::<GetTagListReply>(&body).map_err(|err| {
        error!("decode tag list failed: {}", err);
        Error::SerdeJSONError(err)
    })
}

/// to_status maps an upstream error to the stable error code of the tag service,
/// the raw error never reaches the caller.
fn to_status(err: &Error) -> Status {
    match err {
        Error::SerdeJSONError(_) => ErrorCode::DecodeTagListFail.into(),
        _ => ErrorCode::GetTagListFail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tag_gateway_core::error::code::ErrorDetail;

    #[test]
    fn new_joins_tag_list_path() {
        let config = UpstreamConfig {
            addr: "http://127.0.0.1:8080/".to_string(),
            ..Default::default()
        };

        let upstream = Upstream::new(&config, Chain::new()).unwrap();
        assert_eq!(upstream.url.as_str(), "http://127.0.0.1:8080/api/v1/tags");
    }

    #[test]
    fn new_rejects_invalid_addr() {
        let config = UpstreamConfig {
            addr: "not a url".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            Upstream::new(&config, Chain::new()),
            Err(Error::URLParseError(_))
        ));
    }

    #[test]
    fn forward_headers_keeps_trace_context_only() {
        let mut metadata = MetadataMap::new();
        metadata.insert("content-type", "application/grpc".parse().unwrap());
        metadata.insert("te", "trailers".parse().unwrap());
        metadata.insert("grpc-timeout", "5S".parse().unwrap());
        metadata.insert("grpc-accept-encoding", "gzip".parse().unwrap());
        metadata.insert(
            "traceparent",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"
                .parse()
                .unwrap(),
        );

        let headers = forward_headers(&metadata);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("traceparent"));
    }

    #[test]
    fn to_status_hides_raw_errors() {
        let err = Error::UpstreamError(UpstreamError {
            message: "connection reset by peer".to_string(),
            status_code: None,
        });
        let status = to_status(&err);
        assert_eq!(status.code(), tonic::Code::Unavailable);
        assert_eq!(status.message(), "get tag list failed");
        assert_eq!(
            ErrorDetail::from_status(&status).unwrap().code,
            ErrorCode::GetTagListFail.code()
        );

        let err = Error::SerdeJSONError(serde_json::from_str::<u32>("{").unwrap_err());
        let status = to_status(&err);
        assert_eq!(status.code(), tonic::Code::DataLoss);
        assert_eq!(status.message(), "decode tag list failed");
    }
}
