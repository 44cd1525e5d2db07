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

use crate::context::{grpc_timeout_from_metadata, CallContext};
use crate::grpc::tag::TagServiceClient;
use crate::tracing::Propagator;
use bytes::Bytes;
use futures::StreamExt;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::request::Parts;
use http::{Request, Response, StatusCode};
use http_body_util::{Full, StreamBody};
use hyper::body::Frame;
use serde::Serialize;
use tag_gateway_api::http::{find_rule, HttpRule};
use tag_gateway_api::tag::v1::{GetTagListRequest, GET_TAG_LIST_PATH, STREAM_TAG_LIST_PATH};
use tag_gateway_core::error::code::ErrorDetail;
use tokio_util::sync::CancellationToken;
use tonic::body::BoxBody;
use tonic::metadata::MetadataMap;
use tonic::{Code, Status};
use tracing::{debug, error, instrument};

/// PING_PATH is the path of the health check.
pub const PING_PATH: &str = "/ping";

/// APPLICATION_JSON is the content type of the gateway replies.
const APPLICATION_JSON: &str = "application/json";

/// APPLICATION_NDJSON is the content type of the streaming gateway replies.
const APPLICATION_NDJSON: &str = "application/x-ndjson";

/// ErrorBody is the JSON body of a failed gateway request.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: i32,
    message: &'a str,
    details: Vec<ErrorDetail>,
}

/// StreamResult is one line of a streaming gateway reply.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum StreamResult<'a, T: Serialize> {
    Result(&'a T),
    Error(ErrorBody<'a>),
}

/// Gateway translates HTTP/JSON requests into calls of the tag service over the
/// loopback grpc client, and the replies back into HTTP/JSON responses.
#[derive(Clone)]
pub struct Gateway {
    /// client is the grpc client of the tag service on the same listener.
    client: TagServiceClient,

    /// propagator extracts the trace context sent by HTTP clients.
    propagator: Propagator,
}

/// Gateway implements the HTTP/JSON gateway.
impl Gateway {
    /// new creates the gateway over the tag service client.
    pub fn new(client: TagServiceClient, propagator: Propagator) -> Self {
        Self { client, propagator }
    }

    /// handle serves one HTTP request.
    #[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
    pub async fn handle<B>(&self, request: Request<B>) -> Response<BoxBody> {
        let (parts, _) = request.into_parts();
        if is_ping(&parts) {
            return text_response(StatusCode::OK, "pong");
        }

        let path = parts.uri.path();

        let Some(rule) = find_rule(path) else {
            debug!("no rule bound to the path");
            return error_response(&Status::not_found(format!("path {} not found", path)));
        };

        if parts.method.as_str() != rule.method {
            return error_response_with(
                StatusCode::METHOD_NOT_ALLOWED,
                &Status::unimplemented(format!("method {} not allowed on {}", parts.method, path)),
            );
        }

        let message = match parse_query(parts.uri.query()) {
            Ok(message) => message,
            Err(status) => return error_response(&status),
        };

        let context = self.call_context(rule, &parts);
        match rule.rpc {
            GET_TAG_LIST_PATH => match self.client.get_tag_list(&context, message).await {
                Ok(reply) => match serde_json::to_vec(&reply) {
                    Ok(body) => json_response(StatusCode::OK, body),
                    Err(err) => {
                        error!("encode reply failed: {}", err);
                        error_response(&Status::internal("encode reply failed"))
                    }
                },
                Err(status) => error_response(&status),
            },
            STREAM_TAG_LIST_PATH => match self.client.stream_tag_list(&context, message).await {
                Ok(stream) => {
                    let lines = stream.map(|item| {
                        let line = match item {
                            Ok(tag) => serde_json::to_vec(&StreamResult::Result(&tag)),
                            Err(status) => {
                                let details = details(&status);
                                serde_json::to_vec(&StreamResult::<()>::Error(ErrorBody {
                                    error: status.message(),
                                    code: status.code() as i32,
                                    message: status.message(),
                                    details,
                                }))
                            }
                        };

                        let mut line = line.unwrap_or_default();
                        line.push(b'\n');
                        Ok::<_, Status>(Frame::data(Bytes::from(line)))
                    });

                    let mut response =
                        Response::new(tonic::body::boxed(StreamBody::new(lines)));
                    response
                        .headers_mut()
                        .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_NDJSON));
                    response
                }
                Err(status) => error_response(&status),
            },
            rpc => error_response(&Status::unimplemented(format!("rpc {} not bound", rpc))),
        }
    }

    /// call_context creates the root context of a gateway request. Trace headers
    /// continue the trace of the HTTP client, a grpc-timeout header sets the
    /// deadline, and the cancellation token comes from the connection.
    fn call_context(&self, rule: &HttpRule, parts: &Parts) -> CallContext {
        let metadata = MetadataMap::from_headers(parts.headers.clone());
        let trace = self.propagator.extract(&metadata);
        let timeout = grpc_timeout_from_metadata(&metadata);
        let cancellation = parts
            .extensions
            .get::<CancellationToken>()
            .cloned()
            .unwrap_or_default();

        let context = CallContext::new(format!("{} {}", rule.method, rule.path))
            .with_trace_context(trace)
            .with_cancellation(cancellation);
        match timeout {
            Some(timeout) => context.with_timeout(timeout),
            None => context,
        }
    }
}

/// parse_query fills the request fields from the query parameters, unknown
/// parameters are ignored.
fn parse_query(query: Option<&str>) -> Result<GetTagListRequest, Status> {
    let mut request = GetTagListRequest::default();
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        match key.as_ref() {
            "name" => request.name = value.into_owned(),
            "state" => {
                request.state = value.parse::<u32>().map_err(|_| {
                    Status::invalid_argument(format!("invalid value {} for field state", value))
                })?
            }
            _ => {}
        }
    }

    Ok(request)
}

/// http_status maps a grpc code to the HTTP status of the gateway response.
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::FailedPrecondition => StatusCode::BAD_REQUEST,
        Code::Aborted => StatusCode::CONFLICT,
        Code::OutOfRange => StatusCode::BAD_REQUEST,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn details(status: &Status) -> Vec<ErrorDetail> {
    ErrorDetail::from_status(status).into_iter().collect()
}

/// error_response returns the JSON response of the status.
fn error_response(status: &Status) -> Response<BoxBody> {
    error_response_with(http_status(status.code()), status)
}

fn error_response_with(http_status: StatusCode, status: &Status) -> Response<BoxBody> {
    let body = ErrorBody {
        error: status.message(),
        code: status.code() as i32,
        message: status.message(),
        details: details(status),
    };

    json_response(http_status, serde_json::to_vec(&body).unwrap_or_default())
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<BoxBody> {
    let mut response = Response::new(tonic::body::boxed(Full::new(Bytes::from(body))));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    response
}

fn text_response(status: StatusCode, body: &'static str) -> Response<BoxBody> {
    let mut response = Response::new(tonic::body::boxed(Full::new(Bytes::from_static(
        body.as_bytes(),
    ))));
    *response.status_mut() = status;
    response
}

/// is_ping returns true if the request is the health check, any verb answers.
fn is_ping(parts: &Parts) -> bool {
    parts.uri.path() == PING_PATH
}
