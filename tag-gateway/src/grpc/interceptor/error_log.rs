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

use super::{Call, Interceptor, Next, ObservedStream, Reply, StreamEnd};
use futures::StreamExt;
use tag_gateway_core::error::code::ErrorDetail;
use tonic::Status;
use tracing::error;

/// ErrorLog logs a structured entry when the call fails, including a reply stream
/// failing mid-way. It never alters the error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorLog;

#[tonic::async_trait]
impl Interceptor for ErrorLog {
    async fn intercept(&self, call: Call, next: Next<'_>) -> Result<Reply, Status> {
        let method = call.method().to_string();
        match next.run(call).await {
            Ok(Reply::Streaming(stream)) => {
                let observed = ObservedStream::new(stream, move |end| {
                    if let StreamEnd::Failed(status) = end {
                        log_error(&method, status);
                    }
                });

                Ok(Reply::Streaming(observed.boxed()))
            }
            Ok(reply) => Ok(reply),
            Err(status) => {
                log_error(&method, &status);
                Err(status)
            }
        }
    }
}

fn log_error(method: &str, status: &Status) {
    let detail = ErrorDetail::from_status(status);
    error!(
        method = method,
        code = ?status.code(),
        error_code = detail.as_ref().map(|detail| detail.code).unwrap_or_default(),
        message = status.message(),
        "error log"
    );
}
