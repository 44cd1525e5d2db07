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
use chrono::{DateTime, Local};
use futures::StreamExt;
use std::time::Duration;
use tokio::time::Instant;
use tonic::Status;
use tracing::info;

/// AccessLog logs one entry per call with the method, the begin time, the duration
/// and the final error, nil on success. It never alters the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLog;

#[tonic::async_trait]
impl Interceptor for AccessLog {
    async fn intercept(&self, call: Call, next: Next<'_>) -> Result<Reply, Status> {
        let method = call.method().to_string();
        let begin_time = Local::now();
        let started_at = Instant::now();

        match next.run(call).await {
            Ok(Reply::Streaming(stream)) => {
                let observed = ObservedStream::new(stream, move |end| {
                    let error = match end {
                        StreamEnd::Completed => None,
                        StreamEnd::Failed(status) => Some(status.message().to_string()),
                        StreamEnd::Dropped => Some("stream dropped before its end".to_string()),
                    };
                    log_access(&method, begin_time, started_at.elapsed(), error.as_deref());
                });

                Ok(Reply::Streaming(observed.boxed()))
            }
            Ok(reply) => {
                log_access(&method, begin_time, started_at.elapsed(), None);
                Ok(reply)
            }
            Err(status) => {
                log_access(
                    &method,
                    begin_time,
                    started_at.elapsed(),
                    Some(status.message()),
                );
                Err(status)
            }
        }
    }
}

fn log_access(method: &str, begin_time: DateTime<Local>, duration: Duration, error: Option<&str>) {
    info!(
        method = method,
        begin_time = %begin_time.to_rfc3339(),
        duration = ?duration,
        error = error.unwrap_or("nil"),
        "access log"
    );
}
