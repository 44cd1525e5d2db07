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

use super::{Call, Interceptor, Next, Reply};
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tag_gateway_core::error::ErrorCode;
use tonic::Status;
use tracing::error;

/// Recovery turns a panic raised inside it, by the handler, by the tracing layer
/// or while the reply stream is polled, into one generic internal error. The
/// method and the panic value are logged, the panic never escapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recovery;

#[tonic::async_trait]
impl Interceptor for Recovery {
    async fn intercept(&self, call: Call, next: Next<'_>) -> Result<Reply, Status> {
        let method = call.method().to_string();
        match AssertUnwindSafe(next.run(call)).catch_unwind().await {
            Ok(Ok(Reply::Streaming(stream))) => {
                let stream = AssertUnwindSafe(stream)
                    .catch_unwind()
                    .map(move |item| match item {
                        Ok(item) => item,
                        Err(panic) => Err(recover(&method, panic)),
                    });

                Ok(Reply::Streaming(stream.boxed()))
            }
            Ok(result) => result,
            Err(panic) => Err(recover(&method, panic)),
        }
    }
}

fn recover(method: &str, panic: Box<dyn Any + Send>) -> Status {
    let value = panic
        .downcast_ref::<&str>()
        .map(|value| value.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    error!(method = method, panic = value, "panic recovered");
    ErrorCode::Fail.to_status()
}
