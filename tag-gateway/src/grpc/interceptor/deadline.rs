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
use std::time::Duration;
use tokio::time::Instant;
use tonic::Status;
use tracing::debug;

/// DefaultDeadline attaches now + timeout as the deadline of an outbound call that
/// has none. An existing deadline is never touched.
#[derive(Debug, Clone, Copy)]
pub struct DefaultDeadline {
    timeout: Duration,
}

/// DefaultDeadline implements the deadline defaulting interceptor.
impl DefaultDeadline {
    /// new creates the interceptor with the default timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[tonic::async_trait]
impl Interceptor for DefaultDeadline {
    async fn intercept(&self, mut call: Call, next: Next<'_>) -> Result<Reply, Status> {
        if call.context.set_deadline(Instant::now() + self.timeout) {
            debug!("default deadline {:?} set for {}", self.timeout, call.method());
        }

        next.run(call).await
    }
}
