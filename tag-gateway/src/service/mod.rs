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
use crate::grpc::tag::{TagService, TagStream};
use futures::stream::{self, StreamExt};
use tag_gateway_api::tag::v1::{GetTagListReply, GetTagListRequest};
use tonic::Status;
use tracing::{info, instrument};

pub mod upstream;

pub use upstream::Upstream;

/// TagServer is the tag service, a stateless forwarder to the upstream tag api.
#[derive(Clone)]
pub struct TagServer {
    upstream: Upstream,
}

/// TagServer implements the tag server.
impl TagServer {
    /// new creates the tag server over the upstream.
    pub fn new(upstream: Upstream) -> Self {
        Self { upstream }
    }
}

#[tonic::async_trait]
impl TagService for TagServer {
    #[instrument(skip_all, fields(name = %request.name, state = request.state))]
    async fn get_tag_list(
        &self,
        context: CallContext,
        request: GetTagListRequest,
    ) -> Result<GetTagListReply, Status> {
        let reply = self.upstream.get_tag_list(&context, &request).await?;
        info!("get tag list returned {} tags", reply.list.len());
        Ok(reply)
    }

    #[instrument(skip_all, fields(name = %request.name, state = request.state))]
    async fn stream_tag_list(
        &self,
        context: CallContext,
        request: GetTagListRequest,
    ) -> Result<TagStream, Status> {
        let reply = self.upstream.get_tag_list(&context, &request).await?;
        info!("stream tag list returns {} tags", reply.list.len());
        Ok(stream::iter(reply.list.into_iter().map(Ok)).boxed())
    }
}
