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

use serde::{Deserialize, Serialize};

/// SERVICE_NAME is the fully qualified name of the tag service.
pub const SERVICE_NAME: &str = "tag.v1.TagService";

/// GET_TAG_LIST_PATH is the grpc path of the unary GetTagList method.
pub const GET_TAG_LIST_PATH: &str = "/tag.v1.TagService/GetTagList";

/// STREAM_TAG_LIST_PATH is the grpc path of the server streaming StreamTagList method.
pub const STREAM_TAG_LIST_PATH: &str = "/tag.v1.TagService/StreamTagList";

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct GetTagListRequest {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub state: u32,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub state: u32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Pager {
    #[prost(int64, tag = "1")]
    pub page: i64,
    #[prost(int64, tag = "2")]
    pub page_size: i64,
    #[prost(int64, tag = "3")]
    pub total_rows: i64,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct GetTagListReply {
    #[prost(message, repeated, tag = "1")]
    pub list: ::prost::alloc::vec::Vec<Tag>,
    #[prost(message, optional, tag = "2")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pager: ::core::option::Option<Pager>,
}
