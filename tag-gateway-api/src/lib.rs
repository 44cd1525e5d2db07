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

//! Message types and HTTP rules of `tag.v1.TagService`.
//!
//! The messages keep the layout protoc would generate for `tag.proto`, and
//! also derive serde so the gateway and the upstream api share one JSON shape.

pub mod http;

pub mod tag {
    pub mod v1;
}
