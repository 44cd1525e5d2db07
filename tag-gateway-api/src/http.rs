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

use crate::tag::v1::{GET_TAG_LIST_PATH, STREAM_TAG_LIST_PATH};

/// HttpRule binds an HTTP verb and path to a grpc method of the tag service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRule {
    /// method is the HTTP verb of the rule.
    pub method: &'static str,

    /// path is the HTTP path of the rule, query parameters fill the request fields.
    pub path: &'static str,

    /// rpc is the grpc path the rule is translated to.
    pub rpc: &'static str,

    /// server_streaming is true if the rpc returns a stream of messages.
    pub server_streaming: bool,
}

/// HTTP_RULES is the HTTP mapping of the tag service.
pub const HTTP_RULES: &[HttpRule] = &[
    HttpRule {
        method: "GET",
        path: "/api/v1/tags",
        rpc: GET_TAG_LIST_PATH,
        server_streaming: false,
    },
    HttpRule {
        method: "GET",
        path: "/api/v1/tags:stream",
        rpc: STREAM_TAG_LIST_PATH,
        server_streaming: true,
    },
];

/// find_rule returns the rule bound to the path, the verb is checked by the caller
/// so a wrong verb can be told apart from an unknown path.
pub fn find_rule(path: &str) -> Option<&'static HttpRule> {
    HTTP_RULES.iter().find(|rule| rule.path == path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_rule_by_path() {
        let rule = find_rule("/api/v1/tags").unwrap();
        assert_eq!(rule.rpc, GET_TAG_LIST_PATH);
        assert!(!rule.server_streaming);

        let rule = find_rule("/api/v1/tags:stream").unwrap();
        assert_eq!(rule.rpc, STREAM_TAG_LIST_PATH);
        assert!(rule.server_streaming);

        assert!(find_rule("/api/v1/articles").is_none());
    }
}
