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
use tonic::{Code, Status};

/// ErrorDetail is the stable error detail carried in the details of a grpc status,
/// encoded as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// code is the stable error code.
    pub code: u32,

    /// message is the human readable message of the code.
    pub message: String,
}

/// ErrorDetail implements the decoding from a grpc status.
impl ErrorDetail {
    /// from_status decodes the error detail from the grpc status, returns none if
    /// the status carries no detail of the tag gateway.
    pub fn from_status(status: &Status) -> Option<Self> {
        if status.details().is_empty() {
            return None;
        }

        serde_json::from_slice(status.details()).ok()
    }
}

/// ErrorCode is the catalogue of the stable error codes returned by the tag service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success,
    Fail,
    InvalidParams,
    NotFound,
    Unknown,
    DeadlineExceeded,
    GetTagListFail,
    DecodeTagListFail,
}

/// ErrorCode implements the mapping to grpc status.
impl ErrorCode {
    /// code returns the stable numeric code.
    pub fn code(&self) -> u32 {
        match self {
            ErrorCode::Success => 0,
            ErrorCode::Fail => 10000000,
            ErrorCode::InvalidParams => 10000001,
            ErrorCode::NotFound => 10000003,
            ErrorCode::Unknown => 10000004,
            ErrorCode::DeadlineExceeded => 10000005,
            ErrorCode::GetTagListFail => 20010001,
            ErrorCode::DecodeTagListFail => 20010002,
        }
    }

    /// message returns the message of the code.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::Success => "success",
            ErrorCode::Fail => "internal error",
            ErrorCode::InvalidParams => "invalid params",
            ErrorCode::NotFound => "not found",
            ErrorCode::Unknown => "unknown",
            ErrorCode::DeadlineExceeded => "deadline exceeded",
            ErrorCode::GetTagListFail => "get tag list failed",
            ErrorCode::DecodeTagListFail => "decode tag list failed",
        }
    }

    /// grpc_code returns the transport level code of the error code.
    pub fn grpc_code(&self) -> Code {
        match self {
            ErrorCode::Success => Code::Ok,
            ErrorCode::Fail => Code::Internal,
            ErrorCode::InvalidParams => Code::InvalidArgument,
            ErrorCode::NotFound => Code::NotFound,
            ErrorCode::Unknown => Code::Unknown,
            ErrorCode::DeadlineExceeded => Code::DeadlineExceeded,
            ErrorCode::GetTagListFail => Code::Unavailable,
            ErrorCode::DecodeTagListFail => Code::DataLoss,
        }
    }

    /// from_code returns the error code of the numeric code.
    pub fn from_code(code: u32) -> Option<Self> {
        [
            ErrorCode::Success,
            ErrorCode::Fail,
            ErrorCode::InvalidParams,
            ErrorCode::NotFound,
            ErrorCode::Unknown,
            ErrorCode::DeadlineExceeded,
            ErrorCode::GetTagListFail,
            ErrorCode::DecodeTagListFail,
        ]
        .into_iter()
        .find(|candidate| candidate.code() == code)
    }

    /// detail returns the error detail of the code.
    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.code(),
            message: self.message().to_string(),
        }
    }

    /// to_status converts the error code to a grpc status, the detail is attached
    /// as JSON so both the grpc and the gateway clients can read the stable code.
    pub fn to_status(&self) -> Status {
        match serde_json::to_vec(&self.detail()) {
            Ok(json) => Status::with_details(self.grpc_code(), self.message(), json.into()),
            Err(_) => Status::new(self.grpc_code(), self.message()),
        }
    }
}

/// ErrorCode converts into a grpc status.
impl From<ErrorCode> for Status {
    fn from(code: ErrorCode) -> Self {
        code.to_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_codes_to_distinct_grpc_codes() {
        assert_eq!(ErrorCode::GetTagListFail.grpc_code(), Code::Unavailable);
        assert_eq!(ErrorCode::DecodeTagListFail.grpc_code(), Code::DataLoss);
        assert_eq!(ErrorCode::Fail.grpc_code(), Code::Internal);
        assert_ne!(
            ErrorCode::GetTagListFail.grpc_code(),
            ErrorCode::DecodeTagListFail.grpc_code()
        );
    }

    #[test]
    fn should_round_trip_detail_through_status() {
        let status = ErrorCode::GetTagListFail.to_status();
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.message(), "get tag list failed");

        let detail = ErrorDetail::from_status(&status).unwrap();
        assert_eq!(detail.code, 20010001);
        assert_eq!(ErrorCode::from_code(detail.code), Some(ErrorCode::GetTagListFail));
    }

    #[test]
    fn should_return_none_for_foreign_status() {
        assert!(ErrorDetail::from_status(&Status::internal("boom")).is_none());
        assert!(ErrorCode::from_code(42).is_none());
    }
}
