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

pub mod code;
pub mod errors;

pub use code::ErrorCode;
pub use errors::ErrorType;
pub use errors::ExternalError;

pub use errors::OrErr;
pub use errors::UpstreamError;

// GatewayError is the error for the tag gateway.
#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    // IO is the error for IO operation.
    #[error(transparent)]
    IO(#[from] std::io::Error),

    // InvalidURI is the error when the uri is invalid.
    #[error("invalid uri {0}")]
    InvalidURI(String),

    // ReqwestError is the error for reqwest.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    // SerdeJSONError is the error for serde_json.
    #[error(transparent)]
    SerdeJSONError(#[from] serde_json::Error),

    // URLParseError is the error for url parse.
    #[error(transparent)]
    URLParseError(#[from] url::ParseError),

    // UpstreamError is the error for the upstream tag api.
    #[error(transparent)]
    UpstreamError(UpstreamError),

    // ExternalError is the error for external error.
    #[error(transparent)]
    ExternalError(#[from] ExternalError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_externalerror_to_gateway_error() {
        fn function_return_inner_error() -> Result<(), std::io::Error> {
            let inner_error = std::io::Error::new(std::io::ErrorKind::Other, "inner error");
            Err(inner_error)
        }

        fn do_sth_with_error() -> Result<(), GatewayError> {
            function_return_inner_error().map_err(|err| {
                ExternalError::new(crate::error::ErrorType::ConfigError).with_cause(err.into())
            })?;
            Ok(())
        }

        let err = do_sth_with_error().err().unwrap();
        assert_eq!(format!("{}", err), "ConfigError cause: inner error");
    }

    #[test]
    fn should_display_upstream_error() {
        let err = GatewayError::UpstreamError(UpstreamError {
            message: "connection refused".to_string(),
            status_code: None,
        });
        assert_eq!(format!("{}", err), "upstream error connection refused");
    }
}
