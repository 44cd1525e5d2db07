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

use std::borrow::Cow;
use std::{error::Error as ErrorTrait, fmt};

// ErrorType is the type of the error.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorType {
    ConfigError,
    ValidationError,
    TracingError,
}

// ErrorType implements the display for the error type.
impl ErrorType {
    // as_str returns the string of the error type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::ConfigError => "ConfigError",
            ErrorType::ValidationError => "ValidationError",
            ErrorType::TracingError => "TracingError",
        }
    }
}

// ExternalError is the external error.
#[derive(Debug)]
pub struct ExternalError {
    pub etype: ErrorType,
    pub cause: Option<Box<dyn ErrorTrait + Send + Sync>>,
    pub context: Option<Cow<'static, str>>,
}

// ExternalError implements the error trait.
impl ExternalError {
    // new returns a new ExternalError.
    pub fn new(etype: ErrorType) -> Self {
        ExternalError {
            etype,
            cause: None,
            context: None,
        }
    }

    // with_context returns a new ExternalError with the context.
    pub fn with_context(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.context = Some(message.into());
        self
    }

    // with_cause returns a new ExternalError with the cause.
    pub fn with_cause(mut self, cause: Box<dyn ErrorTrait + Send + Sync>) -> Self {
        self.cause = Some(cause);
        self
    }

    // chain_display returns the display of the error with the previous error.
    fn chain_display(
        &self,
        previous: Option<&ExternalError>,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if previous.map(|p| p.etype != self.etype).unwrap_or(true) {
            write!(f, "{}", self.etype.as_str())?
        }

        if let Some(c) = self.context.as_ref() {
            write!(f, " context: {}", c)?;
        }

        if let Some(c) = self.cause.as_ref() {
            if let Some(e) = c.downcast_ref::<ExternalError>() {
                write!(f, " cause: ")?;
                e.chain_display(Some(self), f)
            } else {
                write!(f, " cause: {}", c)
            }
        } else {
            Ok(())
        }
    }
}

// ExternalError implements the display for the error.
impl fmt::Display for ExternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.chain_display(None, f)
    }
}

// ExternalError implements the error trait.
impl ErrorTrait for ExternalError {}

// OrErr is the trait to extend the result with error.
pub trait OrErr<T, E> {
    /// Wrap the E in [Result] with new [ErrorType], the existing E will be the cause.
    fn or_err(self, et: ErrorType) -> Result<T, ExternalError>
    where
        E: Into<Box<dyn ErrorTrait + Send + Sync>>;

    /// Wrap the E in [Result] with new [ErrorType] and a static context.
    fn or_context(self, et: ErrorType, context: &'static str) -> Result<T, ExternalError>
    where
        E: Into<Box<dyn ErrorTrait + Send + Sync>>;
}

// OrErr implements the OrErr for Result.
impl<T, E> OrErr<T, E> for Result<T, E> {
    fn or_err(self, et: ErrorType) -> Result<T, ExternalError>
    where
        E: Into<Box<dyn ErrorTrait + Send + Sync>>,
    {
        self.map_err(|err| ExternalError::new(et).with_cause(err.into()))
    }

    fn or_context(self, et: ErrorType, context: &'static str) -> Result<T, ExternalError>
    where
        E: Into<Box<dyn ErrorTrait + Send + Sync>>,
    {
        self.map_err(|err| {
            ExternalError::new(et)
                .with_cause(err.into())
                .with_context(context)
        })
    }
}

// UpstreamError is the error returned by the upstream tag api.
#[derive(Debug, thiserror::Error)]
#[error("upstream error {message}")]
pub struct UpstreamError {
    // message is the error message.
    pub message: String,

    // status_code is the status code of the response, none if the
    // request never got a response.
    pub status_code: Option<reqwest::StatusCode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_create_error() {
        let error = ExternalError::new(ErrorType::ConfigError).with_context("error message");
        assert_eq!(format!("{}", error), "ConfigError context: error message");

        let error = ExternalError::new(ErrorType::ConfigError)
            .with_context(format!("error message {}", "with owned string"));
        assert_eq!(
            format!("{}", error),
            "ConfigError context: error message with owned string"
        );

        let error = ExternalError::new(ErrorType::ConfigError)
            .with_context("error message")
            .with_cause(Box::new(std::fmt::Error));
        assert_eq!(
            format!("{}", error),
            "ConfigError context: error message cause: an error occurred when formatting an argument"
        );
    }

    #[test]
    fn should_chain_nested_external_errors() {
        let inner = ExternalError::new(ErrorType::ValidationError).with_context("bad port");
        let outer = ExternalError::new(ErrorType::ConfigError).with_cause(Box::new(inner));
        assert_eq!(
            format!("{}", outer),
            "ConfigError cause: ValidationError context: bad port"
        );

        let inner = ExternalError::new(ErrorType::ConfigError).with_context("inner");
        let outer = ExternalError::new(ErrorType::ConfigError).with_cause(Box::new(inner));
        assert_eq!(format!("{}", outer), "ConfigError cause:  context: inner");
    }

    #[test]
    fn should_convert_result_with_or_err() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = result.or_err(ErrorType::ConfigError).unwrap_err();
        assert_eq!(err.etype, ErrorType::ConfigError);
        assert_eq!(format!("{}", err), "ConfigError cause: missing");

        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = result
            .or_context(ErrorType::TracingError, "install exporter")
            .unwrap_err();
        assert_eq!(
            format!("{}", err),
            "TracingError context: install exporter cause: missing"
        );
    }
}
