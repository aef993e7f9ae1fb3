// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{any::Any, error::Error as StdError, sync::Arc};

use serde::Serialize;
use strum::EnumProperty;
pub use tonic::{Code, Status};
use tonic::Code as TonicCode;

/// Coarse classification shared by every crate's error type. Each variant
/// carries the gRPC code it is reported as on the wire.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    strum_macros::EnumProperty,
    strum_macros::EnumString,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusCode {
    #[strum(props(tonic_code = "3"))]
    InvalidArgument,
    #[strum(props(tonic_code = "5"))]
    NotFound,
    #[strum(props(tonic_code = "10"))]
    Aborted,
    #[strum(props(tonic_code = "11"))]
    OutOfRange,
    #[strum(props(tonic_code = "14"))]
    Unavailable,
    #[strum(props(tonic_code = "15"))]
    DataLoss,
    #[strum(props(tonic_code = "13"))]
    Internal,
    #[strum(props(tonic_code = "13"))]
    Unknown,
}

impl StatusCode {
    pub fn tonic_code(self) -> TonicCode {
        let value = self
            .get_str("tonic_code")
            .and_then(|value| value.parse::<i32>().ok())
            .unwrap_or(TonicCode::Internal as i32);
        TonicCode::from_i32(value)
    }

    /// Reverse mapping used by clients to classify a received status.
    #[must_use]
    pub const fn from_tonic_code(code: TonicCode) -> Self {
        match code {
            TonicCode::InvalidArgument => Self::InvalidArgument,
            TonicCode::NotFound => Self::NotFound,
            TonicCode::Aborted | TonicCode::Cancelled => Self::Aborted,
            TonicCode::OutOfRange => Self::OutOfRange,
            TonicCode::Unavailable | TonicCode::DeadlineExceeded => Self::Unavailable,
            TonicCode::DataLoss => Self::DataLoss,
            TonicCode::Internal => Self::Internal,
            _ => Self::Unknown,
        }
    }
}

pub trait StackError: StdError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>);

    fn next(&self) -> Option<&dyn StackError>;

    fn last(&self) -> &dyn StackError
    where
        Self: Sized,
    {
        let Some(mut result) = self.next() else {
            return self;
        };
        while let Some(err) = result.next() {
            result = err;
        }
        result
    }

    fn transparent(&self) -> bool { false }
}

pub trait ErrorExt: StackError {
    fn status_code(&self) -> StatusCode { StatusCode::Unknown }

    fn as_any(&self) -> &dyn Any;

    fn output_msg(&self) -> String
    where
        Self: Sized,
    {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal => {
                format!("Internal error: {self}")
            }
            _ => {
                let error = self.last();
                if let Some(external_error) = error.source() {
                    let mut root = external_error;
                    while let Some(source) = root.source() {
                        root = source;
                    }
                    if error.transparent() {
                        format!("{root}")
                    } else {
                        format!("{error}: {root}")
                    }
                } else {
                    format!("{error}")
                }
            }
        }
    }

    fn root_cause(&self) -> Option<&dyn StdError>
    where
        Self: Sized,
    {
        let error = self.last();
        let mut source = error.source()?;
        while let Some(next) = source.source() {
            source = next;
        }
        Some(source)
    }

    /// Converts the error into the status sent to remote callers.
    fn to_status(&self) -> tonic::Status
    where
        Self: Sized,
    {
        tonic::Status::new(self.status_code().tonic_code(), self.output_msg())
    }
}

impl<T: ?Sized + StackError> StackError for Arc<T> {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) { self.as_ref().debug_fmt(layer, buf) }

    fn next(&self) -> Option<&dyn StackError> { self.as_ref().next() }
}

impl<T: StackError> StackError for Box<T> {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) { self.as_ref().debug_fmt(layer, buf) }

    fn next(&self) -> Option<&dyn StackError> { self.as_ref().next() }
}

#[cfg(test)]
mod tests {
    use snafu::Snafu;

    use super::*;

    #[derive(Debug, Snafu)]
    enum ProbeError {
        #[snafu(display("resume point {index} is past the end"))]
        PastEnd { index: u32 },

        #[snafu(display("read failed"))]
        Read { source: std::io::Error },
    }

    impl StackError for ProbeError {
        fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
            buf.push(format!("{layer}: {self}"));
        }

        fn next(&self) -> Option<&dyn StackError> { None }
    }

    impl ErrorExt for ProbeError {
        fn status_code(&self) -> StatusCode {
            match self {
                Self::PastEnd { .. } => StatusCode::OutOfRange,
                Self::Read { .. } => StatusCode::DataLoss,
            }
        }

        fn as_any(&self) -> &dyn Any { self }
    }

    #[test]
    fn test_status_codes_round_trip_through_tonic() {
        for code in [
            StatusCode::InvalidArgument,
            StatusCode::NotFound,
            StatusCode::OutOfRange,
            StatusCode::Unavailable,
            StatusCode::DataLoss,
            StatusCode::Internal,
        ] {
            assert_eq!(StatusCode::from_tonic_code(code.tonic_code()), code);
        }
        assert_eq!(StatusCode::Unknown.tonic_code(), TonicCode::Internal);
    }

    #[test]
    fn test_output_msg_includes_root_cause() {
        let err = ProbeError::Read {
            source: std::io::Error::other("disk on fire"),
        };
        assert_eq!(err.output_msg(), "read failed: disk on fire");

        let status = err.to_status();
        assert_eq!(status.code(), TonicCode::DataLoss);
    }

    #[test]
    fn test_to_status_uses_mapped_code() {
        let status = ProbeError::PastEnd { index: 7 }.to_status();
        assert_eq!(status.code(), TonicCode::OutOfRange);
        assert_eq!(status.message(), "resume point 7 is past the end");
    }
}
