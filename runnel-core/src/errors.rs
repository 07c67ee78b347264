// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type and the transient read statuses
//! produced by pipeline stages.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// `Error` provides an enumeration of all fatal conditions reported by Runnel.
///
/// Transient pipeline outcomes (partial fills, drained soft reads, end of stream) are not
/// errors; they are reported via [`ReadStatus`].
#[derive(Debug)]
pub enum Error {
    /// A frame or buffer pool was exhausted, or a buffer of the required size cannot be
    /// provided by the pool.
    NoMemory,
    /// A caller-provided buffer does not satisfy the constraints of the operation.
    BadBuffer(&'static str),
    /// A configuration value is invalid or inconsistent with the rest of the pipeline.
    BadConfig(&'static str),
    /// The operation is not allowed in the current state of the object.
    BadOperation(&'static str),
    /// The object does not implement the requested capability.
    BadInterface(&'static str),
    /// An IO error occurred while reading or writing a file.
    IoError(io::Error),
    /// An audio device reported a failure.
    DeviceError(&'static str),
    /// No IO backend can service the requested device.
    NoDriver,
    /// No backend supports the requested sample format.
    NoFormat,
    /// No plugin is registered under the requested backend id.
    NoPlugin,
    /// The pipeline was aborted and no further reads will succeed.
    Aborted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::NoMemory => {
                write!(f, "pool exhausted")
            }
            Error::BadBuffer(msg) => {
                write!(f, "bad buffer: {}", msg)
            }
            Error::BadConfig(msg) => {
                write!(f, "bad configuration: {}", msg)
            }
            Error::BadOperation(msg) => {
                write!(f, "bad operation: {}", msg)
            }
            Error::BadInterface(msg) => {
                write!(f, "bad interface: {}", msg)
            }
            Error::IoError(ref err) => {
                write!(f, "io error: {}", err)
            }
            Error::DeviceError(msg) => {
                write!(f, "device error: {}", msg)
            }
            Error::NoDriver => {
                write!(f, "no suitable driver")
            }
            Error::NoFormat => {
                write!(f, "no suitable format")
            }
            Error::NoPlugin => {
                write!(f, "no suitable plugin")
            }
            Error::Aborted => {
                write!(f, "pipeline aborted")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Outcome of a successful read from a pipeline stage.
///
/// A reader that returns `Ok(..)` has updated the frame's duration, buffer length, flags,
/// and, where applicable, capture timestamp. Fatal conditions are reported as [`Error`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[must_use]
pub enum ReadStatus {
    /// The frame was filled to the full requested duration.
    Complete,
    /// The frame was filled to a smaller duration. The caller may re-issue the read for
    /// the remainder.
    Partial,
    /// Soft read only: no data is buffered yet, nothing was produced.
    Drained,
    /// The stream terminated, no further reads will produce data.
    Finished,
}

/// Convenience function to create a pool exhaustion error.
pub fn no_memory_error<T>() -> Result<T> {
    Err(Error::NoMemory)
}

/// Convenience function to create a bad buffer error.
pub fn bad_buffer_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::BadBuffer(msg))
}

/// Convenience function to create a bad configuration error.
pub fn bad_config_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::BadConfig(msg))
}

/// Convenience function to create a bad operation error.
pub fn bad_operation_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::BadOperation(msg))
}

/// Convenience function to create a bad interface error.
pub fn bad_interface_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::BadInterface(msg))
}

/// Convenience function to create a device error.
pub fn device_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::DeviceError(msg))
}

/// Convenience function to create an abort error.
pub fn abort_error<T>() -> Result<T> {
    Err(Error::Aborted)
}
