// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Software error type.

use thiserror::Error;

/// Errors surfaced by the software subsystems.
#[derive(Debug, Error)]
pub enum SoftwareError {
    #[error("protocol error: {0}")]
    Proto(#[from] hampod_proto::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("timed out waiting for a response")]
    Timeout,

    #[error("shutting down")]
    Shutdown,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("radio is not connected")]
    NotConnected,

    #[error("radio refused or lacks the capability")]
    Unavailable,

    #[error("malformed radio reply: {0}")]
    BadReply(String),

    #[error("configuration error: {0}")]
    Config(String),
}
