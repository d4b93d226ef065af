// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::config::ConfigError;
use crate::message::MessageError;
use sigring::ChannelError;
use thiserror::Error;

/// Simulation errors.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to spawn {role}: {source}")]
    Spawn {
        role: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process control failed: {0}")]
    Process(#[from] std::io::Error),

    #[error("Sequence broken: expected {expected}, got {got}")]
    Sequence { expected: u64, got: u64 },

    #[error("{0} exited with failure status")]
    ChildFailed(String),
}

pub type Result<T> = std::result::Result<T, SimError>;
