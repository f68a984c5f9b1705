// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use remain::sorted;
use thiserror::Error as ThisError;

#[sorted]
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Device tree blocks are not laid out in read-write order")]
    BadLayout,
    #[error("Bad device tree magic value")]
    BadMagic,
    #[error("Offset does not point at the expected structure token")]
    BadOffset,
    #[error("Invalid device tree path {0}")]
    BadPath(String),
    #[error("Device tree structure block is corrupted")]
    BadStructure,
    #[error("Invalid value: {0}")]
    BadValue(String),
    #[error("Unsupported device tree version {0}")]
    BadVersion(u32),
    #[error("Node {0} already exists")]
    Exists(String),
    #[error("Invalid string value {0}")]
    InvalidString(String),
    #[error("Not enough space in device tree blob: need {needed} bytes, have {available}")]
    NoSpace { needed: usize, available: usize },
    #[error("Requested node, property or entry not found")]
    NotFound,
    #[error("Attempted to end a node that was not the most recent")]
    OutOfOrderEndNode,
    #[error("Properties may not be added after a node has been ended")]
    PropertyAfterEndNode,
    #[error("Property value size must fit in 32 bits")]
    PropertyValueTooLarge,
    #[error("Total size must fit in 32 bits")]
    TotalSizeTooLarge,
    #[error("Device tree blob is truncated")]
    Truncated,
    #[error("Attempted to call finish without ending all nodes")]
    UnclosedNode,
}

pub type Result<T> = std::result::Result<T, Error>;
