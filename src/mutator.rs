// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Property edits shared by the composition operations.
//!
//! These wrap the raw [`FdtNodeMut`] edits with the conventions the composer relies on: removing
//! a property that is not there is not an error, and disabling a node can be done without
//! growing the blob.

use fdt_blob::FdtNode;
use fdt_blob::FdtNodeMut;
use fdt_blob::ToFdtPropval;
use log::debug;
use log::warn;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Value a disabled node's `status` is overwritten with when it cannot be resized. Any value
/// other than "okay" or "ok" marks a node unavailable to the guest kernel.
const STATUS_SENTINEL: &[u8] = b"NILL";

/// How [`disable`] marks a node that already has a `status` property.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisablePolicy {
    /// Overwrite the existing value in place with a sentinel of the same length. Never needs
    /// free space.
    #[default]
    InPlaceSentinel,
    /// Replace the value with "disabled". May need free space.
    Rewrite,
}

/// Create or replace a property.
pub fn set<T: ToFdtPropval>(node: &mut FdtNodeMut<'_>, name: &str, value: T) -> Result<()> {
    node.set_prop(name, value)?;
    Ok(())
}

/// Overwrite an existing property with a value of identical length.
pub fn set_in_place(node: &mut FdtNodeMut<'_>, name: &str, value: &[u8]) -> Result<()> {
    node.setprop_inplace(name, value)?;
    Ok(())
}

/// Remove a property, shrinking the structure block. Succeeds if the property is absent.
pub fn delete(node: &mut FdtNodeMut<'_>, name: &str) -> Result<()> {
    match node.delprop(name) {
        Err(fdt_blob::Error::NotFound) => Ok(()),
        r => Ok(r?),
    }
}

/// Blank a property out with NOP tags without moving anything. Succeeds if the property is
/// absent.
pub fn nop(node: &mut FdtNodeMut<'_>, name: &str) -> Result<()> {
    match node.nop_property(name) {
        Err(fdt_blob::Error::NotFound) => Ok(()),
        r => Ok(r?),
    }
}

fn sentinel_status(len: usize) -> Vec<u8> {
    let mut value = vec![0u8; len];
    let n = STATUS_SENTINEL.len().min(len.saturating_sub(1));
    value[..n].copy_from_slice(&STATUS_SENTINEL[..n]);
    value
}

/// Mark a node disabled. A node without `status` gets `status = "disabled"`; an existing
/// `status` is handled according to `policy`.
pub fn disable(node: &mut FdtNodeMut<'_>, policy: DisablePolicy) -> Result<()> {
    let existing_len = node.getprop("status")?.map(<[u8]>::len);
    match (existing_len, policy) {
        (None, _) | (Some(_), DisablePolicy::Rewrite) => {
            debug!("{}: setting status to disabled", node.name()?);
            node.set_prop("status", "disabled")?;
        }
        (Some(len), DisablePolicy::InPlaceSentinel) => {
            warn!(
                "{}: overwriting {} byte status with a sentinel in place",
                node.name()?,
                len
            );
            node.setprop_inplace("status", &sentinel_status(len))?;
        }
    }
    Ok(())
}

/// Whether the guest kernel will treat the node as available.
pub fn is_enabled(node: &FdtNode<'_>) -> Result<bool> {
    Ok(match node.getprop("status")? {
        None => true,
        Some(status) => {
            let value = status.split(|&b| b == 0).next().unwrap_or_default();
            matches!(value, b"okay" | b"ok")
        }
    })
}
