// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Composes the device tree a guest VM boots with.
//!
//! The hypervisor keeps one Devicetree Blob per guest, either loaded from a prebuilt image or
//! generated with [`build_template`], and rewrites it for the guest's actual configuration before
//! handing it over: CPUs, memory, the boot command line, initrd placement, the interrupt
//! controller, serial ports and paravirtual devices.
//!
//! All composition operations edit an [`Fdt`] in place and never grow it. Callers make room up
//! front with [`CapacityManager::enlarge`] and shrink the result with [`CapacityManager::pack`]
//! once they are done. An operation that runs out of room fails with an error for which
//! [`Error::is_capacity`] holds.

pub mod capacity;
pub mod composer;
pub mod config;
pub mod mutator;
pub mod resolver;
pub mod template;

use remain::sorted;
use thiserror::Error as ThisError;

pub use capacity::CapacityManager;
pub use composer::*;
pub use config::ComposerConfig;
pub use fdt_blob::Fdt;
pub use mutator::DisablePolicy;
pub use template::build_template;
pub use template::SerialDesc;
pub use template::TemplateDesc;

#[sorted]
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Fdt(#[from] fdt_blob::Error),
    #[error("invalid page size {0:#x}: must be a non-zero power of two")]
    InvalidPageSize(usize),
    #[error("invalid PMU configuration: {0}")]
    InvalidPmuConfig(String),
    #[error("device tree node not found: {0}")]
    NodeNotFound(String),
}

impl Error {
    /// Whether the error reports a missing node or property.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NodeNotFound(_) | Error::Fdt(fdt_blob::Error::NotFound)
        )
    }

    /// Whether the error reports that the blob is too small for the edit. Enlarging the blob and
    /// retrying may succeed.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Error::Fdt(fdt_blob::Error::NoSpace { .. }))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        assert!(Error::NodeNotFound("/chosen".to_string()).is_not_found());
        assert!(Error::from(fdt_blob::Error::NotFound).is_not_found());
        assert!(!Error::InvalidPageSize(3).is_not_found());

        let full = Error::from(fdt_blob::Error::NoSpace {
            needed: 0x30,
            available: 0x10,
        });
        assert!(full.is_capacity());
        assert!(!full.is_not_found());
        assert!(!Error::from(fdt_blob::Error::BadStructure).is_capacity());
    }

    #[test]
    fn fdt_errors_display_unchanged() {
        let inner = fdt_blob::Error::BadMagic;
        assert_eq!(Error::from(inner.clone()).to_string(), inner.to_string());
    }
}
