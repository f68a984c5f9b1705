// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Growing and shrinking the blob around a batch of edits.

use fdt_blob::Fdt;
use log::info;

use crate::Error;
use crate::Result;

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Resizes blobs in whole pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapacityManager {
    page_size: usize,
}

impl Default for CapacityManager {
    fn default() -> Self {
        CapacityManager {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl CapacityManager {
    pub fn new(page_size: usize) -> Result<CapacityManager> {
        if !page_size.is_power_of_two() {
            return Err(Error::InvalidPageSize(page_size));
        }
        Ok(CapacityManager { page_size })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Size `enlarge` would grow a blob of `current` bytes to: the next page boundary plus one
    /// spare page.
    pub fn target_size(&self, current: usize) -> Result<usize> {
        current
            .checked_next_multiple_of(self.page_size)
            .and_then(|size| size.checked_add(self.page_size))
            .ok_or(Error::Fdt(fdt_blob::Error::TotalSizeTooLarge))
    }

    /// Grow the blob so that at least one page of free space follows its contents. Returns the
    /// new total size.
    pub fn enlarge(&self, fdt: &mut Fdt) -> Result<usize> {
        let old_size = fdt.totalsize();
        let new_size = self.target_size(old_size)?;
        fdt.open_into(new_size)?;
        info!("enlarged device tree from {:#x} to {:#x} bytes", old_size, new_size);
        Ok(new_size)
    }

    /// Shrink the blob to its live contents. Returns the new total size.
    pub fn pack(&self, fdt: &mut Fdt) -> Result<usize> {
        let old_size = fdt.totalsize();
        fdt.pack()?;
        let new_size = fdt.totalsize();
        info!("packed device tree from {:#x} to {:#x} bytes", old_size, new_size);
        Ok(new_size)
    }

    /// Declared total size of the blob.
    pub fn size(&self, fdt: &Fdt) -> usize {
        fdt.totalsize()
    }
}
