// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use fdt_blob::Fdt;
use log::debug;
use log::warn;

use super::add_child;
use crate::mutator;
use crate::resolver::find_by_property_value;
use crate::Result;

/// Most regions a memory node describes. Further regions are dropped.
pub const MAX_MEMORY_REGIONS: usize = 4;

/// A range of guest physical memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub size: u64,
}

/// Replace the guest's memory node with `/<node_name>` describing `regions`.
///
/// Every existing node with `device_type = "memory"` is deleted first, so exactly one memory node
/// remains. Does nothing if `regions` is empty.
pub fn set_memory(fdt: &mut Fdt, regions: &[MemoryRegion], node_name: &str) -> Result<()> {
    if regions.is_empty() {
        debug!("{}: no memory regions, leaving tree unchanged", node_name);
        return Ok(());
    }
    let regions = if regions.len() > MAX_MEMORY_REGIONS {
        warn!(
            "{}: {} memory regions given, only the first {} are used",
            node_name,
            regions.len(),
            MAX_MEMORY_REGIONS
        );
        &regions[..MAX_MEMORY_REGIONS]
    } else {
        regions
    };

    while let Some(offset) = find_by_property_value(fdt, "device_type", b"memory\0")? {
        let old = fdt.node_at_mut(offset)?;
        debug!("removing memory node {}", old.name()?);
        old.delete()?;
    }

    let reg: Vec<u64> = regions
        .iter()
        .flat_map(|region| [region.base, region.size])
        .collect();
    let mut memory = add_child(fdt, "/", node_name)?;
    debug!("{}: {} region(s)", node_name, regions.len());
    mutator::set(&mut memory, "device_type", "memory")?;
    mutator::set(&mut memory, "reg", reg)
}
