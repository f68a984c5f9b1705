// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! One operation per device class the hypervisor describes to a guest.
//!
//! Every operation takes the blob by exclusive reference, resolves the node it edits, writes its
//! properties and drops the node handle before returning. A node that cannot be resolved aborts
//! the operation before anything is written. Property writes that run out of room fail with a
//! capacity error; edits made earlier in the same call are kept.

mod chosen;
mod cpu;
mod devices;
mod memory;
mod nodes;

use fdt_blob::Fdt;
use fdt_blob::FdtNodeMut;

use crate::resolver::resolve_by_path;
use crate::Result;

pub use chosen::clear_initrd;
pub use chosen::clear_stdout_path;
pub use chosen::set_bootargs;
pub use chosen::set_initrd;
pub use chosen::set_stdout_path;
pub use cpu::add_cpu;
pub use devices::add_timer;
pub use devices::add_virtio;
pub use devices::add_vm_service;
pub use devices::add_vm_service_blk;
pub use devices::setup_gic;
pub use devices::setup_pmu;
pub use devices::setup_serial;
pub use devices::MAX_PMU_IRQS;
pub use memory::set_memory;
pub use memory::MemoryRegion;
pub use memory::MAX_MEMORY_REGIONS;
pub use nodes::add_mem_rsv;
pub use nodes::del_mem_rsv;
pub use nodes::disable_node;
pub use nodes::remove_node;

// First cell of an `interrupts` specifier for the GIC.
pub(crate) const GIC_FDT_IRQ_TYPE_SPI: u32 = 0;
pub(crate) const GIC_FDT_IRQ_TYPE_PPI: u32 = 1;

// Last cell of an `interrupts` specifier for the GIC.
pub(crate) const IRQ_TYPE_EDGE_RISING: u32 = 1;
pub(crate) const IRQ_TYPE_LEVEL_HIGH: u32 = 4;

pub(crate) const GICD_SIZE: u64 = 0x1000;
pub(crate) const GICC_SIZE: u64 = 0x2000;
pub(crate) const SERIAL_SIZE: u64 = 0x1000;

/// `interrupts` cells for one shared peripheral interrupt.
fn spi_cells(irq: u32, flags: u32) -> [u32; 3] {
    [GIC_FDT_IRQ_TYPE_SPI, irq, flags]
}

/// Create `name` as a new child of `parent_path`.
fn add_child<'a>(fdt: &'a mut Fdt, parent_path: &str, name: &str) -> Result<FdtNodeMut<'a>> {
    let parent = resolve_by_path(fdt, parent_path)?;
    Ok(parent.add_subnode(name)?)
}
