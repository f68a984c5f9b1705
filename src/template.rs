// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Base device tree for guests that do not come with their own.
//!
//! The template only holds what every guest shares. CPUs, memory, the command line and
//! paravirtual devices are filled in afterwards by the composer operations, so the template's
//! `/cpus` and `/chosen` start out empty.

use fdt_blob::Fdt;
use fdt_blob::FdtReserveEntry;
use fdt_blob::FdtWriter;
use log::debug;

use crate::composer::GICC_SIZE;
use crate::composer::GICD_SIZE;
use crate::composer::GIC_FDT_IRQ_TYPE_PPI;
use crate::composer::GIC_FDT_IRQ_TYPE_SPI;
use crate::composer::IRQ_TYPE_LEVEL_HIGH;
use crate::composer::SERIAL_SIZE;
use crate::Result;

/// phandle of the template's interrupt controller.
pub const PHANDLE_GIC: u32 = 0x8001;

const PSCI_PPI: u32 = 7;
const SERIAL_REG_SHIFT: u32 = 2;

/// An ns16550 compatible UART.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerialDesc {
    pub address: u64,
    /// SPI number, not counting the 32 private interrupts.
    pub irq: u32,
    pub clock_frequency: u32,
}

/// Machine-wide parameters of a template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateDesc {
    pub compatible: String,
    pub gic_compatible: String,
    pub gicd_base: u64,
    pub gicc_base: u64,
    pub serials: Vec<SerialDesc>,
    pub mem_reservations: Vec<FdtReserveEntry>,
    pub boot_cpuid_phys: u32,
}

impl Default for TemplateDesc {
    fn default() -> Self {
        TemplateDesc {
            compatible: "linux,dummy-virt".to_string(),
            gic_compatible: "arm,gic-400".to_string(),
            gicd_base: 0x800_0000,
            gicc_base: 0x801_0000,
            serials: Vec::new(),
            mem_reservations: Vec::new(),
            boot_cpuid_phys: 0,
        }
    }
}

fn create_psci_node(fdt: &mut FdtWriter) -> Result<()> {
    let psci_node = fdt.begin_node("psci")?;
    fdt.set_prop("compatible", "arm,psci-1.0")?;
    fdt.set_prop("method", "smc")?;
    fdt.set_prop(
        "interrupts",
        [GIC_FDT_IRQ_TYPE_PPI, PSCI_PPI, IRQ_TYPE_LEVEL_HIGH],
    )?;
    fdt.end_node(psci_node)?;
    Ok(())
}

fn create_cpus_node(fdt: &mut FdtWriter) -> Result<()> {
    let cpus_node = fdt.begin_node("cpus")?;
    fdt.set_prop("#address-cells", 0x2u32)?;
    fdt.set_prop("#size-cells", 0x0u32)?;
    fdt.end_node(cpus_node)?;
    Ok(())
}

fn create_chosen_node(fdt: &mut FdtWriter) -> Result<()> {
    let chosen_node = fdt.begin_node("chosen")?;
    fdt.end_node(chosen_node)?;
    Ok(())
}

fn create_gic_node(fdt: &mut FdtWriter, desc: &TemplateDesc) -> Result<()> {
    let gic_node = fdt.begin_node(&format!("interrupt-controller@{:x}", desc.gicd_base))?;
    fdt.set_prop("phandle", PHANDLE_GIC)?;
    fdt.set_prop(
        "reg",
        [desc.gicd_base, GICD_SIZE, desc.gicc_base, GICC_SIZE],
    )?;
    fdt.set_prop("compatible", desc.gic_compatible.as_str())?;
    fdt.set_prop("#interrupt-cells", 0x3u32)?;
    fdt.set_prop("interrupt-controller", ())?;
    fdt.end_node(gic_node)?;
    Ok(())
}

fn create_serial_node(fdt: &mut FdtWriter, serial: &SerialDesc) -> Result<()> {
    let serial_node = fdt.begin_node(&format!("serial@{:x}", serial.address))?;
    fdt.set_prop("compatible", "ns16550")?;
    fdt.set_prop("reg", [serial.address, SERIAL_SIZE])?;
    fdt.set_prop("reg-shift", SERIAL_REG_SHIFT)?;
    fdt.set_prop(
        "interrupts",
        [GIC_FDT_IRQ_TYPE_SPI, serial.irq, IRQ_TYPE_LEVEL_HIGH],
    )?;
    fdt.set_prop("clock-frequency", serial.clock_frequency)?;
    fdt.end_node(serial_node)?;
    Ok(())
}

/// Build a packed template blob. Grow it with [`crate::CapacityManager::enlarge`] before
/// composing.
pub fn build_template(desc: &TemplateDesc) -> Result<Fdt> {
    let mut fdt = FdtWriter::new(&desc.mem_reservations);
    fdt.set_boot_cpuid_phys(desc.boot_cpuid_phys);

    let root_node = fdt.begin_node("")?;
    fdt.set_prop("compatible", desc.compatible.as_str())?;
    fdt.set_prop("#address-cells", 0x2u32)?;
    fdt.set_prop("#size-cells", 0x2u32)?;
    fdt.set_prop("interrupt-parent", PHANDLE_GIC)?;

    create_psci_node(&mut fdt)?;
    create_cpus_node(&mut fdt)?;
    create_chosen_node(&mut fdt)?;
    create_gic_node(&mut fdt, desc)?;
    for serial in &desc.serials {
        create_serial_node(&mut fdt, serial)?;
    }

    fdt.end_node(root_node)?;
    let fdt = fdt.finish()?;
    debug!("built {} byte device tree template", fdt.totalsize());
    Ok(fdt)
}
