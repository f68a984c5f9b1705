// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use fdt_blob::Fdt;
use log::debug;

use super::add_child;
use super::spi_cells;
use super::GICC_SIZE;
use super::GICD_SIZE;
use super::GIC_FDT_IRQ_TYPE_PPI;
use super::IRQ_TYPE_EDGE_RISING;
use super::IRQ_TYPE_LEVEL_HIGH;
use super::SERIAL_SIZE;
use crate::mutator;
use crate::resolver::resolve_by_compatible;
use crate::Error;
use crate::Result;

const VIRTIO_MMIO_SIZE: u64 = 0x400;

// Interrupt controller compatibles, most specific first.
const GIC_COMPATIBLES: [&str; 2] = ["arm,cortex-a15-gic", "arm,gic-400"];

// PPIs of the architected timer: secure, non-secure, virtual and hypervisor.
const TIMER_PPIS: [u32; 4] = [0xd, 0xe, 0xb, 0xa];

/// Most interrupts a PMU node can be given.
pub const MAX_PMU_IRQS: usize = 7;

/// Add a virtio-mmio transport `/<name>` at `address` signalling SPI `irq`.
pub fn add_virtio(fdt: &mut Fdt, name: &str, irq: u32, address: u64) -> Result<()> {
    let mut node = add_child(fdt, "/", name)?;
    debug!("{}: virtio-mmio at {:#x} irq {}", name, address, irq);
    mutator::set(&mut node, "dma-coherent", ())?;
    mutator::set(&mut node, "compatible", "virtio,mmio")?;
    mutator::set(&mut node, "interrupts", spi_cells(irq, IRQ_TYPE_EDGE_RISING))?;
    mutator::set(&mut node, "reg", [address, VIRTIO_MMIO_SIZE])
}

/// Add `/vm_service`, the hypervisor's paravirtual service endpoint. Its register window is
/// only described when both `address` and `len` are non-zero.
pub fn add_vm_service(fdt: &mut Fdt, irq: u32, address: u64, len: u64) -> Result<()> {
    let mut node = add_child(fdt, "/", "vm_service")?;
    debug!("vm_service: irq {} window {:#x}+{:#x}", irq, address, len);
    mutator::set(&mut node, "compatible", "shyper")?;
    mutator::set(&mut node, "interrupts", spi_cells(irq, IRQ_TYPE_EDGE_RISING))?;
    if address != 0 && len != 0 {
        mutator::set(&mut node, "reg", [address, len])?;
    }
    Ok(())
}

/// Add `/vm_service_blk`, the mediated block service endpoint.
pub fn add_vm_service_blk(fdt: &mut Fdt, irq: u32) -> Result<()> {
    let mut node = add_child(fdt, "/", "vm_service_blk")?;
    debug!("vm_service_blk: irq {}", irq);
    mutator::set(&mut node, "compatible", "shyper_blk")?;
    mutator::set(&mut node, "interrupts", spi_cells(irq, IRQ_TYPE_EDGE_RISING))
}

/// Add `/timer` for the ARMv8 architected timer with every line using `trigger_level`.
pub fn add_timer(fdt: &mut Fdt, trigger_level: u32) -> Result<()> {
    let irqs: Vec<u32> = TIMER_PPIS
        .iter()
        .flat_map(|&ppi| [GIC_FDT_IRQ_TYPE_PPI, ppi, trigger_level])
        .collect();
    let mut node = add_child(fdt, "/", "timer")?;
    debug!("timer: trigger level {:#x}", trigger_level);
    mutator::set(&mut node, "compatible", "arm,armv8-timer")?;
    mutator::set(&mut node, "interrupts", irqs)
}

/// Point the template's interrupt controller at the guest's distributor and CPU interface and
/// rename it to `name`. The controller's own maintenance interrupt is blanked out.
///
/// Blanking `interrupts` needs no room, so it is done first and sticks even when the `reg` write
/// runs out of space.
pub fn setup_gic(fdt: &mut Fdt, gicd: u64, gicc: u64, name: &str) -> Result<()> {
    let mut gic = resolve_by_compatible(fdt, &GIC_COMPATIBLES)?;
    debug!(
        "{}: gicd {:#x} gicc {:#x}, renaming to {}",
        gic.name()?,
        gicd,
        gicc,
        name
    );
    mutator::nop(&mut gic, "interrupts")?;
    mutator::set(&mut gic, "reg", [gicd, GICD_SIZE, gicc, GICC_SIZE])?;
    gic.set_name(name)?;
    Ok(())
}

/// Enable the first serial port compatible with `compatible` at `address` and rename it to
/// `serial@0`.
pub fn setup_serial(fdt: &mut Fdt, compatible: &str, address: u64, irq: u32) -> Result<()> {
    let mut serial = resolve_by_compatible(fdt, &[compatible])?;
    debug!(
        "{}: {} at {:#x} irq {}",
        serial.name()?,
        compatible,
        address,
        irq
    );
    mutator::set(&mut serial, "reg", [address, SERIAL_SIZE])?;
    mutator::set(&mut serial, "interrupts", spi_cells(irq, IRQ_TYPE_LEVEL_HIGH))?;
    mutator::set(&mut serial, "status", "okay")?;
    serial.set_name("serial@0")?;
    Ok(())
}

/// Route the PMU compatible with `compatible` to the SPIs in `spi_irqs`, the n-th interrupt
/// targeting the CPU whose phandle is the n-th entry of `affinity`.
pub fn setup_pmu(fdt: &mut Fdt, compatible: &str, spi_irqs: &[u32], affinity: &[u32]) -> Result<()> {
    if spi_irqs.len() != affinity.len() {
        return Err(Error::InvalidPmuConfig(format!(
            "{} interrupts but {} affinity entries",
            spi_irqs.len(),
            affinity.len()
        )));
    }
    if spi_irqs.is_empty() || spi_irqs.len() > MAX_PMU_IRQS {
        return Err(Error::InvalidPmuConfig(format!(
            "{} interrupts given, expected 1 to {}",
            spi_irqs.len(),
            MAX_PMU_IRQS
        )));
    }

    let irqs: Vec<u32> = spi_irqs
        .iter()
        .flat_map(|&irq| spi_cells(irq, IRQ_TYPE_LEVEL_HIGH))
        .collect();
    let mut pmu = resolve_by_compatible(fdt, &[compatible])?;
    debug!("{}: interrupts {:?} affinity {:?}", pmu.name()?, spi_irqs, affinity);
    mutator::delete(&mut pmu, "interrupts")?;
    mutator::delete(&mut pmu, "interrupt-affinity")?;
    mutator::set(&mut pmu, "interrupts", irqs)?;
    mutator::set(&mut pmu, "interrupt-affinity", affinity)
}

#[cfg(test)]
mod tests {
    use fdt_blob::FdtWriter;

    use super::*;

    fn tree() -> Fdt {
        let mut writer = FdtWriter::new(&[]);
        let root = writer.begin_node("").unwrap();
        let gic = writer.begin_node("interrupt-controller@3881000").unwrap();
        writer.set_prop("compatible", "arm,gic-400").unwrap();
        writer.set_prop("interrupts", [1u32, 9, 0xf04]).unwrap();
        writer.end_node(gic).unwrap();
        let uart = writer.begin_node("serial@3100000").unwrap();
        writer
            .set_prop("compatible", ["nvidia,tegra194-hsuart", "ns16550"])
            .unwrap();
        writer.set_prop("status", "disabled").unwrap();
        writer.end_node(uart).unwrap();
        let pmu = writer.begin_node("arm-pmu").unwrap();
        writer.set_prop("compatible", "arm,armv8-pmuv3").unwrap();
        writer.set_prop("interrupts", [0u32, 0x128, 4, 0, 0x129, 4]).unwrap();
        writer.set_prop("interrupt-affinity", [2u32, 3]).unwrap();
        writer.end_node(pmu).unwrap();
        writer.end_node(root).unwrap();
        let mut fdt = writer.finish().unwrap();
        fdt.open_into(0x1000).unwrap();
        fdt
    }

    #[test]
    fn virtio() {
        let mut fdt = tree();
        add_virtio(&mut fdt, "virtio_mmio@a000000", 0x2e, 0xa00_0000).unwrap();
        let node = fdt.node("/virtio_mmio@a000000").unwrap().unwrap();
        assert_eq!(node.getprop("dma-coherent").unwrap(), Some(&[][..]));
        assert!(node.is_compatible("virtio,mmio").unwrap());
        assert_eq!(
            node.get_prop::<Vec<u32>>("interrupts").unwrap(),
            Some(vec![0, 0x2e, 1])
        );
        assert_eq!(
            node.getprop("reg").unwrap(),
            Some(&[0u8, 0, 0, 0, 0x0a, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x04, 0][..])
        );
    }

    #[test]
    fn vm_service() {
        let mut fdt = tree();
        add_vm_service(&mut fdt, 0x10, 0, 0x1000).unwrap();
        let node = fdt.node("/vm_service").unwrap().unwrap();
        assert!(node.is_compatible("shyper").unwrap());
        assert_eq!(node.getprop("reg").unwrap(), None);

        let mut fdt = tree();
        add_vm_service(&mut fdt, 0x10, 0x5000_0000, 0x1000).unwrap();
        let node = fdt.node("/vm_service").unwrap().unwrap();
        assert_eq!(
            node.get_prop::<Vec<u64>>("reg").unwrap(),
            Some(vec![0x5000_0000, 0x1000])
        );

        add_vm_service_blk(&mut fdt, 0x11).unwrap();
        let node = fdt.node("/vm_service_blk").unwrap().unwrap();
        assert!(node.is_compatible("shyper_blk").unwrap());
        assert_eq!(
            node.get_prop::<Vec<u32>>("interrupts").unwrap(),
            Some(vec![0, 0x11, 1])
        );
    }

    #[test]
    fn timer() {
        let mut fdt = tree();
        add_timer(&mut fdt, 0x8).unwrap();
        let node = fdt.node("/timer").unwrap().unwrap();
        assert!(node.is_compatible("arm,armv8-timer").unwrap());
        assert_eq!(
            node.get_prop::<Vec<u32>>("interrupts").unwrap(),
            Some(vec![1, 0xd, 8, 1, 0xe, 8, 1, 0xb, 8, 1, 0xa, 8])
        );
    }

    #[test]
    fn gic_fallback_compatible() {
        let mut fdt = tree();
        let pmu_before = fdt
            .node("/arm-pmu")
            .unwrap()
            .unwrap()
            .properties()
            .unwrap()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_vec()))
            .collect::<Vec<_>>();

        setup_gic(&mut fdt, 0x800_0000, 0x801_0000, "interrupt-controller@8000000").unwrap();
        assert!(fdt.node("/interrupt-controller@3881000").unwrap().is_none());
        let gic = fdt.node("/interrupt-controller@8000000").unwrap().unwrap();
        assert_eq!(
            gic.get_prop::<Vec<u64>>("reg").unwrap(),
            Some(vec![0x800_0000, 0x1000, 0x801_0000, 0x2000])
        );
        assert_eq!(gic.getprop("interrupts").unwrap(), None);

        let pmu_after = fdt
            .node("/arm-pmu")
            .unwrap()
            .unwrap()
            .properties()
            .unwrap()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_vec()))
            .collect::<Vec<_>>();
        assert_eq!(pmu_before, pmu_after);
    }

    #[test]
    fn gic_prefers_most_specific_compatible() {
        let mut writer = FdtWriter::new(&[]);
        let root = writer.begin_node("").unwrap();
        let gic400 = writer.begin_node("gic400@1").unwrap();
        writer.set_prop("compatible", "arm,gic-400").unwrap();
        writer.end_node(gic400).unwrap();
        let a15 = writer.begin_node("a15@2").unwrap();
        writer.set_prop("compatible", "arm,cortex-a15-gic").unwrap();
        writer.end_node(a15).unwrap();
        writer.end_node(root).unwrap();
        let mut fdt = writer.finish().unwrap();
        fdt.open_into(0x1000).unwrap();

        setup_gic(&mut fdt, 0x800_0000, 0x801_0000, "interrupt-controller@8000000").unwrap();

        assert!(fdt.node("/a15@2").unwrap().is_none());
        let gic = fdt.node("/interrupt-controller@8000000").unwrap().unwrap();
        assert!(gic.is_compatible("arm,cortex-a15-gic").unwrap());
        let gic400 = fdt.node("/gic400@1").unwrap().unwrap();
        assert_eq!(
            gic400.properties().unwrap(),
            vec![("compatible", &b"arm,gic-400\0"[..])]
        );
    }

    #[test]
    fn gic_interrupts_blanked_when_full() {
        let mut fdt = tree();
        fdt.pack().unwrap();

        let err = setup_gic(&mut fdt, 0x800_0000, 0x801_0000, "interrupt-controller@8000000")
            .unwrap_err();
        assert!(err.is_capacity());
        let gic = fdt.node("/interrupt-controller@3881000").unwrap().unwrap();
        assert_eq!(gic.getprop("interrupts").unwrap(), None);
        assert_eq!(gic.getprop("reg").unwrap(), None);
    }

    #[test]
    fn serial() {
        let mut fdt = tree();
        setup_serial(&mut fdt, "ns16550", 0x900_0000, 0x70).unwrap();
        assert!(fdt.node("/serial@3100000").unwrap().is_none());
        let uart = fdt.node("/serial@0").unwrap().unwrap();
        assert_eq!(
            uart.get_prop::<Vec<u64>>("reg").unwrap(),
            Some(vec![0x900_0000, 0x1000])
        );
        assert_eq!(
            uart.get_prop::<Vec<u32>>("interrupts").unwrap(),
            Some(vec![0, 0x70, 4])
        );
        assert_eq!(
            uart.get_prop::<String>("status").unwrap().as_deref(),
            Some("okay")
        );

        assert!(setup_serial(&mut fdt, "arm,pl011", 0x900_0000, 0x70)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn pmu() {
        let mut fdt = tree();
        setup_pmu(&mut fdt, "arm,armv8-pmuv3", &[0x128], &[0x4]).unwrap();
        let pmu = fdt.node("/arm-pmu").unwrap().unwrap();
        assert_eq!(
            pmu.get_prop::<Vec<u32>>("interrupts").unwrap(),
            Some(vec![0, 0x128, 4])
        );
        assert_eq!(
            pmu.get_prop::<Vec<u32>>("interrupt-affinity").unwrap(),
            Some(vec![4])
        );
    }

    #[test]
    fn pmu_rejects_bad_lists() {
        let mut fdt = tree();
        let before = fdt.as_slice().to_vec();
        assert!(matches!(
            setup_pmu(&mut fdt, "arm,armv8-pmuv3", &[1, 2], &[1]),
            Err(Error::InvalidPmuConfig(_))
        ));
        assert!(matches!(
            setup_pmu(&mut fdt, "arm,armv8-pmuv3", &[], &[]),
            Err(Error::InvalidPmuConfig(_))
        ));
        let eight = [1u32; 8];
        assert!(matches!(
            setup_pmu(&mut fdt, "arm,armv8-pmuv3", &eight, &eight),
            Err(Error::InvalidPmuConfig(_))
        ));
        assert!(setup_pmu(&mut fdt, "arm,cortex-a15-pmu", &[1], &[1])
            .unwrap_err()
            .is_not_found());
        assert_eq!(fdt.as_slice(), &before[..]);
    }
}
