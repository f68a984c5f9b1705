// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Hiding host hardware from the guest.

use fdt_blob::Fdt;
use fdt_blob::FdtReserveEntry;
use log::debug;

use crate::mutator;
use crate::mutator::DisablePolicy;
use crate::resolver::resolve_by_path;
use crate::Result;

/// Delete the node at `path` along with its whole subtree.
pub fn remove_node(fdt: &mut Fdt, path: &str) -> Result<()> {
    let node = resolve_by_path(fdt, path)?;
    debug!("removing {}", path);
    node.delete()?;
    Ok(())
}

/// Keep the node at `path` in the tree but mark it unavailable.
pub fn disable_node(fdt: &mut Fdt, path: &str, policy: DisablePolicy) -> Result<()> {
    let mut node = resolve_by_path(fdt, path)?;
    mutator::disable(&mut node, policy)
}

/// Reserve `size` bytes at `address` from the guest kernel's allocator.
pub fn add_mem_rsv(fdt: &mut Fdt, address: u64, size: u64) -> Result<()> {
    debug!("reserving {:#x}+{:#x}", address, size);
    fdt.add_mem_rsv(FdtReserveEntry { address, size })?;
    Ok(())
}

/// Drop the `n`th memory reservation. Later entries move down by one.
pub fn del_mem_rsv(fdt: &mut Fdt, n: usize) -> Result<()> {
    let entry = fdt.mem_rsv(n)?;
    debug!(
        "dropping reservation {}: {:#x}+{:#x}",
        n, entry.address, entry.size
    );
    fdt.del_mem_rsv(n)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use fdt_blob::FdtWriter;

    use super::*;
    use crate::Error;

    fn tree() -> Fdt {
        let mut writer = FdtWriter::new(&[FdtReserveEntry {
            address: 0x8000_0000,
            size: 0x1_0000,
        }]);
        let root = writer.begin_node("").unwrap();
        let host1x = writer.begin_node("host1x").unwrap();
        let display = writer.begin_node("nvdisplay@15210000").unwrap();
        writer.set_prop("status", "okay").unwrap();
        writer.end_node(display).unwrap();
        writer.end_node(host1x).unwrap();
        let watchdog = writer.begin_node("watchdog@30c0000").unwrap();
        writer.set_prop("compatible", "nvidia,tegra-wdt-t19x").unwrap();
        writer.end_node(watchdog).unwrap();
        writer.end_node(root).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn remove_subtree() {
        let mut fdt = tree();
        let size = fdt.totalsize();
        remove_node(&mut fdt, "/host1x").unwrap();
        assert!(fdt.node("/host1x/nvdisplay@15210000").unwrap().is_none());
        assert!(fdt.node("/watchdog@30c0000").unwrap().is_some());
        assert_eq!(fdt.totalsize(), size);
        assert!(remove_node(&mut fdt, "/host1x").unwrap_err().is_not_found());
    }

    #[test]
    fn remove_root() {
        let mut fdt = tree();
        assert_eq!(
            remove_node(&mut fdt, "/"),
            Err(Error::Fdt(fdt_blob::Error::BadOffset))
        );
    }

    #[test]
    fn disable_nested() {
        let mut fdt = tree();
        disable_node(
            &mut fdt,
            "/host1x/nvdisplay@15210000",
            DisablePolicy::InPlaceSentinel,
        )
        .unwrap();
        let display = fdt.node("/host1x/nvdisplay@15210000").unwrap().unwrap();
        assert_eq!(display.getprop("status").unwrap(), Some(&b"NILL\0"[..]));

        // No status and no free space.
        assert!(disable_node(&mut fdt, "/watchdog@30c0000", DisablePolicy::Rewrite)
            .unwrap_err()
            .is_capacity());
    }

    #[test]
    fn reservations() {
        let mut fdt = tree();
        fdt.open_into(fdt.totalsize() + 0x40).unwrap();
        add_mem_rsv(&mut fdt, 0x9000_0000, 0x2000).unwrap();
        assert_eq!(fdt.num_mem_rsv().unwrap(), 2);
        del_mem_rsv(&mut fdt, 0).unwrap();
        assert_eq!(
            fdt.mem_rsv(0).unwrap(),
            FdtReserveEntry {
                address: 0x9000_0000,
                size: 0x2000
            }
        );
        assert!(del_mem_rsv(&mut fdt, 1).unwrap_err().is_not_found());
    }
}
