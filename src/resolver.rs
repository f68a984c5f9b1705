// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Locating the nodes a composition operation edits.
//!
//! Unlike the lookups on [`Fdt`], which report a missing node as `Ok(None)`, these fail with
//! [`Error::NodeNotFound`] naming what was looked for, which is what every composition operation
//! wants to report.

use fdt_blob::Fdt;
use fdt_blob::FdtNodeMut;
use fdt_blob::ROOT_OFFSET;
use log::debug;

use crate::Error;
use crate::Result;

/// Find a node by absolute path.
pub fn resolve_by_path<'a>(fdt: &'a mut Fdt, path: &str) -> Result<FdtNodeMut<'a>> {
    let offset = fdt
        .path_offset(path)?
        .ok_or_else(|| Error::NodeNotFound(path.to_string()))?;
    Ok(fdt.node_at_mut(offset)?)
}

/// Find the first node below the root compatible with one of `candidates`. Candidates are tried
/// in order; the first one matching any node wins.
pub fn resolve_by_compatible<'a>(fdt: &'a mut Fdt, candidates: &[&str]) -> Result<FdtNodeMut<'a>> {
    for compatible in candidates {
        if let Some(offset) = fdt.node_offset_by_compatible(Some(ROOT_OFFSET), compatible)? {
            debug!("resolved compatible {} at offset {:#x}", compatible, offset);
            return Ok(fdt.node_at_mut(offset)?);
        }
    }
    Err(Error::NodeNotFound(format!(
        "compatible with {}",
        candidates.join(" or ")
    )))
}

/// Find the first node below the root whose property `name` is exactly `value`.
pub fn resolve_by_property_value<'a>(
    fdt: &'a mut Fdt,
    name: &str,
    value: &[u8],
) -> Result<FdtNodeMut<'a>> {
    let offset = find_by_property_value(fdt, name, value)?
        .ok_or_else(|| Error::NodeNotFound(format!("with property {}", name)))?;
    Ok(fdt.node_at_mut(offset)?)
}

/// Offset of the first node below the root whose property `name` is exactly `value`, if any.
pub fn find_by_property_value(fdt: &Fdt, name: &str, value: &[u8]) -> Result<Option<usize>> {
    Ok(fdt.node_offset_by_prop_value(Some(ROOT_OFFSET), name, value)?)
}

#[cfg(test)]
mod tests {
    use fdt_blob::FdtWriter;

    use super::*;

    fn tree() -> Fdt {
        let mut writer = FdtWriter::new(&[]);
        let root = writer.begin_node("").unwrap();
        writer.set_prop("compatible", "linux,dummy-virt").unwrap();
        let chosen = writer.begin_node("chosen").unwrap();
        writer.end_node(chosen).unwrap();
        let gic = writer.begin_node("intc@8000000").unwrap();
        writer
            .set_prop("compatible", ["arm,cortex-a15-gic", "arm,gic-400"])
            .unwrap();
        writer.end_node(gic).unwrap();
        let memory = writer.begin_node("memory@40000000").unwrap();
        writer.set_prop("device_type", "memory").unwrap();
        writer.end_node(memory).unwrap();
        writer.end_node(root).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn by_path() {
        let mut fdt = tree();
        assert_eq!(resolve_by_path(&mut fdt, "/chosen").unwrap().name().unwrap(), "chosen");
        assert_eq!(resolve_by_path(&mut fdt, "/").unwrap().offset(), ROOT_OFFSET);
        assert_eq!(
            resolve_by_path(&mut fdt, "/aliases").err(),
            Some(Error::NodeNotFound("/aliases".to_string()))
        );
        assert!(resolve_by_path(&mut fdt, "chosen").is_err());
    }

    #[test]
    fn by_compatible() {
        let mut fdt = tree();
        let gic = resolve_by_compatible(&mut fdt, &["arm,gic-v3", "arm,gic-400"]).unwrap();
        assert_eq!(gic.name().unwrap(), "intc@8000000");

        let err = resolve_by_compatible(&mut fdt, &["arm,gic-v3"]).unwrap_err();
        assert!(err.is_not_found());
        // The root is never a candidate.
        assert!(resolve_by_compatible(&mut fdt, &["linux,dummy-virt"]).is_err());
    }

    #[test]
    fn by_property_value() {
        let mut fdt = tree();
        let memory = resolve_by_property_value(&mut fdt, "device_type", b"memory\0").unwrap();
        assert_eq!(memory.name().unwrap(), "memory@40000000");
        assert!(resolve_by_property_value(&mut fdt, "device_type", b"memory")
            .unwrap_err()
            .is_not_found());
        assert_eq!(find_by_property_value(&fdt, "device_type", b"cpu\0").unwrap(), None);
    }
}
