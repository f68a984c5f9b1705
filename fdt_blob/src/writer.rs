// Copyright 2018 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Streaming writer for fresh Flattened Devicetree blobs.

use std::collections::BTreeMap;

use zerocopy::IntoBytes;

use crate::header::align;
use crate::header::FdtHeader;
use crate::header::FdtReserveEntry;
use crate::header::FDT_BEGIN_NODE;
use crate::header::FDT_END;
use crate::header::FDT_END_NODE;
use crate::header::FDT_HEADER_SIZE;
use crate::header::FDT_LAST_COMP_VERSION;
use crate::header::FDT_MAGIC;
use crate::header::FDT_PROP;
use crate::header::FDT_TAGSIZE;
use crate::header::FDT_VERSION;
use crate::header::SIZE_U64;
use crate::propval::ToFdtPropval;
use crate::Error;
use crate::Fdt;
use crate::Result;

/// Writes a Flattened Devicetree (FDT) from scratch, one node at a time.
///
/// # Example
///
/// ```rust
/// use fdt_blob::FdtWriter;
///
/// # fn main() -> fdt_blob::Result<()> {
/// let mut fdt = FdtWriter::new(&[]);
/// let root_node = fdt.begin_node("")?;
/// fdt.set_prop("compatible", "linux,dummy-virt")?;
/// fdt.set_prop("#address-cells", 0x2u32)?;
/// fdt.set_prop("#size-cells", 0x2u32)?;
/// let chosen_node = fdt.begin_node("chosen")?;
/// fdt.set_prop("bootargs", "earlycon console=ttyS0")?;
/// fdt.end_node(chosen_node)?;
/// fdt.end_node(root_node)?;
/// let dtb = fdt.finish()?;
/// assert!(dtb.node("/chosen")?.is_some());
/// # Ok(())
/// # }
/// ```
pub struct FdtWriter {
    data: Vec<u8>,
    off_mem_rsvmap: usize,
    off_dt_struct: usize,
    strings: Vec<u8>,
    string_offsets: BTreeMap<String, u32>,
    node_depth: usize,
    node_ended: bool,
    boot_cpuid_phys: u32,
}

/// Handle to a node opened by [`FdtWriter::begin_node`].
///
/// Nodes must be passed back to [`FdtWriter::end_node`] in the reverse order they were opened.
#[derive(Debug)]
pub struct OpenNode {
    depth: usize,
}

impl FdtWriter {
    /// Start a new blob listing `mem_reservations` in its reservation map.
    pub fn new(mem_reservations: &[FdtReserveEntry]) -> Self {
        let off_mem_rsvmap = align(FDT_HEADER_SIZE, SIZE_U64);
        let mut data = vec![0u8; off_mem_rsvmap];
        for rsv in mem_reservations {
            data.extend_from_slice(&rsv.to_bytes());
        }
        data.extend_from_slice(&FdtReserveEntry::default().to_bytes());
        let off_dt_struct = data.len();

        FdtWriter {
            data,
            off_mem_rsvmap,
            off_dt_struct,
            strings: Vec::new(),
            string_offsets: BTreeMap::new(),
            node_depth: 0,
            node_ended: false,
            boot_cpuid_phys: 0,
        }
    }

    /// Set the `boot_cpuid_phys` field of the devicetree header.
    pub fn set_boot_cpuid_phys(&mut self, boot_cpuid_phys: u32) {
        self.boot_cpuid_phys = boot_cpuid_phys;
    }

    fn pad_to_tag(&mut self) {
        let len = align(self.data.len(), FDT_TAGSIZE);
        self.data.resize(len, 0);
    }

    fn append_u32(&mut self, val: u32) {
        self.data.extend_from_slice(&val.to_be_bytes());
    }

    /// Open a new node. `name` must not contain NUL bytes; the root node's name is empty.
    pub fn begin_node(&mut self, name: &str) -> Result<OpenNode> {
        if name.contains('\0') {
            return Err(Error::InvalidString(name.to_string()));
        }
        self.append_u32(FDT_BEGIN_NODE);
        self.data.extend_from_slice(name.as_bytes());
        self.data.push(0);
        self.pad_to_tag();
        self.node_depth += 1;
        self.node_ended = false;
        Ok(OpenNode {
            depth: self.node_depth,
        })
    }

    /// Close a node previously opened with `begin_node`.
    pub fn end_node(&mut self, node: OpenNode) -> Result<()> {
        if node.depth != self.node_depth {
            return Err(Error::OutOfOrderEndNode);
        }
        self.append_u32(FDT_END_NODE);
        self.node_depth -= 1;
        self.node_ended = true;
        Ok(())
    }

    fn intern_string(&mut self, s: &str) -> Result<u32> {
        if let Some(off) = self.string_offsets.get(s) {
            return Ok(*off);
        }
        let off = u32::try_from(self.strings.len()).map_err(|_| Error::TotalSizeTooLarge)?;
        self.strings.extend_from_slice(s.as_bytes());
        self.strings.push(0);
        self.string_offsets.insert(s.to_string(), off);
        Ok(off)
    }

    /// Write a property of the most recently opened node.
    pub fn set_prop<T: ToFdtPropval>(&mut self, name: &str, val: T) -> Result<()> {
        if self.node_ended {
            return Err(Error::PropertyAfterEndNode);
        }
        if name.contains('\0') {
            return Err(Error::InvalidString(name.to_string()));
        }
        let val = val.to_propval()?;
        let len = u32::try_from(val.len()).map_err(|_| Error::PropertyValueTooLarge)?;

        let nameoff = self.intern_string(name)?;
        self.append_u32(FDT_PROP);
        self.append_u32(len);
        self.append_u32(nameoff);
        self.data.extend_from_slice(&val);
        self.pad_to_tag();
        Ok(())
    }

    /// Finish writing and return the blob, packed to its minimum size.
    pub fn finish(mut self) -> Result<Fdt> {
        if self.node_depth > 0 {
            return Err(Error::UnclosedNode);
        }
        self.append_u32(FDT_END);

        let size_dt_struct = self.data.len() - self.off_dt_struct;
        let off_dt_strings = self.data.len();
        let totalsize = off_dt_strings + self.strings.len();
        let to_u32 = |v: usize| u32::try_from(v).map_err(|_| Error::TotalSizeTooLarge);

        let header = FdtHeader {
            magic: FDT_MAGIC.into(),
            totalsize: to_u32(totalsize)?.into(),
            off_dt_struct: to_u32(self.off_dt_struct)?.into(),
            off_dt_strings: to_u32(off_dt_strings)?.into(),
            off_mem_rsvmap: to_u32(self.off_mem_rsvmap)?.into(),
            version: FDT_VERSION.into(),
            last_comp_version: FDT_LAST_COMP_VERSION.into(),
            boot_cpuid_phys: self.boot_cpuid_phys.into(),
            size_dt_strings: to_u32(self.strings.len())?.into(),
            size_dt_struct: to_u32(size_dt_struct)?.into(),
        };
        self.data[..FDT_HEADER_SIZE].copy_from_slice(header.as_bytes());
        self.data.append(&mut self.strings);
        Fdt::from_blob(self.data)
    }
}
