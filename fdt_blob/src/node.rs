// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Borrowed node handles.
//!
//! A handle pairs a node offset with a borrow of the blob it belongs to. Shared handles
//! ([`FdtNode`]) can be freely copied around for reading; an exclusive handle ([`FdtNodeMut`])
//! is the only way to edit the tree, so no stale offset can outlive the edit that invalidates it.

use std::fmt;

use crate::propval::FromFdtPropval;
use crate::propval::ToFdtPropval;
use crate::Error;
use crate::Fdt;
use crate::Result;
use crate::ROOT_OFFSET;

impl Fdt {
    /// Get a read handle for the node at `offset`.
    pub fn node_at(&self, offset: usize) -> Result<FdtNode<'_>> {
        self.check_node_offset(offset)?;
        Ok(FdtNode { fdt: self, offset })
    }

    /// Get an edit handle for the node at `offset`.
    pub fn node_at_mut(&mut self, offset: usize) -> Result<FdtNodeMut<'_>> {
        self.check_node_offset(offset)?;
        Ok(FdtNodeMut { fdt: self, offset })
    }

    pub fn root(&self) -> Result<FdtNode<'_>> {
        self.node_at(ROOT_OFFSET)
    }

    pub fn root_mut(&mut self) -> Result<FdtNodeMut<'_>> {
        self.node_at_mut(ROOT_OFFSET)
    }

    /// Look up a node by absolute path.
    pub fn node(&self, path: &str) -> Result<Option<FdtNode<'_>>> {
        self.path_offset(path)?
            .map(|offset| self.node_at(offset))
            .transpose()
    }

    /// Look up a node by absolute path for editing.
    pub fn node_mut(&mut self, path: &str) -> Result<Option<FdtNodeMut<'_>>> {
        match self.path_offset(path)? {
            Some(offset) => self.node_at_mut(offset).map(Some),
            None => Ok(None),
        }
    }

    /// First node after `start` (or anywhere, including the root, if `start` is `None`) that is
    /// compatible with `compatible`.
    pub fn node_by_compatible(
        &self,
        start: Option<usize>,
        compatible: &str,
    ) -> Result<Option<FdtNode<'_>>> {
        self.node_offset_by_compatible(start, compatible)?
            .map(|offset| self.node_at(offset))
            .transpose()
    }

    /// First node after `start` holding property `name` set to exactly `value`.
    pub fn node_by_prop_value(
        &self,
        start: Option<usize>,
        name: &str,
        value: &[u8],
    ) -> Result<Option<FdtNode<'_>>> {
        self.node_offset_by_prop_value(start, name, value)?
            .map(|offset| self.node_at(offset))
            .transpose()
    }
}

/// Read-only view of a node.
#[derive(Clone, Copy)]
pub struct FdtNode<'a> {
    fdt: &'a Fdt,
    offset: usize,
}

impl<'a> FdtNode<'a> {
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Node name including any unit address, e.g. `cpu@0`. The root node's name is empty.
    pub fn name(&self) -> Result<&'a str> {
        self.fdt.get_name(self.offset)
    }

    /// Raw value of property `name`, or `None` if the node has no such property.
    pub fn getprop(&self, name: &str) -> Result<Option<&'a [u8]>> {
        self.fdt.getprop(self.offset, name)
    }

    /// Decode property `name` as `T`. Fails with `BadValue` if the property is present but does
    /// not decode.
    pub fn get_prop<T: FromFdtPropval>(&self, name: &str) -> Result<Option<T>> {
        match self.getprop(name)? {
            Some(value) => T::from_propval(value)
                .map(Some)
                .ok_or_else(|| Error::BadValue(format!("property {name}"))),
            None => Ok(None),
        }
    }

    /// All properties of the node in blob order.
    pub fn properties(&self) -> Result<Vec<(&'a str, &'a [u8])>> {
        let mut props = Vec::new();
        let mut prop = self.fdt.first_property_offset(self.offset)?;
        while let Some(offset) = prop {
            props.push(self.fdt.property_at(offset)?);
            prop = self.fdt.next_property_offset(offset)?;
        }
        Ok(props)
    }

    /// Direct children of the node in blob order.
    pub fn subnodes(&self) -> Result<Vec<FdtNode<'a>>> {
        let mut nodes = Vec::new();
        let mut child = self.fdt.first_subnode(self.offset)?;
        while let Some(offset) = child {
            nodes.push(FdtNode {
                fdt: self.fdt,
                offset,
            });
            child = self.fdt.next_subnode(offset)?;
        }
        Ok(nodes)
    }

    pub fn subnode(&self, name: &str) -> Result<Option<FdtNode<'a>>> {
        Ok(self
            .fdt
            .subnode_offset(self.offset, name)?
            .map(|offset| FdtNode {
                fdt: self.fdt,
                offset,
            }))
    }

    pub fn is_compatible(&self, compatible: &str) -> Result<bool> {
        self.fdt.node_is_compatible(self.offset, compatible)
    }
}

impl fmt::Debug for FdtNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FdtNode")
            .field("offset", &self.offset)
            .field("name", &self.name().ok())
            .finish()
    }
}

/// Exclusive handle used to edit a node.
///
/// Property edits keep the handle valid. Structural edits that may move the node consume it.
pub struct FdtNodeMut<'a> {
    fdt: &'a mut Fdt,
    offset: usize,
}

impl<'a> FdtNodeMut<'a> {
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Reborrow as a read handle.
    pub fn as_node(&self) -> FdtNode<'_> {
        FdtNode {
            fdt: &*self.fdt,
            offset: self.offset,
        }
    }

    pub fn name(&self) -> Result<&str> {
        self.fdt.get_name(self.offset)
    }

    pub fn getprop(&self, name: &str) -> Result<Option<&[u8]>> {
        self.fdt.getprop(self.offset, name)
    }

    /// Create or replace property `name` with raw bytes.
    pub fn setprop(&mut self, name: &str, value: &[u8]) -> Result<()> {
        self.fdt.setprop(self.offset, name, value)
    }

    /// Create or replace property `name`, encoding `value` as an FDT property value.
    pub fn set_prop<T: ToFdtPropval>(&mut self, name: &str, value: T) -> Result<()> {
        let value = value.to_propval()?;
        self.setprop(name, &value)
    }

    /// Overwrite an existing property with a value of the same length.
    pub fn setprop_inplace(&mut self, name: &str, value: &[u8]) -> Result<()> {
        self.fdt.setprop_inplace(self.offset, name, value)
    }

    pub fn delprop(&mut self, name: &str) -> Result<()> {
        self.fdt.delprop(self.offset, name)
    }

    /// Hide property `name` behind `FDT_NOP` tags without moving any other data.
    pub fn nop_property(&mut self, name: &str) -> Result<()> {
        self.fdt.nop_property(self.offset, name)
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.fdt.set_name(self.offset, name)
    }

    /// Add an empty child node and return a handle to it.
    pub fn add_subnode(self, name: &str) -> Result<FdtNodeMut<'a>> {
        let offset = self.fdt.add_subnode(self.offset, name)?;
        Ok(FdtNodeMut {
            fdt: self.fdt,
            offset,
        })
    }

    /// Remove the node and its subtree.
    pub fn delete(self) -> Result<()> {
        self.fdt.del_node(self.offset)
    }
}

impl fmt::Debug for FdtNodeMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FdtNodeMut")
            .field("offset", &self.offset)
            .field("name", &self.name().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FdtWriter;

    fn base() -> Fdt {
        let mut w = FdtWriter::new(&[]);
        let root = w.begin_node("").unwrap();
        w.set_prop("#address-cells", 2u32).unwrap();
        w.set_prop("#size-cells", 2u32).unwrap();
        let chosen = w.begin_node("chosen").unwrap();
        w.end_node(chosen).unwrap();
        w.end_node(root).unwrap();
        let mut fdt = w.finish().unwrap();
        fdt.open_into(0x1000).unwrap();
        fdt
    }

    #[test]
    fn build_subtree_through_handles() {
        let mut fdt = base();
        let mut timer = fdt.root_mut().unwrap().add_subnode("timer").unwrap();
        timer.set_prop("compatible", "arm,armv8-timer").unwrap();
        timer
            .set_prop("interrupts", [1u32, 0xd, 4, 1, 0xe, 4])
            .unwrap();
        timer.set_prop("always-on", ()).unwrap();

        let timer = fdt.node("/timer").unwrap().unwrap();
        assert_eq!(timer.name().unwrap(), "timer");
        assert!(timer.is_compatible("arm,armv8-timer").unwrap());
        assert_eq!(
            timer.get_prop::<Vec<u32>>("interrupts").unwrap(),
            Some(vec![1, 0xd, 4, 1, 0xe, 4])
        );
        let names: Vec<&str> = timer
            .properties()
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["always-on", "interrupts", "compatible"]);
    }

    #[test]
    fn read_handles() {
        let fdt = base();
        let root = fdt.root().unwrap();
        assert_eq!(root.name().unwrap(), "");
        assert_eq!(root.get_prop::<u32>("#size-cells").unwrap(), Some(2));
        assert_eq!(root.get_prop::<u32>("missing").unwrap(), None);
        assert!(matches!(
            root.get_prop::<u64>("#size-cells"),
            Err(Error::BadValue(_))
        ));
        let children = root.subnodes().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name().unwrap(), "chosen");
        assert!(root.subnode("chosen").unwrap().is_some());
        assert!(root.subnode("cpus").unwrap().is_none());
        assert!(fdt.node_at(4).is_err());
    }

    #[test]
    fn rename_and_delete() {
        let mut fdt = base();
        let mut chosen = fdt.node_mut("/chosen").unwrap().unwrap();
        chosen.set_prop("bootargs", "quiet").unwrap();
        chosen.set_name("chosen-renamed").unwrap();
        assert_eq!(chosen.name().unwrap(), "chosen-renamed");
        assert_eq!(chosen.getprop("bootargs").unwrap(), Some(&b"quiet\0"[..]));

        fdt.node_mut("/chosen-renamed")
            .unwrap()
            .unwrap()
            .delete()
            .unwrap();
        assert!(fdt.node("/chosen-renamed").unwrap().is_none());
        assert!(fdt.node_mut("/chosen").unwrap().is_none());
    }

    #[test]
    fn lookup_by_value() {
        let mut fdt = base();
        let mut memory = fdt.root_mut().unwrap().add_subnode("memory@0").unwrap();
        memory.set_prop("device_type", "memory").unwrap();
        let offset = memory.offset();

        let found = fdt
            .node_by_prop_value(None, "device_type", b"memory\0")
            .unwrap()
            .unwrap();
        assert_eq!(found.offset(), offset);
        assert!(fdt
            .node_by_compatible(None, "arm,gic-400")
            .unwrap()
            .is_none());
    }

    #[test]
    fn handles_debug_print_offset_and_name() {
        let mut fdt = base();
        let chosen = fdt.node("/chosen").unwrap().unwrap();
        let offset = chosen.offset();
        assert_eq!(
            format!("{:?}", chosen),
            format!("FdtNode {{ offset: {}, name: Some(\"chosen\") }}", offset)
        );
        let chosen = fdt.node_mut("/chosen").unwrap().unwrap();
        assert_eq!(
            format!("{:?}", chosen),
            format!("FdtNodeMut {{ offset: {}, name: Some(\"chosen\") }}", offset)
        );
        assert_eq!(
            format!("{:?}", fdt.root().unwrap()),
            "FdtNode { offset: 0, name: Some(\"\") }"
        );
    }
}
