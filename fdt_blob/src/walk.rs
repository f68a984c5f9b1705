// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Structure block traversal.

use crate::header::read_be32;
use crate::header::tag_align;
use crate::header::FDT_BEGIN_NODE;
use crate::header::FDT_END;
use crate::header::FDT_END_NODE;
use crate::header::FDT_NOP;
use crate::header::FDT_PROP;
use crate::header::FDT_PROP_HEADER_SIZE;
use crate::header::FDT_TAGSIZE;
use crate::header::SIZE_U32;
use crate::Error;
use crate::Fdt;
use crate::Result;
use crate::ROOT_OFFSET;

/// Outcome of advancing to the next node in document order.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// A node starts at this offset.
    Node(usize),
    /// The tracked depth dropped below zero; the offset is just past the closing `FDT_END_NODE`.
    Exit(usize),
    /// `FDT_END` was reached.
    End,
}

/// Compare a node name against a path component. A component without a unit address also
/// matches a node name that has one.
pub(crate) fn nodename_eq(name: &str, component: &str) -> bool {
    match name.strip_prefix(component) {
        Some("") => true,
        Some(rest) => rest.starts_with('@') && !component.contains('@'),
        None => false,
    }
}

pub(crate) fn stringlist_contains(list: &[u8], s: &str) -> bool {
    let list = list.strip_suffix(&[0]).unwrap_or(list);
    list.split(|&b| b == 0).any(|entry| entry == s.as_bytes())
}

fn c_str(bytes: &[u8]) -> Result<&str> {
    let len = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::Truncated)?;
    std::str::from_utf8(&bytes[..len]).map_err(|_| Error::BadStructure)
}

impl Fdt {
    /// Read the tag at `offset` and return it along with the offset of the following tag.
    pub(crate) fn next_tag(&self, offset: usize) -> Result<(u32, usize)> {
        let block = self.struct_block();
        let tag = read_be32(block, offset)?;
        let next = match tag {
            FDT_BEGIN_NODE => {
                let name = block.get(offset + FDT_TAGSIZE..).ok_or(Error::Truncated)?;
                let name_len = name
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(Error::Truncated)?;
                offset + FDT_TAGSIZE + name_len + 1
            }
            FDT_PROP => {
                let len = read_be32(block, offset + SIZE_U32)? as usize;
                offset + FDT_PROP_HEADER_SIZE + len
            }
            FDT_END_NODE | FDT_NOP | FDT_END => offset + FDT_TAGSIZE,
            _ => return Err(Error::BadStructure),
        };
        let next = tag_align(next);
        if next > block.len() {
            return Err(Error::Truncated);
        }
        Ok((tag, next))
    }

    fn check_tag_offset(&self, offset: usize, expected: u32) -> Result<usize> {
        if offset % FDT_TAGSIZE != 0 {
            return Err(Error::BadOffset);
        }
        match self.next_tag(offset) {
            Ok((tag, next)) if tag == expected => Ok(next),
            _ => Err(Error::BadOffset),
        }
    }

    pub(crate) fn check_node_offset(&self, offset: usize) -> Result<usize> {
        self.check_tag_offset(offset, FDT_BEGIN_NODE)
    }

    pub(crate) fn check_prop_offset(&self, offset: usize) -> Result<usize> {
        self.check_tag_offset(offset, FDT_PROP)
    }

    /// Walk the whole structure block once. Returns the offset just past `FDT_END`.
    pub(crate) fn check_structure(&self) -> Result<usize> {
        let mut offset = ROOT_OFFSET;
        let mut depth = 0i32;
        let mut root_closed = false;
        loop {
            let (tag, next) = self.next_tag(offset)?;
            match tag {
                FDT_BEGIN_NODE => {
                    if depth == 0 && offset != ROOT_OFFSET {
                        return Err(Error::BadStructure);
                    }
                    depth += 1;
                }
                FDT_END_NODE => {
                    depth -= 1;
                    if depth < 0 {
                        return Err(Error::BadStructure);
                    }
                    root_closed = depth == 0;
                }
                FDT_PROP => {
                    if depth == 0 {
                        return Err(Error::BadStructure);
                    }
                    self.property_at(offset)?;
                }
                FDT_END => {
                    return if root_closed && depth == 0 {
                        Ok(next)
                    } else {
                        Err(Error::BadStructure)
                    };
                }
                _ => {}
            }
            if offset == ROOT_OFFSET && tag != FDT_BEGIN_NODE {
                return Err(Error::BadStructure);
            }
            offset = next;
        }
    }

    /// Advance to the next `FDT_BEGIN_NODE` after the node at `offset`, or start from the root if
    /// `offset` is `None`. When `depth` is given it tracks nesting relative to the starting node.
    pub(crate) fn next_node(&self, offset: Option<usize>, mut depth: Option<&mut i32>) -> Result<Step> {
        let mut next = match offset {
            Some(offset) => self.check_node_offset(offset)?,
            None => ROOT_OFFSET,
        };
        loop {
            let offset = next;
            let (tag, after) = self.next_tag(offset)?;
            next = after;
            match tag {
                FDT_BEGIN_NODE => {
                    if let Some(d) = depth.as_deref_mut() {
                        *d += 1;
                    }
                    return Ok(Step::Node(offset));
                }
                FDT_END_NODE => {
                    if let Some(d) = depth.as_deref_mut() {
                        *d -= 1;
                        if *d < 0 {
                            return Ok(Step::Exit(next));
                        }
                    }
                }
                FDT_END => return Ok(Step::End),
                _ => {}
            }
        }
    }

    pub(crate) fn first_subnode(&self, offset: usize) -> Result<Option<usize>> {
        let mut depth = 0;
        match self.next_node(Some(offset), Some(&mut depth))? {
            Step::Node(child) if depth == 1 => Ok(Some(child)),
            _ => Ok(None),
        }
    }

    pub(crate) fn next_subnode(&self, offset: usize) -> Result<Option<usize>> {
        let mut depth = 1;
        let mut offset = offset;
        loop {
            match self.next_node(Some(offset), Some(&mut depth))? {
                Step::Node(next) if depth == 1 => return Ok(Some(next)),
                Step::Node(next) if depth > 1 => offset = next,
                _ => return Ok(None),
            }
        }
    }

    /// Offset just past the `FDT_END_NODE` that closes the node at `offset`.
    pub(crate) fn node_end_offset(&self, offset: usize) -> Result<usize> {
        let mut depth = 0;
        let mut offset = offset;
        loop {
            match self.next_node(Some(offset), Some(&mut depth))? {
                Step::Node(next) => offset = next,
                Step::Exit(end) => return Ok(end),
                Step::End => return Err(Error::BadStructure),
            }
        }
    }

    pub(crate) fn get_name(&self, offset: usize) -> Result<&str> {
        self.check_node_offset(offset)?;
        let name = self
            .struct_block()
            .get(offset + FDT_TAGSIZE..)
            .ok_or(Error::Truncated)?;
        c_str(name)
    }

    pub(crate) fn subnode_offset(&self, parent: usize, name: &str) -> Result<Option<usize>> {
        let mut child = self.first_subnode(parent)?;
        while let Some(offset) = child {
            if nodename_eq(self.get_name(offset)?, name) {
                return Ok(Some(offset));
            }
            child = self.next_subnode(offset)?;
        }
        Ok(None)
    }

    /// Resolve an absolute path such as `/cpus/cpu@0` to a node offset.
    ///
    /// Returns `Ok(None)` if any component is missing.
    pub fn path_offset(&self, path: &str) -> Result<Option<usize>> {
        if !path.starts_with('/') {
            return Err(Error::BadPath(path.to_string()));
        }
        self.check_node_offset(ROOT_OFFSET)?;
        let mut offset = ROOT_OFFSET;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            match self.subnode_offset(offset, component)? {
                Some(child) => offset = child,
                None => return Ok(None),
            }
        }
        Ok(Some(offset))
    }

    pub(crate) fn string_at(&self, offset: usize) -> Result<&str> {
        let bytes = self.strings_block().get(offset..).ok_or(Error::BadOffset)?;
        c_str(bytes)
    }

    /// Name and value of the property at `offset`.
    pub(crate) fn property_at(&self, offset: usize) -> Result<(&str, &[u8])> {
        let block = self.struct_block();
        let len = read_be32(block, offset + SIZE_U32)? as usize;
        let nameoff = read_be32(block, offset + 2 * SIZE_U32)? as usize;
        let start = offset + FDT_PROP_HEADER_SIZE;
        let value = block.get(start..start + len).ok_or(Error::Truncated)?;
        Ok((self.string_at(nameoff)?, value))
    }

    fn property_from(&self, mut offset: usize) -> Result<Option<usize>> {
        loop {
            let (tag, next) = self.next_tag(offset)?;
            match tag {
                FDT_NOP => offset = next,
                FDT_PROP => return Ok(Some(offset)),
                _ => return Ok(None),
            }
        }
    }

    pub(crate) fn first_property_offset(&self, node: usize) -> Result<Option<usize>> {
        let next = self.check_node_offset(node)?;
        self.property_from(next)
    }

    pub(crate) fn next_property_offset(&self, prop: usize) -> Result<Option<usize>> {
        let next = self.check_prop_offset(prop)?;
        self.property_from(next)
    }

    pub(crate) fn property_offset(&self, node: usize, name: &str) -> Result<Option<usize>> {
        let mut prop = self.first_property_offset(node)?;
        while let Some(offset) = prop {
            if self.property_at(offset)?.0 == name {
                return Ok(Some(offset));
            }
            prop = self.next_property_offset(offset)?;
        }
        Ok(None)
    }

    pub(crate) fn getprop(&self, node: usize, name: &str) -> Result<Option<&[u8]>> {
        self.property_offset(node, name)?
            .map(|prop| self.property_at(prop).map(|(_, value)| value))
            .transpose()
    }

    pub(crate) fn node_is_compatible(&self, node: usize, compatible: &str) -> Result<bool> {
        Ok(self
            .getprop(node, "compatible")?
            .is_some_and(|list| stringlist_contains(list, compatible)))
    }

    fn find_node_from<F>(&self, start: Option<usize>, mut matches: F) -> Result<Option<usize>>
    where
        F: FnMut(usize) -> Result<bool>,
    {
        let mut offset = start;
        loop {
            match self.next_node(offset, None)? {
                Step::Node(node) => {
                    if matches(node)? {
                        return Ok(Some(node));
                    }
                    offset = Some(node);
                }
                _ => return Ok(None),
            }
        }
    }

    /// Find the first node after `start` in document order whose `compatible` list contains
    /// `compatible`. A `start` of `None` includes the root node in the search.
    pub fn node_offset_by_compatible(
        &self,
        start: Option<usize>,
        compatible: &str,
    ) -> Result<Option<usize>> {
        self.find_node_from(start, |node| self.node_is_compatible(node, compatible))
    }

    /// Find the first node after `start` in document order holding property `name` with exactly
    /// `value` as its contents.
    pub fn node_offset_by_prop_value(
        &self,
        start: Option<usize>,
        name: &str,
        value: &[u8],
    ) -> Result<Option<usize>> {
        self.find_node_from(start, |node| {
            Ok(self.getprop(node, name)?.is_some_and(|v| v == value))
        })
    }
}
