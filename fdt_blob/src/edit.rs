// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! In-place structure edits, mirroring libfdt's read-write and write-in-place functions.

use crate::header::read_be32;
use crate::header::tag_align;
use crate::header::FDT_BEGIN_NODE;
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

fn check_node_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['\0', '/']) {
        return Err(Error::InvalidString(name.to_string()));
    }
    Ok(())
}

fn check_prop_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('\0') {
        return Err(Error::InvalidString(name.to_string()));
    }
    Ok(())
}

impl Fdt {
    fn prop_len(&self, prop: usize) -> Result<usize> {
        Ok(read_be32(self.struct_block(), prop + SIZE_U32)? as usize)
    }

    /// Strings offset of `s`, possibly as the tail of a longer string.
    pub(crate) fn find_string(&self, s: &str) -> Option<usize> {
        let needle: Vec<u8> = s.bytes().chain(std::iter::once(0)).collect();
        self.strings_block()
            .windows(needle.len())
            .position(|window| window == needle.as_slice())
    }

    /// Returns the strings offset of `s` and whether it had to be appended.
    fn find_add_string(&mut self, s: &str) -> Result<(usize, bool)> {
        if let Some(offset) = self.find_string(s) {
            return Ok((offset, false));
        }
        let offset = self.splice_string(s.len() + 1)?;
        let at = self.header.off_dt_strings() + offset;
        self.data[at..at + s.len()].copy_from_slice(s.as_bytes());
        self.data[at + s.len()] = 0;
        Ok((offset, true))
    }

    fn resize_property(&mut self, node: usize, name: &str, len: u32) -> Result<Option<usize>> {
        let Some(prop) = self.property_offset(node, name)? else {
            return Ok(None);
        };
        let old_len = self.prop_len(prop)?;
        self.splice_struct(
            prop + FDT_PROP_HEADER_SIZE,
            tag_align(old_len),
            tag_align(len as usize),
        )?;
        self.write_struct_u32(prop + SIZE_U32, len);
        Ok(Some(prop))
    }

    fn add_property(&mut self, node: usize, name: &str, len: u32) -> Result<usize> {
        let prop = self.check_node_offset(node)?;
        let (nameoff, added) = self.find_add_string(name)?;
        let prop_size = FDT_PROP_HEADER_SIZE + tag_align(len as usize);
        if let Err(e) = self.splice_struct(prop, 0, prop_size) {
            if added {
                self.truncate_strings(name.len() + 1);
            }
            return Err(e);
        }
        self.write_struct_u32(prop, FDT_PROP);
        self.write_struct_u32(prop + SIZE_U32, len);
        self.write_struct_u32(prop + 2 * SIZE_U32, nameoff as u32);
        Ok(prop)
    }

    /// Create or replace property `name` of `node`. New properties are placed first in the node.
    pub(crate) fn setprop(&mut self, node: usize, name: &str, value: &[u8]) -> Result<()> {
        self.rw_probe()?;
        check_prop_name(name)?;
        let len = u32::try_from(value.len()).map_err(|_| Error::PropertyValueTooLarge)?;
        let prop = match self.resize_property(node, name, len)? {
            Some(prop) => prop,
            None => self.add_property(node, name, len)?,
        };
        let padded = tag_align(value.len());
        let mut bytes = value.to_vec();
        bytes.resize(padded, 0);
        self.write_struct_bytes(prop + FDT_PROP_HEADER_SIZE, &bytes);
        Ok(())
    }

    /// Overwrite the value of an existing property without changing its size.
    pub(crate) fn setprop_inplace(&mut self, node: usize, name: &str, value: &[u8]) -> Result<()> {
        let prop = self.property_offset(node, name)?.ok_or(Error::NotFound)?;
        let len = self.prop_len(prop)?;
        if len != value.len() {
            return Err(Error::NoSpace {
                needed: value.len(),
                available: len,
            });
        }
        self.write_struct_bytes(prop + FDT_PROP_HEADER_SIZE, value);
        Ok(())
    }

    pub(crate) fn delprop(&mut self, node: usize, name: &str) -> Result<()> {
        self.rw_probe()?;
        let prop = self.property_offset(node, name)?.ok_or(Error::NotFound)?;
        let len = self.prop_len(prop)?;
        self.splice_struct(prop, FDT_PROP_HEADER_SIZE + tag_align(len), 0)
    }

    /// Replace a property with `FDT_NOP` tags, leaving the rest of the blob where it is.
    pub(crate) fn nop_property(&mut self, node: usize, name: &str) -> Result<()> {
        let prop = self.property_offset(node, name)?.ok_or(Error::NotFound)?;
        let len = self.prop_len(prop)?;
        let words = (FDT_PROP_HEADER_SIZE + tag_align(len)) / FDT_TAGSIZE;
        for word in 0..words {
            self.write_struct_u32(prop + word * FDT_TAGSIZE, FDT_NOP);
        }
        Ok(())
    }

    /// Insert an empty node called `name` as the first child of `parent`.
    pub(crate) fn add_subnode(&mut self, parent: usize, name: &str) -> Result<usize> {
        self.rw_probe()?;
        check_node_name(name)?;
        if self.subnode_offset(parent, name)?.is_some() {
            return Err(Error::Exists(name.to_string()));
        }

        // Place the new node after the parent's properties.
        let mut offset = self.check_node_offset(parent)?;
        loop {
            let (tag, next) = self.next_tag(offset)?;
            if tag != FDT_PROP && tag != FDT_NOP {
                break;
            }
            offset = next;
        }

        let name_size = tag_align(name.len() + 1);
        let node_size = FDT_TAGSIZE + name_size + FDT_TAGSIZE;
        self.splice_struct(offset, 0, node_size)?;

        let mut bytes = Vec::with_capacity(node_size);
        bytes.extend_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
        bytes.extend_from_slice(name.as_bytes());
        bytes.resize(FDT_TAGSIZE + name_size, 0);
        bytes.extend_from_slice(&FDT_END_NODE.to_be_bytes());
        self.write_struct_bytes(offset, &bytes);
        Ok(offset)
    }

    /// Remove a node and its whole subtree.
    pub(crate) fn del_node(&mut self, node: usize) -> Result<()> {
        self.rw_probe()?;
        if node == ROOT_OFFSET {
            return Err(Error::BadOffset);
        }
        let end = self.node_end_offset(node)?;
        self.splice_struct(node, end - node, 0)
    }

    pub(crate) fn set_name(&mut self, node: usize, name: &str) -> Result<()> {
        self.rw_probe()?;
        check_node_name(name)?;
        let old_len = self.get_name(node)?.len();
        let at = node + FDT_TAGSIZE;
        let new_size = tag_align(name.len() + 1);
        self.splice_struct(at, tag_align(old_len + 1), new_size)?;
        let mut bytes = name.as_bytes().to_vec();
        bytes.resize(new_size, 0);
        self.write_struct_bytes(at, &bytes);
        Ok(())
    }
}
