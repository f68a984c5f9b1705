// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Owned Devicetree Blob with libfdt-compatible block management.

use log::debug;
use zerocopy::byteorder::big_endian::U32;
use zerocopy::IntoBytes;

use crate::header::align;
use crate::header::read_be64;
use crate::header::FdtHeader;
use crate::header::FdtReserveEntry;
use crate::header::FDT_FIRST_SUPPORTED_VERSION;
use crate::header::FDT_HEADER_SIZE;
use crate::header::FDT_LAST_COMP_VERSION;
use crate::header::FDT_MAGIC;
use crate::header::FDT_RSV_ENTRY_SIZE;
use crate::header::FDT_TAGSIZE;
use crate::header::FDT_VERSION;
use crate::header::SIZE_U64;
use crate::Error;
use crate::Result;

/// A Devicetree Blob held in memory.
///
/// The length of the backing buffer always equals the `totalsize` header field. Bytes between the
/// end of the strings block and `totalsize` are free space available to edits.
#[derive(Clone)]
pub struct Fdt {
    pub(crate) data: Vec<u8>,
    pub(crate) header: FdtHeader,
}

// All header values are bounded by `totalsize`, which is itself a u32.
fn set_field(field: &mut U32, value: usize) {
    field.set(value as u32);
}

impl Fdt {
    /// Take ownership of a DTB and validate its header and structure block.
    ///
    /// Bytes past the header's `totalsize` are discarded.
    pub fn from_blob(mut data: Vec<u8>) -> Result<Fdt> {
        let mut header = FdtHeader::parse(&data)?;
        if header.magic.get() != FDT_MAGIC {
            return Err(Error::BadMagic);
        }
        let version = header.version.get();
        if version < FDT_FIRST_SUPPORTED_VERSION || header.last_comp_version.get() > FDT_VERSION {
            return Err(Error::BadVersion(version));
        }

        let totalsize = header.totalsize();
        if totalsize < FDT_HEADER_SIZE || totalsize > data.len() {
            return Err(Error::Truncated);
        }
        data.truncate(totalsize);

        if header.off_mem_rsvmap() < FDT_HEADER_SIZE
            || header.off_dt_struct() < FDT_HEADER_SIZE
            || header.off_dt_struct() % FDT_TAGSIZE != 0
            || header.off_dt_struct() > totalsize
            || header.data_size() > totalsize
        {
            return Err(Error::Truncated);
        }

        if version < FDT_VERSION {
            // Version 16 headers carry no structure size; bound the walk by the strings block or
            // by the end of the blob, then record where FDT_END actually is.
            let limit = if header.off_dt_strings() > header.off_dt_struct() {
                header.off_dt_strings()
            } else {
                totalsize
            };
            let size = limit - header.off_dt_struct();
            set_field(&mut header.size_dt_struct, size);
        } else if header.off_dt_struct() + header.size_dt_struct() > totalsize {
            return Err(Error::Truncated);
        }

        let mut fdt = Fdt { data, header };
        fdt.num_mem_rsv()?;
        let struct_end = fdt.check_structure()?;
        if version < FDT_VERSION {
            set_field(&mut fdt.header.size_dt_struct, struct_end);
        }
        Ok(fdt)
    }

    /// Size of the blob in bytes, including free space.
    pub fn totalsize(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn boot_cpuid_phys(&self) -> u32 {
        self.header.boot_cpuid_phys.get()
    }

    pub fn version(&self) -> u32 {
        self.header.version.get()
    }

    /// Number of bytes the blob would occupy after [`Fdt::pack`].
    pub fn packed_size(&self) -> Result<usize> {
        let rsv_size = (self.num_mem_rsv()? + 1) * FDT_RSV_ENTRY_SIZE;
        Ok(align(FDT_HEADER_SIZE, SIZE_U64)
            + rsv_size
            + self.header.size_dt_struct()
            + self.header.size_dt_strings())
    }

    /// Number of bytes of free space between the strings block and `totalsize`.
    pub fn free_space(&self) -> usize {
        self.data.len().saturating_sub(self.header.data_size())
    }

    pub(crate) fn write_header(&mut self) {
        self.data[..FDT_HEADER_SIZE].copy_from_slice(self.header.as_bytes());
    }

    pub(crate) fn block(&self, start: usize, len: usize) -> Result<&[u8]> {
        start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or(Error::Truncated)
    }

    pub(crate) fn struct_block(&self) -> &[u8] {
        let start = self.header.off_dt_struct();
        self.block(start, self.header.size_dt_struct())
            .unwrap_or_default()
    }

    pub(crate) fn strings_block(&self) -> &[u8] {
        let start = self.header.off_dt_strings();
        self.block(start, self.header.size_dt_strings())
            .unwrap_or_default()
    }

    fn read_mem_rsv(&self, n: usize) -> Result<FdtReserveEntry> {
        let at = n
            .checked_mul(FDT_RSV_ENTRY_SIZE)
            .and_then(|o| o.checked_add(self.header.off_mem_rsvmap()))
            .ok_or(Error::Truncated)?;
        Ok(FdtReserveEntry {
            address: read_be64(&self.data, at)?,
            size: read_be64(&self.data, at + SIZE_U64)?,
        })
    }

    /// Number of entries in the memory reservation map, not counting the terminator.
    pub fn num_mem_rsv(&self) -> Result<usize> {
        let mut n = 0;
        while !self.read_mem_rsv(n)?.is_terminator() {
            n += 1;
        }
        Ok(n)
    }

    /// Get the `n`th memory reservation map entry.
    pub fn mem_rsv(&self, n: usize) -> Result<FdtReserveEntry> {
        if n >= self.num_mem_rsv()? {
            return Err(Error::NotFound);
        }
        self.read_mem_rsv(n)
    }

    /// Append an entry to the memory reservation map.
    pub fn add_mem_rsv(&mut self, entry: FdtReserveEntry) -> Result<()> {
        if entry.is_terminator() {
            return Err(Error::BadValue("empty memory reservation".to_string()));
        }
        self.rw_probe()?;
        let n = self.num_mem_rsv()?;
        self.splice_mem_rsv(n, 0, 1)?;
        let at = self.header.off_mem_rsvmap() + n * FDT_RSV_ENTRY_SIZE;
        self.data[at..at + FDT_RSV_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
        Ok(())
    }

    /// Remove the `n`th entry of the memory reservation map.
    pub fn del_mem_rsv(&mut self, n: usize) -> Result<()> {
        self.rw_probe()?;
        if n >= self.num_mem_rsv()? {
            return Err(Error::NotFound);
        }
        self.splice_mem_rsv(n, 1, 0)
    }

    /// Lay the blob out canonically in a buffer of `new_size` bytes.
    ///
    /// The header is followed by the memory reservation map, the structure block and the strings
    /// block, with all remaining space free at the end. Fails with `NoSpace` if the live data does
    /// not fit in `new_size` bytes. The result is always a version 17 blob.
    pub fn open_into(&mut self, new_size: usize) -> Result<()> {
        let rsv_size = (self.num_mem_rsv()? + 1) * FDT_RSV_ENTRY_SIZE;
        let struct_size = self.header.size_dt_struct();
        let strings_size = self.header.size_dt_strings();

        let off_rsv = align(FDT_HEADER_SIZE, SIZE_U64);
        let off_struct = off_rsv + rsv_size;
        let off_strings = off_struct + struct_size;
        let needed = off_strings + strings_size;
        if new_size < needed {
            return Err(Error::NoSpace {
                needed,
                available: new_size,
            });
        }
        u32::try_from(new_size).map_err(|_| Error::TotalSizeTooLarge)?;

        let mut data = vec![0u8; new_size];
        data[off_rsv..off_struct]
            .copy_from_slice(self.block(self.header.off_mem_rsvmap(), rsv_size)?);
        data[off_struct..off_strings]
            .copy_from_slice(self.block(self.header.off_dt_struct(), struct_size)?);
        data[off_strings..needed]
            .copy_from_slice(self.block(self.header.off_dt_strings(), strings_size)?);

        let mut header = self.header;
        set_field(&mut header.totalsize, new_size);
        set_field(&mut header.off_mem_rsvmap, off_rsv);
        set_field(&mut header.off_dt_struct, off_struct);
        set_field(&mut header.off_dt_strings, off_strings);
        set_field(&mut header.size_dt_struct, struct_size);
        header.version.set(FDT_VERSION);
        header.last_comp_version.set(FDT_LAST_COMP_VERSION);

        debug!(
            "fdt: re-laid {} byte blob into {} bytes",
            self.data.len(),
            new_size
        );
        self.data = data;
        self.header = header;
        self.write_header();
        Ok(())
    }

    /// Remove all free space from the blob.
    pub fn pack(&mut self) -> Result<()> {
        let packed_size = self.packed_size()?;
        self.open_into(packed_size)
    }

    pub(crate) fn rw_probe(&mut self) -> Result<()> {
        let version = self.header.version.get();
        if version < FDT_VERSION {
            return Err(Error::BadVersion(version));
        }
        if self.blocks_misordered()? {
            return Err(Error::BadLayout);
        }
        if version > FDT_VERSION {
            self.header.version.set(FDT_VERSION);
            self.write_header();
        }
        Ok(())
    }

    fn blocks_misordered(&self) -> Result<bool> {
        let h = &self.header;
        let rsv_end = h.off_mem_rsvmap() + (self.num_mem_rsv()? + 1) * FDT_RSV_ENTRY_SIZE;
        Ok(h.off_mem_rsvmap() < align(FDT_HEADER_SIZE, SIZE_U64)
            || h.off_dt_struct() < rsv_end
            || h.off_dt_strings() < h.off_dt_struct() + h.size_dt_struct()
            || self.data.len() < h.data_size())
    }

    /// Move everything from `at + old_len` to the end of the strings block so that it starts at
    /// `at + new_len`.
    fn splice(&mut self, at: usize, old_len: usize, new_len: usize) -> Result<()> {
        let end = self.header.data_size();
        let old_end = at.checked_add(old_len).ok_or(Error::BadOffset)?;
        if old_end > end {
            return Err(Error::BadOffset);
        }
        let needed = end - old_len + new_len;
        if needed > self.data.len() {
            return Err(Error::NoSpace {
                needed,
                available: self.data.len(),
            });
        }
        self.data.copy_within(old_end..end, at + new_len);
        if needed < end {
            self.data[needed..end].fill(0);
        }
        Ok(())
    }

    pub(crate) fn splice_mem_rsv(&mut self, n: usize, old: usize, new: usize) -> Result<()> {
        let at = self.header.off_mem_rsvmap() + n * FDT_RSV_ENTRY_SIZE;
        let old_len = old * FDT_RSV_ENTRY_SIZE;
        let new_len = new * FDT_RSV_ENTRY_SIZE;
        self.splice(at, old_len, new_len)?;
        let off_struct = self.header.off_dt_struct() + new_len - old_len;
        let off_strings = self.header.off_dt_strings() + new_len - old_len;
        set_field(&mut self.header.off_dt_struct, off_struct);
        set_field(&mut self.header.off_dt_strings, off_strings);
        self.write_header();
        Ok(())
    }

    /// Resize `old_len` bytes of the structure block at structure offset `offset` to `new_len`.
    pub(crate) fn splice_struct(&mut self, offset: usize, old_len: usize, new_len: usize) -> Result<()> {
        let at = self.header.off_dt_struct() + offset;
        self.splice(at, old_len, new_len)?;
        let size_struct = self.header.size_dt_struct() + new_len - old_len;
        let off_strings = self.header.off_dt_strings() + new_len - old_len;
        set_field(&mut self.header.size_dt_struct, size_struct);
        set_field(&mut self.header.off_dt_strings, off_strings);
        self.write_header();
        Ok(())
    }

    /// Grow the strings block by `len` bytes and return the strings offset of the new space.
    pub(crate) fn splice_string(&mut self, len: usize) -> Result<usize> {
        let at = self.header.data_size();
        self.splice(at, 0, len)?;
        let offset = self.header.size_dt_strings();
        set_field(&mut self.header.size_dt_strings, offset + len);
        self.write_header();
        Ok(offset)
    }

    /// Drop the last `len` bytes of the strings block.
    pub(crate) fn truncate_strings(&mut self, len: usize) {
        let end = self.header.data_size();
        let size = self.header.size_dt_strings().saturating_sub(len);
        set_field(&mut self.header.size_dt_strings, size);
        let new_end = self.header.data_size();
        self.data[new_end..end].fill(0);
        self.write_header();
    }

    /// Overwrite a big-endian u32 at structure offset `offset`.
    pub(crate) fn write_struct_u32(&mut self, offset: usize, value: u32) {
        let at = self.header.off_dt_struct() + offset;
        self.data[at..at + FDT_TAGSIZE].copy_from_slice(&value.to_be_bytes());
    }

    /// Overwrite bytes at structure offset `offset`.
    pub(crate) fn write_struct_bytes(&mut self, offset: usize, bytes: &[u8]) {
        let at = self.header.off_dt_struct() + offset;
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
    }
}
