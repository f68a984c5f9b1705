// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! On-disk layout of the Devicetree Blob header and memory reservation map, as defined here:
//! <https://devicetree-specification.readthedocs.io/en/stable/flattened-format.html>

use zerocopy::byteorder::big_endian::U32;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

use crate::Error;
use crate::Result;

pub const FDT_MAGIC: u32 = 0xd00dfeed;

pub(crate) const FDT_HEADER_SIZE: usize = 40;
pub(crate) const FDT_VERSION: u32 = 17;
pub(crate) const FDT_LAST_COMP_VERSION: u32 = 16;
pub(crate) const FDT_FIRST_SUPPORTED_VERSION: u32 = 16;

pub(crate) const FDT_BEGIN_NODE: u32 = 0x00000001;
pub(crate) const FDT_END_NODE: u32 = 0x00000002;
pub(crate) const FDT_PROP: u32 = 0x00000003;
pub(crate) const FDT_NOP: u32 = 0x00000004;
pub(crate) const FDT_END: u32 = 0x00000009;

pub(crate) const SIZE_U32: usize = std::mem::size_of::<u32>();
pub(crate) const SIZE_U64: usize = std::mem::size_of::<u64>();

pub(crate) const FDT_TAGSIZE: usize = SIZE_U32;
// tag + len + nameoff
pub(crate) const FDT_PROP_HEADER_SIZE: usize = 3 * SIZE_U32;
pub(crate) const FDT_RSV_ENTRY_SIZE: usize = 2 * SIZE_U64;

/// Round `value` up to the next multiple of `alignment` (a power of two).
pub(crate) fn align(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

pub(crate) fn tag_align(value: usize) -> usize {
    align(value, FDT_TAGSIZE)
}

pub(crate) fn read_be32(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = offset
        .checked_add(SIZE_U32)
        .and_then(|end| data.get(offset..end))
        .ok_or(Error::Truncated)?;
    let bytes: [u8; SIZE_U32] = bytes.try_into().map_err(|_| Error::Truncated)?;
    Ok(u32::from_be_bytes(bytes))
}

pub(crate) fn read_be64(data: &[u8], offset: usize) -> Result<u64> {
    let bytes = offset
        .checked_add(SIZE_U64)
        .and_then(|end| data.get(offset..end))
        .ok_or(Error::Truncated)?;
    let bytes: [u8; SIZE_U64] = bytes.try_into().map_err(|_| Error::Truncated)?;
    Ok(u64::from_be_bytes(bytes))
}

/// Raw big-endian blob header.
#[derive(Clone, Copy, Debug, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
pub(crate) struct FdtHeader {
    pub magic: U32,
    pub totalsize: U32,
    pub off_dt_struct: U32,
    pub off_dt_strings: U32,
    pub off_mem_rsvmap: U32,
    pub version: U32,
    pub last_comp_version: U32,
    pub boot_cpuid_phys: U32,
    pub size_dt_strings: U32,
    pub size_dt_struct: U32,
}

impl FdtHeader {
    pub fn parse(data: &[u8]) -> Result<FdtHeader> {
        let (header, _) = FdtHeader::read_from_prefix(data).map_err(|_| Error::Truncated)?;
        Ok(header)
    }

    pub fn totalsize(&self) -> usize {
        self.totalsize.get() as usize
    }

    pub fn off_dt_struct(&self) -> usize {
        self.off_dt_struct.get() as usize
    }

    pub fn off_dt_strings(&self) -> usize {
        self.off_dt_strings.get() as usize
    }

    pub fn off_mem_rsvmap(&self) -> usize {
        self.off_mem_rsvmap.get() as usize
    }

    pub fn size_dt_strings(&self) -> usize {
        self.size_dt_strings.get() as usize
    }

    pub fn size_dt_struct(&self) -> usize {
        self.size_dt_struct.get() as usize
    }

    /// End of the strings block, i.e. the number of bytes of the blob holding live data.
    pub fn data_size(&self) -> usize {
        self.off_dt_strings() + self.size_dt_strings()
    }
}

/// Reserved physical memory region.
///
/// This represents an area of physical memory reserved by the firmware and unusable by the OS.
/// For example, this could be used to preserve bootloader code or data used at runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FdtReserveEntry {
    /// Physical address of the beginning of the reserved region.
    pub address: u64,
    /// Size of the reserved region in bytes.
    pub size: u64,
}

impl FdtReserveEntry {
    pub(crate) fn is_terminator(&self) -> bool {
        self.address == 0 && self.size == 0
    }

    pub(crate) fn to_bytes(self) -> [u8; FDT_RSV_ENTRY_SIZE] {
        let mut bytes = [0u8; FDT_RSV_ENTRY_SIZE];
        bytes[..SIZE_U64].copy_from_slice(&self.address.to_be_bytes());
        bytes[SIZE_U64..].copy_from_slice(&self.size.to_be_bytes());
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment() {
        assert_eq!(align(0, 8), 0);
        assert_eq!(align(40, 8), 40);
        assert_eq!(align(41, 8), 48);
        assert_eq!(tag_align(5), 8);
        assert_eq!(tag_align(12), 12);
    }

    #[test]
    fn header_size_matches_layout() {
        assert_eq!(std::mem::size_of::<FdtHeader>(), FDT_HEADER_SIZE);
    }

    #[test]
    fn parse_short_header() {
        assert_eq!(FdtHeader::parse(&[0xd0, 0x0d]).unwrap_err(), Error::Truncated);
    }

    #[test]
    fn big_endian_reads() {
        let data = [0x12u8, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0];
        assert_eq!(read_be32(&data, 0).unwrap(), 0x12345678);
        assert_eq!(read_be32(&data, 4).unwrap(), 0x9abcdef0);
        assert_eq!(read_be64(&data, 0).unwrap(), 0x123456789abcdef0);
        assert_eq!(read_be32(&data, 6).unwrap_err(), Error::Truncated);
        assert_eq!(read_be32(&data, usize::MAX).unwrap_err(), Error::Truncated);
    }

    #[test]
    fn reserve_entry_bytes() {
        let entry = FdtReserveEntry {
            address: 0x8000_0000,
            size: 0x1000,
        };
        assert_eq!(
            entry.to_bytes(),
            [0, 0, 0, 0, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0]
        );
        assert!(FdtReserveEntry::default().is_terminator());
    }
}
