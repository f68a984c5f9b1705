// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Records shared between the hypervisor and the service VM that backs mediated devices.
//!
//! Every type here is a `#[repr(C)]` layout exchanged verbatim through shared memory, so field
//! order and sizes must not change. Integer fields are in the native byte order of the host.

use enumn::N;
use remain::sorted;
use static_assertions::const_assert_eq;
use thiserror::Error as ThisError;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

/// Maximum number of VMs described by a [`VmInfoList`].
pub const VM_NUM_MAX: usize = 8;

/// Capacity of a [`NameBuf`], including the terminating NUL.
pub const NAME_MAX_LEN: usize = 32;

#[sorted]
#[derive(ThisError, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("shared buffer of {0} bytes cannot hold the record")]
    InvalidBuffer(usize),
    #[error("name contains a NUL byte")]
    NameContainsNul,
    #[error("name is {0} bytes long, at most {} allowed", NAME_MAX_LEN - 1)]
    NameTooLong(usize),
    #[error("VM list already holds {} entries", VM_NUM_MAX)]
    VmListFull,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fixed-capacity, NUL-terminated name.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
pub struct NameBuf([u8; NAME_MAX_LEN]);

impl NameBuf {
    /// Build a name. There must be room left for the terminating NUL.
    pub fn new(name: &str) -> Result<NameBuf> {
        if name.contains('\0') {
            return Err(Error::NameContainsNul);
        }
        if name.len() >= NAME_MAX_LEN {
            return Err(Error::NameTooLong(name.len()));
        }
        let mut buf = [0u8; NAME_MAX_LEN];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        Ok(NameBuf(buf))
    }

    /// Bytes before the first NUL.
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .0
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_MAX_LEN);
        &self.0[..len]
    }

    /// The name as text, or `None` if the peer wrote something that isn't UTF-8.
    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(self.name_bytes()).ok()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, N)]
#[repr(u32)]
pub enum VmType {
    Os = 0,
    BareMetal = 1,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, N)]
#[repr(u32)]
pub enum VmState {
    Inv = 0,
    Pending = 1,
    Active = 2,
}

/// Identity of one VM.
#[derive(Copy, Clone, Debug, Default, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
pub struct VmInfo {
    pub id: u32,
    pub vm_name: NameBuf,
    pub vm_type: u32,
    pub vm_state: u32,
}

impl VmInfo {
    pub fn new(id: u32, name: &str, vm_type: VmType, vm_state: VmState) -> Result<VmInfo> {
        Ok(VmInfo {
            id,
            vm_name: NameBuf::new(name)?,
            vm_type: vm_type as u32,
            vm_state: vm_state as u32,
        })
    }

    /// Decoded `vm_type`, or `None` for an unknown value.
    pub fn vm_type(&self) -> Option<VmType> {
        VmType::n(self.vm_type)
    }

    /// Decoded `vm_state`, or `None` for an unknown value.
    pub fn vm_state(&self) -> Option<VmState> {
        VmState::n(self.vm_state)
    }
}

/// Identities of all VMs, as reported to the service VM.
#[derive(Copy, Clone, Debug, Default, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
pub struct VmInfoList {
    pub vm_num: u64,
    pub info_list: [VmInfo; VM_NUM_MAX],
}

impl VmInfoList {
    pub fn push(&mut self, info: VmInfo) -> Result<()> {
        let n = self.len();
        if n >= VM_NUM_MAX {
            return Err(Error::VmListFull);
        }
        self.info_list[n] = info;
        self.vm_num = n as u64 + 1;
        Ok(())
    }

    /// Number of valid entries. A corrupt count is clamped to the list capacity.
    pub fn len(&self) -> usize {
        usize::try_from(self.vm_num).map_or(VM_NUM_MAX, |n| n.min(VM_NUM_MAX))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &VmInfo> {
        self.info_list[..self.len()].iter()
    }
}

/// Configuration of a block device served by the service VM.
#[derive(Copy, Clone, Debug, Default, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
pub struct MediatedBlkCfg {
    pub name: NameBuf,
    pub block_dev_path: NameBuf,
    pub block_num: u64,
    pub dma_block_max: u64,
    pub cache_size: u64,
    pub idx: u16,
    /// Non-zero enables the page cache.
    pub pcache: u8,
    _pad: [u8; 5],
    pub cache_va: u64,
    pub cache_ipa: u64,
    pub cache_pa: u64,
}

/// Read from the device into the cache.
pub const MEDIATED_BLK_REQ_IN: u32 = 0;
/// Write from the cache to the device.
pub const MEDIATED_BLK_REQ_OUT: u32 = 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, N)]
#[repr(u32)]
pub enum BlkReqType {
    In = MEDIATED_BLK_REQ_IN,
    Out = MEDIATED_BLK_REQ_OUT,
}

/// The request currently posted to the service VM.
#[derive(Copy, Clone, Debug, Default, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
pub struct MediatedBlkReq {
    pub req_type: u32,
    _pad: [u8; 4],
    pub sector: u64,
    pub count: u64,
}

impl MediatedBlkReq {
    pub fn req_type(&self) -> Option<BlkReqType> {
        BlkReqType::n(self.req_type)
    }
}

/// Shared-memory window of one mediated block device.
#[derive(Copy, Clone, Debug, Default, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
pub struct MediatedBlkContent {
    /// Count of requests posted so far.
    pub nreq: u64,
    pub cfg: MediatedBlkCfg,
    pub req: MediatedBlkReq,
}

impl MediatedBlkContent {
    /// View the start of a shared-memory window as a `MediatedBlkContent`.
    ///
    /// The buffer must be large enough and suitably aligned.
    pub fn from_bytes_mut(buf: &mut [u8]) -> Result<&mut MediatedBlkContent> {
        let len = buf.len();
        MediatedBlkContent::mut_from_prefix(buf)
            .map(|(content, _)| content)
            .map_err(|_| Error::InvalidBuffer(len))
    }

    /// Publish a new request and bump the request counter.
    pub fn post_request(&mut self, req_type: BlkReqType, sector: u64, count: u64) {
        self.nreq = self.nreq.wrapping_add(1);
        self.req.req_type = req_type as u32;
        self.req.sector = sector;
        self.req.count = count;
    }
}

const_assert_eq!(std::mem::size_of::<NameBuf>(), NAME_MAX_LEN);
const_assert_eq!(std::mem::size_of::<VmInfo>(), 44);
const_assert_eq!(std::mem::size_of::<VmInfoList>(), 360);
const_assert_eq!(std::mem::size_of::<MediatedBlkCfg>(), 120);
const_assert_eq!(std::mem::size_of::<MediatedBlkReq>(), 24);
const_assert_eq!(std::mem::size_of::<MediatedBlkContent>(), 152);
