// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Flattened device tree blob reader, in-place editor and writer.
//!
//! [`Fdt`] owns a Devicetree Blob (DTB) and edits it in place the way libfdt's read-write
//! functions do: every edit is spliced into the existing structure and strings blocks and has to
//! fit inside the blob's declared `totalsize`. Use [`Fdt::open_into`] to make room and
//! [`Fdt::pack`] to shrink the blob back to its live data.
//!
//! Nodes are addressed by structure-block offsets. Offsets are only meaningful until the next
//! edit, so the editing API hands them out wrapped in [`FdtNodeMut`], which holds the blob's
//! exclusive borrow for as long as the offset is in use.

mod blob;
mod edit;
mod error;
mod header;
mod node;
mod propval;
mod walk;
mod writer;

pub use blob::Fdt;
pub use error::Error;
pub use error::Result;
pub use header::FdtReserveEntry;
pub use header::FDT_MAGIC;
pub use node::FdtNode;
pub use node::FdtNodeMut;
pub use propval::FromFdtPropval;
pub use propval::ToFdtPropval;
pub use writer::FdtWriter;
pub use writer::OpenNode;

/// Structure-block offset of the root node.
pub const ROOT_OFFSET: usize = 0;
