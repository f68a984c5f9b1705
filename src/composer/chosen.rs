// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use fdt_blob::Fdt;
use log::debug;

use crate::mutator;
use crate::resolver::resolve_by_path;
use crate::Result;

const CHOSEN_PATH: &str = "/chosen";

/// Set the kernel command line.
pub fn set_bootargs(fdt: &mut Fdt, cmdline: &str) -> Result<()> {
    let mut chosen = resolve_by_path(fdt, CHOSEN_PATH)?;
    debug!("chosen: bootargs \"{}\"", cmdline);
    mutator::set(&mut chosen, "bootargs", cmdline)
}

/// Tell the kernel where the initrd was loaded. Both bounds are single 32-bit cells, so the
/// initrd has to sit below 4 GiB.
pub fn set_initrd(fdt: &mut Fdt, start: u32, end: u32) -> Result<()> {
    let mut chosen = resolve_by_path(fdt, CHOSEN_PATH)?;
    debug!("chosen: initrd {:#x}..{:#x}", start, end);
    mutator::set(&mut chosen, "linux,initrd-start", start)?;
    mutator::set(&mut chosen, "linux,initrd-end", end)
}

pub fn clear_initrd(fdt: &mut Fdt) -> Result<()> {
    let mut chosen = resolve_by_path(fdt, CHOSEN_PATH)?;
    mutator::delete(&mut chosen, "linux,initrd-start")?;
    mutator::delete(&mut chosen, "linux,initrd-end")
}

pub fn set_stdout_path(fdt: &mut Fdt, path: &str) -> Result<()> {
    let mut chosen = resolve_by_path(fdt, CHOSEN_PATH)?;
    mutator::set(&mut chosen, "stdout-path", path)
}

pub fn clear_stdout_path(fdt: &mut Fdt) -> Result<()> {
    let mut chosen = resolve_by_path(fdt, CHOSEN_PATH)?;
    mutator::delete(&mut chosen, "stdout-path")
}
