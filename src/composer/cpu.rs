// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use fdt_blob::Fdt;
use log::debug;

use super::add_child;
use crate::mutator;
use crate::Result;

/// Add `/cpus/cpu@<linear_id>` for the vCPU backed by physical core `core` of cluster
/// `cluster`. The node's `reg` is the core's MPIDR affinity as seen by the guest.
///
/// The unit address is `linear_id` in hex, so vCPU 10 becomes `cpu@a`.
pub fn add_cpu(
    fdt: &mut Fdt,
    linear_id: u32,
    core: u32,
    cluster: u32,
    compatible: &str,
) -> Result<()> {
    let cpu_name = format!("cpu@{:x}", linear_id);
    let mpidr = (cluster << 8) | core;
    let mut cpu = add_child(fdt, "/cpus", &cpu_name)?;
    debug!("{}: {} mpidr {:#x}", cpu_name, compatible, mpidr);
    mutator::set(&mut cpu, "compatible", compatible)?;
    mutator::set(&mut cpu, "device_type", "cpu")?;
    mutator::set(&mut cpu, "enable-method", "psci")?;
    mutator::set(&mut cpu, "reg", [0, mpidr])
}
