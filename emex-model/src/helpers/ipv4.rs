// EmEx: Orchestrator for Emulated Multi-Operator Environments
// Copyright (C) 2023-2024 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Subnet-scoped IPv4 address assignment.

use super::{group_components_by_net_label, ConfigHelper};
use crate::{param::ParamValue, platform::Platform, types::ModelError};

/// Assigns a unique IPv4 address to each traffic-endpoint network
/// interface.
///
/// Components are partitioned into subnets by `(waveform type, net-label
/// set)`; within each subnet, unconfigured addresses are assigned
/// sequentially as `10.0.<subnet>.<host>`. A subnet that mixes
/// preconfigured and unconfigured addresses is rejected — it is all or
/// none.
pub struct Ipv4Helper {
    subnet_start: u8,
}

impl Default for Ipv4Helper {
    fn default() -> Self {
        Self { subnet_start: 1 }
    }
}

impl ConfigHelper for Ipv4Helper {
    fn configure(&self, platforms: &mut [Platform]) -> Result<(), ModelError> {
        let groups = group_components_by_net_label(platforms);

        for (subnetid, ((wft, net_labels), group)) in groups.into_iter().enumerate() {
            let subnetid = subnetid + 1;

            let mut configured: Vec<(String, String)> = Vec::new();
            let mut unconfigured: Vec<(String, String)> = Vec::new();

            for (plt_name, c_name) in group {
                let platform = platforms
                    .iter()
                    .find(|p| p.name() == plt_name)
                    .expect("grouping built from platforms");
                let component = platform
                    .component(&c_name)
                    .expect("grouping built from platforms");

                if !component.traffic_endpoint() || !component.has_param("net", "ipv4address") {
                    continue;
                }

                if component.get_param("net", "ipv4address")?.configured() {
                    configured.push((plt_name, c_name));
                } else {
                    unconfigured.push((plt_name, c_name));
                }
            }

            if !configured.is_empty() && !unconfigured.is_empty() {
                let netlist = net_labels.iter().cloned().collect::<Vec<_>>().join(", ");
                return Err(ModelError::HelperCheck(format!(
                    "Waveform \"{wft}\" net labels \"{netlist}\" has configured and \
                     unconfigured ipv4_address values and cannot be automatically configured."
                )));
            }

            for (hostid, (plt_name, c_name)) in
                unconfigured.into_iter().enumerate()
            {
                let hostid = hostid + self.subnet_start as usize;
                let address = format!("10.0.{subnetid}.{hostid}");
                let platform = platforms
                    .iter_mut()
                    .find(|p| p.name() == plt_name)
                    .expect("grouping built from platforms");
                platform.set_param(
                    &c_name,
                    "net",
                    "ipv4address",
                    vec![ParamValue::Str(address)],
                )?;
            }
        }

        Ok(())
    }

    fn check(&self, platforms: &[Platform]) -> Result<(), ModelError> {
        for platform in platforms {
            for (c_name, pg_name, p_name, value) in platform.get_params() {
                if pg_name == "net" && p_name == "ipv4address" && value.is_empty() {
                    return Err(ModelError::HelperCheck(format!(
                        "net.ipv4address is not set for {}.{}",
                        platform.name(),
                        c_name
                    )));
                }
            }
        }
        Ok(())
    }
}
