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

//! Publishing POV, pathloss and antenna pointing events to the inner
//! emulator.
//!
//! The emulator event bus itself is outside the orchestrator core; the
//! [`EmulatorEventSink`] trait is its seam. The shipped implementation
//! publishes event lines over the raw-event multicast channel.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use emex_model::{AntennaPointing, PathlossEntry, Pov};

use crate::builder::EelFormatter;

/// Event batches keyed by platform name.
pub type PlatformEvents<T> = BTreeMap<String, Vec<T>>;

/// The emulator event bus seam.
#[async_trait]
pub trait EmulatorEventSink: Send {
    /// Publish POV updates.
    async fn publish_povs(&mut self, povs: &PlatformEvents<Pov>) -> Result<(), String>;
    /// Publish pathloss updates. Pathloss is symmetric: both directions
    /// are published with the same value.
    async fn publish_pathlosses(
        &mut self,
        pathlosses: &PlatformEvents<PathlossEntry>,
    ) -> Result<(), String>;
    /// Publish antenna pointing updates.
    async fn publish_antenna_pointings(
        &mut self,
        pointings: &PlatformEvents<AntennaPointing>,
    ) -> Result<(), String>;
}

/// The default emulator event service endpoint.
pub const EVENT_SERVICE_GROUP: &str = "224.1.2.8";
/// The default emulator event service port.
pub const EVENT_SERVICE_PORT: u16 = 45703;

/// Publishes EEL-formatted event lines over the emulator's raw event
/// multicast channel, resolving platforms and components through the
/// nemid and profile-id maps loaded at boot.
pub struct EelMulticastSink {
    socket: Option<UdpSocket>,
    nemid_map: BTreeMap<(String, String), i64>,
    profileid_map: BTreeMap<(String, String), usize>,
    formatter: EelFormatter,
}

impl EelMulticastSink {
    /// Create the sink over the given identifier maps.
    pub fn new(
        nemid_map: BTreeMap<(String, String), i64>,
        profileid_map: BTreeMap<(String, String), usize>,
    ) -> Self {
        Self {
            socket: None,
            nemid_map,
            profileid_map,
            formatter: EelFormatter,
        }
    }

    async fn socket(&mut self) -> Result<&UdpSocket, String> {
        if self.socket.is_none() {
            let socket = UdpSocket::bind("0.0.0.0:0")
                .await
                .map_err(|_| "failed to open emane EventService".to_string())?;
            self.socket = Some(socket);
        }
        Ok(self.socket.as_ref().expect("just created"))
    }

    async fn publish(&mut self, lines: String) -> Result<(), String> {
        if lines.is_empty() {
            return Ok(());
        }
        let socket = self.socket().await?;
        socket
            .send_to(
                lines.as_bytes(),
                (EVENT_SERVICE_GROUP, EVENT_SERVICE_PORT),
            )
            .await
            .map_err(|e| format!("failed to publish emulator event: {e}"))?;
        Ok(())
    }

    /// All nemids of a platform, or of the named components only.
    fn nemids(&self, plt_name: &str, component_names: &[String]) -> Result<Vec<i64>, String> {
        if component_names.is_empty() {
            Ok(self
                .nemid_map
                .iter()
                .filter(|((plt, _), _)| plt == plt_name)
                .map(|(_, nemid)| *nemid)
                .collect())
        } else {
            component_names
                .iter()
                .map(|c_name| {
                    self.nemid_map
                        .get(&(plt_name.to_string(), c_name.clone()))
                        .copied()
                        .ok_or_else(|| format!("unknown component {plt_name}.{c_name}"))
                })
                .collect()
        }
    }
}

#[async_trait]
impl EmulatorEventSink for EelMulticastSink {
    async fn publish_povs(&mut self, povs: &PlatformEvents<Pov>) -> Result<(), String> {
        let mut lines = String::new();

        for (plt_name, plt_povs) in povs {
            for pov in plt_povs {
                let nemids = self.nemids(plt_name, &pov.component_names)?;
                log::debug!(
                    "emane_event pov {plt_name} nems:{nemids:?} lat:{} lon:{} alt:{}",
                    pov.latitude,
                    pov.longitude,
                    pov.altitude
                );
                lines.push_str(&self.formatter.pov_to_str("0.0", &nemids, pov));
            }
        }

        self.publish(lines).await
    }

    async fn publish_pathlosses(
        &mut self,
        pathlosses: &PlatformEvents<PathlossEntry>,
    ) -> Result<(), String> {
        let mut lines = String::new();

        for (plt_name, entries) in pathlosses {
            for entry in entries {
                let local_nemids = self.nemids(plt_name, &entry.component_names)?;
                let remote_nemids =
                    self.nemids(&entry.remote_platform, &entry.remote_component_names)?;

                // symmetric: publish both directions with the same value
                for nemid in &local_nemids {
                    lines.push_str(&self.formatter.pathlosses_to_str(
                        "0.0",
                        std::slice::from_ref(nemid),
                        &[(entry.clone(), remote_nemids.clone())],
                    ));
                }
                for rnemid in &remote_nemids {
                    lines.push_str(&self.formatter.pathlosses_to_str(
                        "0.0",
                        std::slice::from_ref(rnemid),
                        &[(entry.clone(), local_nemids.clone())],
                    ));
                }

                log::debug!(
                    "emane_event pathloss {plt_name} nems:{local_nemids:?} \
                     remote:{remote_nemids:?} pathloss:{}",
                    entry.pathloss_db
                );
            }
        }

        self.publish(lines).await
    }

    async fn publish_antenna_pointings(
        &mut self,
        pointings: &PlatformEvents<AntennaPointing>,
    ) -> Result<(), String> {
        let mut lines = String::new();

        for (plt_name, plt_pointings) in pointings {
            for pointing in plt_pointings {
                // no component set applies the pointing to every antenna
                // of the platform
                let keys: Vec<(String, String)> = if pointing.component_names.is_empty() {
                    self.profileid_map
                        .keys()
                        .filter(|(plt, _)| plt == plt_name)
                        .cloned()
                        .collect()
                } else {
                    pointing
                        .component_names
                        .iter()
                        .map(|c| (plt_name.clone(), c.clone()))
                        .collect()
                };

                for key in keys {
                    let profile_id = self
                        .profileid_map
                        .get(&key)
                        .copied()
                        .ok_or_else(|| format!("no antenna profile for {}.{}", key.0, key.1))?;
                    let nemid = self
                        .nemid_map
                        .get(&key)
                        .copied()
                        .ok_or_else(|| format!("unknown component {}.{}", key.0, key.1))?;

                    lines.push_str(&self.formatter.antenna_pointing_to_str(
                        "0.0", nemid, profile_id, pointing,
                    ));
                }
            }
        }

        self.publish(lines).await
    }
}
