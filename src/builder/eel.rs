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

//! Formatting of emulator event lines (EEL).

use emex_model::{AntennaPointing, PathlossEntry, Pov};

/// Formats POV, pathloss and antenna pointing state as EEL lines.
#[derive(Debug, Default)]
pub struct EelFormatter;

impl EelFormatter {
    /// Format location, orientation and velocity lines for every nemid.
    ///
    /// ```text
    /// -Inf nem:NEMID location gps 38.192924,-75.921039,1000
    /// -Inf nem:NEMID orientation pitch,roll,yaw
    /// -Inf nem:NEMID velocity az,el,mag
    /// ```
    pub fn pov_to_str(&self, time: &str, nemids: &[i64], pov: &Pov) -> String {
        let mut lines = String::new();
        for nemid in nemids {
            lines.push_str(&format!(
                "{time} nem:{nemid} location gps {},{},{}\n",
                pov.latitude, pov.longitude, pov.altitude
            ));
            lines.push_str(&format!(
                "{time} nem:{nemid} orientation {},{},{}\n",
                pov.pitch, pov.roll, pov.yaw
            ));
            lines.push_str(&format!(
                "{time} nem:{nemid} velocity {},{},{}\n",
                pov.azimuth, pov.elevation, pov.speed
            ));
        }
        lines
    }

    /// Format one pathloss line per local nemid carrying every remote
    /// entry.
    ///
    /// ```text
    /// -Inf nem:NEMID pathloss nem:REMOTE,DB nem:REMOTE,DB
    /// ```
    pub fn pathlosses_to_str(
        &self,
        time: &str,
        nemids: &[i64],
        entries: &[(PathlossEntry, Vec<i64>)],
    ) -> String {
        let mut lines = String::new();
        for nemid in nemids {
            let mut line = format!("{time} nem:{nemid} pathloss");
            for (entry, remote_nemids) in entries {
                for rnemid in remote_nemids {
                    line.push_str(&format!(" nem:{rnemid},{}", entry.pathloss_db));
                }
            }
            line.push('\n');
            lines.push_str(&line);
        }
        lines
    }

    /// Format one antenna profile line.
    ///
    /// ```text
    /// -Inf nem:NEMID antennaprofile profileid,az,el
    /// ```
    pub fn antenna_pointing_to_str(
        &self,
        time: &str,
        nemid: i64,
        profile_id: usize,
        pointing: &AntennaPointing,
    ) -> String {
        format!(
            "{time} nem:{nemid} antennaprofile {profile_id},{},{}\n",
            pointing.azimuth, pointing.elevation
        )
    }
}
