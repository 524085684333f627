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

//! Antenna pattern XML generation.

use emex_model::{AntennaProfile, ParamValue};

use super::BuilderError;

const PROFILE_DTD: &str = "file:///usr/share/emane/dtd/antennaprofile.dtd";

/// Builds antenna pattern files for the profiles of one EMOE.
#[derive(Debug, Default)]
pub struct AntennaBuilder;

impl AntennaBuilder {
    /// Build the pattern file of one profile, returning its file name and
    /// contents.
    pub fn build(&self, profile: &AntennaProfile) -> Result<(String, String), BuilderError> {
        match profile.antenna().antennatype_name() {
            "sector" => Ok(self.build_sector_antenna(profile)),
            other => Err(BuilderError::UnknownAntennaType(other.to_string())),
        }
    }

    /// A sector pattern: the main lobe spans the configured beamwidths
    /// centred on bearing 0, everything else is at the rejection gain.
    fn build_sector_antenna(&self, profile: &AntennaProfile) -> (String, String) {
        let param = |name: &str| -> f64 {
            profile
                .antenna()
                .param(name)
                .and_then(|p| p.first())
                .and_then(ParamValue::as_float)
                .unwrap_or(0.0)
        };

        let vertical_beamwidth = param("vertical_beamwidth");
        let max_vertical = (vertical_beamwidth / 2.0).floor().min(90.0) as i64;
        let min_vertical = -max_vertical;

        let horizontal_beamwidth = param("horizontal_beamwidth");
        let max_horizontal = (horizontal_beamwidth / 2.0).floor().min(90.0) as i64;
        let min_horizontal = 360 - max_horizontal;

        let gain = param("gain");
        let rejection = param("rejection");

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\"?>\n");
        xml.push_str(&format!(
            "<!DOCTYPE antennaprofile SYSTEM \"{PROFILE_DTD}\">\n"
        ));
        xml.push_str("<antennaprofile>\n");
        xml.push_str("  <antennapattern>\n");

        if min_vertical > -90 {
            // rejection region top
            xml.push_str(&format!(
                "    <elevation min=\"-90\" max=\"{min_vertical}\">\n"
            ));
            xml.push_str("      <bearing min=\"0\" max=\"359\">\n");
            xml.push_str(&format!("        <gain value=\"{rejection}\"/>\n"));
            xml.push_str("      </bearing>\n");
            xml.push_str("    </elevation>\n");
        }

        // sector region middle
        xml.push_str(&format!(
            "    <elevation min=\"{}\" max=\"{}\">\n",
            min_vertical + 1,
            max_vertical - 1
        ));
        xml.push_str(&format!(
            "      <bearing min=\"0\" max=\"{}\">\n",
            max_horizontal - 1
        ));
        xml.push_str(&format!("        <gain value=\"{gain}\"/>\n"));
        xml.push_str("      </bearing>\n");
        xml.push_str(&format!(
            "      <bearing min=\"{max_horizontal}\" max=\"{min_horizontal}\">\n"
        ));
        xml.push_str(&format!("        <gain value=\"{rejection}\"/>\n"));
        xml.push_str("      </bearing>\n");
        xml.push_str(&format!(
            "      <bearing min=\"{}\" max=\"359\">\n",
            min_horizontal + 1
        ));
        xml.push_str(&format!("        <gain value=\"{gain}\"/>\n"));
        xml.push_str("      </bearing>\n");
        xml.push_str("    </elevation>\n");

        if max_vertical < 90 {
            // rejection region bottom
            xml.push_str(&format!(
                "    <elevation min=\"{max_vertical}\" max=\"90\">\n"
            ));
            xml.push_str("      <bearing min=\"0\" max=\"359\">\n");
            xml.push_str(&format!("        <gain value=\"{rejection}\"/>\n"));
            xml.push_str("      </bearing>\n");
            xml.push_str("    </elevation>\n");
        }

        xml.push_str("  </antennapattern>\n");
        xml.push_str("</antennaprofile>\n");

        let file_name = format!(
            "{}_north{}_east{}_up{}.xml",
            profile.name(),
            profile.north(),
            profile.east(),
            profile.up()
        );

        (file_name, xml)
    }
}
