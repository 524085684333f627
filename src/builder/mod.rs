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

//! Deterministic materialisation of a per-EMOE configuration tree.
//!
//! Given a validated [`EmoeRuntime`], the builder writes the working
//! directory the EMOE container mounts at `/tmp/etce`: host list,
//! container plan, per-host substituted configuration, antenna profiles,
//! identifier maps, the initial-condition event file and the socket
//! multiplexer script.
//!
//! Iteration over platforms and components is always by sorted name and
//! profile ids are assigned in first-encounter order, so re-running the
//! builder on an identical EMOE produces byte-identical outputs (modulo
//! paths embedding the EMOE id).

mod antenna;
mod eel;

pub use antenna::AntennaBuilder;
pub use eel::EelFormatter;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use emex_model::{helpers, AntennaProfile, ModelError, ModelRegistry, ParamValue};

use crate::{
    config::DaemonConfig,
    runtime::{Device, EmoeRuntime},
};

/// Errors raised while materialising a configuration tree.
#[derive(Debug, Error)]
pub enum BuilderError {
    /// A file or directory could not be written.
    #[error("Cannot write \"{path}\": {source}")]
    Io {
        /// The offending path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// The model rejected a lookup.
    #[error("{0}")]
    Model(#[from] ModelError),
    /// An antenna references a pattern type the builder cannot generate.
    #[error("Unknown antenna type \"{0}\".")]
    UnknownAntennaType(String),
    /// The renderer failed on a host configuration template.
    #[error("{0}")]
    Render(String),
}

/// Renders a directory of per-host configuration templates with parameter
/// substitution. The template mechanism itself is outside the
/// orchestrator core; [`SubstitutionRenderer`] is the shipped default.
pub trait Renderer: Send + Sync {
    /// Render every file of `template_dir` into `out_dir`.
    fn render_dir(
        &self,
        template_dir: &Path,
        out_dir: &Path,
        params: &BTreeMap<String, String>,
    ) -> Result<(), BuilderError>;
}

/// Replaces `${key}` occurrences with the parameter values. Unknown keys
/// are left untouched for the in-container tooling to resolve.
#[derive(Debug, Default)]
pub struct SubstitutionRenderer;

impl Renderer for SubstitutionRenderer {
    fn render_dir(
        &self,
        template_dir: &Path,
        out_dir: &Path,
        params: &BTreeMap<String, String>,
    ) -> Result<(), BuilderError> {
        let entries = std::fs::read_dir(template_dir).map_err(|source| BuilderError::Io {
            path: template_dir.to_path_buf(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| BuilderError::Io {
                path: template_dir.to_path_buf(),
                source,
            })?;
            let src = entry.path();
            if !src.is_file() {
                continue;
            }

            let mut contents =
                std::fs::read_to_string(&src).map_err(|source| BuilderError::Io {
                    path: src.clone(),
                    source,
                })?;
            for (key, value) in params {
                contents = contents.replace(&format!("${{{key}}}"), value);
            }

            let dst = out_dir.join(entry.file_name());
            write_file(&dst, &contents)?;
        }

        Ok(())
    }
}

/// The per-EMOE configuration tree builder.
pub struct ConfigTreeBuilder {
    renderer: Box<dyn Renderer>,
    template_root: Option<PathBuf>,
}

impl Default for ConfigTreeBuilder {
    fn default() -> Self {
        Self {
            renderer: Box::new(SubstitutionRenderer),
            template_root: std::env::var("EMEX_MODEL_PATH").ok().map(PathBuf::from),
        }
    }
}

impl ConfigTreeBuilder {
    /// Create a builder with a custom renderer and template root.
    pub fn new(renderer: Box<dyn Renderer>, template_root: Option<PathBuf>) -> Self {
        Self {
            renderer,
            template_root,
        }
    }

    /// Materialise the configuration tree of one EMOE into its working
    /// directory, registering the container service ports and the bridge
    /// devices of the container plan on the runtime.
    pub fn build(
        &self,
        rt: &mut EmoeRuntime,
        registry: &ModelRegistry,
        config: &DaemonConfig,
    ) -> Result<(), BuilderError> {
        let workdir = rt.workdir();
        let configdir = workdir.join("config");
        let helperdir = configdir.join("helper-lxc");
        let localhostdir = configdir.join("localhost");
        let docdir = configdir.join("doc");

        for dir in [
            &workdir,
            &configdir,
            &helperdir,
            &localhostdir,
            &docdir,
            &workdir.join("data"),
            &workdir.join("lxcroot"),
        ] {
            std::fs::create_dir_all(dir).map_err(|source| BuilderError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        self.write_test_file(rt, &configdir)?;
        self.write_container_plan(rt, &docdir)?;
        self.write_host_file(rt, &docdir)?;
        self.write_port_map(rt, &docdir)?;
        self.write_platform_configs(rt, registry, &configdir)?;
        let built_antennas = self.write_antenna_files(rt, &configdir)?;
        self.write_nemid_profileid_map(rt, &docdir, &built_antennas)?;
        self.write_steps_file(&configdir)?;
        self.write_initial_condition_eel(rt, &helperdir, &built_antennas)?;
        self.write_testpoint_broker_conf(rt, &helperdir)?;
        self.write_node_view_conf(rt, &localhostdir)?;
        self.write_socat_mappings(rt, &localhostdir)?;
        self.write_daemon_config_mirror(config, &docdir)?;

        Ok(())
    }

    fn write_test_file(&self, rt: &EmoeRuntime, configdir: &Path) -> Result<(), BuilderError> {
        let mut xml = String::from("<test>\n");
        xml.push_str(&format!("  <name>{}</name>\n", rt.emoe().name()));
        xml.push_str("  <description>\n");
        for platform in rt.emoe().platforms() {
            xml.push_str(&format!("\t{}\n", platform.name()));
        }
        xml.push_str("  </description>\n");
        xml.push_str("</test>\n");

        write_file(&configdir.join("test.xml"), &xml)
    }

    /// The container plan: veth/bridge addressing for `backchan0` and
    /// `ota0`. The helper node takes subnet 0 host 1; the net-label
    /// groups are numbered sequentially from 1 in deterministic group
    /// order.
    fn write_container_plan(&self, rt: &mut EmoeRuntime, docdir: &Path) -> Result<(), BuilderError> {
        let net_groups = helpers::group_components_by_net_label(rt.emoe().platforms());

        let mut xml = String::from("<lxcplan>\n");
        xml.push_str("  <containertemplates>\n");
        xml.push_str("    <containertemplate name=\"basenode\">\n");
        xml.push_str("      <parameters>\n");
        for (name, value) in LXC_CONTAINER_PARAMETERS {
            xml.push_str(&format!(
                "        <parameter name=\"{name}\" value=\"{value}\"/>\n"
            ));
        }
        xml.push_str("      </parameters>\n");
        xml.push_str("      <initscript>\n");
        xml.push_str(LXC_INIT_SCRIPT);
        xml.push_str("      </initscript>\n");
        xml.push_str("    </containertemplate>\n");
        xml.push_str("  </containertemplates>\n");
        xml.push_str("  <hosts>\n");
        xml.push_str("    <host hostname=\"localhost\">\n");
        xml.push_str("      <kernelparameters>\n");
        xml.push_str(
            "        <parameter name=\"kernel.sched_rt_runtime_us\" value=\"-1\"/>\n",
        );
        xml.push_str("      </kernelparameters>\n");
        xml.push_str("      <bridges>\n");
        xml.push_str("        <bridge name=\"backchan0\">\n");
        xml.push_str("          <ipaddress><ipv4>10.76.0.250/16</ipv4></ipaddress>\n");
        xml.push_str("        </bridge>\n");
        xml.push_str("        <bridge name=\"ota0\">\n");
        xml.push_str("          <ipaddress><ipv4>10.77.0.250/16</ipv4></ipaddress>\n");
        xml.push_str("        </bridge>\n");
        xml.push_str("      </bridges>\n");
        xml.push_str("      <containers>\n");

        let mut counter = 1usize;

        // the helper container comes first on subnet 0
        xml.push_str(&self.container_block(rt, "helper", "lxc", "helper-lxc", counter, 0, 1));

        for (subnetid, (_, members)) in net_groups.into_iter().enumerate() {
            let subnetid = subnetid + 1;
            for (hostid, (plt_name, c_name)) in members.into_iter().enumerate() {
                let hostid = hostid + 1;
                counter += 1;
                let hostname = format!("{plt_name}-{c_name}");
                xml.push_str(&self.container_block(
                    rt, &plt_name, &c_name, &hostname, counter, subnetid, hostid,
                ));
            }
        }

        xml.push_str("      </containers>\n");
        xml.push_str("    </host>\n");
        xml.push_str("  </hosts>\n");
        xml.push_str("</lxcplan>\n");

        write_file(&docdir.join("lxcplan.xml"), &xml)
    }

    #[allow(clippy::too_many_arguments)]
    fn container_block(
        &self,
        rt: &mut EmoeRuntime,
        plt_name: &str,
        c_name: &str,
        hostname: &str,
        counter: usize,
        subnetid: usize,
        hostid: usize,
    ) -> String {
        let mut xml = String::new();
        xml.push_str(&format!(
            "        <container template=\"basenode\" lxc_name=\"{hostname}\" \
             lxc_indices=\"{counter}\">\n"
        ));
        xml.push_str("          <interfaces>\n");

        let backchan_hwaddr = format!("02:00:00:00:{subnetid:02x}:{hostid:02x}");
        let backchan_addr = format!("10.76.{subnetid}.{hostid}");
        xml.push_str(&self.interface_block(
            0,
            "backchan0",
            hostname,
            &backchan_hwaddr,
            &backchan_addr,
            &format!("veth.ctl.{counter}"),
        ));
        rt.node_mut(plt_name, c_name).add_device(Device::Bridge {
            name: "backchan0".to_string(),
            ipv4address: backchan_addr,
            masklen: 16,
            hwaddr: backchan_hwaddr,
        });

        let ota_hwaddr = format!("02:01:00:00:00:{hostid:02x}");
        let ota_addr = format!("10.77.{subnetid}.{hostid}");
        xml.push_str(&self.interface_block(
            1,
            "ota0",
            hostname,
            &ota_hwaddr,
            &ota_addr,
            &format!("veth.ota.{counter}"),
        ));
        rt.node_mut(plt_name, c_name).add_device(Device::Bridge {
            name: "ota0".to_string(),
            ipv4address: ota_addr,
            masklen: 16,
            hwaddr: ota_hwaddr,
        });

        xml.push_str("          </interfaces>\n");
        xml.push_str("        </container>\n");
        xml
    }

    fn interface_block(
        &self,
        index: usize,
        device: &str,
        hostname: &str,
        hwaddr: &str,
        ipv4address: &str,
        veth: &str,
    ) -> String {
        let mut xml = String::new();
        xml.push_str(&format!(
            "            <interface bridge=\"{device}\" hosts_entry_ipv4=\"{hostname}\">\n"
        ));
        for (name, value) in [
            (format!("lxc.net.{index}.type"), "veth".to_string()),
            (format!("lxc.net.{index}.flags"), "up".to_string()),
            (format!("lxc.net.{index}.hwaddr"), hwaddr.to_string()),
            (
                format!("lxc.net.{index}.ipv4.address"),
                format!("{ipv4address}/16"),
            ),
            (format!("lxc.net.{index}.name"), device.to_string()),
            (format!("lxc.net.{index}.veth.pair"), veth.to_string()),
            (format!("lxc.net.{index}.link"), device.to_string()),
        ] {
            xml.push_str(&format!(
                "              <parameter name=\"{name}\" value=\"{value}\"/>\n"
            ));
        }
        xml.push_str("            </interface>\n");
        xml
    }

    fn write_host_file(&self, rt: &EmoeRuntime, docdir: &Path) -> Result<(), BuilderError> {
        let mut contents = String::from("localhost {\n");
        contents.push_str("localhost\n");
        contents.push_str("helper-lxc\n");
        for platform in rt.emoe().platforms() {
            for component in platform.components() {
                contents.push_str(&format!("{}-{}\n", platform.name(), component.name()));
            }
        }
        contents.push_str("}\n");

        write_file(&docdir.join("hostfile"), &contents)
    }

    /// One record per traffic endpoint:
    /// `platform,hostname,control_address,device`. The in-container agent
    /// maps platform-addressed traffic commands to the right remote
    /// control socket with this file.
    fn write_port_map(&self, rt: &EmoeRuntime, docdir: &Path) -> Result<(), BuilderError> {
        let mut contents = String::new();
        for (plt_name, hostname, ipv4address, device) in rt.port_map() {
            contents.push_str(&format!("{plt_name},{hostname},{ipv4address},{device}\n"));
        }

        write_file(&docdir.join("mgen_port_map.csv"), &contents)
    }

    fn write_platform_configs(
        &self,
        rt: &EmoeRuntime,
        registry: &ModelRegistry,
        configdir: &Path,
    ) -> Result<(), BuilderError> {
        // control addresses feed the family helpers' meta parameters
        let mut control_addrs = helpers::ControlAddrs::new();
        let mut device_meta: BTreeMap<(String, String), BTreeMap<String, String>> =
            BTreeMap::new();

        for ((plt, cmp), node) in rt.nodes() {
            let key = (plt.clone(), cmp.clone());
            if let Some(device) = node.device("backchan0") {
                control_addrs.insert(key.clone(), device.ipv4address().to_string());
                device_meta.entry(key.clone()).or_default().insert(
                    "emex.control_ipv4address".to_string(),
                    device.ipv4address().to_string(),
                );
            }
            if let Some(device) = node.device("ota0") {
                device_meta.entry(key).or_default().insert(
                    "emex.ota_ipv4address".to_string(),
                    device.ipv4address().to_string(),
                );
            }
        }

        let mut meta_params = helpers::collect_meta_params(rt.emoe().platforms(), &control_addrs)?;
        for (key, params) in device_meta {
            meta_params.entry(key).or_default().extend(params);
        }

        for platform in rt.emoe().platforms() {
            for component in platform.components() {
                let hostname = format!("{}-{}", platform.name(), component.name());
                let outdir = configdir.join(&hostname);
                std::fs::create_dir_all(&outdir).map_err(|source| BuilderError::Io {
                    path: outdir.clone(),
                    source,
                })?;

                let mut params: BTreeMap<String, String> = BTreeMap::new();
                params.insert("emex.hostname".to_string(), hostname.clone());
                params.insert("emex.log_path".to_string(), "${etce_log_path}".to_string());
                for (pg, p, values) in component.get_params() {
                    params.insert(
                        format!("{pg}.{p}"),
                        values
                            .iter()
                            .map(ParamValue::to_string)
                            .collect::<Vec<_>>()
                            .join(","),
                    );
                }
                if let Some(meta) = meta_params
                    .get(&(platform.name().to_string(), component.name().to_string()))
                {
                    params.extend(meta.clone());
                }

                // traffic endpoints run a remote-controlled traffic
                // instance, triggered by marker files
                if component.traffic_endpoint() {
                    write_file(&outdir.join("mgenremote.flag"), "")?;
                    write_file(&outdir.join("mgenmonitor.flag"), "")?;
                }

                let Some(template_root) = &self.template_root else {
                    continue;
                };
                let Some(typing) = registry.waveformtype(component.kind_value()) else {
                    continue;
                };
                let template_dir = template_root
                    .join("templates/components")
                    .join(&typing.template);

                log::info!(
                    "building {hostname} config from {} to {}",
                    template_dir.display(),
                    outdir.display()
                );

                if let Err(e) = self.renderer.render_dir(&template_dir, &outdir, &params) {
                    log::error!("{e}");
                }
            }
        }

        Ok(())
    }

    /// Write one pattern file per unique [`AntennaProfile`], deduplicated
    /// structurally, and the profile manifest. Profile ids are assigned
    /// in first-encounter order over the sorted assignments.
    fn write_antenna_files(
        &self,
        rt: &EmoeRuntime,
        configdir: &Path,
    ) -> Result<Vec<AntennaProfile>, BuilderError> {
        let builder = AntennaBuilder;
        let mut built: Vec<AntennaProfile> = Vec::new();

        let mut manifest = String::from("<?xml version=\"1.0\"?>\n<profiles>\n");

        for profile in rt.emoe().antenna_assignments().values() {
            if built.contains(profile) {
                continue;
            }

            let (file_name, contents) = builder.build(profile)?;
            write_file(&configdir.join(&file_name), &contents)?;

            built.push(profile.clone());
            let antennaid = built.len();

            manifest.push_str(&format!(
                "  <profile id=\"{antennaid}\" \
                 antennapatternuri=\"/tmp/etce/current_test/{file_name}\">\n"
            ));
            manifest.push_str(&format!(
                "    <placement north=\"{}\" east=\"{}\" up=\"{}\"/>\n",
                profile.north(),
                profile.east(),
                profile.up()
            ));
            manifest.push_str("  </profile>\n");
        }

        manifest.push_str("</profiles>\n");

        // the manifest is written even when there are no profiles
        write_file(&configdir.join("antennaprofilemanifest.xml"), &manifest)?;

        Ok(built)
    }

    /// `platform,component,nemid,profileid` per radio.
    fn write_nemid_profileid_map(
        &self,
        rt: &EmoeRuntime,
        docdir: &Path,
        built_antennas: &[AntennaProfile],
    ) -> Result<(), BuilderError> {
        let mut contents = String::new();

        for ((plt_name, c_name), nemid) in rt.nemid_map() {
            let profileid = rt
                .emoe()
                .antenna_assignment(&plt_name, &c_name)
                .and_then(|profile| built_antennas.iter().position(|p| p == profile))
                .map(|pos| (pos + 1).to_string())
                .unwrap_or_default();

            contents.push_str(&format!("{plt_name},{c_name},{nemid},{profileid}\n"));
        }

        write_file(&docdir.join("nemid_map.csv"), &contents)
    }

    fn write_steps_file(&self, configdir: &Path) -> Result<(), BuilderError> {
        let mut xml = String::from("<steps>\n");
        for (step, wrapper) in EXECUTION_STEPS {
            xml.push_str(&format!("  <step name=\"{step}\">\n"));
            xml.push_str(&format!("    <run wrapper=\"{wrapper}\"/>\n"));
            xml.push_str("  </step>\n");
        }
        xml.push_str("</steps>\n");

        write_file(&configdir.join("steps.xml"), &xml)
    }

    /// The `-Inf`-timestamped initial conditions as emulator event lines.
    fn write_initial_condition_eel(
        &self,
        rt: &EmoeRuntime,
        helperdir: &Path,
        built_antennas: &[AntennaProfile],
    ) -> Result<(), BuilderError> {
        let formatter = EelFormatter;
        let mut contents = String::new();

        for ic in rt.emoe().initial_conditions() {
            let Some(platform) = rt.emoe().platform(&ic.platform_name) else {
                continue;
            };
            let nemids = platform.nemids();

            if let Some(pov) = &ic.pov {
                contents.push_str(&formatter.pov_to_str("-Inf", &nemids, pov));
            }

            if !ic.pathlosses.is_empty() {
                let entries: Vec<_> = ic
                    .pathlosses
                    .iter()
                    .map(|entry| {
                        let remote_nemids = rt
                            .emoe()
                            .platform(&entry.remote_platform)
                            .map(|p| p.nemids())
                            .unwrap_or_default();
                        (entry.clone(), remote_nemids)
                    })
                    .collect();
                contents.push_str(&formatter.pathlosses_to_str("-Inf", &nemids, &entries));
            }

            for pointing in &ic.antenna_pointings {
                // an empty component set applies the pointing to all of
                // the platform components
                let component_names: Vec<String> = if pointing.component_names.is_empty() {
                    platform
                        .component_names()
                        .into_iter()
                        .map(str::to_string)
                        .collect()
                } else {
                    pointing.component_names.clone()
                };

                for component_name in component_names {
                    let Some(nemid) = platform
                        .component(&component_name)
                        .and_then(|c| c.nemid())
                    else {
                        log::warn!(
                            "component {}.{component_name} carries no nemid, skipping \
                             antenna pointing",
                            ic.platform_name
                        );
                        continue;
                    };

                    let Some(profile) = rt
                        .emoe()
                        .antenna_assignment(&ic.platform_name, &component_name)
                    else {
                        log::warn!(
                            "No profile_id found for component {}.{component_name}. Ignoring",
                            ic.platform_name
                        );
                        continue;
                    };

                    let Some(profile_id) =
                        built_antennas.iter().position(|p| p == profile).map(|p| p + 1)
                    else {
                        continue;
                    };

                    contents.push_str(&formatter.antenna_pointing_to_str(
                        "-Inf", nemid, profile_id, pointing,
                    ));
                }
            }
        }

        write_file(&helperdir.join("emanephyinit.eel"), &contents)
    }

    fn write_testpoint_broker_conf(
        &self,
        rt: &EmoeRuntime,
        helperdir: &Path,
    ) -> Result<(), BuilderError> {
        let mut xml = String::from(
            "<otestpoint-broker discovery=\"0.0.0.0:9001\" publish=\"0.0.0.0:9002\">\n",
        );

        for (plt_name, c_name, ipv4address, node) in rt.control_endpoints() {
            if !node.testpoint_publisher {
                continue;
            }
            xml.push_str(&format!("  <!-- {plt_name}-{c_name} -->\n"));
            xml.push_str(&format!(
                "  <testpoint discovery=\"{ipv4address}:8881\" publish=\"{ipv4address}:8882\"/>\n"
            ));
        }

        xml.push_str("</otestpoint-broker>\n");

        write_file(&helperdir.join("otestpoint-broker.xml"), &xml)
    }

    /// The node view publisher: one marker per platform, proxied through
    /// a single emane-capable node that can emit position tables.
    fn write_node_view_conf(
        &self,
        rt: &mut EmoeRuntime,
        localhostdir: &Path,
    ) -> Result<(), BuilderError> {
        let mut marked: Vec<(String, i64, String)> = Vec::new();
        let mut proxy_platform: Option<String> = None;

        for ((plt_name, c_name), nemid) in rt.nemid_map() {
            if marked.iter().any(|(p, _, _)| *p == plt_name) {
                continue;
            }
            let hostname = format!("{plt_name}-{c_name}");
            let emane_node = rt
                .nodes()
                .get(&(plt_name.clone(), c_name.clone()))
                .map(|n| n.emane_node)
                .unwrap_or(false);
            marked.push((plt_name.clone(), nemid, hostname));
            if emane_node {
                proxy_platform = Some(plt_name);
            }
        }

        let Some(proxy_platform) = proxy_platform else {
            log::error!("Cannot map platforms, no emane node");
            return Ok(());
        };

        let proxy_pos = marked
            .iter()
            .position(|(p, _, _)| *p == proxy_platform)
            .expect("proxy selected from marked platforms");
        let (proxy_name, proxy_nemid, proxy_hostname) = marked.remove(proxy_pos);

        let mut xml =
            String::from("<emane-node-view-publisher endpoint=\"helper-lxc:9002\">\n");
        xml.push_str("  <nodes>\n");
        xml.push_str(&format!(
            "    <node nem-id=\"{proxy_nemid}\" color=\"#459e3c\" label=\"{proxy_name}\" \
             tag=\"{proxy_hostname}\">\n"
        ));
        xml.push_str("      <proxy>\n");
        for (plt_name, nemid, _) in marked {
            xml.push_str(&format!(
                "        <node nem-id=\"{nemid}\" color=\"#459e3c\" label=\"{plt_name}\"/>\n"
            ));
        }
        xml.push_str("      </proxy>\n");
        xml.push_str("    </node>\n");
        xml.push_str("  </nodes>\n");
        xml.push_str("</emane-node-view-publisher>\n");

        rt.add_container_port("emane-node-view", 5000);

        write_file(&localhostdir.join("emane-node-view-publisher.xml"), &xml)
    }

    /// The socket multiplexer exposes in-container service ports: the
    /// per-radio control ports sequentially from 3001, then the fixed
    /// testpoint broker ports 5002/5003, then any spectrum monitors from
    /// 5004.
    fn write_socat_mappings(
        &self,
        rt: &mut EmoeRuntime,
        localhostdir: &Path,
    ) -> Result<(), BuilderError> {
        rt.add_container_port("emexcontainerd", 3000);

        let mut contents = String::from("# container controlport endpoints\n");

        let radio_hostnames: Vec<String> = rt
            .control_endpoints()
            .iter()
            .filter(|(_, _, _, node)| node.emane_node)
            .map(|(plt, cmp, _, _)| format!("{plt}-{cmp}"))
            .collect();

        for (i, hostname) in radio_hostnames.iter().enumerate() {
            contents.push_str(&format!(
                "TCP-LISTEN:{},fork,reuseaddr TCP:{hostname}:47000\n",
                3001 + i
            ));
        }

        contents.push_str("\n# testpoint broker endpoints\n");
        contents.push_str("TCP-LISTEN:5002,fork,reuseaddr TCP:helper-lxc:9001\n");
        contents.push_str("TCP-LISTEN:5003,fork,reuseaddr TCP:helper-lxc:9002\n");
        rt.add_container_port("otestpoint-discovery", 5002);
        rt.add_container_port("otestpoint-publish", 5003);

        contents.push_str("\n# emane event service endpoint\n");
        contents.push_str(&format!(
            "UDP-RECVFROM:45703,reuseaddr,ip-add-membership={}:172.17.0.2,ip-pktinfo,fork \
             UDP4-DATAGRAM:224.1.2.8:45703,range=172.17.0.2/24,ip-multicast-ttl=8,\
             ip-multicast-if=10.76.0.250\n",
            rt.mcast_address()
        ));

        // expose any spectrum monitor ports
        let mut next_port = 5004u16;
        let monitors: Vec<String> = rt
            .emoe()
            .platforms()
            .iter()
            .flat_map(|platform| {
                platform
                    .components()
                    .filter(|c| c.kind_value() == "spectrum_monitor")
                    .map(|c| format!("{}-{}", platform.name(), c.name()))
                    .collect::<Vec<_>>()
            })
            .collect();
        for hostname in monitors {
            contents.push_str(&format!(
                "TCP-LISTEN:{next_port},fork,reuseaddr TCP:{hostname}:8801\n"
            ));
            rt.add_container_port(&hostname, next_port);
            next_port += 1;
        }

        write_file(&localhostdir.join("socat.script"), &contents)
    }

    /// Configuration items that pass through to the container.
    fn write_daemon_config_mirror(
        &self,
        config: &DaemonConfig,
        docdir: &Path,
    ) -> Result<(), BuilderError> {
        write_file(
            &docdir.join("emexd-config.csv"),
            &format!(
                "emexdirectory-action,{}\n",
                config.emexdirectory_action.keyword()
            ),
        )
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), BuilderError> {
    std::fs::write(path, contents).map_err(|source| BuilderError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The base container parameters of the container plan.
const LXC_CONTAINER_PARAMETERS: [(&str, &str); 6] = [
    ("lxc.arch", "linux64"),
    ("lxc.pty.max", "1024"),
    ("lxc.mount.entry", "proc proc proc nodev,noexec,nosuid 0 0"),
    ("lxc.mount.entry", "sysfs sys sysfs defaults 0 0"),
    ("lxc.mount.entry", "/tmp/etce tmp/etce none bind 0 0"),
    ("lxc.apparmor.profile", "unconfined"),
];

/// The init script every emulated node runs at container start.
const LXC_INIT_SCRIPT: &str = "#!/bin/bash\n\
/usr/sbin/sshd\n";

/// The execution steps of the in-container runner, in order.
const EXECUTION_STEPS: [(&str, &str); 5] = [
    ("initialize", "utils.initialize"),
    ("emane.start", "emane.emane"),
    ("traffic.prepare", "mgen.mgenremote"),
    ("traffic.run", "mgen.mgenmonitor"),
    ("finalize", "utils.finalize"),
];
