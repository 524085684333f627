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

//! The interactive EMOE builder shell.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use emex_model::{
    registry::values_from_yaml, AntennaDescription, EmoeDescription, InitialCondition,
    PlatformDescription, Pov,
};

use super::{client::EmexdClient, DriverError};

const HELP: &str = "\
commands:
  listmodels                              list installed platform and antenna types
  buildantenna NAME TYPE                  add an antenna to the emoe under construction
  buildplatform NAME TYPE                 add a platform to the emoe under construction
  setparam PLATFORM C.PG.P VALUE[,VALUE]  set a platform parameter
  setlocation PLATFORM LAT LON ALT        set a platform's initial position
  startemoe NAME                          submit the emoe under construction
  listemoes                               list this session's emoes
  stopemoe HANDLE                         stop an emoe by handle
  help                                    show this help
  quit                                    leave the shell
";

/// Run the interactive shell against a daemon.
pub fn run_shell(address: &str, port: u16) -> Result<(), DriverError> {
    let mut client = EmexdClient::connect(address, port)?;
    let (platformtypes, antennatypes) = client.model_types()?;

    let mut platforms: BTreeMap<String, PlatformDescription> = BTreeMap::new();
    let mut antennas: BTreeMap<String, AntennaDescription> = BTreeMap::new();
    let mut locations: BTreeMap<String, Pov> = BTreeMap::new();

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        print!("emex> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((command, args)) = tokens.split_first() else {
            continue;
        };

        let result = match *command {
            "help" => {
                print!("{HELP}");
                Ok(())
            }
            "quit" | "exit" => return Ok(()),
            "listmodels" => {
                println!("platform types:");
                for ptype in &platformtypes {
                    println!("  {}: {}", ptype.name(), ptype.description());
                }
                println!("antenna types:");
                for atype in &antennatypes {
                    println!("  {}: {}", atype.name(), atype.description());
                }
                Ok(())
            }
            "buildantenna" => build_antenna(args, &mut antennas),
            "buildplatform" => build_platform(args, &mut platforms),
            "setparam" => set_param(args, &mut platforms),
            "setlocation" => set_location(args, &mut locations),
            "startemoe" => start_emoe(
                args,
                &mut client,
                &platforms,
                &antennas,
                &locations,
            ),
            "listemoes" => list_emoes(&mut client),
            "stopemoe" => stop_emoe(args, &mut client),
            other => {
                println!("unknown command \"{other}\", try \"help\"");
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("error: {e}");
        }
    }
}

fn build_antenna(
    args: &[&str],
    antennas: &mut BTreeMap<String, AntennaDescription>,
) -> Result<(), DriverError> {
    let [name, antenna_type] = args else {
        println!("usage: buildantenna NAME TYPE");
        return Ok(());
    };
    antennas.insert(
        name.to_string(),
        AntennaDescription {
            name: name.to_string(),
            antenna_type: antenna_type.to_string(),
            parameters: BTreeMap::new(),
        },
    );
    println!("antenna {name} ({antenna_type}) added");
    Ok(())
}

fn build_platform(
    args: &[&str],
    platforms: &mut BTreeMap<String, PlatformDescription>,
) -> Result<(), DriverError> {
    let [name, platform_type] = args else {
        println!("usage: buildplatform NAME TYPE");
        return Ok(());
    };
    platforms.insert(
        name.to_string(),
        PlatformDescription {
            name: name.to_string(),
            platform_type: platform_type.to_string(),
            labels: BTreeMap::new(),
            parameters: BTreeMap::new(),
        },
    );
    println!("platform {name} ({platform_type}) added");
    Ok(())
}

fn set_param(
    args: &[&str],
    platforms: &mut BTreeMap<String, PlatformDescription>,
) -> Result<(), DriverError> {
    let [platform, path, values] = args else {
        println!("usage: setparam PLATFORM C.PG.P VALUE[,VALUE]");
        return Ok(());
    };
    let Some(description) = platforms.get_mut(*platform) else {
        println!("no platform named \"{platform}\"");
        return Ok(());
    };
    if path.splitn(3, '.').count() != 3 {
        println!("parameter path must be C.PG.P");
        return Ok(());
    }

    let values = values
        .split(',')
        .flat_map(|v| values_from_yaml(Some(serde_yaml::Value::String(v.to_string()))))
        .collect();
    description.parameters.insert(path.to_string(), values);
    println!("{platform} {path} set");
    Ok(())
}

fn set_location(args: &[&str], locations: &mut BTreeMap<String, Pov>) -> Result<(), DriverError> {
    let [platform, lat, lon, alt] = args else {
        println!("usage: setlocation PLATFORM LAT LON ALT");
        return Ok(());
    };
    let (Ok(latitude), Ok(longitude), Ok(altitude)) =
        (lat.parse(), lon.parse(), alt.parse())
    else {
        println!("latitude, longitude and altitude must be numbers");
        return Ok(());
    };
    locations.insert(
        platform.to_string(),
        Pov {
            component_names: vec![],
            latitude,
            longitude,
            altitude,
            azimuth: 0.0,
            elevation: 0.0,
            speed: 0.0,
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
        },
    );
    println!("{platform} location set");
    Ok(())
}

fn start_emoe(
    args: &[&str],
    client: &mut EmexdClient,
    platforms: &BTreeMap<String, PlatformDescription>,
    antennas: &BTreeMap<String, AntennaDescription>,
    locations: &BTreeMap<String, Pov>,
) -> Result<(), DriverError> {
    let [name] = args else {
        println!("usage: startemoe NAME");
        return Ok(());
    };

    let description = EmoeDescription {
        name: name.to_string(),
        platforms: platforms.values().cloned().collect(),
        antennas: antennas.values().cloned().collect(),
        initial_conditions: locations
            .iter()
            .map(|(platform, pov)| {
                InitialCondition::new(platform.clone(), Some(pov.clone()), vec![], vec![])
            })
            .collect(),
    };

    match client.start_emoe(&description) {
        Ok(handle) => println!("{name} started with handle {handle}"),
        Err(e) => println!("{e}"),
    }
    Ok(())
}

fn list_emoes(client: &mut EmexdClient) -> Result<(), DriverError> {
    let (total_cpus, available_cpus, entries) = client.list_emoes()?;
    println!("total cpus: {total_cpus}, available cpus: {available_cpus}");
    for entry in entries {
        println!(
            "  {} {} state:{} cpus:{}",
            entry.handle, entry.emoe_name, entry.state, entry.cpus
        );
        for accessor in entry.service_accessors {
            println!(
                "    {}: {}:{}",
                accessor.name, accessor.ip_address, accessor.port
            );
        }
    }
    Ok(())
}

fn stop_emoe(args: &[&str], client: &mut EmexdClient) -> Result<(), DriverError> {
    let [handle] = args else {
        println!("usage: stopemoe HANDLE");
        return Ok(());
    };
    let (ok, message) = client.stop_emoe(handle)?;
    println!("{}: {message}", if ok { "PASS" } else { "FAIL" });
    Ok(())
}
