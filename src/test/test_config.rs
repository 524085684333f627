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

use pretty_assertions::assert_eq;

use crate::config::{numstr_to_numlist, DaemonConfig, DatetimeTagFormat, DirectoryAction};

#[test]
fn defaults_match_the_documented_values() {
    let config = DaemonConfig::default();

    assert_eq!(config.client_listen_address, "127.0.0.1");
    assert_eq!(config.client_listen_port, 49901);
    assert_eq!(config.container_listen_address, "172.17.0.1");
    assert_eq!(config.container_listen_port, 49902);
    assert!(!config.state_messages_enable);
    assert_eq!(*config.allowed_host_ports.iter().next().unwrap(), 9000);
    assert_eq!(*config.allowed_host_ports.iter().last().unwrap(), 9999);
    assert_eq!(config.docker_image, "emex:0.6.3");
    assert_eq!(config.emexcontainerd_loglevel, "info");
    assert!(config.stop_all_containers);
    assert_eq!(config.emexdirectory_action, DirectoryAction::Keep);
    assert_eq!(
        config.container_datetime_tag_format,
        DatetimeTagFormat::Prefix
    );
    assert_eq!(config.container_workers, 1);
}

#[test]
fn xml_elements_override_defaults() {
    let config = DaemonConfig::from_xml(
        r#"<emexd>
             <client-listen address="0.0.0.0" port="50001"/>
             <container-listen address="172.17.0.1" port="50002"/>
             <state-messages enable="true"/>
             <allowed-host-ports ports="9000-9004,9100"/>
             <docker-image name="emex:test"/>
             <emexcontainerd-loglevel level="debug"/>
             <stop-all-containers enable="false"/>
             <emexdirectory action="deleteonsuccess"/>
             <container-datetime-tag format="suffix"/>
             <container-workers count="2"/>
           </emexd>"#,
    )
    .unwrap();

    assert_eq!(config.client_listen_address, "0.0.0.0");
    assert_eq!(config.client_listen_port, 50001);
    assert_eq!(config.container_listen_port, 50002);
    assert!(config.state_messages_enable);
    assert_eq!(
        config.allowed_host_ports.iter().copied().collect::<Vec<_>>(),
        vec![9000, 9001, 9002, 9003, 9004, 9100]
    );
    assert_eq!(config.docker_image, "emex:test");
    assert_eq!(config.emexcontainerd_loglevel, "debug");
    assert!(!config.stop_all_containers);
    assert_eq!(config.emexdirectory_action, DirectoryAction::DeleteOnSuccess);
    assert_eq!(
        config.container_datetime_tag_format,
        DatetimeTagFormat::Suffix
    );
    assert_eq!(config.container_workers, 2);
}

#[test]
fn malformed_documents_are_fatal() {
    assert!(DaemonConfig::from_xml("<emexd><unclosed></emexd>").is_err());
    assert!(DaemonConfig::from_xml("<emexd><no-such-element/></emexd>").is_err());
    assert!(
        DaemonConfig::from_xml(r#"<emexd><emexdirectory action="sometimes"/></emexd>"#).is_err()
    );
}

#[test]
fn numstrings_accept_commas_and_ranges() {
    assert_eq!(
        numstr_to_numlist("1,2,5-8").unwrap().into_iter().collect::<Vec<_>>(),
        vec![1, 2, 5, 6, 7, 8]
    );
    assert!(numstr_to_numlist("5-1").is_err());
    assert!(numstr_to_numlist("a,b").is_err());
}

#[test]
fn cpu_id_zero_is_never_allocatable() {
    let config = DaemonConfig::from_xml(r#"<emexd><allowed-cpus ids="0-2"/></emexd>"#).unwrap();
    assert!(!config.allowed_cpus.contains(&0));
}
