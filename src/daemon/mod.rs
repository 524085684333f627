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

//! The `emexd` daemon: listeners, the event loop and the orchestrator
//! core.
//!
//! The daemon is event driven on a single task. The protocol frontend
//! ([`broker`]) feeds every client request and agent state report into
//! one channel consumed here; the container workers wake the same
//! channel after each blocking runtime call completes. The manager never
//! blocks on the container runtime.

pub mod broker;
pub mod manager;
pub mod worker;

pub use manager::{DaemonEvent, Manager};
pub use worker::{ContainerManager, WorkerOutcome, WorkerSettings};

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use emex_model::ModelRegistry;

use crate::{config::DaemonConfig, engine::DockerCli, EmexError};

/// Run the daemon until interrupted.
pub async fn run(config: DaemonConfig) -> Result<(), EmexError> {
    let registry = match &config.model_path {
        Some(path) => ModelRegistry::load(path)?,
        None => match ModelRegistry::load_from_env() {
            Ok(registry) => registry,
            Err(e) => {
                log::warn!("{e}; starting with an empty model registry");
                ModelRegistry::default()
            }
        },
    };

    let (events_tx, mut events_rx) = mpsc::channel::<DaemonEvent>(256);

    let wake_tx = events_tx.clone();
    let wake = Box::new(move |tag: String| {
        // called from the worker threads
        let _ = wake_tx.blocking_send(DaemonEvent::WorkerWake { tag });
    });

    let mut manager = Manager::new(
        config.clone(),
        registry,
        Arc::new(DockerCli),
        WorkerSettings::default(),
        wake,
    );

    if config.stop_all_containers {
        manager.stop_all_containers();
    }

    let client_listener = TcpListener::bind((
        config.client_listen_address.as_str(),
        config.client_listen_port,
    ))
    .await?;
    log::info!(
        "listening for clients on {}:{}",
        config.client_listen_address,
        config.client_listen_port
    );
    tokio::spawn(broker::accept_clients(client_listener, events_tx.clone()));

    let container_listener = TcpListener::bind((
        config.container_listen_address.as_str(),
        config.container_listen_port,
    ))
    .await?;
    log::info!(
        "listening for containers on {}:{}",
        config.container_listen_address,
        config.container_listen_port
    );
    tokio::spawn(broker::accept_containers(
        container_listener,
        events_tx.clone(),
    ));

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                manager.handle_event(event);
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted, shutting down");
                break;
            }
        }
    }

    if config.stop_all_containers {
        manager.stop_all_containers();
        // let the worker threads finish the sweep before the process exits
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }

    Ok(())
}
