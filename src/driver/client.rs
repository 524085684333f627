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

//! Blocking remote procedure call clients for the daemon and the
//! in-container agent.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpStream;

use serde::de::DeserializeOwned;
use serde::Serialize;

use emex_model::{
    scenario::EventSet, AntennaType, EmoeDescription, ModelRegistry, PlatformType,
};
use emex_proto::{
    frame, ClientMessage, FlowRecord, FrameReader, ListEmoesEntry, ScenarioReply,
    ScenarioRequest, ServerMessage,
};

use super::DriverError;

/// A framed blocking connection.
struct RpcStream {
    stream: TcpStream,
    reader: FrameReader,
    pending: VecDeque<Vec<u8>>,
}

impl RpcStream {
    fn connect(address: &str, port: u16) -> Result<Self, DriverError> {
        log::info!("Connecting to {address}:{port}");
        Ok(Self {
            stream: TcpStream::connect((address, port))?,
            reader: FrameReader::new(),
            pending: VecDeque::new(),
        })
    }

    fn send<T: Serialize>(&mut self, message: &T) -> Result<(), DriverError> {
        let bytes = frame::encode_message(message)?;
        self.stream.write_all(&bytes)?;
        Ok(())
    }

    fn recv<T: DeserializeOwned>(&mut self) -> Result<T, DriverError> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                return Ok(serde_json::from_slice(&payload)?);
            }

            let mut buf = [0u8; 65536];
            let n = self.stream.read(&mut buf)?;
            if n == 0 {
                return Err(DriverError::ConnectionClosed);
            }
            self.pending.extend(self.reader.push(&buf[..n])?);
        }
    }
}

/// The client side of the client ↔ daemon protocol.
pub struct EmexdClient {
    rpc: RpcStream,
}

impl EmexdClient {
    /// Connect to a daemon.
    pub fn connect(address: &str, port: u16) -> Result<Self, DriverError> {
        Ok(Self {
            rpc: RpcStream::connect(address, port)?,
        })
    }

    /// One request/reply exchange. Unsolicited state transition events
    /// arriving in between are logged and skipped.
    fn request(&mut self, message: &ClientMessage) -> Result<ServerMessage, DriverError> {
        self.rpc.send(message)?;
        loop {
            match self.rpc.recv::<ServerMessage>()? {
                ServerMessage::EmoeStateTransitionEvent {
                    emoe_name, state, ..
                } => {
                    log::info!("emoe {emoe_name} transitioned to state {state}");
                }
                reply => return Ok(reply),
            }
        }
    }

    /// Fetch the installed model types as a client-side registry.
    pub fn models(&mut self) -> Result<ModelRegistry, DriverError> {
        match self.request(&ClientMessage::ModelTypesRequest)? {
            ServerMessage::ModelTypesReply {
                platformtypes,
                antennatypes,
            } => Ok(ModelRegistry::from_parts(platformtypes, antennatypes)),
            other => Err(DriverError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// Fetch the raw model type lists.
    pub fn model_types(
        &mut self,
    ) -> Result<(Vec<PlatformType>, Vec<AntennaType>), DriverError> {
        match self.request(&ClientMessage::ModelTypesRequest)? {
            ServerMessage::ModelTypesReply {
                platformtypes,
                antennatypes,
            } => Ok((platformtypes, antennatypes)),
            other => Err(DriverError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// Validate an EMOE against the daemon.
    pub fn check_emoe(
        &mut self,
        emoe: &EmoeDescription,
    ) -> Result<(bool, String), DriverError> {
        let request = ClientMessage::CheckEmoeRequest {
            emoe_name: emoe.name.clone(),
            emoe: emoe.clone(),
        };
        match self.request(&request)? {
            ServerMessage::CheckEmoeReply {
                result, message, ..
            } => Ok((result, message)),
            other => Err(DriverError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// Start an EMOE, returning its handle.
    pub fn start_emoe(&mut self, emoe: &EmoeDescription) -> Result<String, DriverError> {
        let request = ClientMessage::StartEmoeRequest {
            emoe_name: emoe.name.clone(),
            emoe: emoe.clone(),
        };
        match self.request(&request)? {
            ServerMessage::StartEmoeReply {
                emoe_name,
                result,
                message,
                handle,
            } => {
                if result {
                    log::info!(
                        "{emoe_name} successfully started with message \"{message}\"."
                    );
                    Ok(handle)
                } else {
                    Err(DriverError::Failed(format!(
                        "{emoe_name} start failed with message \"{message}\"."
                    )))
                }
            }
            other => Err(DriverError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// List the EMOEs of this session.
    pub fn list_emoes(&mut self) -> Result<(u32, u32, Vec<ListEmoesEntry>), DriverError> {
        match self.request(&ClientMessage::ListEmoesRequest)? {
            ServerMessage::ListEmoesReply {
                total_cpus,
                available_cpus,
                entries,
            } => Ok((total_cpus, available_cpus, entries)),
            other => Err(DriverError::UnexpectedReply(format!("{other:?}"))),
        }
    }

    /// Stop an EMOE by handle.
    pub fn stop_emoe(&mut self, handle: &str) -> Result<(bool, String), DriverError> {
        let request = ClientMessage::StopEmoeRequest {
            handle: handle.to_string(),
        };
        match self.request(&request)? {
            ServerMessage::StopEmoeReply {
                result, message, ..
            } => Ok((result, message)),
            other => Err(DriverError::UnexpectedReply(format!("{other:?}"))),
        }
    }
}

/// The client side of the agent's scenario protocol. Enforces one
/// request/reply exchange per event batch.
pub struct ScenarioClient {
    rpc: RpcStream,
    client_sequence: u32,
    list_flows: bool,
}

impl ScenarioClient {
    /// Connect to the agent's scenario port.
    pub fn connect(address: &str, port: u16, list_flows: bool) -> Result<Self, DriverError> {
        Ok(Self {
            rpc: RpcStream::connect(address, port)?,
            client_sequence: 1,
            list_flows,
        })
    }

    /// Deliver one event batch and wait for the reply.
    pub fn send_events(
        &mut self,
        events: &EventSet,
    ) -> Result<(bool, String, Vec<FlowRecord>), DriverError> {
        let request = ScenarioRequest {
            client_sequence: self.client_sequence,
            list_flows: self.list_flows,
            events: events.clone(),
        };
        self.client_sequence += 1;

        self.rpc.send(&request)?;
        let reply: ScenarioReply = self.rpc.recv()?;

        Ok((reply.result, reply.message, reply.flows))
    }
}
