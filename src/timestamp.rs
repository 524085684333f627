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

//! Strictly increasing timestamps identifying EMOE instances.

use std::path::PathBuf;

use time::OffsetDateTime;

/// One issued timestamp. Derives the EMOE id, the per-EMOE working
/// directory and the raw-event multicast address.
#[derive(Debug, Clone)]
pub struct Timestamp {
    unix: i64,
    hostname: String,
    emex_workdir: PathBuf,
}

impl Timestamp {
    /// Create a timestamp at a fixed instant.
    pub fn at(unix: i64, hostname: impl Into<String>, emex_workdir: impl Into<PathBuf>) -> Self {
        Self {
            unix,
            hostname: hostname.into(),
            emex_workdir: emex_workdir.into(),
        }
    }

    /// The unix timestamp in seconds.
    pub fn unix(&self) -> i64 {
        self.unix
    }

    /// The EMOE id: `<hostname>.<YYYYmmddTHHMMSS>`. Ids issued by one
    /// [`Timestamper`] are strictly increasing.
    pub fn emoe_id(&self) -> String {
        let t = OffsetDateTime::from_unix_timestamp(self.unix)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        format!(
            "{}.{:04}{:02}{:02}T{:02}{:02}{:02}",
            self.hostname,
            t.year(),
            t.month() as u8,
            t.day(),
            t.hour(),
            t.minute(),
            t.second()
        )
    }

    /// The working directory of the EMOE: `<workdir>/<emoe_id>.<tag>`.
    pub fn workdir(&self, tag: &str) -> PathBuf {
        self.emex_workdir.join(format!("{}.{tag}", self.emoe_id()))
    }

    /// A per-EMOE multicast address in `239.0.0.0/8` derived from the
    /// timestamp, used for the raw emulator event channel.
    pub fn mcast_address(&self) -> String {
        let ts = self.unix;
        format!(
            "239.{}.{}.{}",
            ts / 256 / 256 % 256,
            ts / 256 % 256,
            ts % 256
        )
    }
}

/// Issues strictly increasing [`Timestamp`]s anchored on the wall clock.
#[derive(Debug)]
pub struct Timestamper {
    last_timestamp: i64,
    hostname: String,
    emex_workdir: PathBuf,
}

impl Timestamper {
    /// Create a timestamper rooted at the given working directory.
    pub fn new(emex_workdir: impl Into<PathBuf>) -> Self {
        Self {
            last_timestamp: 0,
            hostname: hostname(),
            emex_workdir: emex_workdir.into(),
        }
    }

    /// Take the next timestamp. Strictly increasing even when the wall
    /// clock did not advance a full second since the last call.
    pub fn next_timestamp(&mut self) -> Timestamp {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let next = now.max(self.last_timestamp + 1);
        self.last_timestamp = next;

        Timestamp {
            unix: next,
            hostname: self.hostname.clone(),
            emex_workdir: self.emex_workdir.clone(),
        }
    }
}

/// The local hostname, falling back to `localhost`.
fn hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.is_empty() {
            return name;
        }
    }
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}
