// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;

use crate::{ChannelId, Cycle, HubId, TileId};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Error {
    ConfigFile(String),
    ConfigSyntax(String),
    UnknownMacPolicy(ChannelId, String),
    MissingPolicyParameter(ChannelId, &'static str),
    MalformedPolicyParameter(ChannelId, String),
    EmptyRing(ChannelId),
    DuplicateHub(ChannelId, HubId),
    HoldTooShort {
        channel: ChannelId,
        wireless_cycles: Cycle,
        max_hold: Cycle,
    },
    UnknownChannel(ChannelId),
    UnknownHub(ChannelId, HubId),
    InvalidTile(TileId),
    NoRoute(TileId, TileId),
    UnknownAlgorithm(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ConfigFile(reason) => {
                write!(f, "ERROR: cannot read configuration: {}", reason)
            }
            Self::ConfigSyntax(reason) => {
                write!(f, "ERROR: cannot parse configuration: {}", reason)
            }
            Self::UnknownMacPolicy(channel, tag) => {
                write!(f, "ERROR: unknown MAC policy {:?} for channel {}", tag, channel)
            }
            Self::MissingPolicyParameter(channel, what) => {
                write!(
                    f,
                    "ERROR: missing {} in the MAC policy of channel {}",
                    what, channel
                )
            }
            Self::MalformedPolicyParameter(channel, raw) => {
                write!(
                    f,
                    "ERROR: MAC policy parameter {:?} of channel {} is not a cycle count",
                    raw, channel
                )
            }
            Self::EmptyRing(channel) => {
                write!(f, "ERROR: channel {} has an empty token ring", channel)
            }
            Self::DuplicateHub(channel, hub) => {
                write!(
                    f,
                    "ERROR: hub {} appears more than once in the ring of channel {}",
                    hub, channel
                )
            }
            Self::HoldTooShort {
                channel,
                wireless_cycles,
                max_hold,
            } => {
                write!(
                    f,
                    "ERROR: channel {} needs {} cycles per flit but may hold the token for only {}",
                    channel, wireless_cycles, max_hold
                )
            }
            Self::UnknownChannel(channel) => {
                write!(f, "ERROR: channel {} is not configured", channel)
            }
            Self::UnknownHub(channel, hub) => {
                write!(f, "ERROR: hub {} is not on the ring of channel {}", hub, channel)
            }
            Self::InvalidTile(tile) => {
                write!(f, "ERROR: tile {} is outside the mesh", tile)
            }
            Self::NoRoute(current, dst) => {
                write!(f, "ERROR: no valid direction from tile {} to tile {}", current, dst)
            }
            Self::UnknownAlgorithm(name) => {
                write!(f, "ERROR: routing algorithm {:?} is not registered", name)
            }
        }
    }
}

// needed to allow `anyhow::Result` in the driver apps to absorb our
// definition of errors.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
