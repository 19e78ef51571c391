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

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::Error;
use crate::{ChannelId, Cycle, HubId, TileId};

/// Policy tags as they appear in configuration files.
pub const TOKEN_PACKET: &str = "TOKEN_PACKET";
pub const TOKEN_HOLD: &str = "TOKEN_HOLD";
pub const TOKEN_MAX_HOLD: &str = "TOKEN_MAX_HOLD";
pub const BMAC_BIDIRECTIONAL: &str = "BMAC_BIDIRECTIONAL";

/// Hold window for bidirectional channels that do not configure one.
pub const DEFAULT_BMAC_HOLD_WINDOW: Cycle = 10;
/// Cycles after which a transmission counts as finished, unless configured.
pub const DEFAULT_MIN_COMPLETE_CYCLES: Cycle = 5;

/// Serpentine hub order used when a bidirectional channel omits its ring.
///
/// Covers the canonical 16-hub layout over the 8x8 mesh.
pub const DEFAULT_BIDIRECTIONAL_RING: [HubId; 16] =
    [0, 1, 2, 3, 7, 6, 5, 9, 10, 11, 15, 14, 13, 12, 8, 4];

/// A channel's MAC policy, parsed once at init from the configured tag and
/// parameter strings. The per-tick hot path dispatches on this.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MacPolicy {
    /// The holder keeps the token until it releases its request flag.
    TokenPacket,
    /// Strict round-robin with a fixed time quantum; flags are ignored.
    TokenHold { max_cycles: Cycle },
    /// Round-robin with an upper bound and early release via the flag.
    TokenMaxHold { max_cycles: Cycle },
    /// Bidirectional adaptive ring, managed by the BMAC controller.
    Bidirectional { hold_window: Cycle, min_complete: Cycle },
}

impl MacPolicy {
    /// Parse the `[tag, params...]` strings of one channel.
    pub fn parse(channel: ChannelId, tags: &[String]) -> Result<Self, Error> {
        let tag = tags
            .first()
            .ok_or(Error::MissingPolicyParameter(channel, "policy tag"))?;
        match tag.as_str() {
            TOKEN_PACKET => Ok(Self::TokenPacket),
            TOKEN_HOLD => Ok(Self::TokenHold {
                max_cycles: required_cycles(channel, tags, 1)?,
            }),
            TOKEN_MAX_HOLD => Ok(Self::TokenMaxHold {
                max_cycles: required_cycles(channel, tags, 1)?,
            }),
            BMAC_BIDIRECTIONAL => Ok(Self::Bidirectional {
                hold_window: optional_cycles(channel, tags, 1)?
                    .unwrap_or(DEFAULT_BMAC_HOLD_WINDOW),
                min_complete: optional_cycles(channel, tags, 2)?
                    .unwrap_or(DEFAULT_MIN_COMPLETE_CYCLES),
            }),
            _ => Err(Error::UnknownMacPolicy(channel, tag.clone())),
        }
    }

    /// Countdown loaded on construction and on reset.
    pub fn initial_countdown(&self) -> Cycle {
        match self {
            Self::TokenHold { max_cycles } | Self::TokenMaxHold { max_cycles } => *max_cycles,
            Self::TokenPacket | Self::Bidirectional { .. } => 0,
        }
    }
}

fn required_cycles(channel: ChannelId, tags: &[String], index: usize) -> Result<Cycle, Error> {
    optional_cycles(channel, tags, index)?
        .ok_or(Error::MissingPolicyParameter(channel, "max hold cycles"))
}

fn optional_cycles(
    channel: ChannelId,
    tags: &[String],
    index: usize,
) -> Result<Option<Cycle>, Error> {
    match tags.get(index) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<Cycle>()
            .map(Some)
            .map_err(|_| Error::MalformedPolicyParameter(channel, raw.clone())),
    }
}

/// One channel as written in the configuration file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChannelSpec {
    /// Ordered ring of member hubs. May be left empty for bidirectional
    /// channels, which then fall back to the serpentine default order.
    #[serde(default)]
    pub ring: Vec<HubId>,
    /// `[tag, params...]`, see the policy tag constants.
    pub mac_policy: Vec<String>,
    pub data_rate_gbps: f64,
    pub flit_size_bits: usize,
}

/// The raw configuration file.
///
/// Constructed programmatically or read from a YAML file, then validated
/// into a [`Configuration`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ConfigSpec {
    pub clock_period_ps: f64,
    pub mesh_dim_x: usize,
    pub mesh_dim_y: usize,
    /// Manhattan distance above which wireless delivery is preferred.
    pub da_threshold: usize,
    pub use_wireless: bool,
    /// tile -> hub ownership; the 2x2-block default applies when empty.
    #[serde(default)]
    pub hub_map: BTreeMap<TileId, HubId>,
    pub channels: BTreeMap<ChannelId, ChannelSpec>,
}

/// A validated channel: ring checked, policy parsed.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub ring: Vec<HubId>,
    pub policy: MacPolicy,
    pub data_rate_gbps: f64,
    pub flit_size_bits: usize,
}

/// The immutable configuration view shared by the arbiter and the routing
/// oracles. Built once at init; never mutated afterwards.
#[derive(Clone, Debug)]
pub struct Configuration {
    pub clock_period_ps: f64,
    pub mesh_dim_x: usize,
    pub mesh_dim_y: usize,
    pub da_threshold: usize,
    pub use_wireless: bool,
    pub hub_map: BTreeMap<TileId, HubId>,
    pub channels: BTreeMap<ChannelId, ChannelConfig>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            clock_period_ps: 1000.0,
            mesh_dim_x: 8,
            mesh_dim_y: 8,
            da_threshold: 5,
            use_wireless: true,
            hub_map: default_hub_map(8, 8),
            channels: BTreeMap::new(),
        }
    }
}

impl Configuration {
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)
            .map_err(|e| Error::ConfigFile(format!("{}: {}", path.display(), e)))?;
        let reader = BufReader::new(file);
        let spec: ConfigSpec =
            serde_yaml::from_reader(reader).map_err(|e| Error::ConfigSyntax(e.to_string()))?;
        Self::validate(spec)
    }

    pub fn from_str(config: &str) -> Result<Self, Error> {
        let spec: ConfigSpec =
            serde_yaml::from_str(config).map_err(|e| Error::ConfigSyntax(e.to_string()))?;
        Self::validate(spec)
    }

    /// Check every channel and resolve defaults. All configuration errors
    /// surface here; past this point the view is trusted.
    pub fn validate(spec: ConfigSpec) -> Result<Self, Error> {
        let mut channels = BTreeMap::new();
        for (channel, raw) in spec.channels {
            let policy = MacPolicy::parse(channel, &raw.mac_policy)?;
            let ring = if raw.ring.is_empty() {
                match policy {
                    MacPolicy::Bidirectional { .. } => {
                        log::info!(
                            "channel {} uses the default bidirectional ring order",
                            channel
                        );
                        DEFAULT_BIDIRECTIONAL_RING.to_vec()
                    }
                    _ => return Err(Error::EmptyRing(channel)),
                }
            } else {
                raw.ring
            };
            let mut seen = BTreeSet::new();
            for &hub in &ring {
                if !seen.insert(hub) {
                    return Err(Error::DuplicateHub(channel, hub));
                }
            }
            if let MacPolicy::TokenHold { max_cycles } | MacPolicy::TokenMaxHold { max_cycles } =
                policy
            {
                let wireless_cycles = wireless_latency_cycles(
                    spec.clock_period_ps,
                    raw.data_rate_gbps,
                    raw.flit_size_bits,
                );
                if wireless_cycles >= max_cycles {
                    return Err(Error::HoldTooShort {
                        channel,
                        wireless_cycles,
                        max_hold: max_cycles,
                    });
                }
            }
            channels.insert(
                channel,
                ChannelConfig {
                    ring,
                    policy,
                    data_rate_gbps: raw.data_rate_gbps,
                    flit_size_bits: raw.flit_size_bits,
                },
            );
        }
        let hub_map = if spec.hub_map.is_empty() {
            default_hub_map(spec.mesh_dim_x, spec.mesh_dim_y)
        } else {
            spec.hub_map
        };
        Ok(Self {
            clock_period_ps: spec.clock_period_ps,
            mesh_dim_x: spec.mesh_dim_x,
            mesh_dim_y: spec.mesh_dim_y,
            da_threshold: spec.da_threshold,
            use_wireless: spec.use_wireless,
            hub_map,
            channels,
        })
    }

    /// The hub attached to a tile, if any.
    pub fn hub_of(&self, tile: TileId) -> Option<HubId> {
        self.hub_map.get(&tile).copied()
    }

    /// Two distinct hubs can communicate iff some channel's ring contains
    /// both. A hub never talks to itself over the radio.
    pub fn hubs_can_communicate(&self, a: HubId, b: HubId) -> bool {
        if a == b {
            return false;
        }
        self.channels
            .values()
            .any(|c| c.ring.contains(&a) && c.ring.contains(&b))
    }
}

/// Cycles one flit occupies the radio:
/// `ceil(flit_size / data_rate * 1000 / clock_period)`.
pub fn wireless_latency_cycles(
    clock_period_ps: f64,
    data_rate_gbps: f64,
    flit_size_bits: usize,
) -> Cycle {
    let delay_ps = 1000.0 * flit_size_bits as f64 / data_rate_gbps;
    (delay_ps / clock_period_ps).ceil() as Cycle
}

/// Default tile -> hub ownership: each hub owns a 2x2 tile block,
/// `hub = (y / 2) * (mesh_dim_x / 2) + x / 2`.
pub fn default_hub_map(mesh_dim_x: usize, mesh_dim_y: usize) -> BTreeMap<TileId, HubId> {
    let hubs_per_row = (mesh_dim_x / 2).max(1);
    (0..mesh_dim_y)
        .cartesian_product(0..mesh_dim_x)
        .map(|(y, x)| (y * mesh_dim_x + x, (y / 2) * hubs_per_row + x / 2))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONF: &str = "---
clock_period_ps: 1000.0
mesh_dim_x: 8
mesh_dim_y: 8
da_threshold: 5
use_wireless: true
channels:
  0:
    ring: [0, 1, 2, 3]
    mac_policy: [TOKEN_HOLD, '8']
    data_rate_gbps: 16.0
    flit_size_bits: 32
  1:
    ring: [4, 5, 6, 7]
    mac_policy: [TOKEN_PACKET]
    data_rate_gbps: 16.0
    flit_size_bits: 32
  2:
    mac_policy: [BMAC_BIDIRECTIONAL, '12', '3']
    data_rate_gbps: 16.0
    flit_size_bits: 32
";

    #[test]
    fn read_yaml_config() {
        let _logger = env_logger::builder().try_init();
        let config = Configuration::from_str(CONF).unwrap();
        assert_eq!(config.mesh_dim_x, 8);
        assert_eq!(config.channels.len(), 3);
        assert_eq!(config.channels[&0].ring, vec![0, 1, 2, 3]);
        assert_eq!(
            config.channels[&0].policy,
            MacPolicy::TokenHold { max_cycles: 8 }
        );
        assert_eq!(config.channels[&1].policy, MacPolicy::TokenPacket);
        assert_eq!(
            config.channels[&2].policy,
            MacPolicy::Bidirectional {
                hold_window: 12,
                min_complete: 3
            }
        );
        // omitted ring of a bidirectional channel falls back to the default
        assert_eq!(config.channels[&2].ring, DEFAULT_BIDIRECTIONAL_RING.to_vec());
        // omitted hub map is materialized from the 2x2-block formula
        assert_eq!(config.hub_of(0), Some(0));
        assert_eq!(config.hub_of(63), Some(15));
    }

    #[test]
    fn write_yaml_config() {
        let spec = ConfigSpec {
            clock_period_ps: 1000.0,
            mesh_dim_x: 4,
            mesh_dim_y: 4,
            da_threshold: 3,
            use_wireless: false,
            hub_map: BTreeMap::new(),
            channels: BTreeMap::from([(
                0,
                ChannelSpec {
                    ring: vec![0, 1],
                    mac_policy: vec![TOKEN_PACKET.to_string()],
                    data_rate_gbps: 16.0,
                    flit_size_bits: 32,
                },
            )]),
        };
        let text = serde_yaml::to_string(&spec).unwrap();
        let config = Configuration::from_str(&text).unwrap();
        assert_eq!(config.channels[&0].policy, MacPolicy::TokenPacket);
    }

    #[test]
    fn bidirectional_defaults() {
        let policy =
            MacPolicy::parse(0, &[BMAC_BIDIRECTIONAL.to_string()]).unwrap();
        assert_eq!(
            policy,
            MacPolicy::Bidirectional {
                hold_window: DEFAULT_BMAC_HOLD_WINDOW,
                min_complete: DEFAULT_MIN_COMPLETE_CYCLES
            }
        );
    }

    #[test]
    fn unknown_policy_tag() {
        let err = MacPolicy::parse(3, &["TOKEN_RING".to_string()]).unwrap_err();
        assert_eq!(err, Error::UnknownMacPolicy(3, "TOKEN_RING".to_string()));
    }

    #[test]
    fn missing_hold_parameter() {
        let err = MacPolicy::parse(1, &[TOKEN_HOLD.to_string()]).unwrap_err();
        assert_eq!(err, Error::MissingPolicyParameter(1, "max hold cycles"));
    }

    #[test]
    fn malformed_hold_parameter() {
        let err =
            MacPolicy::parse(1, &[TOKEN_HOLD.to_string(), "ten".to_string()]).unwrap_err();
        assert_eq!(err, Error::MalformedPolicyParameter(1, "ten".to_string()));
    }

    #[test]
    fn hold_window_vs_wireless_latency() {
        // 32 bits at 16 Gbps is 2000 ps, i.e. 2 cycles at 1000 ps: a hold
        // quantum of 2 cannot fit one flit.
        let conf = "---
clock_period_ps: 1000.0
mesh_dim_x: 8
mesh_dim_y: 8
da_threshold: 5
use_wireless: true
channels:
  0:
    ring: [0, 1]
    mac_policy: [TOKEN_HOLD, '2']
    data_rate_gbps: 16.0
    flit_size_bits: 32
";
        let err = Configuration::from_str(conf).unwrap_err();
        assert_eq!(
            err,
            Error::HoldTooShort {
                channel: 0,
                wireless_cycles: 2,
                max_hold: 2
            }
        );
    }

    #[test]
    fn empty_ring_is_fatal() {
        let conf = "---
clock_period_ps: 1000.0
mesh_dim_x: 8
mesh_dim_y: 8
da_threshold: 5
use_wireless: true
channels:
  0:
    mac_policy: [TOKEN_PACKET]
    data_rate_gbps: 16.0
    flit_size_bits: 32
";
        assert_eq!(
            Configuration::from_str(conf).unwrap_err(),
            Error::EmptyRing(0)
        );
    }

    #[test]
    fn duplicate_hub_is_fatal() {
        let conf = "---
clock_period_ps: 1000.0
mesh_dim_x: 8
mesh_dim_y: 8
da_threshold: 5
use_wireless: true
channels:
  0:
    ring: [0, 1, 0]
    mac_policy: [TOKEN_PACKET]
    data_rate_gbps: 16.0
    flit_size_bits: 32
";
        assert_eq!(
            Configuration::from_str(conf).unwrap_err(),
            Error::DuplicateHub(0, 0)
        );
    }

    #[test]
    fn wireless_latency_rounds_up() {
        assert_eq!(wireless_latency_cycles(1000.0, 16.0, 32), 2);
        assert_eq!(wireless_latency_cycles(1000.0, 16.0, 33), 3);
        assert_eq!(wireless_latency_cycles(500.0, 16.0, 32), 4);
    }

    #[test]
    fn default_hub_map_blocks() {
        let map = default_hub_map(8, 8);
        assert_eq!(map.len(), 64);
        // hub 0 owns tiles (0..2, 0..2)
        assert_eq!(map[&0], 0);
        assert_eq!(map[&1], 0);
        assert_eq!(map[&8], 0);
        assert_eq!(map[&9], 0);
        // opposite corner block belongs to hub 15
        assert_eq!(map[&63], 15);
        assert_eq!(map[&54], 15);
        // one hub row below the top: tile (0, 2)
        assert_eq!(map[&16], 4);
    }

    #[test]
    fn hubs_share_channel() {
        let config = Configuration::from_str(CONF).unwrap();
        assert!(config.hubs_can_communicate(0, 3));
        assert!(config.hubs_can_communicate(4, 7));
        // hubs 0 and 15 only meet on the bidirectional channel's default ring
        assert!(config.hubs_can_communicate(0, 15));
        assert!(!config.hubs_can_communicate(3, 3));
    }
}
