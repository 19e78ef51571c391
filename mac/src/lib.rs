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

mod bmac;
mod config;
mod error;
mod routing;
mod token_ring;

// Public types
// type to use for cycles
pub type Cycle = usize;
// dense small-integer ids; state tables are indexed by them
pub type ChannelId = usize;
pub type HubId = usize;
pub type TileId = usize;

pub use crate::bmac::{
    BmacChannel, CycleThreshold, HubMacState, MacState, RingDirection, TransmissionStatus,
    OPTIMIZE_PERIOD,
};
pub use crate::config::{
    default_hub_map, wireless_latency_cycles, ChannelConfig, ChannelSpec, ConfigSpec,
    Configuration, MacPolicy, BMAC_BIDIRECTIONAL, DEFAULT_BIDIRECTIONAL_RING,
    DEFAULT_BMAC_HOLD_WINDOW, DEFAULT_MIN_COMPLETE_CYCLES, TOKEN_HOLD, TOKEN_MAX_HOLD,
    TOKEN_PACKET,
};
pub use crate::error::Error;
pub use crate::routing::{
    coord_tile, tile_coord, Coord, Direction, DistanceAware, RouteData, RoutingAlgorithm,
    RoutingRegistry, XyRouting,
};
pub use crate::token_ring::{ChannelOutputs, HubRequest, TokenRing};
