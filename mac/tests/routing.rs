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

//! Distance-aware routing over the canonical 8x8 mesh with 16 hubs on one
//! shared radio channel.

use std::sync::Arc;

use mac::{coord_tile, tile_coord, Configuration, Coord, Direction, RouteData, RoutingRegistry};

const CONF: &str = "---
clock_period_ps: 1000.0
mesh_dim_x: 8
mesh_dim_y: 8
da_threshold: 5
use_wireless: true
channels:
  0:
    mac_policy: [BMAC_BIDIRECTIONAL, '10']
    data_rate_gbps: 16.0
    flit_size_bits: 32
";

fn shared_channel_config() -> Arc<Configuration> {
    Arc::new(Configuration::from_str(CONF).unwrap())
}

#[test]
fn long_haul_goes_wireless() {
    let _logger = env_logger::builder().try_init();
    let config = shared_channel_config();
    let oracle = RoutingRegistry::new()
        .build("DISTANCE_AWARE", &config)
        .unwrap();
    // corner to corner: Manhattan 14, hubs 0 and 15 share channel 0
    let route = oracle
        .route(&RouteData {
            current_id: 0,
            dst_id: 63,
        })
        .unwrap();
    assert_eq!(route, vec![Direction::Hub]);
}

#[test]
fn short_haul_stays_wired() {
    let _logger = env_logger::builder().try_init();
    let config = shared_channel_config();
    let oracle = RoutingRegistry::new()
        .build("DISTANCE_AWARE", &config)
        .unwrap();
    let route = oracle
        .route(&RouteData {
            current_id: 0,
            dst_id: 2,
        })
        .unwrap();
    assert_eq!(route, vec![Direction::East]);
}

#[test]
fn threshold_is_strict() {
    let _logger = env_logger::builder().try_init();
    let config = shared_channel_config();
    let oracle = RoutingRegistry::new()
        .build("DISTANCE_AWARE", &config)
        .unwrap();
    // distance exactly at the threshold stays wired
    let route = oracle
        .route(&RouteData {
            current_id: 0,
            dst_id: 5,
        })
        .unwrap();
    assert_eq!(route, vec![Direction::East]);
    // one tile further tips it over
    let route = oracle
        .route(&RouteData {
            current_id: 0,
            dst_id: 6,
        })
        .unwrap();
    assert_eq!(route, vec![Direction::Hub]);
}

#[test]
fn wireless_disabled_falls_back_to_xy() {
    let _logger = env_logger::builder().try_init();
    let mut config = Configuration::from_str(CONF).unwrap();
    config.use_wireless = false;
    let config = Arc::new(config);
    let oracle = RoutingRegistry::new()
        .build("DISTANCE_AWARE", &config)
        .unwrap();
    let route = oracle
        .route(&RouteData {
            current_id: 63,
            dst_id: 0,
        })
        .unwrap();
    assert_eq!(route, vec![Direction::West]);
}

#[test]
fn hub_map_override_can_ground_a_region() {
    let _logger = env_logger::builder().try_init();
    let mut config = Configuration::from_str(CONF).unwrap();
    // every tile reaches the same hub: no pair of distinct hubs exists, so
    // the radio is useless and everything routes wired
    config.hub_map = (0..64).map(|tile| (tile, 0)).collect();
    let config = Arc::new(config);
    let oracle = RoutingRegistry::new()
        .build("DISTANCE_AWARE", &config)
        .unwrap();
    let route = oracle
        .route(&RouteData {
            current_id: 0,
            dst_id: 63,
        })
        .unwrap();
    assert_eq!(route, vec![Direction::East]);
}

#[test]
fn corners_route_from_every_direction() {
    let _logger = env_logger::builder().try_init();
    let config = shared_channel_config();
    let oracle = RoutingRegistry::new()
        .build("DISTANCE_AWARE", &config)
        .unwrap();
    let corners = [
        Coord { x: 0, y: 0 },
        Coord { x: 7, y: 0 },
        Coord { x: 0, y: 7 },
        Coord { x: 7, y: 7 },
    ];
    for &from in &corners {
        for &to in &corners {
            if from == to {
                continue;
            }
            let data = RouteData {
                current_id: coord_tile(&config, from),
                dst_id: coord_tile(&config, to),
            };
            let route = oracle.route(&data).unwrap();
            assert!(!route.is_empty());
            let manhattan = from.x.abs_diff(to.x) + from.y.abs_diff(to.y);
            if manhattan > config.da_threshold {
                assert_eq!(route, vec![Direction::Hub], "{:?} -> {:?}", from, to);
            }
        }
    }
}

#[test]
fn queries_are_pure() {
    let _logger = env_logger::builder().try_init();
    let config = shared_channel_config();
    let oracle = RoutingRegistry::new()
        .build("DISTANCE_AWARE", &config)
        .unwrap();
    for tile in [0, 7, 31, 56, 63] {
        let data = RouteData {
            current_id: tile,
            dst_id: 63 - tile,
        };
        if tile == 63 - tile {
            continue;
        }
        let first = oracle.route(&data).unwrap();
        for _ in 0..3 {
            assert_eq!(oracle.route(&data).unwrap(), first);
        }
    }
}

#[test]
fn off_mesh_tiles_are_fatal() {
    let _logger = env_logger::builder().try_init();
    let config = shared_channel_config();
    let oracle = RoutingRegistry::new()
        .build("DISTANCE_AWARE", &config)
        .unwrap();
    assert!(oracle
        .route(&RouteData {
            current_id: 64,
            dst_id: 0,
        })
        .is_err());
    assert!(tile_coord(&config, 100).is_err());
}
