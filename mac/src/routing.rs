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

//! Routing oracles.
//!
//! Pure functions over the immutable [`Configuration`]: the wired XY
//! baseline and the distance-aware oracle that prefers a wireless hub hop
//! once the Manhattan distance exceeds the configured threshold. Oracles
//! are reentrant; routers on any thread may share them.

use log::trace;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Configuration;
use crate::error::Error;
use crate::TileId;

/// An outgoing direction a router may take for a flit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    North,
    South,
    East,
    West,
    /// hand the flit to the local wireless hub
    Hub,
}

/// Mesh coordinates of a tile; `y` grows downwards.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

/// A routing query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RouteData {
    pub current_id: TileId,
    pub dst_id: TileId,
}

pub fn tile_coord(config: &Configuration, tile: TileId) -> Result<Coord, Error> {
    if tile >= config.mesh_dim_x * config.mesh_dim_y {
        return Err(Error::InvalidTile(tile));
    }
    Ok(Coord {
        x: tile % config.mesh_dim_x,
        y: tile / config.mesh_dim_x,
    })
}

pub fn coord_tile(config: &Configuration, coord: Coord) -> TileId {
    coord.y * config.mesh_dim_x + coord.x
}

/// A routing oracle maps a query to the ordered set of valid outgoing
/// directions. An implementation never returns an empty set; a query it
/// cannot serve is an error.
pub trait RoutingAlgorithm: std::fmt::Debug {
    fn route(&self, data: &RouteData) -> Result<Vec<Direction>, Error>;
}

/// Dimension-ordered wired routing: drain the x offset, then the y offset.
#[derive(Debug)]
pub struct XyRouting {
    config: Arc<Configuration>,
}

impl XyRouting {
    pub fn new(config: Arc<Configuration>) -> Self {
        Self { config }
    }
}

impl RoutingAlgorithm for XyRouting {
    fn route(&self, data: &RouteData) -> Result<Vec<Direction>, Error> {
        let current = tile_coord(&self.config, data.current_id)?;
        let dst = tile_coord(&self.config, data.dst_id)?;
        let mut directions = Vec::new();
        if dst.x > current.x {
            directions.push(Direction::East);
        } else if dst.x < current.x {
            directions.push(Direction::West);
        } else if dst.y > current.y {
            directions.push(Direction::South);
        } else if dst.y < current.y {
            directions.push(Direction::North);
        }
        if directions.is_empty() {
            return Err(Error::NoRoute(data.current_id, data.dst_id));
        }
        Ok(directions)
    }
}

/// Wireless-aware routing: beyond the distance threshold, flits travel
/// through the hubs when both endpoints own one and the hubs share a radio
/// channel; everything else falls back to the injected wired oracle.
#[derive(Debug)]
pub struct DistanceAware {
    config: Arc<Configuration>,
    wired: Box<dyn RoutingAlgorithm>,
}

impl DistanceAware {
    pub fn new(config: Arc<Configuration>, wired: Box<dyn RoutingAlgorithm>) -> Self {
        Self { config, wired }
    }

    fn wireless_direction(&self, current: TileId, dst: TileId) -> Option<Direction> {
        let current_hub = self.config.hub_of(current)?;
        let dst_hub = self.config.hub_of(dst)?;
        if self.config.hubs_can_communicate(current_hub, dst_hub) {
            Some(Direction::Hub)
        } else {
            None
        }
    }
}

impl RoutingAlgorithm for DistanceAware {
    fn route(&self, data: &RouteData) -> Result<Vec<Direction>, Error> {
        let current = tile_coord(&self.config, data.current_id)?;
        let dst = tile_coord(&self.config, data.dst_id)?;
        let manhattan = current.x.abs_diff(dst.x) + current.y.abs_diff(dst.y);
        if manhattan > self.config.da_threshold && self.config.use_wireless {
            if let Some(direction) = self.wireless_direction(data.current_id, data.dst_id) {
                trace!(
                    "tile {} -> tile {} at distance {} goes wireless",
                    data.current_id,
                    data.dst_id,
                    manhattan
                );
                return Ok(vec![direction]);
            }
        }
        self.wired.route(data)
    }
}

type AlgorithmFactory = Box<dyn Fn(Arc<Configuration>) -> Box<dyn RoutingAlgorithm>>;

/// Explicit registry of routing algorithms, built at init and passed where
/// needed. Maps names to constructors.
pub struct RoutingRegistry {
    factories: HashMap<String, AlgorithmFactory>,
}

impl RoutingRegistry {
    /// A registry with the built-in algorithms registered.
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(
            "XY",
            Box::new(|config: Arc<Configuration>| -> Box<dyn RoutingAlgorithm> {
                Box::new(XyRouting::new(config))
            }),
        );
        registry.register(
            "DISTANCE_AWARE",
            Box::new(|config: Arc<Configuration>| -> Box<dyn RoutingAlgorithm> {
                let wired = Box::new(XyRouting::new(config.clone()));
                Box::new(DistanceAware::new(config, wired))
            }),
        );
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: AlgorithmFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn build(
        &self,
        name: &str,
        config: &Arc<Configuration>,
    ) -> Result<Box<dyn RoutingAlgorithm>, Error> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownAlgorithm(name.to_string()))?;
        Ok(factory(config.clone()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|name| name.as_str())
    }
}

impl Default for RoutingRegistry {
    fn default() -> Self {
        Self::new()
    }
}
