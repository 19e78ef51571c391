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

//! Drives the MAC arbiter for a configured mesh: a seeded synthetic
//! request pattern exercises every channel for a number of cycles, then a
//! sample of routing queries shows the wired/wireless split.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use env_logger::Target;
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use structopt::StructOpt;

use mac::{
    ChannelId, Configuration, Direction, HubId, HubRequest, MacPolicy, MacState, RouteData,
    RoutingRegistry, TokenRing,
};

#[derive(StructOpt)]
#[structopt(name = "ringsim", about = "Token-ring MAC simulation driver")]
struct Arguments {
    /// channel and mesh configuration file (YAML)
    #[structopt(short, long)]
    config: PathBuf,
    /// number of clock cycles to simulate
    #[structopt(short = "n", long, default_value = "1000")]
    cycles: usize,
    /// seed for the synthetic request pattern
    #[structopt(short, long, default_value = "17")]
    seed: u64,
    /// per-cycle probability that a hub toggles its demand
    #[structopt(short, long, default_value = "0.25")]
    activity: f64,
    /// routing algorithm to sample after the run
    #[structopt(long, default_value = "DISTANCE_AWARE")]
    routing: String,
    /// number of routing queries to sample
    #[structopt(long, default_value = "64")]
    route_samples: usize,
}

fn drive_requests(
    ring: &mut TokenRing,
    config: &Configuration,
    rng: &mut Xoshiro256StarStar,
    activity: f64,
) -> anyhow::Result<()> {
    for (&channel, chan_config) in config.channels.iter() {
        match chan_config.policy {
            MacPolicy::Bidirectional { .. } => {
                // hubs announce queued traffic; the controller idles them
                // again when they pass the token
                for &hub in &chan_config.ring {
                    if ring.hub_state(channel, hub).mac_state == MacState::Idle
                        && rng.gen_bool(activity)
                    {
                        ring.set_mac_state(channel, hub, MacState::TokenHold);
                    }
                }
            }
            MacPolicy::TokenPacket | MacPolicy::TokenMaxHold { .. } => {
                // every hub rewrites its flag each cycle, as the
                // transceivers would
                for &hub in &chan_config.ring {
                    let request = if rng.gen_bool(activity) {
                        HubRequest::ReleaseChannel
                    } else {
                        HubRequest::HoldChannel
                    };
                    ring.set_request(channel, hub, request)?;
                }
            }
            // flags are ignored by the fixed quantum
            MacPolicy::TokenHold { .. } => {}
        }
    }
    Ok(())
}

fn sample_routes(
    config: &Arc<Configuration>,
    algorithm: &str,
    samples: usize,
    rng: &mut Xoshiro256StarStar,
) -> anyhow::Result<(usize, usize)> {
    let registry = RoutingRegistry::new();
    let oracle = registry
        .build(algorithm, config)
        .with_context(|| format!("building routing algorithm {}", algorithm))?;
    let tiles = config.mesh_dim_x * config.mesh_dim_y;
    let mut wired = 0;
    let mut wireless = 0;
    for _ in 0..samples {
        let current_id = rng.gen_range(0..tiles);
        let dst_id = rng.gen_range(0..tiles);
        if current_id == dst_id {
            continue;
        }
        let route = oracle.route(&RouteData { current_id, dst_id })?;
        if route.contains(&Direction::Hub) {
            wireless += 1;
        } else {
            wired += 1;
        }
    }
    Ok((wired, wireless))
}

fn main() -> anyhow::Result<()> {
    let args = Arguments::from_args();
    let _logger = env_logger::builder().target(Target::Stderr).try_init();

    let config = Arc::new(
        Configuration::from_file(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?,
    );
    log::info!(
        "loaded {} channels over a {}x{} mesh",
        config.channels.len(),
        config.mesh_dim_x,
        config.mesh_dim_y
    );
    let mut ring = TokenRing::new(&config);
    ring.update_tokens(true);

    let mut rng = Xoshiro256StarStar::seed_from_u64(args.seed);
    let mut handoffs: BTreeMap<ChannelId, usize> = BTreeMap::new();
    let mut last_holder: BTreeMap<ChannelId, HubId> = ring
        .published()
        .iter()
        .map(|(&channel, outputs)| (channel, outputs.holder))
        .collect();

    for _ in 0..args.cycles {
        drive_requests(&mut ring, &config, &mut rng, args.activity)?;
        ring.update_tokens(false);
        for (&channel, outputs) in ring.published().iter() {
            if last_holder[&channel] != outputs.holder {
                *handoffs.entry(channel).or_insert(0) += 1;
                last_holder.insert(channel, outputs.holder);
            }
        }
    }

    for (&channel, chan_config) in config.channels.iter() {
        println!(
            "channel {}: {} hubs, {} handoffs over {} cycles, final holder hub {}",
            channel,
            chan_config.ring.len(),
            handoffs.get(&channel).unwrap_or(&0),
            args.cycles,
            last_holder[&channel],
        );
    }

    let (wired, wireless) = sample_routes(&config, &args.routing, args.route_samples, &mut rng)?;
    println!(
        "routing ({}): {} wired, {} wireless of {} sampled queries",
        args.routing, wired, wireless, args.route_samples
    );
    Ok(())
}
