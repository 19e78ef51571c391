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

//! Token ring arbitration.
//!
//! The [`TokenRing`] owns the mutable state of every radio channel and is
//! ticked exactly once per clock edge. Hubs see only the published holder
//! and expiration values, which are rewritten at the end of each tick;
//! their request flags are sampled once per tick on the following edge.

use log::{debug, warn};
use std::collections::BTreeMap;

use crate::bmac::{BmacChannel, HubMacState, MacState, RingDirection, TransmissionStatus};
use crate::config::{ChannelConfig, Configuration, MacPolicy};
use crate::error::Error;
use crate::{ChannelId, Cycle, HubId};

/// Request flag one hub drives towards the arbiter of one channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HubRequest {
    /// retain or acquire the channel
    HoldChannel,
    /// relinquish the channel
    ReleaseChannel,
}

impl Default for HubRequest {
    fn default() -> Self {
        Self::HoldChannel
    }
}

/// Observable outputs of one channel, as of the last tick.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChannelOutputs {
    /// hub currently authorized to transmit
    pub holder: HubId,
    /// cycles remaining before a forced pass (0 where the policy keeps no
    /// countdown)
    pub expiration: Cycle,
}

struct ChannelState {
    ring: Vec<HubId>,
    policy: MacPolicy,
    token_index: usize,
    hold_countdown: Cycle,
    /// request flags, one per ring position
    flags: Vec<HubRequest>,
    /// extended controller state, bidirectional channels only
    bmac: Option<BmacChannel>,
}

impl ChannelState {
    fn holder(&self) -> HubId {
        self.ring[self.token_index]
    }

    fn position_of(&self, hub: HubId) -> Option<usize> {
        self.ring.iter().position(|&h| h == hub)
    }

    fn advance(&mut self) {
        self.token_index = (self.token_index + 1) % self.ring.len();
    }

    /// Hop on the packet boundary signalled by the incumbent. The new
    /// holder's flag is raised for it so an unresponsive hub cannot lose
    /// the token it was just handed.
    fn update_token_packet(&mut self, channel: ChannelId) {
        // always sample the incumbent's flag at ring[token_index]
        if self.flags[self.token_index] == HubRequest::ReleaseChannel {
            let old = self.holder();
            self.advance();
            debug!(
                "token of channel {} reassigned from hub {} to hub {}",
                channel,
                old,
                self.holder()
            );
            self.flags[self.token_index] = HubRequest::HoldChannel;
        }
    }

    /// Fixed quantum round-robin. The incumbent's flag is never consulted.
    fn update_token_hold(&mut self, channel: ChannelId, max_cycles: Cycle) {
        self.hold_countdown -= 1;
        if self.hold_countdown == 0 {
            self.hold_countdown = max_cycles;
            let old = self.holder();
            self.advance();
            debug!(
                "token of channel {} reassigned from hub {} to hub {}",
                channel,
                old,
                self.holder()
            );
        }
    }

    /// Bounded hold with early release. An exhausted countdown and a
    /// release flag on the same cycle advance the token once.
    fn update_token_max_hold(&mut self, channel: ChannelId, max_cycles: Cycle) {
        self.hold_countdown -= 1;
        if self.hold_countdown == 0 || self.flags[self.token_index] == HubRequest::ReleaseChannel {
            self.hold_countdown = max_cycles;
            let old = self.holder();
            self.advance();
            debug!(
                "token of channel {} reassigned from hub {} to hub {}",
                channel,
                old,
                self.holder()
            );
        }
    }
}

/// The MAC arbiter: every channel's ring state plus the published outputs.
pub struct TokenRing {
    channels: BTreeMap<ChannelId, ChannelState>,
    published: BTreeMap<ChannelId, ChannelOutputs>,
}

impl TokenRing {
    /// Build the rings from a validated configuration. `ring[0]` of every
    /// channel starts as holder.
    pub fn new(config: &Configuration) -> Self {
        let mut channels = BTreeMap::new();
        let mut published = BTreeMap::new();
        for (&channel, chan_config) in config.channels.iter() {
            let ChannelConfig { ring, policy, .. } = chan_config;
            assert!(!ring.is_empty(), "channel {} has an empty ring", channel);
            if let MacPolicy::TokenHold { max_cycles } | MacPolicy::TokenMaxHold { max_cycles } =
                *policy
            {
                assert!(max_cycles > 0, "channel {} has a zero hold quantum", channel);
            }
            let bmac = match *policy {
                MacPolicy::Bidirectional {
                    hold_window,
                    min_complete,
                } => Some(BmacChannel::new(channel, ring, hold_window, min_complete)),
                _ => None,
            };
            let state = ChannelState {
                ring: ring.clone(),
                policy: *policy,
                token_index: 0,
                hold_countdown: policy.initial_countdown(),
                flags: vec![HubRequest::default(); ring.len()],
                bmac,
            };
            published.insert(
                channel,
                ChannelOutputs {
                    holder: state.holder(),
                    expiration: state.hold_countdown,
                },
            );
            channels.insert(channel, state);
        }
        Self {
            channels,
            published,
        }
    }

    /// One positive clock edge. With `reset` asserted every channel returns
    /// to its initial holder and countdown; otherwise each channel runs its
    /// policy handler. Published outputs are rewritten either way.
    pub fn update_tokens(&mut self, reset: bool) {
        if reset {
            for (&channel, state) in self.channels.iter_mut() {
                state.token_index = 0;
                state.hold_countdown = state.policy.initial_countdown();
                if let Some(bmac) = state.bmac.as_mut() {
                    bmac.reset(&state.ring);
                }
                self.published.insert(
                    channel,
                    ChannelOutputs {
                        holder: state.holder(),
                        expiration: state.hold_countdown,
                    },
                );
            }
            return;
        }
        for (&channel, state) in self.channels.iter_mut() {
            match state.policy {
                MacPolicy::TokenPacket => state.update_token_packet(channel),
                MacPolicy::TokenHold { max_cycles } => {
                    state.update_token_hold(channel, max_cycles)
                }
                MacPolicy::TokenMaxHold { max_cycles } => {
                    state.update_token_max_hold(channel, max_cycles)
                }
                MacPolicy::Bidirectional { .. } => {
                    if let Some(bmac) = state.bmac.as_mut() {
                        state.token_index = bmac.update(&state.ring, state.token_index);
                    }
                }
            }
            self.published.insert(
                channel,
                ChannelOutputs {
                    holder: state.holder(),
                    expiration: state.hold_countdown,
                },
            );
        }
    }

    /// Read-only snapshot of every channel's outputs.
    pub fn published(&self) -> &BTreeMap<ChannelId, ChannelOutputs> {
        &self.published
    }

    pub fn current_holder(&self, channel: ChannelId) -> Option<HubId> {
        self.published.get(&channel).map(|o| o.holder)
    }

    pub fn expiration(&self, channel: ChannelId) -> Option<Cycle> {
        self.published.get(&channel).map(|o| o.expiration)
    }

    pub fn ring(&self, channel: ChannelId) -> Option<&[HubId]> {
        self.channels.get(&channel).map(|c| c.ring.as_slice())
    }

    /// A hub writes its own request flag. Misaddressed writes are caller
    /// bugs and surface as errors.
    pub fn set_request(
        &mut self,
        channel: ChannelId,
        hub: HubId,
        request: HubRequest,
    ) -> Result<(), Error> {
        let state = self
            .channels
            .get_mut(&channel)
            .ok_or(Error::UnknownChannel(channel))?;
        let position = state
            .position_of(hub)
            .ok_or(Error::UnknownHub(channel, hub))?;
        state.flags[position] = request;
        Ok(())
    }

    pub fn request(&self, channel: ChannelId, hub: HubId) -> Option<HubRequest> {
        let state = self.channels.get(&channel)?;
        let position = state.position_of(hub)?;
        Some(state.flags[position])
    }

    /// External hub-state notification for a bidirectional channel.
    /// Anomalies are logged and dropped, never fatal.
    pub fn set_mac_state(&mut self, channel: ChannelId, hub: HubId, mac_state: MacState) {
        match self.channels.get_mut(&channel).and_then(|c| c.bmac.as_mut()) {
            Some(bmac) => bmac.set_mac_state(hub, mac_state),
            None => warn!(
                "channel {} has no bidirectional controller; ignoring state {:?} of hub {}",
                channel, mac_state, hub
            ),
        }
    }

    /// Extended state of a hub on a bidirectional channel; idle default on
    /// any miss.
    pub fn hub_state(&self, channel: ChannelId, hub: HubId) -> HubMacState {
        match self.channels.get(&channel).and_then(|c| c.bmac.as_ref()) {
            Some(bmac) => bmac.hub_state(hub),
            None => {
                warn!(
                    "channel {} has no bidirectional controller; reporting hub {} idle",
                    channel, hub
                );
                HubMacState::default()
            }
        }
    }

    pub fn direction(&self, channel: ChannelId) -> Option<RingDirection> {
        self.channels
            .get(&channel)
            .and_then(|c| c.bmac.as_ref())
            .map(|b| b.direction())
    }

    pub fn set_direction(&mut self, channel: ChannelId, direction: RingDirection) {
        match self.channels.get_mut(&channel).and_then(|c| c.bmac.as_mut()) {
            Some(bmac) => bmac.set_direction(direction),
            None => warn!(
                "channel {} has no bidirectional controller; ignoring direction {:?}",
                channel, direction
            ),
        }
    }

    /// Plug a transmission-completeness probe into a bidirectional channel.
    pub fn set_transmission_status(
        &mut self,
        channel: ChannelId,
        completion: Box<dyn TransmissionStatus>,
    ) {
        match self.channels.get_mut(&channel).and_then(|c| c.bmac.as_mut()) {
            Some(bmac) => bmac.set_transmission_status(completion),
            None => warn!(
                "channel {} has no bidirectional controller; dropping completion probe",
                channel
            ),
        }
    }
}
