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

//! Bidirectional MAC controller.
//!
//! Each bidirectional channel owns one [`BmacChannel`]: per-hub MAC state,
//! the current traversal direction, and the reversal heuristic that turns
//! the ring around when more demand waits behind the token than ahead of
//! it.

use log::{debug, trace, warn};
use std::collections::BTreeMap;

use crate::{ChannelId, Cycle, HubId};

/// The ring order is re-examined this often; the body of the hook is
/// intentionally empty.
pub const OPTIMIZE_PERIOD: Cycle = 1000;

/// MAC state of one hub on a bidirectional channel.
///
/// `TokenHold` doubles as the pending-traffic mark: a hub enters it when it
/// has frames queued, whether or not it currently holds the token. The
/// reversal heuristic reads any non-`Idle` hub as demand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MacState {
    Idle,
    TokenHold,
    Transmitting,
    Receiving,
}

impl Default for MacState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Sense of ring traversal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RingDirection {
    Clockwise,
    CounterClockwise,
}

impl RingDirection {
    pub fn reversed(self) -> Self {
        match self {
            Self::Clockwise => Self::CounterClockwise,
            Self::CounterClockwise => Self::Clockwise,
        }
    }
}

/// Extended per-hub state kept by the controller.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HubMacState {
    pub mac_state: MacState,
    /// Consecutive cycles this hub has held the token since acquiring it.
    pub token_hold_cycles: Cycle,
    pub has_token: bool,
}

/// Decides when the incumbent's transmission is finished and the token may
/// move on. The surrounding system plugs its own notion in; the default is
/// a fixed cycle threshold.
pub trait TransmissionStatus {
    fn is_complete(&self, hub: HubId, state: &HubMacState) -> bool;
}

/// Transmission counts as complete after holding for more than a fixed
/// number of cycles.
#[derive(Clone, Copy, Debug)]
pub struct CycleThreshold(pub Cycle);

impl TransmissionStatus for CycleThreshold {
    fn is_complete(&self, _hub: HubId, state: &HubMacState) -> bool {
        state.token_hold_cycles > self.0
    }
}

/// Bidirectional token management for one channel.
pub struct BmacChannel {
    channel: ChannelId,
    hold_window: Cycle,
    direction: RingDirection,
    hub_states: BTreeMap<HubId, HubMacState>,
    completion: Box<dyn TransmissionStatus>,
    /// ticks since reset, drives the periodic optimization hook
    cycles: Cycle,
}

impl BmacChannel {
    pub fn new(
        channel: ChannelId,
        ring: &[HubId],
        hold_window: Cycle,
        min_complete: Cycle,
    ) -> Self {
        let mut hub_states = BTreeMap::new();
        for (i, &hub) in ring.iter().enumerate() {
            let mut state = HubMacState::default();
            if i == 0 {
                // the initial holder comes up ready to transmit
                state.mac_state = MacState::TokenHold;
                state.has_token = true;
            }
            hub_states.insert(hub, state);
        }
        Self {
            channel,
            hold_window,
            direction: RingDirection::Clockwise,
            hub_states,
            completion: Box::new(CycleThreshold(min_complete)),
            cycles: 0,
        }
    }

    /// Return every hub to `Idle` and the token to `ring[0]`, clockwise.
    pub fn reset(&mut self, ring: &[HubId]) {
        for state in self.hub_states.values_mut() {
            *state = HubMacState::default();
        }
        if let Some(&first) = ring.first() {
            self.hub_states.entry(first).or_default().has_token = true;
        }
        self.direction = RingDirection::Clockwise;
        self.cycles = 0;
    }

    /// One clock edge. Decides whether the incumbent continues, passes, or
    /// reverses the ring; returns the new token index.
    pub fn update(&mut self, ring: &[HubId], token_index: usize) -> usize {
        self.cycles += 1;
        let holder = ring[token_index];
        let observed = *self.state_entry(holder);
        let expired = observed.token_hold_cycles > self.hold_window;
        let mut should_pass = false;
        let mut keep_holding = false;
        match observed.mac_state {
            // nothing to send: yield immediately
            MacState::Idle => should_pass = true,
            MacState::TokenHold => {
                if expired
                    || self.completion.is_complete(holder, &observed)
                    || observed.token_hold_cycles >= self.hold_window
                {
                    should_pass = true;
                } else {
                    keep_holding = true;
                }
            }
            // a frame is on the air; only the expiration bound can unseat
            // the holder
            MacState::Transmitting | MacState::Receiving => {
                if expired {
                    should_pass = true;
                } else {
                    keep_holding = true;
                }
            }
        }
        if expired && should_pass {
            warn!(
                "token of channel {} expired at hub {} after {} cycles",
                self.channel, holder, observed.token_hold_cycles
            );
        }
        if keep_holding {
            self.state_entry(holder).token_hold_cycles += 1;
        }

        let mut next_index = token_index;
        if should_pass {
            if self.should_reverse(ring, token_index) {
                self.direction = self.direction.reversed();
                debug!(
                    "reversing token direction of channel {} to {:?}",
                    self.channel, self.direction
                );
            }
            next_index = self.next_index(ring.len(), token_index);
            let old = self.state_entry(holder);
            old.mac_state = MacState::Idle;
            old.token_hold_cycles = 0;
            old.has_token = false;
            let next_hub = ring[next_index];
            // an idle acquirer stays idle so the token keeps circulating; a
            // hub with queued traffic is already in TokenHold and starts its
            // window here
            let new = self.state_entry(next_hub);
            new.token_hold_cycles = 0;
            new.has_token = true;
            debug!(
                "token of channel {} passed from hub {} to hub {}",
                self.channel, holder, next_hub
            );
        }

        if self.cycles % OPTIMIZE_PERIOD == 0 {
            self.optimize_token_path();
        }
        next_index
    }

    /// Single pass over the ring: count non-idle hubs ahead of and behind
    /// the holder relative to the current direction. Reverse iff strictly
    /// more demand waits behind; ties keep the direction.
    fn should_reverse(&self, ring: &[HubId], cur_pos: usize) -> bool {
        let mut forward = 0;
        let mut backward = 0;
        for (i, &hub) in ring.iter().enumerate() {
            if i == cur_pos {
                continue;
            }
            let busy = self
                .hub_states
                .get(&hub)
                .map(|s| s.mac_state != MacState::Idle)
                .unwrap_or(false);
            if !busy {
                continue;
            }
            let ahead = match self.direction {
                RingDirection::Clockwise => i > cur_pos,
                RingDirection::CounterClockwise => i < cur_pos,
            };
            if ahead {
                forward += 1;
            } else {
                backward += 1;
            }
        }
        backward > forward
    }

    fn next_index(&self, ring_len: usize, cur_pos: usize) -> usize {
        match self.direction {
            RingDirection::Clockwise => (cur_pos + 1) % ring_len,
            RingDirection::CounterClockwise => (cur_pos + ring_len - 1) % ring_len,
        }
    }

    /// Periodic hook for re-ordering the ring. Deliberately a no-op.
    fn optimize_token_path(&self) {
        trace!("optimizing token path of channel {}", self.channel);
    }

    pub fn direction(&self) -> RingDirection {
        self.direction
    }

    /// Manual direction override.
    pub fn set_direction(&mut self, direction: RingDirection) {
        self.direction = direction;
    }

    /// Replace the transmission-completeness probe.
    pub fn set_transmission_status(&mut self, completion: Box<dyn TransmissionStatus>) {
        self.completion = completion;
    }

    /// External notification of a hub's MAC state, e.g. when it queues
    /// traffic (`TokenHold`) or starts a frame (`Transmitting`).
    pub fn set_mac_state(&mut self, hub: HubId, mac_state: MacState) {
        match self.hub_states.get_mut(&hub) {
            Some(state) => state.mac_state = mac_state,
            None => warn!(
                "hub {} is not managed on channel {}; ignoring state {:?}",
                hub, self.channel, mac_state
            ),
        }
    }

    /// A miss yields a fresh idle state; the simulation never aborts over
    /// an unknown hub.
    pub fn hub_state(&self, hub: HubId) -> HubMacState {
        match self.hub_states.get(&hub) {
            Some(state) => *state,
            None => {
                warn!(
                    "hub {} is not managed on channel {}; reporting idle",
                    hub, self.channel
                );
                HubMacState::default()
            }
        }
    }

    fn state_entry(&mut self, hub: HubId) -> &mut HubMacState {
        let channel = self.channel;
        self.hub_states.entry(hub).or_insert_with(|| {
            warn!("hub {} is not managed on channel {}; starting idle", hub, channel);
            HubMacState::default()
        })
    }
}
