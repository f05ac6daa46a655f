// SPDX-License-Identifier: GPL-3.0-or-later

//! Ownership of touch and gesture sequences.
//!
//! Every grab that matches the start of a sequence gets a claim on it. Claimants decide,
//! top of the stack first, whether they want the sequence; the first to accept while on
//! top owns it and everybody else loses their claim.

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::{
    device::DeviceId,
    input::{ClientId, SequenceClass, TouchId, WindowId},
};

/// A pending claim on a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Claimant {
    pub client: ClientId,
    pub window: WindowId,
    /// Accepted while not yet on top.
    pub accepted: bool,
}

impl Claimant {
    pub fn new(client: ClientId, window: WindowId) -> Self {
        Self {
            client,
            window,
            accepted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchOwnership {
    pub class: SequenceClass,
    /// Pending claims. The last entry is the top of the stack.
    claimants: Vec<Claimant>,
    owner: Option<Claimant>,
}

impl TouchOwnership {
    fn new(class: SequenceClass) -> Self {
        Self {
            class,
            claimants: Vec::new(),
            owner: None,
        }
    }

    /// Pending claims, top of the stack first.
    pub fn claimants(&self) -> impl Iterator<Item = &Claimant> {
        self.claimants.iter().rev()
    }

    /// The claimant whose decision is awaited.
    pub fn top(&self) -> Option<&Claimant> {
        self.claimants.last()
    }

    /// The definitive owner, once there is one.
    pub fn owner(&self) -> Option<&Claimant> {
        self.owner.as_ref()
    }

    fn position(&self, client: ClientId, window: WindowId) -> Option<usize> {
        self.claimants
            .iter()
            .position(|claimant| claimant.client == client && claimant.window == window)
    }

    /// Makes the top claimant the owner if it already accepted.
    ///
    /// Returns the claims this discards.
    fn settle(&mut self) -> Vec<Claimant> {
        let Some(&top) = self.claimants.last() else {
            return Vec::new();
        };
        if !top.accepted || self.owner.is_some() {
            return Vec::new();
        }

        let mut dropped = std::mem::take(&mut self.claimants);
        dropped.pop();
        self.claimants.push(top);
        self.owner = Some(top);
        dropped
    }
}

/// The outcome of an accept or reject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Unknown sequence or not a claimant of it.
    Ignored,
    /// The sequence lives on. `owner` is set once someone owns it; `dropped` are the
    /// claims this decision discarded.
    Pending {
        owner: Option<Claimant>,
        dropped: Vec<Claimant>,
    },
    /// The last claimant rejected. The sequence ends with no owner.
    Ended,
}

#[derive(Debug, Default)]
pub struct TouchGestureArbiter {
    sequences: IndexMap<(DeviceId, TouchId), TouchOwnership>,
}

impl TouchGestureArbiter {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn sequence(&self, device: DeviceId, touch_id: TouchId) -> Option<&TouchOwnership> {
        self.sequences.get(&(device, touch_id))
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Pushes a new claim on top of a sequence's stack, creating the sequence if needed.
    pub fn claim(
        &mut self,
        device: DeviceId,
        touch_id: TouchId,
        class: SequenceClass,
        claimant: Claimant,
    ) {
        trace!(?device, ?touch_id, ?claimant, "New sequence claim");
        self.sequences
            .entry((device, touch_id))
            .or_insert_with(|| TouchOwnership::new(class))
            .claimants
            .push(claimant);
    }

    /// Who receives the sequence's events: the owner if decided, else every claimant.
    pub fn recipients(&self, device: DeviceId, touch_id: TouchId) -> Vec<Claimant> {
        let Some(sequence) = self.sequences.get(&(device, touch_id)) else {
            return Vec::new();
        };

        match sequence.owner {
            Some(owner) => vec![owner],
            None => sequence.claimants().copied().collect(),
        }
    }

    /// Ends a sequence, returning its last ownership state.
    pub fn end(&mut self, device: DeviceId, touch_id: TouchId) -> Option<TouchOwnership> {
        self.sequences.shift_remove(&(device, touch_id))
    }

    /// The claimant on `window` wants the sequence.
    ///
    /// On top of the stack it becomes the owner and every other claim is dropped.
    /// Further down, everything below it is dropped and it takes over once the
    /// claimants above it reject.
    pub fn accept(
        &mut self,
        device: DeviceId,
        touch_id: TouchId,
        client: ClientId,
        window: WindowId,
    ) -> Resolution {
        let Some(sequence) = self.sequences.get_mut(&(device, touch_id)) else {
            return Resolution::Ignored;
        };
        let Some(index) = sequence.position(client, window) else {
            return Resolution::Ignored;
        };

        // Entries before `index` sit below the claimant on the stack.
        let mut dropped = sequence.claimants.drain(..index).collect::<Vec<_>>();
        if let Some(claimant) = sequence.claimants.first_mut() {
            claimant.accepted = true;
        }
        dropped.extend(sequence.settle());

        debug!(?device, ?touch_id, ?client, owner = ?sequence.owner, "Sequence accepted");
        Resolution::Pending {
            owner: sequence.owner,
            dropped,
        }
    }

    /// The claimant on `window` gives up its claim.
    pub fn reject(
        &mut self,
        device: DeviceId,
        touch_id: TouchId,
        client: ClientId,
        window: WindowId,
    ) -> Resolution {
        let key = (device, touch_id);
        let Some(sequence) = self.sequences.get_mut(&key) else {
            return Resolution::Ignored;
        };
        let Some(index) = sequence.position(client, window) else {
            return Resolution::Ignored;
        };

        let removed = sequence.claimants.remove(index);
        if sequence.owner == Some(removed) {
            sequence.owner = None;
        }

        if sequence.claimants.is_empty() {
            debug!(?device, ?touch_id, "Last claimant rejected, sequence ends");
            self.sequences.shift_remove(&key);
            return Resolution::Ended;
        }

        let dropped = sequence.settle();
        debug!(?device, ?touch_id, ?client, owner = ?sequence.owner, "Sequence rejected");
        Resolution::Pending {
            owner: sequence.owner,
            dropped,
        }
    }

    fn reject_where(&mut self, pred: impl Fn(&Claimant) -> bool) -> Vec<Resolution> {
        let mut claims = Vec::new();
        for (&(device, touch_id), sequence) in self.sequences.iter() {
            for claimant in sequence.claimants.iter() {
                if pred(claimant) {
                    claims.push((device, touch_id, claimant.client, claimant.window));
                }
            }
        }

        claims
            .into_iter()
            .map(|(device, touch_id, client, window)| self.reject(device, touch_id, client, window))
            .collect()
    }

    /// Rejects every claim `client` holds.
    pub fn revoke_client(&mut self, client: ClientId) -> Vec<Resolution> {
        self.reject_where(|claimant| claimant.client == client)
    }

    /// Rejects every claim made through `window`.
    pub fn revoke_window(&mut self, window: WindowId) -> Vec<Resolution> {
        self.reject_where(|claimant| claimant.window == window)
    }
}
