// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-device freeze and thaw.
//!
//! A frozen device delivers nothing. Its events pile up in a queue until the client
//! that froze it says what to do with them, which may be never. There is no timeout.

use std::collections::VecDeque;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::{
    device::DeviceId,
    input::{InputEvent, Timestamp, WindowId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FreezeState {
    #[default]
    NotGrabbed,
    /// The next event is held back and the device freezes.
    FrozenNextEvent,
    Thawed,
    /// The next event on either paired master is held back and both freeze.
    FrozenBothNextEvent,
    ThawedBoth,
    /// The paired master was released, this device was left alone.
    ThawOthers,
}

impl FreezeState {
    /// Whether only a master device can be put in this state.
    pub fn is_paired(self) -> bool {
        matches!(
            self,
            FreezeState::FrozenBothNextEvent | FreezeState::ThawedBoth | FreezeState::ThawOthers
        )
    }
}

/// The device-level modes of an allow events request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowMode {
    AsyncDevice,
    SyncDevice,
    ReplayDevice,
    AsyncPairedDevice,
    AsyncPair,
    SyncPair,
}

impl AllowMode {
    pub fn target_state(self) -> FreezeState {
        match self {
            AllowMode::AsyncDevice => FreezeState::Thawed,
            AllowMode::SyncDevice => FreezeState::FrozenNextEvent,
            AllowMode::ReplayDevice => FreezeState::NotGrabbed,
            AllowMode::AsyncPairedDevice => FreezeState::ThawOthers,
            AllowMode::AsyncPair => FreezeState::ThawedBoth,
            AllowMode::SyncPair => FreezeState::FrozenBothNextEvent,
        }
    }
}

/// An event kept back by a frozen device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldEvent {
    pub event: InputEvent,
    /// Whether the event already went to the grab owner when the device froze.
    pub delivered: bool,
    /// A replay only considers passive grabs on windows below this one.
    pub replay_below: Option<WindowId>,
}

#[derive(Debug, Default)]
pub struct DeviceSync {
    pub state: FreezeState,
    /// The device whose grab or held event froze this one.
    frozen_by: Option<DeviceId>,
    /// The master whose grab asked for the paired freeze.
    anchor: Option<DeviceId>,
    held: Option<HeldEvent>,
    queue: VecDeque<InputEvent>,
    /// When the device entered its current frozen state.
    freeze_time: Timestamp,
}

impl DeviceSync {
    pub fn is_frozen(&self) -> bool {
        self.frozen_by.is_some()
    }

    pub fn held(&self) -> Option<&HeldEvent> {
        self.held.as_ref()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn freeze_time(&self) -> Timestamp {
        self.freeze_time
    }
}

/// What the facade has to do after a thaw.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Thaw {
    /// Held events that never reached anyone, oldest first.
    pub release: Vec<InputEvent>,
    /// The held event to offer to passive grabs again.
    pub replay: Option<HeldEvent>,
    /// Devices whose queues may now drain.
    pub drain: Vec<DeviceId>,
}

impl Thaw {
    fn merge(&mut self, other: Thaw) {
        self.release.extend(other.release);
        self.drain.extend(other.drain);
        if self.replay.is_none() {
            self.replay = other.replay;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreReason {
    /// The request is older than the current freeze.
    Stale,
    /// A paired mode aimed at a device that isn't a master.
    NotMaster,
    /// Someone else owns the device's grab.
    NotOwner,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AllowResult {
    Applied(Thaw),
    /// Nothing changed, but the request still succeeds.
    Ignored(IgnoreReason),
}

/// What happened to an event that met a frozen or freezing device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intercepted {
    Held(DeviceId),
    Queued(DeviceId),
}

#[derive(Debug, Default)]
pub struct FreezeStateMachine {
    devices: IndexMap<DeviceId, DeviceSync>,
}

impl FreezeStateMachine {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn sync(&self, device: DeviceId) -> Option<&DeviceSync> {
        self.devices.get(&device)
    }

    fn sync_mut(&mut self, device: DeviceId) -> &mut DeviceSync {
        self.devices.entry(device).or_default()
    }

    pub fn state(&self, device: DeviceId) -> FreezeState {
        self.devices
            .get(&device)
            .map(|sync| sync.state)
            .unwrap_or_default()
    }

    pub fn is_frozen(&self, device: DeviceId) -> bool {
        self.devices.get(&device).is_some_and(DeviceSync::is_frozen)
    }

    /// The device that froze `device`, if it is frozen.
    pub fn frozen_by(&self, device: DeviceId) -> Option<DeviceId> {
        self.devices.get(&device).and_then(|sync| sync.frozen_by)
    }

    /// Decides whether an event gets through.
    ///
    /// `devices` are the devices the event is routed through, most specific first. The
    /// first one that is frozen queues the event. Otherwise the first one waiting to
    /// freeze on its next event holds it and freezes; for the paired state, `partner`
    /// freezes along with it.
    pub fn intercept(
        &mut self,
        event: &InputEvent,
        devices: &[DeviceId],
        partner: impl Fn(DeviceId) -> Option<DeviceId>,
        replay_below: Option<WindowId>,
    ) -> Option<Intercepted> {
        if let Some(&frozen) = devices.iter().find(|&&device| self.is_frozen(device)) {
            trace!(device = ?frozen, "Device frozen, queueing event");
            self.sync_mut(frozen).queue.push_back(event.clone());
            return Some(Intercepted::Queued(frozen));
        }

        let &freezing = devices.iter().find(|&&device| {
            self.devices.get(&device).is_some_and(|sync| {
                sync.held.is_none()
                    && matches!(
                        sync.state,
                        FreezeState::FrozenNextEvent | FreezeState::FrozenBothNextEvent
                    )
            })
        })?;

        let sync = self.sync_mut(freezing);
        let both = sync.state == FreezeState::FrozenBothNextEvent;
        // Both halves of a paired freeze answer to the master that asked for it.
        let by = match sync.anchor {
            Some(anchor) if both => anchor,
            _ => freezing,
        };
        sync.held = Some(HeldEvent {
            event: event.clone(),
            delivered: false,
            replay_below,
        });
        sync.frozen_by = Some(by);
        sync.freeze_time = event.time;

        if both && let Some(partner) = partner(freezing) {
            self.freeze_other(partner, by, event.time);
        }

        debug!(device = ?freezing, both, "Holding event, device frozen");
        Some(Intercepted::Held(freezing))
    }

    /// Resets a device whose active grab was just installed.
    pub fn grab_started(&mut self, device: DeviceId) {
        self.sync_mut(device).state = FreezeState::NotGrabbed;
    }

    /// Freezes a device for its own synchronous grab.
    ///
    /// `trigger` is the event that activated a passive grab. It has already gone to the
    /// grab owner and is kept so it can be replayed.
    pub fn freeze_for_grab(
        &mut self,
        device: DeviceId,
        trigger: Option<HeldEvent>,
        time: Timestamp,
    ) {
        let sync = self.sync_mut(device);
        sync.state = FreezeState::FrozenNextEvent;
        sync.frozen_by = Some(device);
        sync.held = trigger;
        sync.freeze_time = time;
        debug!(?device, "Device frozen by its grab");
    }

    /// Freezes `device` on behalf of `by`, for a grab with a synchronous other device mode.
    pub fn freeze_other(&mut self, device: DeviceId, by: DeviceId, time: Timestamp) {
        let sync = self.sync_mut(device);
        if sync.frozen_by.is_none() {
            sync.frozen_by = Some(by);
            sync.freeze_time = time;
            debug!(?device, ?by, "Device frozen by paired grab");
        }
    }

    /// Resets a device whose active grab ended and thaws everything it froze.
    pub fn grab_ended(&mut self, device: DeviceId) -> Thaw {
        self.sync_mut(device).state = FreezeState::NotGrabbed;

        let mut thaw = Thaw::default();
        let frozen = self
            .devices
            .iter()
            .filter(|&(_, sync)| sync.frozen_by == Some(device))
            .map(|(&id, _)| id)
            .collect::<Vec<_>>();
        for id in frozen {
            thaw.merge(self.thaw_one(id));
        }
        thaw
    }

    fn thaw_one(&mut self, device: DeviceId) -> Thaw {
        let sync = self.sync_mut(device);
        sync.frozen_by = None;

        let mut thaw = Thaw::default();
        if let Some(held) = sync.held.take() {
            if !held.delivered {
                thaw.release.push(held.event);
            }
        }
        thaw.drain.push(device);
        thaw
    }

    /// Thaws every device frozen on behalf of `device`, other than `device` itself.
    fn thaw_frozen_by(&mut self, device: DeviceId) -> Thaw {
        let mut thaw = Thaw::default();
        let frozen = self
            .devices
            .iter()
            .filter(|&(&id, sync)| id != device && sync.frozen_by == Some(device))
            .map(|(&id, _)| id)
            .collect::<Vec<_>>();
        for id in frozen {
            thaw.merge(self.thaw_one(id));
        }
        thaw
    }

    /// Applies an allow events request.
    ///
    /// `partner` is the paired master when `is_master` is true, or `None` when the caller
    /// may not touch it. Requests older than the device's current freeze are ignored, as
    /// are paired modes on non-master devices.
    pub fn allow(
        &mut self,
        device: DeviceId,
        mode: AllowMode,
        time: Timestamp,
        is_master: bool,
        partner: Option<DeviceId>,
    ) -> AllowResult {
        let freeze_time = self
            .devices
            .get(&device)
            .map(DeviceSync::freeze_time)
            .unwrap_or_default();
        if time.is_stale_against(freeze_time) {
            warn!(?device, ?mode, ?time, ?freeze_time, "Ignoring stale allow events");
            return AllowResult::Ignored(IgnoreReason::Stale);
        }

        if mode.target_state().is_paired() && !is_master {
            debug!(?device, ?mode, "Paired allow mode on non-master device, ignoring");
            return AllowResult::Ignored(IgnoreReason::NotMaster);
        }

        let mut thaw = Thaw::default();

        match mode {
            AllowMode::ReplayDevice => {
                let sync = self.sync_mut(device);
                sync.state = FreezeState::NotGrabbed;
                sync.frozen_by = None;
                thaw.replay = sync.held.take();
                thaw.drain.push(device);
                thaw.merge(self.thaw_frozen_by(device));
            }
            AllowMode::SyncDevice => {
                self.sync_mut(device).state = FreezeState::FrozenNextEvent;
                thaw.merge(self.thaw_one(device));
            }
            AllowMode::AsyncDevice => {
                self.sync_mut(device).state = FreezeState::Thawed;
                thaw.merge(self.thaw_one(device));
            }
            AllowMode::AsyncPairedDevice => {
                self.sync_mut(device).state = FreezeState::ThawOthers;
                if let Some(partner) = partner {
                    self.sync_mut(partner).state = FreezeState::Thawed;
                    thaw.merge(self.thaw_one(partner));
                }
            }
            AllowMode::SyncPair | AllowMode::AsyncPair => {
                let state = mode.target_state();
                for id in std::iter::once(device).chain(partner) {
                    let sync = self.sync_mut(id);
                    sync.state = state;
                    sync.anchor = Some(device);
                    thaw.merge(self.thaw_one(id));
                }
            }
        }

        debug!(?device, ?mode, state = ?self.state(device), "Allowed events");
        AllowResult::Applied(thaw)
    }

    /// Pops the next queued event of a device that is no longer frozen.
    pub fn pop_queued(&mut self, device: DeviceId) -> Option<InputEvent> {
        let sync = self.devices.get_mut(&device)?;
        if sync.is_frozen() {
            return None;
        }
        sync.queue.pop_front()
    }
}
