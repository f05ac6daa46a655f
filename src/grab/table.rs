// SPDX-License-Identifier: GPL-3.0-or-later

use indexmap::{map::Entry, IndexMap};

use crate::{
    device::DeviceId,
    input::{ClientId, ModifierMask, Timestamp, WindowId},
};

use super::{ActiveGrab, GrabKind, PassiveGrab, PassiveGrabKey, ANY_DETAIL};

/// Passive grabs per window and the active grab per device.
///
/// This does no protocol validation; callers decide what is legal to insert.
#[derive(Debug, Default)]
pub struct GrabTable {
    /// Passive grabs, in installation order per window.
    passive: IndexMap<WindowId, IndexMap<PassiveGrabKey, PassiveGrab>>,
    active: IndexMap<DeviceId, ActiveGrab>,
    /// When each device was last grabbed. Outlives the grab.
    grab_times: IndexMap<DeviceId, Timestamp>,
}

impl GrabTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// Inserts a passive grab.
    ///
    /// Returns `false` without touching the table if a grab with the same key exists.
    pub fn insert_passive(&mut self, grab: PassiveGrab) -> bool {
        match self.passive.entry(grab.key.window).or_default().entry(grab.key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(grab);
                true
            }
        }
    }

    /// Removes the passive grab with this key.
    ///
    /// Returns `false` if there was none.
    pub fn remove_passive(&mut self, key: &PassiveGrabKey) -> bool {
        let Entry::Occupied(mut window_grabs) = self.passive.entry(key.window) else {
            return false;
        };

        let removed = window_grabs.get_mut().shift_remove(key).is_some();
        if window_grabs.get().is_empty() {
            window_grabs.shift_remove();
        }
        removed
    }

    pub fn get_passive(&self, key: &PassiveGrabKey) -> Option<&PassiveGrab> {
        self.passive
            .get(&key.window)
            .and_then(|grabs| grabs.get(key))
    }

    /// Finds the passive grab on `window` an event should activate.
    ///
    /// `devices` are tried in order. For each, a grab on the exact detail wins over a
    /// grab on [`ANY_DETAIL`]. Modifiers must match exactly.
    pub fn lookup_passive(
        &self,
        window: WindowId,
        devices: &[DeviceId],
        kind: GrabKind,
        detail: u32,
        modifiers: ModifierMask,
    ) -> Option<&PassiveGrab> {
        let grabs = self.passive.get(&window)?;

        let exact = (kind.takes_detail() && detail != ANY_DETAIL).then_some(detail);

        devices.iter().find_map(|&device| {
            exact.into_iter().chain([ANY_DETAIL]).find_map(|detail| {
                grabs.get(&PassiveGrabKey {
                    device,
                    window,
                    kind,
                    detail,
                    modifiers,
                })
            })
        })
    }

    /// All passive grabs on `window`, oldest first.
    pub fn passive_grabs(&self, window: WindowId) -> impl Iterator<Item = &PassiveGrab> {
        self.passive
            .get(&window)
            .into_iter()
            .flat_map(|grabs| grabs.values())
    }

    pub fn passive_count(&self) -> usize {
        self.passive.values().map(IndexMap::len).sum()
    }

    /// Removes every passive grab for which `keep` returns false.
    ///
    /// Returns how many were removed.
    pub fn retain_passive(&mut self, mut keep: impl FnMut(&PassiveGrab) -> bool) -> usize {
        let before = self.passive_count();

        for grabs in self.passive.values_mut() {
            grabs.retain(|_, grab| keep(grab));
        }
        self.passive.retain(|_, grabs| !grabs.is_empty());

        before - self.passive_count()
    }

    /// Drops every passive grab on `window`.
    pub fn remove_window(&mut self, window: WindowId) -> usize {
        self.passive
            .shift_remove(&window)
            .map_or(0, |grabs| grabs.len())
    }

    /// Sets the active grab of a device, returning the one it replaces.
    pub fn set_active(&mut self, grab: ActiveGrab) -> Option<ActiveGrab> {
        self.grab_times.insert(grab.device, grab.time);
        self.active.insert(grab.device, grab)
    }

    /// The time of the latest grab on `device`, whether or not it is still held.
    pub fn last_grab_time(&self, device: DeviceId) -> Option<Timestamp> {
        self.grab_times.get(&device).copied()
    }

    pub fn clear_active(&mut self, device: DeviceId) -> Option<ActiveGrab> {
        self.active.shift_remove(&device)
    }

    pub fn active(&self, device: DeviceId) -> Option<&ActiveGrab> {
        self.active.get(&device)
    }

    pub fn active_grabs(&self) -> impl Iterator<Item = &ActiveGrab> {
        self.active.values()
    }

    /// Devices whose active grab is owned by `client`.
    pub fn active_devices_of(&self, client: ClientId) -> Vec<DeviceId> {
        self.active
            .values()
            .filter(|grab| grab.owner == client)
            .map(|grab| grab.device)
            .collect()
    }
}
