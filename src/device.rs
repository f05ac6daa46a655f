// SPDX-License-Identifier: GPL-3.0-or-later

//! Device, window, and cursor lookup.
//!
//! The arbiter never owns any of these. It only needs to know whether a handle is live,
//! what role a device plays, and which master a device is paired with or attached to.

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::input::{CursorId, WindowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    /// A device that is neither a master nor attached to one.
    Floating,
    MasterPointer,
    MasterKeyboard,
    /// A physical device feeding a master.
    Slave,
}

impl DeviceRole {
    pub fn is_master(self) -> bool {
        matches!(self, DeviceRole::MasterPointer | DeviceRole::MasterKeyboard)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub role: DeviceRole,
    /// The other-role master, for master devices.
    pub paired: Option<DeviceId>,
    /// The master this slave is attached to.
    pub master: Option<DeviceId>,
}

impl Device {
    pub fn is_master(&self) -> bool {
        self.role.is_master()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("device {0:?} is already registered")]
    Duplicate(DeviceId),
    #[error("device {0:?} does not exist")]
    Unknown(DeviceId),
    #[error("devices {0:?} and {1:?} must be one master pointer and one master keyboard")]
    BadPairing(DeviceId, DeviceId),
    #[error("cannot attach {slave:?} to {master:?}")]
    BadAttachment { slave: DeviceId, master: DeviceId },
}

/// Live devices, windows, and cursors.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    devices: IndexMap<DeviceId, Device>,
    windows: IndexSet<WindowId>,
    cursors: IndexSet<CursorId>,
}

impl Registry {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_device(&mut self, id: DeviceId, role: DeviceRole) -> Result<(), TopologyError> {
        if self.devices.contains_key(&id) {
            return Err(TopologyError::Duplicate(id));
        }

        debug!(?id, ?role, "Adding device");
        self.devices.insert(
            id,
            Device {
                id,
                role,
                paired: None,
                master: None,
            },
        );
        Ok(())
    }

    /// Forgets a device, unpairing and detaching anything that pointed at it.
    pub fn remove_device(&mut self, id: DeviceId) -> Option<Device> {
        let device = self.devices.shift_remove(&id)?;

        for other in self.devices.values_mut() {
            if other.paired == Some(id) {
                other.paired = None;
            }
            if other.master == Some(id) {
                other.master = None;
                other.role = DeviceRole::Floating;
            }
        }

        Some(device)
    }

    /// Pairs a master pointer with a master keyboard.
    pub fn pair(&mut self, a: DeviceId, b: DeviceId) -> Result<(), TopologyError> {
        let role_a = self.devices.get(&a).ok_or(TopologyError::Unknown(a))?.role;
        let role_b = self.devices.get(&b).ok_or(TopologyError::Unknown(b))?.role;

        let valid = matches!(
            (role_a, role_b),
            (DeviceRole::MasterPointer, DeviceRole::MasterKeyboard)
                | (DeviceRole::MasterKeyboard, DeviceRole::MasterPointer)
        );
        if !valid {
            return Err(TopologyError::BadPairing(a, b));
        }

        for (this, other) in [(a, b), (b, a)] {
            if let Some(device) = self.devices.get_mut(&this) {
                device.paired = Some(other);
            }
        }
        Ok(())
    }

    /// Attaches a slave (or floating) device to a master.
    pub fn attach(&mut self, slave: DeviceId, master: DeviceId) -> Result<(), TopologyError> {
        let master_is_master = self
            .devices
            .get(&master)
            .ok_or(TopologyError::Unknown(master))?
            .is_master();
        let device = self
            .devices
            .get_mut(&slave)
            .ok_or(TopologyError::Unknown(slave))?;

        if !master_is_master || device.is_master() {
            return Err(TopologyError::BadAttachment { slave, master });
        }

        device.role = DeviceRole::Slave;
        device.master = Some(master);
        Ok(())
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// The other-role master paired with `id`, if `id` is a master.
    pub fn paired(&self, id: DeviceId) -> Option<DeviceId> {
        self.devices
            .get(&id)
            .filter(|device| device.is_master())
            .and_then(|device| device.paired)
    }

    /// The master `id` is attached to, if it is a slave.
    pub fn master_of(&self, id: DeviceId) -> Option<DeviceId> {
        self.devices.get(&id).and_then(|device| device.master)
    }

    pub fn add_window(&mut self, window: WindowId) {
        self.windows.insert(window);
    }

    pub fn remove_window(&mut self, window: WindowId) -> bool {
        self.windows.shift_remove(&window)
    }

    pub fn window_exists(&self, window: WindowId) -> bool {
        self.windows.contains(&window)
    }

    pub fn add_cursor(&mut self, cursor: CursorId) {
        self.cursors.insert(cursor);
    }

    pub fn cursor_exists(&self, cursor: CursorId) -> bool {
        self.cursors.contains(&cursor)
    }
}
