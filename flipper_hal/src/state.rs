//! Central state of every switch, lamp and solenoid.
//!
//! Entries are plain booleans. Switch updates dispatch an edge event to
//! the listeners registered for that switch; lamp and solenoid updates
//! are poll-only. Each switch owns two events, created once at build
//! time and handed out by `Arc`, so listeners always receive the same
//! instance for the same edge.

use flipper_common::descriptors::{DescriptorTable, SolenoidDescriptor};
use flipper_common::error::{DeviceKind, DriverError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Raw bit levels accepted by the update operations.
///
/// Anything non-zero is high; the store only ever keeps the boolean.
pub trait Level: Copy {
    /// Coerce to a boolean.
    fn is_high(self) -> bool;
}

impl Level for bool {
    #[inline]
    fn is_high(self) -> bool {
        self
    }
}

macro_rules! impl_level {
    ($($t:ty),*) => {
        $(
            impl Level for $t {
                #[inline]
                fn is_high(self) -> bool {
                    self != 0
                }
            }
        )*
    };
}

impl_level!(u8, u16, u32, u64, usize);

/// Edge of one switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchEvent {
    /// Switch name.
    pub name: String,
    /// `true` when the switch closed, `false` when it opened.
    pub state: bool,
}

/// Handle returned by [`StateStore::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback invoked for each edge of one switch.
pub type SwitchListener = Box<dyn FnMut(&Arc<SwitchEvent>) + Send>;

struct SwitchCell {
    state: bool,
    closed: Arc<SwitchEvent>,
    opened: Arc<SwitchEvent>,
    listeners: Vec<(ListenerId, SwitchListener)>,
}

impl SwitchCell {
    fn new(name: &str) -> Self {
        Self {
            state: false,
            closed: Arc::new(SwitchEvent {
                name: name.to_string(),
                state: true,
            }),
            opened: Arc::new(SwitchEvent {
                name: name.to_string(),
                state: false,
            }),
            listeners: Vec::new(),
        }
    }
}

/// Serializable copy of every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Switch states by name.
    pub switches: BTreeMap<String, bool>,
    /// Lamp states by name.
    pub lamps: BTreeMap<String, bool>,
    /// Solenoid states by name, built-in relays included.
    pub solenoids: BTreeMap<String, bool>,
}

/// Boolean state of every configured device plus switch listeners.
pub struct StateStore {
    switches: HashMap<String, SwitchCell>,
    lamps: HashMap<String, bool>,
    solenoids: HashMap<String, bool>,
    next_listener: u64,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("switches", &self.switches.len())
            .field("lamps", &self.lamps.len())
            .field("solenoids", &self.solenoids.len())
            .finish()
    }
}

impl StateStore {
    /// Store with every name of `table` plus the built-in relays, all `false`.
    pub fn new(table: &DescriptorTable) -> Self {
        let switches = table
            .switches
            .keys()
            .map(|name| (name.clone(), SwitchCell::new(name)))
            .collect();
        let lamps = table.lamps.keys().map(|name| (name.clone(), false)).collect();
        let solenoids = table
            .solenoids
            .keys()
            .cloned()
            .chain(SolenoidDescriptor::relays().iter().map(|(name, _)| name.to_string()))
            .map(|name| (name, false))
            .collect();

        Self {
            switches,
            lamps,
            solenoids,
            next_listener: 0,
        }
    }

    /// Check that every name in `table` has an entry here.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::Dependency` naming the first missing entry.
    pub fn ensure_covers(&self, table: &DescriptorTable) -> Result<(), DriverError> {
        let missing = table
            .switches
            .keys()
            .find(|name| !self.switches.contains_key(*name))
            .map(|name| (DeviceKind::Switch, name))
            .or_else(|| {
                table
                    .lamps
                    .keys()
                    .find(|name| !self.lamps.contains_key(*name))
                    .map(|name| (DeviceKind::Lamp, name))
            })
            .or_else(|| {
                table
                    .solenoids
                    .keys()
                    .find(|name| !self.solenoids.contains_key(*name))
                    .map(|name| (DeviceKind::Solenoid, name))
            });

        match missing {
            Some((kind, name)) => Err(DriverError::Dependency(format!(
                "StateStore has no {kind} '{name}'"
            ))),
            None => Ok(()),
        }
    }

    /// Record a switch level and dispatch the matching edge event.
    ///
    /// Listeners run in registration order before this returns.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::UnknownName` if the switch is not configured.
    pub fn update_switch(&mut self, name: &str, raw: impl Level) -> Result<(), DriverError> {
        let cell = self
            .switches
            .get_mut(name)
            .ok_or_else(|| DriverError::unknown(DeviceKind::Switch, name))?;
        let state = raw.is_high();
        cell.state = state;
        let event = if state { &cell.closed } else { &cell.opened };
        for (_, listener) in cell.listeners.iter_mut() {
            listener(event);
        }
        Ok(())
    }

    /// Record a solenoid level.
    pub fn update_solenoid(&mut self, name: &str, raw: impl Level) -> Result<(), DriverError> {
        let entry = self
            .solenoids
            .get_mut(name)
            .ok_or_else(|| DriverError::unknown(DeviceKind::Solenoid, name))?;
        *entry = raw.is_high();
        Ok(())
    }

    /// Record a lamp level.
    pub fn update_lamp(&mut self, name: &str, raw: impl Level) -> Result<(), DriverError> {
        let entry = self
            .lamps
            .get_mut(name)
            .ok_or_else(|| DriverError::unknown(DeviceKind::Lamp, name))?;
        *entry = raw.is_high();
        Ok(())
    }

    /// Register `listener` for edges of switch `name`.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::UnknownName` if the switch is not configured.
    pub fn add_listener<F>(&mut self, name: &str, listener: F) -> Result<ListenerId, DriverError>
    where
        F: FnMut(&Arc<SwitchEvent>) + Send + 'static,
    {
        let cell = self
            .switches
            .get_mut(name)
            .ok_or_else(|| DriverError::unknown(DeviceKind::Switch, name))?;
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        cell.listeners.push((id, Box::new(listener)));
        Ok(id)
    }

    /// Remove a listener. Returns `false` if it was not registered for `name`.
    pub fn remove_listener(&mut self, name: &str, id: ListenerId) -> bool {
        let Some(cell) = self.switches.get_mut(name) else {
            return false;
        };
        let before = cell.listeners.len();
        cell.listeners.retain(|(candidate, _)| *candidate != id);
        cell.listeners.len() != before
    }

    /// Number of listeners registered for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.switches.get(name).map_or(0, |cell| cell.listeners.len())
    }

    /// Current state of a switch.
    pub fn switch(&self, name: &str) -> Option<bool> {
        self.switches.get(name).map(|cell| cell.state)
    }

    /// Current state of a lamp.
    pub fn lamp(&self, name: &str) -> Option<bool> {
        self.lamps.get(name).copied()
    }

    /// Current state of a solenoid or relay.
    pub fn solenoid(&self, name: &str) -> Option<bool> {
        self.solenoids.get(name).copied()
    }

    /// Copy of all entries, sorted by name.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            switches: self
                .switches
                .iter()
                .map(|(name, cell)| (name.clone(), cell.state))
                .collect(),
            lamps: self.lamps.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            solenoids: self.solenoids.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}
