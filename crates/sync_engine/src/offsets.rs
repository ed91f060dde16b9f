//! Shared offset table.
//!
//! Offsets are keyed by modality or by shared group. A modality bound to a
//! group reads and writes the group's value, so every member observes a group
//! edit at once. One `RwLock` guards all values: many display readers, few
//! writers (offset edits, bulk restore).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use contracts::{ContractError, ModalityId, SessionBlueprint};
use tracing::{debug, warn};

/// Result of applying an offset to a base index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Offset in effect
    pub offset: i64,
    /// `base + offset` before clamping
    pub requested: i64,
    /// Final index in `[0, len - 1]`
    pub index: usize,
    pub clamped: bool,
}

/// One committed offset write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetUpdate {
    /// Key actually written (the group when a bound modality was named)
    pub key: ModalityId,
    pub value: i64,
    pub previous: i64,
    /// Modalities whose resolution changes
    pub affected: Vec<ModalityId>,
    pub revision: u64,
}

/// One committed bulk write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetBatch {
    pub affected: Vec<ModalityId>,
    /// Keys that matched no modality or group
    pub ignored: Vec<ModalityId>,
    pub revision: u64,
}

#[derive(Debug, Default)]
struct TableState {
    values: HashMap<ModalityId, i64>,
    revision: u64,
}

/// Shared offset table
#[derive(Debug)]
pub struct OffsetTable {
    modalities: Vec<ModalityId>,
    /// modality -> group
    bindings: HashMap<ModalityId, ModalityId>,
    /// group -> members
    groups: HashMap<ModalityId, Vec<ModalityId>>,
    state: RwLock<TableState>,
}

impl OffsetTable {
    /// Table over `modalities` with no groups; every value starts at 0
    pub fn new<I>(modalities: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ModalityId>,
    {
        Self {
            modalities: modalities.into_iter().map(Into::into).collect(),
            bindings: HashMap::new(),
            groups: HashMap::new(),
            state: RwLock::new(TableState::default()),
        }
    }

    /// Bind `members` to the shared key `group`
    ///
    /// # Errors
    /// `UnknownModality` for a member not in the table, `ConfigValidation`
    /// when a member is already bound or the group id shadows a modality.
    pub fn with_group<I>(mut self, group: impl Into<ModalityId>, members: I) -> Result<Self, ContractError>
    where
        I: IntoIterator,
        I::Item: Into<ModalityId>,
    {
        let group = group.into();
        if self.modalities.contains(&group) {
            return Err(ContractError::config_validation(
                format!("offset_groups[{group}]"),
                "group id collides with a modality id",
            ));
        }

        let mut bound = Vec::new();
        for member in members {
            let member = member.into();
            if !self.modalities.contains(&member) {
                return Err(ContractError::UnknownModality {
                    modality_id: member,
                });
            }
            if let Some(previous) = self.bindings.get(&member) {
                return Err(ContractError::config_validation(
                    format!("offset_groups[{group}]"),
                    format!("modality '{member}' is already bound to group '{previous}'"),
                ));
            }
            self.bindings.insert(member.clone(), group.clone());
            bound.push(member);
        }
        self.groups.insert(group, bound);
        Ok(self)
    }

    /// Table with the blueprint's modalities and offset groups
    pub fn from_blueprint(blueprint: &SessionBlueprint) -> Result<Self, ContractError> {
        let mut table = Self::new(blueprint.modalities.iter().map(|m| m.id.as_str()));
        for group in &blueprint.offset_groups {
            table = table.with_group(group.id.as_str(), group.members.iter())?;
        }
        Ok(table)
    }

    /// Key a modality's offset is stored under
    pub fn owner_key<'a>(&'a self, key: &'a ModalityId) -> &'a ModalityId {
        self.bindings.get(key).unwrap_or(key)
    }

    /// Group a modality is bound to
    pub fn group_of(&self, modality_id: &str) -> Option<&ModalityId> {
        self.bindings.get(modality_id)
    }

    pub fn is_known(&self, key: &str) -> bool {
        self.groups.contains_key(key) || self.modalities.iter().any(|m| m == &key)
    }

    /// Modalities whose resolution depends on `key`
    pub fn members_of(&self, key: &ModalityId) -> Vec<ModalityId> {
        let owner = self.owner_key(key);
        match self.groups.get(owner) {
            Some(members) => members.clone(),
            None => vec![owner.clone()],
        }
    }

    /// Current value; 0 if never set
    pub fn get(&self, key: &str) -> i64 {
        self.read().get(key)
    }

    pub fn revision(&self) -> u64 {
        self.read().state.revision
    }

    /// Consistent read view across several lookups
    ///
    /// Resolving many modalities through one view guarantees they all see
    /// the same group values.
    pub fn read(&self) -> OffsetsRead<'_> {
        OffsetsRead {
            table: self,
            state: self.state.read().unwrap_or_else(|e| e.into_inner()),
        }
    }

    /// `clamp(base + get(modality), 0, len - 1)`
    pub fn apply(&self, modality_id: &str, base_index: usize, len: usize) -> Applied {
        self.read().apply(modality_id, base_index, len)
    }

    /// Overwrite one key; a bound modality writes its group
    ///
    /// # Errors
    /// `UnknownModality` when `key` is neither a modality nor a group.
    pub fn set(&self, key: &ModalityId, value: i64) -> Result<OffsetUpdate, ContractError> {
        let owner = self.checked_owner(key)?;
        let mut state = self.write();
        let previous = write_value(&mut state, owner, value);
        state.revision += 1;

        let update = OffsetUpdate {
            key: owner.clone(),
            value,
            previous,
            affected: self.members_of(owner),
            revision: state.revision,
        };
        debug!(key = %update.key, value, previous, revision = update.revision, "offset set");
        Ok(update)
    }

    /// Add `delta` to a key's current value
    pub fn nudge(&self, key: &ModalityId, delta: i64) -> Result<OffsetUpdate, ContractError> {
        let owner = self.checked_owner(key)?;
        let mut state = self.write();
        let current = state.values.get(owner).copied().unwrap_or(0);
        let value = current.saturating_add(delta);
        write_value(&mut state, owner, value);
        state.revision += 1;

        debug!(key = %owner, delta, value, "offset nudged");
        Ok(OffsetUpdate {
            key: owner.clone(),
            value,
            previous: current,
            affected: self.members_of(owner),
            revision: state.revision,
        })
    }

    pub fn reset(&self, key: &ModalityId) -> Result<OffsetUpdate, ContractError> {
        self.set(key, 0)
    }

    /// Reset every key to 0
    pub fn reset_all(&self) -> OffsetBatch {
        let mut state = self.write();
        let mut affected = Vec::new();
        for key in state.values.keys() {
            affected.extend(self.members_of(key));
        }
        state.values.clear();
        state.revision += 1;

        affected.sort();
        debug!(affected = affected.len(), "all offsets reset");
        OffsetBatch {
            affected,
            ignored: Vec::new(),
            revision: state.revision,
        }
    }

    /// Replace the whole table with `batch` in one write
    ///
    /// Keys absent from `batch` go back to 0. Unknown keys are skipped and
    /// reported. Readers see either the old table or the new one.
    pub fn restore<I>(&self, batch: I) -> OffsetBatch
    where
        I: IntoIterator<Item = (ModalityId, i64)>,
    {
        let mut next = HashMap::new();
        let mut ignored = Vec::new();
        for (key, value) in batch {
            if !self.is_known(&key) {
                ignored.push(key);
                continue;
            }
            if value != 0 {
                next.insert(self.owner_key(&key).clone(), value);
            }
        }

        let mut state = self.write();
        let mut touched: HashSet<ModalityId> = state.values.keys().cloned().collect();
        touched.extend(next.keys().cloned());
        let mut affected: Vec<ModalityId> =
            touched.iter().flat_map(|key| self.members_of(key)).collect();
        affected.sort();
        affected.dedup();

        state.values = next;
        state.revision += 1;

        if !ignored.is_empty() {
            warn!(ignored = ?ignored, "restore skipped unknown offset keys");
        }
        debug!(
            keys = state.values.len(),
            revision = state.revision,
            "offsets restored"
        );
        OffsetBatch {
            affected,
            ignored,
            revision: state.revision,
        }
    }

    /// Non-zero values keyed by owner, for persistence
    pub fn snapshot(&self) -> BTreeMap<ModalityId, i64> {
        self.read()
            .state
            .values
            .iter()
            .filter(|(_, v)| **v != 0)
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    fn checked_owner<'a>(&'a self, key: &'a ModalityId) -> Result<&'a ModalityId, ContractError> {
        if !self.is_known(key) {
            return Err(ContractError::UnknownModality {
                modality_id: key.clone(),
            });
        }
        Ok(self.owner_key(key))
    }

    fn write(&self) -> RwLockWriteGuard<'_, TableState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn write_value(state: &mut TableState, key: &ModalityId, value: i64) -> i64 {
    let previous = if value == 0 {
        state.values.remove(key)
    } else {
        state.values.insert(key.clone(), value)
    };
    previous.unwrap_or(0)
}

/// Read view holding the table's read lock
pub struct OffsetsRead<'a> {
    table: &'a OffsetTable,
    state: RwLockReadGuard<'a, TableState>,
}

impl OffsetsRead<'_> {
    pub fn get(&self, key: &str) -> i64 {
        let owner = self.table.bindings.get(key).map(|g| g.as_str()).unwrap_or(key);
        self.state.values.get(owner).copied().unwrap_or(0)
    }

    pub fn apply(&self, modality_id: &str, base_index: usize, len: usize) -> Applied {
        let offset = self.get(modality_id);
        let requested = (base_index as i64).saturating_add(offset);
        let max = len.saturating_sub(1) as i64;
        let index = requested.clamp(0, max);
        Applied {
            offset,
            requested,
            index: index as usize,
            clamped: index != requested,
        }
    }
}
