//! The persistent checkpoint tree: one [`DialogState`] node per
//! framework-tracked step, holding enough to resume a dialog exactly where
//! it left off.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{DialogError, StateError};

/// The write-once return value of a completed dialog node.
///
/// Stored as an erased [`serde_json::Value`] because a single state tree
/// mixes many different return types `T` across its nodes; each node's own
/// `T` is only known again at the point it is read back by its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogOutcome {
    return_value: serde_json::Value,
}

/// A node in the persistent dialog checkpoint tree (see spec §3).
///
/// Constructing one directly from a deserialized payload is just
/// `serde_json::from_value::<DialogState>(raw)` — the logical wire schema
/// and this struct's `Serialize`/`Deserialize` derive are the same shape,
/// so no separate `state_from_map` helper is needed in this port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogState {
    version: String,
    name: String,
    #[serde(default)]
    subdialogs: Vec<DialogState>,
    #[serde(default)]
    result: Option<DialogOutcome>,
    #[serde(default)]
    sent_to_client: bool,
    #[serde(default)]
    handling_fallback: bool,
}

impl DialogState {
    /// Builds a fresh, empty node for a dialog that has not run yet.
    pub fn new_empty(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            name: name.into(),
            subdialogs: Vec::new(),
            result: None,
            sent_to_client: false,
            handling_fallback: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub(crate) fn sent_to_client(&self) -> bool {
        self.sent_to_client
    }

    pub(crate) fn set_sent_to_client(&mut self) {
        self.sent_to_client = true;
    }

    pub(crate) fn handling_fallback(&self) -> bool {
        self.handling_fallback
    }

    /// Returns the child state at `index`, appending a fresh one (seeded
    /// from `name`/`version`) when `index` is exactly the current number
    /// of children. Any other out-of-range index is an engine bug: the
    /// call-counter driven traversal must only ever ask for the next
    /// unseen position or one already produced on an earlier turn.
    pub(crate) fn get_subdialog_state(
        &mut self,
        index: usize,
        name: &str,
        version: &str,
    ) -> &mut DialogState {
        if index == self.subdialogs.len() {
            self.subdialogs.push(DialogState::new_empty(name, version));
        }
        self.subdialogs
            .get_mut(index)
            .expect("subdialog index must not skip ahead of the replay prefix")
    }

    /// Moves the child state at `index` out, leaving a placeholder behind.
    ///
    /// Used by the async dispatcher, which owns state nodes outright while
    /// recursing (so a nested dialog's future does not need to borrow
    /// across an `.await`) and puts the node back via
    /// [`restore_subdialog_state`](Self::restore_subdialog_state) once the
    /// recursive call resolves.
    pub(crate) fn take_subdialog_state(&mut self, index: usize, name: &str, version: &str) -> DialogState {
        self.get_subdialog_state(index, name, version);
        std::mem::replace(&mut self.subdialogs[index], DialogState::new_empty(name, version))
    }

    /// Puts a state moved out via
    /// [`take_subdialog_state`](Self::take_subdialog_state) back in place.
    pub(crate) fn restore_subdialog_state(&mut self, index: usize, state: DialogState) {
        self.subdialogs[index] = state;
    }

    /// Reads the return value, deserialized as `T`. Fails if `result` is unset.
    pub fn return_value<T: DeserializeOwned>(&self) -> Result<T, DialogError> {
        match &self.result {
            Some(outcome) => Ok(serde_json::from_value(outcome.return_value.clone())?),
            None => Err(DialogError::State(StateError::NotDone)),
        }
    }

    /// Sets the return value. Fails if `result` is already set (write-once).
    pub(crate) fn set_return_value<T: Serialize>(&mut self, value: &T) -> Result<(), DialogError> {
        if self.result.is_some() {
            return Err(DialogError::State(StateError::AlreadyDone));
        }
        self.result = Some(DialogOutcome {
            return_value: serde_json::to_value(value)?,
        });
        Ok(())
    }

    /// `true` iff this node has completed.
    pub fn is_done(&self) -> bool {
        self.result.is_some()
    }

    /// Destroys this node's progress and re-seeds it from `name`/`version`,
    /// entering or leaving fallback mode per `fallback_mode`.
    pub(crate) fn reset(&mut self, name: &str, version: &str, fallback_mode: bool) {
        self.subdialogs.clear();
        self.name = name.to_owned();
        self.version = version.to_owned();
        self.result = None;
        self.sent_to_client = false;
        self.handling_fallback = fallback_mode;
    }
}
