//! Error types surfaced to callers, and the internal control-flow sentinels
//! the engine uses to cut a turn or trigger fallback.
//!
//! The taxonomy mirrors the original's split: [`SendToClient`] and
//! [`VersionMismatch`] never escape [`run_turn`](crate::engine::run_turn) /
//! [`run_turn_async`](crate::engine::run_turn_async) — they are recovered
//! in-engine. Everything in [`DialogError`] is a programmer error and is
//! propagated unchanged.

use std::{error::Error, fmt};

/// A programmer error surfaced from a dialog run.
///
/// None of these are recovered by the engine: a [`DialogError::State`]
/// means a dialog's own accounting is broken (double-set or premature read
/// of a return value), and [`DialogError::UnsupportedKind`] means the
/// active entry point was asked to drive a step it cannot.
#[derive(Debug)]
pub enum DialogError {
    /// A [`DialogState`](crate::state::DialogState) return value was read
    /// before completion, or set more than once.
    State(StateError),
    /// A step of a kind the active engine entry point does not support was
    /// reached (e.g. an async-flavored step inside [`run_turn`](crate::engine::run_turn)).
    UnsupportedKind {
        /// Name of the dialog that produced the unsupported step.
        name: String,
        /// Version of the dialog that produced the unsupported step.
        version: String,
        /// Human-readable label of the unsupported kind (e.g. `"async"`).
        kind: &'static str,
    },
    /// A `dialog_result` step was issued outside of an `async_gen` dialog body.
    DialogResultOutsideAsyncGen {
        /// Name of the dialog body the step was issued from.
        name: String,
        /// Human-readable label of the dialog body's own kind.
        kind: &'static str,
    },
    /// A fallback dialog itself hit a version mismatch while already
    /// running as the recovery path for another mismatch. The fallback is
    /// given no fallback of its own (spec §9, open question 2), so there is
    /// nowhere left to recover to.
    UnrecoverableVersionMismatch {
        /// Name of the dialog whose fallback mismatched.
        name: String,
        /// Version of the dialog whose fallback mismatched.
        version: String,
    },
    /// Persisted or in-flight return values could not be converted to/from
    /// the serialized representation stored in the state tree.
    Serialization(serde_json::Error),
}

impl fmt::Display for DialogError {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DialogError::*;
        match self {
            State(err) => write!(out, "{}", err),
            UnsupportedKind { name, version, kind } => write!(
                out,
                "dialog '{}' (version {}) issued a '{}' step this engine entry point cannot drive",
                name, version, kind
            ),
            DialogResultOutsideAsyncGen { name, kind } => write!(
                out,
                "dialog '{}' (kind '{}') issued a dialog_result step outside of an async_gen body",
                name, kind
            ),
            UnrecoverableVersionMismatch { name, version } => write!(
                out,
                "fallback for dialog '{}' (version {}) itself hit a version mismatch; no further recovery available",
                name, version
            ),
            Serialization(err) => write!(out, "failed to (de)serialize a dialog return value: {}", err),
        }
    }
}

impl Error for DialogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DialogError::State(err) => Some(err),
            DialogError::Serialization(err) => Some(err),
            DialogError::UnsupportedKind { .. }
            | DialogError::DialogResultOutsideAsyncGen { .. }
            | DialogError::UnrecoverableVersionMismatch { .. } => None,
        }
    }
}

impl From<serde_json::Error> for DialogError {
    fn from(err: serde_json::Error) -> Self {
        DialogError::Serialization(err)
    }
}

/// A misuse of a [`DialogState`](crate::state::DialogState) node's
/// write-once return value.
#[derive(Debug)]
pub enum StateError {
    /// `return_value` was read before `result` was set (invariant 4).
    NotDone,
    /// `return_value` was set a second time on an already-completed node (invariant 3).
    AlreadyDone,
}

impl fmt::Display for StateError {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::NotDone => write!(out, "dialog is not done yet"),
            StateError::AlreadyDone => write!(out, "dialog is already done, cannot set return value again"),
        }
    }
}

impl Error for StateError {}

/// The `?`-propagated control-flow signal threaded through a dialog body.
///
/// A dialog body is written as `fn(&SyncCtx<C, S>) -> Result<T, Suspend>`
/// (or the async equivalent): every `ctx.run(step)?` either yields the
/// step's value or propagates a `Suspend` upward. Authors are not meant to
/// construct or match on this type themselves — it exists only so that
/// body signatures have something nameable to put in `Result`'s error
/// position. [`run_turn`](crate::engine::run_turn) and
/// [`run_turn_async`](crate::engine::run_turn_async) catch the two
/// sentinel cases ([`SuspendKind::SendToClient`], [`SuspendKind::VersionMismatch`])
/// internally; only a wrapped [`DialogError`] ever escapes as a real error.
#[derive(Debug)]
pub struct Suspend(pub(crate) SuspendKind);

#[derive(Debug)]
pub(crate) enum SuspendKind {
    /// The dialog must stop here; the turn ends without a return value.
    SendToClient,
    /// The version recorded in the state tree does not match the dialog
    /// value produced at this position; bubbles to the root to trigger
    /// fallback.
    VersionMismatch,
    /// A genuine programmer error; propagates out of `run_turn` unchanged.
    Error(DialogError),
}

impl Suspend {
    pub(crate) fn send_to_client() -> Self {
        Suspend(SuspendKind::SendToClient)
    }

    pub(crate) fn version_mismatch() -> Self {
        Suspend(SuspendKind::VersionMismatch)
    }

    pub(crate) fn into_kind(self) -> SuspendKind {
        self.0
    }
}

impl From<DialogError> for Suspend {
    fn from(err: DialogError) -> Self {
        Suspend(SuspendKind::Error(err))
    }
}

impl From<StateError> for Suspend {
    fn from(err: StateError) -> Self {
        Suspend(SuspendKind::Error(DialogError::State(err)))
    }
}

impl From<serde_json::Error> for Suspend {
    fn from(err: serde_json::Error) -> Self {
        Suspend(SuspendKind::Error(DialogError::Serialization(err)))
    }
}
