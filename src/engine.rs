//! Turn entry points: [`run_turn`] (sync) and [`run_turn_async`] (async),
//! and the fallback orchestration that runs when a version mismatch is
//! detected anywhere in the tree (spec §4.5).
//!
//! Both entry points drive a dialog one attempt at a time in a loop rather
//! than by recursing: a version mismatch resets the persisted state and
//! either runs the supplied fallback or restarts the dialog fresh, and
//! either outcome feeds right back into the same loop rather than into a
//! fresh stack frame. This sidesteps the awkwardness of recursing through
//! an `Fn() -> Dialog<T, C, S>` factory (needed in the first place because
//! a constructed [`Dialog`] can only be driven once — its body is
//! `FnOnce`) without ever needing `BoxFuture`-based recursion on the async
//! side.

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    context::{AsyncCtx, SyncCtx},
    error::{DialogError, SuspendKind},
    persistence::Persistence,
    queue::MessageQueue,
    state::DialogState,
    types::Dialog,
};

/// The result of driving a dialog through one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome<T, S> {
    /// The dialog completed this turn.
    Done {
        /// The dialog's final return value.
        return_value: T,
        /// Messages emitted this turn, in emission order.
        messages: Vec<S>,
    },
    /// The dialog is waiting on a client response, or was reset into
    /// fallback mode and deferred to a later turn.
    Pending {
        /// Messages emitted this turn, in emission order.
        messages: Vec<S>,
    },
}

impl<T, S> TurnOutcome<T, S> {
    fn prepend_messages(self, mut prefix: Vec<S>) -> Self {
        match self {
            TurnOutcome::Done { return_value, messages } => {
                prefix.extend(messages);
                TurnOutcome::Done { return_value, messages: prefix }
            }
            TurnOutcome::Pending { messages } => {
                prefix.extend(messages);
                TurnOutcome::Pending { messages: prefix }
            }
        }
    }

    /// `true` iff the dialog returned a value this turn.
    pub fn is_done(&self) -> bool {
        matches!(self, TurnOutcome::Done { .. })
    }
}

/// The outcome of one attempt at driving a single dialog value to
/// completion or suspension — before the engine decides what, if anything,
/// to do about a mismatch.
enum StepOutcome<T, S> {
    Done { return_value: T, messages: Vec<S> },
    Pending { messages: Vec<S> },
    /// No message can have been emitted yet: every position, including
    /// already-completed ones, has its identity re-checked before replay
    /// or dispatch, so a mismatch is always caught before the first new
    /// send (invariant 5).
    Mismatch,
}

fn drain<S>(queue: &Arc<Mutex<MessageQueue<S>>>) -> Vec<S> {
    queue.lock().expect("message queue mutex poisoned").dequeue_all()
}

fn run_once<T, C, S>(dialog: Dialog<T, C, S>, state: DialogState, client_response: Option<C>) -> Result<(StepOutcome<T, S>, DialogState), DialogError>
where
    T: Serialize + DeserializeOwned,
    C: Clone + Serialize + DeserializeOwned,
{
    let queue = Arc::new(Mutex::new(MessageQueue::new()));
    let ctx = SyncCtx::new(state, Arc::clone(&queue), Arc::new(client_response), false);
    let outcome = ctx.run(dialog);
    let state = ctx.into_state();
    match outcome {
        Ok(return_value) => Ok((StepOutcome::Done { return_value, messages: drain(&queue) }, state)),
        Err(suspend) => match suspend.into_kind() {
            SuspendKind::SendToClient => Ok((StepOutcome::Pending { messages: drain(&queue) }, state)),
            SuspendKind::VersionMismatch => Ok((StepOutcome::Mismatch, state)),
            SuspendKind::Error(err) => Err(err),
        },
    }
}

async fn run_once_async<T, C, S>(dialog: Dialog<T, C, S>, state: DialogState, client_response: Option<C>) -> Result<(StepOutcome<T, S>, DialogState), DialogError>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    C: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: Send + 'static,
{
    let queue = Arc::new(Mutex::new(MessageQueue::new()));
    let ctx = AsyncCtx::new(state, Arc::clone(&queue), Arc::new(client_response), false);
    let outcome = ctx.run(dialog).await;
    let state = ctx.into_state();
    match outcome {
        Ok(return_value) => Ok((StepOutcome::Done { return_value, messages: drain(&queue) }, state)),
        Err(suspend) => match suspend.into_kind() {
            SuspendKind::SendToClient => Ok((StepOutcome::Pending { messages: drain(&queue) }, state)),
            SuspendKind::VersionMismatch => Ok((StepOutcome::Mismatch, state)),
            SuspendKind::Error(err) => Err(err),
        },
    }
}

/// Drives `dialog_fn` through a synchronous turn.
///
/// `dialog_fn` is called once per attempt: once for the ordinary run, and
/// again if a version mismatch sends the turn through a fallback and back.
/// This is the only way to "run the same dialog twice" in a language where
/// a constructed [`Dialog`]'s body is consumed the first time it runs — see
/// `DESIGN.md`.
///
/// Rejects with [`DialogError::UnsupportedKind`] if `dialog_fn`, or any
/// subdialog it reaches before the next suspension, produces an `Async` or
/// `AsyncGen` step — those require [`run_turn_async`].
pub fn run_turn<T, F, C, S, P, D, FB>(dialog_fn: D, persistence: &P, client_response: Option<C>, fallback_fn: Option<FB>) -> Result<TurnOutcome<T, S>, DialogError>
where
    T: Serialize + DeserializeOwned,
    F: Serialize + DeserializeOwned,
    C: Clone + Serialize + DeserializeOwned,
    P: Persistence,
    D: Fn() -> Dialog<T, C, S>,
    FB: Fn() -> Dialog<F, C, S>,
{
    let probe = dialog_fn();
    let name = probe.name.clone();
    let version = probe.version.clone();
    info!("turn start: dialog '{}' (version {})", name, version);

    let mut state = persistence.load(&name, &version);
    let mut prefix: Vec<S> = Vec::new();
    let mut next_dialog = Some(probe);

    loop {
        if state.handling_fallback() {
            if let Some(fallback_fn) = &fallback_fn {
                debug!("running fallback for dialog '{}' (version {})", name, version);
                let fallback = fallback_fn();
                let (outcome, fallback_state) = run_once(fallback, state, client_response.clone())?;
                match outcome {
                    StepOutcome::Pending { messages } => {
                        persistence.save(&fallback_state);
                        return Ok(TurnOutcome::Pending { messages }.prepend_messages(prefix));
                    }
                    StepOutcome::Mismatch => {
                        return Err(DialogError::UnrecoverableVersionMismatch { name, version });
                    }
                    StepOutcome::Done { messages, .. } => {
                        info!("fallback for dialog '{}' completed, resuming", name);
                        prefix.extend(messages);
                        let mut resumed = fallback_state;
                        resumed.reset(&name, &version, false);
                        persistence.save(&resumed);
                        state = resumed;
                        next_dialog = Some(dialog_fn());
                        continue;
                    }
                }
            }
            // No fallback supplied: the flag is inert without one to run,
            // so just fall through and retry the dialog itself.
        }

        let dialog = next_dialog.take().unwrap_or_else(&dialog_fn);
        let (outcome, mut new_state) = run_once(dialog, state, client_response.clone())?;
        match outcome {
            StepOutcome::Done { return_value, messages } => {
                persistence.save(&new_state);
                return Ok(TurnOutcome::Done { return_value, messages }.prepend_messages(prefix));
            }
            StepOutcome::Pending { messages } => {
                debug!("turn cut: dialog '{}' awaiting client response", name);
                persistence.save(&new_state);
                return Ok(TurnOutcome::Pending { messages }.prepend_messages(prefix));
            }
            StepOutcome::Mismatch => {
                warn!("version mismatch on dialog '{}' (version {}), entering fallback", name, version);
                new_state.reset(&name, &version, true);
                persistence.save(&new_state);
                state = new_state;
            }
        }
    }
}

/// Drives `dialog_fn` through an asynchronous turn.
///
/// Unlike [`run_turn`], this can drive any step kind, including `Async` and
/// `AsyncGen`. See [`run_turn`] for the meaning of `dialog_fn` being called
/// more than once.
pub async fn run_turn_async<T, F, C, S, P, D, FB>(dialog_fn: D, persistence: &P, client_response: Option<C>, fallback_fn: Option<FB>) -> Result<TurnOutcome<T, S>, DialogError>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Serialize + DeserializeOwned + Send + 'static,
    C: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: Send + 'static,
    P: Persistence,
    D: Fn() -> Dialog<T, C, S>,
    FB: Fn() -> Dialog<F, C, S>,
{
    let probe = dialog_fn();
    let name = probe.name.clone();
    let version = probe.version.clone();
    info!("turn start: dialog '{}' (version {})", name, version);

    let mut state = persistence.load(&name, &version);
    let mut prefix: Vec<S> = Vec::new();
    let mut next_dialog = Some(probe);

    loop {
        if state.handling_fallback() {
            if let Some(fallback_fn) = &fallback_fn {
                debug!("running fallback for dialog '{}' (version {})", name, version);
                let fallback = fallback_fn();
                let (outcome, fallback_state) = run_once_async(fallback, state, client_response.clone()).await?;
                match outcome {
                    StepOutcome::Pending { messages } => {
                        persistence.save(&fallback_state);
                        return Ok(TurnOutcome::Pending { messages }.prepend_messages(prefix));
                    }
                    StepOutcome::Mismatch => {
                        return Err(DialogError::UnrecoverableVersionMismatch { name, version });
                    }
                    StepOutcome::Done { messages, .. } => {
                        info!("fallback for dialog '{}' completed, resuming", name);
                        prefix.extend(messages);
                        let mut resumed = fallback_state;
                        resumed.reset(&name, &version, false);
                        persistence.save(&resumed);
                        state = resumed;
                        next_dialog = Some(dialog_fn());
                        continue;
                    }
                }
            }
        }

        let dialog = next_dialog.take().unwrap_or_else(&dialog_fn);
        let (outcome, mut new_state) = run_once_async(dialog, state, client_response.clone()).await?;
        match outcome {
            StepOutcome::Done { return_value, messages } => {
                persistence.save(&new_state);
                return Ok(TurnOutcome::Done { return_value, messages }.prepend_messages(prefix));
            }
            StepOutcome::Pending { messages } => {
                debug!("turn cut: dialog '{}' awaiting client response", name);
                persistence.save(&new_state);
                return Ok(TurnOutcome::Pending { messages }.prepend_messages(prefix));
            }
            StepOutcome::Mismatch => {
                warn!("version mismatch on dialog '{}' (version {}), entering fallback", name, version);
                new_state.reset(&name, &version, true);
                persistence.save(&new_state);
                state = new_state;
            }
        }
    }
}
