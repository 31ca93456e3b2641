//! The two dispatchers a dialog body talks to: [`SyncCtx`] for
//! [`Dialog::plain`](crate::types::Dialog::plain) bodies, [`AsyncCtx`] for
//! [`Dialog::asynced`](crate::types::Dialog::asynced) and
//! [`Dialog::async_gen`](crate::types::Dialog::async_gen) bodies.
//!
//! Both hold the same three pieces of turn-scoped state — the dialog's own
//! checkpoint node, the outbound message queue, and the client's response if
//! one arrived this turn — and both implement the same replay algorithm
//! (spec §4.4): return the cached value if this step already completed,
//! otherwise run it and record the result. They stay separate types rather
//! than one generic over sync/async because only the async path needs its
//! state to survive crossing an `.await` (so it cannot simply borrow from a
//! parent stack frame the way the sync path safely can), and because only
//! the async path is allowed to drive an `Async`/`AsyncGen` step. The
//! resulting duplication between [`SyncCtx::run`] and [`AsyncCtx::run`] is
//! modest and deliberate — see `DESIGN.md`.

use std::{
    cell::Cell,
    sync::{Arc, Mutex},
};

use crate::{
    error::{DialogError, Suspend},
    queue::MessageQueue,
    state::DialogState,
    types::{Dialog, DialogKind, Payload},
};

fn to_erased<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, DialogError> {
    Ok(serde_json::to_value(value)?)
}

fn from_erased<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, DialogError> {
    Ok(serde_json::from_value(value)?)
}

/// Checks the dialog's declared version against the version recorded at
/// this position on a prior turn. Inequality is the expected, recoverable
/// condition that bubbles to the root and triggers fallback (invariant 5,
/// §4.5).
fn check_identity(state: &DialogState, version: &str) -> Result<(), Suspend> {
    if state.version() != version {
        return Err(Suspend::version_mismatch());
    }
    Ok(())
}

/// The synchronous step dispatcher, passed by reference to every
/// [`Dialog::plain`](crate::types::Dialog::plain) body.
pub struct SyncCtx<C, S> {
    state: Cell<Option<DialogState>>,
    queue: Arc<Mutex<MessageQueue<S>>>,
    client_response: Arc<Option<C>>,
    counter: Cell<usize>,
    allow_dialog_result: bool,
}

impl<C, S> SyncCtx<C, S> {
    pub(crate) fn new(
        state: DialogState,
        queue: Arc<Mutex<MessageQueue<S>>>,
        client_response: Arc<Option<C>>,
        allow_dialog_result: bool,
    ) -> Self {
        SyncCtx {
            state: Cell::new(Some(state)),
            queue,
            client_response,
            counter: Cell::new(0),
            allow_dialog_result,
        }
    }

    pub(crate) fn into_state(self) -> DialogState {
        self.state.into_inner().expect("state taken out and never returned")
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut DialogState) -> R) -> R {
        let mut state = self.state.take().expect("state taken out and never returned");
        let result = f(&mut state);
        self.state.set(Some(state));
        result
    }

    /// Runs `dialog` as the next step of the body currently executing
    /// against this context. Replays a cached result if the corresponding
    /// checkpoint node is already done; otherwise executes it and records
    /// the outcome.
    pub fn run<T>(&self, dialog: Dialog<T, C, S>) -> Result<T, Suspend>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        C: Clone + serde::Serialize + serde::de::DeserializeOwned,
    {
        if matches!(dialog.payload, Payload::DialogResult(_)) {
            return self.run_dialog_result(dialog);
        }

        let index = self.counter.get();
        let mut child = self.with_state(|state| state.take_subdialog_state(index, &dialog.name, &dialog.version));

        if let Err(suspend) = check_identity(&child, &dialog.version) {
            self.with_state(|state| state.restore_subdialog_state(index, child));
            return Err(suspend);
        }

        if child.is_done() {
            let value = child.return_value::<T>()?;
            self.with_state(|state| state.restore_subdialog_state(index, child));
            self.counter.set(index + 1);
            return Ok(value);
        }

        let outcome = self.dispatch(&mut child, dialog);
        match outcome {
            Ok(value) => {
                // A Plain body can never hit `dialog_result` (dispatch always denies
                // it, see `Payload::Sync` below), so `child` is never already done
                // here; kept so this method's shape matches `AsyncCtx::run`, where an
                // `AsyncGen` nested body genuinely can have recorded its own result.
                if !child.is_done() {
                    child.set_return_value(&value)?;
                }
                self.with_state(|state| state.restore_subdialog_state(index, child));
                self.counter.set(index + 1);
                Ok(value)
            }
            Err(suspend) => {
                self.with_state(|state| state.restore_subdialog_state(index, child));
                Err(suspend)
            }
        }
    }

    fn run_dialog_result<T>(&self, dialog: Dialog<T, C, S>) -> Result<T, Suspend>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        if !self.allow_dialog_result {
            return Err(DialogError::DialogResultOutsideAsyncGen {
                name: self.with_state(|state| state.name().to_owned()),
                kind: DialogKind::Plain.label(),
            }
            .into());
        }
        let value = match dialog.payload {
            Payload::DialogResult(value) => value,
            _ => unreachable!("checked by caller"),
        };
        self.with_state(|state| state.set_return_value(&value))?;
        Ok(value)
    }

    fn dispatch<T>(&self, child: &mut DialogState, dialog: Dialog<T, C, S>) -> Result<T, Suspend>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        C: Clone + serde::Serialize + serde::de::DeserializeOwned,
    {
        match dialog.payload {
            Payload::SendMessage(message) => {
                self.queue.lock().expect("message queue mutex poisoned").enqueue(message);
                Ok(from_erased(to_erased(&())?)?)
            }
            Payload::GetClientResponse => {
                if !child.sent_to_client() {
                    child.set_sent_to_client();
                    return Err(Suspend::send_to_client());
                }
                let response = (*self.client_response)
                    .clone()
                    .expect("get_client_response resumed without a client response available");
                Ok(from_erased(to_erased(&response)?)?)
            }
            Payload::Sync(body) => {
                let taken = std::mem::replace(child, DialogState::new_empty(&dialog.name, &dialog.version));
                // A Plain body is never `async_gen`, so `dialog_result` is never legal
                // directly inside it regardless of the enclosing context's own flavor.
                let nested = SyncCtx::new(taken, Arc::clone(&self.queue), Arc::clone(&self.client_response), false);
                let result = body(&nested);
                *child = nested.into_state();
                result
            }
            Payload::Async(_) => Err(DialogError::UnsupportedKind {
                name: dialog.name,
                version: dialog.version,
                kind: dialog.kind.label(),
            }
            .into()),
            Payload::DialogResult(_) => unreachable!("handled in run"),
        }
    }
}

/// The asynchronous step dispatcher, moved by value into every
/// [`Dialog::asynced`](crate::types::Dialog::asynced) /
/// [`Dialog::async_gen`](crate::types::Dialog::async_gen) body.
///
/// Owned rather than borrowed: a nested dialog's state has to survive
/// across an `.await`, which rules out the borrow-based design [`SyncCtx`]
/// uses. A child's [`DialogState`] is moved out of the parent with
/// [`DialogState::take_subdialog_state`] before recursing and moved back
/// with [`DialogState::restore_subdialog_state`] once the recursive call
/// resolves.
pub struct AsyncCtx<C, S> {
    state: Arc<Mutex<DialogState>>,
    queue: Arc<Mutex<MessageQueue<S>>>,
    client_response: Arc<Option<C>>,
    counter: Cell<usize>,
    allow_dialog_result: bool,
}

impl<C, S> AsyncCtx<C, S>
where
    C: Send + Sync + 'static,
    S: Send + 'static,
{
    pub(crate) fn new(
        state: DialogState,
        queue: Arc<Mutex<MessageQueue<S>>>,
        client_response: Arc<Option<C>>,
        allow_dialog_result: bool,
    ) -> Self {
        AsyncCtx {
            state: Arc::new(Mutex::new(state)),
            queue,
            client_response,
            counter: Cell::new(0),
            allow_dialog_result,
        }
    }

    /// Consumes a freshly-recursed-into context and recovers its final
    /// state. Valid only once every other handle to `state` (held by the
    /// body future that owned this context) has already been dropped,
    /// which holds the moment `body(nested).await` finishes: the future
    /// that owned `nested` is a temporary, dropped at the end of the
    /// statement that awaited it, before this method runs.
    pub(crate) fn into_state(self) -> DialogState {
        Arc::try_unwrap(self.state)
            .unwrap_or_else(|_| panic!("async dialog body retained its context past completion"))
            .into_inner()
            .expect("dialog state mutex poisoned")
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut DialogState) -> R) -> R {
        let mut state = self.state.lock().expect("dialog state mutex poisoned");
        f(&mut state)
    }

    /// Runs `dialog` as the next step of the body currently executing
    /// against this context. Unlike [`SyncCtx::run`], this can also drive
    /// `Async`/`AsyncGen` steps.
    pub async fn run<T>(&self, dialog: Dialog<T, C, S>) -> Result<T, Suspend>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Send + 'static,
        C: Clone + serde::Serialize + serde::de::DeserializeOwned,
    {
        if matches!(dialog.payload, Payload::DialogResult(_)) {
            return self.run_dialog_result(dialog);
        }

        let index = self.counter.get();
        let mut child = self.with_state(|state| state.take_subdialog_state(index, &dialog.name, &dialog.version));

        if let Err(suspend) = check_identity(&child, &dialog.version) {
            self.with_state(|state| state.restore_subdialog_state(index, child));
            return Err(suspend);
        }

        if child.is_done() {
            let value = child.return_value::<T>()?;
            self.with_state(|state| state.restore_subdialog_state(index, child));
            self.counter.set(index + 1);
            return Ok(value);
        }

        let outcome = self.dispatch(child, dialog).await;
        match outcome {
            Ok((mut child, value)) => {
                // An AsyncGen body may have already recorded its own return
                // value via a nested `dialog_result` step; don't set it twice.
                if !child.is_done() {
                    child.set_return_value(&value)?;
                }
                self.with_state(|state| state.restore_subdialog_state(index, child));
                self.counter.set(index + 1);
                Ok(value)
            }
            Err((child, suspend)) => {
                self.with_state(|state| state.restore_subdialog_state(index, child));
                Err(suspend)
            }
        }
    }

    fn run_dialog_result<T>(&self, dialog: Dialog<T, C, S>) -> Result<T, Suspend>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        if !self.allow_dialog_result {
            return Err(DialogError::DialogResultOutsideAsyncGen {
                name: self.with_state(|state| state.name().to_owned()),
                kind: DialogKind::Async.label(),
            }
            .into());
        }
        let value = match dialog.payload {
            Payload::DialogResult(value) => value,
            _ => unreachable!("checked by caller"),
        };
        self.with_state(|state| state.set_return_value(&value))?;
        Ok(value)
    }

    /// Dispatches one not-yet-done step. Takes `child` by value and hands
    /// it back alongside the outcome (rather than through `&mut`) because
    /// the `Async` arm below has to carry it across the nested body's
    /// `.await`.
    #[allow(clippy::type_complexity)]
    async fn dispatch<T>(
        &self,
        mut child: DialogState,
        dialog: Dialog<T, C, S>,
    ) -> Result<(DialogState, T), (DialogState, Suspend)>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Send + 'static,
        C: Clone + serde::Serialize + serde::de::DeserializeOwned,
    {
        match dialog.payload {
            Payload::SendMessage(message) => {
                self.queue.lock().expect("message queue mutex poisoned").enqueue(message);
                match to_erased(&()).and_then(from_erased) {
                    Ok(value) => Ok((child, value)),
                    Err(err) => Err((child, err.into())),
                }
            }
            Payload::GetClientResponse => {
                if !child.sent_to_client() {
                    child.set_sent_to_client();
                    return Err((child, Suspend::send_to_client()));
                }
                let response = (*self.client_response)
                    .clone()
                    .expect("get_client_response resumed without a client response available");
                match to_erased(&response).and_then(from_erased) {
                    Ok(value) => Ok((child, value)),
                    Err(err) => Err((child, err.into())),
                }
            }
            Payload::Sync(body) => {
                let taken = std::mem::replace(&mut child, DialogState::new_empty(&dialog.name, &dialog.version));
                // A Plain body is never `async_gen`, so `dialog_result` is never legal
                // directly inside it regardless of the enclosing context's own flavor.
                let nested = SyncCtx::new(taken, Arc::clone(&self.queue), Arc::clone(&self.client_response), false);
                let result = body(&nested);
                child = nested.into_state();
                match result {
                    Ok(value) => Ok((child, value)),
                    Err(suspend) => Err((child, suspend)),
                }
            }
            Payload::Async(body) => {
                let taken = std::mem::replace(&mut child, DialogState::new_empty(&dialog.name, &dialog.version));
                let nested = AsyncCtx::new(
                    taken,
                    Arc::clone(&self.queue),
                    Arc::clone(&self.client_response),
                    matches!(dialog.kind, DialogKind::AsyncGen),
                );
                let recovered_state = Arc::clone(&nested.state);
                let result = body(nested).await;
                child = Arc::try_unwrap(recovered_state)
                    .unwrap_or_else(|_| panic!("async dialog body retained its context past completion"))
                    .into_inner()
                    .expect("dialog state mutex poisoned");
                match result {
                    Ok(value) => Ok((child, value)),
                    Err(suspend) => Err((child, suspend)),
                }
            }
            Payload::DialogResult(_) => unreachable!("handled in run"),
        }
    }
}
