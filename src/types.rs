//! The closed set of dialog values an author can issue, and the factory
//! facility that turns a callable into one.
//!
//! The original taxonomy classifies a callable at runtime by introspecting
//! it (`inspect.isgeneratorfunction`, `asyncio.iscoroutinefunction`, ...).
//! Rust has no equivalent of that introspection, so classification here is
//! static: an author names the flavor by picking one of two constructors,
//! [`Dialog::plain`] or [`Dialog::asynced`] (plus [`Dialog::async_gen`] for
//! the one case — signalling completion from inside an async body — that
//! needs a dedicated marker). See `DESIGN.md` for the full rationale.

use std::future::Future;

use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};

use crate::{context::AsyncCtx, context::SyncCtx, error::Suspend};

/// The closed sum type every dialog value belongs to.
///
/// The original taxonomy also has a `gen` kind (a generator-style body that
/// yields a sequence of steps without `async`); this port's `Dialog::plain`
/// constructor already stands in for that idiom (`ctx.run(step)?` is the
/// desugaring of "yield step, receive value, continue") and never tags a
/// value it produces as anything but `Plain`, so `gen` has no distinct
/// runtime representation here and is not a separate variant. The remaining
/// six stay distinct tags so the dispatcher's `match` stays exhaustive and
/// diagnostics can name the right flavor via [`DialogKind::label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DialogKind {
    SendMessage,
    GetClientResponse,
    Plain,
    Async,
    AsyncGen,
    DialogResult,
}

impl DialogKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            DialogKind::SendMessage => "send_message",
            DialogKind::GetClientResponse => "get_client_response",
            DialogKind::Plain => "plain",
            DialogKind::Async => "async",
            DialogKind::AsyncGen => "async_gen",
            DialogKind::DialogResult => "dialog_result",
        }
    }
}

type SyncBody<T, C, S> = Box<dyn FnOnce(&SyncCtx<C, S>) -> Result<T, Suspend> + Send>;
type AsyncBody<T, C, S> = Box<dyn FnOnce(AsyncCtx<C, S>) -> BoxFuture<'static, Result<T, Suspend>> + Send>;

pub(crate) enum Payload<T, C, S> {
    SendMessage(S),
    GetClientResponse,
    Sync(SyncBody<T, C, S>),
    /// Backs both `Async` and `AsyncGen` kinds.
    Async(AsyncBody<T, C, S>),
    DialogResult(T),
}

/// A dialog value: the thing an author's declared function produces when
/// called, and the unit of work the engine checkpoints (spec §3).
///
/// Two fields, `name` and `version`, participate in identity checks
/// against persisted state; everything else is opaque payload.
pub struct Dialog<T, C, S> {
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) kind: DialogKind,
    pub(crate) payload: Payload<T, C, S>,
}

impl<T, C, S> Dialog<T, C, S> {
    /// Declares a synchronous dialog body.
    ///
    /// `body` receives a [`SyncCtx`] through which it issues steps with
    /// [`SyncCtx::run`]; it runs to completion (or a `SendToClient`/
    /// `VersionMismatch` suspension, via `?`) without ever yielding control
    /// back to the engine except through a nested `run` call. This is the
    /// idiom the original calls a plain dialog; since Rust has no stable
    /// generator syntax, it also stands in for the "yield-a-sequence-of-steps"
    /// generator idiom — `ctx.run(step)?` is a faithful desugaring of
    /// "yield step, receive its value, continue".
    pub fn plain<F>(name: impl Into<String>, version: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(&SyncCtx<C, S>) -> Result<T, Suspend> + Send + 'static,
    {
        Dialog {
            name: name.into(),
            version: version.into(),
            kind: DialogKind::Plain,
            payload: Payload::Sync(Box::new(body)),
        }
    }

    /// Declares a dialog body that awaits external asynchronous work.
    ///
    /// `body` receives an owned [`AsyncCtx`] and issues steps with
    /// `ctx.run(step).await?`.
    pub fn asynced<F, Fut>(name: impl Into<String>, version: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(AsyncCtx<C, S>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Suspend>> + Send + 'static,
    {
        Dialog {
            name: name.into(),
            version: version.into(),
            kind: DialogKind::Async,
            payload: Payload::Async(Box::new(move |ctx| Box::pin(body(ctx)))),
        }
    }

    /// Declares an async dialog body that signals completion from a nested
    /// position via [`dialog_result`] rather than an async `return`
    /// (async generators, in the original, cannot carry a return value).
    ///
    /// Behaves exactly like [`Dialog::asynced`] except that a
    /// [`dialog_result`] step is legal directly inside `body`; issuing one
    /// from any other dialog flavor is a programmer error
    /// ([`DialogError::DialogResultOutsideAsyncGen`](crate::error::DialogError::DialogResultOutsideAsyncGen)).
    pub fn async_gen<F, Fut>(name: impl Into<String>, version: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(AsyncCtx<C, S>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Suspend>> + Send + 'static,
    {
        Dialog {
            name: name.into(),
            version: version.into(),
            kind: DialogKind::AsyncGen,
            payload: Payload::Async(Box::new(move |ctx| Box::pin(body(ctx)))),
        }
    }
}

/// The `send_message` primitive: enqueues `message` and resolves to `()`.
///
/// Carries the fixed name `"send_message"` and fixed version `"1.0"`.
/// Takes `impl Into<S>` rather than a bare `S` so a string-literal message
/// (`&'static str`) can be passed directly even when `S = String`.
pub fn send_message<C, S>(message: impl Into<S>) -> Dialog<(), C, S> {
    Dialog {
        name: "send_message".to_owned(),
        version: "1.0".to_owned(),
        kind: DialogKind::SendMessage,
        payload: Payload::SendMessage(message.into()),
    }
}

/// The `get_client_response` primitive: cuts the turn the first time it is
/// reached, and resolves to the client's response on the following turn.
///
/// Carries the fixed name `"get_client_response"` and fixed version `"1.0"`.
pub fn get_client_response<C, S>() -> Dialog<C, C, S> {
    Dialog {
        name: "get_client_response".to_owned(),
        version: "1.0".to_owned(),
        kind: DialogKind::GetClientResponse,
        payload: Payload::GetClientResponse,
    }
}

/// Signals that the enclosing `async_gen` dialog's return value is `value`.
///
/// Legal only as a step issued directly from an [`Dialog::async_gen`] body;
/// any other context raises
/// [`DialogError::DialogResultOutsideAsyncGen`](crate::error::DialogError::DialogResultOutsideAsyncGen).
pub fn dialog_result<T, C, S>(value: T) -> Dialog<T, C, S> {
    Dialog {
        name: "dialog_result".to_owned(),
        version: "1.0".to_owned(),
        kind: DialogKind::DialogResult,
        payload: Payload::DialogResult(value),
    }
}

// Bounds shared by both Serialize/DeserializeOwned-erasing engine paths.
pub(crate) trait Erasable: Serialize + DeserializeOwned + Send + 'static {}
impl<T> Erasable for T where T: Serialize + DeserializeOwned + Send + 'static {}
