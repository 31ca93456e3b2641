//! A replay-based, resumable, versioned dialog execution engine
#![warn(missing_docs)]

mod context;
mod engine;
mod error;
mod persistence;
mod queue;
mod state;
mod types;

pub use self::{
    context::{AsyncCtx, SyncCtx},
    engine::{run_turn, run_turn_async, TurnOutcome},
    error::{DialogError, StateError, Suspend},
    persistence::Persistence,
    state::DialogState,
    types::{dialog_result, get_client_response, send_message, Dialog},
};

/// In-memory reference [`Persistence`] implementation
#[cfg(feature = "in-memory")]
pub use self::persistence::InMemoryPersistence;
