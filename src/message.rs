//! Events into the state machine and effects out of it.

use crossterm::event::KeyEvent;

use crate::commands::{RequestId, TaskCompletion, TaskRequest};
use crate::stream::{SessionId, StreamUpdate};

/// Everything the state machine reacts to, one at a time.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize(u16, u16),
    Tick,
    Task(TaskCompletion),
    Stream(StreamUpdate),
    Quit,
}

/// Side effects requested by a state transition, executed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Spawn(TaskRequest),
    Abort(RequestId),
    StartStream { session: SessionId, function: String },
    StopStream(SessionId),
    Quit,
}
