//! At-most-once delivery of a call's outcome.

use tracing::trace;

use crate::error::Error;
use crate::http::RequestResult;

/// The outcome handed to a completion callback.
pub type Outcome = Result<RequestResult, Error>;

/// Single-use latch around a completion callback.
///
/// The callback is taken out on the first `fire`; every later outcome is
/// dropped.
pub struct Completion<F> {
    callback: Option<F>,
}

impl<F> Completion<F>
where
    F: FnOnce(Outcome),
{
    pub fn new(callback: F) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    /// Deliver `outcome` if nothing was delivered yet. Returns whether it was.
    pub fn fire(&mut self, outcome: Outcome) -> bool {
        match self.callback.take() {
            Some(callback) => {
                callback(outcome);
                true
            }
            None => {
                trace!(ok = outcome.is_ok(), "completion already fired, dropping outcome");
                false
            }
        }
    }

    pub fn is_fired(&self) -> bool {
        self.callback.is_none()
    }
}
