//! Intent → quiz session bridge. Both intent producers land here: the
//! gesture pipeline and the manual IPC path. The session's own
//! bounds/precondition checks decide; this layer only translates results
//! into status strings.

use std::sync::{Arc, Mutex};

use crate::debounce::Intent;
use crate::error::QuizError;
use crate::quiz::QuizSession;

pub type SharedSession = Arc<Mutex<Option<QuizSession>>>;

/// The Advance guard flag, read at the moment of detection.
pub fn answer_selected(session: &SharedSession) -> bool {
    session
        .lock()
        .unwrap()
        .as_ref()
        .map(|s| s.has_selected_answer())
        .unwrap_or(false)
}

/// Apply one intent to the session. Errors are the caller's to surface
/// (the IPC path reports them, the gesture path drops them with a debug log).
pub fn apply_intent(intent: Intent, session: &SharedSession, now_ms: u64) -> Result<String, QuizError> {
    let mut guard = session.lock().unwrap();
    let s = guard.as_mut().ok_or(QuizError::NoSession)?;
    match intent {
        Intent::SelectOption(index) => {
            s.select_answer(index)?;
            Ok(format!("selected option {}", index + 1))
        }
        Intent::Advance => {
            s.advance(now_ms)?;
            if s.is_completed() {
                Ok("quiz completed".to_string())
            } else {
                let (i, n) = s.progress();
                Ok(format!("moving to question {} of {}", i + 1, n))
            }
        }
    }
}
