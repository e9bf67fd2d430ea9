//! Gesture debouncing: turns the high-frequency stream of per-frame gesture
//! values into one-shot intents.
//!
//! The upstream loop republishes the same gesture dozens of times per second
//! while the user holds a pose. A single-slot memory of the last acted-upon
//! gesture suppresses repeats until either a distinct gesture arrives or the
//! suppression window expires, whichever comes first.

use crate::gestures::GestureLabel;

/// A discrete, one-shot user action derived from sustained gesture detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    SelectOption(usize),
    Advance,
}

/// Suppression slot: the most recently acted-upon gesture and when the
/// suppression on it runs out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceState {
    label: Option<GestureLabel>,
    expires_at_ms: u64,
}

/// One debouncer transition. Pure: timers are expressed through `now_ms`, so
/// the whole behavior is unit-testable without sleeping.
///
/// Unknown never emits and never touches the slot, so a held gesture that
/// flickers through Unknown for a frame stays suppressed until the window
/// expires. The thumb-up gesture is additionally gated on `answer_selected`;
/// when the gate fails the detection is absorbed (slot set, nothing emitted).
pub fn step(
    state: DebounceState,
    gesture: GestureLabel,
    now_ms: u64,
    cooldown_ms: u64,
    answer_selected: bool,
) -> (DebounceState, Option<Intent>) {
    let mut state = state;
    if state.label.is_some() && now_ms >= state.expires_at_ms {
        state.label = None;
    }

    if gesture == GestureLabel::Unknown || Some(gesture) == state.label {
        return (state, None);
    }

    let state = DebounceState {
        label: Some(gesture),
        expires_at_ms: now_ms + cooldown_ms,
    };

    let intent = match gesture {
        GestureLabel::ThumbUp => answer_selected.then_some(Intent::Advance),
        other => other.option_index().map(Intent::SelectOption),
    };
    (state, intent)
}

/// Stateful wrapper around [`step`] holding the slot and cooldown.
#[derive(Debug)]
pub struct IntentEmitter {
    cooldown_ms: u64,
    state: DebounceState,
}

impl IntentEmitter {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms,
            state: DebounceState::default(),
        }
    }

    pub fn offer(
        &mut self,
        gesture: GestureLabel,
        now_ms: u64,
        answer_selected: bool,
    ) -> Option<Intent> {
        let (next, intent) = step(self.state, gesture, now_ms, self.cooldown_ms, answer_selected);
        self.state = next;
        intent
    }

    /// Drop any pending suppression, e.g. when a new quiz session begins.
    pub fn reset(&mut self) {
        self.state = DebounceState::default();
    }
}
