//! Events pushed from the engine to observers

use serde::{Deserialize, Serialize};

use crate::{services::Quote, state::TimerState};

/// State transitions the engine announces with the full new record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Paused,
    Resumed,
    Reset,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    TimerStarted { timer_state: TimerState },
    #[serde(rename_all = "camelCase")]
    TimerPaused { timer_state: TimerState },
    #[serde(rename_all = "camelCase")]
    TimerResumed { timer_state: TimerState },
    #[serde(rename_all = "camelCase")]
    TimerReset { timer_state: TimerState },
    /// State changed, re-pull
    #[serde(rename_all = "camelCase")]
    TimerUpdated { timer_state: TimerState },
    /// Session finished. `is_recipient_foreground` differs per recipient.
    #[serde(rename_all = "camelCase")]
    TimerCompleted {
        quote: Option<Quote>,
        sound_ref: Option<String>,
        is_recipient_foreground: bool,
    },
    RemoveOverlay {},
}

impl Event {
    pub fn transition(transition: Transition, timer_state: TimerState) -> Self {
        match transition {
            Transition::Started => Event::TimerStarted { timer_state },
            Transition::Paused => Event::TimerPaused { timer_state },
            Transition::Resumed => Event::TimerResumed { timer_state },
            Transition::Reset => Event::TimerReset { timer_state },
            Transition::Updated => Event::TimerUpdated { timer_state },
        }
    }

    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Event::TimerStarted { .. } => "timerStarted",
            Event::TimerPaused { .. } => "timerPaused",
            Event::TimerResumed { .. } => "timerResumed",
            Event::TimerReset { .. } => "timerReset",
            Event::TimerUpdated { .. } => "timerUpdated",
            Event::TimerCompleted { .. } => "timerCompleted",
            Event::RemoveOverlay {} => "removeOverlay",
        }
    }

    /// The full timer record carried by state events
    pub fn timer_state(&self) -> Option<&TimerState> {
        match self {
            Event::TimerStarted { timer_state }
            | Event::TimerPaused { timer_state }
            | Event::TimerResumed { timer_state }
            | Event::TimerReset { timer_state }
            | Event::TimerUpdated { timer_state } => Some(timer_state),
            Event::TimerCompleted { .. } | Event::RemoveOverlay {} => None,
        }
    }
}
