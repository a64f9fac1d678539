//! Display state derived by every observer from the persisted deadline

use crate::{
    protocol::{Command, Event},
    services::Quote,
    state::TimerState,
    utils::format_mmss,
};

/// Text shown when no timer is provisioned
pub const IDLE_PLACEHOLDER: &str = "No timer running";

/// The single action button an observer offers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonLabel {
    Start,
    Pause,
    Resume,
    Restart,
}

impl ButtonLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonLabel::Start => "Start",
            ButtonLabel::Pause => "Pause",
            ButtonLabel::Resume => "Resume",
            ButtonLabel::Restart => "Restart",
        }
    }

    /// Label a timer in `state` calls for
    fn for_state(state: &TimerState) -> Self {
        match (state.is_active, state.is_paused) {
            (false, _) => ButtonLabel::Start,
            (true, false) => ButtonLabel::Pause,
            (true, true) => ButtonLabel::Resume,
        }
    }
}

/// What an observer renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub display_text: String,
    pub button_label: ButtonLabel,
    /// Seconds shown, `None` while idle
    pub seconds: Option<u64>,
}

/// A completion waiting to be acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub quote: Option<Quote>,
    pub sound_ref: Option<String>,
    /// Only the foreground context plays the sound
    pub play_sound: bool,
}

/// Side effects an event asks the observer to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverAction {
    None,
    /// Show the completion and play `sound_ref` if set
    Notify(Completion),
    /// Tear down this observer's widget
    Remove,
}

/// Local reconciliation of one observer.
///
/// Never declares completion by itself: at zero it holds and waits for the
/// engine's `timerCompleted`.
#[derive(Debug, Clone)]
pub struct ObserverReconciler {
    state: TimerState,
    completion: Option<Completion>,
    optimistic: Option<ButtonLabel>,
}

impl ObserverReconciler {
    /// Start from whatever the store held when the observer was created
    pub fn new(initial: Option<TimerState>) -> Self {
        Self {
            state: initial.unwrap_or_default(),
            completion: None,
            optimistic: None,
        }
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    /// Adopt an authoritative record from a push or a store notification
    pub fn apply_state(&mut self, state: TimerState) {
        if state.is_active {
            self.completion = None;
        }
        self.optimistic = None;
        self.state = state;
    }

    pub fn apply_event(&mut self, event: Event) -> ObserverAction {
        match event {
            Event::TimerStarted { timer_state }
            | Event::TimerPaused { timer_state }
            | Event::TimerResumed { timer_state }
            | Event::TimerReset { timer_state }
            | Event::TimerUpdated { timer_state } => {
                self.apply_state(timer_state);
                ObserverAction::None
            }
            Event::TimerCompleted { quote, sound_ref, is_recipient_foreground } => {
                let completion = Completion {
                    play_sound: is_recipient_foreground && sound_ref.is_some(),
                    quote,
                    sound_ref,
                };
                self.state = TimerState::default();
                self.optimistic = None;
                self.completion = Some(completion.clone());
                ObserverAction::Notify(completion)
            }
            Event::RemoveOverlay {} => ObserverAction::Remove,
        }
    }

    /// Dismiss a pending completion
    pub fn acknowledge(&mut self) {
        self.completion = None;
    }

    /// Seconds to show at `now_ms`
    pub fn displayed_seconds(&self, now_ms: i64) -> Option<u64> {
        let state = &self.state;
        if !state.is_active {
            return None;
        }
        if state.is_paused {
            return Some(state.time_left);
        }
        // Running: only the deadline counts, `time_left` may be stale
        state
            .end_time
            .map(|end| (end.saturating_sub(now_ms) / 1000).max(0) as u64)
    }

    pub fn button_label(&self) -> ButtonLabel {
        if self.completion.is_some() {
            return ButtonLabel::Restart;
        }
        self.optimistic
            .unwrap_or_else(|| ButtonLabel::for_state(&self.state))
    }

    pub fn projection(&self, now_ms: i64) -> Projection {
        let seconds = self.displayed_seconds(now_ms);
        Projection {
            display_text: seconds.map_or_else(|| IDLE_PLACEHOLDER.to_string(), format_mmss),
            button_label: self.button_label(),
            seconds,
        }
    }

    /// Button press: returns the command to send and flips the label ahead
    /// of the engine's answer
    pub fn click(&mut self) -> Command {
        let (command, next) = match self.button_label() {
            ButtonLabel::Start => (
                Command::StartTimer { interval: None, mode: None },
                ButtonLabel::Pause,
            ),
            ButtonLabel::Pause => (Command::PauseTimer {}, ButtonLabel::Resume),
            ButtonLabel::Resume => (Command::ResumeTimer {}, ButtonLabel::Pause),
            ButtonLabel::Restart => {
                self.completion = None;
                (Command::GlobalRestart {}, ButtonLabel::Pause)
            }
        };
        self.optimistic = Some(next);
        command
    }
}
