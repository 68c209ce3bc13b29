//! Playback flags and the transitions that change them.
//!
//! Flags are semi-independent, so the machine is a set of named transitions
//! over an immutable `PlaybackState` snapshot rather than an enumerated state.
//! `set_playing`/`set_paused`/`set_ended` write a full canonical snapshot;
//! `waiting`, `seeking`, `buffering` and `pausing` are set on their own.
//!
//! Every transition builds the next snapshot and compares it structurally with
//! the current one. `PlaybackStateEvent` fires only when they differ: many call
//! sites set a flag redundantly inside sync loops and event pumps.

use log::trace;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use super::event_bus::EventEmitter;
use super::player_events::PlaybackStateEvent;

/// Snapshot of playback flags. `playing` and `paused` are never both set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub playing: bool,
    pub paused: bool,
    pub pausing: bool,
    pub waiting: bool,
    pub seeking: bool,
    pub buffering: bool,
    pub ended: bool,
}

impl Default for PlaybackState {
    /// Freshly loaded media: paused at start
    fn default() -> Self {
        Self {
            playing: false,
            paused: true,
            pausing: false,
            waiting: false,
            seeking: false,
            buffering: false,
            ended: false,
        }
    }
}

impl PlaybackState {
    fn playing() -> Self {
        Self {
            playing: true,
            paused: false,
            ..Self::default()
        }
    }

    fn paused() -> Self {
        Self::default()
    }

    fn ended() -> Self {
        Self {
            ended: true,
            ..Self::default()
        }
    }
}

/// Owner of the current `PlaybackState`.
///
/// Methods take `&self`; the snapshot sits behind a mutex that is released
/// before the change notification is emitted.
#[derive(Debug)]
pub struct PlaybackStateMachine {
    state: Mutex<PlaybackState>,
    emitter: EventEmitter,
}

impl PlaybackStateMachine {
    pub fn new(emitter: EventEmitter) -> Self {
        Self {
            state: Mutex::new(PlaybackState::default()),
            emitter,
        }
    }

    /// Current snapshot
    pub fn state(&self) -> PlaybackState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_playing(&self) -> bool {
        self.state().playing
    }

    /// Apply `change` to a copy of the current snapshot, store and emit it if
    /// it differs. Returns whether anything changed.
    fn transition(&self, name: &str, change: impl FnOnce(&mut PlaybackState)) -> bool {
        let changed = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let mut next = *state;
            change(&mut next);
            if next == *state {
                None
            } else {
                *state = next;
                Some(next)
            }
        };

        match changed {
            Some(next) => {
                trace!("PlaybackState {}: {:?}", name, next);
                self.emitter.emit(PlaybackStateEvent(next));
                true
            }
            None => false,
        }
    }

    pub fn set_playing(&self) -> bool {
        self.transition("playing", |s| *s = PlaybackState::playing())
    }

    pub fn set_paused(&self) -> bool {
        self.transition("paused", |s| *s = PlaybackState::paused())
    }

    pub fn set_ended(&self) -> bool {
        self.transition("ended", |s| *s = PlaybackState::ended())
    }

    /// Match `playing`/`paused` to the runtime and drop `pausing`, keeping
    /// the other flags. Used when a pause request is superseded after the
    /// runtime has already stopped.
    pub fn reconcile_paused(&self, paused: bool) -> bool {
        self.transition("reconcile", |s| {
            s.playing = !paused;
            s.paused = paused;
            s.pausing = false;
        })
    }

    /// Pause requested, waiting for the frame to settle
    pub fn set_pausing(&self) -> bool {
        self.transition("pausing", |s| s.pausing = true)
    }

    pub fn set_waiting(&self, waiting: bool) -> bool {
        self.transition("waiting", |s| s.waiting = waiting)
    }

    /// Entering `seeking` clears `ended` and `pausing`
    pub fn set_seeking(&self, seeking: bool) -> bool {
        self.transition("seeking", |s| {
            s.seeking = seeking;
            if seeking {
                s.ended = false;
                s.pausing = false;
            }
        })
    }

    pub fn set_buffering(&self, buffering: bool) -> bool {
        self.transition("buffering", |s| s.buffering = buffering)
    }

    /// Back to the initial snapshot (new video attached)
    pub fn reset(&self) -> bool {
        self.transition("reset", |s| *s = PlaybackState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::EventBus;

    fn machine() -> (EventBus, PlaybackStateMachine) {
        let bus = EventBus::new();
        let machine = PlaybackStateMachine::new(bus.emitter());
        (bus, machine)
    }

    #[test]
    fn test_set_playing_is_idempotent() {
        let (bus, sm) = machine();
        assert!(sm.set_playing());
        assert!(!sm.set_playing());
        assert_eq!(bus.take::<PlaybackStateEvent>().len(), 1);
    }

    #[test]
    fn test_playing_and_paused_exclusive() {
        let (_bus, sm) = machine();
        sm.set_playing();
        let s = sm.state();
        assert!(s.playing && !s.paused);
        sm.set_paused();
        let s = sm.state();
        assert!(!s.playing && s.paused);
        sm.set_ended();
        let s = sm.state();
        assert!(!s.playing && s.paused && s.ended);
    }

    #[test]
    fn test_seeking_clears_ended_and_pausing() {
        let (_bus, sm) = machine();
        sm.set_ended();
        sm.set_pausing();
        assert!(sm.state().pausing);
        sm.set_seeking(true);
        let s = sm.state();
        assert!(s.seeking);
        assert!(!s.ended);
        assert!(!s.pausing);
    }

    #[test]
    fn test_canonical_snapshots_clear_flags() {
        let (_bus, sm) = machine();
        sm.set_waiting(true);
        sm.set_buffering(true);
        sm.set_seeking(true);
        sm.set_playing();
        assert_eq!(sm.state(), PlaybackState::playing());
    }

    #[test]
    fn test_reconcile_paused_keeps_independent_flags() {
        let (bus, sm) = machine();
        sm.set_playing();
        sm.set_seeking(true);
        sm.set_pausing();
        sm.set_waiting(true);
        bus.take::<PlaybackStateEvent>();

        assert!(sm.reconcile_paused(true));
        let s = sm.state();
        assert!(s.paused && !s.playing && !s.pausing);
        assert!(s.seeking && s.waiting);
        assert!(!sm.reconcile_paused(true));
        assert_eq!(bus.take::<PlaybackStateEvent>().len(), 1);
    }

    #[test]
    fn test_redundant_flags_emit_nothing() {
        let (bus, sm) = machine();
        // Initial state is paused
        assert!(!sm.set_paused());
        assert!(!sm.set_waiting(false));
        assert!(sm.set_waiting(true));
        assert!(!sm.set_waiting(true));
        let events = bus.take::<PlaybackStateEvent>();
        assert_eq!(events.len(), 1);
        assert!(events[0].0.waiting);
    }
}
