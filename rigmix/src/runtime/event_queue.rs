use crate::{AnimationState, Event, TrackEntryHandle};
use std::collections::VecDeque;

/// A lifecycle or user notification delivered to listeners after a state mutation completes.
#[derive(Clone, Debug, PartialEq)]
pub enum AnimationStateEvent {
    /// The entry became the current entry of its track.
    Start,
    /// Another entry was set while this one was current.
    Interrupt,
    /// The entry is no longer current or mixing out. Always followed by [`Self::Dispose`].
    End,
    /// The entry will not be used again. Its handle is stale once listeners return.
    Dispose,
    /// The entry finished a loop iteration, or reached its end when not looping.
    Complete,
    Event(Event),
}

/// Receives queued notifications while the state drains its queue.
///
/// Listeners get mutable access to the state and may set, add or clear animations. Notifications
/// queued by such calls are delivered later in the same drain.
pub trait AnimationStateListener {
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: TrackEntryHandle,
        event: &AnimationStateEvent,
    );
}

impl<F> AnimationStateListener for F
where
    F: FnMut(&mut AnimationState, TrackEntryHandle, &AnimationStateEvent),
{
    fn on_event(
        &mut self,
        state: &mut AnimationState,
        entry: TrackEntryHandle,
        event: &AnimationStateEvent,
    ) {
        self(state, entry, event)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct QueuedEvent {
    pub(crate) entry: TrackEntryHandle,
    pub(crate) event: AnimationStateEvent,
}

#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    events: VecDeque<QueuedEvent>,
    animations_changed: bool,
    pub(crate) drain_disabled: bool,
    pub(crate) draining: bool,
}

impl EventQueue {
    fn push(&mut self, entry: TrackEntryHandle, event: AnimationStateEvent) {
        self.events.push_back(QueuedEvent { entry, event });
    }

    pub(crate) fn start(&mut self, entry: TrackEntryHandle) {
        self.push(entry, AnimationStateEvent::Start);
        self.animations_changed = true;
    }

    pub(crate) fn interrupt(&mut self, entry: TrackEntryHandle) {
        self.push(entry, AnimationStateEvent::Interrupt);
    }

    /// Queues `End` and the entry's `Dispose` right behind it.
    pub(crate) fn end(&mut self, entry: TrackEntryHandle) {
        self.push(entry, AnimationStateEvent::End);
        self.push(entry, AnimationStateEvent::Dispose);
        self.animations_changed = true;
    }

    pub(crate) fn dispose(&mut self, entry: TrackEntryHandle) {
        self.push(entry, AnimationStateEvent::Dispose);
    }

    pub(crate) fn complete(&mut self, entry: TrackEntryHandle) {
        self.push(entry, AnimationStateEvent::Complete);
    }

    pub(crate) fn event(&mut self, entry: TrackEntryHandle, event: Event) {
        self.push(entry, AnimationStateEvent::Event(event));
    }

    pub(crate) fn pop_front(&mut self) -> Option<QueuedEvent> {
        self.events.pop_front()
    }

    /// Returns whether an entry started or ended since the last call, and resets the flag.
    pub(crate) fn take_animations_changed(&mut self) -> bool {
        std::mem::take(&mut self.animations_changed)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
