use crate::runtime::animation::apply_rotate_mixed;
use crate::runtime::event_queue::{EventQueue, QueuedEvent};
use crate::{
    Animation, AnimationStateEvent, AnimationStateListener, Error, Event, Skeleton, SkeletonData,
    Timeline,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Mix durations between animations, plus the empty animation used to mix back to the setup
/// pose.
#[derive(Clone, Debug)]
pub struct AnimationStateData {
    pub skeleton_data: Arc<SkeletonData>,
    /// Mix duration used when no duration was set for a pair of animations.
    pub default_mix: f32,
    mixes: HashMap<(String, String), f32>,
    empty_animation: Arc<Animation>,
}

impl AnimationStateData {
    pub fn new(skeleton_data: Arc<SkeletonData>) -> Self {
        Self {
            skeleton_data,
            default_mix: 0.0,
            mixes: HashMap::new(),
            empty_animation: Arc::new(Animation::empty()),
        }
    }

    /// Replaces the zero-timeline animation used by the empty animation operations.
    pub fn with_empty_animation(mut self, animation: Arc<Animation>) -> Self {
        self.empty_animation = animation;
        self
    }

    pub fn empty_animation(&self) -> &Arc<Animation> {
        &self.empty_animation
    }

    pub fn set_mix(&mut self, from: &str, to: &str, duration: f32) -> Result<(), Error> {
        if duration.is_nan() || duration < 0.0 {
            return Err(Error::InvalidValue {
                message: "mix duration must be >= 0".to_string(),
            });
        }
        for name in [from, to] {
            if !self.is_known_animation(name) {
                return Err(Error::UnknownAnimation {
                    name: name.to_string(),
                });
            }
        }
        self.mixes
            .insert((from.to_string(), to.to_string()), duration);
        Ok(())
    }

    /// The mix duration from one animation to another, falling back to [`Self::default_mix`].
    pub fn mix(&self, from: &str, to: &str) -> f32 {
        self.mixes
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .unwrap_or(self.default_mix)
    }

    fn is_known_animation(&self, name: &str) -> bool {
        name == self.empty_animation.name || self.skeleton_data.animation(name).is_some()
    }
}

/// Identifies a [`TrackEntry`] owned by an [`AnimationState`].
///
/// Handles are generational: once the entry is disposed, lookups through a stale handle return
/// `None` even if the slot has been reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrackEntryHandle {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

#[derive(Debug)]
struct EntrySlot {
    generation: u32,
    entry: Option<TrackEntry>,
}

/// One scheduled playback of an animation on a track.
pub struct TrackEntry {
    track_index: usize,
    animation: Arc<Animation>,
    pub looped: bool,

    next: Option<TrackEntryHandle>,
    mixing_from: Option<TrackEntryHandle>,
    listener: Option<Box<dyn AnimationStateListener>>,
    listener_replaced: bool,

    /// Seconds to wait before this entry plays. For a queued entry, the time from the start of
    /// the previous entry.
    pub delay: f32,
    pub track_time: f32,
    track_last: f32,
    next_track_last: f32,
    /// Track time at which the entry is removed when nothing else is queued.
    pub track_end: f32,
    pub time_scale: f32,

    pub animation_start: f32,
    pub animation_end: f32,
    animation_last: f32,
    next_animation_last: f32,

    pub alpha: f32,
    pub mix_time: f32,
    pub mix_duration: f32,
    /// Mix percentage below which this entry's events still fire while it mixes out.
    pub event_threshold: f32,
    pub attachment_threshold: f32,
    pub draw_order_threshold: f32,

    timelines_first: Vec<bool>,
    timelines_last: Vec<bool>,
    timelines_rotation: Vec<f32>,
}

impl fmt::Debug for TrackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackEntry")
            .field("track_index", &self.track_index)
            .field("animation", &self.animation.name)
            .field("looped", &self.looped)
            .field("next", &self.next)
            .field("mixing_from", &self.mixing_from)
            .field("delay", &self.delay)
            .field("track_time", &self.track_time)
            .field("track_last", &self.track_last)
            .field("track_end", &self.track_end)
            .field("time_scale", &self.time_scale)
            .field("animation_start", &self.animation_start)
            .field("animation_end", &self.animation_end)
            .field("animation_last", &self.animation_last)
            .field("alpha", &self.alpha)
            .field("mix_time", &self.mix_time)
            .field("mix_duration", &self.mix_duration)
            .finish()
    }
}

impl fmt::Display for TrackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.animation.name)
    }
}

impl TrackEntry {
    fn new(
        track_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        mix_duration: f32,
    ) -> Self {
        let duration = animation.duration;
        Self {
            track_index,
            animation,
            looped,
            next: None,
            mixing_from: None,
            listener: None,
            listener_replaced: false,
            delay: 0.0,
            track_time: 0.0,
            track_last: -1.0,
            next_track_last: -1.0,
            track_end: if looped { f32::MAX } else { duration },
            time_scale: 1.0,
            animation_start: 0.0,
            animation_end: duration,
            animation_last: -1.0,
            next_animation_last: -1.0,
            alpha: 1.0,
            mix_time: 0.0,
            mix_duration,
            event_threshold: 0.0,
            attachment_threshold: 0.0,
            draw_order_threshold: 0.0,
            timelines_first: Vec::new(),
            timelines_last: Vec::new(),
            timelines_rotation: Vec::new(),
        }
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    pub fn animation(&self) -> &Arc<Animation> {
        &self.animation
    }

    /// Track time as of the last time this entry was applied, or `-1` before that.
    pub fn track_last(&self) -> f32 {
        self.track_last
    }

    pub fn animation_last(&self) -> f32 {
        self.animation_last
    }

    /// Sets the animation time events fire after on the next apply. Keys before the animation
    /// start can be skipped by setting this to [`Self::animation_start`].
    pub fn set_animation_last(&mut self, animation_last: f32) {
        self.animation_last = animation_last;
        self.next_animation_last = animation_last;
    }

    /// The track time mapped into `[animation_start, animation_end]`, wrapping when looping.
    pub fn animation_time(&self) -> f32 {
        if self.looped {
            let duration = self.animation_end - self.animation_start;
            if duration == 0.0 {
                return self.animation_start;
            }
            return self.track_time % duration + self.animation_start;
        }
        (self.track_time + self.animation_start).min(self.animation_end)
    }

    /// The entry queued to play after this one.
    pub fn next(&self) -> Option<TrackEntryHandle> {
        self.next
    }

    /// The entry this one is mixing from, if a mix is in progress.
    pub fn mixing_from(&self) -> Option<TrackEntryHandle> {
        self.mixing_from
    }

    /// Whether at least one full animation span has played.
    pub fn is_complete(&self) -> bool {
        self.track_time >= self.animation_end - self.animation_start
    }

    /// Sets the listener that runs before the state's listeners for this entry's notifications.
    pub fn set_listener<L: AnimationStateListener + 'static>(&mut self, listener: L) {
        self.listener = Some(Box::new(listener));
        self.listener_replaced = true;
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
        self.listener_replaced = true;
    }
}

#[derive(Clone, Copy)]
enum TimelineUsage {
    First,
    Last,
}

/// Plays animations on independent tracks, mixing between them, and reports lifecycle
/// notifications to listeners.
pub struct AnimationState {
    data: AnimationStateData,
    tracks: Vec<Option<TrackEntryHandle>>,
    entries: Vec<EntrySlot>,
    free_list: Vec<usize>,
    queue: EventQueue,
    listeners: Vec<Box<dyn AnimationStateListener>>,
    listeners_cleared: bool,
    events: Vec<Event>,
    property_ids: HashSet<u32>,
    /// Multiplier applied to every update delta.
    pub time_scale: f32,
}

impl fmt::Debug for AnimationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationState")
            .field("tracks", &self.tracks)
            .field("queued_events", &self.queue)
            .field("listeners", &self.listeners.len())
            .field("time_scale", &self.time_scale)
            .finish()
    }
}

impl fmt::Display for AnimationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        for entry in self.tracks.iter().filter_map(|t| t.and_then(|h| self.entry(h))) {
            if wrote {
                f.write_str(", ")?;
            }
            write!(f, "{entry}")?;
            wrote = true;
        }
        if !wrote {
            f.write_str("<none>")?;
        }
        Ok(())
    }
}

impl AnimationState {
    pub fn new(data: AnimationStateData) -> Self {
        Self {
            data,
            tracks: Vec::new(),
            entries: Vec::new(),
            free_list: Vec::new(),
            queue: EventQueue::default(),
            listeners: Vec::new(),
            listeners_cleared: false,
            events: Vec::new(),
            property_ids: HashSet::new(),
            time_scale: 1.0,
        }
    }

    pub fn data(&self) -> &AnimationStateData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut AnimationStateData {
        &mut self.data
    }

    pub fn tracks_len(&self) -> usize {
        self.tracks.len()
    }

    /// The entry currently playing on a track.
    pub fn current(&self, track_index: usize) -> Option<TrackEntryHandle> {
        self.tracks.get(track_index).copied().flatten()
    }

    pub fn track_entry(&self, handle: TrackEntryHandle) -> Option<&TrackEntry> {
        self.entry(handle)
    }

    pub fn track_entry_mut(&mut self, handle: TrackEntryHandle) -> Option<&mut TrackEntry> {
        self.entry_mut(handle)
    }

    pub fn add_listener<L: AnimationStateListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
        self.listeners_cleared = true;
    }

    /// Advances every track by `delta` seconds, promoting queued entries and retiring entries
    /// that finished mixing out.
    pub fn update(&mut self, delta: f32) {
        if !delta.is_finite() || delta < 0.0 {
            log::warn!("ignoring animation state update with delta {delta}");
            return;
        }
        let delta = delta * self.time_scale;

        for track_index in 0..self.tracks.len() {
            let Some(current) = self.tracks[track_index] else {
                continue;
            };
            let Some(entry) = self.entry_mut(current) else {
                continue;
            };
            entry.animation_last = entry.next_animation_last;
            entry.track_last = entry.next_track_last;

            let mut current_delta = delta * entry.time_scale;
            if entry.delay > 0.0 {
                entry.delay -= current_delta;
                if entry.delay > 0.0 {
                    continue;
                }
                current_delta = -entry.delay;
                entry.delay = 0.0;
            }
            let track_last = entry.track_last;

            if let Some(next) = entry.next {
                let next_delay = self.entry(next).map_or(0.0, |e| e.delay);
                let next_time = track_last - next_delay;
                if next_time == 0.0 {
                    if let Some(next_entry) = self.entry_mut(next) {
                        next_entry.delay = 0.0;
                        next_entry.track_time = next_time + delta * next_entry.time_scale;
                    }
                    if let Some(entry) = self.entry_mut(current) {
                        entry.track_time += current_delta;
                        entry.next = None;
                    }
                    log::trace!("track {track_index}: promoting queued entry at {track_last}");
                    self.set_current(track_index, next);
                    if let Some(next_entry) = self.entry_mut(next) {
                        if next_entry.mixing_from.is_some() {
                            next_entry.mix_time += current_delta;
                        }
                    }
                    continue;
                }
                self.update_mixing_from(current, delta);
            } else {
                self.update_mixing_from(current, delta);
                let ended = self
                    .entry(current)
                    .is_some_and(|e| e.track_last >= e.track_end && e.mixing_from.is_none());
                if ended {
                    log::trace!("track {track_index}: reached track end");
                    self.tracks[track_index] = None;
                    self.queue.end(current);
                    self.dispose_next(current);
                    continue;
                }
            }

            if let Some(entry) = self.entry_mut(current) {
                entry.track_time += current_delta;
            }
        }

        self.drain();
    }

    fn update_mixing_from(&mut self, to: TrackEntryHandle, delta: f32) {
        let Some((mut from, mix_time, mix_duration)) = self
            .entry(to)
            .and_then(|e| e.mixing_from.map(|from| (from, e.mix_time, e.mix_duration)))
        else {
            return;
        };

        if mix_time >= mix_duration && mix_time > 0.0 {
            log::trace!("entry {to:?} finished mixing out {from:?}");
            self.queue.end(from);
            let (new_from, from_mix_time, from_mix_duration) = match self.entry(from) {
                Some(e) => (e.mixing_from, e.mix_time, e.mix_duration),
                None => (None, 0.0, 0.0),
            };
            let Some(to_entry) = self.entry_mut(to) else {
                return;
            };
            to_entry.mixing_from = new_from;
            let Some(new_from) = new_from else {
                return;
            };
            to_entry.mix_time = from_mix_time;
            to_entry.mix_duration = from_mix_duration;
            from = new_from;
        }

        let Some(from_entry) = self.entry_mut(from) else {
            return;
        };
        from_entry.animation_last = from_entry.next_animation_last;
        from_entry.track_last = from_entry.next_track_last;
        let mixing_from_delta = delta * from_entry.time_scale;
        from_entry.track_time += mixing_from_delta;
        if let Some(to_entry) = self.entry_mut(to) {
            to_entry.mix_time += mixing_from_delta;
        }

        self.update_mixing_from(from, delta);
    }

    /// Poses `skeleton` with every track's entries. Only per-entry bookkeeping and queued
    /// notifications change, so the same state can pose several skeletons identically.
    pub fn apply(&mut self, skeleton: &mut Skeleton) {
        if self.queue.take_animations_changed() {
            self.animations_changed();
        }

        for track_index in 0..self.tracks.len() {
            let Some(current) = self.tracks[track_index] else {
                continue;
            };
            let Some(entry) = self.entry(current) else {
                continue;
            };
            if entry.delay > 0.0 {
                continue;
            }

            let mut mix = entry.alpha;
            if entry.mixing_from.is_some() {
                let cut = entry.mix_duration == 0.0;
                let to_mix = self.apply_mixing_from(current, skeleton);
                // A zero duration mix is a cut: the incoming entry lands at full weight.
                mix = if cut { 1.0 } else { mix * to_mix };
            }

            let mut events = std::mem::take(&mut self.events);
            let Some(entry) = self.entry_mut(current) else {
                continue;
            };
            let animation = entry.animation.clone();
            let animation_last = entry.animation_last;
            let animation_time = entry.animation_time();

            if mix == 1.0 {
                for timeline in &animation.timelines {
                    timeline.apply(
                        skeleton,
                        animation_last,
                        animation_time,
                        Some(&mut events),
                        1.0,
                        false,
                        false,
                    );
                }
            } else {
                let first_frame = entry.timelines_rotation.is_empty();
                if first_frame {
                    entry
                        .timelines_rotation
                        .resize(animation.timelines.len() * 2, 0.0);
                }
                let timelines_first = &entry.timelines_first;
                let timelines_rotation = &mut entry.timelines_rotation;
                for (i, timeline) in animation.timelines.iter().enumerate() {
                    let setup_pose = timelines_first.get(i).copied().unwrap_or(false);
                    if let Timeline::Rotate(rotate) = timeline {
                        apply_rotate_mixed(
                            rotate,
                            skeleton,
                            animation_time,
                            mix,
                            setup_pose,
                            timelines_rotation,
                            i,
                            first_frame,
                        );
                    } else {
                        timeline.apply(
                            skeleton,
                            animation_last,
                            animation_time,
                            Some(&mut events),
                            mix,
                            setup_pose,
                            false,
                        );
                    }
                }
            }

            self.queue_events(current, animation_time, &mut events);
            self.events = events;
            if let Some(entry) = self.entry_mut(current) {
                entry.next_animation_last = animation_time;
                entry.next_track_last = entry.track_time;
            }
        }

        self.drain();
    }

    /// Applies the entries `to` is mixing from, deepest first, and returns the mix percentage of
    /// `to`.
    fn apply_mixing_from(&mut self, to: TrackEntryHandle, skeleton: &mut Skeleton) -> f32 {
        let Some((from, mix_time, mix_duration)) = self
            .entry(to)
            .and_then(|e| e.mixing_from.map(|from| (from, e.mix_time, e.mix_duration)))
        else {
            return 1.0;
        };
        // A zero duration mix is applied once at full weight to undo the outgoing pose.
        let mix = if mix_duration == 0.0 {
            1.0
        } else {
            (mix_time / mix_duration).min(1.0)
        };

        let from_mix = if self.entry(from).is_some_and(|e| e.mixing_from.is_some()) {
            self.apply_mixing_from(from, skeleton)
        } else {
            1.0
        };

        let mut events = std::mem::take(&mut self.events);
        let Some(entry) = self.entry_mut(from) else {
            self.events = events;
            return mix;
        };
        let animation = entry.animation.clone();
        let animation_last = entry.animation_last;
        let animation_time = entry.animation_time();
        let collect_events = mix < entry.event_threshold;
        let attachments = mix < entry.attachment_threshold;
        let draw_order = mix < entry.draw_order_threshold;
        let alpha_full = entry.alpha * from_mix;
        let alpha_mix = alpha_full * (1.0 - mix);

        let first_frame = entry.timelines_rotation.is_empty();
        if first_frame {
            entry
                .timelines_rotation
                .resize(animation.timelines.len() * 2, 0.0);
        }
        let timelines_first = &entry.timelines_first;
        let timelines_last = &entry.timelines_last;
        let timelines_rotation = &mut entry.timelines_rotation;

        for (i, timeline) in animation.timelines.iter().enumerate() {
            let setup_pose = timelines_first.get(i).copied().unwrap_or(false);
            let alpha = if timelines_last.get(i).copied().unwrap_or(false) {
                alpha_mix
            } else {
                alpha_full
            };
            let sink = if collect_events {
                Some(&mut events)
            } else {
                None
            };
            match timeline {
                Timeline::Rotate(rotate) => apply_rotate_mixed(
                    rotate,
                    skeleton,
                    animation_time,
                    alpha,
                    setup_pose,
                    timelines_rotation,
                    i,
                    first_frame,
                ),
                Timeline::Attachment(_) | Timeline::DrawOrder(_) => {
                    let keyed = match timeline {
                        Timeline::Attachment(_) => attachments,
                        _ => draw_order,
                    };
                    if keyed {
                        timeline.apply(
                            skeleton,
                            animation_last,
                            animation_time,
                            sink,
                            alpha,
                            setup_pose,
                            false,
                        );
                    } else if setup_pose {
                        timeline.apply(
                            skeleton,
                            animation_last,
                            animation_time,
                            sink,
                            alpha,
                            true,
                            true,
                        );
                    }
                }
                _ => timeline.apply(
                    skeleton,
                    animation_last,
                    animation_time,
                    sink,
                    alpha,
                    setup_pose,
                    true,
                ),
            }
        }

        self.queue_events(from, animation_time, &mut events);
        events.clear();
        self.events = events;
        if let Some(entry) = self.entry_mut(from) {
            entry.next_animation_last = animation_time;
            entry.next_track_last = entry.track_time;
        }

        mix
    }

    /// Queues the events collected while applying `handle`, and a `Complete` when a loop or the
    /// animation finished. Events before the wrapped track time fire ahead of the completion.
    fn queue_events(&mut self, handle: TrackEntryHandle, animation_time: f32, events: &mut Vec<Event>) {
        let Some(entry) = self.entry(handle) else {
            events.clear();
            return;
        };
        let animation_start = entry.animation_start;
        let animation_end = entry.animation_end;
        let duration = animation_end - animation_start;
        let track_last_wrapped = if duration == 0.0 {
            0.0
        } else {
            entry.track_last % duration
        };
        let complete = if entry.looped && duration != 0.0 {
            track_last_wrapped > entry.track_time % duration
        } else {
            animation_time >= animation_end && entry.animation_last < animation_end
        };

        let mut drained = events.drain(..);
        let mut after_complete = Vec::new();
        for event in drained.by_ref() {
            if event.time < track_last_wrapped {
                after_complete.push(event);
                break;
            }
            if event.time > animation_end {
                continue;
            }
            self.queue.event(handle, event);
        }
        after_complete.extend(drained);

        if complete {
            self.queue.complete(handle);
        }
        for event in after_complete {
            if event.time < animation_start {
                continue;
            }
            self.queue.event(handle, event);
        }
    }

    /// Ends every entry on the track, disposing queued entries. The skeleton keeps its last pose.
    pub fn clear_track(&mut self, track_index: usize) {
        let Some(current) = self.current(track_index) else {
            return;
        };
        log::debug!("clearing track {track_index}");
        self.queue.end(current);
        self.dispose_next(current);

        let mut entry = current;
        while let Some(from) = self.entry(entry).and_then(|e| e.mixing_from) {
            self.queue.end(from);
            if let Some(e) = self.entry_mut(entry) {
                e.mixing_from = None;
            }
            entry = from;
        }

        self.tracks[track_index] = None;
        self.drain();
    }

    /// Clears every track. Listeners only see the notifications once all tracks are cleared.
    pub fn clear_tracks(&mut self) {
        let drain_disabled = std::mem::replace(&mut self.queue.drain_disabled, true);
        for track_index in 0..self.tracks.len() {
            self.clear_track(track_index);
        }
        self.tracks.clear();
        self.queue.drain_disabled = drain_disabled;
        self.drain();
    }

    /// Sets the current animation of a track, disposing any queued entries. The previous entry is
    /// mixed out unless it was never applied.
    pub fn set_animation(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
    ) -> Result<TrackEntryHandle, Error> {
        let animation = self.find_animation(animation_name)?;
        Ok(self.set_animation_with(track_index, animation, looped))
    }

    pub fn set_animation_with(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        looped: bool,
    ) -> TrackEntryHandle {
        self.set_animation_internal(track_index, animation, looped, None)
    }

    fn set_animation_internal(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        empty_mix: Option<f32>,
    ) -> TrackEntryHandle {
        log::debug!("track {track_index}: set animation '{}'", animation.name);
        let mut current = self.expand_to_index(track_index);
        if let Some(handle) = current {
            let never_applied = self.entry(handle).is_some_and(|e| e.next_track_last == -1.0);
            if never_applied {
                // Nothing of it was ever posed, so there is nothing to mix from.
                self.tracks[track_index] = None;
                self.queue.interrupt(handle);
                self.queue.end(handle);
                self.dispose_next(handle);
                let mut entry = handle;
                while let Some(from) = self.entry_mut(entry).and_then(|e| e.mixing_from.take()) {
                    self.queue.end(from);
                    entry = from;
                }
                current = None;
            } else {
                self.dispose_next(handle);
            }
        }

        let handle = self.new_track_entry(track_index, animation, looped, current, empty_mix);
        self.set_current(track_index, handle);
        self.drain();
        handle
    }

    /// Queues an animation to play after the last entry of a track.
    ///
    /// A `delay <= 0` is relative to the end of the previous entry's current loop, minus the mix
    /// duration. If the track is empty, the animation becomes current immediately.
    pub fn add_animation(
        &mut self,
        track_index: usize,
        animation_name: &str,
        looped: bool,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        let animation = self.find_animation(animation_name)?;
        Ok(self.add_animation_with(track_index, animation, looped, delay))
    }

    pub fn add_animation_with(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        delay: f32,
    ) -> TrackEntryHandle {
        self.add_animation_internal(track_index, animation, looped, delay, None)
    }

    fn add_animation_internal(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        mut delay: f32,
        empty_mix: Option<f32>,
    ) -> TrackEntryHandle {
        log::debug!(
            "track {track_index}: add animation '{}' (delay {delay})",
            animation.name
        );
        let mut last = self.expand_to_index(track_index);
        while let Some(next) = last.and_then(|h| self.entry(h)).and_then(|e| e.next) {
            last = Some(next);
        }

        let handle = self.new_track_entry(track_index, animation, looped, last, empty_mix);

        let Some(last) = last else {
            if let Some(entry) = self.entry_mut(handle) {
                entry.delay = delay;
            }
            self.set_current(track_index, handle);
            self.drain();
            return handle;
        };

        let mix_duration = self.entry(handle).map_or(0.0, |e| e.mix_duration);
        if let Some(last_entry) = self.entry_mut(last) {
            last_entry.next = Some(handle);
            if delay <= 0.0 {
                let duration = last_entry.animation_end - last_entry.animation_start;
                if duration != 0.0 {
                    delay += duration * (1.0 + (last_entry.track_time / duration).trunc())
                        - mix_duration;
                } else {
                    delay = 0.0;
                }
            }
        }
        if let Some(entry) = self.entry_mut(handle) {
            entry.delay = delay;
        }
        handle
    }

    /// Sets the empty animation on a track, mixing the previous entry out over `mix_duration`.
    pub fn set_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
    ) -> Result<TrackEntryHandle, Error> {
        check_mix_duration(mix_duration)?;
        let animation = self.data.empty_animation.clone();
        Ok(self.set_animation_internal(track_index, animation, false, Some(mix_duration)))
    }

    /// Queues the empty animation on a track. A `delay <= 0` is relative to the end of the
    /// previous entry minus `mix_duration`.
    pub fn add_empty_animation(
        &mut self,
        track_index: usize,
        mix_duration: f32,
        delay: f32,
    ) -> Result<TrackEntryHandle, Error> {
        check_mix_duration(mix_duration)?;
        let animation = self.data.empty_animation.clone();
        Ok(self.add_animation_internal(track_index, animation, false, delay, Some(mix_duration)))
    }

    /// Sets the empty animation on every track that has a current entry.
    pub fn set_empty_animations(&mut self, mix_duration: f32) -> Result<(), Error> {
        check_mix_duration(mix_duration)?;
        log::debug!("mixing all tracks to empty over {mix_duration}s");
        let drain_disabled = std::mem::replace(&mut self.queue.drain_disabled, true);
        let animation = self.data.empty_animation.clone();
        for track_index in 0..self.tracks.len() {
            if self.tracks[track_index].is_some() {
                self.set_animation_internal(
                    track_index,
                    animation.clone(),
                    false,
                    Some(mix_duration),
                );
            }
        }
        self.queue.drain_disabled = drain_disabled;
        self.drain();
        Ok(())
    }

    fn find_animation(&self, name: &str) -> Result<Arc<Animation>, Error> {
        self.data
            .skeleton_data
            .animation(name)
            .cloned()
            .ok_or_else(|| Error::UnknownAnimation {
                name: name.to_string(),
            })
    }

    fn expand_to_index(&mut self, track_index: usize) -> Option<TrackEntryHandle> {
        if track_index >= self.tracks.len() {
            self.tracks.resize(track_index + 1, None);
        }
        self.tracks[track_index]
    }

    fn new_track_entry(
        &mut self,
        track_index: usize,
        animation: Arc<Animation>,
        looped: bool,
        last: Option<TrackEntryHandle>,
        empty_mix: Option<f32>,
    ) -> TrackEntryHandle {
        let mix_duration = match empty_mix {
            Some(mix) => mix,
            None => last
                .and_then(|h| self.entry(h))
                .map_or(0.0, |l| self.data.mix(&l.animation.name, &animation.name)),
        };
        let mut entry = TrackEntry::new(track_index, animation, looped, mix_duration);
        if empty_mix.is_some() {
            entry.track_end = mix_duration;
        }
        self.alloc_entry(entry)
    }

    fn set_current(&mut self, track_index: usize, handle: TrackEntryHandle) {
        let current = self.expand_to_index(track_index);
        self.tracks[track_index] = Some(handle);

        if let Some(current) = current {
            self.queue.interrupt(current);
            let current_track_time = match self.entry_mut(current) {
                Some(entry) => {
                    entry.timelines_rotation.clear();
                    entry.track_time
                }
                None => 0.0,
            };
            if let Some(entry) = self.entry_mut(handle) {
                entry.mixing_from = Some(current);
                entry.mix_time = (entry.mix_duration - current_track_time).max(0.0);
            }
        }

        self.queue.start(handle);
    }

    fn dispose_next(&mut self, handle: TrackEntryHandle) {
        let mut next = self.entry_mut(handle).and_then(|e| e.next.take());
        while let Some(queued) = next {
            self.queue.dispose(queued);
            next = self.entry_mut(queued).and_then(|e| e.next.take());
        }
    }

    fn animations_changed(&mut self) {
        // First: lowest track to highest, deepest mixing-from entry first.
        self.property_ids.clear();
        let heads = self.tracks.iter().flatten().copied().collect::<Vec<_>>();
        if let Some((&lowest, rest)) = heads.split_first() {
            self.set_timelines_first(lowest);
            for &head in rest {
                self.check_timelines_first(head);
            }
        }

        // Last: highest track down to the lowest one that is mixing.
        self.property_ids.clear();
        let lowest_mixing = self.tracks.iter().position(|t| {
            t.and_then(|h| self.entry(h))
                .is_some_and(|e| e.mixing_from.is_some())
        });
        let Some(lowest_mixing) = lowest_mixing else {
            return;
        };
        for track_index in (lowest_mixing..self.tracks.len()).rev() {
            let Some(head) = self.tracks[track_index] else {
                continue;
            };
            let Some(entry) = self.entry(head) else {
                continue;
            };
            let animation = entry.animation.clone();
            let mut from = entry.mixing_from;
            self.property_ids
                .extend(animation.timelines.iter().map(Timeline::property_id));
            while let Some(handle) = from {
                self.check_timelines_usage(handle, TimelineUsage::Last);
                from = self.entry(handle).and_then(|e| e.mixing_from);
            }
        }
    }

    fn set_timelines_first(&mut self, handle: TrackEntryHandle) {
        let Some(entry) = self.entry(handle) else {
            return;
        };
        if let Some(from) = entry.mixing_from {
            self.set_timelines_first(from);
            self.check_timelines_usage(handle, TimelineUsage::First);
            return;
        }
        let animation = entry.animation.clone();
        self.property_ids
            .extend(animation.timelines.iter().map(Timeline::property_id));
        if let Some(entry) = self.entry_mut(handle) {
            entry.timelines_first = vec![true; animation.timelines.len()];
        }
    }

    fn check_timelines_first(&mut self, handle: TrackEntryHandle) {
        if let Some(from) = self.entry(handle).and_then(|e| e.mixing_from) {
            self.check_timelines_first(from);
        }
        self.check_timelines_usage(handle, TimelineUsage::First);
    }

    fn check_timelines_usage(&mut self, handle: TrackEntryHandle, usage: TimelineUsage) {
        let Some(animation) = self.entry(handle).map(|e| e.animation.clone()) else {
            return;
        };
        let property_ids = &mut self.property_ids;
        let flags = animation
            .timelines
            .iter()
            .map(|t| property_ids.insert(t.property_id()))
            .collect::<Vec<_>>();
        if let Some(entry) = self.entry_mut(handle) {
            match usage {
                TimelineUsage::First => entry.timelines_first = flags,
                TimelineUsage::Last => entry.timelines_last = flags,
            }
        }
    }

    /// Delivers queued notifications. Does nothing while already draining or while draining is
    /// disabled; notifications queued by listeners are delivered in the same pass.
    fn drain(&mut self) {
        if self.queue.draining || self.queue.drain_disabled {
            return;
        }
        self.queue.draining = true;

        while let Some(QueuedEvent { entry, event }) = self.queue.pop_front() {
            let mut entry_listener = self.entry_mut(entry).and_then(|e| {
                e.listener_replaced = false;
                e.listener.take()
            });
            if let Some(listener) = entry_listener.as_mut() {
                listener.on_event(self, entry, &event);
            }

            self.listeners_cleared = false;
            let mut listeners = std::mem::take(&mut self.listeners);
            for listener in &mut listeners {
                listener.on_event(self, entry, &event);
            }
            if !self.listeners_cleared {
                listeners.append(&mut self.listeners);
                self.listeners = listeners;
            }

            if event == AnimationStateEvent::Dispose {
                self.free_entry(entry);
            } else if let Some(listener) = entry_listener {
                // Listeners may have set or cleared this entry's listener during the callbacks.
                if let Some(e) = self.entry_mut(entry) {
                    if !e.listener_replaced {
                        e.listener = Some(listener);
                    }
                }
            }
        }

        self.queue.draining = false;
    }

    fn alloc_entry(&mut self, entry: TrackEntry) -> TrackEntryHandle {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.entries[index];
            slot.entry = Some(entry);
            TrackEntryHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.entries.len();
            self.entries.push(EntrySlot {
                generation: 0,
                entry: Some(entry),
            });
            TrackEntryHandle {
                index,
                generation: 0,
            }
        }
    }

    fn entry(&self, handle: TrackEntryHandle) -> Option<&TrackEntry> {
        let slot = self.entries.get(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, handle: TrackEntryHandle) -> Option<&mut TrackEntry> {
        let slot = self.entries.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    fn free_entry(&mut self, handle: TrackEntryHandle) {
        let Some(slot) = self.entries.get_mut(handle.index) else {
            return;
        };
        if slot.generation != handle.generation || slot.entry.is_none() {
            return;
        }
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
    }

    #[cfg(test)]
    pub(crate) fn live_entries_for_tests(&self) -> usize {
        self.entries.iter().filter(|s| s.entry.is_some()).count()
    }

    #[cfg(test)]
    pub(crate) fn timelines_first_for_tests(&self, handle: TrackEntryHandle) -> Vec<bool> {
        self.entry(handle)
            .map(|e| e.timelines_first.clone())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn timelines_last_for_tests(&self, handle: TrackEntryHandle) -> Vec<bool> {
        self.entry(handle)
            .map(|e| e.timelines_last.clone())
            .unwrap_or_default()
    }
}

fn check_mix_duration(mix_duration: f32) -> Result<(), Error> {
    if !mix_duration.is_finite() || mix_duration < 0.0 {
        return Err(Error::InvalidValue {
            message: "mix duration must be finite and >= 0".to_string(),
        });
    }
    Ok(())
}
