use crate::{
    Animation, AnimationState, AnimationStateData, AnimationStateEvent, AttachmentFrame,
    AttachmentTimeline, BoneData, Curve, Event, EventTimeline, RotateFrame, RotateTimeline,
    Skeleton, SkeletonData, SlotData, Timeline, TrackEntryHandle, TranslateTimeline, Vec2Frame,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub(crate) const ROOT: usize = 0;
pub(crate) const ARM: usize = 1;
pub(crate) const HAND: usize = 0;

pub(crate) fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

pub(crate) fn rotate(bone_index: usize, keys: &[(f32, f32)]) -> Timeline {
    Timeline::Rotate(RotateTimeline {
        bone_index,
        frames: keys
            .iter()
            .map(|&(time, angle)| RotateFrame {
                time,
                angle,
                curve: Curve::Linear,
            })
            .collect(),
    })
}

pub(crate) fn translate(bone_index: usize, keys: &[(f32, f32, f32)]) -> Timeline {
    Timeline::Translate(TranslateTimeline {
        bone_index,
        frames: keys
            .iter()
            .map(|&(time, x, y)| Vec2Frame {
                time,
                x,
                y,
                curve: Curve::Linear,
            })
            .collect(),
    })
}

pub(crate) fn attachment(slot_index: usize, keys: &[(f32, Option<&str>)]) -> Timeline {
    Timeline::Attachment(AttachmentTimeline {
        slot_index,
        frames: keys
            .iter()
            .map(|&(time, name)| AttachmentFrame {
                time,
                name: name.map(str::to_string),
            })
            .collect(),
    })
}

pub(crate) fn events(keys: &[(f32, &str)]) -> Timeline {
    Timeline::Event(EventTimeline {
        events: keys.iter().map(|&(time, name)| Event::new(time, name)).collect(),
    })
}

/// Bones `root` and `arm` (child of root), one slot `hand` on the arm showing `fist`.
pub(crate) fn rig(animations: Vec<Animation>) -> Arc<SkeletonData> {
    let bones = vec![BoneData::new("root", None), BoneData::new("arm", Some(ROOT))];
    let slots = vec![SlotData {
        name: "hand".to_string(),
        bone: ARM,
        attachment: Some("fist".to_string()),
    }];
    SkeletonData::new(bones, slots, animations).unwrap()
}

/// `walk` loops over 1s with the arm at 30 and the root at x=10, `jump` holds the arm at 90 for
/// 0.625s, `land` holds the arm at 0 for 0.25s.
pub(crate) fn walk_jump_land() -> Arc<SkeletonData> {
    rig(vec![
        Animation::new(
            "walk",
            vec![rotate(ARM, &[(0.0, 30.0)]), translate(ROOT, &[(0.0, 10.0, 0.0)])],
            1.0,
        ),
        Animation::new("jump", vec![rotate(ARM, &[(0.0, 90.0)])], 0.625),
        Animation::new("land", vec![rotate(ARM, &[(0.0, 0.0)])], 0.25),
    ])
}

pub(crate) fn setup(data: Arc<SkeletonData>) -> (AnimationState, Skeleton) {
    let state = AnimationState::new(AnimationStateData::new(data.clone()));
    (state, Skeleton::new(data))
}

pub(crate) fn setup_with_mixes(
    data: Arc<SkeletonData>,
    mixes: &[(&str, &str, f32)],
) -> (AnimationState, Skeleton) {
    let mut state_data = AnimationStateData::new(data.clone());
    for &(from, to, duration) in mixes {
        state_data.set_mix(from, to, duration).unwrap();
    }
    (AnimationState::new(state_data), Skeleton::new(data))
}

pub(crate) fn label(event: &AnimationStateEvent) -> String {
    match event {
        AnimationStateEvent::Start => "start".to_string(),
        AnimationStateEvent::Interrupt => "interrupt".to_string(),
        AnimationStateEvent::End => "end".to_string(),
        AnimationStateEvent::Dispose => "dispose".to_string(),
        AnimationStateEvent::Complete => "complete".to_string(),
        AnimationStateEvent::Event(e) => format!("event {}", e.name),
    }
}

pub(crate) type Log = Rc<RefCell<Vec<String>>>;

/// Records `"<kind> <animation>"` for every notification the state delivers.
pub(crate) fn record(state: &mut AnimationState) -> Log {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    state.add_listener(
        move |state: &mut AnimationState, entry: TrackEntryHandle, event: &AnimationStateEvent| {
            let name = state
                .track_entry(entry)
                .map(|e| e.animation().name.clone())
                .unwrap_or_else(|| "<disposed>".to_string());
            sink.borrow_mut().push(format!("{} {name}", label(event)));
        },
    );
    log
}

pub(crate) fn take(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.borrow_mut())
}

/// One frame of the usual game loop.
pub(crate) fn step(state: &mut AnimationState, skeleton: &mut Skeleton, delta: f32) {
    state.update(delta);
    state.apply(skeleton);
}
