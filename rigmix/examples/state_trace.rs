use rigmix::{
    Animation, AnimationState, AnimationStateData, AnimationStateEvent, BoneData, Curve, Event,
    EventTimeline, RotateFrame, RotateTimeline, Skeleton, SkeletonData, SlotData, Timeline,
    TrackEntryHandle,
};
use std::sync::Arc;

fn arm_at(angle: f32) -> Timeline {
    Timeline::Rotate(RotateTimeline {
        bone_index: 1,
        frames: vec![RotateFrame {
            time: 0.0,
            angle,
            curve: Curve::Linear,
        }],
    })
}

fn build_rig() -> Arc<SkeletonData> {
    let bones = vec![BoneData::new("root", None), BoneData::new("arm", Some(0))];
    let slots = vec![SlotData {
        name: "hand".to_string(),
        bone: 1,
        attachment: Some("fist".to_string()),
    }];
    let animations = vec![
        Animation::new(
            "walk",
            vec![
                arm_at(30.0),
                Timeline::Event(EventTimeline {
                    events: vec![Event::new(0.0, "footstep"), Event::new(0.5, "footstep")],
                }),
            ],
            1.0,
        ),
        Animation::new("jump", vec![arm_at(90.0)], 0.625),
        Animation::new("land", vec![arm_at(0.0)], 0.25),
    ];
    SkeletonData::new(bones, slots, animations).expect("valid rig")
}

fn main() {
    env_logger::init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    // Queued entries start when the previous entry's track time hits their delay exactly, so the
    // default frame time divides every delay below.
    let frame_time: f32 = args
        .first()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1.0 / 32.0);
    let frames: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(96);

    let data = build_rig();
    let mut state_data = AnimationStateData::new(data.clone());
    state_data.set_mix("walk", "jump", 0.25).expect("mix");
    state_data.set_mix("jump", "land", 0.125).expect("mix");

    let mut skeleton = Skeleton::new(data);
    let mut state = AnimationState::new(state_data);
    state.add_listener(
        |state: &mut AnimationState, entry: TrackEntryHandle, event: &AnimationStateEvent| {
            let (track, name, track_time) = state
                .track_entry(entry)
                .map(|e| (e.track_index(), e.animation().name.clone(), e.track_time))
                .unwrap_or((0, "?".to_string(), 0.0));
            match event {
                AnimationStateEvent::Event(e) => {
                    println!("[{track}] {name} @ {track_time:.3}: event {}", e.name)
                }
                other => println!("[{track}] {name} @ {track_time:.3}: {other:?}"),
            }
        },
    );

    state.set_animation(0, "walk", true).expect("set walk");
    state.add_animation(0, "jump", false, 0.0).expect("add jump");
    state.add_animation(0, "land", false, 0.0).expect("add land");
    state.add_empty_animation(0, 0.125, 0.0).expect("add empty");

    for frame in 0..frames {
        state.update(frame_time);
        skeleton.set_to_setup_pose();
        state.apply(&mut skeleton);
        skeleton.update_world_transform();
        if frame % 8 == 0 {
            println!(
                "frame {frame:3}: arm {:7.2} deg, playing {state}",
                skeleton.bones[1].rotation
            );
        }
    }
}
