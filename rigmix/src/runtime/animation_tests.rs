use super::animation::wrap_degrees;
use super::test_fixtures::{ARM, HAND, ROOT, assert_approx, attachment, events, rig, rotate, translate};
use crate::{
    Animation, BoneData, Curve, DrawOrderFrame, DrawOrderTimeline, Event, ScaleTimeline, Skeleton,
    SkeletonData, SlotData, Timeline, Vec2Frame,
};

fn fired(timeline: &Timeline, skeleton: &mut Skeleton, last_time: f32, time: f32) -> Vec<String> {
    let mut out = Vec::new();
    timeline.apply(skeleton, last_time, time, Some(&mut out), 1.0, false, false);
    out.into_iter().map(|e| e.name).collect()
}

#[test]
fn wrap_degrees_maps_into_half_turns() {
    assert_approx(wrap_degrees(190.0), -170.0);
    assert_approx(wrap_degrees(-190.0), 170.0);
    assert_approx(wrap_degrees(720.0 + 45.0), 45.0);
    assert_approx(wrap_degrees(180.0), 180.0);
    assert_approx(wrap_degrees(0.0), 0.0);
}

#[test]
fn translate_timeline_interpolates_from_setup_or_current() {
    let data = rig(Vec::new());
    let mut skeleton = Skeleton::new(data);
    let timeline = translate(ROOT, &[(0.0, 0.0, 0.0), (1.0, 10.0, -4.0)]);

    timeline.apply(&mut skeleton, -1.0, 0.25, None, 1.0, true, false);
    assert_approx(skeleton.bones[ROOT].x, 2.5);
    assert_approx(skeleton.bones[ROOT].y, -1.0);

    // Half way from the current pose to the keyed value.
    skeleton.bones[ROOT].x = 20.0;
    timeline.apply(&mut skeleton, -1.0, 1.0, None, 0.5, false, false);
    assert_approx(skeleton.bones[ROOT].x, 15.0);

    // From setup (x = 0), ignoring the current pose.
    timeline.apply(&mut skeleton, -1.0, 1.0, None, 0.5, true, false);
    assert_approx(skeleton.bones[ROOT].x, 5.0);
}

#[test]
fn keys_do_nothing_before_the_first_frame() {
    let data = rig(Vec::new());
    let mut skeleton = Skeleton::new(data);
    skeleton.bones[ARM].rotation = 12.0;
    skeleton.slots[HAND].attachment = Some("open".to_string());

    rotate(ARM, &[(0.5, 90.0)]).apply(&mut skeleton, -1.0, 0.25, None, 1.0, true, false);
    attachment(HAND, &[(0.5, None)]).apply(&mut skeleton, -1.0, 0.25, None, 1.0, true, false);

    assert_approx(skeleton.bones[ARM].rotation, 12.0);
    assert_eq!(skeleton.slots[HAND].attachment.as_deref(), Some("open"));
}

#[test]
fn rotate_timeline_takes_the_short_way_between_keys() {
    let data = rig(Vec::new());
    let mut skeleton = Skeleton::new(data);
    let timeline = rotate(ARM, &[(0.0, 170.0), (1.0, -170.0)]);

    timeline.apply(&mut skeleton, -1.0, 0.5, None, 1.0, true, false);
    assert_approx(wrap_degrees(skeleton.bones[ARM].rotation), 180.0);

    timeline.apply(&mut skeleton, -1.0, 0.75, None, 1.0, true, false);
    assert_approx(skeleton.bones[ARM].rotation, -175.0);
}

#[test]
fn rotate_timeline_mixes_the_short_way_from_the_current_pose() {
    let data = rig(Vec::new());
    let mut skeleton = Skeleton::new(data);
    skeleton.bones[ARM].rotation = 170.0;

    rotate(ARM, &[(0.0, -170.0)]).apply(&mut skeleton, -1.0, 0.0, None, 0.5, false, false);
    assert_approx(skeleton.bones[ARM].rotation, 180.0);
}

#[test]
fn stepped_and_bezier_curves() {
    let data = rig(Vec::new());
    let mut skeleton = Skeleton::new(data);

    let stepped = Timeline::Translate(crate::TranslateTimeline {
        bone_index: ROOT,
        frames: vec![
            Vec2Frame {
                time: 0.0,
                x: 1.0,
                y: 0.0,
                curve: Curve::Stepped,
            },
            Vec2Frame {
                time: 1.0,
                x: 5.0,
                y: 0.0,
                curve: Curve::Linear,
            },
        ],
    });
    stepped.apply(&mut skeleton, -1.0, 0.99, None, 1.0, true, false);
    assert_approx(skeleton.bones[ROOT].x, 1.0);
    stepped.apply(&mut skeleton, -1.0, 1.0, None, 1.0, true, false);
    assert_approx(skeleton.bones[ROOT].x, 5.0);

    // Control points on the diagonal make the bezier linear.
    let third = 1.0 / 3.0;
    let linear_bezier = Timeline::Translate(crate::TranslateTimeline {
        bone_index: ROOT,
        frames: vec![
            Vec2Frame {
                time: 0.0,
                x: 0.0,
                y: 0.0,
                curve: Curve::Bezier {
                    cx1: third,
                    cy1: third,
                    cx2: 2.0 * third,
                    cy2: 2.0 * third,
                },
            },
            Vec2Frame {
                time: 2.0,
                x: 8.0,
                y: 0.0,
                curve: Curve::Linear,
            },
        ],
    });
    for (time, expected) in [(0.02, 0.08), (0.5, 2.0), (1.0, 4.0), (1.9, 7.6)] {
        linear_bezier.apply(&mut skeleton, -1.0, time, None, 1.0, true, false);
        assert_approx(skeleton.bones[ROOT].x, expected);
    }

    // An ease-in curve lags behind linear in the first half.
    let ease_in = Timeline::Translate(crate::TranslateTimeline {
        bone_index: ROOT,
        frames: vec![
            Vec2Frame {
                time: 0.0,
                x: 0.0,
                y: 0.0,
                curve: Curve::Bezier {
                    cx1: 0.5,
                    cy1: 0.0,
                    cx2: 1.0,
                    cy2: 0.5,
                },
            },
            Vec2Frame {
                time: 1.0,
                x: 1.0,
                y: 0.0,
                curve: Curve::Linear,
            },
        ],
    });
    ease_in.apply(&mut skeleton, -1.0, 0.25, None, 1.0, true, false);
    assert!(skeleton.bones[ROOT].x < 0.25);
}

#[test]
fn scale_keeps_the_sign_of_the_pose_being_mixed_from_when_mixing_out() {
    let mut bones = vec![BoneData::new("root", None)];
    bones[0].scale_x = 1.0;
    let data = SkeletonData::new(bones, Vec::new(), Vec::new()).unwrap();
    let mut skeleton = Skeleton::new(data);
    let timeline = Timeline::Scale(ScaleTimeline {
        bone_index: 0,
        frames: vec![Vec2Frame {
            time: 0.0,
            x: -2.0,
            y: 1.0,
            curve: Curve::Linear,
        }],
    });

    timeline.apply(&mut skeleton, -1.0, 0.0, None, 0.5, true, true);
    assert_approx(skeleton.bones[0].scale_x, 1.5);

    timeline.apply(&mut skeleton, -1.0, 0.0, None, 0.5, true, false);
    assert_approx(skeleton.bones[0].scale_x, -1.5);

    timeline.apply(&mut skeleton, -1.0, 0.0, None, 1.0, true, true);
    assert_approx(skeleton.bones[0].scale_x, -2.0);
}

#[test]
fn attachment_restores_setup_when_mixing_out_from_setup() {
    let data = rig(Vec::new());
    let mut skeleton = Skeleton::new(data);
    let timeline = attachment(HAND, &[(0.0, Some("open")), (0.5, None)]);

    timeline.apply(&mut skeleton, -1.0, 0.25, None, 1.0, false, false);
    assert_eq!(skeleton.slots[HAND].attachment.as_deref(), Some("open"));

    timeline.apply(&mut skeleton, -1.0, 0.75, None, 1.0, false, false);
    assert_eq!(skeleton.slots[HAND].attachment, None);

    timeline.apply(&mut skeleton, -1.0, 0.25, None, 0.5, true, true);
    assert_eq!(skeleton.slots[HAND].attachment.as_deref(), Some("fist"));
}

#[test]
fn draw_order_applies_keys_and_restores_setup() {
    let bones = vec![BoneData::new("root", None)];
    let slots = ["a", "b", "c"]
        .into_iter()
        .map(|name| SlotData {
            name: name.to_string(),
            bone: 0,
            attachment: None,
        })
        .collect();
    let data = SkeletonData::new(bones, slots, Vec::new()).unwrap();
    let mut skeleton = Skeleton::new(data);
    let timeline = Timeline::DrawOrder(DrawOrderTimeline {
        frames: vec![
            DrawOrderFrame {
                time: 0.0,
                draw_order: Some(vec![2, 0, 1]),
            },
            DrawOrderFrame {
                time: 1.0,
                draw_order: None,
            },
        ],
    });

    timeline.apply(&mut skeleton, -1.0, 0.5, None, 1.0, false, false);
    assert_eq!(skeleton.draw_order, vec![2, 0, 1]);

    timeline.apply(&mut skeleton, -1.0, 0.5, None, 1.0, true, true);
    assert_eq!(skeleton.draw_order, vec![0, 1, 2]);

    timeline.apply(&mut skeleton, -1.0, 0.5, None, 1.0, false, false);
    timeline.apply(&mut skeleton, -1.0, 1.0, None, 1.0, false, false);
    assert_eq!(skeleton.draw_order, vec![0, 1, 2]);
}

#[test]
fn event_timeline_fires_half_open_ranges() {
    let data = rig(Vec::new());
    let mut skeleton = Skeleton::new(data);
    let timeline = events(&[(0.0, "a"), (0.5, "b"), (0.5, "c"), (1.0, "d")]);

    assert_eq!(fired(&timeline, &mut skeleton, -1.0, 0.0), vec!["a"]);
    assert_eq!(fired(&timeline, &mut skeleton, 0.0, 0.25), Vec::<String>::new());
    assert_eq!(fired(&timeline, &mut skeleton, 0.25, 0.5), vec!["b", "c"]);
    assert_eq!(fired(&timeline, &mut skeleton, 0.5, 1.0), vec!["d"]);
    assert_eq!(fired(&timeline, &mut skeleton, 1.0, 2.0), Vec::<String>::new());
}

#[test]
fn event_timeline_fires_tail_then_head_when_time_wraps() {
    let data = rig(Vec::new());
    let mut skeleton = Skeleton::new(data);
    let timeline = events(&[(0.0, "a"), (0.5, "b"), (0.9, "c")]);

    assert_eq!(fired(&timeline, &mut skeleton, 0.75, 0.25), vec!["c", "a"]);
}

#[test]
fn event_timeline_without_a_sink_is_a_no_op() {
    let data = rig(Vec::new());
    let mut skeleton = Skeleton::new(data);
    events(&[(0.0, "a")]).apply(&mut skeleton, -1.0, 1.0, None, 1.0, false, false);
}

#[test]
fn looping_animation_wraps_times_before_applying() {
    let data = rig(Vec::new());
    let mut skeleton = Skeleton::new(data);
    let animation = Animation::new(
        "loop",
        vec![
            translate(ROOT, &[(0.0, 0.0, 0.0), (1.0, 4.0, 0.0)]),
            events(&[(0.0, "top"), (0.5, "mid")]),
        ],
        1.0,
    );

    let mut out: Vec<Event> = Vec::new();
    animation.apply(&mut skeleton, 2.75, 3.25, true, Some(&mut out), 1.0, true, false);
    assert_approx(skeleton.bones[ROOT].x, 1.0);
    let names = out.iter().map(|e| e.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["top"]);

    out.clear();
    animation.apply(&mut skeleton, 2.75, 3.25, false, Some(&mut out), 1.0, true, false);
    assert_approx(skeleton.bones[ROOT].x, 4.0);
    assert!(out.is_empty());
}
