use crate::{
    Animation, AttachmentTimeline, Curve, DrawOrderTimeline, Event, EventTimeline, RotateFrame,
    RotateTimeline, ScaleTimeline, ShearTimeline, Skeleton, Timeline, TranslateTimeline, Vec2Frame,
};

impl Animation {
    /// Applies every timeline at `time`. Looping animations wrap both times into the duration
    /// first, so an event timeline sees the wrap as `last_time > time`.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        mut last_time: f32,
        mut time: f32,
        looped: bool,
        mut events: Option<&mut Vec<Event>>,
        alpha: f32,
        setup_pose: bool,
        mixing_out: bool,
    ) {
        if looped && self.duration != 0.0 {
            time %= self.duration;
            if last_time > 0.0 {
                last_time %= self.duration;
            }
        }
        for timeline in &self.timelines {
            timeline.apply(
                skeleton,
                last_time,
                time,
                events.as_deref_mut(),
                alpha,
                setup_pose,
                mixing_out,
            );
        }
    }
}

impl Timeline {
    /// Writes this timeline's value at `time` into `skeleton`, weighted by `alpha`.
    ///
    /// `setup_pose` blends from the setup value instead of the current one. `mixing_out` marks an
    /// entry that is fading out; attachment and draw order keys then restore the setup value when
    /// `setup_pose` is also set, and scale keeps the sign of the value being mixed from.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        skeleton: &mut Skeleton,
        last_time: f32,
        time: f32,
        events: Option<&mut Vec<Event>>,
        alpha: f32,
        setup_pose: bool,
        mixing_out: bool,
    ) {
        match self {
            Timeline::Rotate(t) => apply_rotate(t, skeleton, time, alpha, setup_pose),
            Timeline::Translate(t) => apply_translate(t, skeleton, time, alpha, setup_pose),
            Timeline::Scale(t) => apply_scale(t, skeleton, time, alpha, setup_pose, mixing_out),
            Timeline::Shear(t) => apply_shear(t, skeleton, time, alpha, setup_pose),
            Timeline::Attachment(t) => apply_attachment(t, skeleton, time, setup_pose, mixing_out),
            Timeline::DrawOrder(t) => apply_draw_order(t, skeleton, time, setup_pose, mixing_out),
            Timeline::Event(t) => {
                if let Some(out) = events {
                    collect_events(t, last_time, time, out);
                }
            }
        }
    }
}

/// Wraps an angle in degrees to `[-180, 180]`.
pub(crate) fn wrap_degrees(degrees: f32) -> f32 {
    degrees - ((degrees / 360.0 - 0.5).ceil()) * 360.0
}

fn sign(value: f32) -> f32 {
    if value < 0.0 {
        -1.0
    } else if value > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn apply_rotate(
    timeline: &RotateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    setup_pose: bool,
) {
    let Some(first) = timeline.frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }
    let Some(bone) = skeleton.bones.get_mut(timeline.bone_index) else {
        return;
    };
    let setup = skeleton.data.bones[timeline.bone_index].rotation;

    let r = sample_rotate(&timeline.frames, time);
    if setup_pose {
        bone.rotation = setup + wrap_degrees(r) * alpha;
    } else {
        bone.rotation += wrap_degrees(setup + r - bone.rotation) * alpha;
    }
}

/// Blends a rotate timeline toward its keyed angle while keeping the blend direction stable
/// across frames.
///
/// `state` holds `[total, last_diff]` pairs, one per timeline of the entry; `state_index` selects
/// the pair. A crossing of the 0 degree difference with a small previous step flips direction,
/// while a crossing after a full turn counts as another loop.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_rotate_mixed(
    timeline: &RotateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    setup_pose: bool,
    state: &mut [f32],
    state_index: usize,
    first_frame: bool,
) {
    if alpha == 1.0 {
        apply_rotate(timeline, skeleton, time, 1.0, setup_pose);
        return;
    }
    let Some(first) = timeline.frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }
    let base = state_index * 2;
    if base + 1 >= state.len() {
        apply_rotate(timeline, skeleton, time, alpha, setup_pose);
        return;
    }
    let Some(bone) = skeleton.bones.get_mut(timeline.bone_index) else {
        return;
    };
    let setup = skeleton.data.bones[timeline.bone_index].rotation;

    let r2 = wrap_degrees(setup + sample_rotate(&timeline.frames, time));
    let mut r1 = if setup_pose { setup } else { bone.rotation };

    let total;
    let mut diff = r2 - r1;
    if diff == 0.0 {
        if first_frame {
            state[base] = 0.0;
            total = 0.0;
        } else {
            total = state[base];
        }
    } else {
        diff = wrap_degrees(diff);
        let (mut last_total, last_diff) = if first_frame {
            (0.0, diff)
        } else {
            (state[base], state[base + 1])
        };
        let current = diff > 0.0;
        let mut dir = last_total >= 0.0;
        // Cross at 0, not 180.
        if sign(last_diff) != sign(diff) && last_diff.abs() <= 90.0 {
            if last_total.abs() > 180.0 {
                last_total += 360.0 * sign(last_total);
            }
            dir = current;
        }
        let mut t = diff + last_total - last_total % 360.0;
        if dir != current {
            t += 360.0 * sign(last_total);
        }
        state[base] = t;
        total = t;
    }
    state[base + 1] = diff;

    r1 += total * alpha;
    bone.rotation = wrap_degrees(r1);
}

fn apply_translate(
    timeline: &TranslateTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    setup_pose: bool,
) {
    let Some(first) = timeline.frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }
    let Some(bone) = skeleton.bones.get_mut(timeline.bone_index) else {
        return;
    };
    let data = &skeleton.data.bones[timeline.bone_index];

    let (x, y) = sample_vec2(&timeline.frames, time);
    if setup_pose {
        bone.x = data.x + x * alpha;
        bone.y = data.y + y * alpha;
    } else {
        bone.x += (data.x + x - bone.x) * alpha;
        bone.y += (data.y + y - bone.y) * alpha;
    }
}

fn apply_scale(
    timeline: &ScaleTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    setup_pose: bool,
    mixing_out: bool,
) {
    let Some(first) = timeline.frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }
    let Some(bone) = skeleton.bones.get_mut(timeline.bone_index) else {
        return;
    };
    let data = &skeleton.data.bones[timeline.bone_index];

    let (mx, my) = sample_vec2(&timeline.frames, time);
    let mut x = mx * data.scale_x;
    let mut y = my * data.scale_y;
    if alpha == 1.0 {
        bone.scale_x = x;
        bone.scale_y = y;
        return;
    }

    let (mut bx, mut by) = if setup_pose {
        (data.scale_x, data.scale_y)
    } else {
        (bone.scale_x, bone.scale_y)
    };
    // Mixing out keeps the sign of the pose being mixed from, otherwise the key's sign wins.
    if mixing_out {
        x = x.abs() * sign(bx);
        y = y.abs() * sign(by);
    } else {
        bx = bx.abs() * sign(x);
        by = by.abs() * sign(y);
    }
    bone.scale_x = bx + (x - bx) * alpha;
    bone.scale_y = by + (y - by) * alpha;
}

fn apply_shear(
    timeline: &ShearTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    alpha: f32,
    setup_pose: bool,
) {
    let Some(first) = timeline.frames.first() else {
        return;
    };
    if time < first.time {
        return;
    }
    let Some(bone) = skeleton.bones.get_mut(timeline.bone_index) else {
        return;
    };
    let data = &skeleton.data.bones[timeline.bone_index];

    let (x, y) = sample_vec2(&timeline.frames, time);
    if setup_pose {
        bone.shear_x = data.shear_x + x * alpha;
        bone.shear_y = data.shear_y + y * alpha;
    } else {
        bone.shear_x += (data.shear_x + x - bone.shear_x) * alpha;
        bone.shear_y += (data.shear_y + y - bone.shear_y) * alpha;
    }
}

fn apply_attachment(
    timeline: &AttachmentTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    setup_pose: bool,
    mixing_out: bool,
) {
    let slot_index = timeline.slot_index;
    if slot_index >= skeleton.slots.len() {
        return;
    }
    if mixing_out && setup_pose {
        let setup = skeleton.data.slots[slot_index].attachment.clone();
        skeleton.slots[slot_index].attachment = setup;
        return;
    }

    let index = timeline.frames.partition_point(|f| f.time <= time);
    if index == 0 {
        return;
    }
    skeleton.slots[slot_index].attachment = timeline.frames[index - 1].name.clone();
}

fn apply_draw_order(
    timeline: &DrawOrderTimeline,
    skeleton: &mut Skeleton,
    time: f32,
    setup_pose: bool,
    mixing_out: bool,
) {
    if mixing_out && setup_pose {
        skeleton.reset_draw_order();
        return;
    }

    let index = timeline.frames.partition_point(|f| f.time <= time);
    if index == 0 {
        return;
    }
    match &timeline.frames[index - 1].draw_order {
        None => skeleton.reset_draw_order(),
        Some(order) => {
            if order.len() == skeleton.slots.len() {
                skeleton.draw_order.clear();
                skeleton.draw_order.extend_from_slice(order);
            }
        }
    }
}

/// Collects events in `(last_time, time]`. When `last_time > time` the animation looped, so the
/// tail after `last_time` fires first and collection restarts at the beginning.
fn collect_events(timeline: &EventTimeline, mut last_time: f32, time: f32, out: &mut Vec<Event>) {
    let events = &timeline.events;
    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return;
    };

    if last_time > time {
        collect_events(timeline, last_time, f32::MAX, out);
        last_time = -1.0;
    } else if last_time >= last.time {
        return;
    }
    if time < first.time {
        return;
    }

    let start = if last_time < first.time {
        0
    } else {
        events.partition_point(|e| e.time <= last_time)
    };
    out.extend(
        events[start..]
            .iter()
            .take_while(|e| e.time <= time)
            .cloned(),
    );
}

fn sample_rotate(frames: &[RotateFrame], time: f32) -> f32 {
    let index = frames.partition_point(|f| f.time <= time);
    if index == 0 {
        return frames[0].angle;
    }
    if index >= frames.len() {
        return frames[frames.len() - 1].angle;
    }
    let prev = &frames[index - 1];
    let next = &frames[index];
    let percent = curve_percent(prev.curve, time, prev.time, next.time);
    // Shortest path between the two keys.
    let amount = wrap_degrees(next.angle - prev.angle);
    prev.angle + amount * percent
}

fn sample_vec2(frames: &[Vec2Frame], time: f32) -> (f32, f32) {
    let index = frames.partition_point(|f| f.time <= time);
    if index == 0 {
        let f = &frames[0];
        return (f.x, f.y);
    }
    if index >= frames.len() {
        let f = &frames[frames.len() - 1];
        return (f.x, f.y);
    }
    let prev = &frames[index - 1];
    let next = &frames[index];
    let percent = curve_percent(prev.curve, time, prev.time, next.time);
    (
        prev.x + (next.x - prev.x) * percent,
        prev.y + (next.y - prev.y) * percent,
    )
}

fn curve_percent(curve: Curve, time: f32, time1: f32, time2: f32) -> f32 {
    let denom = time2 - time1;
    if denom.abs() <= 1.0e-12 {
        return 1.0;
    }
    let t = ((time - time1) / denom).clamp(0.0, 1.0);
    match curve {
        Curve::Linear => t,
        Curve::Stepped => 0.0,
        Curve::Bezier { cx1, cy1, cx2, cy2 } => bezier_value(t, cx1, cy1, cx2, cy2),
    }
}

/// Samples a normalized bezier segment from `(0, 0)` to `(1, 1)` using 9 forward-differenced
/// points.
fn bezier_value(time: f32, cx1: f32, cy1: f32, cx2: f32, cy2: f32) -> f32 {
    const BEZIER_SIZE: usize = 18;

    let tmpx = (-cx1 * 2.0 + cx2) * 0.03;
    let tmpy = (-cy1 * 2.0 + cy2) * 0.03;
    let dddx = ((cx1 - cx2) * 3.0 + 1.0) * 0.006;
    let dddy = ((cy1 - cy2) * 3.0 + 1.0) * 0.006;
    let mut ddx = tmpx * 2.0 + dddx;
    let mut ddy = tmpy * 2.0 + dddy;
    let mut dx = cx1 * 0.3 + tmpx + dddx * 0.16666667;
    let mut dy = cy1 * 0.3 + tmpy + dddy * 0.16666667;

    let mut x = dx;
    let mut y = dy;

    let mut points = [0.0f32; BEZIER_SIZE];
    for i in (0..BEZIER_SIZE).step_by(2) {
        points[i] = x;
        points[i + 1] = y;
        dx += ddx;
        dy += ddy;
        ddx += dddx;
        ddy += dddy;
        x += dx;
        y += dy;
    }

    if points[0] > time {
        if points[0].abs() <= 1.0e-12 {
            return 0.0;
        }
        return time / points[0] * points[1];
    }

    for i in (2..BEZIER_SIZE).step_by(2) {
        if points[i] >= time {
            let x = points[i - 2];
            let y = points[i - 1];
            let denom = points[i] - x;
            if denom.abs() <= 1.0e-12 {
                return y;
            }
            return y + (time - x) / denom * (points[i + 1] - y);
        }
    }

    let x = points[BEZIER_SIZE - 2];
    let y = points[BEZIER_SIZE - 1];
    let denom = 1.0 - x;
    if denom.abs() <= 1.0e-12 {
        return y;
    }
    y + (time - x) / denom * (1.0 - y)
}
