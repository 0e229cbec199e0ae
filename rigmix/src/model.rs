use crate::Error;
use std::collections::HashMap;
use std::sync::Arc;

pub const EMPTY_ANIMATION_NAME: &str = "<empty>";

#[derive(Clone, Debug)]
pub struct BoneData {
    pub name: String,
    pub parent: Option<usize>,
    pub length: f32,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,
}

impl BoneData {
    /// A bone at the parent's origin with identity scale.
    pub fn new(name: impl Into<String>, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            parent,
            length: 0.0,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            shear_x: 0.0,
            shear_y: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SlotData {
    pub name: String,
    pub bone: usize,
    /// Setup pose attachment name.
    pub attachment: Option<String>,
}

/// A user event fired by an event timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub time: f32,
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string: String,
}

impl Event {
    pub fn new(time: f32, name: impl Into<String>) -> Self {
        Self {
            time,
            name: name.into(),
            int_value: 0,
            float_value: 0.0,
            string: String::new(),
        }
    }
}

/// Interpolation used between a keyframe and the next one.
///
/// Bezier control points are normalized to the segment: `(0, 0)` is the keyframe and `(1, 1)` the
/// next keyframe.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub enum Curve {
    #[default]
    Linear,
    Stepped,
    Bezier {
        cx1: f32,
        cy1: f32,
        cx2: f32,
        cy2: f32,
    },
}

#[derive(Clone, Debug)]
pub struct RotateFrame {
    pub time: f32,
    pub angle: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct Vec2Frame {
    pub time: f32,
    pub x: f32,
    pub y: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
pub struct AttachmentFrame {
    pub time: f32,
    pub name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DrawOrderFrame {
    pub time: f32,
    /// Setup slot indices in draw order, or `None` for the setup order.
    pub draw_order: Option<Vec<usize>>,
}

#[derive(Clone, Debug)]
pub struct RotateTimeline {
    pub bone_index: usize,
    pub frames: Vec<RotateFrame>,
}

#[derive(Clone, Debug)]
pub struct TranslateTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
pub struct ScaleTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
pub struct ShearTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
pub struct AttachmentTimeline {
    pub slot_index: usize,
    pub frames: Vec<AttachmentFrame>,
}

#[derive(Clone, Debug)]
pub struct DrawOrderTimeline {
    pub frames: Vec<DrawOrderFrame>,
}

/// Events keyed by their `time`, sorted ascending.
#[derive(Clone, Debug)]
pub struct EventTimeline {
    pub events: Vec<Event>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TimelineKind {
    Rotate,
    Translate,
    Scale,
    Shear,
    Attachment,
    DrawOrder,
    Event,
}

#[derive(Clone, Debug)]
pub enum Timeline {
    Rotate(RotateTimeline),
    Translate(TranslateTimeline),
    Scale(ScaleTimeline),
    Shear(ShearTimeline),
    Attachment(AttachmentTimeline),
    DrawOrder(DrawOrderTimeline),
    Event(EventTimeline),
}

impl Timeline {
    pub fn kind(&self) -> TimelineKind {
        match self {
            Timeline::Rotate(_) => TimelineKind::Rotate,
            Timeline::Translate(_) => TimelineKind::Translate,
            Timeline::Scale(_) => TimelineKind::Scale,
            Timeline::Shear(_) => TimelineKind::Shear,
            Timeline::Attachment(_) => TimelineKind::Attachment,
            Timeline::DrawOrder(_) => TimelineKind::DrawOrder,
            Timeline::Event(_) => TimelineKind::Event,
        }
    }

    /// Identifies the skeleton property this timeline writes. Two timelines with the same id
    /// compete for the same value when animations are layered or mixed.
    pub fn property_id(&self) -> u32 {
        let target = match self {
            Timeline::Rotate(t) => t.bone_index,
            Timeline::Translate(t) => t.bone_index,
            Timeline::Scale(t) => t.bone_index,
            Timeline::Shear(t) => t.bone_index,
            Timeline::Attachment(t) => t.slot_index,
            Timeline::DrawOrder(_) | Timeline::Event(_) => 0,
        };
        ((self.kind() as u32) << 24) | (target as u32 & 0x00ff_ffff)
    }

    fn bone_index(&self) -> Option<usize> {
        match self {
            Timeline::Rotate(t) => Some(t.bone_index),
            Timeline::Translate(t) => Some(t.bone_index),
            Timeline::Scale(t) => Some(t.bone_index),
            Timeline::Shear(t) => Some(t.bone_index),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Animation {
    pub name: String,
    pub timelines: Vec<Timeline>,
    pub duration: f32,
}

impl Animation {
    pub fn new(name: impl Into<String>, timelines: Vec<Timeline>, duration: f32) -> Self {
        Self {
            name: name.into(),
            timelines,
            duration,
        }
    }

    /// The zero-timeline animation used to mix a track back to the setup pose.
    pub fn empty() -> Self {
        Self::new(EMPTY_ANIMATION_NAME, Vec::new(), 0.0)
    }
}

#[derive(Clone, Debug)]
pub struct SkeletonData {
    pub bones: Vec<BoneData>,
    pub slots: Vec<SlotData>,
    pub animations: Vec<Arc<Animation>>,
    animation_index: HashMap<String, usize>,
}

impl SkeletonData {
    /// Validates bone parents and timeline targets, then indexes animations by name.
    pub fn new(
        bones: Vec<BoneData>,
        slots: Vec<SlotData>,
        animations: Vec<Animation>,
    ) -> Result<Arc<Self>, Error> {
        for (i, bone) in bones.iter().enumerate() {
            if bone.parent.is_some_and(|p| p >= i) {
                return Err(Error::InvalidValue {
                    message: format!("bone '{}' must come after its parent", bone.name),
                });
            }
        }
        for slot in &slots {
            if slot.bone >= bones.len() {
                return Err(Error::InvalidValue {
                    message: format!("slot '{}' references missing bone {}", slot.name, slot.bone),
                });
            }
        }
        for animation in &animations {
            for timeline in &animation.timelines {
                let bone_ok = timeline.bone_index().is_none_or(|b| b < bones.len());
                let slot_ok = match timeline {
                    Timeline::Attachment(t) => t.slot_index < slots.len(),
                    Timeline::DrawOrder(t) => t.frames.iter().all(|f| {
                        f.draw_order.as_ref().is_none_or(|order| {
                            order.len() == slots.len() && order.iter().all(|&s| s < slots.len())
                        })
                    }),
                    _ => true,
                };
                if !bone_ok || !slot_ok {
                    return Err(Error::InvalidValue {
                        message: format!(
                            "animation '{}' has a {:?} timeline with an out of range target",
                            animation.name,
                            timeline.kind()
                        ),
                    });
                }
            }
        }

        let animation_index = animations
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.clone(), i))
            .collect();
        Ok(Arc::new(Self {
            bones,
            slots,
            animations: animations.into_iter().map(Arc::new).collect(),
            animation_index,
        }))
    }

    pub fn animation(&self, name: &str) -> Option<&Arc<Animation>> {
        let index = *self.animation_index.get(name)?;
        self.animations.get(index)
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }
}
