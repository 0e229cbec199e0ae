use crate::SkeletonData;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct Bone {
    data_index: usize,
    parent: Option<usize>,

    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub shear_x: f32,
    pub shear_y: f32,

    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub world_x: f32,
    pub world_y: f32,
}

impl Bone {
    pub fn data_index(&self) -> usize {
        self.data_index
    }

    pub fn parent_index(&self) -> Option<usize> {
        self.parent
    }

    pub fn world_rotation_x(&self) -> f32 {
        self.c.atan2(self.a).to_degrees()
    }
}

#[derive(Clone, Debug)]
pub struct Slot {
    data_index: usize,
    pub bone: usize,
    pub attachment: Option<String>,
}

impl Slot {
    pub fn data_index(&self) -> usize {
        self.data_index
    }
}

/// The pose target animations are applied to.
///
/// Only local transforms are written by timelines. World transforms are refreshed on demand by
/// [`Skeleton::update_world_transform`].
#[derive(Clone, Debug)]
pub struct Skeleton {
    pub data: Arc<SkeletonData>,
    pub bones: Vec<Bone>,
    pub slots: Vec<Slot>,
    pub draw_order: Vec<usize>,
    pub x: f32,
    pub y: f32,
    pub flip_x: bool,
    pub flip_y: bool,
    /// Treat +y as pointing down when computing world transforms.
    pub y_down: bool,
}

impl Skeleton {
    pub fn new(data: Arc<SkeletonData>) -> Self {
        let bones = data
            .bones
            .iter()
            .enumerate()
            .map(|(i, b)| Bone {
                data_index: i,
                parent: b.parent,
                x: b.x,
                y: b.y,
                rotation: b.rotation,
                scale_x: b.scale_x,
                scale_y: b.scale_y,
                shear_x: b.shear_x,
                shear_y: b.shear_y,
                a: 1.0,
                b: 0.0,
                c: 0.0,
                d: 1.0,
                world_x: 0.0,
                world_y: 0.0,
            })
            .collect();
        let slots = data
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| Slot {
                data_index: i,
                bone: s.bone,
                attachment: s.attachment.clone(),
            })
            .collect();
        let draw_order = (0..data.slots.len()).collect();

        Self {
            data,
            bones,
            slots,
            draw_order,
            x: 0.0,
            y: 0.0,
            flip_x: false,
            flip_y: false,
            y_down: false,
        }
    }

    pub fn set_to_setup_pose(&mut self) {
        self.set_bones_to_setup_pose();
        self.set_slots_to_setup_pose();
    }

    pub fn set_bones_to_setup_pose(&mut self) {
        for bone in &mut self.bones {
            let data = &self.data.bones[bone.data_index];
            bone.x = data.x;
            bone.y = data.y;
            bone.rotation = data.rotation;
            bone.scale_x = data.scale_x;
            bone.scale_y = data.scale_y;
            bone.shear_x = data.shear_x;
            bone.shear_y = data.shear_y;
        }
    }

    pub fn set_slots_to_setup_pose(&mut self) {
        for slot in &mut self.slots {
            slot.attachment = self.data.slots[slot.data_index].attachment.clone();
        }
        self.reset_draw_order();
    }

    pub(crate) fn reset_draw_order(&mut self) {
        self.draw_order.clear();
        self.draw_order.extend(0..self.slots.len());
    }

    pub fn find_bone(&self, name: &str) -> Option<&Bone> {
        self.data.find_bone(name).and_then(|i| self.bones.get(i))
    }

    pub fn find_slot(&self, name: &str) -> Option<&Slot> {
        self.data.find_slot(name).and_then(|i| self.slots.get(i))
    }

    /// Recomputes every bone's world transform from its local transform. Bones are stored
    /// parent-first, so a single forward pass is enough.
    pub fn update_world_transform(&mut self) {
        for i in 0..self.bones.len() {
            let parent = self.bones[i].parent.map(|p| {
                let p = &self.bones[p];
                (p.a, p.b, p.c, p.d, p.world_x, p.world_y)
            });
            let (flip_x, flip_y) = (self.flip_x, self.flip_y != self.y_down);
            let (skeleton_x, skeleton_y) = (self.x, self.y);

            let bone = &mut self.bones[i];
            let rotation_y = bone.rotation + 90.0 + bone.shear_y;
            let (sin_x, cos_x) = (bone.rotation + bone.shear_x).to_radians().sin_cos();
            let (sin_y, cos_y) = rotation_y.to_radians().sin_cos();
            let mut la = cos_x * bone.scale_x;
            let mut lb = cos_y * bone.scale_y;
            let mut lc = sin_x * bone.scale_x;
            let mut ld = sin_y * bone.scale_y;

            match parent {
                None => {
                    let (mut x, mut y) = (bone.x, bone.y);
                    if flip_x {
                        x = -x;
                        la = -la;
                        lb = -lb;
                    }
                    if flip_y {
                        y = -y;
                        lc = -lc;
                        ld = -ld;
                    }
                    bone.a = la;
                    bone.b = lb;
                    bone.c = lc;
                    bone.d = ld;
                    bone.world_x = x + skeleton_x;
                    bone.world_y = y + skeleton_y;
                }
                Some((pa, pb, pc, pd, px, py)) => {
                    bone.world_x = pa * bone.x + pb * bone.y + px;
                    bone.world_y = pc * bone.x + pd * bone.y + py;
                    bone.a = pa * la + pb * lc;
                    bone.b = pa * lb + pb * ld;
                    bone.c = pc * la + pd * lc;
                    bone.d = pc * lb + pd * ld;
                }
            }
        }
    }
}
