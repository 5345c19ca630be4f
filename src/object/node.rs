use bitflags::bitflags;
use cgmath::{Quaternion, Vector3};

use super::texture_anim::vector;
use super::{Animated, Timelines, TrackSlot};
use crate::error::StateError;
use crate::eval::PlaybackContext;
use crate::Property;

bitflags! {
    #[derive(Default)]
    pub struct NodeFlags: u32 {
        const DONT_INHERIT_TRANSLATION = 0x1;
        const DONT_INHERIT_ROTATION = 0x2;
        const DONT_INHERIT_SCALING = 0x4;
        const BILLBOARDED = 0x8;
        const BILLBOARDED_LOCK_X = 0x10;
        const BILLBOARDED_LOCK_Y = 0x20;
        const BILLBOARDED_LOCK_Z = 0x40;
        const CAMERA_ANCHORED = 0x80;
        const BONE = 0x100;
        const LIGHT = 0x200;
        const EVENT_OBJECT = 0x400;
        const ATTACHMENT = 0x800;
        const PARTICLE_EMITTER = 0x1000;
        const COLLISION_SHAPE = 0x2000;
        const RIBBON_EMITTER = 0x4000;
        const UNSHADED_OR_EMITTER_USES_MDL = 0x8000;
        const SORT_PRIMS_FAR_Z_OR_EMITTER_USES_TGA = 0x10000;
        const LINE_EMITTER = 0x20000;
        const UNFOGGED = 0x40000;
        const MODEL_SPACE = 0x80000;
        const XY_QUAD = 0x100000;
    }
}

impl NodeFlags {
    /// Bits spelled out as bare keywords in text form. The inherit bits are
    /// written inside a `DontInherit { .. }` block instead.
    pub(crate) const KEYWORDS: &'static [(&'static str, NodeFlags)] = &[
        ("Billboarded", NodeFlags::BILLBOARDED),
        ("BillboardedLockX", NodeFlags::BILLBOARDED_LOCK_X),
        ("BillboardedLockY", NodeFlags::BILLBOARDED_LOCK_Y),
        ("BillboardedLockZ", NodeFlags::BILLBOARDED_LOCK_Z),
        ("CameraAnchored", NodeFlags::CAMERA_ANCHORED),
    ];

    pub(crate) const INHERIT_KEYWORDS: &'static [(&'static str, NodeFlags)] = &[
        ("Translation", NodeFlags::DONT_INHERIT_TRANSLATION),
        ("Rotation", NodeFlags::DONT_INHERIT_ROTATION),
        ("Scaling", NodeFlags::DONT_INHERIT_SCALING),
    ];
}

/// Shared header of every scene-graph object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub name: String,
    pub object_id: u32,
    pub parent_id: Option<u32>,
    pub flags: NodeFlags,
    pub timelines: Timelines,
}

impl Node {
    pub(crate) const SLOTS: &'static [TrackSlot] = &[
        TrackSlot::new(b"KGTR", Property::Translation, "Translation"),
        TrackSlot::new(b"KGRT", Property::Rotation, "Rotation"),
        TrackSlot::new(b"KGSC", Property::Scaling, "Scaling"),
    ];

    pub fn translation_at(&self, ctx: &dyn PlaybackContext) -> Result<Vector3<f32>, StateError> {
        vector(self, Property::Translation, ctx)
    }

    pub fn rotation_at(&self, ctx: &dyn PlaybackContext) -> Result<Quaternion<f32>, StateError> {
        self.sample(Property::Rotation, Property::Rotation.identity(), ctx)?
            .as_quaternion()
            .ok_or_else(|| StateError::invalid("rotation track produced a non-quaternion"))
    }

    pub fn scaling_at(&self, ctx: &dyn PlaybackContext) -> Result<Vector3<f32>, StateError> {
        vector(self, Property::Scaling, ctx)
    }
}

impl Animated for Node {
    fn slots(&self) -> &'static [TrackSlot] {
        Self::SLOTS
    }

    fn timelines(&self) -> &Timelines {
        &self.timelines
    }

    fn timelines_mut(&mut self) -> &mut Timelines {
        &mut self.timelines
    }
}

/// Frames at which an event object fires.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTrack {
    pub global_sequence: Option<u32>,
    pub frames: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventObject {
    pub node: Node,
    pub track: Option<EventTrack>,
}

impl Default for EventObject {
    fn default() -> Self {
        Self {
            node: Node {
                flags: NodeFlags::EVENT_OBJECT,
                ..Default::default()
            },
            track: None,
        }
    }
}

impl EventObject {
    /// Frames of the event track falling inside `[start, end]`.
    pub fn frames_between(&self, start: u32, end: u32) -> impl Iterator<Item = u32> + '_ {
        self.track
            .iter()
            .flat_map(|t| t.frames.iter().copied())
            .filter(move |f| *f >= start && *f <= end)
    }
}

impl Animated for EventObject {
    fn slots(&self) -> &'static [TrackSlot] {
        Node::SLOTS
    }

    fn timelines(&self) -> &Timelines {
        &self.node.timelines
    }

    fn timelines_mut(&mut self) -> &mut Timelines {
        &mut self.node.timelines
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Clip, Interpolation, Playback, Timeline, Value};

    #[test]
    fn node_defaults_to_rest_pose() {
        let node = Node::default();
        let ctx = Playback::new(Some(Clip { start: 0, end: 100 }), vec![]).at(40);
        assert_eq!(node.translation_at(&ctx).unwrap(), Vector3::new(0., 0., 0.));
        assert_eq!(node.scaling_at(&ctx).unwrap(), Vector3::new(1., 1., 1.));
        assert_eq!(node.rotation_at(&ctx).unwrap(), crate::math::QUAT_IDENTITY);
    }

    #[test]
    fn node_translation_follows_track() {
        let mut node = Node::default();
        let mut t = Timeline::new(Property::Translation, Interpolation::Linear);
        t.insert(0, Value::Vector3(Vector3::new(0., 0., 0.)), None)
            .unwrap();
        t.insert(100, Value::Vector3(Vector3::new(10., 0., -20.)), None)
            .unwrap();
        node.timelines.insert(t);
        let ctx = Playback::new(Some(Clip { start: 0, end: 100 }), vec![]).at(50);
        assert_eq!(node.translation_at(&ctx).unwrap(), Vector3::new(5., 0., -10.));
    }

    #[test]
    fn event_frames_in_range() {
        let event = EventObject {
            track: Some(EventTrack {
                global_sequence: None,
                frames: vec![10, 120, 300],
            }),
            ..Default::default()
        };
        assert!(event.node.flags.contains(NodeFlags::EVENT_OBJECT));
        assert_eq!(event.frames_between(100, 300).collect::<Vec<_>>(), [120, 300]);
        assert_eq!(EventObject::default().frames_between(0, 1000).count(), 0);
    }
}
