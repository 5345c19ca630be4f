use cgmath::{Quaternion, Vector3};

use super::{Animated, Timelines, TrackSlot};
use crate::error::StateError;
use crate::eval::PlaybackContext;
use crate::Property;

/// Moves texture coordinates of the layers referencing it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureAnimation {
    pub timelines: Timelines,
}

impl TextureAnimation {
    pub(crate) const SLOTS: &'static [TrackSlot] = &[
        TrackSlot::new(b"KTAT", Property::Translation, "Translation"),
        TrackSlot::new(b"KTAR", Property::Rotation, "Rotation"),
        TrackSlot::new(b"KTAS", Property::Scaling, "Scaling"),
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

pub(super) fn vector(
    animated: &dyn Animated,
    property: Property,
    ctx: &dyn PlaybackContext,
) -> Result<Vector3<f32>, StateError> {
    animated
        .sample(property, property.identity(), ctx)?
        .as_vector3()
        .ok_or_else(|| StateError::invalid(format!("{:?} track produced a non-vector", property)))
}

impl Animated for TextureAnimation {
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
