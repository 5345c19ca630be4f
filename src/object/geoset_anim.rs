use bitflags::bitflags;
use cgmath::Vector3;

use super::{Animated, Timelines, TrackSlot};
use crate::error::StateError;
use crate::eval::PlaybackContext;
use crate::{Property, Value};

bitflags! {
    #[derive(Default)]
    pub struct GeosetAnimFlags: u32 {
        const DROP_SHADOW = 0x1;
        const USE_COLOR = 0x2;
    }
}

/// Fades and tints one geoset.
#[derive(Debug, Clone, PartialEq)]
pub struct GeosetAnimation {
    pub alpha: f32,
    pub flags: GeosetAnimFlags,
    /// Stored blue first, as in the file.
    pub color: Vector3<f32>,
    pub geoset_id: Option<u32>,
    pub timelines: Timelines,
}

impl Default for GeosetAnimation {
    fn default() -> Self {
        Self {
            alpha: 1.,
            flags: GeosetAnimFlags::empty(),
            color: Vector3::new(1., 1., 1.),
            geoset_id: None,
            timelines: Timelines::default(),
        }
    }
}

impl GeosetAnimation {
    pub(crate) const SLOTS: &'static [TrackSlot] = &[
        TrackSlot::new(b"KGAO", Property::Alpha, "Alpha"),
        TrackSlot::new(b"KGAC", Property::Color, "Color"),
    ];

    pub fn alpha_at(&self, ctx: &dyn PlaybackContext) -> Result<f32, StateError> {
        let value = self.sample(Property::Alpha, Value::Float(self.alpha), ctx)?;
        value
            .as_float()
            .ok_or_else(|| StateError::invalid("alpha track produced a non-float"))
    }

    pub fn color_at(&self, ctx: &dyn PlaybackContext) -> Result<Vector3<f32>, StateError> {
        let value = self.sample(Property::Color, Value::Vector3(self.color), ctx)?;
        value
            .as_vector3()
            .ok_or_else(|| StateError::invalid("color track produced a non-vector"))
    }
}

impl Animated for GeosetAnimation {
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
