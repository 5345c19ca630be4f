use bitflags::bitflags;

use super::{Animated, Timelines, TrackSlot};
use crate::error::StateError;
use crate::eval::PlaybackContext;
use crate::{Property, Value};

bitflags! {
    #[derive(Default)]
    pub struct MaterialFlags: u32 {
        const CONSTANT_COLOR = 0x1;
        const SORT_PRIMS_NEAR_Z = 0x8;
        const SORT_PRIMS_FAR_Z = 0x10;
        const FULL_RESOLUTION = 0x20;
    }
}

impl MaterialFlags {
    pub(crate) const KEYWORDS: &'static [(&'static str, MaterialFlags)] = &[
        ("ConstantColor", MaterialFlags::CONSTANT_COLOR),
        ("SortPrimsNearZ", MaterialFlags::SORT_PRIMS_NEAR_Z),
        ("SortPrimsFarZ", MaterialFlags::SORT_PRIMS_FAR_Z),
        ("FullResolution", MaterialFlags::FULL_RESOLUTION),
    ];
}

bitflags! {
    #[derive(Default)]
    pub struct ShadingFlags: u32 {
        const UNSHADED = 0x1;
        const SPHERE_ENV_MAP = 0x2;
        const TWO_SIDED = 0x10;
        const UNFOGGED = 0x20;
        const NO_DEPTH_TEST = 0x40;
        const NO_DEPTH_SET = 0x80;
    }
}

impl ShadingFlags {
    pub(crate) const KEYWORDS: &'static [(&'static str, ShadingFlags)] = &[
        ("Unshaded", ShadingFlags::UNSHADED),
        ("SphereEnvMap", ShadingFlags::SPHERE_ENV_MAP),
        ("TwoSided", ShadingFlags::TWO_SIDED),
        ("Unfogged", ShadingFlags::UNFOGGED),
        ("NoDepthTest", ShadingFlags::NO_DEPTH_TEST),
        ("NoDepthSet", ShadingFlags::NO_DEPTH_SET),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    None,
    Transparent,
    Blend,
    Additive,
    AddAlpha,
    Modulate,
    Modulate2x,
}

impl Default for FilterMode {
    fn default() -> Self {
        FilterMode::None
    }
}

impl FilterMode {
    const ALL: [FilterMode; 7] = [
        FilterMode::None,
        FilterMode::Transparent,
        FilterMode::Blend,
        FilterMode::Additive,
        FilterMode::AddAlpha,
        FilterMode::Modulate,
        FilterMode::Modulate2x,
    ];

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.keyword() == word)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            FilterMode::None => "None",
            FilterMode::Transparent => "Transparent",
            FilterMode::Blend => "Blend",
            FilterMode::Additive => "Additive",
            FilterMode::AddAlpha => "AddAlpha",
            FilterMode::Modulate => "Modulate",
            FilterMode::Modulate2x => "Modulate2x",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Material {
    pub priority_plane: i32,
    pub flags: MaterialFlags,
    pub layers: Vec<Layer>,
}

/// One texturing pass of a material.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub filter_mode: FilterMode,
    pub shading: ShadingFlags,
    pub texture_id: u32,
    pub texture_animation_id: Option<u32>,
    pub coord_id: u32,
    pub alpha: f32,
    pub timelines: Timelines,
}

impl Default for Layer {
    fn default() -> Self {
        Self {
            filter_mode: FilterMode::None,
            shading: ShadingFlags::empty(),
            texture_id: 0,
            texture_animation_id: None,
            coord_id: 0,
            alpha: 1.,
            timelines: Timelines::default(),
        }
    }
}

impl Layer {
    pub(crate) const SLOTS: &'static [TrackSlot] = &[
        TrackSlot::new(b"KMTA", Property::Alpha, "Alpha"),
        TrackSlot::new(b"KMTF", Property::TextureId, "TextureID"),
    ];

    pub fn alpha_at(&self, ctx: &dyn PlaybackContext) -> Result<f32, StateError> {
        self.sample(Property::Alpha, Value::Float(self.alpha), ctx)?
            .as_float()
            .ok_or_else(|| StateError::invalid("alpha track produced a non-float"))
    }

    /// Texture shown at this point of playback. Flipbook tracks step between
    /// ids and never blend.
    pub fn texture_id_at(&self, ctx: &dyn PlaybackContext) -> Result<u32, StateError> {
        self.sample(Property::TextureId, Value::Integer(self.texture_id), ctx)?
            .as_integer()
            .ok_or_else(|| StateError::invalid("texture track produced a non-integer"))
    }
}

impl Animated for Layer {
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
