//! Keyframed animation timelines for MDX/MDL models, their evaluator, and a
//! codec for both the binary (MDX) and text (MDL) form of the format.

use cgmath::{Quaternion, Vector3};

use std::fmt;

pub mod archive;
pub mod error;
pub mod eval;
pub mod math;
pub mod model;
pub mod object;
pub mod read;
pub mod text;
pub mod timeline;
mod write;

pub use archive::{load_model, Archive, ArchiveStack, DirectoryArchive, MemoryArchive};
pub use error::{Error, FormatError, Result, StateError};
pub use eval::{Clip, GlobalSequenceState, Playback, PlaybackContext};
pub use model::Model;
pub use timeline::{Axis, Timeline};

/// Four ASCII bytes identifying a chunk or a track. Not null-terminated.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Tag(*bytes)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Float,
    Vector3,
    Quaternion,
    Integer,
}

impl ValueKind {
    /// Number of 4-byte words a value of this kind occupies in a track.
    pub fn width(self) -> usize {
        match self {
            ValueKind::Float | ValueKind::Integer => 1,
            ValueKind::Vector3 => 3,
            ValueKind::Quaternion => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Float(f32),
    Vector3(Vector3<f32>),
    Quaternion(Quaternion<f32>),
    Integer(u32),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Float(_) => ValueKind::Float,
            Value::Vector3(_) => ValueKind::Vector3,
            Value::Quaternion(_) => ValueKind::Quaternion,
            Value::Integer(_) => ValueKind::Integer,
        }
    }

    /// The zero of a kind. Used to seed tangents that did not exist before.
    pub fn empty(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Float => Value::Float(0.),
            ValueKind::Vector3 => Value::Vector3(Vector3::new(0., 0., 0.)),
            ValueKind::Quaternion => Value::Quaternion(math::QUAT_IDENTITY),
            ValueKind::Integer => Value::Integer(0),
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_vector3(&self) -> Option<Vector3<f32>> {
        match self {
            Value::Vector3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_quaternion(&self) -> Option<Quaternion<f32>> {
        match self {
            Value::Quaternion(q) => Some(*q),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<u32> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

/// Which property a timeline animates. Fixes the value kind of the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Property {
    Alpha,
    Translation,
    Rotation,
    Scaling,
    Color,
    TextureId,
    /// Extraneous float scalars such as light intensity.
    Other,
}

impl Property {
    pub fn value_kind(self) -> ValueKind {
        match self {
            Property::Alpha | Property::Other => ValueKind::Float,
            Property::Translation | Property::Scaling | Property::Color => ValueKind::Vector3,
            Property::Rotation => ValueKind::Quaternion,
            Property::TextureId => ValueKind::Integer,
        }
    }

    /// The value a property takes when no animation data applies.
    pub fn identity(self) -> Value {
        match self {
            Property::Alpha | Property::Other => Value::Float(1.),
            Property::Translation => Value::Vector3(Vector3::new(0., 0., 0.)),
            Property::Scaling | Property::Color => Value::Vector3(Vector3::new(1., 1., 1.)),
            Property::Rotation => Value::Quaternion(math::QUAT_IDENTITY),
            Property::TextureId => Value::Integer(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpolation {
    DontInterp,
    Linear,
    Hermite,
    Bezier,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::DontInterp
    }
}

impl Interpolation {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::DontInterp),
            1 => Some(Self::Linear),
            2 => Some(Self::Hermite),
            3 => Some(Self::Bezier),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::DontInterp => 0,
            Self::Linear => 1,
            Self::Hermite => 2,
            Self::Bezier => 3,
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "DontInterp" => Some(Self::DontInterp),
            "Linear" => Some(Self::Linear),
            "Hermite" => Some(Self::Hermite),
            "Bezier" => Some(Self::Bezier),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::DontInterp => "DontInterp",
            Self::Linear => "Linear",
            Self::Hermite => "Hermite",
            Self::Bezier => "Bezier",
        }
    }

    pub fn has_tangents(self) -> bool {
        match self {
            Self::Hermite | Self::Bezier => true,
            Self::DontInterp | Self::Linear => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tangents {
    pub in_tan: Value,
    pub out_tan: Value,
}

impl Tangents {
    pub fn new(in_tan: Value, out_tan: Value) -> Self {
        Self { in_tan, out_tan }
    }

    pub(crate) fn empty(kind: ValueKind) -> Self {
        Self::new(Value::empty(kind), Value::empty(kind))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub time: i32,
    pub value: Value,
    pub tangents: Option<Tangents>,
}

impl Keyframe {
    pub fn new(time: i32, value: Value) -> Self {
        Self {
            time,
            value,
            tangents: None,
        }
    }

    pub fn with_tangents(time: i32, value: Value, in_tan: Value, out_tan: Value) -> Self {
        Self {
            time,
            value,
            tangents: Some(Tangents::new(in_tan, out_tan)),
        }
    }
}
