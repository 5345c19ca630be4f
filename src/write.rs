//! MDX encoding. Every size field is computed from the bytes actually
//! emitted for its block.

use cgmath::Vector3;
use cookie_factory::bytes::{le_f32, le_i32, le_u32};
use cookie_factory::combinator::{cond, slice};
use cookie_factory::multi::all;
use cookie_factory::sequence::tuple;
use cookie_factory::{gen_simple, SerializeFn, WriteContext};
use log::warn;

use std::io::Write;

use crate::error::Result;
use crate::model::{Model, Sequence, UnknownChunk, MAGIC};
use crate::object::{
    written_tracks, EventObject, EventTrack, GeosetAnimation, Layer, Material, Node,
    TextureAnimation, Timelines, TrackSlot,
};
use crate::read::NAME_SIZE;
use crate::timeline::Timeline;
use crate::{Keyframe, Tag, Value};

/// Prefixes `body` with its byte count, the count field included.
fn sized<W: Write, F: SerializeFn<Vec<u8>>>(body: F) -> impl SerializeFn<W> {
    move |out: WriteContext<W>| {
        let bytes = gen_simple(&body, Vec::new())?;
        tuple((le_u32(bytes.len() as u32 + 4), slice(bytes)))(out)
    }
}

/// A top-level chunk. Its size counts the payload only.
fn chunk<W: Write, F: SerializeFn<Vec<u8>>>(tag: Tag, body: F) -> impl SerializeFn<W> {
    move |out: WriteContext<W>| {
        let bytes = gen_simple(&body, Vec::new())?;
        tuple((slice(tag.0), le_u32(bytes.len() as u32), slice(bytes)))(out)
    }
}

fn optional_id<W: Write>(id: Option<u32>) -> impl SerializeFn<W> {
    le_i32(id.map(|n| n as i32).unwrap_or(-1))
}

fn fixed_string<'a, W: Write + 'a>(s: &'a str, len: usize) -> impl SerializeFn<W> + 'a {
    if s.len() > len {
        warn!("truncating {:?} to {} bytes", s, len);
    }
    let bytes = &s.as_bytes()[..s.len().min(len)];
    tuple((slice(bytes), slice(vec![0u8; len - bytes.len()])))
}

fn vector3<W: Write>(v: Vector3<f32>) -> impl SerializeFn<W> {
    tuple((le_f32(v.x), le_f32(v.y), le_f32(v.z)))
}

fn value<W: Write>(v: Value) -> impl SerializeFn<W> {
    move |out: WriteContext<W>| match v {
        Value::Float(f) => le_f32(f)(out),
        Value::Vector3(v) => vector3(v)(out),
        Value::Quaternion(q) => {
            tuple((le_f32(q.v.x), le_f32(q.v.y), le_f32(q.v.z), le_f32(q.s)))(out)
        }
        Value::Integer(n) => le_u32(n)(out),
    }
}

fn keyframe<W: Write>(key: &Keyframe) -> impl SerializeFn<W> {
    let key = *key;
    move |out: WriteContext<W>| {
        let out = tuple((le_i32(key.time), value(key.value)))(out)?;
        match key.tangents {
            Some(t) => tuple((value(t.in_tan), value(t.out_tan)))(out),
            None => Ok(out),
        }
    }
}

impl Timeline {
    pub(crate) fn write<'a, W: Write + 'a>(&'a self, tag: Tag) -> impl SerializeFn<W> + 'a {
        tuple((
            slice(tag.0),
            le_u32(self.len() as u32),
            le_u32(self.interpolation().code()),
            optional_id(self.global_sequence()),
            all(self.iter().map(|k| keyframe(k))),
        ))
    }
}

fn tracks<'a, W: Write + 'a>(
    slots: &'static [TrackSlot],
    timelines: &'a Timelines,
) -> impl SerializeFn<W> + 'a {
    all(written_tracks(slots, timelines).map(|(slot, t)| t.write(slot.tag)))
}

impl Sequence {
    fn write<'a, W: Write + 'a>(&'a self) -> impl SerializeFn<W> + 'a {
        tuple((
            fixed_string(&self.name, NAME_SIZE),
            le_u32(self.start),
            le_u32(self.end),
            le_f32(self.move_speed),
            le_u32(self.flags.bits()),
            le_f32(self.rarity),
            le_u32(self.sync_point),
            le_f32(self.extent.bounds_radius),
            vector3(self.extent.min),
            vector3(self.extent.max),
        ))
    }
}

impl GeosetAnimation {
    fn write<'a, W: Write + 'a>(&'a self) -> impl SerializeFn<W> + 'a {
        sized(tuple((
            le_f32(self.alpha),
            le_u32(self.flags.bits()),
            vector3(self.color),
            optional_id(self.geoset_id),
            tracks(Self::SLOTS, &self.timelines),
        )))
    }
}

impl TextureAnimation {
    fn write<'a, W: Write + 'a>(&'a self) -> impl SerializeFn<W> + 'a {
        sized(tracks(Self::SLOTS, &self.timelines))
    }
}

impl Layer {
    fn write<'a, W: Write + 'a>(&'a self) -> impl SerializeFn<W> + 'a {
        sized(tuple((
            le_u32(self.filter_mode.code()),
            le_u32(self.shading.bits()),
            le_u32(self.texture_id),
            optional_id(self.texture_animation_id),
            le_u32(self.coord_id),
            le_f32(self.alpha),
            tracks(Self::SLOTS, &self.timelines),
        )))
    }
}

impl Material {
    fn write<'a, W: Write + 'a>(&'a self) -> impl SerializeFn<W> + 'a {
        sized(tuple((
            le_i32(self.priority_plane),
            le_u32(self.flags.bits()),
            slice(b"LAYS"),
            le_u32(self.layers.len() as u32),
            all(self.layers.iter().map(|l| l.write())),
        )))
    }
}

impl Node {
    fn write<'a, W: Write + 'a>(&'a self) -> impl SerializeFn<W> + 'a {
        sized(tuple((
            fixed_string(&self.name, NAME_SIZE),
            le_u32(self.object_id),
            optional_id(self.parent_id),
            le_u32(self.flags.bits()),
            tracks(Self::SLOTS, &self.timelines),
        )))
    }
}

impl EventTrack {
    fn write<'a, W: Write + 'a>(&'a self) -> impl SerializeFn<W> + 'a {
        tuple((
            slice(b"KEVT"),
            le_u32(self.frames.len() as u32),
            optional_id(self.global_sequence),
            all(self.frames.iter().map(|f| le_u32(*f))),
        ))
    }
}

impl EventObject {
    fn write<'a, W: Write + 'a>(&'a self) -> impl SerializeFn<W> + 'a {
        move |out: WriteContext<W>| {
            let out = self.node.write()(out)?;
            match &self.track {
                Some(track) => track.write()(out),
                None => Ok(out),
            }
        }
    }
}

impl UnknownChunk {
    fn write<'a, W: Write + 'a>(&'a self) -> impl SerializeFn<W> + 'a {
        tuple((
            slice(self.tag.0),
            le_u32(self.data.len() as u32),
            slice(&self.data),
        ))
    }
}

impl Model {
    fn write<'a, W: Write + 'a>(&'a self) -> impl SerializeFn<W> + 'a {
        tuple((
            slice(MAGIC.0),
            chunk(Tag::new(b"VERS"), le_u32(self.version)),
            cond(
                !self.sequences.is_empty(),
                chunk(
                    Tag::new(b"SEQS"),
                    all(self.sequences.iter().map(|s| s.write())),
                ),
            ),
            cond(
                !self.global_sequences.is_empty(),
                chunk(
                    Tag::new(b"GLBS"),
                    all(self.global_sequences.iter().map(|d| le_u32(*d))),
                ),
            ),
            cond(
                !self.materials.is_empty(),
                chunk(
                    Tag::new(b"MTLS"),
                    all(self.materials.iter().map(|m| m.write())),
                ),
            ),
            cond(
                !self.texture_animations.is_empty(),
                chunk(
                    Tag::new(b"TXAN"),
                    all(self.texture_animations.iter().map(|a| a.write())),
                ),
            ),
            cond(
                !self.geoset_animations.is_empty(),
                chunk(
                    Tag::new(b"GEOA"),
                    all(self.geoset_animations.iter().map(|a| a.write())),
                ),
            ),
            cond(
                !self.event_objects.is_empty(),
                chunk(
                    Tag::new(b"EVTS"),
                    all(self.event_objects.iter().map(|e| e.write())),
                ),
            ),
            all(self.unknown_chunks.iter().map(|c| c.write())),
        ))
    }

    /// Encodes the model in binary form. Known chunks come first, in a fixed
    /// order, followed by the unknown ones as they were read.
    pub fn to_mdx(&self) -> Result<Vec<u8>> {
        Ok(gen_simple(self.write(), Vec::new())?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{Extent, SequenceFlags};
    use crate::object::{Animated, FilterMode, GeosetAnimFlags, NodeFlags, ShadingFlags};
    use crate::{Interpolation, Property, Tangents};
    use cgmath::Quaternion;

    fn sample_model() -> Model {
        let mut model = Model::default();
        model.sequences.push(Sequence {
            name: "Stand".into(),
            start: 0,
            end: 1000,
            move_speed: 0.,
            flags: SequenceFlags::NON_LOOPING,
            rarity: 0.,
            sync_point: 0,
            extent: Extent {
                bounds_radius: 50.,
                min: Vector3::new(-10., -10., 0.),
                max: Vector3::new(10., 10., 40.),
            },
        });
        model.global_sequences.push(500);

        let mut layer = Layer {
            filter_mode: FilterMode::Blend,
            shading: ShadingFlags::TWO_SIDED | ShadingFlags::UNSHADED,
            texture_animation_id: Some(0),
            ..Default::default()
        };
        let mut flipbook = Timeline::new(Property::TextureId, Interpolation::DontInterp);
        flipbook.insert(0, Value::Integer(0), None).unwrap();
        flipbook.insert(250, Value::Integer(1), None).unwrap();
        layer.timelines.insert(flipbook);
        model.materials.push(Material {
            layers: vec![layer, Layer::default()],
            ..Default::default()
        });

        let mut spin = TextureAnimation::default();
        let mut rotation = Timeline::new(Property::Rotation, Interpolation::Linear)
            .with_global_sequence(Some(0));
        rotation
            .insert(0, Property::Rotation.identity(), None)
            .unwrap();
        rotation
            .insert(500, Value::Quaternion(Quaternion::new(0., 0., 0., 1.)), None)
            .unwrap();
        spin.timelines.insert(rotation);
        model.texture_animations.push(spin);

        let mut fade = GeosetAnimation {
            flags: GeosetAnimFlags::DROP_SHADOW,
            geoset_id: Some(0),
            ..Default::default()
        };
        let mut alpha = Timeline::new(Property::Alpha, Interpolation::Hermite);
        let flat = Tangents::new(Value::Float(0.), Value::Float(0.));
        alpha.insert(0, Value::Float(1.), Some(flat)).unwrap();
        alpha.insert(1000, Value::Float(0.), Some(flat)).unwrap();
        fade.timelines.insert(alpha);
        model.geoset_animations.push(fade);

        model.event_objects.push(EventObject {
            node: Node {
                name: "SNDxStep".into(),
                object_id: 3,
                parent_id: Some(0),
                flags: NodeFlags::EVENT_OBJECT,
                ..Default::default()
            },
            track: Some(EventTrack {
                global_sequence: None,
                frames: vec![100, 600],
            }),
        });
        model.event_objects.push(EventObject::default());
        model.unknown_chunks.push(UnknownChunk {
            tag: Tag::new(b"TEXS"),
            data: vec![9; 12],
        });
        model
    }

    #[test]
    fn binary_round_trip() {
        let model = sample_model();
        let bytes = model.to_mdx().unwrap();
        let decoded = Model::from_mdx(&bytes).unwrap();
        assert_eq!(decoded, model);
        assert_eq!(decoded.to_mdx().unwrap(), bytes);
    }

    #[test]
    fn sizes_follow_content() {
        let mut anim = GeosetAnimation::default();
        let empty = gen_simple(anim.write(), Vec::new()).unwrap();
        assert_eq!(empty.len(), 28);
        assert_eq!(empty[..4], 28u32.to_le_bytes());

        let mut alpha = Timeline::new(Property::Alpha, Interpolation::Linear);
        alpha.insert(0, Value::Float(1.), None).unwrap();
        anim.timelines_mut().insert(alpha);
        let one_key = gen_simple(anim.write(), Vec::new()).unwrap();
        assert_eq!(one_key.len(), 28 + 16 + 8);
        assert_eq!(one_key[..4], 52u32.to_le_bytes());
        assert_eq!(&one_key[28..32], b"KGAO");
    }

    #[test]
    fn empty_tracks_are_not_written() {
        let mut anim = GeosetAnimation::default();
        anim.timelines
            .insert(Timeline::new(Property::Color, Interpolation::Linear));
        let bytes = gen_simple(anim.write(), Vec::new()).unwrap();
        assert_eq!(bytes.len(), 28);
    }

    #[test]
    fn chunk_sizes_exclude_header() {
        let model = Model::default();
        let bytes = model.to_mdx().unwrap();
        assert_eq!(&bytes[..8], b"MDLXVERS");
        assert_eq!(bytes[8..12], 4u32.to_le_bytes());
        assert_eq!(bytes[12..16], 800u32.to_le_bytes());
        assert_eq!(bytes.len(), 16);
    }

    #[test]
    fn long_names_are_truncated() {
        let node = Node {
            name: "x".repeat(100),
            ..Default::default()
        };
        let bytes = gen_simple(node.write(), Vec::new()).unwrap();
        assert_eq!(bytes.len(), 4 + NAME_SIZE + 12);
    }
}
