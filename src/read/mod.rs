//! MDX decoding.
//!
//! Chunks are dispatched through a registry keyed by their tag. Objects and
//! tracks implement [`Deserialize`], or [`DeserializeContext`] when they need
//! to know which slot they fill.

use lazy_static::lazy_static;
use log::{debug, trace, warn};
use nom::multi::count;
use nom::number::complete::{le_f32, le_i32, le_u32};

use std::collections::HashMap;

use crate::error::FormatError;
use crate::model::{Extent, Model, Sequence, SequenceFlags, UnknownChunk, MAGIC};
use crate::object::{
    slot_by_tag, EventObject, EventTrack, FilterMode, GeosetAnimFlags, GeosetAnimation, Layer,
    Material, MaterialFlags, Node, NodeFlags, ShadingFlags, TextureAnimation, Timelines,
    TrackSlot,
};
use crate::timeline::Timeline;
use crate::{Interpolation, Keyframe, Tag, Value, ValueKind};

pub(crate) mod utilities;

use utilities::*;

pub type IResult<'a, O> = nom::IResult<&'a [u8], O, FormatError>;

pub const SEQUENCE_SIZE: usize = 132;
pub const NAME_SIZE: usize = 80;

pub trait DeserializeContext: Sized {
    type Context;

    fn parse(i: &[u8], ctx: Self::Context) -> IResult<'_, Self>;
}

pub trait Deserialize: Sized {
    fn parse(i: &[u8]) -> IResult<'_, Self>;
}

impl<D: Default, T: DeserializeContext<Context = D>> Deserialize for T {
    fn parse(i: &[u8]) -> IResult<'_, Self> {
        <T as DeserializeContext>::parse(i, D::default())
    }
}

fn value(kind: ValueKind) -> impl Fn(&[u8]) -> IResult<'_, Value> {
    use nom::combinator::map;
    move |i: &[u8]| match kind {
        ValueKind::Float => map(le_f32, Value::Float)(i),
        ValueKind::Vector3 => map(vector3, Value::Vector3)(i),
        ValueKind::Quaternion => map(quaternion, Value::Quaternion)(i),
        ValueKind::Integer => map(le_u32, Value::Integer)(i),
    }
}

fn keyframe(kind: ValueKind, tangents: bool) -> impl Fn(&[u8]) -> IResult<'_, Keyframe> {
    move |i: &[u8]| {
        let (i, time) = le_i32(i)?;
        let (i, v) = value(kind)(i)?;
        if !tangents {
            return Ok((i, Keyframe::new(time, v)));
        }
        let (i, in_tan) = value(kind)(i)?;
        let (i, out_tan) = value(kind)(i)?;
        Ok((i, Keyframe::with_tangents(time, v, in_tan, out_tan)))
    }
}

impl DeserializeContext for Timeline {
    type Context = &'static TrackSlot;

    fn parse(i: &[u8], slot: Self::Context) -> IResult<'_, Self> {
        let (i, _) = read_tag(slot.tag)(i)?;
        let (i, n) = usize(i)?;
        let (i, code) = le_u32(i)?;
        let interpolation = Interpolation::from_code(code).ok_or_else(|| {
            failure(FormatError::Malformed(format!(
                "unknown interpolation type {} in {}",
                code, slot.tag
            )))
        })?;
        let (i, global_sequence) = optional_id(i)?;

        let kind = slot.property.value_kind();
        let words = if interpolation.has_tangents() { 3 } else { 1 };
        check_count(i, n, 4 + 4 * kind.width() * words)?;
        let (i, keys) = count(keyframe(kind, interpolation.has_tangents()), n)(i)?;
        trace!("{} track: {} keys, {:?}", slot.tag, n, interpolation);

        let timeline = Timeline::from_keyframes(slot.property, interpolation, global_sequence, keys)
            .map_err(|e| failure(FormatError::Malformed(format!("{} track: {}", slot.tag, e))))?;
        Ok((i, timeline))
    }
}

/// Reads tracks until the object's region is used up. Every tag must belong
/// to one of `slots`.
fn timelines(
    slots: &'static [TrackSlot],
    block: &'static str,
) -> impl Fn(&[u8]) -> IResult<'_, Timelines> {
    move |mut i: &[u8]| {
        let mut out = Timelines::default();
        while !i.is_empty() {
            let (_, found) = peek_tag(i)?;
            let slot = slot_by_tag(slots, found)
                .ok_or_else(|| failure(FormatError::UnexpectedTag { found, block }))?;
            let (i1, timeline) = Timeline::parse(i, slot)?;
            if out.insert(timeline).is_some() {
                return Err(failure(FormatError::Malformed(format!(
                    "{} appears twice in {}",
                    found, block
                ))));
            }
            i = i1;
        }
        Ok((i, out))
    }
}

/// Flag words keep the bits this crate knows about.
fn known_bits<F>(
    bits: u32,
    what: &str,
    from_bits: fn(u32) -> Option<F>,
    truncate: fn(u32) -> F,
) -> F {
    from_bits(bits).unwrap_or_else(|| {
        warn!("dropping unknown {} flag bits in {:#x}", what, bits);
        truncate(bits)
    })
}

impl Deserialize for Sequence {
    fn parse(i: &[u8]) -> IResult<'_, Self> {
        let (i, name) = fixed_string(NAME_SIZE)(i)?;
        let (i, start) = le_u32(i)?;
        let (i, end) = le_u32(i)?;
        let (i, move_speed) = le_f32(i)?;
        let (i, flags) = le_u32(i)?;
        let (i, rarity) = le_f32(i)?;
        let (i, sync_point) = le_u32(i)?;
        let (i, bounds_radius) = le_f32(i)?;
        let (i, min) = vector3(i)?;
        let (i, max) = vector3(i)?;
        let flags = known_bits(
            flags,
            "sequence",
            SequenceFlags::from_bits,
            SequenceFlags::from_bits_truncate,
        );
        Ok((
            i,
            Sequence {
                name,
                start,
                end,
                move_speed,
                flags,
                rarity,
                sync_point,
                extent: Extent {
                    bounds_radius,
                    min,
                    max,
                },
            },
        ))
    }
}

impl Deserialize for GeosetAnimation {
    fn parse(i: &[u8]) -> IResult<'_, Self> {
        let (rest, body) = sized(i)?;
        let (body, alpha) = le_f32(body)?;
        let (body, flags) = le_u32(body)?;
        let (body, color) = vector3(body)?;
        let (body, geoset_id) = optional_id(body)?;
        let (_, timelines) = timelines(Self::SLOTS, "GeosetAnim")(body)?;
        let flags = known_bits(
            flags,
            "geoset animation",
            GeosetAnimFlags::from_bits,
            GeosetAnimFlags::from_bits_truncate,
        );
        Ok((
            rest,
            GeosetAnimation {
                alpha,
                flags,
                color,
                geoset_id,
                timelines,
            },
        ))
    }
}

impl Deserialize for TextureAnimation {
    fn parse(i: &[u8]) -> IResult<'_, Self> {
        let (rest, body) = sized(i)?;
        let (_, timelines) = timelines(Self::SLOTS, "TVertexAnim")(body)?;
        Ok((rest, TextureAnimation { timelines }))
    }
}

impl Deserialize for Layer {
    fn parse(i: &[u8]) -> IResult<'_, Self> {
        let (rest, body) = sized(i)?;
        let (body, filter_mode) = le_u32(body)?;
        let (body, shading) = le_u32(body)?;
        let (body, texture_id) = le_u32(body)?;
        let (body, texture_animation_id) = optional_id(body)?;
        let (body, coord_id) = le_u32(body)?;
        let (body, alpha) = le_f32(body)?;
        let (_, timelines) = timelines(Self::SLOTS, "Layer")(body)?;

        let filter_mode = FilterMode::from_code(filter_mode).ok_or_else(|| {
            failure(FormatError::Malformed(format!(
                "unknown filter mode {}",
                filter_mode
            )))
        })?;
        let shading = known_bits(
            shading,
            "layer shading",
            ShadingFlags::from_bits,
            ShadingFlags::from_bits_truncate,
        );
        Ok((
            rest,
            Layer {
                filter_mode,
                shading,
                texture_id,
                texture_animation_id,
                coord_id,
                alpha,
                timelines,
            },
        ))
    }
}

impl Deserialize for Material {
    fn parse(i: &[u8]) -> IResult<'_, Self> {
        let (rest, body) = sized(i)?;
        let (body, priority_plane) = le_i32(body)?;
        let (body, flags) = le_u32(body)?;
        let (body, _) = read_tag(Tag::new(b"LAYS"))(body)?;
        let (body, n) = usize(body)?;
        check_count(body, n, 28)?;
        let (body, layers) = count(Layer::parse, n)(body)?;
        if !body.is_empty() {
            return Err(failure(FormatError::Malformed(format!(
                "{} stray bytes after the layers of a material",
                body.len()
            ))));
        }
        let flags = known_bits(
            flags,
            "material",
            MaterialFlags::from_bits,
            MaterialFlags::from_bits_truncate,
        );
        Ok((
            rest,
            Material {
                priority_plane,
                flags,
                layers,
            },
        ))
    }
}

impl Deserialize for Node {
    fn parse(i: &[u8]) -> IResult<'_, Self> {
        let (rest, body) = sized(i)?;
        let (body, name) = fixed_string(NAME_SIZE)(body)?;
        let (body, object_id) = le_u32(body)?;
        let (body, parent_id) = optional_id(body)?;
        let (body, flags) = le_u32(body)?;
        let (_, timelines) = timelines(Self::SLOTS, "Node")(body)?;
        let flags = known_bits(flags, "node", NodeFlags::from_bits, NodeFlags::from_bits_truncate);
        Ok((
            rest,
            Node {
                name,
                object_id,
                parent_id,
                flags,
                timelines,
            },
        ))
    }
}

impl Deserialize for EventTrack {
    fn parse(i: &[u8]) -> IResult<'_, Self> {
        let (i, n) = usize(i)?;
        let (i, global_sequence) = optional_id(i)?;
        check_count(i, n, 4)?;
        let (i, frames) = count(le_u32, n)(i)?;
        Ok((
            i,
            EventTrack {
                global_sequence,
                frames,
            },
        ))
    }
}

impl Deserialize for EventObject {
    fn parse(i: &[u8]) -> IResult<'_, Self> {
        let (i, node) = Node::parse(i)?;
        let (i, kevt) = opt_tag(Tag::new(b"KEVT"))(i)?;
        let (i, track) = match kevt {
            Some(_) => {
                let (i, track) = EventTrack::parse(i)?;
                (i, Some(track))
            }
            None => (i, None),
        };
        Ok((i, EventObject { node, track }))
    }
}

type ChunkDecoder = fn(&mut Model, &[u8]) -> Result<(), FormatError>;

fn decode_version(model: &mut Model, data: &[u8]) -> Result<(), FormatError> {
    model.version = finish_exact(le_u32(data), "VERS")?;
    Ok(())
}

fn decode_sequences(model: &mut Model, data: &[u8]) -> Result<(), FormatError> {
    if data.len() % SEQUENCE_SIZE != 0 {
        return Err(FormatError::Malformed(format!(
            "SEQS size {} is not a multiple of {}",
            data.len(),
            SEQUENCE_SIZE
        )));
    }
    let sequences = finish(many_to_end(Sequence::parse)(data))?;
    debug!("{} sequences", sequences.len());
    model.sequences.extend(sequences);
    Ok(())
}

fn decode_global_sequences(model: &mut Model, data: &[u8]) -> Result<(), FormatError> {
    let durations = finish(many_to_end(le_u32)(data))?;
    debug!("{} global sequences", durations.len());
    model.global_sequences.extend(durations);
    Ok(())
}

fn decode_materials(model: &mut Model, data: &[u8]) -> Result<(), FormatError> {
    let materials = finish(many_to_end(Material::parse)(data))?;
    debug!("{} materials", materials.len());
    model.materials.extend(materials);
    Ok(())
}

fn decode_texture_animations(model: &mut Model, data: &[u8]) -> Result<(), FormatError> {
    let anims = finish(many_to_end(TextureAnimation::parse)(data))?;
    debug!("{} texture animations", anims.len());
    model.texture_animations.extend(anims);
    Ok(())
}

fn decode_geoset_animations(model: &mut Model, data: &[u8]) -> Result<(), FormatError> {
    let anims = finish(many_to_end(GeosetAnimation::parse)(data))?;
    debug!("{} geoset animations", anims.len());
    model.geoset_animations.extend(anims);
    Ok(())
}

fn decode_event_objects(model: &mut Model, data: &[u8]) -> Result<(), FormatError> {
    let events = finish(many_to_end(EventObject::parse)(data))?;
    debug!("{} event objects", events.len());
    model.event_objects.extend(events);
    Ok(())
}

lazy_static! {
    static ref DECODERS: HashMap<Tag, ChunkDecoder> = {
        let mut m: HashMap<Tag, ChunkDecoder> = HashMap::new();
        m.insert(Tag::new(b"VERS"), decode_version);
        m.insert(Tag::new(b"SEQS"), decode_sequences);
        m.insert(Tag::new(b"GLBS"), decode_global_sequences);
        m.insert(Tag::new(b"MTLS"), decode_materials);
        m.insert(Tag::new(b"TXAN"), decode_texture_animations);
        m.insert(Tag::new(b"GEOA"), decode_geoset_animations);
        m.insert(Tag::new(b"EVTS"), decode_event_objects);
        m
    };
}

/// Whether a chunk tag has a decoder.
pub fn is_known_chunk(tag: Tag) -> bool {
    DECODERS.contains_key(&tag)
}

impl Model {
    /// Decodes a binary model. Any structural problem fails the whole file.
    pub fn from_mdx(bytes: &[u8]) -> Result<Self, FormatError> {
        let (i, _) = read_tag(MAGIC)(bytes).map_err(into_format)?;
        let chunks = finish(many_to_end(chunk)(i))?;

        let mut model = Model::default();
        for (tag, data) in chunks {
            match DECODERS.get(&tag) {
                Some(decode) => {
                    trace!("decoding {} ({} bytes)", tag, data.len());
                    decode(&mut model, data)?;
                }
                None => {
                    debug!("keeping unknown chunk {} ({} bytes)", tag, data.len());
                    model.unknown_chunks.push(UnknownChunk {
                        tag,
                        data: data.to_vec(),
                    });
                }
            }
        }
        Ok(model)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::object::Animated;
    use crate::{Property, Tangents};
    use cgmath::Vector3;

    fn le(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes().to_vec()).collect()
    }

    fn f(v: f32) -> u32 {
        v.to_bits()
    }

    fn geoset_anim_bytes(tracks: &[u8]) -> Vec<u8> {
        let mut body = le(&[f(0.5), 1, f(1.), f(0.5), f(0.25), 2]);
        body.extend_from_slice(tracks);
        let mut out = le(&[body.len() as u32 + 4]);
        out.extend(body);
        out
    }

    #[test]
    fn geoset_animation_fields() {
        let mut track = b"KGAO".to_vec();
        track.extend(le(&[2, 1, u32::MAX, 0, f(0.), 100, f(1.)]));
        let input = geoset_anim_bytes(&track);
        assert_eq!(input.len(), 28 + track.len());

        let (rest, anim) = GeosetAnimation::parse(&input).unwrap();
        assert!(rest.is_empty());
        assert_eq!(anim.alpha, 0.5);
        assert_eq!(anim.flags, GeosetAnimFlags::DROP_SHADOW);
        assert_eq!(anim.color, Vector3::new(1., 0.5, 0.25));
        assert_eq!(anim.geoset_id, Some(2));
        let alpha = anim.timeline(Property::Alpha).unwrap();
        assert_eq!(alpha.interpolation(), Interpolation::Linear);
        assert_eq!(alpha.global_sequence(), None);
        assert_eq!(alpha.value_at(100), Some(Value::Float(1.)));
    }

    #[test]
    fn unknown_track_tag_is_rejected() {
        let mut track = b"KGTR".to_vec();
        track.extend(le(&[0, 0, u32::MAX]));
        let input = geoset_anim_bytes(&track);
        assert_eq!(
            finish(GeosetAnimation::parse(&input)),
            Err(FormatError::UnexpectedTag {
                found: Tag::new(b"KGTR"),
                block: "GeosetAnim",
            })
        );
    }

    #[test]
    fn truncated_track_is_eof() {
        let mut track = b"KGAO".to_vec();
        track.extend(le(&[5, 0, u32::MAX, 0, f(1.)]));
        let input = geoset_anim_bytes(&track);
        assert_eq!(
            finish(GeosetAnimation::parse(&input)),
            Err(FormatError::UnexpectedEof)
        );
    }

    #[test]
    fn hermite_track_reads_tangents() {
        let slot = &GeosetAnimation::SLOTS[0];
        let mut input = b"KGAO".to_vec();
        input.extend(le(&[1, 2, 3, 10, f(0.5), f(0.1), f(0.2)]));
        let (_, t) = Timeline::parse(&input, slot).unwrap();
        assert_eq!(t.global_sequence(), Some(3));
        let key = t.keyframe_at(10).unwrap();
        assert_eq!(
            key.tangents,
            Some(Tangents::new(Value::Float(0.1), Value::Float(0.2)))
        );
    }

    #[test]
    fn event_track_is_optional() {
        let mut node = le(&[0]);
        node.extend(vec![0u8; NAME_SIZE]);
        node.extend(le(&[7, u32::MAX, NodeFlags::EVENT_OBJECT.bits()]));
        let size = node.len() as u32;
        node[..4].copy_from_slice(&size.to_le_bytes());

        let mut with_track = node.clone();
        with_track.extend(b"KEVT");
        with_track.extend(le(&[2, u32::MAX, 10, 20]));
        let mut input = with_track;
        input.extend(node);

        let events = finish(many_to_end(EventObject::parse)(&input[..])).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].node.object_id, 7);
        assert_eq!(events[0].node.parent_id, None);
        assert_eq!(events[0].track.as_ref().unwrap().frames, [10, 20]);
        assert_eq!(events[1].track, None);
    }

    #[test]
    fn model_keeps_unknown_chunks() {
        let mut input = b"MDLX".to_vec();
        input.extend(b"VERS");
        input.extend(le(&[4, 800]));
        input.extend(b"GLBS");
        input.extend(le(&[8, 100, 250]));
        input.extend(b"TEXS");
        input.extend(le(&[3]));
        input.extend(&[1, 2, 3]);

        let model = Model::from_mdx(&input).unwrap();
        assert_eq!(model.version, 800);
        assert_eq!(model.global_sequences, [100, 250]);
        assert_eq!(
            model.unknown_chunks,
            [UnknownChunk {
                tag: Tag::new(b"TEXS"),
                data: vec![1, 2, 3],
            }]
        );
        assert!(is_known_chunk(Tag::new(b"GEOA")));
        assert!(!is_known_chunk(Tag::new(b"TEXS")));
    }

    #[test]
    fn bad_magic() {
        assert_eq!(
            Model::from_mdx(b"MDL3...."),
            Err(FormatError::TagMismatch {
                expected: MAGIC,
                found: Tag::new(b"MDL3"),
            })
        );
        assert_eq!(Model::from_mdx(b"MD"), Err(FormatError::UnexpectedEof));
    }
}
