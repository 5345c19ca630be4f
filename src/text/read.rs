use log::{debug, warn};

use super::lexer::{Spanned, Token, TokenStream};
use crate::error::FormatError;
use crate::model::{Model, Sequence, SequenceFlags};
use crate::object::{
    slot_by_keyword, EventObject, EventTrack, FilterMode, GeosetAnimFlags, GeosetAnimation, Layer,
    Material, MaterialFlags, Node, NodeFlags, ShadingFlags, TextureAnimation, Timelines,
    TrackSlot,
};
use crate::timeline::Timeline;
use crate::{Interpolation, Keyframe, Value, ValueKind};

type Result<T> = std::result::Result<T, FormatError>;

/// Runs `f` on every keyword of a `{ .. }` block. Anything that is not a
/// word where a keyword belongs is an unknown token.
fn block<F>(s: &mut TokenStream, name: &'static str, mut f: F) -> Result<()>
where
    F: FnMut(&mut TokenStream, &Spanned, &str) -> Result<()>,
{
    s.open(name)?;
    while !s.at_close() {
        let token = s.next()?;
        match &token.token {
            Token::Word(word) => f(s, &token, word)?,
            _ => return Err(TokenStream::unknown(&token, name)),
        }
    }
    Ok(())
}

fn expect_keyword(s: &mut TokenStream, keyword: &str, block: &'static str) -> Result<()> {
    let token = s.next()?;
    match &token.token {
        Token::Word(w) if w == keyword => Ok(()),
        _ => Err(TokenStream::unknown(&token, block)),
    }
}

fn flag<F: Copy>(table: &[(&str, F)], word: &str) -> Option<F> {
    table.iter().find(|(k, _)| *k == word).map(|(_, f)| *f)
}

fn value(s: &mut TokenStream, kind: ValueKind, block: &'static str) -> Result<Value> {
    Ok(match kind {
        ValueKind::Float => Value::Float(s.float(block)?),
        ValueKind::Vector3 => Value::Vector3(s.vector3(block)?),
        ValueKind::Quaternion => Value::Quaternion(s.quaternion(block)?),
        ValueKind::Integer => Value::Integer(s.uint(block)?),
    })
}

fn track(s: &mut TokenStream, slot: &'static TrackSlot) -> Result<Timeline> {
    let block = slot.keyword;
    let declared = s.uint(block)? as usize;
    s.open(block)?;
    let (mode, line) = s.word(block)?;
    let interpolation = Interpolation::from_keyword(&mode).ok_or(FormatError::UnknownToken {
        token: mode,
        block,
        line,
    })?;

    let kind = slot.property.value_kind();
    let mut global_sequence = None;
    let mut keys = vec![];
    while !s.at_close() {
        let token = s.next()?;
        let word = match &token.token {
            Token::Word(w) => w,
            _ => return Err(TokenStream::unknown(&token, block)),
        };
        if word == "GlobalSeqId" {
            global_sequence = Some(s.uint(block)?);
            continue;
        }
        let time: i32 = word.parse().map_err(|_| {
            if word.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
                FormatError::InvalidNumber {
                    token: word.clone(),
                    line: token.line,
                }
            } else {
                TokenStream::unknown(&token, block)
            }
        })?;
        s.colon(block)?;
        let v = value(s, kind, block)?;
        if interpolation.has_tangents() {
            expect_keyword(s, "InTan", block)?;
            let in_tan = value(s, kind, block)?;
            expect_keyword(s, "OutTan", block)?;
            let out_tan = value(s, kind, block)?;
            keys.push(Keyframe::with_tangents(time, v, in_tan, out_tan));
        } else {
            keys.push(Keyframe::new(time, v));
        }
    }
    if keys.len() != declared {
        warn!(
            "{} track declares {} keys but holds {}",
            block,
            declared,
            keys.len()
        );
    }
    Timeline::from_keyframes(slot.property, interpolation, global_sequence, keys)
        .map_err(|e| FormatError::Malformed(format!("{} track: {}", block, e)))
}

/// Reads a track if `word` names one of `slots`.
fn try_track(
    s: &mut TokenStream,
    slots: &'static [TrackSlot],
    timelines: &mut Timelines,
    token: &Spanned,
    word: &str,
    block: &'static str,
) -> Result<()> {
    let slot = slot_by_keyword(slots, word).ok_or_else(|| TokenStream::unknown(token, block))?;
    if timelines.insert(track(s, slot)?).is_some() {
        return Err(FormatError::Malformed(format!(
            "{} appears twice in {} (line {})",
            word, block, token.line
        )));
    }
    Ok(())
}

fn version(s: &mut TokenStream, model: &mut Model) -> Result<()> {
    block(s, "Version", |s, token, word| match word {
        "FormatVersion" => {
            model.version = s.uint("Version")?;
            Ok(())
        }
        _ => Err(TokenStream::unknown(token, "Version")),
    })
}

fn sequence(s: &mut TokenStream) -> Result<Sequence> {
    let mut seq = Sequence {
        name: s.string("Anim")?,
        ..Default::default()
    };
    block(s, "Anim", |s, token, word| {
        match word {
            "Interval" => {
                s.open("Interval")?;
                seq.start = s.uint("Interval")?;
                seq.end = s.uint("Interval")?;
                s.close("Interval")?;
            }
            "NonLooping" => seq.flags |= SequenceFlags::NON_LOOPING,
            "MoveSpeed" => seq.move_speed = s.float("Anim")?,
            "Rarity" => seq.rarity = s.float("Anim")?,
            "SyncPoint" => seq.sync_point = s.uint("Anim")?,
            "MinimumExtent" => seq.extent.min = s.vector3("Anim")?,
            "MaximumExtent" => seq.extent.max = s.vector3("Anim")?,
            "BoundsRadius" => seq.extent.bounds_radius = s.float("Anim")?,
            _ => return Err(TokenStream::unknown(token, "Anim")),
        }
        Ok(())
    })?;
    Ok(seq)
}

fn sequences(s: &mut TokenStream, model: &mut Model) -> Result<()> {
    s.uint("Sequences")?;
    block(s, "Sequences", |s, token, word| match word {
        "Anim" => {
            model.sequences.push(sequence(s)?);
            Ok(())
        }
        _ => Err(TokenStream::unknown(token, "Sequences")),
    })
}

fn global_sequences(s: &mut TokenStream, model: &mut Model) -> Result<()> {
    s.uint("GlobalSequences")?;
    block(s, "GlobalSequences", |s, token, word| match word {
        "Duration" => {
            model.global_sequences.push(s.uint("GlobalSequences")?);
            Ok(())
        }
        _ => Err(TokenStream::unknown(token, "GlobalSequences")),
    })
}

fn layer(s: &mut TokenStream) -> Result<Layer> {
    let mut layer = Layer::default();
    block(s, "Layer", |s, token, word| {
        match word {
            "FilterMode" => {
                let (mode, line) = s.word("Layer")?;
                layer.filter_mode =
                    FilterMode::from_keyword(&mode).ok_or(FormatError::UnknownToken {
                        token: mode,
                        block: "Layer",
                        line,
                    })?;
            }
            "static TextureID" => layer.texture_id = s.uint("Layer")?,
            "static Alpha" => layer.alpha = s.float("Layer")?,
            "TVertexAnimId" => layer.texture_animation_id = Some(s.uint("Layer")?),
            "CoordId" => layer.coord_id = s.uint("Layer")?,
            word => match flag(ShadingFlags::KEYWORDS, word) {
                Some(bit) => layer.shading |= bit,
                None => try_track(s, Layer::SLOTS, &mut layer.timelines, token, word, "Layer")?,
            },
        }
        Ok(())
    })?;
    Ok(layer)
}

fn material(s: &mut TokenStream) -> Result<Material> {
    let mut material = Material::default();
    block(s, "Material", |s, token, word| {
        match word {
            "PriorityPlane" => material.priority_plane = s.int("Material")?,
            "Layer" => material.layers.push(layer(s)?),
            word => match flag(MaterialFlags::KEYWORDS, word) {
                Some(bit) => material.flags |= bit,
                None => return Err(TokenStream::unknown(token, "Material")),
            },
        }
        Ok(())
    })?;
    Ok(material)
}

fn materials(s: &mut TokenStream, model: &mut Model) -> Result<()> {
    s.uint("Materials")?;
    block(s, "Materials", |s, token, word| match word {
        "Material" => {
            model.materials.push(material(s)?);
            Ok(())
        }
        _ => Err(TokenStream::unknown(token, "Materials")),
    })
}

fn texture_animations(s: &mut TokenStream, model: &mut Model) -> Result<()> {
    s.uint("TextureAnims")?;
    block(s, "TextureAnims", |s, token, word| match word {
        "TVertexAnim" => {
            let mut anim = TextureAnimation::default();
            block(s, "TVertexAnim", |s, token, word| {
                try_track(
                    s,
                    TextureAnimation::SLOTS,
                    &mut anim.timelines,
                    token,
                    word,
                    "TVertexAnim",
                )
            })?;
            model.texture_animations.push(anim);
            Ok(())
        }
        _ => Err(TokenStream::unknown(token, "TextureAnims")),
    })
}

fn geoset_animation(s: &mut TokenStream) -> Result<GeosetAnimation> {
    let mut anim = GeosetAnimation::default();
    block(s, "GeosetAnim", |s, token, word| {
        match word {
            "DropShadow" => anim.flags |= GeosetAnimFlags::DROP_SHADOW,
            "static Alpha" => anim.alpha = s.float("GeosetAnim")?,
            "static Color" => {
                anim.color = s.vector3("GeosetAnim")?;
                anim.flags |= GeosetAnimFlags::USE_COLOR;
            }
            "GeosetId" => anim.geoset_id = Some(s.uint("GeosetAnim")?),
            word => {
                try_track(
                    s,
                    GeosetAnimation::SLOTS,
                    &mut anim.timelines,
                    token,
                    word,
                    "GeosetAnim",
                )?;
                if word == "Color" {
                    anim.flags |= GeosetAnimFlags::USE_COLOR;
                }
            }
        }
        Ok(())
    })?;
    Ok(anim)
}

fn event_track(s: &mut TokenStream) -> Result<EventTrack> {
    let declared = s.uint("EventTrack")? as usize;
    let mut track = EventTrack::default();
    s.open("EventTrack")?;
    while !s.at_close() {
        let token = s.next()?;
        match &token.token {
            Token::Word(w) if w == "GlobalSeqId" => {
                track.global_sequence = Some(s.uint("EventTrack")?)
            }
            Token::Word(w) => track.frames.push(w.parse().map_err(|_| {
                FormatError::InvalidNumber {
                    token: w.clone(),
                    line: token.line,
                }
            })?),
            _ => return Err(TokenStream::unknown(&token, "EventTrack")),
        }
    }
    if track.frames.len() != declared {
        warn!(
            "EventTrack declares {} frames but holds {}",
            declared,
            track.frames.len()
        );
    }
    Ok(track)
}

fn event_object(s: &mut TokenStream) -> Result<EventObject> {
    let mut event = EventObject {
        node: Node {
            name: s.string("EventObject")?,
            flags: NodeFlags::EVENT_OBJECT,
            ..Default::default()
        },
        track: None,
    };
    block(s, "EventObject", |s, token, word| {
        let node = &mut event.node;
        match word {
            "ObjectId" => node.object_id = s.uint("EventObject")?,
            "Parent" => node.parent_id = Some(s.uint("EventObject")?),
            "DontInherit" => block(s, "DontInherit", |_, token, word| {
                match flag(NodeFlags::INHERIT_KEYWORDS, word) {
                    Some(bit) => node.flags |= bit,
                    None => return Err(TokenStream::unknown(token, "DontInherit")),
                }
                Ok(())
            })?,
            "EventTrack" => event.track = Some(event_track(s)?),
            word => match flag(NodeFlags::KEYWORDS, word) {
                Some(bit) => node.flags |= bit,
                None => try_track(s, Node::SLOTS, &mut node.timelines, token, word, "EventObject")?,
            },
        }
        Ok(())
    })?;
    Ok(event)
}

impl Model {
    /// Decodes a text model. Unknown keywords fail the whole file.
    pub fn from_mdl(src: &str) -> Result<Self> {
        let mut s = TokenStream::new(src)?;
        let mut model = Model::default();
        while !s.is_empty() {
            let token = s.next()?;
            let word = match &token.token {
                Token::Word(w) => w.as_str(),
                _ => return Err(TokenStream::unknown(&token, "Model")),
            };
            match word {
                "Version" => version(&mut s, &mut model)?,
                "Sequences" => sequences(&mut s, &mut model)?,
                "GlobalSequences" => global_sequences(&mut s, &mut model)?,
                "Materials" => materials(&mut s, &mut model)?,
                "TextureAnims" => texture_animations(&mut s, &mut model)?,
                "GeosetAnim" => model.geoset_animations.push(geoset_animation(&mut s)?),
                "EventObject" => model.event_objects.push(event_object(&mut s)?),
                _ => return Err(TokenStream::unknown(&token, "Model")),
            }
        }
        debug!(
            "read {} sequences, {} materials, {} geoset animations, {} event objects",
            model.sequences.len(),
            model.materials.len(),
            model.geoset_animations.len(),
            model.event_objects.len()
        );
        Ok(model)
    }
}
