use cgmath::{Quaternion, Vector3};
use log::warn;

use crate::model::{Model, Sequence, SequenceFlags};
use crate::object::{
    EventObject, GeosetAnimFlags, GeosetAnimation, Layer, Material, MaterialFlags, NodeFlags,
    ShadingFlags, TextureAnimation, Timelines, TrackSlot,
};
use crate::timeline::Timeline;
use crate::Value;

/// Accumulates MDL text, one tab per nesting level.
#[derive(Debug, Default)]
struct Writer {
    out: String,
    depth: usize,
}

impl Writer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push('\t');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn open(&mut self, header: &str) {
        self.line(&format!("{} {{", header));
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }
}

fn vector(v: Vector3<f32>) -> String {
    format!("{{ {}, {}, {} }}", v.x, v.y, v.z)
}

fn quaternion(q: Quaternion<f32>) -> String {
    format!("{{ {}, {}, {}, {} }}", q.v.x, q.v.y, q.v.z, q.s)
}

fn value(v: &Value) -> String {
    match v {
        Value::Float(f) => f.to_string(),
        Value::Vector3(v) => vector(*v),
        Value::Quaternion(q) => quaternion(*q),
        Value::Integer(n) => n.to_string(),
    }
}

/// A name as a quoted string. Text has no escape syntax, so embedded quotes
/// become apostrophes.
fn quoted(name: &str) -> String {
    if name.contains('"') {
        warn!("replacing quotes in name {:?}", name);
    }
    format!("\"{}\"", name.replace('"', "'"))
}

fn flags<F: Copy>(w: &mut Writer, table: &[(&str, F)], has: impl Fn(F) -> bool) {
    for (keyword, bit) in table {
        if has(*bit) {
            w.line(&format!("{},", keyword));
        }
    }
}

fn track(w: &mut Writer, slot: &TrackSlot, timeline: &Timeline) {
    w.open(&format!("{} {}", slot.keyword, timeline.len()));
    w.line(&format!("{},", timeline.interpolation().keyword()));
    if let Some(id) = timeline.global_sequence() {
        w.line(&format!("GlobalSeqId {},", id));
    }
    for key in timeline.iter() {
        w.line(&format!("{}: {},", key.time, value(&key.value)));
        if let Some(tangents) = key.tangents {
            w.depth += 1;
            w.line(&format!("InTan {},", value(&tangents.in_tan)));
            w.line(&format!("OutTan {},", value(&tangents.out_tan)));
            w.depth -= 1;
        }
    }
    w.close();
}

/// Writes a property as a track when it has keys, otherwise as a `static`
/// line when `static_value` is set.
fn property(
    w: &mut Writer,
    slot: &TrackSlot,
    timelines: &Timelines,
    static_value: Option<Value>,
) {
    match timelines.get(slot.property).filter(|t| !t.is_empty()) {
        Some(t) => track(w, slot, t),
        None => {
            if let Some(v) = static_value {
                w.line(&format!("static {} {},", slot.keyword, value(&v)));
            }
        }
    }
}

/// The static value to write, if it differs from the property's identity.
fn unless_identity(slot: &TrackSlot, v: Value) -> Option<Value> {
    if v == slot.property.identity() {
        None
    } else {
        Some(v)
    }
}

fn sequence(w: &mut Writer, seq: &Sequence) {
    w.open(&format!("Anim {}", quoted(&seq.name)));
    w.line(&format!("Interval {{ {}, {} }},", seq.start, seq.end));
    if seq.flags.contains(SequenceFlags::NON_LOOPING) {
        w.line("NonLooping,");
    }
    if seq.move_speed != 0. {
        w.line(&format!("MoveSpeed {},", seq.move_speed));
    }
    if seq.rarity != 0. {
        w.line(&format!("Rarity {},", seq.rarity));
    }
    if seq.sync_point != 0 {
        w.line(&format!("SyncPoint {},", seq.sync_point));
    }
    let zero = Vector3::new(0., 0., 0.);
    if seq.extent.min != zero {
        w.line(&format!("MinimumExtent {},", vector(seq.extent.min)));
    }
    if seq.extent.max != zero {
        w.line(&format!("MaximumExtent {},", vector(seq.extent.max)));
    }
    if seq.extent.bounds_radius != 0. {
        w.line(&format!("BoundsRadius {},", seq.extent.bounds_radius));
    }
    w.close();
}

fn layer(w: &mut Writer, layer: &Layer) {
    let [alpha, texture] = [&Layer::SLOTS[0], &Layer::SLOTS[1]];
    w.open("Layer");
    w.line(&format!("FilterMode {},", layer.filter_mode.keyword()));
    flags(w, ShadingFlags::KEYWORDS, |bit| layer.shading.contains(bit));
    property(
        w,
        texture,
        &layer.timelines,
        unless_identity(texture, Value::Integer(layer.texture_id)),
    );
    if let Some(id) = layer.texture_animation_id {
        w.line(&format!("TVertexAnimId {},", id));
    }
    if layer.coord_id != 0 {
        w.line(&format!("CoordId {},", layer.coord_id));
    }
    property(
        w,
        alpha,
        &layer.timelines,
        unless_identity(alpha, Value::Float(layer.alpha)),
    );
    w.close();
}

fn material(w: &mut Writer, material: &Material) {
    w.open("Material");
    flags(w, MaterialFlags::KEYWORDS, |bit| material.flags.contains(bit));
    if material.priority_plane != 0 {
        w.line(&format!("PriorityPlane {},", material.priority_plane));
    }
    for l in &material.layers {
        layer(w, l);
    }
    w.close();
}

fn texture_animation(w: &mut Writer, anim: &TextureAnimation) {
    w.open("TVertexAnim");
    for slot in TextureAnimation::SLOTS {
        property(w, slot, &anim.timelines, None);
    }
    w.close();
}

fn geoset_animation(w: &mut Writer, anim: &GeosetAnimation) {
    let [alpha, color] = [&GeosetAnimation::SLOTS[0], &GeosetAnimation::SLOTS[1]];
    w.open("GeosetAnim");
    if anim.flags.contains(GeosetAnimFlags::DROP_SHADOW) {
        w.line("DropShadow,");
    }
    property(
        w,
        alpha,
        &anim.timelines,
        unless_identity(alpha, Value::Float(anim.alpha)),
    );
    // the color flag only survives through a color line
    let static_color = if anim.flags.contains(GeosetAnimFlags::USE_COLOR) {
        Some(Value::Vector3(anim.color))
    } else {
        unless_identity(color, Value::Vector3(anim.color))
    };
    property(w, color, &anim.timelines, static_color);
    if let Some(id) = anim.geoset_id {
        w.line(&format!("GeosetId {},", id));
    }
    w.close();
}

fn event_object(w: &mut Writer, event: &EventObject) {
    let node = &event.node;
    let expressible = NodeFlags::KEYWORDS
        .iter()
        .chain(NodeFlags::INHERIT_KEYWORDS)
        .fold(NodeFlags::EVENT_OBJECT, |acc, (_, bit)| acc | *bit);
    if !expressible.contains(node.flags) {
        warn!(
            "event object {:?}: flags {:#x} have no text form",
            node.name,
            (node.flags - expressible).bits()
        );
    }

    w.open(&format!("EventObject {}", quoted(&node.name)));
    w.line(&format!("ObjectId {},", node.object_id));
    if let Some(parent) = node.parent_id {
        w.line(&format!("Parent {},", parent));
    }
    flags(w, NodeFlags::KEYWORDS, |bit| node.flags.contains(bit));
    let inherit: Vec<_> = NodeFlags::INHERIT_KEYWORDS
        .iter()
        .filter(|(_, bit)| node.flags.contains(*bit))
        .map(|(keyword, _)| *keyword)
        .collect();
    if !inherit.is_empty() {
        w.line(&format!("DontInherit {{ {} }},", inherit.join(", ")));
    }
    if let Some(track) = &event.track {
        w.open(&format!("EventTrack {}", track.frames.len()));
        if let Some(id) = track.global_sequence {
            w.line(&format!("GlobalSeqId {},", id));
        }
        for frame in &track.frames {
            w.line(&format!("{},", frame));
        }
        w.close();
    }
    for slot in crate::object::Node::SLOTS {
        property(w, slot, &node.timelines, None);
    }
    w.close();
}

impl Model {
    /// Encodes the model as MDL text. Chunks without a text form are
    /// dropped.
    pub fn to_mdl(&self) -> String {
        for chunk in &self.unknown_chunks {
            warn!("dropping chunk {} ({} bytes), it has no text form", chunk.tag, chunk.data.len());
        }

        let mut w = Writer::default();
        w.open("Version");
        w.line(&format!("FormatVersion {},", self.version));
        w.close();

        if !self.sequences.is_empty() {
            w.open(&format!("Sequences {}", self.sequences.len()));
            for seq in &self.sequences {
                sequence(&mut w, seq);
            }
            w.close();
        }
        if !self.global_sequences.is_empty() {
            w.open(&format!("GlobalSequences {}", self.global_sequences.len()));
            for duration in &self.global_sequences {
                w.line(&format!("Duration {},", duration));
            }
            w.close();
        }
        if !self.materials.is_empty() {
            w.open(&format!("Materials {}", self.materials.len()));
            for m in &self.materials {
                material(&mut w, m);
            }
            w.close();
        }
        if !self.texture_animations.is_empty() {
            w.open(&format!("TextureAnims {}", self.texture_animations.len()));
            for anim in &self.texture_animations {
                texture_animation(&mut w, anim);
            }
            w.close();
        }
        for anim in &self.geoset_animations {
            geoset_animation(&mut w, anim);
        }
        for event in &self.event_objects {
            event_object(&mut w, event);
        }
        w.out
    }
}
