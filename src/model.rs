use bitflags::bitflags;
use cgmath::Vector3;
use log::debug;

use crate::eval::{Clip, Playback};
use crate::object::{
    Animated, EventObject, GeosetAnimation, Material, TextureAnimation,
};
use crate::timeline::Timeline;
use crate::Tag;

use std::convert::TryFrom;

pub const MAGIC: Tag = Tag::new(b"MDLX");
pub const DEFAULT_VERSION: u32 = 800;

bitflags! {
    #[derive(Default)]
    pub struct SequenceFlags: u32 {
        const NON_LOOPING = 0x1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub bounds_radius: f32,
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Default for Extent {
    fn default() -> Self {
        Self {
            bounds_radius: 0.,
            min: Vector3::new(0., 0., 0.),
            max: Vector3::new(0., 0., 0.),
        }
    }
}

/// A named clip of the model's shared track time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sequence {
    pub name: String,
    pub start: u32,
    pub end: u32,
    pub move_speed: f32,
    pub flags: SequenceFlags,
    pub rarity: f32,
    pub sync_point: u32,
    pub extent: Extent,
}

/// Track times are `i32`. Later frames clamp to the last one representable.
fn clamp_time(frame: u32) -> i32 {
    i32::try_from(frame).unwrap_or(i32::MAX)
}

impl Sequence {
    pub fn clip(&self) -> Clip {
        Clip {
            start: clamp_time(self.start),
            end: clamp_time(self.end),
        }
    }

    pub fn duration(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_looping(&self) -> bool {
        !self.flags.contains(SequenceFlags::NON_LOOPING)
    }
}

/// A chunk this crate does not model, kept so binary output stays complete.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownChunk {
    pub tag: Tag,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub version: u32,
    pub sequences: Vec<Sequence>,
    /// Durations, indexed by global sequence id.
    pub global_sequences: Vec<u32>,
    pub materials: Vec<Material>,
    pub texture_animations: Vec<TextureAnimation>,
    pub geoset_animations: Vec<GeosetAnimation>,
    pub event_objects: Vec<EventObject>,
    pub unknown_chunks: Vec<UnknownChunk>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            sequences: vec![],
            global_sequences: vec![],
            materials: vec![],
            texture_animations: vec![],
            geoset_animations: vec![],
            event_objects: vec![],
            unknown_chunks: vec![],
        }
    }
}

impl Model {
    pub fn sequence(&self, name: &str) -> Option<(usize, &Sequence)> {
        self.sequences.iter().enumerate().find(|(_, s)| s.name == name)
    }

    /// Playback positioned at the start of the `index`th sequence.
    pub fn playback(&self, index: usize) -> Option<Playback> {
        Playback::for_sequence(self, index)
    }

    pub fn animated(&self) -> Vec<&dyn Animated> {
        let mut out: Vec<&dyn Animated> = vec![];
        for material in &self.materials {
            out.extend(material.layers.iter().map(|l| l as &dyn Animated));
        }
        out.extend(self.texture_animations.iter().map(|a| a as &dyn Animated));
        out.extend(self.geoset_animations.iter().map(|a| a as &dyn Animated));
        out.extend(self.event_objects.iter().map(|a| a as &dyn Animated));
        out
    }

    pub fn animated_mut(&mut self) -> Vec<&mut dyn Animated> {
        let mut out: Vec<&mut dyn Animated> = vec![];
        for material in &mut self.materials {
            out.extend(material.layers.iter_mut().map(|l| l as &mut dyn Animated));
        }
        out.extend(
            self.texture_animations
                .iter_mut()
                .map(|a| a as &mut dyn Animated),
        );
        out.extend(
            self.geoset_animations
                .iter_mut()
                .map(|a| a as &mut dyn Animated),
        );
        out.extend(self.event_objects.iter_mut().map(|a| a as &mut dyn Animated));
        out
    }

    pub fn timelines(&self) -> impl Iterator<Item = &Timeline> {
        self.animated()
            .into_iter()
            .flat_map(|a| a.timelines().iter())
    }

    /// Removes a sequence together with every key inside its interval.
    /// Tracks following a global sequence keep their keys.
    pub fn delete_sequence(&mut self, index: usize) -> Option<Sequence> {
        if index >= self.sequences.len() {
            return None;
        }
        let sequence = self.sequences.remove(index);
        let clip = sequence.clip();
        let mut removed = 0;
        for animated in self.animated_mut() {
            for timeline in animated.timelines_mut().iter_mut() {
                removed += timeline.remove_range(clip.start, clip.end);
            }
        }
        for event in &mut self.event_objects {
            if let Some(track) = event.track.as_mut().filter(|t| t.global_sequence.is_none()) {
                track
                    .frames
                    .retain(|f| *f < sequence.start || *f > sequence.end);
            }
        }
        debug!("deleted sequence {:?} and {} keys", sequence.name, removed);
        Some(sequence)
    }
}
