//! Model elements that carry timelines.
//!
//! Every element type declares a fixed table of [`TrackSlot`]s mapping the
//! binary track tag and the text keyword onto the property it animates. Both
//! codecs drive their track handling from that table.

use crate::error::StateError;
use crate::eval::PlaybackContext;
use crate::timeline::Timeline;
use crate::{Property, Tag, Value};

use std::collections::BTreeMap;

mod geoset_anim;
mod material;
mod node;
mod texture_anim;

pub use geoset_anim::{GeosetAnimFlags, GeosetAnimation};
pub use material::{FilterMode, Layer, Material, MaterialFlags, ShadingFlags};
pub use node::{EventObject, EventTrack, Node, NodeFlags};
pub use texture_anim::TextureAnimation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSlot {
    pub tag: Tag,
    pub property: Property,
    pub keyword: &'static str,
}

impl TrackSlot {
    pub const fn new(tag: &[u8; 4], property: Property, keyword: &'static str) -> Self {
        Self {
            tag: Tag::new(tag),
            property,
            keyword,
        }
    }
}

/// The timelines an element owns, at most one per property.
#[derive(Debug, Clone, Default)]
pub struct Timelines(BTreeMap<Property, Timeline>);

/// Empty tracks compare as absent ones, the same way both codecs treat them.
impl PartialEq for Timelines {
    fn eq(&self, other: &Self) -> bool {
        let non_empty = |t: &&Timeline| !t.is_empty();
        self.iter().filter(non_empty).eq(other.iter().filter(non_empty))
    }
}

impl Timelines {
    pub fn get(&self, property: Property) -> Option<&Timeline> {
        self.0.get(&property)
    }

    pub fn get_mut(&mut self, property: Property) -> Option<&mut Timeline> {
        self.0.get_mut(&property)
    }

    /// Stores a timeline under its own property, returning the one it replaced.
    pub fn insert(&mut self, timeline: Timeline) -> Option<Timeline> {
        self.0.insert(timeline.property(), timeline)
    }

    pub fn remove(&mut self, property: Property) -> Option<Timeline> {
        self.0.remove(&property)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Timeline> {
        self.0.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Timeline> {
        self.0.values_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub trait Animated {
    fn slots(&self) -> &'static [TrackSlot];

    fn timelines(&self) -> &Timelines;

    fn timelines_mut(&mut self) -> &mut Timelines;

    fn timeline(&self, property: Property) -> Option<&Timeline> {
        self.timelines().get(property)
    }

    /// Evaluates the property's track, or returns `static_value` when the
    /// element has no keys for it.
    fn sample(
        &self,
        property: Property,
        static_value: Value,
        ctx: &dyn PlaybackContext,
    ) -> Result<Value, StateError> {
        match self.timeline(property) {
            Some(t) if !t.is_empty() => t.evaluate(ctx),
            _ => Ok(static_value),
        }
    }
}

pub(crate) fn slot_by_tag(slots: &'static [TrackSlot], tag: Tag) -> Option<&'static TrackSlot> {
    slots.iter().find(|s| s.tag == tag)
}

pub(crate) fn slot_by_keyword(
    slots: &'static [TrackSlot],
    word: &str,
) -> Option<&'static TrackSlot> {
    slots.iter().find(|s| s.keyword == word)
}

/// Tracks that are worth writing: present and non-empty, in slot order.
pub(crate) fn written_tracks<'a>(
    slots: &'static [TrackSlot],
    timelines: &'a Timelines,
) -> impl Iterator<Item = (&'static TrackSlot, &'a Timeline)> + Clone + 'a {
    slots.iter().filter_map(move |slot| {
        timelines
            .get(slot.property)
            .filter(|t| !t.is_empty())
            .map(|t| (slot, t))
    })
}
