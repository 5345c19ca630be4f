//! Sampling a [`Timeline`] at a playback position.
//!
//! The engine owns no clock. Callers describe where playback is through a
//! [`PlaybackContext`]; [`Playback`] is a ready-made one.

use crate::error::StateError;
use crate::math;
use crate::model::Model;
use crate::timeline::Timeline;
use crate::{Interpolation, Keyframe, Tangents, Value};

use std::convert::TryFrom;

/// A `[start, end]` range of track time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clip {
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalSequenceState {
    /// Current position inside the loop.
    pub time: i32,
    pub duration: i32,
}

pub trait PlaybackContext {
    /// The clip being played, if any.
    fn clip(&self) -> Option<Clip>;

    /// Time elapsed since the clip's start.
    fn local_time(&self) -> i32;

    /// Looping state of a global sequence, `None` if the id is unknown.
    fn global_sequence(&self, id: u32) -> Option<GlobalSequenceState>;
}

/// Plain playback state: a clip, a position in it, and a free-running clock
/// for global sequences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playback {
    pub clip: Option<Clip>,
    pub local_time: i32,
    pub elapsed: i32,
    pub global_sequences: Vec<u32>,
}

impl Playback {
    pub fn new(clip: Option<Clip>, global_sequences: Vec<u32>) -> Self {
        Self {
            clip,
            global_sequences,
            ..Default::default()
        }
    }

    /// Playback of the model's `index`th sequence, positioned at its start.
    pub fn for_sequence(model: &Model, index: usize) -> Option<Self> {
        let sequence = model.sequences.get(index)?;
        Some(Self::new(
            Some(sequence.clip()),
            model.global_sequences.clone(),
        ))
    }

    pub fn at(mut self, local_time: i32) -> Self {
        self.local_time = local_time;
        self
    }

    pub fn with_elapsed(mut self, elapsed: i32) -> Self {
        self.elapsed = elapsed;
        self
    }
}

impl PlaybackContext for Playback {
    fn clip(&self) -> Option<Clip> {
        self.clip
    }

    fn local_time(&self) -> i32 {
        self.local_time
    }

    fn global_sequence(&self, id: u32) -> Option<GlobalSequenceState> {
        let duration = *self.global_sequences.get(id as usize)?;
        let duration = i32::try_from(duration).unwrap_or(i32::MAX);
        let time = if duration > 0 {
            self.elapsed.rem_euclid(duration)
        } else {
            0
        };
        Some(GlobalSequenceState { time, duration })
    }
}

/// One end of the span being interpolated.
#[derive(Debug, Clone, Copy)]
struct Sample {
    index: usize,
    time: i32,
    value: Value,
    tangents: Option<Tangents>,
}

impl Sample {
    fn of(keys: &[Keyframe], index: usize) -> Self {
        let key = &keys[index];
        Self {
            index,
            time: key.time,
            value: key.value,
            tangents: key.tangents,
        }
    }
}

impl Timeline {
    fn index_of(&self, time: i32) -> Option<usize> {
        self.keyframes()
            .binary_search_by_key(&time, |k| k.time)
            .ok()
    }

    pub fn evaluate(&self, ctx: &dyn PlaybackContext) -> Result<Value, StateError> {
        let identity = self.property().identity();
        let keys = self.keyframes();
        if keys.is_empty() {
            return Ok(identity);
        }

        let global = self
            .global_sequence()
            .and_then(|id| ctx.global_sequence(id))
            .filter(|gs| gs.duration >= 0);
        let (time, start, end, in_clip) = match (global, ctx.clip()) {
            (Some(gs), _) => (gs.time, 0, gs.duration, false),
            (None, Some(clip)) => (
                clip.start.saturating_add(ctx.local_time()),
                clip.start,
                clip.end,
                true,
            ),
            (None, None) => return Ok(keys[0].value),
        };

        let floor_index = self.floor_index(time);
        // only reachable with out-of-order keys, kept as a guard
        let ceil_index = self.ceil_index(time).max(floor_index);
        let mut floor = Sample::of(keys, floor_index);
        let mut ceil = Sample::of(keys, ceil_index);

        if ceil.time < start {
            return Ok(identity);
        }
        if floor.time > end {
            return Ok(floor.value);
        }
        if floor.time < start && ceil.time > end {
            return Ok(identity);
        }
        if floor.time < start {
            let wrap = if in_clip { self.index_of(end) } else { None };
            floor = match wrap {
                Some(index) => Sample {
                    time: start,
                    ..Sample::of(keys, index)
                },
                None => Sample {
                    index: floor.index,
                    time: start,
                    value: identity,
                    tangents: floor.tangents.map(|_| Tangents::new(identity, identity)),
                },
            };
        } else if ceil.time > end || (in_clip && ceil.time < time) {
            // past the last key of the clip, loop back to its first one
            if let Some(index) = self.index_of(start) {
                ceil = Sample {
                    time: end,
                    ..Sample::of(keys, index)
                };
            }
        }
        if floor.index == ceil.index {
            return Ok(floor.value);
        }

        self.interpolate(time, &floor, &ceil)
    }

    fn interpolate(&self, time: i32, floor: &Sample, ceil: &Sample) -> Result<Value, StateError> {
        let span = i64::from(ceil.time) - i64::from(floor.time);
        if span == 0 {
            return Ok(floor.value);
        }
        let t = (i64::from(time) - i64::from(floor.time)) as f32 / span as f32;

        match self.interpolation() {
            Interpolation::DontInterp => Ok(floor.value),
            Interpolation::Linear => linear(floor.value, ceil.value, t),
            mode @ Interpolation::Hermite | mode @ Interpolation::Bezier => {
                if let Value::Integer(_) = floor.value {
                    return Ok(floor.value);
                }
                match (floor.tangents, ceil.tangents) {
                    (Some(a), Some(b)) => {
                        cubic(mode, floor.value, a.out_tan, b.in_tan, ceil.value, t)
                    }
                    _ => Err(StateError::invalid(format!(
                        "{} span {}..{} is missing tangents",
                        mode.keyword(),
                        floor.time,
                        ceil.time
                    ))),
                }
            }
        }
    }
}

fn mismatch(a: &Value, b: &Value) -> StateError {
    StateError::invalid(format!(
        "cannot blend {:?} with {:?}",
        a.kind(),
        b.kind()
    ))
}

fn linear(a: Value, b: Value, t: f32) -> Result<Value, StateError> {
    match (a, b) {
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(math::lerp(a, b, t))),
        (Value::Vector3(a), Value::Vector3(b)) => Ok(Value::Vector3(math::lerp(a, b, t))),
        (Value::Quaternion(a), Value::Quaternion(b)) => Ok(Value::Quaternion(math::slerp(a, b, t))),
        // texture ids never blend
        (Value::Integer(_), Value::Integer(_)) => Ok(a),
        (a, b) => Err(mismatch(&a, &b)),
    }
}

fn cubic(
    mode: Interpolation,
    a: Value,
    out_tan: Value,
    in_tan: Value,
    b: Value,
    t: f32,
) -> Result<Value, StateError> {
    let bezier = mode == Interpolation::Bezier;
    match (a, out_tan, in_tan, b) {
        (Value::Float(a), Value::Float(o), Value::Float(i), Value::Float(b)) => Ok(Value::Float(
            if bezier {
                math::bezier(a, o, i, b, t)
            } else {
                math::hermite(a, o, i, b, t)
            },
        )),
        (Value::Vector3(a), Value::Vector3(o), Value::Vector3(i), Value::Vector3(b)) => {
            Ok(Value::Vector3(if bezier {
                math::bezier(a, o, i, b, t)
            } else {
                math::hermite(a, o, i, b, t)
            }))
        }
        (
            Value::Quaternion(a),
            Value::Quaternion(o),
            Value::Quaternion(i),
            Value::Quaternion(b),
        ) => Ok(Value::Quaternion(math::squad(a, o, i, b, t))),
        (a, _, _, b) => Err(mismatch(&a, &b)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Property;
    use cgmath::{InnerSpace, Quaternion, Rad, Rotation3, Vector3};

    fn track(property: Property, mode: Interpolation, keys: &[(i32, Value)]) -> Timeline {
        let mut t = Timeline::new(property, mode);
        for (time, value) in keys {
            let tans = if mode.has_tangents() {
                Some(Tangents::new(*value, *value))
            } else {
                None
            };
            t.insert(*time, *value, tans).unwrap();
        }
        t
    }

    fn clip(start: i32, end: i32, local: i32) -> Playback {
        Playback::new(Some(Clip { start, end }), vec![]).at(local)
    }

    fn float(t: &Timeline, ctx: &Playback) -> f32 {
        t.evaluate(ctx).unwrap().as_float().unwrap()
    }

    #[test]
    fn empty_track_is_identity() {
        let t = Timeline::new(Property::Scaling, Interpolation::Linear);
        assert_eq!(
            t.evaluate(&clip(0, 10, 5)).unwrap(),
            Value::Vector3(Vector3::new(1., 1., 1.))
        );
    }

    #[test]
    fn step_holds_previous_key() {
        let t = track(
            Property::Alpha,
            Interpolation::DontInterp,
            &[(0, Value::Float(0.25)), (10, Value::Float(0.75))],
        );
        for local in 0..10 {
            assert_eq!(float(&t, &clip(0, 20, local)), 0.25, "at {}", local);
        }
        for local in 10..=20 {
            assert_eq!(float(&t, &clip(0, 20, local)), 0.75, "at {}", local);
        }
    }

    #[test]
    fn linear_midpoint() {
        let t = track(
            Property::Alpha,
            Interpolation::Linear,
            &[(0, Value::Float(0.)), (10, Value::Float(10.))],
        );
        assert_eq!(float(&t, &clip(0, 10, 5)), 5.);
    }

    #[test]
    fn key_before_clip_is_identity() {
        let t = track(Property::Alpha, Interpolation::Linear, &[(5, Value::Float(0.2))]);
        assert_eq!(float(&t, &clip(100, 200, 50)), 1.);
    }

    #[test]
    fn key_before_clip_wraps_to_clip_end() {
        let t = track(
            Property::Alpha,
            Interpolation::Linear,
            &[(5, Value::Float(0.2)), (200, Value::Float(0.6))],
        );
        assert_eq!(float(&t, &clip(100, 200, 50)), 0.6);
    }

    #[test]
    fn tail_of_clip_loops_towards_first_key() {
        let t = track(
            Property::Alpha,
            Interpolation::Linear,
            &[(0, Value::Float(0.)), (50, Value::Float(1.))],
        );
        // halfway between the key at 50 and the wrapped key at 100
        assert!((float(&t, &clip(0, 100, 75)) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn key_after_clip_is_clamped() {
        let t = track(Property::Alpha, Interpolation::Linear, &[(500, Value::Float(0.3))]);
        assert_eq!(float(&t, &clip(0, 100, 10)), 0.3);
    }

    #[test]
    fn no_clip_uses_first_key() {
        let t = track(
            Property::Alpha,
            Interpolation::Linear,
            &[(3, Value::Float(0.4)), (9, Value::Float(0.9))],
        );
        assert_eq!(float(&t, &Playback::default()), 0.4);
    }

    #[test]
    fn global_sequence_loops() {
        let t = track(
            Property::Alpha,
            Interpolation::Linear,
            &[(0, Value::Float(0.)), (50, Value::Float(1.)), (100, Value::Float(0.))],
        )
        .with_global_sequence(Some(0));
        for elapsed in 0..100 {
            let a =
                Playback::new(Some(Clip { start: 0, end: 10 }), vec![100]).with_elapsed(elapsed);
            let b = Playback::new(Some(Clip { start: 3000, end: 4000 }), vec![100])
                .at(77)
                .with_elapsed(elapsed + 100);
            assert_eq!(float(&t, &a), float(&t, &b), "at {}", elapsed);
        }
        let ctx = Playback::new(None, vec![100]).with_elapsed(225);
        assert!((float(&t, &ctx) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn unresolved_global_sequence_falls_back_to_clip() {
        let t = track(
            Property::Alpha,
            Interpolation::Linear,
            &[(0, Value::Float(0.)), (10, Value::Float(10.))],
        )
        .with_global_sequence(Some(4));
        assert_eq!(float(&t, &clip(0, 10, 5)), 5.);
    }

    #[test]
    fn rotation_uses_slerp() {
        let half_turn = Quaternion::new(0., 0., 1., 0.);
        let t = track(
            Property::Rotation,
            Interpolation::Linear,
            &[(0, Value::Quaternion(math::QUAT_IDENTITY)), (10, Value::Quaternion(half_turn))],
        );
        let q = t.evaluate(&clip(0, 10, 5)).unwrap().as_quaternion().unwrap();
        let expected =
            Quaternion::from_axis_angle(Vector3::unit_y(), Rad(std::f32::consts::FRAC_PI_2));
        assert!((q - expected).magnitude() < 1e-5, "{:?}", q);
    }

    #[test]
    fn texture_ids_never_blend() {
        for mode in &[Interpolation::Linear, Interpolation::Hermite, Interpolation::Bezier] {
            let t = track(
                Property::TextureId,
                *mode,
                &[(0, Value::Integer(2)), (10, Value::Integer(7))],
            );
            assert_eq!(t.evaluate(&clip(0, 10, 9)).unwrap(), Value::Integer(2));
        }
    }

    #[test]
    fn hermite_with_flat_tangents_eases() {
        let mut t = Timeline::new(Property::Alpha, Interpolation::Hermite);
        let flat = Tangents::new(Value::Float(0.), Value::Float(0.));
        t.insert(0, Value::Float(0.), Some(flat)).unwrap();
        t.insert(10, Value::Float(1.), Some(flat)).unwrap();
        let mid = float(&t, &clip(0, 10, 5));
        let early = float(&t, &clip(0, 10, 2));
        assert!((mid - 0.5).abs() < 1e-6);
        assert!(early < 0.2);
    }

    #[test]
    fn bezier_vectors_hit_keys() {
        let a = Value::Vector3(Vector3::new(0., 0., 0.));
        let b = Value::Vector3(Vector3::new(3., 6., 9.));
        let t = track(Property::Translation, Interpolation::Bezier, &[(0, a), (10, b)]);
        assert_eq!(t.evaluate(&clip(0, 10, 0)).unwrap(), a);
        assert_eq!(t.evaluate(&clip(0, 10, 10)).unwrap(), b);
    }

    #[test]
    fn keys_straddling_clip_are_identity() {
        let t = track(
            Property::Alpha,
            Interpolation::Linear,
            &[(0, Value::Float(0.2)), (300, Value::Float(0.4))],
        );
        assert_eq!(float(&t, &clip(100, 200, 50)), 1.);
    }

    #[test]
    fn key_after_clip_end_wraps_to_clip_start() {
        let keys = [
            (0, Value::Float(0.)),
            (50, Value::Float(1.)),
            (150, Value::Float(9.)),
        ];
        let t = track(Property::Alpha, Interpolation::Linear, &keys);
        // the key at 0 stands in for the one at 150, placed at the clip end
        assert!((float(&t, &clip(0, 100, 75)) - 0.5).abs() < 1e-6);

        // without a key on the clip start the later key is used as is
        let t = track(Property::Alpha, Interpolation::Linear, &keys[1..]);
        assert!((float(&t, &clip(0, 100, 75)) - 3.).abs() < 1e-6);
    }

    #[test]
    fn hermite_rotation_uses_squad() {
        let turned = Quaternion::from_axis_angle(Vector3::unit_y(), Rad(1.));
        let t = track(
            Property::Rotation,
            Interpolation::Hermite,
            &[(0, Value::Quaternion(math::QUAT_IDENTITY)), (10, Value::Quaternion(turned))],
        );

        let mut last = 1.;
        for local in 0..=10 {
            let q = t.evaluate(&clip(0, 10, local)).unwrap().as_quaternion().unwrap();
            assert!(q.s.is_finite() && q.v.y.is_finite(), "at {}", local);
            assert!((q.magnitude() - 1.).abs() < 1e-5, "at {}", local);
            assert!(q.s <= last + 1e-6, "at {}", local);
            last = q.s;
        }
        assert!((last - 0.5f32.cos()).abs() < 1e-5);

        // tangents equal to the keys reduce squad to slerp
        let mid = t.evaluate(&clip(0, 10, 5)).unwrap().as_quaternion().unwrap();
        let expected = Quaternion::from_axis_angle(Vector3::unit_y(), Rad(0.5));
        assert!((mid - expected).magnitude() < 1e-5, "{:?}", mid);
    }

    struct Reversed;

    impl PlaybackContext for Reversed {
        fn clip(&self) -> Option<Clip> {
            Some(Clip { start: 0, end: 10 })
        }

        fn local_time(&self) -> i32 {
            5
        }

        fn global_sequence(&self, _id: u32) -> Option<GlobalSequenceState> {
            Some(GlobalSequenceState {
                time: 3,
                duration: -100,
            })
        }
    }

    #[test]
    fn negative_global_duration_falls_back_to_clip() {
        let t = track(
            Property::Alpha,
            Interpolation::Linear,
            &[(0, Value::Float(0.)), (10, Value::Float(1.))],
        )
        .with_global_sequence(Some(0));
        assert_eq!(t.evaluate(&Reversed).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn huge_global_durations_stay_positive() {
        let ctx = Playback::new(None, vec![u32::MAX]).with_elapsed(7);
        let gs = ctx.global_sequence(0).unwrap();
        assert_eq!(gs, GlobalSequenceState { time: 7, duration: i32::MAX });
    }
}
