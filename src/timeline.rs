use cgmath::{Quaternion, Vector3};

use crate::error::StateError;
use crate::{Interpolation, Keyframe, Property, Tangents, Value, ValueKind};

/// Normal of the plane a timeline is mirrored across.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn mirror_point(self, mut v: Vector3<f32>) -> Vector3<f32> {
        match self {
            Axis::X => v.x = -v.x,
            Axis::Y => v.y = -v.y,
            Axis::Z => v.z = -v.z,
        }
        v
    }

    /// Rotation axes are pseudovectors: the part along the normal survives.
    fn mirror_rotation(self, q: Quaternion<f32>) -> Quaternion<f32> {
        let mut v = -q.v;
        match self {
            Axis::X => v.x = q.v.x,
            Axis::Y => v.y = q.v.y,
            Axis::Z => v.z = q.v.z,
        }
        Quaternion::from_sv(q.s, v)
    }
}

/// Sparse keyframe track animating one property.
///
/// Keyframes are kept strictly increasing by time. Every key carries tangents
/// when the interpolation mode needs them and none otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    property: Property,
    interpolation: Interpolation,
    global_sequence: Option<u32>,
    keyframes: Vec<Keyframe>,
}

impl Timeline {
    pub fn new(property: Property, interpolation: Interpolation) -> Self {
        Self {
            property,
            interpolation,
            global_sequence: None,
            keyframes: vec![],
        }
    }

    pub fn with_global_sequence(mut self, global_sequence: Option<u32>) -> Self {
        self.global_sequence = global_sequence;
        self
    }

    /// Builds a timeline from keys in any order. Duplicate times are rejected.
    pub fn from_keyframes(
        property: Property,
        interpolation: Interpolation,
        global_sequence: Option<u32>,
        mut keyframes: Vec<Keyframe>,
    ) -> Result<Self, StateError> {
        let mut timeline = Self::new(property, interpolation).with_global_sequence(global_sequence);
        for key in &keyframes {
            timeline.check(key)?;
        }
        keyframes.sort_by_key(|k| k.time);
        if let Some(time) = first_duplicate(&keyframes) {
            return Err(StateError::DuplicateKeyframe { time });
        }
        timeline.keyframes = keyframes;
        Ok(timeline)
    }

    pub fn property(&self) -> Property {
        self.property
    }

    pub fn value_kind(&self) -> ValueKind {
        self.property.value_kind()
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn global_sequence(&self) -> Option<u32> {
        self.global_sequence
    }

    pub fn set_global_sequence(&mut self, global_sequence: Option<u32>) {
        self.global_sequence = global_sequence;
    }

    pub fn has_tangents(&self) -> bool {
        self.interpolation.has_tangents()
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Keyframe> {
        self.keyframes.iter()
    }

    pub fn first_time(&self) -> Option<i32> {
        self.keyframes.first().map(|k| k.time)
    }

    pub fn last_time(&self) -> Option<i32> {
        self.keyframes.last().map(|k| k.time)
    }

    fn check(&self, key: &Keyframe) -> Result<(), StateError> {
        let kind = self.value_kind();
        if key.value.kind() != kind {
            return Err(StateError::invalid(format!(
                "{:?} value in a {:?} track",
                key.value.kind(),
                self.property
            )));
        }
        match (self.has_tangents(), &key.tangents) {
            (true, Some(tans)) if tans.in_tan.kind() == kind && tans.out_tan.kind() == kind => {
                Ok(())
            }
            (true, Some(_)) => Err(StateError::invalid(format!(
                "tangent kind does not match {:?} track",
                self.property
            ))),
            (true, None) => Err(StateError::invalid(format!(
                "{} keyframe at {} has no tangents",
                self.interpolation.keyword(),
                key.time
            ))),
            (false, Some(_)) => Err(StateError::invalid(format!(
                "{} keyframe at {} carries tangents",
                self.interpolation.keyword(),
                key.time
            ))),
            (false, None) => Ok(()),
        }
    }

    /// Adjusts a key's tangents to this timeline's mode.
    fn conform(&self, mut key: Keyframe) -> Keyframe {
        key.tangents = match (self.has_tangents(), key.tangents) {
            (true, Some(t)) => Some(t),
            (true, None) => Some(Tangents::empty(self.value_kind())),
            (false, _) => None,
        };
        key
    }

    pub fn insert(
        &mut self,
        time: i32,
        value: Value,
        tangents: Option<Tangents>,
    ) -> Result<(), StateError> {
        let key = Keyframe {
            time,
            value,
            tangents,
        };
        self.check(&key)?;
        match self.keyframes.binary_search_by_key(&time, |k| k.time) {
            Ok(_) => Err(StateError::DuplicateKeyframe { time }),
            Err(index) => {
                self.keyframes.insert(index, key);
                Ok(())
            }
        }
    }

    pub fn remove_at(&mut self, time: i32) -> Result<Keyframe, StateError> {
        match self.keyframes.binary_search_by_key(&time, |k| k.time) {
            Ok(index) => Ok(self.keyframes.remove(index)),
            Err(_) => Err(StateError::KeyframeNotFound { time }),
        }
    }

    /// Moves the key at `from` to `to`.
    pub fn slide(&mut self, from: i32, to: i32) -> Result<(), StateError> {
        let index = self
            .keyframes
            .binary_search_by_key(&from, |k| k.time)
            .map_err(|_| StateError::KeyframeNotFound { time: from })?;
        if from == to {
            return Ok(());
        }
        if self.keyframe_at(to).is_some() {
            return Err(StateError::DuplicateKeyframe { time: to });
        }
        self.keyframes[index].time = to;
        self.keyframes.sort_by_key(|k| k.time);
        Ok(())
    }

    /// Greatest index whose time is `<= time`. 0 when empty or when `time`
    /// precedes every key.
    pub fn floor_index(&self, time: i32) -> usize {
        self.keyframes
            .partition_point(|k| k.time <= time)
            .saturating_sub(1)
    }

    /// Least index whose time is `>= time`, saturating to the last index.
    /// 0 when empty.
    pub fn ceil_index(&self, time: i32) -> usize {
        let index = self.keyframes.partition_point(|k| k.time < time);
        index.min(self.keyframes.len().saturating_sub(1))
    }

    pub fn keyframe_at(&self, time: i32) -> Option<&Keyframe> {
        self.keyframes
            .binary_search_by_key(&time, |k| k.time)
            .ok()
            .map(|i| &self.keyframes[i])
    }

    pub fn value_at(&self, time: i32) -> Option<Value> {
        self.keyframe_at(time).map(|k| k.value)
    }

    /// Replaces the value (and tangents) of the key at `time`.
    pub fn set_keyframe(
        &mut self,
        time: i32,
        value: Value,
        tangents: Option<Tangents>,
    ) -> Result<(), StateError> {
        let key = Keyframe {
            time,
            value,
            tangents,
        };
        self.check(&key)?;
        let index = self
            .keyframes
            .binary_search_by_key(&time, |k| k.time)
            .map_err(|_| StateError::KeyframeNotFound { time })?;
        self.keyframes[index] = key;
        Ok(())
    }

    /// Deletes every key in `[start, end]` and returns how many went.
    /// Tracks bound to a global sequence do not belong to any clip and are
    /// left alone.
    pub fn remove_range(&mut self, start: i32, end: i32) -> usize {
        if self.global_sequence.is_some() {
            log::debug!("{:?} track follows a global sequence, not deleting keys", self.property);
            return 0;
        }
        let before = self.keyframes.len();
        self.keyframes.retain(|k| k.time < start || k.time > end);
        before - self.keyframes.len()
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
        let keys = std::mem::take(&mut self.keyframes);
        self.keyframes = keys.into_iter().map(|k| self.conform(k)).collect();
    }

    /// Rescales every key in `[src_start, src_end]` into `[dst_start, dst_end]`.
    pub fn retime(
        &mut self,
        src_start: i32,
        src_end: i32,
        dst_start: i32,
        dst_end: i32,
    ) -> Result<(), StateError> {
        let mut keys = self.keyframes.clone();
        for key in keys.iter_mut() {
            if key.time >= src_start && key.time <= src_end {
                key.time = remap(key.time, src_start, src_end, dst_start, dst_end);
            }
        }
        keys.sort_by_key(|k| k.time);
        if let Some(time) = first_duplicate(&keys) {
            return Err(StateError::DuplicateKeyframe { time });
        }
        self.keyframes = keys;
        Ok(())
    }

    /// Copies the keys of `source` found in `[src_start, src_end]` into this
    /// timeline, rescaled into `[dst_start, dst_end]`.
    pub fn copy_retimed_from(
        &mut self,
        source: &Timeline,
        src_start: i32,
        src_end: i32,
        dst_start: i32,
        dst_end: i32,
    ) -> Result<(), StateError> {
        if source.property != self.property {
            return Err(StateError::invalid(format!(
                "cannot copy {:?} keys into a {:?} track",
                source.property, self.property
            )));
        }
        let mut keys = self.keyframes.clone();
        keys.extend(
            source
                .iter()
                .filter(|k| k.time >= src_start && k.time <= src_end)
                .map(|k| {
                    let mut k = self.conform(*k);
                    k.time = remap(k.time, src_start, src_end, dst_start, dst_end);
                    k
                }),
        );
        keys.sort_by_key(|k| k.time);
        if let Some(time) = first_duplicate(&keys) {
            return Err(StateError::DuplicateKeyframe { time });
        }
        self.keyframes = keys;
        Ok(())
    }

    /// Mirrors translation and rotation keys, tangents included, across the
    /// plane normal to `axis`. Other tracks have nothing to mirror.
    pub fn flip_over(&mut self, axis: Axis) {
        let property = self.property;
        let mirror = |v: Value| match (property, v) {
            (Property::Translation, Value::Vector3(p)) => Value::Vector3(axis.mirror_point(p)),
            (Property::Rotation, Value::Quaternion(q)) => {
                Value::Quaternion(axis.mirror_rotation(q))
            }
            (_, v) => v,
        };
        for key in self.keyframes.iter_mut() {
            key.value = mirror(key.value);
            if let Some(tans) = key.tangents.as_mut() {
                tans.in_tan = mirror(tans.in_tan);
                tans.out_tan = mirror(tans.out_tan);
            }
        }
    }

    /// Of two alpha tracks, the one that is never less visible than the
    /// other. A key with no partner at its time counts against its own
    /// track when it is below full opacity. `Ok(None)` when each track wins
    /// somewhere; the partner wins ties.
    pub fn most_visible<'a>(
        &'a self,
        partner: &'a Timeline,
    ) -> Result<Option<&'a Timeline>, StateError> {
        if self.property != Property::Alpha || partner.property != Property::Alpha {
            return Err(StateError::invalid(format!(
                "visibility compares alpha tracks, not {:?} and {:?}",
                self.property, partner.property
            )));
        }
        let alpha = |k: &Keyframe| k.value.as_float().unwrap_or(1.);

        let (mut this_wins, mut partner_wins) = (false, false);
        for key in &self.keyframes {
            match partner.keyframe_at(key.time) {
                Some(other) if alpha(other) > alpha(key) => partner_wins = true,
                Some(other) if alpha(other) < alpha(key) => this_wins = true,
                Some(_) => {}
                None if alpha(key) < 1. => partner_wins = true,
                None => {}
            }
        }
        for key in &partner.keyframes {
            if self.keyframe_at(key.time).is_none() && alpha(key) < 1. {
                this_wins = true;
            }
        }

        Ok(match (this_wins, partner_wins) {
            (true, true) => None,
            (true, false) => Some(self),
            (false, _) => Some(partner),
        })
    }
}

fn remap(time: i32, src_start: i32, src_end: i32, dst_start: i32, dst_end: i32) -> i32 {
    if src_end == src_start {
        return dst_start;
    }
    let ratio = (i64::from(time) - i64::from(src_start)) as f64
        / (i64::from(src_end) - i64::from(src_start)) as f64;
    (f64::from(dst_start) + ratio * (i64::from(dst_end) - i64::from(dst_start)) as f64) as i32
}

fn first_duplicate(sorted: &[Keyframe]) -> Option<i32> {
    sorted
        .windows(2)
        .find(|w| w[0].time == w[1].time)
        .map(|w| w[0].time)
}

#[cfg(test)]
mod test {
    use super::*;
    use cgmath::{InnerSpace, Rad, Rotation3};

    fn alpha(keys: &[(i32, f32)]) -> Timeline {
        let mut t = Timeline::new(Property::Alpha, Interpolation::Linear);
        for (time, v) in keys {
            t.insert(*time, Value::Float(*v), None).unwrap();
        }
        t
    }

    fn times(t: &Timeline) -> Vec<i32> {
        t.iter().map(|k| k.time).collect()
    }

    #[test]
    fn insert_keeps_order() {
        let t = alpha(&[(30, 0.), (10, 1.), (20, 0.5), (-5, 0.2)]);
        assert_eq!(times(&t), [-5, 10, 20, 30]);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut t = alpha(&[(0, 0.), (10, 1.)]);
        let before = t.clone();
        assert_eq!(
            t.insert(10, Value::Float(0.3), None),
            Err(StateError::DuplicateKeyframe { time: 10 })
        );
        assert_eq!(t, before);
    }

    #[test]
    fn insert_checks_kind_and_tangents() {
        let mut t = alpha(&[]);
        assert!(matches!(
            t.insert(0, Value::Integer(1), None),
            Err(StateError::InvalidInterpolationState { .. })
        ));
        let tans = Tangents::new(Value::Float(0.), Value::Float(0.));
        assert!(t.insert(0, Value::Float(1.), Some(tans)).is_err());

        let mut t = Timeline::new(Property::Translation, Interpolation::Hermite);
        let v = Value::Vector3(Vector3::new(1., 2., 3.));
        assert!(t.insert(0, v, None).is_err());
        assert!(t.insert(0, v, Some(Tangents::new(v, v))).is_ok());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn remove_missing_key() {
        let mut t = alpha(&[(0, 0.), (10, 1.)]);
        assert_eq!(t.remove_at(5), Err(StateError::KeyframeNotFound { time: 5 }));
        assert_eq!(t.remove_at(10).unwrap().value, Value::Float(1.));
        assert_eq!(times(&t), [0]);
    }

    #[test]
    fn slide_resorts_and_rejects_collisions() {
        let mut t = alpha(&[(0, 0.), (10, 1.), (20, 2.)]);
        t.slide(0, 15).unwrap();
        assert_eq!(times(&t), [10, 15, 20]);
        assert_eq!(t.value_at(15), Some(Value::Float(0.)));
        assert_eq!(t.slide(15, 20), Err(StateError::DuplicateKeyframe { time: 20 }));
        assert_eq!(t.slide(3, 4), Err(StateError::KeyframeNotFound { time: 3 }));
        t.slide(20, 20).unwrap();
    }

    #[test]
    fn floor_and_ceil() {
        let t = alpha(&[(0, 0.), (10, 1.), (20, 2.)]);
        assert_eq!(t.floor_index(-5), 0);
        assert_eq!(t.floor_index(0), 0);
        assert_eq!(t.floor_index(9), 0);
        assert_eq!(t.floor_index(10), 1);
        assert_eq!(t.floor_index(99), 2);
        assert_eq!(t.ceil_index(-5), 0);
        assert_eq!(t.ceil_index(1), 1);
        assert_eq!(t.ceil_index(10), 1);
        assert_eq!(t.ceil_index(11), 2);
        assert_eq!(t.ceil_index(99), 2);

        let empty = alpha(&[]);
        assert_eq!(empty.floor_index(3), 0);
        assert_eq!(empty.ceil_index(3), 0);
    }

    #[test]
    fn retime_rescales_range() {
        let mut t = alpha(&[(0, 0.), (100, 1.), (200, 2.), (500, 3.)]);
        t.retime(100, 200, 1000, 1050).unwrap();
        assert_eq!(times(&t), [0, 500, 1000, 1050]);
        assert_eq!(t.value_at(1050), Some(Value::Float(2.)));
    }

    #[test]
    fn retime_collision_leaves_timeline_alone() {
        let mut t = alpha(&[(0, 0.), (1, 1.), (10, 2.)]);
        let before = t.clone();
        assert_eq!(
            t.retime(0, 10, 0, 1),
            Err(StateError::DuplicateKeyframe { time: 0 })
        );
        assert_eq!(t, before);
    }

    #[test]
    fn copy_between_timelines() {
        let src = alpha(&[(0, 0.), (10, 1.), (20, 2.)]);
        let mut dst = Timeline::new(Property::Alpha, Interpolation::Bezier);
        dst.copy_retimed_from(&src, 10, 20, 100, 120).unwrap();
        assert_eq!(times(&dst), [100, 120]);
        assert!(dst.iter().all(|k| k.tangents == Some(Tangents::empty(ValueKind::Float))));

        let mut wrong = Timeline::new(Property::Color, Interpolation::Linear);
        assert!(wrong.copy_retimed_from(&src, 0, 20, 0, 20).is_err());
    }

    #[test]
    fn sort_invariant_after_mixed_edits() {
        let mut t = alpha(&[(5, 0.), (50, 1.), (25, 2.)]);
        t.slide(50, 1).unwrap();
        t.insert(3, Value::Float(4.), None).unwrap();
        t.retime(0, 10, 40, 60).unwrap();
        let src = alpha(&[(7, 1.)]);
        t.copy_retimed_from(&src, 0, 10, 0, 10).unwrap();
        let ts = times(&t);
        assert!(ts.windows(2).all(|w| w[0] < w[1]), "{:?}", ts);
    }

    #[test]
    fn interpolation_switch_converts_tangents() {
        let mut t = alpha(&[(0, 0.), (10, 1.)]);
        t.set_interpolation(Interpolation::Hermite);
        assert!(t.iter().all(|k| k.tangents.is_some()));
        t.set_interpolation(Interpolation::Linear);
        assert!(t.iter().all(|k| k.tangents.is_none()));
    }

    #[test]
    fn remove_range_skips_global_sequences() {
        let mut t = alpha(&[(0, 0.), (10, 1.), (20, 2.)]);
        assert_eq!(t.remove_range(5, 20), 2);
        assert_eq!(times(&t), [0]);

        let mut g = alpha(&[(0, 0.), (10, 1.)]).with_global_sequence(Some(0));
        assert_eq!(g.remove_range(0, 10), 0);
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn from_keyframes_sorts_and_rejects_duplicates() {
        let keys = vec![
            Keyframe::new(10, Value::Float(1.)),
            Keyframe::new(0, Value::Float(0.)),
        ];
        let t = Timeline::from_keyframes(Property::Alpha, Interpolation::Linear, None, keys.clone())
            .unwrap();
        assert_eq!(times(&t), [0, 10]);

        let mut dup = keys;
        dup.push(Keyframe::new(10, Value::Float(3.)));
        let res = Timeline::from_keyframes(Property::Alpha, Interpolation::Linear, None, dup);
        assert!(res.is_err());
    }

    #[test]
    fn flip_over_mirrors_translations() {
        let mut t = Timeline::new(Property::Translation, Interpolation::Hermite);
        let tans = Tangents::new(
            Value::Vector3(Vector3::new(0., 1., 0.)),
            Value::Vector3(Vector3::new(0., -1., 5.)),
        );
        t.insert(0, Value::Vector3(Vector3::new(1., 2., 3.)), Some(tans))
            .unwrap();
        t.flip_over(Axis::Y);

        let key = t.keyframe_at(0).unwrap();
        assert_eq!(key.value, Value::Vector3(Vector3::new(1., -2., 3.)));
        let tans = key.tangents.unwrap();
        assert_eq!(tans.in_tan, Value::Vector3(Vector3::new(0., -1., 0.)));
        assert_eq!(tans.out_tan, Value::Vector3(Vector3::new(0., 1., 5.)));
    }

    #[test]
    fn flip_over_mirrors_rotations() {
        let spin = Quaternion::from_axis_angle(Vector3::unit_y(), Rad(0.5));
        let mut t = Timeline::new(Property::Rotation, Interpolation::Linear);
        t.insert(0, Value::Quaternion(spin), None).unwrap();
        t.flip_over(Axis::X);
        let flipped = t.value_at(0).unwrap().as_quaternion().unwrap();

        let expected = Quaternion::from_axis_angle(Vector3::unit_y(), Rad(-0.5));
        assert!((flipped - expected).magnitude() < 1e-6);

        // rotating a mirrored point matches mirroring the rotated point
        let p = Vector3::new(1., 2., 3.);
        let mirrored = Axis::X.mirror_point(spin * p);
        assert!((flipped * Axis::X.mirror_point(p) - mirrored).magnitude() < 1e-5);

        // spinning about the normal itself is untouched
        let about_x = Quaternion::from_axis_angle(Vector3::unit_x(), Rad(0.5));
        assert_eq!(Axis::X.mirror_rotation(about_x), about_x);
    }

    #[test]
    fn flip_over_leaves_scalars_alone() {
        let mut t = alpha(&[(0, 0.5)]);
        let before = t.clone();
        t.flip_over(Axis::Z);
        assert_eq!(t, before);
    }

    #[test]
    fn most_visible_alpha_track() {
        let opaque = alpha(&[(0, 1.), (10, 1.)]);
        let fading = alpha(&[(0, 1.), (10, 0.)]);
        assert_eq!(opaque.most_visible(&fading).unwrap(), Some(&opaque));
        assert_eq!(fading.most_visible(&opaque).unwrap(), Some(&opaque));

        // each is more visible somewhere
        let other = alpha(&[(0, 0.), (10, 1.)]);
        assert_eq!(fading.most_visible(&other).unwrap(), None);

        // a lone key below full opacity counts against its track
        let sparse = alpha(&[(5, 0.5)]);
        assert_eq!(opaque.most_visible(&sparse).unwrap(), Some(&opaque));

        // ties go to the partner
        let twin = opaque.clone();
        assert!(std::ptr::eq(
            opaque.most_visible(&twin).unwrap().unwrap(),
            &twin
        ));

        let moving = Timeline::new(Property::Translation, Interpolation::Linear);
        assert!(opaque.most_visible(&moving).is_err());
    }
}
