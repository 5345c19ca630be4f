//! Blend helpers shared by the evaluator.
//!
//! Scalars and vectors go through the generic [`lerp`], [`hermite`] and
//! [`bezier`]; quaternions use [`slerp`] and [`squad`].

use cgmath::{InnerSpace, Quaternion};

use std::ops::{Add, Mul};

pub const QUAT_IDENTITY: Quaternion<f32> = Quaternion {
    s: 1.,
    v: cgmath::Vector3 {
        x: 0.,
        y: 0.,
        z: 0.,
    },
};

#[inline]
pub fn lerp<T>(a: T, b: T, t: f32) -> T
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    a * (1. - t) + b * t
}

/// Cubic Hermite between `a` and `b` using `a`'s out-tangent and `b`'s in-tangent.
#[inline]
pub fn hermite<T>(a: T, out_tan: T, in_tan: T, b: T, t: f32) -> T
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    let t2 = t * t;
    let f1 = t2 * (2. * t - 3.) + 1.;
    let f2 = t2 * (t - 2.) + t;
    let f3 = t2 * (t - 1.);
    let f4 = t2 * (3. - 2. * t);
    a * f1 + out_tan * f2 + in_tan * f3 + b * f4
}

/// Cubic Bezier with the tangents as the two inner control points.
#[inline]
pub fn bezier<T>(a: T, out_tan: T, in_tan: T, b: T, t: f32) -> T
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    let inv = 1. - t;
    let f1 = inv * inv * inv;
    let f2 = 3. * t * inv * inv;
    let f3 = 3. * t * t * inv;
    let f4 = t * t * t;
    a * f1 + out_tan * f2 + in_tan * f3 + b * f4
}

/// Spherical interpolation along the shorter arc.
pub fn slerp(a: Quaternion<f32>, b: Quaternion<f32>, t: f32) -> Quaternion<f32> {
    let mut cos = a.dot(b);
    let mut b = b;
    if cos < 0. {
        cos = -cos;
        b = -b;
    }
    let (s0, s1) = if 1. - cos > 1e-6 {
        let omega = cos.acos();
        let sin = omega.sin();
        (((1. - t) * omega).sin() / sin, (t * omega).sin() / sin)
    } else {
        // nearly parallel, fall back to a straight blend
        (1. - t, t)
    };
    a * s0 + b * s1
}

/// Spherical cubic through `a` and `b` with tangent quaternions.
pub fn squad(
    a: Quaternion<f32>,
    out_tan: Quaternion<f32>,
    in_tan: Quaternion<f32>,
    b: Quaternion<f32>,
    t: f32,
) -> Quaternion<f32> {
    let outer = slerp(a, b, t);
    let inner = slerp(out_tan, in_tan, t);
    slerp(outer, inner, 2. * t * (1. - t))
}
