use glam::{Mat4, Quat, Vec3};

/// How values between two keyframes are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Component-wise lerp (slerp for rotations).
    Linear,
    /// Hold the earlier keyframe until the next one.
    Step,
}

/// Values that can be blended between keyframes.
pub trait Keyframe: Copy {
    /// Blend from `self` to `other` by `t` in `[0, 1]`.
    fn blend(self, other: Self, t: f32) -> Self;
}

impl Keyframe for Vec3 {
    fn blend(self, other: Self, t: f32) -> Self {
        self.lerp(other, t)
    }
}

impl Keyframe for Quat {
    fn blend(self, other: Self, t: f32) -> Self {
        self.slerp(other, t).normalize()
    }
}

/// Keyframes for one animated property.
#[derive(Debug, Clone, PartialEq)]
pub struct Track<T> {
    times: Vec<f32>,
    values: Vec<T>,
    interpolation: Interpolation,
}

impl<T: Keyframe> Track<T> {
    /// Build a track. Returns `None` when there are no keyframes or the
    /// time and value counts differ.
    #[must_use]
    pub fn new(times: Vec<f32>, values: Vec<T>, interpolation: Interpolation) -> Option<Self> {
        if times.is_empty() || times.len() != values.len() {
            return None;
        }
        Some(Self {
            times,
            values,
            interpolation,
        })
    }

    /// Time of the last keyframe.
    #[must_use]
    pub fn end_time(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    /// Value at time `t`, holding the first/last keyframe outside the range.
    #[must_use]
    pub fn sample(&self, t: f32) -> T {
        let next = self.times.partition_point(|&k| k <= t);
        if next == 0 {
            return self.values[0];
        }
        if next >= self.times.len() {
            return self.values[self.values.len() - 1];
        }
        let prev = next - 1;
        match self.interpolation {
            Interpolation::Step => self.values[prev],
            Interpolation::Linear => {
                let span = self.times[next] - self.times[prev];
                let local = if span > 0.0 {
                    (t - self.times[prev]) / span
                } else {
                    0.0
                };
                self.values[prev].blend(self.values[next], local)
            }
        }
    }
}

/// Translation / rotation / scale of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Translation.
    pub translation: Vec3,
    /// Rotation.
    pub rotation: Quat,
    /// Non-uniform scale.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Compose into a matrix (scale, then rotate, then translate).
    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// A named set of tracks animating the model's root transform.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    /// Clip name from the asset, if any.
    pub name: Option<String>,
    /// Translation keyframes.
    pub translation: Option<Track<Vec3>>,
    /// Rotation keyframes.
    pub rotation: Option<Track<Quat>>,
    /// Scale keyframes.
    pub scale: Option<Track<Vec3>>,
}

impl AnimationClip {
    /// Length of the clip (the latest keyframe across tracks).
    #[must_use]
    pub fn duration(&self) -> f32 {
        let t = self.translation.as_ref().map_or(0.0, Track::end_time);
        let r = self.rotation.as_ref().map_or(0.0, Track::end_time);
        let s = self.scale.as_ref().map_or(0.0, Track::end_time);
        t.max(r).max(s)
    }

    /// Whether the clip animates anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.translation.is_none()
            && self.rotation.is_none()
            && self.scale.is_none()
    }

    /// Sample at `t`; properties without a track keep their `rest` value.
    #[must_use]
    pub fn sample(&self, t: f32, rest: &Transform) -> Transform {
        Transform {
            translation: self
                .translation
                .as_ref()
                .map_or(rest.translation, |track| track.sample(t)),
            rotation: self
                .rotation
                .as_ref()
                .map_or(rest.rotation, |track| track.sample(t)),
            scale: self
                .scale
                .as_ref()
                .map_or(rest.scale, |track| track.sample(t)),
        }
    }
}

/// Looping playback position in one clip.
#[derive(Debug, Clone)]
pub struct ClipCursor {
    clip: AnimationClip,
    duration: f32,
    time: f32,
}

impl ClipCursor {
    /// Start `clip` at time zero.
    #[must_use]
    pub fn new(clip: AnimationClip) -> Self {
        let duration = clip.duration();
        Self {
            clip,
            duration,
            time: 0.0,
        }
    }

    /// Advance by `dt` seconds, wrapping at the clip's end.
    pub fn advance(&mut self, dt: f32) {
        if self.duration > 0.0 && dt.is_finite() && dt > 0.0 {
            self.time = (self.time + dt).rem_euclid(self.duration);
        }
    }

    /// Current playback time in seconds.
    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }

    /// The clip being played.
    #[must_use]
    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    /// Current root transform.
    #[must_use]
    pub fn sample(&self, rest: &Transform) -> Transform {
        self.clip.sample(self.time, rest)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    fn spin() -> AnimationClip {
        AnimationClip {
            name: Some("spin".to_owned()),
            translation: None,
            rotation: Track::new(
                vec![0.0, 2.0],
                vec![Quat::IDENTITY, Quat::from_rotation_y(PI * 0.5)],
                Interpolation::Linear,
            ),
            scale: None,
        }
    }

    #[test]
    fn linear_track_blends_between_keys() {
        let track = Track::new(
            vec![0.0, 1.0, 3.0],
            vec![Vec3::ZERO, Vec3::X, Vec3::new(3.0, 0.0, 0.0)],
            Interpolation::Linear,
        )
        .unwrap();
        assert_eq!(track.sample(-1.0), Vec3::ZERO);
        assert_eq!(track.sample(0.5), Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(track.sample(2.0), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(track.sample(9.0), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn step_track_holds_previous_key() {
        let track = Track::new(
            vec![0.0, 1.0],
            vec![Vec3::ZERO, Vec3::ONE],
            Interpolation::Step,
        )
        .unwrap();
        assert_eq!(track.sample(0.99), Vec3::ZERO);
        assert_eq!(track.sample(1.0), Vec3::ONE);
    }

    #[test]
    fn mismatched_track_is_rejected() {
        assert!(Track::new(vec![0.0], Vec::<Vec3>::new(), Interpolation::Step)
            .is_none());
        assert!(Track::<Vec3>::new(Vec::new(), Vec::new(), Interpolation::Step)
            .is_none());
    }

    #[test]
    fn untracked_properties_keep_rest_pose() {
        let rest = Transform {
            translation: Vec3::new(1.0, 2.0, 3.0),
            ..Transform::default()
        };
        let sampled = spin().sample(1.0, &rest);
        assert_eq!(sampled.translation, rest.translation);
        assert_eq!(sampled.scale, Vec3::ONE);
        let expected = Quat::from_rotation_y(PI * 0.25);
        assert!(sampled.rotation.angle_between(expected) < 1e-4);
    }

    #[test]
    fn cursor_loops_at_duration() {
        let mut cursor = ClipCursor::new(spin());
        cursor.advance(1.5);
        cursor.advance(1.0);
        assert!((cursor.time() - 0.5).abs() < 1e-5);
        cursor.advance(f32::NAN);
        cursor.advance(-4.0);
        assert!((cursor.time() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn zero_length_clip_stays_put() {
        let clip = AnimationClip {
            name: None,
            translation: Track::new(vec![0.0], vec![Vec3::ONE], Interpolation::Linear),
            rotation: None,
            scale: None,
        };
        let mut cursor = ClipCursor::new(clip);
        cursor.advance(3.0);
        assert_eq!(cursor.time(), 0.0);
        assert_eq!(cursor.sample(&Transform::default()).translation, Vec3::ONE);
    }
}
