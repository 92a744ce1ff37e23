//! Keyframe tracks and interpolation

use crate::types::{Blend, Transform};
use glam::{Quat, Vec3};

/// A sampled pose for a single bone at a single instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPose {
    pub translation: Vec3,
    pub rotation: Quat,
    /// Scale, if the track carries one
    pub scale: Option<Vec3>,
}

impl KeyPose {
    /// Resolve into a local transform, taking missing scale from `bind`
    pub fn to_transform(&self, bind: &Transform) -> Transform {
        Transform {
            translation: self.translation,
            rotation: self.rotation,
            scale: self.scale.unwrap_or(bind.scale),
        }
    }
}

impl Blend for KeyPose {
    fn blend(&self, other: &Self, t: f32) -> Self {
        let scale = match (self.scale, other.scale) {
            (Some(a), Some(b)) => Some(a.blend(&b, t)),
            (a, b) => a.or(b),
        };
        Self {
            translation: self.translation.blend(&other.translation, t),
            rotation: self.rotation.blend(&other.rotation, t),
            scale,
        }
    }
}

/// One keyframe of a bone track
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct Keyframe {
    /// Time in ticks
    pub time: f64,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Option<Vec3>,
}

impl Keyframe {
    /// Create a keyframe without scale
    pub fn new(time: f64, translation: Vec3, rotation: Quat) -> Self {
        Self {
            time,
            translation,
            rotation,
            scale: None,
        }
    }

    /// Attach a scale value
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = Some(scale);
        self
    }

    /// The pose stored in this keyframe
    pub fn pose(&self) -> KeyPose {
        KeyPose {
            translation: self.translation,
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}

/// Time-ordered keyframes for one bone
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct Track {
    keys: Vec<Keyframe>,
}

impl Track {
    /// Create a track; rotations are normalized, ordering is checked by [`Track::validate`]
    pub fn new(mut keys: Vec<Keyframe>) -> Self {
        for key in &mut keys {
            key.rotation = key.rotation.normalize();
        }
        Self { keys }
    }

    /// Keyframes in time order
    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    /// Number of keyframes
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the track has no keyframes
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Check the keyframe ordering against an animation duration
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self, duration: f64) -> Result<(), String> {
        if self.keys.is_empty() {
            return Err("track has no keyframes".to_string());
        }

        let mut previous: Option<f64> = None;
        for (i, key) in self.keys.iter().enumerate() {
            if !key.time.is_finite() || key.time < 0.0 {
                return Err(format!("keyframe {i} has invalid time {}", key.time));
            }
            if let Some(prev) = previous
                && key.time <= prev
            {
                return Err(format!(
                    "keyframe {i} at time {} does not follow time {prev}",
                    key.time
                ));
            }
            if key.time > duration {
                return Err(format!(
                    "keyframe {i} at time {} is past the duration {duration}",
                    key.time
                ));
            }
            previous = Some(key.time);
        }

        Ok(())
    }

    /// Sample the track at `time` (ticks)
    ///
    /// Looping tracks wrap the time modulo `duration`; the result is then
    /// clamped to the first and last keyframe. Returns None for an empty track.
    ///
    /// Wrapping happens at `duration`, not at the last key: on a looping track
    /// whose last key comes early, times between that key and `duration` hold
    /// the last key rather than interpolating back toward the first.
    pub fn sample(&self, time: f64, duration: f64, looping: bool) -> Option<KeyPose> {
        let first = self.keys.first()?;
        if self.keys.len() == 1 {
            return Some(first.pose());
        }

        let time = wrap_time(time, duration, looping);
        let index = find_keyframe_index(&self.keys, time)?;

        // At or past the last keyframe
        if index >= self.keys.len() - 1 {
            return self.keys.last().map(Keyframe::pose);
        }

        let key1 = &self.keys[index];
        let key2 = &self.keys[index + 1];
        if time <= key1.time {
            return Some(key1.pose());
        }

        let t = ((time - key1.time) / (key2.time - key1.time)) as f32;
        Some(key1.pose().blend(&key2.pose(), t.clamp(0.0, 1.0)))
    }
}

fn wrap_time(time: f64, duration: f64, looping: bool) -> f64 {
    if time.is_nan() {
        return 0.0;
    }
    if looping && duration > 0.0 && time.is_finite() {
        time.rem_euclid(duration)
    } else {
        time
    }
}

/// Find the index of the keyframe at or before the given time
///
/// Returns None if there are no keyframes. Times before the first keyframe
/// map to index 0, times past the last map to the last index. Otherwise the
/// result is the earlier keyframe of the bracketing pair, so interpolation
/// runs between `[index]` and `[index + 1]`.
pub fn find_keyframe_index(keys: &[Keyframe], time: f64) -> Option<usize> {
    if keys.is_empty() {
        return None;
    }

    let last_index = keys.len() - 1;
    if time >= keys[last_index].time {
        return Some(last_index);
    }

    // Largest index where keys[index].time <= time
    let mut low = 0;
    let mut high = last_index;

    while low < high {
        let mid = (low + high).div_ceil(2);
        if keys[mid].time <= time {
            low = mid;
        } else {
            high = mid - 1;
        }
    }

    Some(low)
}
