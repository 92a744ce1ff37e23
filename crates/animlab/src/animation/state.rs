//! Animation clips and their playback state

use super::interpolation::{KeyPose, Track};
use crate::error::{AnimError, Result};
use crate::types::BoneId;
use std::collections::HashMap;

/// Sampling rate used when the source leaves ticks-per-second unset
pub const DEFAULT_TICKS_PER_SECOND: f64 = 25.0;

/// A keyframe animation plus its playback cursor
///
/// Times are in ticks. [`Animation::advance`] converts seconds to ticks using
/// the clip's sampling rate.
#[derive(Debug, Clone)]
pub struct Animation {
    name: String,
    duration: f64,
    ticks_per_second: f64,
    tracks: HashMap<BoneId, Track>,
    /// Current position in ticks
    timer: f64,
    looping: bool,
    /// Contribution to the final pose, in [0, 1]
    weight: f32,
    /// Timer is held while frozen
    frozen: bool,
    playing: bool,
}

impl Animation {
    /// Create an animation, validating every track
    ///
    /// A `ticks_per_second` of zero (or less) falls back to
    /// [`DEFAULT_TICKS_PER_SECOND`].
    pub fn new(
        name: impl Into<String>,
        duration: f64,
        ticks_per_second: f64,
        tracks: HashMap<BoneId, Track>,
    ) -> Result<Self> {
        let name = name.into();

        if !duration.is_finite() || duration < 0.0 {
            return Err(AnimError::MalformedKeyframes {
                animation: name,
                bone: String::new(),
                reason: format!("invalid duration {duration}"),
            });
        }

        for (bone, track) in &tracks {
            track
                .validate(duration)
                .map_err(|reason| AnimError::MalformedKeyframes {
                    animation: name.clone(),
                    bone: bone.to_string(),
                    reason,
                })?;
        }

        let ticks_per_second = if ticks_per_second > 0.0 && ticks_per_second.is_finite() {
            ticks_per_second
        } else {
            DEFAULT_TICKS_PER_SECOND
        };

        if duration == 0.0 {
            log::debug!("Animation '{name}' has zero duration, its timer will not advance");
        }

        Ok(Self {
            name,
            duration,
            ticks_per_second,
            tracks,
            timer: 0.0,
            looping: false,
            weight: 0.0,
            frozen: false,
            playing: false,
        })
    }

    /// Animation name from the source asset
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Duration in ticks
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.duration / self.ticks_per_second
    }

    pub fn ticks_per_second(&self) -> f64 {
        self.ticks_per_second
    }

    /// Current playback position in ticks
    pub fn timer(&self) -> f64 {
        self.timer
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Track for a bone, if the animation drives it
    pub fn track(&self, bone: BoneId) -> Option<&Track> {
        self.tracks.get(&bone)
    }

    /// Ids of the bones this animation drives
    pub fn bones(&self) -> impl Iterator<Item = BoneId> + '_ {
        self.tracks.keys().copied()
    }

    /// Start playing from the beginning
    pub fn start(&mut self, weight: f32, looping: bool) {
        self.timer = 0.0;
        self.weight = weight.clamp(0.0, 1.0);
        self.looping = looping;
        self.frozen = false;
        self.playing = true;
    }

    /// Stop playing: weight drops to zero and the timer rewinds
    pub fn stop(&mut self) {
        self.timer = 0.0;
        self.weight = 0.0;
        self.frozen = false;
        self.playing = false;
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight.clamp(0.0, 1.0);
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    /// Jump to a position in ticks
    pub fn set_timer(&mut self, timer: f64) {
        self.timer = if timer.is_finite() {
            timer.clamp(0.0, self.duration)
        } else {
            0.0
        };
    }

    /// Advance the timer by `dt` seconds
    ///
    /// Frozen, stopped and zero-weight animations do not advance. A looping
    /// animation wraps; a non-looping one clamps at its duration, stops
    /// playing and reports `true` (finished). The weight is left alone, so a
    /// finished clip keeps holding its last key until its owner fades it.
    pub fn advance(&mut self, dt: f64) -> bool {
        if !self.playing || self.frozen || self.weight <= 0.0 {
            return false;
        }
        if self.duration <= 0.0 {
            return false;
        }
        if !dt.is_finite() || dt < 0.0 {
            log::trace!("Animation '{}' ignoring time step {dt}", self.name);
            return false;
        }

        self.timer += dt * self.ticks_per_second;

        if self.timer >= self.duration {
            if self.looping {
                self.timer = self.timer.rem_euclid(self.duration);
            } else {
                self.timer = self.duration;
                self.playing = false;
                log::debug!("Animation '{}' finished", self.name);
                return true;
            }
        }

        false
    }

    /// Sample a bone's pose at the current timer
    pub fn sample(&self, bone: BoneId) -> Option<KeyPose> {
        self.sample_at(bone, self.timer)
    }

    /// Sample a bone's pose at an arbitrary time in ticks
    pub fn sample_at(&self, bone: BoneId, time: f64) -> Option<KeyPose> {
        self.tracks
            .get(&bone)
            .and_then(|track| track.sample(time, self.duration, self.looping))
    }
}
