//! Animation state machine
//!
//! The [`AnimationController`] consumes queued [`AnimationCommand`]s and
//! drives the weights and timers of at most two animations: the current one
//! and, during a cross-fade, the next one.

use super::state::Animation;
use crate::error::{AnimError, Result};
use std::collections::VecDeque;

/// How a queued animation replaces the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum TransitionType {
    /// Cut to the new animation at full weight
    Immediate,
    /// Cross-fade from the current animation over the blend duration
    Smooth,
}

/// A pending request to play an animation
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct AnimationCommand {
    /// Index into the skeleton's animation list
    pub animation: usize,
    pub looping: bool,
    /// Cross-fade length in seconds (Smooth only)
    pub blend_duration: f64,
    pub transition: TransitionType,
}

impl AnimationCommand {
    /// Cut to `animation`
    pub fn immediate(animation: usize, looping: bool) -> Self {
        Self {
            animation,
            looping,
            blend_duration: 0.0,
            transition: TransitionType::Immediate,
        }
    }

    /// Cross-fade to `animation` over `blend_duration` seconds
    pub fn smooth(animation: usize, looping: bool, blend_duration: f64) -> Self {
        Self {
            animation,
            looping,
            blend_duration,
            transition: TransitionType::Smooth,
        }
    }
}

/// Tuning knobs for a single controller
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerConfig {
    /// Multiplier applied to every time step (blend timer and animation timers)
    pub playback_speed: f64,
    /// Hold the outgoing animation's timer during a smooth blend
    pub freeze_outgoing: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            playback_speed: 1.0,
            freeze_outgoing: false,
        }
    }
}

/// Playback state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ControllerState {
    /// Nothing contributes to the pose
    #[default]
    Idle,
    /// One animation at full weight
    Playing { current: usize },
    /// Cross-fading from `current` to `next`
    Blending {
        current: usize,
        next: usize,
        /// Seconds of blend progress so far
        elapsed: f64,
        /// Total blend length in seconds
        duration: f64,
    },
}

/// Smoothstep easing, `t*t*(3 - 2t)`
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Command-driven animation state machine
#[derive(Debug, Clone, Default)]
pub struct AnimationController {
    state: ControllerState,
    queue: VecDeque<AnimationCommand>,
    config: ControllerConfig,
}

impl AnimationController {
    /// Create an idle controller
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            state: ControllerState::Idle,
            queue: VecDeque::new(),
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ControllerConfig {
        &mut self.config
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Pending commands, front first
    pub fn queue(&self) -> impl Iterator<Item = &AnimationCommand> {
        self.queue.iter()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Index of the current animation
    pub fn current(&self) -> Option<usize> {
        match self.state {
            ControllerState::Idle => None,
            ControllerState::Playing { current } | ControllerState::Blending { current, .. } => {
                Some(current)
            }
        }
    }

    /// Index of the animation being blended in
    pub fn next(&self) -> Option<usize> {
        match self.state {
            ControllerState::Blending { next, .. } => Some(next),
            _ => None,
        }
    }

    pub fn is_blending(&self) -> bool {
        matches!(self.state, ControllerState::Blending { .. })
    }

    /// Linear blend progress in [0, 1], if blending
    pub fn blend_progress(&self) -> Option<f32> {
        match self.state {
            ControllerState::Blending {
                elapsed, duration, ..
            } => Some(blend_fraction(elapsed, duration)),
            _ => None,
        }
    }

    /// No queued work, no blend, and nothing contributing to the pose
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && matches!(self.state, ControllerState::Idle)
    }

    /// Queue a command
    ///
    /// Fails without touching the queue when the animation index is out of
    /// range. An immediate command overrides anything still pending.
    pub fn enqueue(&mut self, command: AnimationCommand, animation_count: usize) -> Result<()> {
        if command.animation >= animation_count {
            return Err(AnimError::UnknownAnimation {
                index: command.animation,
                count: animation_count,
            });
        }

        if command.transition == TransitionType::Immediate && !self.queue.is_empty() {
            log::debug!(
                "Immediate command for animation {} drops {} pending command(s)",
                command.animation,
                self.queue.len()
            );
            self.queue.clear();
        }

        self.queue.push_back(command);
        Ok(())
    }

    /// Drop all pending commands
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// Animations contributing to the pose, with their weights
    pub fn active(&self, animations: &[Animation]) -> Vec<(usize, f32)> {
        let mut active = Vec::with_capacity(2);
        let mut push = |index: usize| {
            if let Some(anim) = animations.get(index)
                && anim.weight() > 0.0
            {
                active.push((index, anim.weight()));
            }
        };

        match self.state {
            ControllerState::Idle => {}
            ControllerState::Playing { current } => push(current),
            ControllerState::Blending { current, next, .. } => {
                push(current);
                push(next);
            }
        }
        active
    }

    /// Advance the state machine by `dt` seconds
    pub fn update(&mut self, dt: f64, animations: &mut [Animation]) {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let scaled = dt * self.config.playback_speed.max(0.0);

        if let ControllerState::Blending {
            current,
            next,
            elapsed,
            duration,
        } = self.state
        {
            self.progress_blend(current, next, elapsed + scaled, duration, animations);
        } else if let Some(command) = self.queue.pop_front() {
            self.apply(command, animations);
        }

        self.advance_timers(scaled, animations);

        if let ControllerState::Playing { current } = self.state {
            let faded = animations.get(current).is_none_or(|a| a.weight() <= 0.0);
            if faded && self.queue.is_empty() {
                log::debug!("Animation {current} has faded out, controller is idle");
                self.state = ControllerState::Idle;
            }
        }
    }

    fn progress_blend(
        &mut self,
        current: usize,
        next: usize,
        elapsed: f64,
        duration: f64,
        animations: &mut [Animation],
    ) {
        let t = blend_fraction(elapsed, duration);

        if t >= 1.0 {
            if let Some(anim) = animations.get_mut(next) {
                // A one-shot shorter than the blend has already finished
                if anim.is_playing() {
                    anim.set_weight(1.0);
                } else {
                    log::debug!("Animation {next} finished during its blend");
                    anim.set_weight(0.0);
                }
            }
            if let Some(anim) = animations.get_mut(current) {
                anim.stop();
            }
            log::debug!("Blend from animation {current} to {next} complete");
            self.state = ControllerState::Playing { current: next };
            return;
        }

        let w = smoothstep(t);
        if let Some(anim) = animations.get_mut(next) {
            anim.set_weight(w);
        }
        if let Some(anim) = animations.get_mut(current) {
            anim.set_weight(1.0 - w);
        }
        self.state = ControllerState::Blending {
            current,
            next,
            elapsed,
            duration,
        };
    }

    fn apply(&mut self, command: AnimationCommand, animations: &mut [Animation]) {
        if animations.get(command.animation).is_none() {
            log::warn!(
                "Dropping command for missing animation {}",
                command.animation
            );
            return;
        }

        if self.current() == Some(command.animation) {
            log::trace!(
                "Animation {} is already current, command discarded",
                command.animation
            );
            return;
        }

        match command.transition {
            TransitionType::Immediate => {
                for index in [self.current(), self.next()].into_iter().flatten() {
                    if let Some(anim) = animations.get_mut(index) {
                        anim.stop();
                    }
                }
                animations[command.animation].start(1.0, command.looping);
                self.state = ControllerState::Playing {
                    current: command.animation,
                };
            }
            TransitionType::Smooth => {
                let Some(current) = self.current() else {
                    log::debug!(
                        "Smooth command for animation {} ignored, nothing to blend from",
                        command.animation
                    );
                    return;
                };

                animations[command.animation].start(0.0, command.looping);
                if self.config.freeze_outgoing
                    && let Some(anim) = animations.get_mut(current)
                {
                    anim.set_frozen(true);
                }
                if command.blend_duration <= 0.0 {
                    log::trace!("Zero-length blend to animation {}", command.animation);
                }
                self.state = ControllerState::Blending {
                    current,
                    next: command.animation,
                    elapsed: 0.0,
                    duration: command.blend_duration,
                };
            }
        }
    }

    /// Advance the timers of the animations in play
    ///
    /// Weights of a blending pair belong to the blend, so a clip finishing
    /// mid-fade holds its last key at the weight the blend gave it. Only a
    /// clip playing alone fades out when it finishes.
    fn advance_timers(&self, dt: f64, animations: &mut [Animation]) {
        match self.state {
            ControllerState::Idle => {}
            ControllerState::Playing { current } => {
                if let Some(anim) = animations.get_mut(current)
                    && anim.advance(dt)
                {
                    anim.set_weight(0.0);
                }
            }
            ControllerState::Blending { current, next, .. } => {
                for index in [current, next] {
                    if let Some(anim) = animations.get_mut(index) {
                        anim.advance(dt);
                    }
                }
            }
        }
    }
}

fn blend_fraction(elapsed: f64, duration: f64) -> f32 {
    if duration > 0.0 {
        (elapsed / duration).clamp(0.0, 1.0) as f32
    } else {
        1.0
    }
}
