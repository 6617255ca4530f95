//! # Animation — Keyframe Clips, the Mixer, and Easing Curves
//!
//! Decoders turn a file's animations into [`AnimationClip`]s: named bundles
//! of keyframe [`Channel`]s, each driving translation, rotation or scale of
//! one node (addressed by its index in the source file).
//!
//! The [`AnimationMixer`] plays at most one clip at a time against the model
//! root. It remembers the rest pose of every node a clip touches and puts it
//! back when playback stops.
//!
//! ```text
//!  clip "Walk"  ─┬─ channel(node 3, rotation)    t: 0.0 ─ 0.5 ─ 1.0
//!                └─ channel(node 4, translation) t: 0.0 ───────  1.0
//!
//!  mixer.update(dt): time += dt · speed, wrap at duration, sample, write
//!                    into the bound nodes' transforms
//! ```
//!
//! [`EaseFunction`] curves shape non-keyframed motion such as the camera
//! reset.

use std::collections::BTreeMap;

use crate::math::{Quat, Transform, Vec3};
use crate::scene::Node;

// ---------------------------------------------------------------------------
// Easing
// ---------------------------------------------------------------------------

/// Standard easing functions for interpolation.
///
/// All functions map `t` in \[0, 1\] to an output in \[0, 1\].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EaseFunction {
    #[default]
    Linear,
    QuadOut,
    CubicOut,
    CubicInOut,
}

impl EaseFunction {
    /// Evaluate the easing function at `t` (clamped to \[0, 1\]).
    pub fn sample(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::QuadOut => 1.0 - (1.0 - t) * (1.0 - t),
            Self::CubicOut => 1.0 - (1.0 - t).powi(3),
            Self::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Clips
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    Step,
    #[default]
    Linear,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValues {
    Translation(Vec<Vec3>),
    Rotation(Vec<Quat>),
    Scale(Vec<Vec3>),
}

impl ChannelValues {
    fn len(&self) -> usize {
        match self {
            Self::Translation(v) | Self::Scale(v) => v.len(),
            Self::Rotation(v) => v.len(),
        }
    }
}

/// Keyframes for one property of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Source-file index of the animated node.
    pub node: usize,
    /// Keyframe times in seconds, ascending.
    pub times: Vec<f32>,
    pub values: ChannelValues,
    pub interpolation: Interpolation,
}

impl Channel {
    /// Write the value at `time` into `transform`. Empty channels are ignored.
    fn apply(&self, time: f32, transform: &mut Transform) {
        let count = self.times.len().min(self.values.len());
        if count == 0 {
            return;
        }
        let (i, j, s) = keyframe_span(&self.times[..count], time);
        let s = match self.interpolation {
            Interpolation::Step => 0.0,
            Interpolation::Linear => s,
        };
        match &self.values {
            ChannelValues::Translation(v) => transform.translation = v[i].lerp(v[j], s),
            ChannelValues::Scale(v) => transform.scale = v[i].lerp(v[j], s),
            ChannelValues::Rotation(v) => transform.rotation = v[i].slerp(v[j], s).normalize(),
        }
    }
}

/// Bracketing keyframes for `time` and the blend factor between them.
fn keyframe_span(times: &[f32], time: f32) -> (usize, usize, f32) {
    let last = times.len() - 1;
    if time <= times[0] {
        return (0, 0, 0.0);
    }
    if time >= times[last] {
        return (last, last, 0.0);
    }
    let j = times.partition_point(|&t| t <= time);
    let i = j - 1;
    let span = times[j] - times[i];
    let s = if span > 0.0 { (time - times[i]) / span } else { 0.0 };
    (i, j, s)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    /// Seconds. The last keyframe time across all channels.
    pub duration: f32,
    pub channels: Vec<Channel>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, channels: Vec<Channel>) -> Self {
        let duration = channels
            .iter()
            .filter_map(|c| c.times.last().copied())
            .fold(0.0, f32::max);
        Self {
            name: name.into(),
            duration,
            channels,
        }
    }
}

// ---------------------------------------------------------------------------
// Mixer
// ---------------------------------------------------------------------------

/// The clip currently bound to the mixer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationAction {
    pub clip: usize,
    pub time: f32,
    pub paused: bool,
}

/// Plays one clip at a time on a model root.
#[derive(Debug)]
pub struct AnimationMixer {
    clips: Vec<AnimationClip>,
    action: Option<AnimationAction>,
    speed: f32,
    rest_pose: BTreeMap<usize, Transform>,
}

impl AnimationMixer {
    /// Bind `clips` to `root`, capturing the rest pose of every animated node.
    pub fn new(root: &Node, clips: Vec<AnimationClip>) -> Self {
        let mut rest_pose = BTreeMap::new();
        root.visit(crate::math::Mat4::IDENTITY, |node, _| {
            let Some(index) = node.source_index else {
                return;
            };
            if clips.iter().any(|c| c.channels.iter().any(|ch| ch.node == index)) {
                rest_pose.insert(index, node.transform);
            }
        });
        Self {
            clips,
            action: None,
            speed: 1.0,
            rest_pose,
        }
    }

    pub fn clips(&self) -> &[AnimationClip] {
        &self.clips
    }

    pub fn clip_names(&self) -> Vec<String> {
        self.clips.iter().map(|c| c.name.clone()).collect()
    }

    pub fn action(&self) -> Option<&AnimationAction> {
        self.action.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.action.is_some_and(|a| !a.paused)
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Playback rate multiplier. Persists across [`play`](Self::play) calls.
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    /// Start clip `index` from the beginning, replacing any current action.
    /// Returns `false` (and changes nothing) for an out-of-range index.
    pub fn play(&mut self, index: usize, root: &mut Node) -> bool {
        if index >= self.clips.len() {
            return false;
        }
        self.restore_rest_pose(root);
        self.action = Some(AnimationAction {
            clip: index,
            time: 0.0,
            paused: false,
        });
        self.apply(root);
        true
    }

    pub fn pause(&mut self) {
        if let Some(action) = &mut self.action {
            action.paused = true;
        }
    }

    /// Continue a paused action where it left off. Returns `false` when there
    /// is nothing to resume.
    pub fn resume(&mut self) -> bool {
        match &mut self.action {
            Some(action) if action.paused => {
                action.paused = false;
                true
            }
            _ => false,
        }
    }

    /// Drop the current action and put the model back in its rest pose.
    pub fn stop(&mut self, root: &mut Node) {
        if self.action.take().is_some() {
            self.restore_rest_pose(root);
        }
    }

    /// Advance by `dt` seconds (scaled by speed) and pose the model. Clips
    /// loop.
    pub fn update(&mut self, dt: f32, root: &mut Node) {
        let Some(action) = &mut self.action else {
            return;
        };
        if action.paused {
            return;
        }
        let duration = self.clips[action.clip].duration;
        action.time += dt * self.speed;
        if duration > 0.0 {
            action.time = action.time.rem_euclid(duration);
        } else {
            action.time = 0.0;
        }
        self.apply(root);
    }

    fn apply(&self, root: &mut Node) {
        let Some(action) = self.action else {
            return;
        };
        for channel in &self.clips[action.clip].channels {
            if let Some(node) = root.find_by_source_index_mut(channel.node) {
                channel.apply(action.time, &mut node.transform);
            }
        }
    }

    fn restore_rest_pose(&self, root: &mut Node) {
        for (&index, rest) in &self.rest_pose {
            if let Some(node) = root.find_by_source_index_mut(index) {
                node.transform = *rest;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slide_clip(name: &str, node: usize) -> AnimationClip {
        AnimationClip::new(
            name,
            vec![Channel {
                node,
                times: vec![0.0, 1.0, 2.0],
                values: ChannelValues::Translation(vec![
                    Vec3::ZERO,
                    Vec3::new(1.0, 0.0, 0.0),
                    Vec3::new(1.0, 1.0, 0.0),
                ]),
                interpolation: Interpolation::Linear,
            }],
        )
    }

    fn model() -> Node {
        let mut child = Node::new("mover");
        child.source_index = Some(0);
        child.transform = Transform::from_xyz(5.0, 5.0, 5.0);
        Node::new("root").with_child(child)
    }

    fn mover(root: &Node) -> Vec3 {
        root.children[0].transform.translation
    }

    #[test]
    fn cubic_out_endpoints() {
        assert_eq!(EaseFunction::CubicOut.sample(0.0), 0.0);
        assert_eq!(EaseFunction::CubicOut.sample(1.0), 1.0);
        assert!(EaseFunction::CubicOut.sample(0.5) > 0.5);
        assert_eq!(EaseFunction::Linear.sample(2.0), 1.0);
    }

    #[test]
    fn clip_duration_is_last_keyframe() {
        assert_eq!(slide_clip("a", 0).duration, 2.0);
    }

    #[test]
    fn mixer_samples_and_loops() {
        let mut root = model();
        let mut mixer = AnimationMixer::new(&root, vec![slide_clip("a", 0)]);
        assert!(mixer.play(0, &mut root));
        assert_eq!(mover(&root), Vec3::ZERO);

        mixer.update(0.5, &mut root);
        assert_eq!(mover(&root), Vec3::new(0.5, 0.0, 0.0));

        mixer.update(2.0, &mut root);
        assert_eq!(mixer.action().unwrap().time, 0.5);
    }

    #[test]
    fn speed_scales_time_and_persists() {
        let mut root = model();
        let mut mixer = AnimationMixer::new(&root, vec![slide_clip("a", 0), slide_clip("b", 0)]);
        mixer.set_speed(2.0);
        mixer.play(0, &mut root);
        mixer.update(0.25, &mut root);
        assert_eq!(mixer.action().unwrap().time, 0.5);

        mixer.play(1, &mut root);
        mixer.update(0.25, &mut root);
        assert_eq!(mixer.action().unwrap().time, 0.5);
    }

    #[test]
    fn pause_freezes_and_stop_restores_rest_pose() {
        let mut root = model();
        let mut mixer = AnimationMixer::new(&root, vec![slide_clip("a", 0)]);
        mixer.play(0, &mut root);
        mixer.update(1.0, &mut root);
        mixer.pause();
        mixer.update(1.0, &mut root);
        assert_eq!(mover(&root), Vec3::new(1.0, 0.0, 0.0));
        assert!(!mixer.is_playing());

        assert!(mixer.resume());
        assert!(!mixer.resume());
        assert_eq!(mixer.action().unwrap().time, 1.0);

        mixer.stop(&mut root);
        assert_eq!(mover(&root), Vec3::new(5.0, 5.0, 5.0));
        assert!(mixer.action().is_none());
    }

    #[test]
    fn out_of_range_play_is_ignored() {
        let mut root = model();
        let mut mixer = AnimationMixer::new(&root, vec![slide_clip("a", 0)]);
        assert!(!mixer.play(3, &mut root));
        assert!(mixer.action().is_none());
    }
}
