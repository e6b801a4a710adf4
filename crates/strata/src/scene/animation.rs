//! Render-loop animations.
//!
//! An [`Animation`] interpolates a set of [`Track`]s linearly over a fixed
//! duration. The scene advances every registered animation by the configured
//! frame step on each tick and reports completions as commands.

use strata_core::geometry::Vec3;

use super::LayerKey;

/// Layer transition an animation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Expand,
    Collapse,
    Focus,
}

/// A single animated property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Track {
    /// Uniform scale of a layer relative to its parent entity.
    LayerScale { layer: LayerKey, from: f32, to: f32 },
    /// Translation of the whole scene.
    RootTranslation { from: Vec3, to: Vec3 },
}

/// Value of a [`Track`] at some progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    LayerScale { layer: LayerKey, scale: f32 },
    RootTranslation(Vec3),
}

impl Track {
    fn sample(&self, progress: f32) -> Sample {
        match *self {
            Track::LayerScale { layer, from, to } => Sample::LayerScale {
                layer,
                scale: from + (to - from) * progress,
            },
            Track::RootTranslation { from, to } => Sample::RootTranslation(from.lerp(to, progress)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Animation {
    transition: Transition,
    /// Layer whose structure the animation is about; none for camera moves.
    subject: Option<LayerKey>,
    duration: f32,
    elapsed: f32,
    tracks: Vec<Track>,
}

impl Animation {
    pub fn new(transition: Transition, subject: Option<LayerKey>, duration: f32) -> Self {
        Self {
            transition,
            subject,
            duration,
            elapsed: 0.0,
            tracks: Vec::new(),
        }
    }

    pub fn with_track(mut self, track: Track) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    pub fn subject(&self) -> Option<LayerKey> {
        self.subject
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Progress in `[0, 1]`. A non-positive duration is complete at once.
    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        (self.elapsed / self.duration).clamp(0.0, 1.0)
    }

    pub fn is_finished(&self) -> bool {
        self.progress() >= 1.0
    }

    /// Moves the animation forward by `step` seconds and samples every track.
    pub fn advance(&mut self, step: f32) -> Vec<Sample> {
        self.elapsed = (self.elapsed + step).min(self.duration.max(0.0));
        let progress = self.progress();
        self.tracks.iter().map(|track| track.sample(progress)).collect()
    }
}
