//!
//! Raw track data structure definition.
//!

use glam::{Quat, Vec3};
use std::fmt::Debug;

use crate::base::AnimError;
use crate::transform::{quat_angle, RigidTransform};

/// Default positional tolerance in scene units.
pub const DEFAULT_PRECISION: f32 = 0.001;

/// Default radius of the virtual shell used to scale rotation and scale errors.
pub const DEFAULT_SHELL_DISTANCE: f32 = 3.0;

/// Value type that can be stored in a transform sub-track.
pub trait TrackValue
where
    Self: Debug + Default + Copy + Clone + PartialEq,
{
    /// Sub-track name used in diagnostics.
    fn name() -> &'static str;

    /// Interpolation between two values.
    fn lerp(a: Self, b: Self, t: f32) -> Self;

    /// Raw error between two values, before shell scaling.
    fn error(a: Self, b: Self) -> f32;

    fn is_finite(&self) -> bool;
}

impl TrackValue for Vec3 {
    #[inline]
    fn name() -> &'static str {
        "vector3"
    }

    #[inline]
    fn lerp(a: Vec3, b: Vec3, t: f32) -> Vec3 {
        Vec3::lerp(a, b, t)
    }

    #[inline]
    fn error(a: Vec3, b: Vec3) -> f32 {
        a.distance(b)
    }

    #[inline]
    fn is_finite(&self) -> bool {
        Vec3::is_finite(*self)
    }
}

impl TrackValue for Quat {
    #[inline]
    fn name() -> &'static str {
        "quaternion"
    }

    // Normalized lerp along the shortest arc.
    #[inline]
    fn lerp(a: Quat, b: Quat, t: f32) -> Quat {
        Quat::lerp(a, b, t)
    }

    #[inline]
    fn error(a: Quat, b: Quat) -> f32 {
        quat_angle(a, b)
    }

    #[inline]
    fn is_finite(&self) -> bool {
        Quat::is_finite(*self)
    }
}

/// Strength of the search for the smallest track formats.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CompressionLevel {
    /// Only collapses constant sub-tracks, everything else is stored raw.
    Lowest,
    /// Also tries range-reduced quantization.
    #[default]
    Highest,
}

/// Compression configuration shared by every track of a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CompressionSettings {
    /// Positional tolerance in scene units.
    pub precision: f32,
    /// Bounding-shell radius used to turn rotation and scale errors into distances.
    pub shell_distance: f32,
    pub level: CompressionLevel,
}

impl Default for CompressionSettings {
    fn default() -> CompressionSettings {
        CompressionSettings {
            precision: DEFAULT_PRECISION,
            shell_distance: DEFAULT_SHELL_DISTANCE,
            level: CompressionLevel::default(),
        }
    }
}

impl CompressionSettings {
    /// Track description for the track written at `output_index`.
    pub fn describe(&self, output_index: u32) -> TrackDescription {
        TrackDescription {
            output_index,
            precision: self.precision,
            shell_distance: self.shell_distance,
        }
    }
}

/// Per-track compression description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackDescription {
    /// Bone index the decoder writes this track to.
    pub output_index: u32,
    pub precision: f32,
    pub shell_distance: f32,
}

impl TrackDescription {
    /// Largest raw error allowed on a sub-track. Shell scaled sub-tracks (rotation
    /// and scale) have their error multiplied by the shell distance.
    #[inline]
    pub fn tolerance(&self, shell_scaled: bool) -> f32 {
        if shell_scaled && self.shell_distance > 0.0 {
            self.precision / self.shell_distance
        } else {
            self.precision
        }
    }
}

/// Uniformly sampled transform track of one bone, ready to be compressed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTrack {
    desc: TrackDescription,
    sample_rate: f32,
    samples: Vec<RigidTransform>,
}

impl RawTrack {
    pub fn new(desc: TrackDescription, sample_rate: f32, samples: Vec<RigidTransform>) -> RawTrack {
        RawTrack {
            desc,
            sample_rate,
            samples,
        }
    }

    #[inline]
    pub fn description(&self) -> &TrackDescription {
        &self.desc
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn samples(&self) -> &[RigidTransform] {
        &self.samples
    }

    /// Track duration in seconds.
    pub fn duration(&self) -> f32 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        (self.samples.len() - 1) as f32 / self.sample_rate
    }

    /// Checks the track can be handed to a codec.
    pub fn validate(&self) -> Result<(), AnimError> {
        let index = self.desc.output_index;
        if self.samples.is_empty() {
            return Err(AnimError::CompressFailure(format!("track {} has no samples", index)));
        }
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(AnimError::CompressFailure(format!(
                "track {} has invalid sample rate {}",
                index, self.sample_rate
            )));
        }
        if !self.desc.precision.is_finite() || self.desc.precision <= 0.0 {
            return Err(AnimError::CompressFailure(format!(
                "track {} has invalid precision {}",
                index, self.desc.precision
            )));
        }
        if !self.desc.shell_distance.is_finite() || self.desc.shell_distance < 0.0 {
            return Err(AnimError::CompressFailure(format!(
                "track {} has invalid shell distance {}",
                index, self.desc.shell_distance
            )));
        }
        if let Some(sample) = self.samples.iter().position(|s| !s.is_finite()) {
            return Err(AnimError::CompressFailure(format!(
                "track {} sample {} is not finite",
                index, sample
            )));
        }
        Ok(())
    }
}
