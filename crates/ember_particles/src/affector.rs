//! # Affectors
//!
//! Per-frame, per-particle mutation. Affectors live in the [`System`] and
//! run on worker threads, so every behaviour is `Send + Sync` and reads
//! only its own parameters.
//!
//! Built-in behaviours dispatch through a `match`; anything else plugs in
//! through [`AffectorBehaviour`].
//!
//! [`System`]: crate::System

use std::fmt;
use std::sync::Arc;

use ember_core::{Gradient, Handle, SimRng, Value};
use glam::{Mat3, Mat4, Quat, Vec3};

use crate::particle::Particle;

/// Handle to an affector registered on a [`System`](crate::System).
pub type AffectorId = Handle<Affector>;

/// User-defined per-particle behaviour.
pub trait AffectorBehaviour: Send + Sync + fmt::Debug {
    /// Mutates `particle` for a step of `dt` seconds at instance time `time`.
    fn update(&self, particle: &mut Particle, time: f32, dt: f32, rng: &mut SimRng);
}

/// Built-in affector behaviours.
#[derive(Clone, Debug)]
pub enum AffectorKind {
    /// Constant force, divided by mass.
    LinearForce {
        /// Force per axis, keyed by particle age.
        force: [Value; 3],
    },
    /// Velocity damping proportional to speed.
    Drag {
        /// Fraction of velocity removed per second.
        amount: Value,
    },
    /// Overwrites velocity.
    SetVelocity {
        /// Velocity per axis, keyed by particle age.
        velocity: [Value; 3],
    },
    /// Pulls particles towards a point that moves with the instance.
    PointAttractor {
        /// Attraction point in instance space.
        centre: Vec3,
        /// Acceleration towards the centre, divided by distance and mass.
        strength: Value,
    },
    /// Swirls position and velocity around an axis.
    Vortex {
        /// Point on the axis.
        centre: Vec3,
        /// Axis direction.
        axis: Vec3,
        /// Radians per second.
        rotation: Value,
    },
    /// Uniform scale over the particle's life.
    UniformScale {
        /// Scale, keyed by particle age.
        scale: Value,
    },
    /// Colour over the particle's life.
    Colourise {
        /// Colour, keyed by particle age.
        colour: Gradient,
    },
    /// Spins the particle around an axis.
    Rotate {
        /// Rotation axis.
        axis: Vec3,
        /// Axis is in the particle's own frame instead of world space.
        local: bool,
        /// Radians per second.
        amount: Value,
    },
    /// Aligns the particle's forward axis with its velocity.
    OrientToVelocity,
    /// Turns the particle's forward axis to a direction, keeping its
    /// current sideways axis where possible. Velocity is untouched.
    SetDirection {
        /// Direction per axis, keyed by particle age.
        direction: [Value; 3],
    },
    /// User-defined behaviour.
    Custom(Arc<dyn AffectorBehaviour>),
}

/// A per-particle behaviour attached to emitters.
#[derive(Clone, Debug)]
pub struct Affector {
    /// What the affector does.
    pub kind: AffectorKind,
    start_enabled: bool,
}

impl Affector {
    /// Affector that is active on newly spawned particles.
    #[must_use]
    pub const fn new(kind: AffectorKind) -> Self {
        Self {
            kind,
            start_enabled: true,
        }
    }

    /// Affector that starts inactive until an event enables it.
    #[must_use]
    pub const fn disabled(kind: AffectorKind) -> Self {
        Self {
            kind,
            start_enabled: false,
        }
    }

    /// Whether new particles start with this affector's bit set.
    #[must_use]
    pub const fn start_enabled(&self) -> bool {
        self.start_enabled
    }

    pub(crate) fn set_start_enabled(&mut self, enabled: bool) {
        self.start_enabled = enabled;
    }

    /// Applies one step of `dt` seconds. `transform` is the owning
    /// instance's transform.
    pub fn update(&self, particle: &mut Particle, time: f32, dt: f32, transform: &Mat4, rng: &mut SimRng) {
        let age = particle.age(time);
        match &self.kind {
            AffectorKind::LinearForce { force } => {
                let force = sample3(force, age, rng);
                particle.velocity += force * dt * particle.inverse_mass();
            }
            AffectorKind::Drag { amount } => {
                let amount = amount.value(age, rng);
                particle.velocity -= particle.velocity * (amount * dt).min(1.0);
            }
            AffectorKind::SetVelocity { velocity } => {
                particle.velocity = sample3(velocity, age, rng);
            }
            AffectorKind::PointAttractor { centre, strength } => {
                let centre = transform.transform_point3(*centre);
                let strength = strength.value(age, rng);
                let offset = centre - particle.position;
                let distance = offset.length().max(MIN_ATTRACTOR_DISTANCE);
                particle.velocity += offset * (strength * dt / distance) * particle.inverse_mass();
            }
            AffectorKind::Vortex {
                centre,
                axis,
                rotation,
            } => {
                let Some(axis) = axis.try_normalize() else {
                    return;
                };
                let spin = Quat::from_axis_angle(axis, rotation.value(age, rng) * dt);
                particle.position = *centre + spin * (particle.position - *centre);
                particle.velocity = spin * particle.velocity;
            }
            AffectorKind::UniformScale { scale } => {
                particle.scale = Vec3::splat(scale.value(age, rng));
            }
            AffectorKind::Colourise { colour } => {
                particle.colour = colour.value(age);
            }
            AffectorKind::Rotate {
                axis,
                local,
                amount,
            } => {
                let axis = if *local {
                    particle.orientation * *axis
                } else {
                    *axis
                };
                let Some(axis) = axis.try_normalize() else {
                    return;
                };
                let spin = Quat::from_axis_angle(axis, amount.value(age, rng) * dt);
                particle.orientation = (spin * particle.orientation).normalize();
            }
            AffectorKind::OrientToVelocity => {
                if let Some(orientation) = look_along(particle.velocity) {
                    particle.orientation = orientation;
                }
            }
            AffectorKind::SetDirection { direction } => {
                let direction = sample3(direction, age, rng);
                let side = particle.orientation * Vec3::X;
                if let Some(orientation) = face_along(direction, side).or_else(|| look_along(direction)) {
                    particle.orientation = orientation;
                }
            }
            AffectorKind::Custom(behaviour) => behaviour.update(particle, time, dt, rng),
        }
    }

    /// Applies the affector once, as a one-second step.
    #[inline]
    pub fn trigger(&self, particle: &mut Particle, time: f32, transform: &Mat4, rng: &mut SimRng) {
        self.update(particle, time, 1.0, transform, rng);
    }
}

#[inline]
fn sample3(values: &[Value; 3], key: f32, rng: &mut SimRng) -> Vec3 {
    Vec3::new(
        values[0].value(key, rng),
        values[1].value(key, rng),
        values[2].value(key, rng),
    )
}

/// Attraction is capped as if the particle were this close to the centre.
const MIN_ATTRACTOR_DISTANCE: f32 = 0.01;

/// Orientation whose +Z points along `direction`, with +Y kept up.
fn look_along(direction: Vec3) -> Option<Quat> {
    let forward = direction.try_normalize()?;
    let left = Vec3::Y.cross(forward).try_normalize()?;
    let up = forward.cross(left);
    Some(Quat::from_mat3(&Mat3::from_cols(left, up, forward)))
}

/// Orientation whose +Z points along `direction`, with +X as close to
/// `side` as the new forward axis allows.
fn face_along(direction: Vec3, side: Vec3) -> Option<Quat> {
    let forward = direction.try_normalize()?;
    let up = forward.cross(side).try_normalize()?;
    let left = up.cross(forward);
    Some(Quat::from_mat3(&Mat3::from_cols(left, up, forward)))
}
