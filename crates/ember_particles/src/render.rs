//! # Render Data
//!
//! Describes the vertices each particle produces and writes them into an
//! instance-owned byte buffer. Drawing is left to the host backend, which
//! reads [`RenderData::primitive`], [`RenderData::vertex_attributes`] and
//! `Instance::render_buffer`.
//!
//! ## Buffer Layout
//!
//! Emitters sharing a renderer get consecutive regions; particle `i` of an
//! emitter lands at `base(emitter) + i`:
//!
//! ```text
//!   ┌──────────── emitter A ────────────┬──────── emitter B ────────┐
//!   │ p0 │ p1 │ p2 │ p3 │ p4 │ p5 │ p6  │ p0 │ p1 │ p2 │ p3 │ p4   │ ...
//!   └──t0──┴─t1─┴─t0─┴─t1─┴─t0─┴─t1─┴─t0──┴─t0─┴─t1─┴─t0─┴─t1─┴─t0──┘
//! ```
//!
//! Each worker writes only the slots of its strided indices, so output is
//! identical for any thread count.
//!
//! ## Safety Note
//!
//! Workers borrow their strided vertex slots through
//! `Instance::render_partition_mut`, under the same partition contract as
//! the particle pool.

#![allow(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use ember_core::{Handle, PartitionedSlots};
use glam::{Mat4, Vec3};

use crate::instance::{Instance, Partition};
use crate::particle::Particle;

/// Handle to a renderer registered on a [`System`](crate::System).
pub type RendererId = Handle<RenderData>;

/// Slack, in particles, added whenever a render buffer grows.
const GROWTH_SLACK: usize = 16;

/// Geometry a particle expands to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Two triangles.
    Triangles,
    /// One quad.
    Quads,
    /// Two vertices of a triangle strip.
    Strip,
    /// One point.
    Points,
    /// One per-instance record for mesh instancing.
    Instance,
}

impl Primitive {
    /// Vertices written per particle.
    #[inline]
    #[must_use]
    pub const fn vertices_per_particle(self) -> usize {
        match self {
            Self::Triangles => 6,
            Self::Quads => 4,
            Self::Strip => 2,
            Self::Points | Self::Instance => 1,
        }
    }
}

/// Storage format of one attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeFormat {
    /// Two `f32`.
    Float2,
    /// Three `f32`.
    Float3,
    /// Four `f32`.
    Float4,
    /// Packed colour, one byte per channel.
    Argb,
}

impl AttributeFormat {
    /// Size in bytes.
    #[inline]
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
            Self::Argb => 4,
        }
    }
}

/// Meaning of one attribute.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AttributeSemantic {
    /// World position.
    Position,
    /// Texture coordinate.
    TexCoord,
    /// Packed colour.
    Colour,
    /// Per-axis scale.
    Scale,
    /// Orientation quaternion.
    Rotation,
    /// Backend-defined.
    Custom(String),
}

/// One attribute of the vertex layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Meaning.
    pub semantic: AttributeSemantic,
    /// Storage format.
    pub format: AttributeFormat,
    /// 0 advances per vertex, 1 per instance.
    pub divisor: u32,
}

/// Vertex layout, in declaration order with no padding.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexAttributes {
    attributes: Vec<VertexAttribute>,
}

impl VertexAttributes {
    /// Empty layout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attributes: Vec::new(),
        }
    }

    /// Appends an attribute.
    #[must_use]
    pub fn with(mut self, semantic: AttributeSemantic, format: AttributeFormat, divisor: u32) -> Self {
        self.attributes.push(VertexAttribute {
            semantic,
            format,
            divisor,
        });
        self
    }

    /// Bytes per vertex.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.attributes.iter().map(|a| a.format.size()).sum()
    }

    /// Byte offset of every attribute.
    pub fn offsets(&self) -> impl Iterator<Item = (&VertexAttribute, usize)> {
        self.attributes.iter().scan(0, |offset, attribute| {
            let at = *offset;
            *offset += attribute.format.size();
            Some((attribute, at))
        })
    }

    /// Attributes in order.
    pub fn iter(&self) -> impl Iterator<Item = &VertexAttribute> {
        self.attributes.iter()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true for a layout with no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Billboard vertex: position, texture coordinate, colour.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    /// World position.
    pub position: [f32; 3],
    /// Texture coordinate.
    pub texcoord: [f32; 2],
    /// Packed colour.
    pub colour: u32,
}

/// Point vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointVertex {
    /// World position.
    pub position: [f32; 3],
    /// Packed colour.
    pub colour: u32,
}

/// Per-instance record for mesh instancing.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct InstanceVertex {
    /// World position.
    pub position: [f32; 3],
    /// Per-axis scale.
    pub scale: [f32; 3],
    /// Orientation quaternion, xyzw.
    pub rotation: [f32; 4],
    /// Packed colour.
    pub colour: u32,
}

/// User-defined vertex writer.
pub trait VertexWriter: Send + Sync + fmt::Debug {
    /// Geometry kind.
    fn primitive(&self) -> Primitive;

    /// Layout of one vertex.
    fn attributes(&self) -> VertexAttributes;

    /// Writes one particle. `dst` is exactly
    /// `stride * vertices_per_particle` bytes.
    fn write(&self, dst: &mut [u8], particle: &Particle, view: &Mat4);
}

/// Built-in renderers.
#[derive(Clone, Debug)]
pub enum RenderKind {
    /// Camera-facing quad as two triangles.
    Sprite,
    /// Camera-facing quad.
    SpriteQuads,
    /// Single point.
    Points,
    /// Mesh instancing records.
    Instance {
        /// Mesh the backend instances.
        mesh: String,
    },
    /// Camera-facing strip segment.
    Ribbon,
    /// User-defined layout.
    Custom(Arc<dyn VertexWriter>),
}

/// Vertex layout and writer for one kind of particle geometry.
#[derive(Clone, Debug)]
pub struct RenderData {
    kind: RenderKind,
    primitive: Primitive,
    attributes: VertexAttributes,
    /// Material name for the backend.
    pub material: Option<String>,
}

impl RenderData {
    /// Renderer of `kind`.
    #[must_use]
    pub fn new(kind: RenderKind) -> Self {
        let sprite = || {
            VertexAttributes::new()
                .with(AttributeSemantic::Position, AttributeFormat::Float3, 0)
                .with(AttributeSemantic::TexCoord, AttributeFormat::Float2, 0)
                .with(AttributeSemantic::Colour, AttributeFormat::Argb, 0)
        };
        let (primitive, attributes) = match &kind {
            RenderKind::Sprite => (Primitive::Triangles, sprite()),
            RenderKind::SpriteQuads => (Primitive::Quads, sprite()),
            RenderKind::Ribbon => (Primitive::Strip, sprite()),
            RenderKind::Points => (
                Primitive::Points,
                VertexAttributes::new()
                    .with(AttributeSemantic::Position, AttributeFormat::Float3, 0)
                    .with(AttributeSemantic::Colour, AttributeFormat::Argb, 0),
            ),
            RenderKind::Instance { .. } => (
                Primitive::Instance,
                VertexAttributes::new()
                    .with(AttributeSemantic::Position, AttributeFormat::Float3, 1)
                    .with(AttributeSemantic::Scale, AttributeFormat::Float3, 1)
                    .with(AttributeSemantic::Rotation, AttributeFormat::Float4, 1)
                    .with(AttributeSemantic::Colour, AttributeFormat::Argb, 1),
            ),
            RenderKind::Custom(writer) => (writer.primitive(), writer.attributes()),
        };
        Self {
            kind,
            primitive,
            attributes,
            material: None,
        }
    }

    /// Same renderer with a material name.
    #[must_use]
    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }

    /// Built-in kind.
    #[must_use]
    pub const fn kind(&self) -> &RenderKind {
        &self.kind
    }

    /// Geometry kind.
    #[must_use]
    pub const fn primitive(&self) -> Primitive {
        self.primitive
    }

    /// Vertex layout.
    #[must_use]
    pub const fn vertex_attributes(&self) -> &VertexAttributes {
        &self.attributes
    }

    /// Vertices per particle.
    #[must_use]
    pub const fn vertices_per_particle(&self) -> usize {
        self.primitive.vertices_per_particle()
    }

    /// Bytes per particle.
    #[must_use]
    pub fn particle_size(&self) -> usize {
        self.attributes.stride() * self.vertices_per_particle()
    }

    /// Mesh name for instancing renderers.
    #[must_use]
    pub fn instanced_mesh(&self) -> Option<&str> {
        match &self.kind {
            RenderKind::Instance { mesh } => Some(mesh),
            _ => None,
        }
    }

    /// Sizes the instance buffer for `count` particles.
    ///
    /// Grows geometrically and never shrinks.
    pub(crate) fn set_count(&self, state: &mut RenderState, count: usize) {
        let particle_size = self.particle_size();
        state.particle_size = particle_size;
        state.count = count;
        let needed = count * particle_size;
        if needed > state.bytes.len() {
            let grown = ((count + GROWTH_SLACK) * particle_size).max(state.bytes.len() * 2);
            state.bytes.grow(grown, 0);
        }
    }

    /// Worker step: writes this thread's share of one emitter's particles.
    pub(crate) fn update_parallel(
        &self,
        instance: &Instance,
        renderer: usize,
        emitter: usize,
        partition: Partition,
        view: &Mat4,
    ) {
        // SAFETY: `partition` comes from the current parallel phase and the
        // emitter step of this partition has finished.
        let Some(writes) = (unsafe { instance.render_partition_mut(renderer, emitter, partition) }) else {
            return;
        };
        for (particle, dst) in writes {
            self.write_particle(dst, particle, view);
        }
    }

    /// Writes one particle's vertices into `dst`.
    pub fn write_particle(&self, dst: &mut [u8], particle: &Particle, view: &Mat4) {
        match &self.kind {
            RenderKind::Sprite => {
                let [a, b, c, d] = billboard(particle, view);
                dst.copy_from_slice(bytemuck::cast_slice(&[a, b, d, d, b, c]));
            }
            RenderKind::SpriteQuads => {
                dst.copy_from_slice(bytemuck::cast_slice(&billboard(particle, view)));
            }
            RenderKind::Ribbon => {
                let right = view.row(0).truncate() * particle.scale.x;
                let left = sprite_vertex(particle.position - right, [0.0, 0.0], particle.colour);
                let right = sprite_vertex(particle.position + right, [1.0, 0.0], particle.colour);
                dst.copy_from_slice(bytemuck::cast_slice(&[left, right]));
            }
            RenderKind::Points => {
                let vertex = PointVertex {
                    position: particle.position.to_array(),
                    colour: particle.colour,
                };
                dst.copy_from_slice(bytemuck::bytes_of(&vertex));
            }
            RenderKind::Instance { .. } => {
                let vertex = InstanceVertex {
                    position: particle.position.to_array(),
                    scale: particle.scale.to_array(),
                    rotation: particle.orientation.to_array(),
                    colour: particle.colour,
                };
                dst.copy_from_slice(bytemuck::bytes_of(&vertex));
            }
            RenderKind::Custom(writer) => writer.write(dst, particle, view),
        }
    }
}

#[inline]
fn sprite_vertex(position: Vec3, texcoord: [f32; 2], colour: u32) -> SpriteVertex {
    SpriteVertex {
        position: position.to_array(),
        texcoord,
        colour,
    }
}

/// Quad corners facing the camera, counter-clockwise from bottom-left.
fn billboard(particle: &Particle, view: &Mat4) -> [SpriteVertex; 4] {
    let right = view.row(0).truncate() * particle.scale.x * 0.5;
    let up = view.row(1).truncate() * particle.scale.y * 0.5;
    let p = particle.position;
    let colour = particle.colour;
    [
        sprite_vertex(p - right - up, [0.0, 0.0], colour),
        sprite_vertex(p + right - up, [1.0, 0.0], colour),
        sprite_vertex(p + right + up, [1.0, 1.0], colour),
        sprite_vertex(p - right + up, [0.0, 1.0], colour),
    ]
}

/// Per-instance buffer of one renderer.
#[derive(Debug, Default)]
pub(crate) struct RenderState {
    pub(crate) bytes: PartitionedSlots<u8>,
    pub(crate) count: usize,
    pub(crate) particle_size: usize,
    /// First particle of each emitter's region, by emitter slot.
    pub(crate) bases: Vec<usize>,
}

/// Vertex bytes of one renderer, ready for upload.
#[derive(Clone, Copy, Debug)]
pub struct RenderBuffer<'a> {
    bytes: &'a [u8],
    count: usize,
    vertices_per_particle: usize,
}

impl<'a> RenderBuffer<'a> {
    pub(crate) fn new(bytes: &'a [u8], count: usize, vertices_per_particle: usize) -> Self {
        Self {
            bytes,
            count,
            vertices_per_particle,
        }
    }

    /// Written bytes: `count * particle_size`.
    #[must_use]
    pub const fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Particles in the buffer.
    #[must_use]
    pub const fn particle_count(&self) -> usize {
        self.count
    }

    /// Vertices in the buffer.
    #[must_use]
    pub const fn vertex_count(&self) -> usize {
        self.count * self.vertices_per_particle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn sprite_vertices(bytes: &[u8]) -> Vec<SpriteVertex> {
        bytes
            .chunks_exact(std::mem::size_of::<SpriteVertex>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    fn particle() -> Particle {
        Particle {
            position: Vec3::new(1.0, 2.0, 3.0),
            scale: Vec3::splat(2.0),
            colour: 0xff11_2233,
            spawn_time: 1.0,
            die_time: 2.0,
            ..Particle::FREE
        }
    }

    #[test]
    fn test_vertices_per_particle_table() {
        assert_eq!(Primitive::Triangles.vertices_per_particle(), 6);
        assert_eq!(Primitive::Quads.vertices_per_particle(), 4);
        assert_eq!(Primitive::Strip.vertices_per_particle(), 2);
        assert_eq!(Primitive::Points.vertices_per_particle(), 1);
        assert_eq!(Primitive::Instance.vertices_per_particle(), 1);
    }

    #[test]
    fn test_strides_match_vertex_structs() {
        let sprite = RenderData::new(RenderKind::Sprite);
        assert_eq!(sprite.vertex_attributes().stride(), std::mem::size_of::<SpriteVertex>());
        assert_eq!(sprite.particle_size(), 6 * 24);

        let points = RenderData::new(RenderKind::Points);
        assert_eq!(points.vertex_attributes().stride(), std::mem::size_of::<PointVertex>());

        let mesh = RenderData::new(RenderKind::Instance { mesh: "rock".into() });
        assert_eq!(mesh.vertex_attributes().stride(), std::mem::size_of::<InstanceVertex>());
        assert_eq!(mesh.instanced_mesh(), Some("rock"));
        assert!(mesh.vertex_attributes().iter().all(|a| a.divisor == 1));
    }

    #[test]
    fn test_attribute_offsets() {
        let layout = RenderData::new(RenderKind::Sprite).vertex_attributes().clone();
        let offsets: Vec<_> = layout.offsets().map(|(_, offset)| offset).collect();
        assert_eq!(offsets, vec![0, 12, 20]);
    }

    #[test]
    fn test_quad_billboard_faces_identity_view() {
        let quads = RenderData::new(RenderKind::SpriteQuads);
        let mut dst = vec![0u8; quads.particle_size()];
        quads.write_particle(&mut dst, &particle(), &Mat4::IDENTITY);

        let vertices = sprite_vertices(&dst);
        assert_eq!(vertices[0].position, [0.0, 1.0, 3.0]);
        assert_eq!(vertices[2].position, [2.0, 3.0, 3.0]);
        assert_eq!(vertices[3].texcoord, [0.0, 1.0]);
        assert!(vertices.iter().all(|v| v.colour == 0xff11_2233));
    }

    #[test]
    fn test_sprite_triangles_share_corners() {
        let sprite = RenderData::new(RenderKind::Sprite);
        let mut dst = vec![0u8; sprite.particle_size()];
        sprite.write_particle(&mut dst, &particle(), &Mat4::IDENTITY);

        let vertices = sprite_vertices(&dst);
        assert_eq!(vertices[2], vertices[3]);
        assert_eq!(vertices[1], vertices[4]);
    }

    #[test]
    fn test_instance_record() {
        let mesh = RenderData::new(RenderKind::Instance { mesh: "rock".into() });
        let mut p = particle();
        p.orientation = Quat::from_rotation_y(1.0);
        let mut dst = vec![0u8; mesh.particle_size()];
        mesh.write_particle(&mut dst, &p, &Mat4::IDENTITY);

        let record: InstanceVertex = bytemuck::pod_read_unaligned(&dst);
        assert_eq!(record.position, [1.0, 2.0, 3.0]);
        assert_eq!(record.scale, [2.0, 2.0, 2.0]);
        assert_eq!(record.rotation, p.orientation.to_array());
    }

    #[test]
    fn test_set_count_grows_and_never_shrinks() {
        let points = RenderData::new(RenderKind::Points);
        let mut state = RenderState::default();

        points.set_count(&mut state, 4);
        assert_eq!(state.bytes.len(), (4 + GROWTH_SLACK) * 16);

        points.set_count(&mut state, 1);
        assert_eq!(state.count, 1);
        assert_eq!(state.bytes.len(), (4 + GROWTH_SLACK) * 16);

        points.set_count(&mut state, 100);
        assert!(state.bytes.len() >= 100 * 16);
    }
}
