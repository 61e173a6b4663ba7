//! Integration tests for the per-frame particle lifecycle.

use std::sync::Arc;

use ember_particles::{
    Affector, AffectorKind, Emitter, EmitterShape, Event, EventEffect, EventKind, EventTarget, Instance,
    RenderData, RenderKind, SpriteVertex, System, Value,
};
use glam::{Mat4, Vec3};

fn emitter(rate: f32, life: f32) -> Emitter {
    let mut emitter = Emitter::new(EmitterShape::point(1.0));
    emitter.rate = Value::constant(rate);
    emitter.life = Value::constant(life);
    emitter
}

fn enabled(system: System) -> Instance {
    let mut instance = Instance::with_seed(Arc::new(system), 7);
    instance.set_enabled(true);
    instance
}

#[test]
fn test_steady_rate_spawns_back_dated_particles() {
    let mut system = System::new();
    let id = system.add_emitter(emitter(10.0, 2.0));
    let mut instance = enabled(system);

    instance.update(1.0);

    assert_eq!(instance.particle_count(), 10);
    let mut spawn_times: Vec<f32> = instance
        .emitter_particles(id)
        .iter()
        .map(|&slot| instance.particle(slot).unwrap().spawn_time)
        .collect();
    spawn_times.sort_by(f32::total_cmp);
    assert!((spawn_times[9] - instance.time()).abs() < 1e-6);
    for pair in spawn_times.windows(2) {
        assert!((pair[1] - pair[0] - 0.1).abs() < 1e-5);
    }
    for (_, particle) in instance.particles() {
        assert!((particle.die_time - particle.spawn_time - 2.0).abs() < 1e-5);
    }
}

#[test]
fn test_small_pool_drops_excess_spawns() {
    let mut system = System::new();
    system.set_pool_size(5);
    let mut busy = emitter(8.0, 10.0);
    busy.limit = 10;
    system.add_emitter(busy);
    let mut instance = enabled(system);

    instance.update(1.0);

    assert_eq!(instance.particle_count(), 5);
    assert_eq!(instance.stats().spawned, 5);
    assert_eq!(instance.stats().dropped, 3);
}

#[test]
fn test_die_event_enables_second_emitter() {
    let mut system = System::new();
    let first = system.add_emitter(emitter(10.0, 0.05));
    let mut dormant = emitter(10.0, 1.0);
    dormant.start_enabled = false;
    let second = system.add_emitter(dormant);
    let wake = system.add_event(Event::new(
        EventKind::Die,
        EventEffect::Enable,
        Some(EventTarget::Emitter(second)),
    ));
    system.attach_event(first, wake).unwrap();
    let mut instance = enabled(system);

    instance.step(1.0, &Mat4::IDENTITY);
    assert!(!instance.is_emitter_enabled(second));
    assert!(instance.emitter_particles(second).is_empty());

    instance.step(0.1, &Mat4::IDENTITY);
    assert!(instance.is_emitter_enabled(second));

    instance.step(0.1, &Mat4::IDENTITY);
    assert!(!instance.emitter_particles(second).is_empty());
}

#[test]
fn test_die_event_spawns_children_at_parent() {
    let mut system = System::new();
    let mut parent = emitter(1.0, 0.5);
    parent.shape = EmitterShape::point(0.0);
    let parent = system.add_emitter(parent);

    let mut child = emitter(0.0, 10.0);
    child.event_only = true;
    child.spawn_count = 3;
    child.shape = EmitterShape::point(0.0);
    let child = system.add_emitter(child);

    let burst = system.add_event(Event::new(
        EventKind::Die,
        EventEffect::Trigger,
        Some(EventTarget::Emitter(child)),
    ));
    system.attach_event(parent, burst).unwrap();
    let mut instance = enabled(system);
    instance.set_transform(Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));

    // Born at t=1, found expired by the workers at t=2, freed at t=3
    instance.step(1.0, &Mat4::IDENTITY);
    instance.step(1.0, &Mat4::IDENTITY);
    assert!(instance.emitter_particles(child).is_empty());
    instance.step(1.0, &Mat4::IDENTITY);
    assert_eq!(instance.emitter_particles(child).len(), 3);
    for &slot in instance.emitter_particles(child) {
        assert_eq!(instance.particle(slot).unwrap().position, Vec3::new(5.0, 0.0, 0.0));
    }
}

#[test]
fn test_time_event_toggles_affector() {
    let mut system = System::new();
    let mut source = emitter(1.0, 10.0);
    source.shape = EmitterShape::point(0.0);
    let source = system.add_emitter(source);
    let push = system.add_affector(Affector::disabled(AffectorKind::SetVelocity {
        velocity: [Value::constant(1.0), Value::constant(0.0), Value::constant(0.0)],
    }));
    let tick = system.add_event(Event::timed(
        0.5,
        true,
        EventEffect::Enable,
        Some(EventTarget::Affector(push)),
    ));
    system.attach_affector(source, push).unwrap();
    system.attach_event(source, tick).unwrap();
    let mut instance = enabled(system);

    instance.step(1.0, &Mat4::IDENTITY);
    let slot = instance.emitter_particles(source)[0];
    assert_eq!(instance.particle(slot).unwrap().velocity, Vec3::ZERO);

    // The boundary is queued by the workers and applied next serial phase
    instance.step(0.1, &Mat4::IDENTITY);
    assert_eq!(instance.particle(slot).unwrap().velocity, Vec3::X);
}

#[test]
fn test_pool_conservation_over_many_frames() {
    let mut system = System::new();
    system.set_pool_size(64);
    let mut fast = emitter(40.0, 0.3);
    fast.life = Value::random(0.1, 0.6);
    let a = system.add_emitter(fast);
    let b = system.add_emitter(emitter(25.0, 0.2));
    let mut instance = enabled(system);

    for frame in 0..200 {
        instance.step(1.0 / 30.0, &Mat4::IDENTITY);

        let listed = instance.emitter_particles(a).len() + instance.emitter_particles(b).len();
        assert!(instance.particle_count() <= instance.pool_size(), "frame {frame}");
        assert_eq!(listed, instance.particle_count(), "frame {frame}");
        assert_eq!(instance.particles().count(), instance.particle_count(), "frame {frame}");
    }
    let stats = instance.stats();
    assert_eq!(stats.spawned - stats.destroyed, instance.particle_count() as u64);
}

#[test]
fn test_update_zero_is_idempotent() {
    let mut system = System::new();
    let mut idle = emitter(10.0, 5.0);
    idle.start_enabled = false;
    system.add_emitter(idle);
    let mut instance = enabled(system);

    let before: Vec<_> = instance.particles().map(|(slot, p)| (slot, *p)).collect();
    for _ in 0..5 {
        instance.update(0.0);
    }
    let after: Vec<_> = instance.particles().map(|(slot, p)| (slot, *p)).collect();
    assert_eq!(before, after);
    assert_eq!(instance.particle_count(), 0);
    assert_eq!(instance.stats().spawned, 0);
}

#[test]
fn test_shared_renderer_regions_do_not_overlap() {
    let mut system = System::new();
    let sprites = system.add_renderer(RenderData::new(RenderKind::SpriteQuads));
    let a = system.add_emitter(emitter(10.0, 5.0));
    let b = system.add_emitter(emitter(5.0, 5.0));
    system.set_renderer(a, Some(sprites)).unwrap();
    system.set_renderer(b, Some(sprites)).unwrap();
    let mut instance = enabled(system);
    instance.set_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, 1.0)));

    instance.step(1.0, &Mat4::IDENTITY);

    let buffer = instance.render_buffer(sprites).unwrap();
    assert_eq!(buffer.particle_count(), 15);
    assert_eq!(buffer.vertex_count(), 60);

    let particle_size = 4 * std::mem::size_of::<SpriteVertex>();
    let listed: Vec<_> = instance
        .emitter_particles(a)
        .iter()
        .chain(instance.emitter_particles(b))
        .copied()
        .collect();
    for (i, slot) in listed.into_iter().enumerate() {
        let chunk = &buffer.bytes()[i * particle_size..(i + 1) * particle_size];
        let first: SpriteVertex = bytemuck::pod_read_unaligned(&chunk[..std::mem::size_of::<SpriteVertex>()]);
        let p = instance.particle(slot).unwrap();
        // Bottom-left corner of a unit billboard
        let expected = p.position - Vec3::new(0.5, 0.5, 0.0);
        assert!((Vec3::from_array(first.position) - expected).length() < 1e-5);
    }
}
