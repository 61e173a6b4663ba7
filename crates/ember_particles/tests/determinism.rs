//! Integration tests: results must not depend on the worker count.

use std::sync::Arc;

use ember_particles::{
    Affector, AffectorKind, CapabilityOwner, Emitter, EmitterShape, Event, EventEffect, EventKind, EventTarget,
    Gradient, Instance, InstanceHandle, Manager, Particle, RenderData, RenderKind, RendererId, System, Value,
    MAX_CAPABILITIES,
};
use glam::{Mat4, Vec3};

struct Scene {
    system: Arc<System>,
    sprites: RendererId,
    points: RendererId,
}

/// Random shapes, random forces, timed and death events, and two emitters
/// sharing one renderer.
fn scene() -> Scene {
    let mut system = System::new();
    system.set_pool_size(2_000);

    let sprites = system.add_renderer(RenderData::new(RenderKind::Sprite).with_material("spark"));
    let points = system.add_renderer(RenderData::new(RenderKind::Points));

    let mut fountain = Emitter::new(EmitterShape::Point {
        velocity: Value::random(2.0, 4.0),
        cone: Value::constant(25.0),
    });
    fountain.rate = Value::constant(120.0);
    fountain.life = Value::random(0.4, 1.2);
    fountain.colour = Gradient::from_keys(&[(0.0, 0xffff_8000), (5.0, 0xff20_0000)]);
    let fountain = system.add_emitter(fountain);

    let mut mist = Emitter::new(EmitterShape::SphereSurface {
        radius: Value::random(0.5, 1.0),
        velocity: Value::constant(0.3),
    });
    mist.rate = Value::constant(60.0);
    mist.life = Value::constant(0.8);
    let mist = system.add_emitter(mist);

    let mut sparks = Emitter::new(EmitterShape::Sphere {
        radius: Value::constant(0.1),
        velocity: Value::random(0.5, 1.5),
        cone: Value::constant(180.0),
    });
    sparks.event_only = true;
    sparks.spawn_count = 4;
    sparks.life = Value::random(0.2, 0.5);
    sparks.inherit_velocity = 0.5;
    let sparks = system.add_emitter(sparks);

    let gravity = system.add_affector(Affector::new(AffectorKind::LinearForce {
        force: [Value::random(-0.5, 0.5), Value::constant(-9.8), Value::random(-0.5, 0.5)],
    }));
    let drag = system.add_affector(Affector::disabled(AffectorKind::Drag {
        amount: Value::random(0.5, 2.0),
    }));
    let spin = system.add_affector(Affector::new(AffectorKind::Rotate {
        axis: Vec3::Y,
        local: true,
        amount: Value::random(-3.0, 3.0),
    }));
    let swirl = system.add_affector(Affector::new(AffectorKind::Vortex {
        centre: Vec3::ZERO,
        axis: Vec3::Y,
        rotation: Value::constant(1.5),
    }));
    let burst = system.add_event(Event::new(
        EventKind::Die,
        EventEffect::Trigger,
        Some(EventTarget::Emitter(sparks)),
    ));
    let slow = system.add_event(Event::timed(0.25, false, EventEffect::Toggle, Some(EventTarget::Affector(drag))));

    for emitter in [fountain, sparks] {
        system.attach_affector(emitter, gravity).unwrap();
        system.attach_affector(emitter, drag).unwrap();
        system.attach_affector(emitter, spin).unwrap();
    }
    system.attach_affector(mist, swirl).unwrap();
    system.attach_event(fountain, burst).unwrap();
    system.attach_event(fountain, slow).unwrap();

    system.set_renderer(fountain, Some(sprites)).unwrap();
    system.set_renderer(sparks, Some(sprites)).unwrap();
    system.set_renderer(mist, Some(points)).unwrap();

    Scene {
        system: Arc::new(system),
        sprites,
        points,
    }
}

struct Snapshot {
    particles: Vec<Particle>,
    sprites: Vec<u8>,
    points: Vec<u8>,
}

fn snapshot(manager: &Manager, handle: InstanceHandle, scene: &Scene) -> Snapshot {
    let instance = manager.get(handle).unwrap();
    Snapshot {
        particles: instance.particles().map(|(_, p)| *p).collect(),
        sprites: instance.render_buffer(scene.sprites).unwrap().bytes().to_vec(),
        points: instance.render_buffer(scene.points).unwrap().bytes().to_vec(),
    }
}

fn run(threads: Option<usize>, frames: usize) -> Vec<Snapshot> {
    let scene = scene();
    let mut manager = Manager::new();
    if let Some(threads) = threads {
        manager.start_threads(threads).unwrap();
    }
    let handle = manager.add(Instance::with_seed(Arc::clone(&scene.system), 42));
    manager
        .get_mut(handle)
        .unwrap()
        .set_velocity(Vec3::new(0.5, 0.0, 0.0));

    let view = Mat4::look_at_rh(Vec3::new(3.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
    (0..frames)
        .map(|_| {
            manager.update(1.0 / 60.0, &view).unwrap();
            snapshot(&manager, handle, &scene)
        })
        .collect()
}

#[test]
fn test_one_and_four_workers_are_bit_identical() {
    let inline = run(None, 120);
    let single = run(Some(1), 120);
    let quad = run(Some(4), 120);

    assert!(inline.last().unwrap().particles.len() > 50);
    for (frame, ((a, b), c)) in inline.iter().zip(&single).zip(&quad).enumerate() {
        assert_eq!(a.particles, b.particles, "frame {frame}: inline vs 1 worker");
        assert_eq!(a.particles, c.particles, "frame {frame}: inline vs 4 workers");
        assert_eq!(a.sprites, c.sprites, "frame {frame}: sprite bytes");
        assert_eq!(a.points, c.points, "frame {frame}: point bytes");
    }
}

#[test]
fn test_same_seed_replays_and_other_seed_differs() {
    let first = run(Some(3), 30);
    let again = run(Some(3), 30);
    assert_eq!(first.last().unwrap().particles, again.last().unwrap().particles);

    let scene = scene();
    let mut manager = Manager::new();
    let handle = manager.add(Instance::with_seed(Arc::clone(&scene.system), 43));
    for _ in 0..30 {
        manager.update(1.0 / 60.0, &Mat4::IDENTITY).unwrap();
    }
    let other = snapshot(&manager, handle, &scene);
    assert_ne!(first.last().unwrap().particles, other.particles);
}

#[test]
fn test_capability_bits_are_unique_per_emitter() {
    let scene = scene();
    for (_, emitter) in scene.system.emitters() {
        let mut seen = 0u32;
        for (owner, bit) in emitter.capabilities().iter() {
            assert_eq!(bit.count_ones(), 1, "{owner:?}");
            assert_eq!(seen & bit, 0, "{owner:?} shares a bit");
            seen |= bit;
        }
        assert!(emitter.capabilities().len() <= MAX_CAPABILITIES);
        for &affector in emitter.affectors() {
            assert!(emitter.capabilities().bit(CapabilityOwner::Affector(affector)).is_some());
        }
    }
}
