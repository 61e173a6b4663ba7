//! Benchmark for frame simulation throughput.
//!
//! Run with: cargo bench --package ember_particles --bench frame_benchmark

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ember_particles::{
    Affector, AffectorKind, Emitter, EmitterShape, Instance, Manager, RenderData, RenderKind, System, Value,
};
use glam::{Mat4, Vec3};

const DT: f32 = 1.0 / 60.0;

/// Fountain at a steady ~1000 live particles, drawn as sprites.
fn create_fountain() -> Arc<System> {
    let mut system = System::new();
    system.set_pool_size(2_000);

    let sprites = system.add_renderer(RenderData::new(RenderKind::Sprite));
    let mut emitter = Emitter::new(EmitterShape::Point {
        velocity: Value::random(2.0, 4.0),
        cone: Value::constant(20.0),
    });
    emitter.limit = 2_000;
    emitter.rate = Value::constant(1_000.0);
    emitter.life = Value::random(0.8, 1.2);
    let emitter = system.add_emitter(emitter);

    let gravity = system.add_affector(Affector::new(AffectorKind::LinearForce {
        force: [Value::constant(0.0), Value::constant(-9.8), Value::constant(0.0)],
    }));
    let drag = system.add_affector(Affector::new(AffectorKind::Drag {
        amount: Value::constant(0.3),
    }));
    system.attach_affector(emitter, gravity).unwrap();
    system.attach_affector(emitter, drag).unwrap();
    system.set_renderer(emitter, Some(sprites)).unwrap();

    Arc::new(system)
}

fn warmed_manager(system: &Arc<System>, instances: usize, threads: Option<usize>) -> Manager {
    let mut manager = Manager::new();
    if let Some(threads) = threads {
        manager.start_threads(threads).unwrap();
    }
    for _ in 0..instances {
        manager.add(Instance::new(Arc::clone(system)));
    }
    // Reach steady state before measuring
    for _ in 0..90 {
        manager.update(DT, &Mat4::IDENTITY).unwrap();
    }
    manager
}

fn benchmark_single_instance(c: &mut Criterion) {
    let system = create_fountain();
    let mut manager = warmed_manager(&system, 1, None);
    let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO, Vec3::Y);

    let mut group = c.benchmark_group("frame_single_instance");
    group.throughput(Throughput::Elements(manager.particle_count() as u64));
    group.bench_function("inline", |b| {
        b.iter(|| manager.update(black_box(DT), &view).unwrap());
    });
    group.finish();
}

fn benchmark_many_instances(c: &mut Criterion) {
    let system = create_fountain();
    let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 6.0), Vec3::ZERO, Vec3::Y);

    let mut group = c.benchmark_group("frame_16_instances");
    for threads in [None, Some(2), Some(4)] {
        let mut manager = warmed_manager(&system, 16, threads);
        group.throughput(Throughput::Elements(manager.particle_count() as u64));
        let name = threads.map_or_else(|| "inline".to_string(), |n| format!("{n}_workers"));
        group.bench_function(name, |b| {
            b.iter(|| manager.update(black_box(DT), &view).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_single_instance, benchmark_many_instances);
criterion_main!(benches);
