//! Integration tests for manager configuration and worker lifecycle.

use std::sync::Arc;

use ember_particles::{ConfigError, Emitter, EmitterShape, Instance, Manager, ManagerConfig, ManagerError, System};
use glam::Mat4;

fn temp_config_path(name: &str) -> std::path::PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("ember_{name}_{id}.toml"))
}

fn system() -> Arc<System> {
    let mut system = System::new();
    system.add_emitter(Emitter::new(EmitterShape::point(1.0)));
    Arc::new(system)
}

#[test]
fn test_load_config_and_start_workers() {
    let path = temp_config_path("workers");
    std::fs::write(&path, "threads = 3\nseed = 11\n").unwrap();

    let config = ManagerConfig::load(&path).unwrap();
    assert_eq!(config.threads, Some(3));
    assert_eq!(config.seed, Some(11));

    let mut manager = Manager::from_config(config).unwrap();
    assert_eq!(manager.thread_count(), 3);

    let handle = manager.add(Instance::new(system()));
    assert_ne!(manager.get(handle).unwrap().seed(), 0);
    for _ in 0..10 {
        manager.update(0.1, &Mat4::IDENTITY).unwrap();
    }
    assert_eq!(manager.particle_count(), 10);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_zero_threads_is_a_config_error() {
    let path = temp_config_path("zero");
    std::fs::write(&path, "threads = 0\n").unwrap();
    assert!(matches!(ManagerConfig::load(&path), Err(ConfigError::ZeroThreads)));
    std::fs::remove_file(&path).ok();

    assert!(matches!(
        Manager::from_config(ManagerConfig::with_threads(0)),
        Err(ManagerError::NoThreads)
    ));
}

#[test]
fn test_start_threads_twice_is_a_no_op() {
    let mut manager = Manager::new();
    manager.start_threads(2).unwrap();
    manager.start_threads(6).unwrap();
    assert_eq!(manager.thread_count(), 2);
    assert_eq!(manager.config().threads, Some(2));
}

#[test]
fn test_instances_added_before_and_after_start() {
    let mut manager = Manager::new();
    let early = manager.add(Instance::new(system()));
    manager.start_threads(4).unwrap();
    let late = manager.add(Instance::new(system()));

    assert_eq!(manager.get(early).unwrap().thread_count(), 4);
    assert_eq!(manager.get(late).unwrap().thread_count(), 4);

    manager.update(1.0, &Mat4::IDENTITY).unwrap();
    assert_eq!(manager.particle_count(), 20);
    assert_eq!(manager.iter().count(), 2);

    drop(manager);
}

#[test]
fn test_reseeding_never_repeats_after_remove() {
    let config = ManagerConfig {
        threads: None,
        seed: Some(1234),
    };
    let mut manager = Manager::from_config(config).unwrap();

    let a = manager.add(Instance::new(system()));
    let b = manager.add(Instance::new(system()));
    let seed_a = manager.get(a).unwrap().seed();
    manager.remove(a).unwrap();
    let c = manager.add(Instance::new(system()));

    let seed_b = manager.get(b).unwrap().seed();
    let seed_c = manager.get(c).unwrap().seed();
    assert_ne!(seed_b, seed_c);
    assert_ne!(seed_a, seed_c);
    assert_ne!(seed_a, seed_b);

    // Same configuration, same sequence of edits, same seeds
    let mut replay = Manager::from_config(ManagerConfig {
        threads: None,
        seed: Some(1234),
    })
    .unwrap();
    let a2 = replay.add(Instance::new(system()));
    let b2 = replay.add(Instance::new(system()));
    replay.remove(a2).unwrap();
    let c2 = replay.add(Instance::new(system()));
    assert_eq!(replay.get(b2).unwrap().seed(), seed_b);
    assert_eq!(replay.get(c2).unwrap().seed(), seed_c);
}
