//! # Instance Manager
//!
//! Owns the active instances and a fixed pool of worker threads, and
//! drives the two-phase frame:
//!
//! ```text
//!   caller                         worker 0 .. worker N-1
//!   ──────                         ──────────────────────
//!   Instance::update  (serial)
//!   Frame(dt, view) ─────────────> update_parallel(i, N)  every instance
//!   wait for N reports <────────── report (sent even on panic)
//!   return
//! ```
//!
//! Workers block only on their own command channel. `Shutdown` is read
//! between frames, never inside one.
//!
//! ## Safety Note
//!
//! A frame hands workers a raw pointer to the instance arena. `update`
//! holds `&mut self` and does not return until every dispatched worker
//! has reported, so the arena outlives all uses and nothing mutates it
//! meanwhile.

#![allow(unsafe_code)]

use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use ember_core::{Arena, Handle};
use glam::Mat4;
use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::error::{ManagerError, ManagerResult};
use crate::instance::{Instance, Partition};

/// Handle to an instance owned by a [`Manager`].
pub type InstanceHandle = Handle<Instance>;

/// Arena pointer handed to workers for one frame.
#[derive(Clone, Copy)]
struct ArenaPtr(*const Arena<Instance>);

// SAFETY: the pointee is `Sync` and outlives every frame it is sent in.
unsafe impl Send for ArenaPtr {}

#[derive(Clone, Copy)]
struct FrameJob {
    instances: ArenaPtr,
    dt: f32,
    view: Mat4,
}

enum WorkerCommand {
    Frame(FrameJob),
    Shutdown,
}

#[derive(Debug)]
struct WorkerReport {
    worker: usize,
    completed: bool,
}

/// Sends the frame report when dropped, including during a panic.
struct ReportGuard<'a> {
    reports: &'a Sender<WorkerReport>,
    worker: usize,
    completed: bool,
}

impl Drop for ReportGuard<'_> {
    fn drop(&mut self) {
        let _ = self.reports.send(WorkerReport {
            worker: self.worker,
            completed: self.completed,
        });
    }
}

struct WorkerPool {
    commands: Vec<Sender<WorkerCommand>>,
    reports: Receiver<WorkerReport>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn spawn(count: usize) -> ManagerResult<Self> {
        let (report_tx, reports) = unbounded();
        let mut pool = Self {
            commands: Vec::with_capacity(count),
            reports,
            handles: Vec::with_capacity(count),
        };

        for worker in 0..count {
            let (command_tx, commands) = unbounded();
            let report_tx = report_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("ember-worker-{worker}"))
                .spawn(move || worker_loop(worker, count, &commands, &report_tx));
            match spawned {
                Ok(handle) => {
                    pool.commands.push(command_tx);
                    pool.handles.push(handle);
                }
                Err(source) => {
                    pool.shutdown();
                    return Err(ManagerError::Spawn { index: worker, source });
                }
            }
        }
        Ok(pool)
    }

    fn len(&self) -> usize {
        self.commands.len()
    }

    /// Runs one parallel phase and waits for every dispatched worker.
    fn run_frame(&self, instances: &Arena<Instance>, dt: f32, view: Mat4) -> ManagerResult<()> {
        let job = FrameJob {
            instances: ArenaPtr(instances),
            dt,
            view,
        };

        let mut failure = None;
        let mut dispatched = 0;
        for (worker, commands) in self.commands.iter().enumerate() {
            if commands.send(WorkerCommand::Frame(job)).is_err() {
                failure = Some(ManagerError::WorkerDisconnected(worker));
                break;
            }
            dispatched += 1;
        }

        for _ in 0..dispatched {
            match self.reports.recv() {
                Ok(report) if report.completed => {}
                Ok(report) => {
                    error!(worker = report.worker, "particle worker panicked");
                    failure.get_or_insert(ManagerError::WorkerPanicked(report.worker));
                }
                // Every worker dropped its sender, so none still reads the arena
                Err(_) => {
                    failure.get_or_insert(ManagerError::WorkerDisconnected(0));
                    break;
                }
            }
        }

        failure.map_or(Ok(()), Err)
    }

    fn shutdown(&mut self) {
        for commands in &self.commands {
            let _ = commands.send(WorkerCommand::Shutdown);
        }
        for (worker, handle) in self.handles.drain(..).enumerate() {
            if handle.join().is_err() {
                warn!(worker, "particle worker exited by panic");
            }
        }
        self.commands.clear();
    }
}

fn worker_loop(worker: usize, count: usize, commands: &Receiver<WorkerCommand>, reports: &Sender<WorkerReport>) {
    while let Ok(command) = commands.recv() {
        match command {
            WorkerCommand::Shutdown => break,
            WorkerCommand::Frame(job) => {
                let mut guard = ReportGuard {
                    reports,
                    worker,
                    completed: false,
                };
                // SAFETY: `Manager::update` keeps the arena alive and
                // unmodified until this worker's report arrives.
                let instances = unsafe { &*job.instances.0 };
                // SAFETY: each worker has a distinct index, all share `count`,
                // and no `&mut Instance` exists while the frame runs.
                let partition = unsafe { Partition::new(worker, count) };
                for (_, instance) in instances.iter() {
                    instance.update_parallel(partition, job.dt, &job.view);
                }
                guard.completed = true;
            }
        }
    }
}

/// Owns active instances and the worker threads that simulate them.
pub struct Manager {
    instances: Arena<Instance>,
    workers: Option<WorkerPool>,
    config: ManagerConfig,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    /// Manager without worker threads.
    #[must_use]
    pub fn new() -> Self {
        Self {
            instances: Arena::new(),
            workers: None,
            config: ManagerConfig::default(),
        }
    }

    /// Manager configured by `config`, with its workers started.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NoThreads`] for `threads = Some(0)` and
    /// [`ManagerError::Spawn`] if a worker cannot be started.
    pub fn from_config(config: ManagerConfig) -> ManagerResult<Self> {
        let threads = config.threads;
        let mut manager = Self {
            instances: Arena::new(),
            workers: None,
            config,
        };
        if let Some(threads) = threads {
            manager.start_threads(threads)?;
        }
        Ok(manager)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Starts `count` workers. A no-op if workers are already running.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NoThreads`] for zero and
    /// [`ManagerError::Spawn`] if a worker cannot be started.
    pub fn start_threads(&mut self, count: usize) -> ManagerResult<()> {
        if let Some(workers) = &self.workers {
            warn!(running = workers.len(), requested = count, "particle workers already running");
            return Ok(());
        }
        if count == 0 {
            return Err(ManagerError::NoThreads);
        }

        for (_, instance) in self.instances.iter_mut() {
            instance.initialise_thread_data(count);
        }
        self.workers = Some(WorkerPool::spawn(count)?);
        self.config.threads = Some(count);
        info!(threads = count, "particle workers started");
        Ok(())
    }

    /// Stops and joins every worker. Later frames run on the caller thread.
    pub fn stop_threads(&mut self) {
        let Some(mut workers) = self.workers.take() else {
            return;
        };
        let count = workers.len();
        workers.shutdown();
        for (_, instance) in self.instances.iter_mut() {
            instance.initialise_thread_data(1);
        }
        self.config.threads = None;
        info!(threads = count, "particle workers stopped");
    }

    /// Running workers; zero when frames run on the caller thread.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.workers.as_ref().map_or(0, WorkerPool::len)
    }

    /// Takes ownership of `instance`, initialises and enables it.
    ///
    /// With a configured seed the instance is reseeded from it and its
    /// handle, so no two handles ever share a random stream.
    pub fn add(&mut self, instance: Instance) -> InstanceHandle {
        let threads = self.thread_count();
        let handle = self.instances.insert(instance);
        if let Some(instance) = self.instances.get_mut(handle) {
            if let Some(seed) = self.config.seed {
                instance.set_seed(seed ^ handle_key(handle).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            }
            instance.initialise();
            instance.initialise_thread_data(threads);
            instance.set_enabled(true);
        }
        debug!(instance = handle.index(), "instance added");
        handle
    }

    /// Releases an instance.
    pub fn remove(&mut self, handle: InstanceHandle) -> Option<Instance> {
        let instance = self.instances.remove(handle)?;
        debug!(instance = handle.index(), "instance removed");
        Some(instance)
    }

    /// Looks up an instance.
    #[must_use]
    pub fn get(&self, handle: InstanceHandle) -> Option<&Instance> {
        self.instances.get(handle)
    }

    /// Looks up an instance mutably.
    #[must_use]
    pub fn get_mut(&mut self, handle: InstanceHandle) -> Option<&mut Instance> {
        self.instances.get_mut(handle)
    }

    /// Every active instance.
    pub fn iter(&self) -> impl Iterator<Item = (InstanceHandle, &Instance)> {
        self.instances.iter()
    }

    /// Active instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns true if no instance is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Live particles across every instance.
    #[must_use]
    pub fn particle_count(&self) -> usize {
        self.instances.iter().map(|(_, i)| i.particle_count()).sum()
    }

    /// Simulates one frame of `dt` seconds.
    ///
    /// `view` orients camera-facing geometry.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::WorkerPanicked`] or
    /// [`ManagerError::WorkerDisconnected`] if the parallel phase did not
    /// complete; the frame's render output is then incomplete.
    pub fn update(&mut self, dt: f32, view: &Mat4) -> ManagerResult<()> {
        for (_, instance) in self.instances.iter_mut() {
            instance.update(dt);
        }
        match &self.workers {
            Some(workers) => workers.run_frame(&self.instances, dt, *view),
            None => {
                for (_, instance) in self.instances.iter_mut() {
                    instance.update_parallel_inline(dt, view);
                }
                Ok(())
            }
        }
    }
}

/// Index and generation packed into one word; unique per issued handle.
fn handle_key(handle: InstanceHandle) -> u64 {
    (u64::from(handle.generation()) << 32) | handle.index() as u64
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.stop_threads();
    }
}
