//! # Process Coordination
//!
//! In a multi-process training job exactly one process writes the feature
//! cache and every process waits at a barrier before reading it. The
//! coordination primitive is injected as a [`ProcessCoordinator`] so the data
//! layer never queries global distributed state.
//!
//! None of the barriers time out: if the primary dies before reaching the
//! barrier, the other workers block forever.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TokClsError};

/// Rank and rendezvous capability of a cooperating worker.
pub trait ProcessCoordinator {
    /// Whether this worker is responsible for writing shared state.
    fn is_primary(&self) -> bool;

    /// Block until every cooperating worker has reached this point.
    fn barrier(&self) -> Result<()>;
}

/// The only worker of a single-process job. Its barrier is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl ProcessCoordinator for SingleProcess {
    fn is_primary(&self) -> bool {
        true
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }
}

/// Workers running as threads of one process, sharing a [`Barrier`].
#[derive(Debug, Clone)]
pub struct ThreadCoordinator {
    rank: usize,
    barrier: Arc<Barrier>,
}

impl ThreadCoordinator {
    /// One coordinator per rank, all sharing the same barrier.
    pub fn group(world_size: usize) -> Vec<Self> {
        let barrier = Arc::new(Barrier::new(world_size));
        (0..world_size)
            .map(|rank| Self {
                rank,
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }
}

impl ProcessCoordinator for ThreadCoordinator {
    fn is_primary(&self) -> bool {
        self.rank == 0
    }

    fn barrier(&self) -> Result<()> {
        self.barrier.wait();
        Ok(())
    }
}

/// Barrier over a directory visible to every worker (local disk or a shared
/// filesystem). Rank `r` entering barrier generation `g` creates
/// `barrier-g-rank<r>` and waits until all `world_size` markers of that
/// generation exist. Markers are never removed, so each job needs its own
/// directory: construction fails if the directory already holds a marker of
/// this rank. [`FileBarrierCoordinator::run_id`] names a per-job
/// subdirectory from the launcher environment.
#[derive(Debug)]
pub struct FileBarrierCoordinator {
    rank: usize,
    world_size: usize,
    dir: PathBuf,
    generation: AtomicUsize,
    poll_interval: Duration,
}

impl FileBarrierCoordinator {
    pub fn new(rank: usize, world_size: usize, dir: impl Into<PathBuf>) -> Result<Self> {
        if world_size == 0 || rank >= world_size {
            return Err(TokClsError::Coordination(format!(
                "rank {rank} is outside a world of size {world_size}"
            )));
        }
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        if let Some(stale) = own_marker(&dir, rank)? {
            return Err(TokClsError::Coordination(format!(
                "{} holds {stale} from an earlier run, use a fresh rendezvous directory",
                dir.display()
            )));
        }
        Ok(Self {
            rank,
            world_size,
            dir,
            generation: AtomicUsize::new(0),
            poll_interval: Duration::from_millis(50),
        })
    }

    /// Read `RANK` and `WORLD_SIZE` as set by common distributed launchers.
    /// Returns `None` when the variables are absent.
    pub fn from_env(dir: impl Into<PathBuf>) -> Result<Option<Self>> {
        let (Ok(rank), Ok(world_size)) = (std::env::var("RANK"), std::env::var("WORLD_SIZE")) else {
            return Ok(None);
        };
        let parse = |name: &str, value: &str| {
            value
                .parse::<usize>()
                .map_err(|e| TokClsError::Coordination(format!("{name}={value:?}: {e}")))
        };
        let rank = parse("RANK", &rank)?;
        let world_size = parse("WORLD_SIZE", &world_size)?;
        Self::new(rank, world_size, dir).map(Some)
    }

    /// Identity of the current job as set by the launcher: `TOKCLS_RUN_ID`,
    /// then `TORCHELASTIC_RUN_ID`, then `MASTER_ADDR`/`MASTER_PORT`.
    pub fn run_id() -> Option<String> {
        run_id_from(|name| std::env::var(name).ok())
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    fn marker(&self, generation: usize, rank: usize) -> PathBuf {
        self.dir.join(format!("barrier-{generation}-rank{rank}"))
    }

    fn arrived(&self, generation: usize) -> usize {
        (0..self.world_size)
            .filter(|&rank| self.marker(generation, rank).exists())
            .count()
    }
}

fn run_id_from<F>(var: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let id = var("TOKCLS_RUN_ID")
        .or_else(|| var("TORCHELASTIC_RUN_ID"))
        .or_else(|| Some(format!("{}-{}", var("MASTER_ADDR")?, var("MASTER_PORT")?)))?;
    let id: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    (!id.is_empty()).then_some(id)
}

/// Name of a marker left in `dir` by `rank`, if any.
fn own_marker(dir: &Path, rank: usize) -> Result<Option<String>> {
    let suffix = format!("-rank{rank}");
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        if let Some(name) = name.to_str() {
            if name.starts_with("barrier-") && name.ends_with(&suffix) {
                return Ok(Some(name.to_string()));
            }
        }
    }
    Ok(None)
}

impl ProcessCoordinator for FileBarrierCoordinator {
    fn is_primary(&self) -> bool {
        self.rank == 0
    }

    fn barrier(&self) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(self.marker(generation, self.rank))?;
        debug!(rank = self.rank, generation, "entered barrier");

        while self.arrived(generation) < self.world_size {
            thread::sleep(self.poll_interval);
        }
        debug!(rank = self.rank, generation, "left barrier");
        Ok(())
    }
}

impl<C: ProcessCoordinator + ?Sized> ProcessCoordinator for &C {
    fn is_primary(&self) -> bool {
        (**self).is_primary()
    }

    fn barrier(&self) -> Result<()> {
        (**self).barrier()
    }
}
