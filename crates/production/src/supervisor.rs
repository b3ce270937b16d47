//! Spawns one OS process per rank and watches them.
//!
//! Each child re-executes the binary in `process` mode. The supervisor waits
//! for all of them; the first child that exits abnormally gets every sibling
//! killed, and its failure becomes the supervisor's result.

use lamport_types::{Rank, Topology, TopologyError};
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("Failed to create data directory {}: {source}", .path.display())]
    DataDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to spawn process {rank}: {source}")]
    Spawn {
        rank: Rank,
        #[source]
        source: io::Error,
    },

    #[error("Failed waiting for process {rank}: {source}")]
    Wait {
        rank: Rank,
        #[source]
        source: io::Error,
    },

    #[error("Process {rank} failed: {status}")]
    ChildFailed { rank: Rank, status: ExitStatus },

    #[error("Watch task failed: {0}")]
    Join(#[from] JoinError),
}

/// Launches and supervises a world of processes.
#[derive(Debug, Clone)]
pub struct Supervisor {
    program: PathBuf,
    world_size: u16,
    data_dir: PathBuf,
    seed: Option<u64>,
    child_args: Vec<OsString>,
}

impl Supervisor {
    /// Supervisor for `world_size` copies of `program`.
    pub fn new(
        program: impl Into<PathBuf>,
        world_size: u16,
        data_dir: impl Into<PathBuf>,
    ) -> Result<Self, SupervisorError> {
        // Validates the world size once, up front.
        Topology::new(Rank(0), world_size)?;
        Ok(Self {
            program: program.into(),
            world_size,
            data_dir: data_dir.into(),
            seed: None,
            child_args: Vec::new(),
        })
    }

    /// Base seed passed to every child; each child adds its own rank.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Extra arguments appended to every child's command line.
    pub fn with_child_args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.child_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self, rank: Rank) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("process")
            .arg("--rank")
            .arg(rank.to_string())
            .arg("--world-size")
            .arg(self.world_size.to_string())
            .arg("--data-dir")
            .arg(&self.data_dir);
        if let Some(seed) = self.seed {
            command.arg("--seed").arg(seed.to_string());
        }
        command
            .args(&self.child_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    /// Run the world until every child has exited.
    ///
    /// Cancelling `shutdown` kills all children and returns `Ok`.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), SupervisorError> {
        std::fs::create_dir_all(&self.data_dir).map_err(|source| SupervisorError::DataDir {
            path: self.data_dir.clone(),
            source,
        })?;

        let kill = shutdown.child_token();
        let mut watchers = JoinSet::new();
        for rank in (0..self.world_size).map(Rank) {
            // Already-spawned children die with the JoinSet if this fails.
            let child = self
                .command(rank)
                .spawn()
                .map_err(|source| SupervisorError::Spawn { rank, source })?;
            debug!(rank = %rank, pid = ?child.id(), "Spawned process");
            watchers.spawn(watch(rank, child, kill.clone()));
        }
        info!(world_size = self.world_size, "All processes started");

        let mut first_failure = None;
        while let Some(joined) = watchers.join_next().await {
            let outcome = joined.map_err(SupervisorError::from).and_then(|r| r);
            if let Err(e) = outcome {
                if first_failure.is_none() {
                    error!(error = %e, "Stopping all processes");
                    kill.cancel();
                    first_failure = Some(e);
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn watch(rank: Rank, mut child: Child, kill: CancellationToken) -> Result<(), SupervisorError> {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill.cancelled() => None,
    };

    let Some(status) = exited else {
        if let Err(e) = child.kill().await {
            warn!(rank = %rank, error = %e, "Could not kill process");
        }
        debug!(rank = %rank, "Killed process");
        return Ok(());
    };

    let status = status.map_err(|source| SupervisorError::Wait { rank, source })?;
    if status.success() {
        info!(rank = %rank, "Process exited");
        Ok(())
    } else {
        Err(SupervisorError::ChildFailed { rank, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("child.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_rejects_small_world() {
        assert!(matches!(
            Supervisor::new("true", 1, "data"),
            Err(SupervisorError::Topology(TopologyError::WorldTooSmall(1)))
        ));
    }

    #[test]
    fn test_child_command_line() {
        let supervisor = Supervisor::new("lamport-world", 3, "out")
            .unwrap()
            .with_seed(Some(40))
            .with_child_args(["--max-ticks", "5"]);
        let command = supervisor.command(Rank(2));
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "process",
                "--rank",
                "2",
                "--world-size",
                "3",
                "--data-dir",
                "out",
                "--seed",
                "40",
                "--max-ticks",
                "5"
            ]
        );
    }

    #[tokio::test]
    async fn test_all_children_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let supervisor = Supervisor::new("true", 3, &data_dir).unwrap();

        supervisor.run(CancellationToken::new()).await.unwrap();
        assert!(data_dir.is_dir());
    }

    #[tokio::test]
    async fn test_failing_child_kills_siblings() {
        let dir = tempfile::tempdir().unwrap();
        // $3 is the rank: rank 0 fails, the others would run for a minute.
        let program = script(
            dir.path(),
            "if [ \"$3\" = 0 ]; then exit 3; fi\nexec sleep 60",
        );
        let supervisor = Supervisor::new(program, 3, dir.path().join("data")).unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(30),
            supervisor.run(CancellationToken::new()),
        )
        .await
        .unwrap();

        match result {
            Err(SupervisorError::ChildFailed { rank, status }) => {
                assert_eq!(rank, Rank(0));
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("expected child failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_kills_children() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "exec sleep 60");
        let supervisor = Supervisor::new(program, 2, dir.path().join("data")).unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let result =
            tokio::time::timeout(Duration::from_secs(30), supervisor.run(shutdown)).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor =
            Supervisor::new(dir.path().join("missing"), 2, dir.path().join("data")).unwrap();
        assert!(matches!(
            supervisor.run(CancellationToken::new()).await,
            Err(SupervisorError::Spawn { rank: Rank(0), .. })
        ));
    }
}
