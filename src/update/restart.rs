//! Platform restart scripts
//!
//! A restart hands control to an operator-installed script (`restart.sh` or
//! `restart.bat` next to the server) which is expected to get a process
//! supervisor to start the new code. The script is spawned detached, then the
//! current process exits: 0 if the spawn succeeded, 1 otherwise. There is no
//! retry.

use crate::errors::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{error, info};

/// How to launch the restart script on one platform family.
pub trait RestartStrategy: Send + Sync {
    /// File name of the script inside the working tree
    fn script_name(&self) -> &'static str;

    /// Makes the script runnable. Failures are logged by the caller and do
    /// not stop the launch.
    fn prepare(&self, _script: &Path) -> Result<()> {
        Ok(())
    }

    /// Spawns the script so that it outlives this process.
    fn launch(&self, script: &Path, work_dir: &Path) -> Result<()>;
}

impl dyn RestartStrategy {
    /// Strategy for the platform this binary was built for.
    #[must_use]
    pub fn for_current_platform() -> Box<dyn RestartStrategy> {
        if cfg!(windows) {
            Box::new(WindowsScript)
        } else {
            Box::new(PosixScript)
        }
    }
}

/// `restart.sh` run by bash in its own process group.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixScript;

impl RestartStrategy for PosixScript {
    fn script_name(&self) -> &'static str {
        "restart.sh"
    }

    fn prepare(&self, script: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(script, std::fs::Permissions::from_mode(0o755))?;
        }
        #[cfg(not(unix))]
        let _ = script;
        Ok(())
    }

    fn launch(&self, _script: &Path, work_dir: &Path) -> Result<()> {
        let mut cmd = Command::new("/bin/bash");
        cmd.arg(format!("./{}", self.script_name()))
            .current_dir(work_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        // The child handle is dropped without waiting; the script keeps running.
        cmd.spawn()?;
        Ok(())
    }
}

/// `restart.bat` started in the background of the same console.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsScript;

impl RestartStrategy for WindowsScript {
    fn script_name(&self) -> &'static str {
        "restart.bat"
    }

    fn launch(&self, _script: &Path, work_dir: &Path) -> Result<()> {
        Command::new("cmd.exe")
            .args(["/c", &format!("start /b {}", self.script_name())])
            .current_dir(work_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()?;
        Ok(())
    }
}

/// Hook invoked with the final exit code.
pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

#[allow(clippy::exit)]
fn exit_process(code: i32) {
    std::process::exit(code);
}

/// Launches the restart script and terminates the process.
pub struct RestartTrigger {
    work_dir: PathBuf,
    strategy: Box<dyn RestartStrategy>,
    exit: ExitHook,
}

impl std::fmt::Debug for RestartTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartTrigger")
            .field("script", &self.script_path())
            .finish_non_exhaustive()
    }
}

impl RestartTrigger {
    /// Creates a trigger for the script in `work_dir` that exits the process.
    #[must_use]
    pub fn new(work_dir: PathBuf, strategy: Box<dyn RestartStrategy>) -> Self {
        Self {
            work_dir,
            strategy,
            exit: Arc::new(exit_process),
        }
    }

    /// Replaces the process exit with `exit`.
    #[must_use]
    pub fn with_exit(mut self, exit: ExitHook) -> Self {
        self.exit = exit;
        self
    }

    /// Where the restart script must be installed
    #[must_use]
    pub fn script_path(&self) -> PathBuf {
        self.work_dir.join(self.strategy.script_name())
    }

    /// Verifies, prepares and spawns the script without exiting.
    pub fn launch(&self) -> Result<()> {
        let script = self.script_path();
        if !script.exists() {
            return Err(Error::RestartScriptMissing { path: script });
        }

        if let Err(e) = self.strategy.prepare(&script) {
            error!("Failed to set executable permissions on restart script: {}", e);
        }

        self.strategy.launch(&script, &self.work_dir)
    }

    /// Launches the script, then exits with 0 on success or 1 on failure.
    pub fn trigger(&self) {
        info!("Triggering application restart...");
        let code = match self.launch() {
            Ok(()) => 0,
            Err(e) => {
                error!("Restart failed: {}", e);
                1
            }
        };
        (self.exit)(code);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::{ExitRecorder, RecordingStrategy};

    #[test]
    fn test_missing_script_exits_with_one_and_launches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = RecordingStrategy::default();
        let launches = strategy.launches();
        let exits = ExitRecorder::default();

        RestartTrigger::new(dir.path().to_path_buf(), Box::new(strategy))
            .with_exit(exits.hook())
            .trigger();

        assert_eq!(exits.codes(), vec![1]);
        assert_eq!(launches.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_present_script_launches_and_exits_with_zero() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("restart.sh"), "#!/bin/bash\n").unwrap();
        let strategy = RecordingStrategy::default();
        let launches = strategy.launches();
        let exits = ExitRecorder::default();

        RestartTrigger::new(dir.path().to_path_buf(), Box::new(strategy))
            .with_exit(exits.hook())
            .trigger();

        assert_eq!(exits.codes(), vec![0]);
        assert_eq!(launches.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_spawn_error_exits_with_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("restart.sh"), "#!/bin/bash\n").unwrap();
        let exits = ExitRecorder::default();

        RestartTrigger::new(
            dir.path().to_path_buf(),
            Box::new(RecordingStrategy::failing()),
        )
        .with_exit(exits.hook())
        .trigger();

        assert_eq!(exits.codes(), vec![1]);
    }

    #[test]
    fn test_launch_reports_missing_script_path() {
        let dir = tempfile::tempdir().unwrap();
        let trigger = RestartTrigger::new(dir.path().to_path_buf(), Box::new(PosixScript));
        match trigger.launch() {
            Err(Error::RestartScriptMissing { path }) => {
                assert_eq!(path, dir.path().join("restart.sh"));
            }
            other => panic!("expected missing script, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_posix_prepare_makes_script_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("restart.sh");
        std::fs::write(&script, "#!/bin/bash\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

        PosixScript.prepare(&script).unwrap();

        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_platform_script_names() {
        assert_eq!(PosixScript.script_name(), "restart.sh");
        assert_eq!(WindowsScript.script_name(), "restart.bat");
        let expected = if cfg!(windows) { "restart.bat" } else { "restart.sh" };
        assert_eq!(
            <dyn RestartStrategy>::for_current_platform().script_name(),
            expected
        );
    }
}
