//! Process Session
//!
//! Owns the CLI subprocess, its stdin writer, its stdout line reader and the
//! stderr pump. Teardown is best-effort and never fails.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, BufWriter, Split};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

use super::pump::PumpHandle;
use super::resolver::CommandResolver;
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};

/// Prefix added to every stderr chunk delivered to callers
pub const STDERR_PREFIX: &str = "[error] ";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// A live CLI subprocess bound to one working directory
pub struct ProcessSession {
    working_dir: PathBuf,
    child: Child,
    pid: u32,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: OutputLines<ChildStdout>,
    stderr_rx: mpsc::UnboundedReceiver<String>,
    stderr_pump: Option<PumpHandle>,
    started_at: DateTime<Utc>,
}

impl ProcessSession {
    /// Launch the configured command in `working_dir`
    pub fn spawn(
        config: &SessionConfig,
        resolver: &CommandResolver,
        working_dir: &Path,
    ) -> SessionResult<Self> {
        let program = resolver.resolve(&config.command);
        info!(
            "[Info] Starting process: {} {} (cwd: {})",
            program.display(),
            config.args.join(" "),
            working_dir.display()
        );

        let mut cmd = Command::new(&program);
        cmd.args(&config.args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd.spawn().map_err(|source| SessionError::LaunchFailed {
            command: config.command.clone(),
            source,
        })?;

        let pid = child.id().unwrap_or(0);
        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        let stderr_pump = PumpHandle::spawn(stderr, Some(STDERR_PREFIX.to_string()), move |text| {
            warn!("[Stderr] {}", text.trim_end());
            let _ = stderr_tx.send(text);
        });

        info!("Process started (pid: {})", pid);

        Ok(Self {
            working_dir: working_dir.to_path_buf(),
            child,
            pid,
            stdin: Some(BufWriter::new(stdin)),
            stdout: OutputLines::new(stdout),
            stderr_rx,
            stderr_pump: Some(stderr_pump),
            started_at: Utc::now(),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether this session was started in `dir`
    pub fn is_for(&self, dir: &Path) -> bool {
        same_directory(&self.working_dir, dir)
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Fail if the subprocess has exited
    pub fn check_alive(&mut self) -> SessionResult<()> {
        match self.child.try_wait() {
            Ok(None) => Ok(()),
            Ok(Some(status)) => {
                warn!("Process {} exited with {}", self.pid, status);
                Err(SessionError::ProcessTerminated)
            }
            Err(e) => {
                warn!("Failed to query process {}: {}", self.pid, e);
                Err(SessionError::ProcessTerminated)
            }
        }
    }

    /// Write one line and flush it
    pub async fn write_line(&mut self, line: &str) -> SessionResult<()> {
        let stdin = self.stdin.as_mut().ok_or(SessionError::NotRunning)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Stdout lines and stderr chunks, borrowed together so both can be
    /// awaited in one `select!`. `next_line` is cancel safe.
    pub fn output(
        &mut self,
    ) -> (
        &mut OutputLines<ChildStdout>,
        &mut mpsc::UnboundedReceiver<String>,
    ) {
        (&mut self.stdout, &mut self.stderr_rx)
    }

    /// Stderr chunks buffered since the last read
    pub fn drain_stderr(&mut self) -> Vec<String> {
        let mut chunks = Vec::new();
        while let Ok(chunk) = self.stderr_rx.try_recv() {
            chunks.push(chunk);
        }
        chunks
    }

    /// Stop the stderr pump, terminate the process, release every handle
    pub async fn shutdown(mut self, pump_wait: Duration, grace: Duration) {
        debug!("Shutting down process {}", self.pid);

        if let Some(mut pump) = self.stderr_pump.take() {
            pump.stop(pump_wait).await;
        }

        // Closing stdin lets a well-behaved CLI exit on EOF
        drop(self.stdin.take());

        if matches!(self.child.try_wait(), Ok(None)) {
            terminate(&self.child);

            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => debug!("Process {} terminated ({})", self.pid, status),
                _ => {
                    warn!("Force killing process {}", self.pid);
                    if let Err(e) = self.child.start_kill() {
                        warn!("Failed to kill process {}: {}", self.pid, e);
                    }
                    if tokio::time::timeout(grace, self.child.wait()).await.is_err() {
                        warn!("Process {} did not exit after kill", self.pid);
                    }
                }
            }
        }

        info!("Process {} stopped", self.pid);
    }
}

/// Newline-delimited reader that decodes each line lossily, so bytes that are
/// not valid UTF-8 become U+FFFD instead of failing the read
pub struct OutputLines<R> {
    inner: Split<BufReader<R>>,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader).split(b'\n'),
        }
    }

    /// Next line without its `\n` or `\r\n` terminator; `None` at EOF.
    /// Cancel safe.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let Some(mut segment) = self.inner.next_segment().await? else {
            return Ok(None);
        };
        if segment.last() == Some(&b'\r') {
            segment.pop();
        }
        Ok(Some(match String::from_utf8(segment) {
            Ok(line) => line,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }))
    }
}

/// Ask the process to exit
#[cfg(unix)]
fn terminate(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: plain syscall on a pid we spawned and have not reaped yet
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}

fn missing_pipe(name: &str) -> SessionError {
    SessionError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        format!("child {} was not captured", name),
    ))
}

/// Directory equality; case-insensitive on Windows
pub fn same_directory(a: &Path, b: &Path) -> bool {
    if cfg!(windows) {
        a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
    } else {
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_directory() {
        assert!(same_directory(Path::new("/a/b"), Path::new("/a/b")));
        assert!(!same_directory(Path::new("/a/b"), Path::new("/a/c")));
    }

    #[tokio::test]
    async fn test_output_lines_decode_invalid_utf8_lossily() {
        let input: &[u8] = b"ok\r\nbad \xff\xfe bytes\n\ntail";
        let mut lines = OutputLines::new(input);

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ok"));
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("bad \u{FFFD}\u{FFFD} bytes")
        );
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("tail"));
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_echo_roundtrip_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::default()
            .with_command("sh")
            .with_args(["-c", "while IFS= read -r line; do echo \"got $line\"; echo oops >&2; done"]);
        let resolver = CommandResolver::new(&[]);

        let mut session = ProcessSession::spawn(&config, &resolver, dir.path()).unwrap();
        assert!(session.is_for(dir.path()));
        assert!(session.is_alive());

        session.write_line("ping").await.unwrap();
        let (stdout, _) = session.output();
        let line = stdout.next_line().await.unwrap();
        assert_eq!(line.as_deref(), Some("got ping"));

        let (_, stderr) = session.output();
        let chunk = tokio::time::timeout(Duration::from_secs(2), stderr.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(chunk.starts_with(STDERR_PREFIX));

        session.check_alive().unwrap();
        session
            .shutdown(Duration::from_millis(500), Duration::from_secs(1))
            .await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_process_fails_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::default().with_command("sh").with_args(["-c", "exit 0"]);
        let resolver = CommandResolver::new(&[]);

        let mut session = ProcessSession::spawn(&config, &resolver, dir.path()).unwrap();
        let (stdout, _) = session.output();
        assert!(stdout.next_line().await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(session.check_alive(), Err(SessionError::ProcessTerminated)));
        session
            .shutdown(Duration::from_millis(100), Duration::from_millis(100))
            .await;
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::default().with_command("definitely-not-a-real-cli-xyz");
        let resolver = CommandResolver::with_search_dirs(Vec::new());
        match ProcessSession::spawn(&config, &resolver, dir.path()) {
            Err(SessionError::LaunchFailed { command, .. }) => {
                assert_eq!(command, "definitely-not-a-real-cli-xyz")
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("launch should fail"),
        }
    }
}
