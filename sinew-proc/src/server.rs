//! Handle to the expander process of one toolchain.

use crate::msg::{Request, Response, PROTOCOL_VERSION};
use crate::process::{ExpanderProcess, PendingReply, ServerError, WaitError};
use crate::CancellationFlag;
use parking_lot::Mutex;
use sinew_api::errors::ProcMacroExpansionError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Owns (at most) one expander process, started on first use and restarted after it dies.
/// Dropping the server, or calling [`ProcMacroServer::shutdown`], kills it.
pub struct ProcMacroServer {
    path: PathBuf,
    env: Vec<(String, String)>,
    startup_timeout: Duration,
    process: Mutex<Option<Arc<ExpanderProcess>>>,
    spawned: AtomicUsize,
}

impl ProcMacroServer {
    /// A server for the expander at `path`, if there is one.
    pub fn locate(path: impl Into<PathBuf>) -> Option<ProcMacroServer> {
        let path = path.into();
        if path.is_file() {
            Some(ProcMacroServer::new(path))
        } else {
            debug!(path = %path.display(), "no proc macro expander");
            None
        }
    }

    /// A server for the expander at `path`. Nothing is checked until the first request.
    pub fn new(path: impl Into<PathBuf>) -> ProcMacroServer {
        ProcMacroServer {
            path: path.into(),
            env: vec![],
            startup_timeout: Duration::from_secs(10),
            process: Mutex::new(None),
            spawned: AtomicUsize::new(0),
        }
    }

    /// Set an environment variable for the expander process.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// How long a fresh process gets to answer the version check.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of processes started so far.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// The live process, starting one if needed.
    fn process(&self) -> Result<Arc<ExpanderProcess>, ProcMacroExpansionError> {
        // held through startup, so concurrent callers share one process
        let mut slot = self.process.lock();
        if let Some(process) = &*slot {
            if process.is_alive() {
                return Ok(process.clone());
            }
            debug!(pid = process.pid(), "replacing dead proc macro expander");
        }
        *slot = None;

        let process = ExpanderProcess::spawn(&self.path, &self.env).map_err(|err| {
            warn!(path = %self.path.display(), %err, "can't run proc macro expander");
            ProcMacroExpansionError::CantRunExpander
        })?;
        self.spawned.fetch_add(1, Ordering::SeqCst);

        let deadline = Instant::now() + self.startup_timeout;
        let reply = process
            .send(&Request::ApiVersionCheck, deadline, None)
            .and_then(|pending| pending.wait(deadline, None));
        let version = match reply {
            Ok(Response::ApiVersionCheck(version)) => version,
            Ok(other) => {
                error!(?other, "unexpected reply to version check");
                return Err(ProcMacroExpansionError::IOExceptionThrown);
            }
            Err(err) => return Err(expansion_error(err, self.startup_timeout)),
        };
        if version != PROTOCOL_VERSION {
            warn!(version, expected = PROTOCOL_VERSION, "unsupported proc macro expander");
            return Err(ProcMacroExpansionError::UnsupportedExpanderVersion(version));
        }
        info!(pid = process.pid(), version, "proc macro expander ready");

        let process = Arc::new(process);
        *slot = Some(process.clone());
        Ok(process)
    }

    /// Send `request` and wait for the reply. `timeout` covers both.
    pub fn request(
        &self,
        request: &Request,
        timeout: Duration,
        cancel: Option<&CancellationFlag>,
    ) -> Result<Response, RequestError> {
        let process = self.process().map_err(RequestError::Failed)?;
        let deadline = Instant::now() + timeout;
        let to_request_error = |err| match err {
            WaitError::Cancelled => RequestError::Cancelled,
            err => RequestError::Failed(expansion_error(err, timeout)),
        };
        let pending: PendingReply = process.send(request, deadline, cancel).map_err(to_request_error)?;
        // don't keep the process alive just for this request
        drop(process);
        pending.wait(deadline, cancel).map_err(to_request_error)
    }

    /// Kill the process, if any. Requests in flight fail with `ProcessAborted`.
    pub fn shutdown(&self) {
        let process = self.process.lock().take();
        if let Some(process) = process {
            process.shutdown();
        }
    }
}

impl Drop for ProcMacroServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RequestError {
        Failed(err: ProcMacroExpansionError) {
            from()
            display("{}", err)
        }
        Cancelled {
            display("request cancelled")
        }
    }
}

fn expansion_error(err: WaitError, timeout: Duration) -> ProcMacroExpansionError {
    match err {
        WaitError::Timeout => {
            warn!(?timeout, "proc macro expander timed out");
            ProcMacroExpansionError::Timeout(timeout.as_millis() as u64)
        }
        WaitError::Server(ServerError::Exited(code)) => ProcMacroExpansionError::ProcessAborted(code),
        WaitError::Server(ServerError::Io(err)) => {
            error!(?err, "proc macro expander i/o failure");
            ProcMacroExpansionError::IOExceptionThrown
        }
        // only reachable with a cancellation flag, which startup never passes
        WaitError::Cancelled => ProcMacroExpansionError::IOExceptionThrown,
    }
}
