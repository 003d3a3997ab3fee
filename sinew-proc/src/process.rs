//! A running expander process.
//!
//! A writer thread owns the child's stdin and takes requests over a rendezvous channel, so a
//! child that stops reading makes senders time out instead of blocking. A reader thread owns its
//! stdout and hands each reply to whoever is waiting for that id. When the child exits or says
//! something unintelligible, everyone still waiting is told, and the process is dead for good.

use crate::msg::{self, Request, RequestEnvelope, Response, ResponseEnvelope};
use crate::CancellationFlag;
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;
use sinew_api::Map;
use std::io::{self, BufReader};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

/// How often a cancellable wait checks its flag.
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// How long to wait for an exit status once the child closed its stdout.
const EXIT_PATIENCE: Duration = Duration::from_secs(2);

/// How long to wait for an exit status after the child said something unintelligible; a child
/// that is going down anyway is reported as aborted, not as garbled.
const GARBLED_PATIENCE: Duration = Duration::from_millis(500);

/// Exit code reported when the child was killed, or didn't exit.
pub const KILLED: i32 = -1;

quick_error! {
    #[derive(Debug, Clone)]
    pub enum ServerError {
        Io(err: Arc<io::Error>) {
            from(err: io::Error) -> (Arc::new(err))
            display("error talking to the expander: {}", err)
        }
        Exited(code: i32) {
            display("expander exited with code {}", code)
        }
    }
}

#[derive(Debug)]
pub enum WaitError {
    Server(ServerError),
    Timeout,
    Cancelled,
}

type Reply = Result<Response, ServerError>;

#[derive(Default)]
struct State {
    pending: Map<u64, Sender<Reply>>,
    next_id: u64,
    /// Set once; no request can succeed after that.
    dead: Option<ServerError>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn resolve(&self, envelope: ResponseEnvelope) {
        let sender = self.state.lock().pending.remove(&envelope.id);
        match sender {
            Some(sender) => {
                let _ = sender.send(Ok(envelope.response));
            }
            None => debug!(id = envelope.id, "dropping reply to abandoned request"),
        }
    }

    fn forget(&self, id: u64) {
        self.state.lock().pending.remove(&id);
    }

    fn fail_all(&self, err: ServerError) {
        let pending = {
            let mut state = self.state.lock();
            if state.dead.is_none() {
                state.dead = Some(err.clone());
            }
            std::mem::take(&mut state.pending)
        };
        for (_, sender) in pending {
            let _ = sender.send(Err(err.clone()));
        }
    }
}

pub struct ExpanderProcess {
    child: Arc<Mutex<Child>>,
    requests: Sender<RequestEnvelope>,
    shared: Arc<Shared>,
    pid: u32,
}

impl ExpanderProcess {
    pub fn spawn(path: &Path, env: &[(String, String)]) -> io::Result<ExpanderProcess> {
        let mut child = Command::new(path)
            .envs(env.iter().map(|(k, v)| (k, v)))
            .env("SINEW_PROC_MACRO_EXPANDER", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let pid = child.id();
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                return Err(io::Error::new(io::ErrorKind::Other, "expander has no stdio"));
            }
        };

        let child = Arc::new(Mutex::new(child));
        let shared = Arc::new(Shared::default());
        // zero capacity: a request is only accepted once the writer is free to write it
        let (requests, queue) = crossbeam_channel::bounded(0);
        let reader = {
            let child = child.clone();
            let shared = shared.clone();
            thread::Builder::new()
                .name(format!("sinew-expander-{}", pid))
                .spawn(move || read_replies(stdout, &shared, &child))
        };
        let writer = reader.and_then(|_| {
            let child = child.clone();
            let shared = shared.clone();
            thread::Builder::new()
                .name(format!("sinew-expander-{}-writer", pid))
                .spawn(move || write_requests(stdin, queue, &shared, &child))
        });
        if let Err(err) = writer {
            let _ = child.lock().kill();
            return Err(err);
        }

        info!(pid, path = %path.display(), "started proc macro expander");
        Ok(ExpanderProcess {
            child,
            requests,
            shared,
            pid,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        self.shared.state.lock().dead.is_none()
    }

    /// Send a request. The reply is collected with [`PendingReply::wait`], using the same
    /// `deadline`; a child that stops reading makes this time out.
    pub fn send(
        &self,
        request: &Request,
        deadline: Instant,
        cancel: Option<&CancellationFlag>,
    ) -> Result<PendingReply, WaitError> {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let id = {
            let mut state = self.shared.state.lock();
            if let Some(err) = &state.dead {
                return Err(WaitError::Server(err.clone()));
            }
            let id = state.next_id;
            state.next_id += 1;
            state.pending.insert(id, sender);
            id
        };
        let pending = PendingReply {
            id,
            receiver,
            shared: self.shared.clone(),
        };

        let mut envelope = RequestEnvelope {
            id,
            request: request.clone(),
        };
        loop {
            let slice = poll_slice(deadline, cancel).ok_or(WaitError::Timeout)?;
            match self.requests.send_timeout(envelope, slice) {
                Ok(()) => {
                    trace!(pid = self.pid, id, "queued request");
                    return Ok(pending);
                }
                Err(SendTimeoutError::Timeout(unsent)) => {
                    if cancel.map_or(false, |c| c.is_cancelled()) {
                        return Err(WaitError::Cancelled);
                    }
                    envelope = unsent;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    let dead = self.shared.state.lock().dead.clone();
                    return Err(WaitError::Server(dead.unwrap_or(ServerError::Exited(KILLED))));
                }
            }
        }
    }

    /// Kill the child; everything in flight fails as if it had exited.
    pub fn shutdown(&self) {
        debug!(pid = self.pid, "killing proc macro expander");
        {
            let mut child = self.child.lock();
            let _ = child.kill();
            let _ = child.wait();
        }
        self.shared.fail_all(ServerError::Exited(KILLED));
    }
}

impl Drop for ExpanderProcess {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A request that's been sent; dropping it abandons the reply.
pub struct PendingReply {
    id: u64,
    receiver: Receiver<Reply>,
    shared: Arc<Shared>,
}

impl PendingReply {
    pub fn wait(self, deadline: Instant, cancel: Option<&CancellationFlag>) -> Result<Response, WaitError> {
        loop {
            let slice = poll_slice(deadline, cancel).ok_or(WaitError::Timeout)?;
            match self.receiver.recv_timeout(slice) {
                Ok(reply) => return reply.map_err(WaitError::Server),
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.map_or(false, |c| c.is_cancelled()) {
                        return Err(WaitError::Cancelled);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let dead = self.shared.state.lock().dead.clone();
                    return Err(WaitError::Server(dead.unwrap_or(ServerError::Exited(KILLED))));
                }
            }
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.shared.forget(self.id);
    }
}

/// How long to block before looking at the deadline and the flag again; `None` once the
/// deadline has passed.
fn poll_slice(deadline: Instant, cancel: Option<&CancellationFlag>) -> Option<Duration> {
    let now = Instant::now();
    if now >= deadline {
        return None;
    }
    Some(match cancel {
        Some(_) => (deadline - now).min(CANCEL_POLL),
        None => deadline - now,
    })
}

fn write_requests(
    mut stdin: ChildStdin,
    queue: Receiver<RequestEnvelope>,
    shared: &Shared,
    child: &Mutex<Child>,
) {
    // ends when the process handle, and with it the sender, is dropped
    for envelope in queue {
        let id = envelope.id;
        if let Err(err) = msg::write_message(&mut stdin, &envelope) {
            // a write failure usually means the child is gone; report its exit if so
            let err = match wait_for_exit(child, Duration::from_millis(100)) {
                Some(code) => ServerError::Exited(code),
                None => {
                    error!(?err, "can't write to proc macro expander");
                    let _ = child.lock().kill();
                    err.into()
                }
            };
            shared.fail_all(err);
            return;
        }
        trace!(id, "sent request");
    }
}

fn read_replies(stdout: ChildStdout, shared: &Shared, child: &Mutex<Child>) {
    let mut input = BufReader::new(stdout);
    let mut buf = String::new();
    let err = loop {
        match msg::read_message::<_, ResponseEnvelope>(&mut input, &mut buf) {
            Ok(Some(envelope)) => shared.resolve(envelope),
            Ok(None) => {
                let code = wait_for_exit(child, EXIT_PATIENCE).unwrap_or(KILLED);
                debug!(code, "proc macro expander exited");
                break ServerError::Exited(code);
            }
            Err(err) => {
                if let Some(code) = wait_for_exit(child, GARBLED_PATIENCE) {
                    debug!(code, ?err, "proc macro expander died mid-message");
                    break ServerError::Exited(code);
                }
                error!(?err, "bad message from proc macro expander, discarding it");
                let _ = child.lock().kill();
                break err.into();
            }
        }
    };
    shared.fail_all(err);
}

/// The child's exit code, if it exits within `patience`.
fn wait_for_exit(child: &Mutex<Child>, patience: Duration) -> Option<i32> {
    let deadline = Instant::now() + patience;
    loop {
        // don't hold the lock while sleeping, `shutdown` needs it
        if let Ok(Some(status)) = child.lock().try_wait() {
            return Some(exit_code(status));
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(KILLED)
}
