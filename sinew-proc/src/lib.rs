//! Procedural macro expansion, done by a separate expander process that loads the compiled
//! macro crates. A macro that panics, hangs or kills its process fails that one request;
//! the next request gets a fresh process if needed.
//!
//! [`ProcMacroServer`] owns the process, [`ProcMacroExpander`] turns calls into requests and
//! replies into results.

#[macro_use]
extern crate quick_error;

use serde::{Deserialize, Serialize};
use sinew_api::errors::{GetMacroExpansionError, ProcMacroExpansionError};
use sinew_api::tokens::Subtree;
use sinew_api::ProcMacroKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub mod msg;
pub mod process;
pub mod server;

pub use server::{ProcMacroServer, RequestError};

use msg::{ExpandMacroTask, PanicMessage, Request, Response};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcMacroConfig {
    /// When off, every proc macro call fails with `ProcMacroExpansionIsDisabled`.
    pub enabled: bool,
    /// How long one expansion may take.
    pub timeout_ms: u64,
    /// The expander executable.
    pub expander: Option<PathBuf>,
}

impl Default for ProcMacroConfig {
    fn default() -> Self {
        ProcMacroConfig {
            enabled: true,
            timeout_ms: 10_000,
            expander: None,
        }
    }
}

impl ProcMacroConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Raised by whoever started an expansion once they no longer want the result.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> CancellationFlag {
        CancellationFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One call of a procedural macro.
#[derive(Clone, Copy, Debug)]
pub struct ProcMacroCall<'a> {
    /// The compiled proc-macro crate.
    pub lib: &'a Path,
    pub name: &'a str,
    /// The macro's declared kind.
    pub kind: ProcMacroKind,
    /// The call's input; the annotated item, for attribute and derive macros.
    pub body: &'a Subtree,
    /// The attribute's arguments, for attribute macros.
    pub attributes: Option<&'a Subtree>,
    pub env: &'a [(String, String)],
}

/// A macro can only be called the way it was declared.
pub fn check_kind(call_kind: ProcMacroKind, def_kind: ProcMacroKind) -> Result<(), GetMacroExpansionError> {
    if call_kind == def_kind {
        Ok(())
    } else {
        Err(GetMacroExpansionError::UnmatchedProcMacroKind { call_kind, def_kind })
    }
}

pub struct ProcMacroExpander {
    server: Option<Arc<ProcMacroServer>>,
    config: ProcMacroConfig,
}

impl ProcMacroExpander {
    /// `server` is `None` when no expander executable was found.
    pub fn new(server: Option<Arc<ProcMacroServer>>, config: ProcMacroConfig) -> ProcMacroExpander {
        ProcMacroExpander { server, config }
    }

    pub fn config(&self) -> &ProcMacroConfig {
        &self.config
    }

    pub fn expand(&self, call: &ProcMacroCall) -> Result<Subtree, ProcMacroExpansionError> {
        self.run(call, None).map_err(|err| match err {
            RequestError::Failed(err) => err,
            // no flag, so nothing can cancel it
            RequestError::Cancelled => ProcMacroExpansionError::IOExceptionThrown,
        })
    }

    /// Like [`ProcMacroExpander::expand`], but gives up waiting once `cancel` is raised. The
    /// expander itself keeps working on the request.
    pub fn expand_cancellable(
        &self,
        call: &ProcMacroCall,
        cancel: &CancellationFlag,
    ) -> Result<Subtree, RequestError> {
        self.run(call, Some(cancel))
    }

    fn run(&self, call: &ProcMacroCall, cancel: Option<&CancellationFlag>) -> Result<Subtree, RequestError> {
        if !self.config.enabled {
            return Err(ProcMacroExpansionError::ProcMacroExpansionIsDisabled.into());
        }
        let server = match &self.server {
            Some(server) => server,
            None => return Err(ProcMacroExpansionError::ExecutableNotFound.into()),
        };
        let request = Request::ExpandMacro(ExpandMacroTask {
            lib: call.lib.to_path_buf(),
            macro_name: call.name.to_string(),
            kind: call.kind,
            macro_body: call.body.clone(),
            attributes: call.attributes.cloned(),
            env: call.env.to_vec(),
        });
        debug!(name = call.name, lib = %call.lib.display(), "expanding proc macro");
        match server.request(&request, self.config.timeout(), cancel)? {
            Response::ExpandMacro(Ok(subtree)) => Ok(subtree),
            Response::ExpandMacro(Err(PanicMessage(message))) => {
                debug!(name = call.name, %message, "proc macro failed");
                Err(ProcMacroExpansionError::ServerSideError(message).into())
            }
            other => {
                error!(?other, "unexpected reply to expansion request");
                Err(ProcMacroExpansionError::IOExceptionThrown.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinew_api::tokenize;

    fn call<'a>(body: &'a Subtree) -> ProcMacroCall<'a> {
        ProcMacroCall {
            lib: Path::new("/tmp/libmacros.so"),
            name: "foo",
            kind: ProcMacroKind::FunctionLike,
            body,
            attributes: None,
            env: &[],
        }
    }

    #[test]
    fn short_circuits() {
        spoor::init();

        let body = tokenize("x").unwrap().subtree;
        // would fail to start, if it were ever started
        let server = Arc::new(ProcMacroServer::new("/non/existing/expander"));

        let disabled = ProcMacroConfig {
            enabled: false,
            ..ProcMacroConfig::default()
        };
        let expander = ProcMacroExpander::new(Some(server.clone()), disabled);
        assert_eq!(
            expander.expand(&call(&body)),
            Err(ProcMacroExpansionError::ProcMacroExpansionIsDisabled)
        );
        assert_eq!(server.spawned(), 0);

        let expander = ProcMacroExpander::new(None, ProcMacroConfig::default());
        assert_eq!(
            expander.expand(&call(&body)),
            Err(ProcMacroExpansionError::ExecutableNotFound)
        );
    }

    #[test]
    fn kinds() {
        spoor::init();

        assert_eq!(check_kind(ProcMacroKind::Attr, ProcMacroKind::Attr), Ok(()));
        assert_eq!(
            check_kind(ProcMacroKind::FunctionLike, ProcMacroKind::CustomDerive),
            Err(GetMacroExpansionError::UnmatchedProcMacroKind {
                call_kind: ProcMacroKind::FunctionLike,
                def_kind: ProcMacroKind::CustomDerive,
            })
        );
    }

    #[test]
    fn config_from_json() {
        spoor::init();

        let config: ProcMacroConfig = serde_json::from_str(r#"{"timeout_ms": 50}"#).unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(50));
        assert!(config.enabled);
        assert_eq!(config.expander, None);
    }
}
