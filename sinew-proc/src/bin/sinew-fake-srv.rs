//! The server side of the expander protocol, with a handful of built-in "macros" that
//! misbehave in all the ways a real one can. Used by the tests.

use parking_lot::Mutex;
use sinew_api::tokens::{Leaf, Subtree, TokenId};
use sinew_proc::msg::{self, ExpandMacroTask, PanicMessage, Request, RequestEnvelope, Response, ResponseEnvelope};
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

type Out = Arc<Mutex<io::Stdout>>;

fn main() -> io::Result<()> {
    // stdout is the protocol channel
    spoor::init_stderr();

    let version = std::env::var("SINEW_FAKE_SRV_VERSION")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(msg::PROTOCOL_VERSION);
    // answer the version check, then stop reading
    let deaf = std::env::var_os("SINEW_FAKE_SRV_DEAF").is_some();
    let out: Out = Arc::new(Mutex::new(io::stdout()));

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut buf = String::new();
    while let Some(envelope) = msg::read_message::<_, RequestEnvelope>(&mut input, &mut buf)? {
        let id = envelope.id;
        match envelope.request {
            Request::ApiVersionCheck => {
                reply(&out, id, Response::ApiVersionCheck(version))?;
                if deaf {
                    debug!("no longer reading requests");
                    thread::sleep(Duration::from_secs(600));
                    return Ok(());
                }
            }
            Request::ExpandMacro(task) => {
                debug!(id, name = %task.macro_name, "expanding");
                // one thread per expansion, so a hanging macro doesn't block the rest
                let out = out.clone();
                thread::spawn(move || {
                    let result = expand(&task, &out);
                    let _ = reply(&out, id, Response::ExpandMacro(result));
                });
            }
        }
    }
    Ok(())
}

fn reply(out: &Out, id: u64, response: Response) -> io::Result<()> {
    msg::write_message(&mut *out.lock(), &ResponseEnvelope { id, response })
}

fn say(out: &Out, text: &str) {
    let mut out = out.lock();
    let _ = writeln!(out, "{}", text);
    let _ = out.flush();
}

fn expand(task: &ExpandMacroTask, out: &Out) -> Result<Subtree, PanicMessage> {
    panic::catch_unwind(AssertUnwindSafe(|| run_macro(task, out))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "macro panicked".to_string());
        Err(PanicMessage(message))
    })
}

fn run_macro(task: &ExpandMacroTask, out: &Out) -> Result<Subtree, PanicMessage> {
    let as_is = || Ok(task.macro_body.clone());
    match task.macro_name.as_str() {
        "function_like_as_is" | "attr_as_is" => as_is(),
        "derive_noop" => Ok(Subtree::invisible(vec![])),
        "function_like_read_env_var" => {
            let value = task
                .env
                .iter()
                .find(|(key, _)| key == "FOO_ENV_VAR")
                .map_or("", |(_, value)| value.as_str());
            let literal = Leaf::literal(&format!("{:?}", value), TokenId::UNSPECIFIED);
            Ok(Subtree::invisible(vec![literal.into()]))
        }
        "function_like_do_println" => {
            say(out, "hello from a macro");
            as_is()
        }
        "function_like_do_panic" => panic!("panic from a macro"),
        "function_like_wait_100_seconds" => {
            thread::sleep(Duration::from_secs(100));
            as_is()
        }
        "function_like_process_exit" => std::process::exit(101),
        "function_like_process_abort" => std::process::abort(),
        "function_like_do_brace_println_and_process_exit" => {
            say(out, "{");
            std::process::exit(101)
        }
        "function_like_do_println_braces" => {
            say(out, "{}");
            as_is()
        }
        "function_like_do_println_text_in_braces" => {
            say(out, "{hello}");
            as_is()
        }
        name => Err(PanicMessage(format!("unknown macro `{}`", name))),
    }
}
