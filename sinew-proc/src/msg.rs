//! Messages exchanged with the expander process.
//!
//! One JSON object per line in both directions; every request carries an id and the reply to
//! it carries the same id, so replies may arrive in any order. Lines the expander writes that
//! don't start with `{` are skipped, since the macros it runs are free to print.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sinew_api::tokens::Subtree;
use sinew_api::ProcMacroKind;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::trace;

/// Bumped whenever the messages below change shape.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    ApiVersionCheck,
    ExpandMacro(ExpandMacroTask),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    ApiVersionCheck(u32),
    ExpandMacro(Result<Subtree, PanicMessage>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandMacroTask {
    /// The compiled proc-macro crate.
    pub lib: PathBuf,
    pub macro_name: String,
    pub kind: ProcMacroKind,
    /// The call's input; the item, for attribute and derive macros.
    pub macro_body: Subtree,
    /// The attribute's own arguments, for attribute macros.
    pub attributes: Option<Subtree>,
    /// Environment the macro sees through `std::env`.
    pub env: Vec<(String, String)>,
}

/// What a macro that failed (usually by panicking) had to say.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanicMessage(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u64,
    pub request: Request,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    pub response: Response,
}

/// Write one message as a line, and flush it.
pub fn write_message<W: Write, T: Serialize>(out: &mut W, msg: &T) -> io::Result<()> {
    let mut text = serde_json::to_string(msg)?;
    text.push('\n');
    out.write_all(text.as_bytes())?;
    out.flush()
}

/// Read the next message, skipping anything that isn't one. `None` at end of input.
///
/// A line that looks like a message but doesn't decode is an `InvalidData` error.
pub fn read_message<R: BufRead, T: DeserializeOwned>(
    input: &mut R,
    buf: &mut String,
) -> io::Result<Option<T>> {
    loop {
        buf.clear();
        if input.read_line(buf)? == 0 {
            return Ok(None);
        }
        let line = buf.trim();
        if !line.starts_with('{') {
            trace!(line, "skipping expander output");
            continue;
        }
        return serde_json::from_str(line)
            .map(Some)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err));
    }
}
