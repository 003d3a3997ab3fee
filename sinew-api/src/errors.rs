//! Everything that can go wrong while expanding a macro.
//!
//! Three layers:
//! - [`MacroMatchingError`]: why one `macro_rules!` arm didn't match a call.
//! - [`MacroExpansionError`]: why an expander (declarative, built-in or procedural) failed.
//! - [`GetMacroExpansionError`]: why the pipeline produced no expansion for a call at all.
//!
//! Every variant has a fixed binary encoding ([`Codec`]), since errors are persisted next to
//! successful expansions in caches. The encoding is one ordinal byte followed by the variant's
//! fields; ordinals must never be renumbered.

use crate::ProcMacroKind;
use std::io::{self, Read, Write};

quick_error! {
    /// A failure to match a call against one `macro_rules!` arm. `offset` is a byte offset into
    /// the call body.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MacroMatchingError {
        PatternSyntax { offset: usize } {
            display("malformed macro pattern (matching at {})", offset)
        }
        ExtraInput { offset: usize } {
            display("unexpected extra input at {}", offset)
        }
        EndOfInput { offset: usize } {
            display("unexpected end of macro input at {}", offset)
        }
        UnmatchedToken {
            offset: usize,
            expected_kind: String,
            expected_text: String,
            actual_kind: String,
            actual_text: String
        } {
            display("expected {} `{}`, found {} `{}` at {}", expected_kind, expected_text, actual_kind, actual_text, offset)
        }
        FragmentIsNotParsed { offset: usize, variable: String, kind: String } {
            display("can't parse `${}` as `{}` at {}", variable, kind, offset)
        }
        EmptyGroup { offset: usize } {
            display("repetition matches empty token tree at {}", offset)
        }
        TooFewGroupElements { offset: usize } {
            display("`+` repetition matched nothing at {}", offset)
        }
        Nesting { offset: usize, variable: String } {
            display("variable `{}` is still repeating at this depth ({})", variable, offset)
        }
    }
}

impl MacroMatchingError {
    pub fn offset(&self) -> usize {
        match self {
            MacroMatchingError::PatternSyntax { offset }
            | MacroMatchingError::ExtraInput { offset }
            | MacroMatchingError::EndOfInput { offset }
            | MacroMatchingError::UnmatchedToken { offset, .. }
            | MacroMatchingError::FragmentIsNotParsed { offset, .. }
            | MacroMatchingError::EmptyGroup { offset }
            | MacroMatchingError::TooFewGroupElements { offset }
            | MacroMatchingError::Nesting { offset, .. } => *offset,
        }
    }
}

quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum DeclMacroExpansionError {
        /// No arm matched; one error per arm, in declaration order.
        Matching(errors: Vec<MacroMatchingError>) {
            display("no rules expected this input{}", render_best(errors))
        }
        DefSyntax {
            display("malformed macro definition")
        }
        TooLargeExpansion {
            display("macro expansion is too large")
        }
    }
}

impl DeclMacroExpansionError {
    /// The error that got furthest into the input; the earliest arm wins ties.
    pub fn best_matching_error(&self) -> Option<&MacroMatchingError> {
        match self {
            DeclMacroExpansionError::Matching(errors) => errors.iter().rev().max_by_key(|e| e.offset()),
            _ => None,
        }
    }
}

fn render_best(errors: &[MacroMatchingError]) -> String {
    match errors.iter().rev().max_by_key(|e| e.offset()) {
        Some(best) => format!(": {}", best),
        None => String::new(),
    }
}

quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ProcMacroExpansionError {
        /// The macro itself failed, usually by panicking.
        ServerSideError(message: String) {
            display("proc macro failed: {}", message)
        }
        ProcessAborted(exit_code: i32) {
            display("proc macro expander exited with code {}", exit_code)
        }
        IOExceptionThrown {
            display("communication with the proc macro expander failed")
        }
        Timeout(millis: u64) {
            display("proc macro expansion timed out after {}ms", millis)
        }
        UnsupportedExpanderVersion(version: u32) {
            display("unsupported proc macro expander version {}", version)
        }
        CantRunExpander {
            display("can't run the proc macro expander")
        }
        ExecutableNotFound {
            display("proc macro expander executable not found")
        }
        ProcMacroExpansionIsDisabled {
            display("proc macro expansion is disabled")
        }
    }
}

quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MacroExpansionError {
        Decl(err: DeclMacroExpansionError) {
            from()
            display("{}", err)
        }
        /// A compiler built-in that can't be expanded here (`env!`, `include!`, ...).
        BuiltinMacroExpansionError {
            display("built-in macro can't be expanded")
        }
        Proc(err: ProcMacroExpansionError) {
            from()
            display("{}", err)
        }
    }
}

impl MacroExpansionError {
    /// Whether this failure is a pure function of its inputs. Proc macro failures aren't:
    /// the process may crash, time out, or behave nondeterministically.
    pub fn can_cache(&self) -> bool {
        !matches!(self, MacroExpansionError::Proc(_))
    }
}

/// See [`MacroExpansionError::can_cache`].
pub fn can_cache_error(err: &MacroExpansionError) -> bool {
    err.can_cache()
}

quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum GetMacroExpansionError {
        NotYetExpanded {
            display("macro is not yet expanded")
        }
        CfgDisabled {
            display("macro call is disabled by #[cfg]")
        }
        /// Recognized, but deliberately not expanded.
        Skipped {
            display("macro expansion skipped")
        }
        Unresolved {
            display("unresolved macro")
        }
        NoProcMacroArtifact {
            display("procedural macro crate is not compiled")
        }
        UnmatchedProcMacroKind { call_kind: ProcMacroKind, def_kind: ProcMacroKind } {
            display("{} macro invoked as {} macro", def_kind, call_kind)
        }
        Macro2IsNotSupported {
            display("`macro` items are not supported")
        }
        MacroCallSyntax {
            display("macro call syntax error")
        }
        MacroDefSyntax {
            display("macro definition syntax error")
        }
        Expansion(err: MacroExpansionError) {
            from()
            from(err: DeclMacroExpansionError) -> (MacroExpansionError::Decl(err))
            from(err: ProcMacroExpansionError) -> (MacroExpansionError::Proc(err))
            display("{}", err)
        }
    }
}

impl GetMacroExpansionError {
    /// Only expander failures are cacheable, and only if the expander says so; everything else
    /// depends on resolution state that can change.
    pub fn can_cache(&self) -> bool {
        match self {
            GetMacroExpansionError::Expansion(err) => err.can_cache(),
            _ => false,
        }
    }
}

/// Binary (de)serialization with a stable, ordinal-tagged layout.
pub trait Codec: Sized {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()>;
    fn read_from<R: Read>(r: &mut R) -> io::Result<Self>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![];
        // writing to a Vec can't fail
        let _ = self.write_to(&mut buf);
        buf
    }

    fn from_bytes(mut bytes: &[u8]) -> io::Result<Self> {
        let result = Self::read_from(&mut bytes)?;
        if !bytes.is_empty() {
            return Err(invalid("trailing bytes after error"));
        }
        Ok(result)
    }
}

impl Codec for MacroMatchingError {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        use MacroMatchingError::*;
        match self {
            PatternSyntax { offset } => {
                write_u8(w, 0)?;
                write_varint(w, *offset as u64)
            }
            ExtraInput { offset } => {
                write_u8(w, 1)?;
                write_varint(w, *offset as u64)
            }
            EndOfInput { offset } => {
                write_u8(w, 2)?;
                write_varint(w, *offset as u64)
            }
            UnmatchedToken {
                offset,
                expected_kind,
                expected_text,
                actual_kind,
                actual_text,
            } => {
                write_u8(w, 3)?;
                write_varint(w, *offset as u64)?;
                write_str(w, expected_kind)?;
                write_str(w, expected_text)?;
                write_str(w, actual_kind)?;
                write_str(w, actual_text)
            }
            FragmentIsNotParsed {
                offset,
                variable,
                kind,
            } => {
                write_u8(w, 4)?;
                write_varint(w, *offset as u64)?;
                write_str(w, variable)?;
                write_str(w, kind)
            }
            EmptyGroup { offset } => {
                write_u8(w, 5)?;
                write_varint(w, *offset as u64)
            }
            TooFewGroupElements { offset } => {
                write_u8(w, 6)?;
                write_varint(w, *offset as u64)
            }
            Nesting { offset, variable } => {
                write_u8(w, 7)?;
                write_varint(w, *offset as u64)?;
                write_str(w, variable)
            }
        }
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        use MacroMatchingError::*;
        let ordinal = read_u8(r)?;
        let offset = read_varint(r)? as usize;
        Ok(match ordinal {
            0 => PatternSyntax { offset },
            1 => ExtraInput { offset },
            2 => EndOfInput { offset },
            3 => UnmatchedToken {
                offset,
                expected_kind: read_str(r)?,
                expected_text: read_str(r)?,
                actual_kind: read_str(r)?,
                actual_text: read_str(r)?,
            },
            4 => FragmentIsNotParsed {
                offset,
                variable: read_str(r)?,
                kind: read_str(r)?,
            },
            5 => EmptyGroup { offset },
            6 => TooFewGroupElements { offset },
            7 => Nesting {
                offset,
                variable: read_str(r)?,
            },
            other => return Err(unknown_ordinal("MacroMatchingError", other)),
        })
    }
}

impl Codec for MacroExpansionError {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        use DeclMacroExpansionError as D;
        use ProcMacroExpansionError as P;
        match self {
            MacroExpansionError::Decl(D::Matching(errors)) => {
                write_u8(w, 0)?;
                write_varint(w, errors.len() as u64)?;
                for err in errors {
                    err.write_to(w)?;
                }
                Ok(())
            }
            MacroExpansionError::Decl(D::DefSyntax) => write_u8(w, 1),
            MacroExpansionError::Decl(D::TooLargeExpansion) => write_u8(w, 2),
            MacroExpansionError::BuiltinMacroExpansionError => write_u8(w, 3),
            MacroExpansionError::Proc(P::ServerSideError(message)) => {
                write_u8(w, 4)?;
                write_str(w, message)
            }
            MacroExpansionError::Proc(P::ProcessAborted(exit_code)) => {
                write_u8(w, 5)?;
                w.write_all(&exit_code.to_be_bytes())
            }
            MacroExpansionError::Proc(P::IOExceptionThrown) => write_u8(w, 6),
            MacroExpansionError::Proc(P::Timeout(millis)) => {
                write_u8(w, 7)?;
                w.write_all(&millis.to_be_bytes())
            }
            MacroExpansionError::Proc(P::UnsupportedExpanderVersion(version)) => {
                write_u8(w, 8)?;
                w.write_all(&version.to_be_bytes())
            }
            MacroExpansionError::Proc(P::CantRunExpander) => write_u8(w, 9),
            MacroExpansionError::Proc(P::ExecutableNotFound) => write_u8(w, 10),
            MacroExpansionError::Proc(P::ProcMacroExpansionIsDisabled) => write_u8(w, 11),
        }
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        use DeclMacroExpansionError as D;
        use ProcMacroExpansionError as P;
        Ok(match read_u8(r)? {
            0 => {
                let len = read_varint(r)?;
                let mut errors = Vec::with_capacity(len.min(64) as usize);
                for _ in 0..len {
                    errors.push(MacroMatchingError::read_from(r)?);
                }
                D::Matching(errors).into()
            }
            1 => D::DefSyntax.into(),
            2 => D::TooLargeExpansion.into(),
            3 => MacroExpansionError::BuiltinMacroExpansionError,
            4 => P::ServerSideError(read_str(r)?).into(),
            5 => P::ProcessAborted(i32::from_be_bytes(read_array(r)?)).into(),
            6 => P::IOExceptionThrown.into(),
            7 => P::Timeout(u64::from_be_bytes(read_array(r)?)).into(),
            8 => P::UnsupportedExpanderVersion(u32::from_be_bytes(read_array(r)?)).into(),
            9 => P::CantRunExpander.into(),
            10 => P::ExecutableNotFound.into(),
            11 => P::ProcMacroExpansionIsDisabled.into(),
            other => return Err(unknown_ordinal("MacroExpansionError", other)),
        })
    }
}

impl Codec for GetMacroExpansionError {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        use GetMacroExpansionError::*;
        match self {
            NotYetExpanded => write_u8(w, 0),
            CfgDisabled => write_u8(w, 1),
            Skipped => write_u8(w, 2),
            Unresolved => write_u8(w, 3),
            NoProcMacroArtifact => write_u8(w, 4),
            UnmatchedProcMacroKind {
                call_kind,
                def_kind,
            } => {
                write_u8(w, 5)?;
                write_u8(w, call_kind.ordinal())?;
                write_u8(w, def_kind.ordinal())
            }
            Macro2IsNotSupported => write_u8(w, 6),
            MacroCallSyntax => write_u8(w, 7),
            MacroDefSyntax => write_u8(w, 8),
            Expansion(err) => {
                write_u8(w, 9)?;
                err.write_to(w)
            }
        }
    }

    fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        use GetMacroExpansionError::*;
        Ok(match read_u8(r)? {
            0 => NotYetExpanded,
            1 => CfgDisabled,
            2 => Skipped,
            3 => Unresolved,
            4 => NoProcMacroArtifact,
            5 => UnmatchedProcMacroKind {
                call_kind: read_kind(r)?,
                def_kind: read_kind(r)?,
            },
            6 => Macro2IsNotSupported,
            7 => MacroCallSyntax,
            8 => MacroDefSyntax,
            9 => Expansion(MacroExpansionError::read_from(r)?),
            other => return Err(unknown_ordinal("GetMacroExpansionError", other)),
        })
    }
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

fn unknown_ordinal(what: &str, ordinal: u8) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("unknown {} ordinal {}", what, ordinal),
    )
}

fn write_u8<W: Write>(w: &mut W, value: u8) -> io::Result<()> {
    w.write_all(&[value])
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let [byte] = read_array::<R, 1>(r)?;
    Ok(byte)
}

fn read_array<R: Read, const N: usize>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_kind<R: Read>(r: &mut R) -> io::Result<ProcMacroKind> {
    let ordinal = read_u8(r)?;
    ProcMacroKind::from_ordinal(ordinal).ok_or_else(|| unknown_ordinal("ProcMacroKind", ordinal))
}

/// Unsigned LEB128.
fn write_varint<W: Write>(w: &mut W, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            return write_u8(w, byte);
        }
        write_u8(w, byte | 0x80)?;
    }
}

fn read_varint<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;
    loop {
        let byte = read_u8(r)?;
        if shift > 63 {
            return Err(invalid("varint too long"));
        }
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// u16 big-endian byte length, then UTF-8. Longer strings are cut at a char boundary.
fn write_str<W: Write>(w: &mut W, value: &str) -> io::Result<()> {
    let mut end = value.len().min(u16::MAX as usize);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    w.write_all(&(end as u16).to_be_bytes())?;
    w.write_all(&value.as_bytes()[..end])
}

fn read_str<R: Read>(r: &mut R) -> io::Result<String> {
    let len = u16::from_be_bytes(read_array(r)?) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| invalid("string is not UTF-8"))
}
