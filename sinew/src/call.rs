//! What the resolution step hands us: a macro call, and what its name resolved to.

use sinew_api::tokens::Subtree;
use sinew_api::{ProcMacroKind, Tokenized};
use smol_str::SmolStr;
use std::path::PathBuf;

/// How a macro was invoked.
pub type MacroCallKind = ProcMacroKind;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MacroCallBody {
    /// `foo!(...)`: the tokens between the delimiters.
    FunctionLike(Tokenized),
    /// `#[foo(attr)] item`
    Attribute { item: Subtree, attr: Subtree },
    /// `#[derive(Foo)] item`
    Derive { item: Subtree },
}

impl MacroCallBody {
    pub fn kind(&self) -> MacroCallKind {
        match self {
            MacroCallBody::FunctionLike(_) => ProcMacroKind::FunctionLike,
            MacroCallBody::Attribute { .. } => ProcMacroKind::Attr,
            MacroCallBody::Derive { .. } => ProcMacroKind::CustomDerive,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroCall {
    pub kind: MacroCallKind,
    /// `None` when the call itself didn't parse.
    pub body: Option<MacroCallBody>,
    /// Environment for proc macros.
    pub env: Vec<(String, String)>,
    /// Whether the call survives `#[cfg]`.
    pub cfg_enabled: bool,
    /// Repair the item's syntax before an attribute or derive macro sees it.
    pub fixup: bool,
}

impl MacroCall {
    pub fn new(body: MacroCallBody) -> MacroCall {
        MacroCall {
            kind: body.kind(),
            body: Some(body),
            env: vec![],
            cfg_enabled: true,
            fixup: false,
        }
    }

    pub fn function_like(tokens: Tokenized) -> MacroCall {
        MacroCall::new(MacroCallBody::FunctionLike(tokens))
    }

    pub fn attribute(item: Subtree, attr: Subtree) -> MacroCall {
        MacroCall::new(MacroCallBody::Attribute { item, attr })
    }

    pub fn derive(item: Subtree) -> MacroCall {
        MacroCall::new(MacroCallBody::Derive { item })
    }

    /// A call whose input couldn't be parsed.
    pub fn unparsed(kind: MacroCallKind) -> MacroCall {
        MacroCall {
            kind,
            body: None,
            env: vec![],
            cfg_enabled: true,
            fixup: false,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_fixup(mut self) -> Self {
        self.fixup = true;
        self
    }

    pub fn cfg_disabled(mut self) -> Self {
        self.cfg_enabled = false;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclMacroData {
    /// The arms of a `macro_rules!`, i.e. what's between its braces. `None` if the
    /// definition didn't parse that far.
    pub body: Option<Subtree>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcMacroData {
    pub name: SmolStr,
    pub kind: ProcMacroKind,
    /// The compiled macro crate; `None` if it hasn't been built.
    pub artifact: Option<PathBuf>,
}

/// What a macro call's path resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MacroResolution {
    Decl(DeclMacroData),
    /// A `macro` (macros 2.0) item.
    Macro2,
    /// A compiler built-in, by name.
    Builtin(SmolStr),
    Proc(ProcMacroData),
    Unresolved,
    /// Deliberately not expanded.
    Skipped,
}
