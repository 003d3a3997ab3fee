//! Shared data for the `sinew` macro expansion crates: the token-tree model every expander
//! consumes and produces, a tokenizer that builds it from source text, and the closed set of
//! errors expansion can end in (with a stable binary encoding for caches).
//!
//! Nothing here knows how to expand anything; see `sinew-expand` for `macro_rules!` and
//! `sinew-proc` for procedural macros.

#[macro_use]
extern crate quick_error;

/// Fast single-thread-writeable maps.
pub type Map<K, V> = hashbrown::HashMap<K, V, fxhash::FxBuildHasher>;
/// Fast single-thread-writeable sets.
pub type Set<K> = hashbrown::HashSet<K, fxhash::FxBuildHasher>;

pub mod errors;
pub mod tokenize;
pub mod tokens;

pub use tokenize::{tokenize, Tokenized};
pub use tokens::{Delimiter, DelimiterKind, Ident, Leaf, Literal, Punct, Spacing, Subtree, TokenId, TokenTree};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three flavors of procedural macro, also used to describe how a macro was invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcMacroKind {
    /// `foo!(...)`
    FunctionLike,
    /// `#[foo] item`
    Attr,
    /// `#[derive(Foo)] item`
    CustomDerive,
}

impl ProcMacroKind {
    pub(crate) fn ordinal(self) -> u8 {
        match self {
            ProcMacroKind::FunctionLike => 0,
            ProcMacroKind::Attr => 1,
            ProcMacroKind::CustomDerive => 2,
        }
    }

    pub(crate) fn from_ordinal(ordinal: u8) -> Option<ProcMacroKind> {
        match ordinal {
            0 => Some(ProcMacroKind::FunctionLike),
            1 => Some(ProcMacroKind::Attr),
            2 => Some(ProcMacroKind::CustomDerive),
            _ => None,
        }
    }
}

impl fmt::Display for ProcMacroKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ProcMacroKind::FunctionLike => "function-like",
            ProcMacroKind::Attr => "attribute",
            ProcMacroKind::CustomDerive => "derive",
        })
    }
}
