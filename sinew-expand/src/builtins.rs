//! Compiler built-in macros.
//!
//! Only the ones that are pure functions of their input are expanded here; the rest need the
//! file system, the build environment or the compiler's internals.

use sinew_api::errors::MacroExpansionError;
use sinew_api::tokens::{Leaf, LitKind, Literal, Subtree, TokenId, TokenTree};
use sinew_api::tokenize::forget_lexed_sources;
use sinew_api::Tokenized;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinMacro {
    Stringify,
    Concat,
    /// Known to the compiler, but not expandable without it.
    Unsupported,
}

const UNSUPPORTED: &[&str] = &[
    "env",
    "option_env",
    "include",
    "include_str",
    "include_bytes",
    "file",
    "line",
    "column",
    "module_path",
    "format_args",
    "format_args_nl",
    "const_format_args",
    "asm",
    "global_asm",
    "llvm_asm",
    "compile_error",
    "concat_idents",
    "concat_bytes",
    "cfg",
    "trace_macros",
    "log_syntax",
];

impl BuiltinMacro {
    pub fn find(name: &str) -> Option<BuiltinMacro> {
        match name {
            "stringify" => Some(BuiltinMacro::Stringify),
            "concat" => Some(BuiltinMacro::Concat),
            _ if UNSUPPORTED.contains(&name) => Some(BuiltinMacro::Unsupported),
            _ => None,
        }
    }

    /// Expand a call; the output is a single string literal with no provenance.
    pub fn expand(self, call: &Tokenized) -> Result<Subtree, MacroExpansionError> {
        let text = match self {
            BuiltinMacro::Stringify => call.subtree.flatten_invisible().to_string(),
            BuiltinMacro::Concat => concat(&call.subtree.token_trees)?,
            BuiltinMacro::Unsupported => {
                return Err(MacroExpansionError::BuiltinMacroExpansionError)
            }
        };
        let literal = Leaf::Literal(Literal::new(&quote_str(&text), TokenId::UNSPECIFIED));
        Ok(Subtree::invisible(vec![literal.into()]))
    }
}

/// Expand the built-in called `name`; unknown names are an error too.
pub fn expand_builtin(name: &str, call: &Tokenized) -> Result<Subtree, MacroExpansionError> {
    let result = match BuiltinMacro::find(name) {
        Some(builtin) => builtin.expand(call),
        None => {
            debug!(name, "unknown built-in macro");
            Err(MacroExpansionError::BuiltinMacroExpansionError)
        }
    };
    // literals were decoded by lexing them
    forget_lexed_sources();
    result
}

fn concat(tts: &[TokenTree]) -> Result<String, MacroExpansionError> {
    let flat = Subtree::invisible(tts.to_vec()).flatten_invisible();
    let mut out = String::new();
    let mut expect_comma = false;
    let mut negative = false;
    for tt in &flat.token_trees {
        let leaf = match tt {
            TokenTree::Leaf(leaf) => leaf,
            TokenTree::Subtree(_) => return Err(MacroExpansionError::BuiltinMacroExpansionError),
        };
        match leaf {
            Leaf::Punct(p) if p.char == ',' && expect_comma => {
                expect_comma = false;
                continue;
            }
            Leaf::Punct(p) if p.char == '-' && !expect_comma && !negative => {
                negative = true;
                continue;
            }
            _ if expect_comma => return Err(MacroExpansionError::BuiltinMacroExpansionError),
            Leaf::Literal(lit) => {
                let numeric = matches!(lit.kind, LitKind::Integer | LitKind::Float);
                if negative {
                    if !numeric {
                        return Err(MacroExpansionError::BuiltinMacroExpansionError);
                    }
                    out.push('-');
                }
                out.push_str(&literal_value(lit)?);
            }
            Leaf::Ident(ident) if !negative && (ident.text == "true" || ident.text == "false") => {
                out.push_str(&ident.text)
            }
            _ => return Err(MacroExpansionError::BuiltinMacroExpansionError),
        }
        negative = false;
        expect_comma = true;
    }
    if negative {
        return Err(MacroExpansionError::BuiltinMacroExpansionError);
    }
    Ok(out)
}

/// What a literal contributes to `concat!`.
fn literal_value(lit: &Literal) -> Result<String, MacroExpansionError> {
    let bad = |_| MacroExpansionError::BuiltinMacroExpansionError;
    match syn::parse_str::<syn::Lit>(&lit.text).map_err(bad)? {
        syn::Lit::Str(s) => Ok(s.value()),
        syn::Lit::Char(c) => Ok(c.value().to_string()),
        syn::Lit::Int(i) => i.base10_parse::<u128>().map(|v| v.to_string()).map_err(bad),
        syn::Lit::Float(f) => Ok(f.base10_digits().to_string()),
        _ => Err(MacroExpansionError::BuiltinMacroExpansionError),
    }
}

/// A string literal whose value is `text`.
fn quote_str(text: &str) -> String {
    proc_macro2::Literal::string(text).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinew_api::tokenize;

    fn expand(name: &str, input: &str) -> Result<String, MacroExpansionError> {
        expand_builtin(name, &tokenize(input).unwrap()).map(|s| s.to_string())
    }

    #[test]
    fn stringify() {
        spoor::init();

        assert_eq!(expand("stringify", "a + b").unwrap(), "\"a + b\"");
        assert_eq!(expand("stringify", "f(\"x\")").unwrap(), "\"f (\\\"x\\\")\"");
        assert_eq!(expand("stringify", "").unwrap(), "\"\"");
    }

    #[test]
    fn concat() {
        spoor::init();

        assert_eq!(
            expand("concat", "\"a\", 'b', 1, -2.5, true, 0x10u8, r#\"\"q\"\"#,").unwrap(),
            "\"ab1-2.5true16\\\"q\\\"\""
        );
        assert_eq!(expand("concat", "\"tab\\there\"").unwrap(), "\"tab\\there\"");
        assert_eq!(expand("concat", "").unwrap(), "\"\"");
    }

    #[test]
    fn concat_decodes_like_rustc() {
        spoor::init();

        // a continuation only skips ASCII whitespace
        assert_eq!(
            expand("concat", "\"a\\\n  \u{a0}b\"").unwrap(),
            proc_macro2::Literal::string("a\u{a0}b").to_string()
        );
        assert_eq!(expand("concat", "'\\u{1F600}', \"\\x41\"").unwrap(), "\"\u{1F600}A\"");
        assert_eq!(expand("concat", "1_000i64, 0b11, 2.5f32").unwrap(), "\"100032.5\"");
    }

    #[test]
    fn concat_rejects() {
        spoor::init();

        for input in &["x", "\"a\" \"b\"", "b\"bytes\"", "-\"s\"", "(1)", "1,,", "-"] {
            assert_eq!(
                expand("concat", input),
                Err(MacroExpansionError::BuiltinMacroExpansionError),
                "{}",
                input
            );
        }
    }

    #[test]
    fn unsupported() {
        spoor::init();

        assert_eq!(BuiltinMacro::find("env"), Some(BuiltinMacro::Unsupported));
        assert_eq!(BuiltinMacro::find("vec"), None);
        assert_eq!(
            expand("include_str", "\"foo.txt\""),
            Err(MacroExpansionError::BuiltinMacroExpansionError)
        );
        assert_eq!(
            expand("not_a_builtin", ""),
            Err(MacroExpansionError::BuiltinMacroExpansionError)
        );
    }
}
