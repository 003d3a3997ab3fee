//! `macro_rules!` expansion.
//!
//! A definition is parsed into arms up front ([`MacroDef::parse`]); each arm's matcher and
//! transcriber are compiled the first time it's tried. Expanding a call tries the arms in
//! order: the first one whose matcher accepts the whole input is transcribed, and if none
//! does, every arm's failure is reported.

use serde::{Deserialize, Serialize};
use sinew_api::errors::{DeclMacroExpansionError, MacroMatchingError};
use sinew_api::tokenize::forget_lexed_sources;
use sinew_api::tokens::Subtree;
use sinew_api::Tokenized;
use tracing::{debug, trace};

pub mod ast;
pub mod bridge;
pub mod consume;
pub mod transcribe;

pub use ast::{AstError, MacroDef, MacroRule};
pub use transcribe::{IdShift, Origin};

impl From<AstError> for DeclMacroExpansionError {
    fn from(_: AstError) -> Self {
        DeclMacroExpansionError::DefSyntax
    }
}

/// Bounds on how much work a single expansion may do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclLimits {
    /// Maximum number of tokens in one expansion, delimiters included.
    pub max_tokens: usize,
    /// Maximum subtree nesting of one expansion.
    pub max_depth: usize,
    /// Maximum iterations of any single repetition, when matching or transcribing.
    pub max_repetitions: usize,
}

impl Default for DeclLimits {
    fn default() -> Self {
        DeclLimits {
            max_tokens: 1 << 20,
            max_depth: 256,
            max_repetitions: 65536,
        }
    }
}

/// Expands calls to `macro_rules!` macros.
#[derive(Clone, Debug, Default)]
pub struct DeclMacroExpander {
    limits: DeclLimits,
}

impl DeclMacroExpander {
    pub fn new(limits: DeclLimits) -> Self {
        DeclMacroExpander { limits }
    }

    pub fn limits(&self) -> &DeclLimits {
        &self.limits
    }

    /// Expand one call. The result is always wrapped in an invisible subtree.
    pub fn expand(
        &self,
        def: &MacroDef,
        call: &Tokenized,
    ) -> Result<Subtree, DeclMacroExpansionError> {
        let result = self.try_arms(def, call);
        // fragments lowered for `syn` are all gone by now
        forget_lexed_sources();
        result
    }

    fn try_arms(&self, def: &MacroDef, call: &Tokenized) -> Result<Subtree, DeclMacroExpansionError> {
        let call_start = call
            .subtree
            .token_trees
            .first()
            .and_then(|tt| tt.first_id())
            .map_or(0, |id| call.offset_of(id));

        let mut errors = Vec::with_capacity(def.rules.len());
        for (i, rule) in def.rules.iter().enumerate() {
            let matcher = match rule.matcher() {
                Ok(matcher) => matcher,
                Err(err) => {
                    trace!(arm = i, %err, "skipping arm");
                    errors.push(MacroMatchingError::PatternSyntax { offset: call_start });
                    continue;
                }
            };
            let bindings = match consume::consume(call, matcher, &self.limits) {
                Ok(bindings) => bindings,
                Err(err) => {
                    trace!(arm = i, %err, "arm didn't match");
                    errors.push(err);
                    continue;
                }
            };
            let transcriber = rule.transcriber().map_err(|err| {
                debug!(arm = i, %err, "bad template");
                DeclMacroExpansionError::DefSyntax
            })?;
            // once an arm matched, its result is final
            let expansion = transcribe::transcribe(
                &bindings,
                transcriber,
                IdShift::for_call(&call.subtree),
                &self.limits,
            )?;
            if expansion.depth() > self.limits.max_depth {
                return Err(DeclMacroExpansionError::TooLargeExpansion);
            }
            return Ok(expansion);
        }

        let result = DeclMacroExpansionError::Matching(errors);
        debug!(macro_name = ?def.name, %result, "no arm matched");
        Err(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinew_api::tokenize;

    fn def(text: &str) -> MacroDef {
        MacroDef::parse_item(&tokenize(text).unwrap().subtree).unwrap()
    }

    fn expand(def: &MacroDef, call: &str) -> Result<String, DeclMacroExpansionError> {
        DeclMacroExpander::default()
            .expand(def, &tokenize(call).unwrap())
            .map(|s| s.to_string())
    }

    #[test]
    fn first_matching_arm_wins() {
        spoor::init();

        let def = def("macro_rules! m {
            (a) => (first);
            ($x:ident) => (second $x);
            ($($x:tt)*) => (third);
        }");
        assert_eq!(expand(&def, "a").unwrap(), "first");
        assert_eq!(expand(&def, "b").unwrap(), "second b");
        assert_eq!(expand(&def, "1 2").unwrap(), "third");
    }

    #[test]
    fn lexer_sources_are_released() {
        spoor::init();

        let lexed_span = || {
            let stream: proc_macro2::TokenStream = "x".parse().unwrap();
            stream.into_iter().next().map(|tt| format!("{:?}", tt.span()))
        };
        let def = def("macro_rules! m {
            ($($e:expr),*) => ($($e)+*);
        }");
        forget_lexed_sources();
        let first = lexed_span();
        for i in 0..200 {
            // non-ASCII identifiers and literals are lowered through the lexer
            let call = format!("\"s{}\".len(), ж{} + 1.5", i, i);
            assert!(expand(&def, &call).is_ok());
        }
        assert_eq!(lexed_span(), first);
    }

    #[test]
    fn all_arm_errors_reported() {
        spoor::init();

        let def = def("macro_rules! m {
            (a b c) => ();
            (a) => ();
        }");
        let err = expand(&def, "a b d").unwrap_err();
        assert_eq!(
            err,
            DeclMacroExpansionError::Matching(vec![
                MacroMatchingError::UnmatchedToken {
                    offset: 4,
                    expected_kind: "identifier".into(),
                    expected_text: "c".into(),
                    actual_kind: "identifier".into(),
                    actual_text: "d".into(),
                },
                MacroMatchingError::ExtraInput { offset: 2 },
            ])
        );
        assert_eq!(err.best_matching_error().map(|e| e.offset()), Some(4));
    }

    #[test]
    fn no_arms() {
        spoor::init();

        let def = MacroDef::parse(&tokenize("").unwrap().subtree).unwrap();
        assert_eq!(expand(&def, "x"), Err(DeclMacroExpansionError::Matching(vec![])));
    }

    #[test]
    fn bad_pattern_is_an_arm_error() {
        spoor::init();

        let def = def("macro_rules! m {
            ($x) => ();
            (b) => (ok);
        }");
        assert_eq!(expand(&def, "b").unwrap(), "ok");
        assert_eq!(
            expand(&def, "c"),
            Err(DeclMacroExpansionError::Matching(vec![
                MacroMatchingError::PatternSyntax { offset: 0 },
                MacroMatchingError::UnmatchedToken {
                    offset: 0,
                    expected_kind: "identifier".into(),
                    expected_text: "b".into(),
                    actual_kind: "identifier".into(),
                    actual_text: "c".into(),
                },
            ]))
        );
    }

    #[test]
    fn matched_arm_failure_is_final() {
        spoor::init();

        let def = def("macro_rules! m {
            ($x:ident) => ($($x)*);
            ($x:ident) => (fallback);
        }");
        assert_eq!(expand(&def, "a"), Err(DeclMacroExpansionError::DefSyntax));
    }

    #[test]
    fn recursion_shape() {
        spoor::init();

        // a typical tt-muncher, expanded one step at a time
        let def = def("macro_rules! count {
            () => (0usize);
            ($head:tt $($tail:tt)*) => (1usize + count!($($tail)*));
        }");
        assert_eq!(expand(&def, "a b c").unwrap(), "1usize + count ! (b c)");
        assert_eq!(expand(&def, "").unwrap(), "0usize");
    }

    #[test]
    fn malformed_definition() {
        spoor::init();

        let err: DeclMacroExpansionError = MacroDef::parse(&tokenize("(a) => b").unwrap().subtree)
            .unwrap_err()
            .into();
        assert_eq!(err, DeclMacroExpansionError::DefSyntax);
    }

    #[test]
    fn limits_from_json() {
        spoor::init();

        let limits: DeclLimits = serde_json::from_str(r#"{"max_depth": 3}"#).unwrap();
        assert_eq!(limits.max_depth, 3);
        assert_eq!(limits.max_tokens, DeclLimits::default().max_tokens);
    }
}
