//! Substitution of matched bindings into an arm's template.

use super::ast::{self, transcribed_names};
use super::consume::{Binding, Bindings};
use super::DeclLimits;
use sinew_api::errors::{DeclMacroExpansionError, MacroMatchingError};
use sinew_api::tokens::{Delimiter, Leaf, Subtree, TokenId, TokenTree};
use std::mem;
use tracing::warn;

/// Maps template token ids into the expansion's id space.
///
/// Call tokens keep their ids; template tokens are shifted past the largest call id, so every
/// id in an expansion says where the token came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdShift {
    shift: u32,
}

/// Where an expansion token came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// A token of the call, with its id in the call.
    Call(TokenId),
    /// A token of the macro definition, with its id in the definition.
    Def(TokenId),
    Unspecified,
}

impl IdShift {
    pub fn for_call(call: &Subtree) -> IdShift {
        IdShift {
            shift: call.max_id().map_or(0, |id| id.0 + 1),
        }
    }

    pub fn apply(self, id: TokenId) -> TokenId {
        if id.is_unspecified() {
            id
        } else {
            TokenId(id.0.saturating_add(self.shift))
        }
    }

    pub fn origin(self, id: TokenId) -> Origin {
        if id.is_unspecified() {
            Origin::Unspecified
        } else if id.0 >= self.shift {
            Origin::Def(TokenId(id.0 - self.shift))
        } else {
            Origin::Call(id)
        }
    }
}

pub fn transcribe(
    bindings: &Bindings,
    rule: &ast::TranscribeSeq,
    ids: IdShift,
    limits: &DeclLimits,
) -> Result<Subtree, DeclMacroExpansionError> {
    let mut output = vec![];
    {
        let mut ctx = Ctx {
            bindings,
            output: &mut output,
            repetition_stack: vec![],
            ids,
            limits,
            emitted: 0,
            depth: 1,
        };
        rule.transcribe(&mut ctx)?;
    }
    Ok(Subtree::invisible(output))
}

struct Ctx<'a> {
    /// The bindings we have access to.
    bindings: &'a Bindings,
    /// The (current) output we're writing to.
    output: &'a mut Vec<TokenTree>,
    /// Where we are within the stack of repetitions.
    repetition_stack: Vec<usize>,
    ids: IdShift,
    limits: &'a DeclLimits,
    /// Tokens written so far, delimiters included.
    emitted: usize,
    depth: usize,
}

impl<'a> Ctx<'a> {
    fn count(&mut self, tokens: usize) -> Result<(), DeclMacroExpansionError> {
        self.emitted += tokens;
        if self.emitted > self.limits.max_tokens {
            warn!(emitted = self.emitted, "macro expansion is too large");
            return Err(DeclMacroExpansionError::TooLargeExpansion);
        }
        Ok(())
    }

    fn write_leaf(&mut self, leaf: &Leaf) -> Result<(), DeclMacroExpansionError> {
        self.count(1)?;
        let mut leaf = leaf.clone();
        match &mut leaf {
            Leaf::Ident(i) => i.id = self.ids.apply(i.id),
            Leaf::Literal(l) => l.id = self.ids.apply(l.id),
            Leaf::Punct(p) => p.id = self.ids.apply(p.id),
        }
        self.output.push(TokenTree::Leaf(leaf));
        Ok(())
    }

    /// Look a binding up at the current repetition position.
    fn lookup(&self, name: &str) -> Option<Result<&'a Binding, ()>> {
        let bindings: &'a Bindings = self.bindings;
        let mut binding = bindings.get(name)?;
        for idx in &self.repetition_stack {
            match binding {
                // bound outside this repetition; the same tokens every time
                Binding::Fragment(_) => break,
                Binding::Nested(items) => match items.get(*idx) {
                    Some(item) => binding = item,
                    None => return Some(Err(())),
                },
            }
        }
        Some(Ok(binding))
    }
}

trait Transcriber {
    fn transcribe(&self, ctx: &mut Ctx) -> Result<(), DeclMacroExpansionError>;
}

impl Transcriber for ast::Transcribe {
    fn transcribe(&self, ctx: &mut Ctx) -> Result<(), DeclMacroExpansionError> {
        match self {
            ast::Transcribe::Fragment(fragment) => fragment.transcribe(ctx),
            ast::Transcribe::Repetition(repetition) => repetition.transcribe(ctx),
            ast::Transcribe::Group(group) => group.transcribe(ctx),
            ast::Transcribe::Leaf(leaf) => ctx.write_leaf(leaf),
        }
    }
}

impl Transcriber for ast::TranscribeSeq {
    fn transcribe(&self, ctx: &mut Ctx) -> Result<(), DeclMacroExpansionError> {
        for t in &self.0 {
            t.transcribe(ctx)?;
        }
        Ok(())
    }
}

impl Transcriber for ast::TranscribeGroup {
    fn transcribe(&self, ctx: &mut Ctx) -> Result<(), DeclMacroExpansionError> {
        ctx.count(2)?;
        ctx.depth += 1;
        if ctx.depth > ctx.limits.max_depth {
            return Err(DeclMacroExpansionError::TooLargeExpansion);
        }

        // store current output on the stack, create a new output for within this group
        let mut output = vec![];
        mem::swap(ctx.output, &mut output);

        // run code
        let inner = self.inner.transcribe(ctx);

        // restore state
        mem::swap(ctx.output, &mut output);
        ctx.depth -= 1;

        // check errors
        inner?;

        let delimiter = Delimiter::new(
            self.delimiter.kind,
            ctx.ids.apply(self.delimiter.open),
            ctx.ids.apply(self.delimiter.close),
        );
        ctx.output
            .push(TokenTree::Subtree(Subtree::new(Some(delimiter), output)));
        Ok(())
    }
}

impl Transcriber for ast::TranscribeRepetition {
    fn transcribe(&self, ctx: &mut Ctx) -> Result<(), DeclMacroExpansionError> {
        if self.inner.0.is_empty() {
            return Err(DeclMacroExpansionError::Matching(vec![
                MacroMatchingError::EmptyGroup { offset: 0 },
            ]));
        }

        let mut reps: Option<usize> = None;
        for frag in transcribed_names(&self.inner) {
            if let Some(Ok(Binding::Nested(items))) = ctx.lookup(frag) {
                match reps {
                    Some(count) if count != items.len() => {
                        return Err(DeclMacroExpansionError::Matching(vec![
                            MacroMatchingError::Nesting {
                                offset: 0,
                                variable: frag.to_string(),
                            },
                        ]));
                    }
                    Some(_) => (),
                    None => reps = Some(items.len()),
                }
            }
            // else: bound outside this repetition, or not at all
        }
        let reps = match reps {
            Some(reps) => reps,
            None => {
                warn!("repetition in macro template repeats no variables");
                return Err(DeclMacroExpansionError::DefSyntax);
            }
        };
        if reps > ctx.limits.max_repetitions {
            return Err(DeclMacroExpansionError::TooLargeExpansion);
        }

        for i in 0..reps {
            if i > 0 {
                for sep in &self.sep.0 {
                    ctx.write_leaf(sep)?;
                }
            }
            ctx.repetition_stack.push(i);
            let ok = self.inner.transcribe(ctx);
            ctx.repetition_stack.pop();
            ok?;
        }

        Ok(())
    }
}

impl Transcriber for ast::TranscribeFragment {
    fn transcribe(&self, ctx: &mut Ctx) -> Result<(), DeclMacroExpansionError> {
        let nesting = || {
            DeclMacroExpansionError::Matching(vec![MacroMatchingError::Nesting {
                offset: 0,
                variable: self.name.to_string(),
            }])
        };
        match ctx.lookup(&self.name) {
            Some(Ok(Binding::Fragment(fragment))) => {
                let size: usize = fragment
                    .tokens
                    .iter()
                    .map(|tt| match tt {
                        TokenTree::Leaf(_) => 1,
                        TokenTree::Subtree(s) => s.count(),
                    })
                    .sum();
                ctx.count(size)?;
                if fragment.spec.is_transparent() {
                    ctx.output.extend(fragment.tokens.iter().cloned());
                } else {
                    ctx.output.push(TokenTree::Subtree(Subtree::invisible(
                        fragment.tokens.clone(),
                    )));
                }
                Ok(())
            }
            Some(Ok(Binding::Nested(_))) | Some(Err(())) => Err(nesting()),
            None if self.name == "crate" => ctx.write_leaf(&Leaf::ident("$crate", self.dollar.id())),
            None => {
                // no binding found, transcribe directly
                ctx.write_leaf(&self.dollar)?;
                ctx.write_leaf(&self.ident)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::consume;
    use super::*;
    use sinew_api::tokenize;

    fn expand_with(
        pattern: &str,
        template: &str,
        input: &str,
        limits: &DeclLimits,
    ) -> Result<Subtree, DeclMacroExpansionError> {
        let matcher = ast::compile_matcher(&tokenize(pattern).unwrap().subtree.token_trees).unwrap();
        let transcriber =
            ast::compile_transcriber(&tokenize(template).unwrap().subtree.token_trees).unwrap();
        let call = tokenize(input).unwrap();
        let bindings = consume::consume(&call, &matcher, limits).unwrap();
        transcribe(&bindings, &transcriber, IdShift::for_call(&call.subtree), limits)
    }

    fn expand(pattern: &str, template: &str, input: &str) -> Result<String, DeclMacroExpansionError> {
        expand_with(pattern, template, input, &DeclLimits::default()).map(|s| s.to_string())
    }

    #[test]
    fn full_macro() {
        spoor::init();

        assert_eq!(
            expand("$($x:ident $y:ident),+", "[$($x)+] [$($y)+]", "a b, c d, e f").unwrap(),
            "[a c e] [b d f]"
        );
    }

    #[test]
    fn separators_and_outer_bindings() {
        spoor::init();

        assert_eq!(
            expand("$f:ident : $($x:expr),*", "$($f($x));*", "g: 1, 2 + 3").unwrap(),
            "g (1) ; g (2 + 3)"
        );
        assert_eq!(expand("$($x:tt)*", "$($x),*", "").unwrap(), "");
    }

    #[test]
    fn opaque_fragments() {
        spoor::init();

        let expansion = expand_with(
            "$e:expr",
            "$e * 2",
            "1 + 1",
            &DeclLimits::default(),
        )
        .unwrap();
        match &expansion.token_trees[0] {
            TokenTree::Subtree(s) => {
                assert!(s.delimiter.is_none());
                assert_eq!(s.token_trees.len(), 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(expansion.flatten_invisible().to_string(), "1 + 1 * 2");
    }

    #[test]
    fn ids() {
        spoor::init();

        // call: `a` is #0; template: `$` #0 `x` #1 `+` #2 `b` #3
        let expansion = expand_with("$x:ident", "$x + b", "a", &DeclLimits::default()).unwrap();
        let shift = IdShift::for_call(&tokenize("a").unwrap().subtree);
        let ids = expansion
            .token_trees
            .iter()
            .filter_map(TokenTree::first_id)
            .map(|id| shift.origin(id))
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec![
                Origin::Call(TokenId(0)),
                Origin::Def(TokenId(2)),
                Origin::Def(TokenId(3))
            ]
        );
    }

    #[test]
    fn dollar_crate_and_unbound() {
        spoor::init();

        let expansion = expand("", "$crate::f($y)", "").unwrap();
        assert_eq!(expansion, "$crate :: f ($ y)");
    }

    #[test]
    fn repetition_errors() {
        spoor::init();

        assert_eq!(
            expand("$($x:ident)* ; $($y:ident)*", "$($x $y)*", "a b ; c"),
            Err(DeclMacroExpansionError::Matching(vec![
                MacroMatchingError::Nesting {
                    offset: 0,
                    variable: "y".into()
                }
            ]))
        );
        assert_eq!(
            expand("$x:ident", "$($x)*", "a"),
            Err(DeclMacroExpansionError::DefSyntax)
        );
        assert_eq!(
            expand("$($x:ident)*", "$x", "a"),
            Err(DeclMacroExpansionError::Matching(vec![
                MacroMatchingError::Nesting {
                    offset: 0,
                    variable: "x".into()
                }
            ]))
        );
        assert_eq!(
            expand("", "$()*", ""),
            Err(DeclMacroExpansionError::Matching(vec![
                MacroMatchingError::EmptyGroup { offset: 0 }
            ]))
        );
    }

    #[test]
    fn limits() {
        spoor::init();

        let tight = DeclLimits {
            max_tokens: 4,
            ..DeclLimits::default()
        };
        assert!(expand_with("$($x:tt)*", "$($x)*", "a b c d", &tight).is_ok());
        assert_eq!(
            expand_with("$($x:tt)*", "$($x $x)*", "a b c d", &tight),
            Err(DeclMacroExpansionError::TooLargeExpansion)
        );
        let shallow = DeclLimits {
            max_depth: 2,
            ..DeclLimits::default()
        };
        assert!(expand_with("", "(a)", "", &shallow).is_ok());
        assert_eq!(
            expand_with("", "((a))", "", &shallow),
            Err(DeclMacroExpansionError::TooLargeExpansion)
        );
    }
}
