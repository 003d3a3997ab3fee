//! Algorithm to consume a macro input stream, saving matched fragments to `Binding`s as we go.
//!
//! Based heavily on libsyntax_ext's
//! [macro transcription code](https://github.com/rust-lang/rust/blob/12806b7/src/libsyntax/ext/tt/transcribe.rs).
//!
//! Matching never backtracks into a fragment: once `$e:expr` has taken its tokens they're gone,
//! like in rustc. Repetitions are greedy, and every iteration is tried on a copy of the cursor
//! with its own bindings, so a failed iteration leaves no trace.

use super::ast::{self, FragSpec};
use super::bridge;
use super::DeclLimits;
use proc_macro2 as pm2;
use sinew_api::errors::MacroMatchingError;
use sinew_api::tokens::{Leaf, LitKind, Spacing, TokenTree};
use sinew_api::{Map, Tokenized};
use smol_str::SmolStr;
use std::fmt;
use syn::parse::discouraged::Speculative;
use syn::parse::{ParseStream, Parser};
use syn::Token;
use tracing::trace;

/// A fragment binding.
///
/// Every fragment in a matcher is mapped to a tree of bindings, one level per enclosing
/// repetition.
///
/// For example, if we have:
///
/// `$({$($value:expr),+})+`
///
/// We can match:
/// `{1,2,3} {4,5} {6,7,8,9}`
///
/// Which will set `$value`'s `Binding` to:
///
/// ```no_build
/// [
///     [`1`, `2`, `3`],
///     [`4`, `5`],
///     [`6`, `7`, `8`, `9`],
/// ]
/// ```
#[derive(Clone, PartialEq, Eq)]
pub enum Binding {
    Fragment(Fragment),
    /// One entry per iteration of the enclosing repetition.
    Nested(Vec<Binding>),
}

/// The tokens matched by one `$name:spec`.
#[derive(Clone, PartialEq, Eq)]
pub struct Fragment {
    pub tokens: Vec<TokenTree>,
    pub spec: FragSpec,
}

impl fmt::Debug for Binding {
    fn fmt(&self, w: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Binding::Nested(bs) => {
                write!(w, "[")?;
                for (i, b) in bs.iter().enumerate() {
                    if i > 0 {
                        write!(w, ", ")?;
                    }
                    write!(w, "{:?}", b)?;
                }
                write!(w, "]")?;
            }
            Binding::Fragment(fragment) => {
                let text = sinew_api::Subtree::invisible(fragment.tokens.clone()).to_string();
                write!(w, "`{}`", text)?;
            }
        }
        Ok(())
    }
}

pub type Bindings = Map<SmolStr, Binding>;

/// Match `matcher` against the whole of `call`. The call's own root delimiter, if any, is
/// not part of the input.
pub fn consume(
    call: &Tokenized,
    matcher: &ast::MatcherSeq,
    limits: &DeclLimits,
) -> Result<Bindings, MacroMatchingError> {
    let (result, syn_trees) = consume_counted(call, matcher, limits);
    trace!(syn_trees, "matching done");
    result
}

/// [`consume`], also returning how many token trees were handed to `syn` along the way.
fn consume_counted(
    call: &Tokenized,
    matcher: &ast::MatcherSeq,
    limits: &DeclLimits,
) -> (Result<Bindings, MacroMatchingError>, usize) {
    let end_offset = match call.subtree.delimiter {
        Some(d) => call.offset_of(d.close),
        None => call.map.text_len(),
    };
    let mut stomach = Stomach {
        call,
        limits,
        lowered: Map::default(),
        syn_trees: 0,
    };
    let mut cursor = Cursor {
        tts: &call.subtree.token_trees,
        pos: 0,
        end_offset,
    };
    let mut bindings = Bindings::default();
    let result = matcher
        .consume(&mut stomach, &mut cursor, &mut bindings)
        .and_then(|()| {
            if cursor.is_empty() {
                Ok(bindings)
            } else {
                Err(MacroMatchingError::ExtraInput {
                    offset: cursor.offset(call),
                })
            }
        });
    (result, stomach.syn_trees)
}

/// Trees offered to `syn` on the first try at a fragment.
const SYN_WINDOW: usize = 32;

/// How far past the end of a fragment `syn` may look before deciding the fragment is over.
const SYN_LOOKAHEAD: usize = 8;

/// A token sequence lowered for `syn`.
struct Lowered {
    trees: Vec<Option<pm2::TokenTree>>,
    /// For each position, where the run of lowerable trees starting there ends.
    run_end: Vec<usize>,
}

impl Lowered {
    fn new(tts: &[TokenTree]) -> Lowered {
        let trees = bridge::lower_each(tts);
        let mut run_end = vec![trees.len(); trees.len()];
        for i in (0..trees.len()).rev() {
            run_end[i] = if trees[i].is_none() {
                i
            } else {
                run_end.get(i + 1).copied().unwrap_or(trees.len())
            };
        }
        Lowered { trees, run_end }
    }
}

/// State shared by one matching run.
struct Stomach<'t> {
    call: &'t Tokenized,
    limits: &'t DeclLimits,
    /// `proc_macro2` versions of token sequences we've handed to `syn`, keyed by slice address.
    lowered: Map<usize, Lowered>,
    syn_trees: usize,
}

impl<'t> Stomach<'t> {
    /// Bind a consumed fragment to a name.
    fn bind(
        &self,
        bindings: &mut Bindings,
        name: &SmolStr,
        binding: Binding,
        cursor: &Cursor<'t>,
    ) -> Result<(), MacroMatchingError> {
        if bindings.contains_key(name) {
            return Err(MacroMatchingError::Nesting {
                offset: cursor.offset(self.call),
                variable: name.to_string(),
            });
        }
        bindings.insert(name.clone(), binding);
        Ok(())
    }

    /// How many token trees at the cursor `syn` accepts as a `spec`, if any.
    ///
    /// `syn` only sees a window of the input, doubled until the fragment ends well inside it
    /// (or the window covers everything), so matching a long run of fragments stays linear.
    fn parse_with_syn(&mut self, cursor: &Cursor<'t>, spec: FragSpec) -> Option<usize> {
        let lowered = self
            .lowered
            .entry(cursor.tts.as_ptr() as usize)
            .or_insert_with(|| Lowered::new(cursor.tts));
        // nothing past a tree that can't be lowered is offered
        let available = match lowered.run_end.get(cursor.pos) {
            Some(end) => end - cursor.pos,
            None => 0,
        };
        let mut window = SYN_WINDOW;
        loop {
            let whole = window >= available;
            let len = window.min(available);
            let input: pm2::TokenStream = lowered.trees[cursor.pos..cursor.pos + len]
                .iter()
                .flatten()
                .cloned()
                .collect();
            self.syn_trees += len;
            let parsed = Parser::parse2(
                |stream: ParseStream| -> syn::Result<usize> {
                    parse_fragment(spec, stream)?;
                    let rest: pm2::TokenStream = stream.parse()?;
                    Ok(rest.into_iter().count())
                },
                input,
            );
            match parsed {
                Ok(remaining) if whole || remaining >= SYN_LOOKAHEAD => return Some(len - remaining),
                Err(_) if whole => return None,
                _ => window *= 2,
            }
        }
    }
}

/// A position in a sequence of token trees.
#[derive(Clone, Copy)]
struct Cursor<'t> {
    tts: &'t [TokenTree],
    pos: usize,
    /// Offset reported when we run off the end.
    end_offset: usize,
}

impl<'t> Cursor<'t> {
    fn peek(&self) -> Option<&'t TokenTree> {
        self.tts.get(self.pos)
    }

    fn peek_nth(&self, n: usize) -> Option<&'t TokenTree> {
        self.tts.get(self.pos + n)
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.tts.len()
    }

    fn offset(&self, call: &Tokenized) -> usize {
        self.peek()
            .and_then(TokenTree::first_id)
            .map_or(self.end_offset, |id| call.offset_of(id))
    }
}

trait Consumer {
    fn consume<'t>(
        &self,
        inv: &mut Stomach<'t>,
        cursor: &mut Cursor<'t>,
        bindings: &mut Bindings,
    ) -> Result<(), MacroMatchingError>;
}

impl Consumer for ast::MatcherSeq {
    fn consume<'t>(
        &self,
        inv: &mut Stomach<'t>,
        cursor: &mut Cursor<'t>,
        bindings: &mut Bindings,
    ) -> Result<(), MacroMatchingError> {
        for matcher in &self.0 {
            matcher.consume(inv, cursor, bindings)?;
        }
        Ok(())
    }
}

impl Consumer for ast::Matcher {
    fn consume<'t>(
        &self,
        inv: &mut Stomach<'t>,
        cursor: &mut Cursor<'t>,
        bindings: &mut Bindings,
    ) -> Result<(), MacroMatchingError> {
        match self {
            ast::Matcher::Group(i) => i.consume(inv, cursor, bindings),
            ast::Matcher::Leaf(i) => i.consume(inv, cursor, bindings),
            ast::Matcher::Fragment(i) => i.consume(inv, cursor, bindings),
            ast::Matcher::Repetition(i) => i.consume(inv, cursor, bindings),
        }
    }
}

impl Consumer for Leaf {
    fn consume<'t>(
        &self,
        inv: &mut Stomach<'t>,
        cursor: &mut Cursor<'t>,
        _bindings: &mut Bindings,
    ) -> Result<(), MacroMatchingError> {
        let offset = cursor.offset(inv.call);
        match cursor.peek() {
            None => Err(MacroMatchingError::EndOfInput { offset }),
            Some(TokenTree::Leaf(actual)) if leaf_eq(self, actual) => {
                cursor.pos += 1;
                Ok(())
            }
            Some(actual) => Err(unmatched(
                self.kind_name(),
                self.to_string(),
                actual,
                offset,
            )),
        }
    }
}

/// Spacing is ignored: `= >` matches `=>`.
fn leaf_eq(expected: &Leaf, actual: &Leaf) -> bool {
    match (expected, actual) {
        (Leaf::Ident(a), Leaf::Ident(b)) => a.text == b.text && a.is_raw == b.is_raw,
        (Leaf::Literal(a), Leaf::Literal(b)) => a.text == b.text,
        (Leaf::Punct(a), Leaf::Punct(b)) => a.char == b.char,
        _ => false,
    }
}

fn unmatched(
    expected_kind: &str,
    expected_text: String,
    actual: &TokenTree,
    offset: usize,
) -> MacroMatchingError {
    let (actual_kind, actual_text) = match actual {
        TokenTree::Leaf(leaf) => (leaf.kind_name(), leaf.to_string()),
        TokenTree::Subtree(s) => (
            "group",
            s.delimiter
                .map(|d| d.kind.open_char().to_string())
                .unwrap_or_default(),
        ),
    };
    MacroMatchingError::UnmatchedToken {
        offset,
        expected_kind: expected_kind.to_string(),
        expected_text,
        actual_kind: actual_kind.to_string(),
        actual_text,
    }
}

impl Consumer for ast::Group {
    fn consume<'t>(
        &self,
        inv: &mut Stomach<'t>,
        cursor: &mut Cursor<'t>,
        bindings: &mut Bindings,
    ) -> Result<(), MacroMatchingError> {
        let offset = cursor.offset(inv.call);
        let subtree = match cursor.peek() {
            None => return Err(MacroMatchingError::EndOfInput { offset }),
            Some(TokenTree::Subtree(s)) if s.delimiter.map(|d| d.kind) == Some(self.delimiter) => s,
            Some(actual) => {
                return Err(unmatched(
                    "group",
                    self.delimiter.open_char().to_string(),
                    actual,
                    offset,
                ))
            }
        };
        let mut inner = Cursor {
            tts: &subtree.token_trees,
            pos: 0,
            end_offset: subtree
                .delimiter
                .map_or(offset, |d| inv.call.offset_of(d.close)),
        };
        self.inner.consume(inv, &mut inner, bindings)?;
        if !inner.is_empty() {
            return Err(MacroMatchingError::ExtraInput {
                offset: inner.offset(inv.call),
            });
        }
        cursor.pos += 1;
        Ok(())
    }
}

impl Consumer for ast::Sep {
    fn consume<'t>(
        &self,
        inv: &mut Stomach<'t>,
        cursor: &mut Cursor<'t>,
        bindings: &mut Bindings,
    ) -> Result<(), MacroMatchingError> {
        for leaf in &self.0 {
            leaf.consume(inv, cursor, bindings)?;
        }
        Ok(())
    }
}

impl Consumer for ast::Repetition {
    fn consume<'t>(
        &self,
        inv: &mut Stomach<'t>,
        cursor: &mut Cursor<'t>,
        bindings: &mut Bindings,
    ) -> Result<(), MacroMatchingError> {
        let mut iterations: Vec<Bindings> = vec![];
        while !cursor.is_empty() && iterations.len() < inv.limits.max_repetitions {
            let mut attempt = *cursor;
            let mut current = Bindings::default();
            if !iterations.is_empty() && self.sep.consume(inv, &mut attempt, &mut current).is_err() {
                break;
            }
            let before = attempt.pos;
            if self.inner.consume(inv, &mut attempt, &mut current).is_err() {
                // a trailing separator is left for whatever comes next
                break;
            }
            if attempt.pos == before {
                return Err(MacroMatchingError::EmptyGroup {
                    offset: cursor.offset(inv.call),
                });
            }
            *cursor = attempt;
            iterations.push(current);
            if self.kind == ast::RepeatKind::Question {
                break;
            }
        }
        if self.kind == ast::RepeatKind::Plus && iterations.is_empty() {
            return Err(MacroMatchingError::TooFewGroupElements {
                offset: cursor.offset(inv.call),
            });
        }
        trace!(iterations = iterations.len(), "matched repetition");

        for var in &self.vars {
            let nested = iterations
                .iter_mut()
                .map(|iteration| {
                    iteration
                        .remove(var)
                        .unwrap_or_else(|| Binding::Nested(vec![]))
                })
                .collect();
            inv.bind(bindings, var, Binding::Nested(nested), cursor)?;
        }
        Ok(())
    }
}

impl Consumer for ast::Fragment {
    fn consume<'t>(
        &self,
        inv: &mut Stomach<'t>,
        cursor: &mut Cursor<'t>,
        bindings: &mut Bindings,
    ) -> Result<(), MacroMatchingError> {
        let offset = cursor.offset(inv.call);
        if cursor.is_empty() && self.spec != FragSpec::Visibility {
            return Err(MacroMatchingError::EndOfInput { offset });
        }
        let taken = match self.spec {
            FragSpec::TokenTree => Some(token_tree_len(cursor)),
            FragSpec::Ident => match cursor.peek() {
                Some(TokenTree::Leaf(Leaf::Ident(ident))) if ident.text != "_" => Some(1),
                _ => None,
            },
            FragSpec::Lifetime => lifetime_len(cursor),
            FragSpec::Literal => literal_len(cursor),
            FragSpec::Visibility if cursor.is_empty() => Some(0),
            spec => inv.parse_with_syn(cursor, spec),
        };
        let taken = match taken {
            Some(0) if self.spec != FragSpec::Visibility => None,
            taken => taken,
        };
        let taken = taken.ok_or_else(|| MacroMatchingError::FragmentIsNotParsed {
            offset,
            variable: self.ident.to_string(),
            kind: self.spec.name().to_string(),
        })?;

        let tokens = cursor.tts[cursor.pos..cursor.pos + taken].to_vec();
        let fragment = Binding::Fragment(Fragment {
            tokens,
            spec: self.spec,
        });
        inv.bind(bindings, &self.ident, fragment, cursor)?;
        cursor.pos += taken;
        Ok(())
    }
}

/// Operators that are a single token to rustc but several `Punct`s to us.
const GLUED: &[&str] = &[
    "<<=", ">>=", "...", "..=", "::", "->", "=>", "==", "!=", "<=", ">=", "&&", "||", "+=", "-=",
    "*=", "/=", "%=", "^=", "&=", "|=", "<<", ">>", "..",
];

/// Number of trees one `tt` takes: lifetimes and multi-character operators count as one.
fn token_tree_len(cursor: &Cursor) -> usize {
    if let Some(n) = lifetime_len(cursor) {
        return n;
    }
    let mut op = String::new();
    let mut n = 0;
    while let Some(TokenTree::Leaf(Leaf::Punct(p))) = cursor.peek_nth(n) {
        op.push(p.char);
        n += 1;
        if p.spacing == Spacing::Alone || n == 3 {
            break;
        }
    }
    while n > 1 {
        if GLUED.contains(&&op[..n]) {
            return n;
        }
        n -= 1;
    }
    1
}

fn lifetime_len(cursor: &Cursor) -> Option<usize> {
    match (cursor.peek(), cursor.peek_nth(1)) {
        (Some(TokenTree::Leaf(Leaf::Punct(p))), Some(TokenTree::Leaf(Leaf::Ident(_))))
            if p.char == '\'' && p.spacing == Spacing::Joint =>
        {
            Some(2)
        }
        _ => None,
    }
}

fn literal_len(cursor: &Cursor) -> Option<usize> {
    match (cursor.peek(), cursor.peek_nth(1)) {
        (Some(TokenTree::Leaf(Leaf::Literal(_))), _) => Some(1),
        (Some(TokenTree::Leaf(Leaf::Ident(ident))), _)
            if !ident.is_raw && (ident.text == "true" || ident.text == "false") =>
        {
            Some(1)
        }
        // only numbers can be negated
        (Some(TokenTree::Leaf(Leaf::Punct(p))), Some(TokenTree::Leaf(Leaf::Literal(lit))))
            if p.char == '-' && matches!(lit.kind, LitKind::Integer | LitKind::Float) =>
        {
            Some(2)
        }
        _ => None,
    }
}

fn parse_fragment(spec: FragSpec, input: ParseStream) -> syn::Result<()> {
    match spec {
        FragSpec::Block => {
            input.parse::<syn::Block>()?;
        }
        FragSpec::Expr => {
            input.parse::<syn::Expr>()?;
        }
        FragSpec::Item => {
            input.parse::<syn::Item>()?;
        }
        FragSpec::Meta => parse_meta(input)?,
        FragSpec::Pattern => parse_pat(input, true)?,
        FragSpec::PatParam => parse_pat(input, false)?,
        FragSpec::Path => {
            input.parse::<syn::Path>()?;
        }
        FragSpec::Statement => parse_stmt(input)?,
        FragSpec::Type => {
            input.parse::<syn::Type>()?;
        }
        FragSpec::Visibility => {
            input.parse::<syn::Visibility>()?;
        }
        FragSpec::Lifetime => {
            input.parse::<syn::Lifetime>()?;
        }
        FragSpec::Ident => {
            input.parse::<syn::Ident>()?;
        }
        FragSpec::Literal => {
            input.parse::<syn::Lit>()?;
        }
        FragSpec::TokenTree => {
            input.parse::<pm2::TokenTree>()?;
        }
    }
    Ok(())
}

fn peek_alternative(input: ParseStream) -> bool {
    input.peek(Token![|]) && !input.peek(Token![||]) && !input.peek(Token![|=])
}

/// A pattern; with `top_alt`, also `A | B` with an optional leading `|`.
fn parse_pat(input: ParseStream, top_alt: bool) -> syn::Result<()> {
    if top_alt && peek_alternative(input) {
        input.parse::<Token![|]>()?;
    }
    input.parse::<syn::Pat>()?;
    while top_alt && peek_alternative(input) {
        input.parse::<Token![|]>()?;
        input.parse::<syn::Pat>()?;
    }
    Ok(())
}

/// Attribute contents: a path, then nothing, a delimited group, or `= expr`.
fn parse_meta(input: ParseStream) -> syn::Result<()> {
    input.call(syn::Path::parse_mod_style)?;
    if input.peek(Token![=]) && !input.peek(Token![==]) && !input.peek(Token![=>]) {
        input.parse::<Token![=]>()?;
        input.parse::<syn::Expr>()?;
    } else if input.peek(syn::token::Paren)
        || input.peek(syn::token::Bracket)
        || input.peek(syn::token::Brace)
    {
        input.parse::<pm2::TokenTree>()?;
    }
    Ok(())
}

/// A statement without its trailing semicolon: a `let`, an item, or an expression.
fn parse_stmt(input: ParseStream) -> syn::Result<()> {
    if input.peek(Token![let]) {
        input.parse::<Token![let]>()?;
        parse_pat(input, true)?;
        if input.peek(Token![:]) && !input.peek(Token![::]) {
            input.parse::<Token![:]>()?;
            input.parse::<syn::Type>()?;
        }
        if input.peek(Token![=]) {
            input.parse::<Token![=]>()?;
            input.parse::<syn::Expr>()?;
            if input.peek(Token![else]) {
                input.parse::<Token![else]>()?;
                input.parse::<syn::Block>()?;
            }
        }
        return Ok(());
    }
    let fork = input.fork();
    if fork.parse::<syn::Item>().is_ok() {
        input.advance_to(&fork);
        return Ok(());
    }
    input.parse::<syn::Expr>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinew_api::tokenize;

    fn consume_text(matcher: &str, input: &str) -> Result<Bindings, MacroMatchingError> {
        let matcher = ast::compile_matcher(&tokenize(matcher).unwrap().subtree.token_trees).unwrap();
        let input = tokenize(input).unwrap();
        consume(&input, &matcher, &DeclLimits::default())
    }

    fn render(bindings: &Bindings, name: &str) -> String {
        format!("{:?}", bindings[name])
    }

    #[test]
    fn full() {
        spoor::init();

        let bindings = consume_text(
            "$(pub fn $name:ident ($($arg:pat : $typ:ty),+) -> $ret:ty;)+",
            "pub fn squared(x: f32) -> f32;
             pub fn atan2(x: f32, y: f32) -> f32;",
        )
        .unwrap();

        assert_eq!(render(&bindings, "name"), "[`squared`, `atan2`]");
        assert_eq!(render(&bindings, "arg"), "[[`x`], [`x`, `y`]]");
        assert_eq!(render(&bindings, "typ"), "[[`f32`], [`f32`, `f32`]]");
        assert_eq!(render(&bindings, "ret"), "[`f32`, `f32`]");
    }

    #[test]
    fn repetition() {
        spoor::init();

        // simple
        consume_text("$(bees)+", "bees bees bees bees bees").unwrap();
        // recursive
        consume_text("$(($($name:ident)+))+", "(jane ben harper) (xanadu xylophone)").unwrap();
        // weird sep (note: this is valid rust code!)
        consume_text("$(_)bees+", "_ bees _ bees _ bees _").unwrap();
        // glued sep
        let bindings = consume_text("$($x:ident)=>*", "a => b => c").unwrap();
        assert_eq!(render(&bindings, "x"), "[`a`, `b`, `c`]");
        // trailing separator rolls back and is left for what follows
        let bindings = consume_text("$($x:ident),* ,", "a, b,").unwrap();
        assert_eq!(render(&bindings, "x"), "[`a`, `b`]");
        // zero iterations still bind their variables
        let bindings = consume_text("$($x:ident)* ;", ";").unwrap();
        assert_eq!(render(&bindings, "x"), "[]");
        // `?` takes at most one
        assert!(matches!(
            consume_text("$($x:ident)?", "a b"),
            Err(MacroMatchingError::ExtraInput { offset: 2 })
        ));
        assert!(matches!(
            consume_text("$($x:ident)+", ""),
            Err(MacroMatchingError::TooFewGroupElements { offset: 0 })
        ));
    }

    #[test]
    fn empty_iteration() {
        spoor::init();

        assert!(matches!(
            consume_text("$($v:vis)*", "x"),
            Err(MacroMatchingError::EmptyGroup { offset: 0 })
        ));
    }

    #[test]
    fn mismatches() {
        spoor::init();

        assert_eq!(
            consume_text("(bees)", "{bees}"),
            Err(MacroMatchingError::UnmatchedToken {
                offset: 0,
                expected_kind: "group".into(),
                expected_text: "(".into(),
                actual_kind: "group".into(),
                actual_text: "{".into(),
            })
        );
        assert_eq!(
            consume_text("a bees", "a wasps"),
            Err(MacroMatchingError::UnmatchedToken {
                offset: 2,
                expected_kind: "identifier".into(),
                expected_text: "bees".into(),
                actual_kind: "identifier".into(),
                actual_text: "wasps".into(),
            })
        );
        assert!(matches!(
            consume_text("!", "?"),
            Err(MacroMatchingError::UnmatchedToken { .. })
        ));
        assert_eq!(
            consume_text("a b", "a"),
            Err(MacroMatchingError::EndOfInput { offset: 1 })
        );
        assert_eq!(
            consume_text("(a) b", "(a c) b"),
            Err(MacroMatchingError::ExtraInput { offset: 3 })
        );
        assert_eq!(
            consume_text("a", "a b"),
            Err(MacroMatchingError::ExtraInput { offset: 2 })
        );
        assert_eq!(
            consume_text("$x:ident $x:ident", "a b"),
            Err(MacroMatchingError::Nesting {
                offset: 2,
                variable: "x".into()
            })
        );
    }

    #[test]
    fn non_terminal_fragments() {
        spoor::init();

        let bindings = consume_text("$x:expr", "1 + 1 * (37 + _umlaut[&|| {}])").unwrap();
        assert_eq!(render(&bindings, "x"), "`1 + 1 * (37 + _umlaut [&|| {}])`");

        // expressions stop at `,` and `=>`
        let bindings = consume_text("$a:expr , $b:expr => $c:expr", "f(x), y.z => -1").unwrap();
        assert_eq!(render(&bindings, "a"), "`f (x)`");
        assert_eq!(render(&bindings, "b"), "`y . z`");
        assert_eq!(render(&bindings, "c"), "`- 1`");

        assert_eq!(
            consume_text("$x:expr", "struct"),
            Err(MacroMatchingError::FragmentIsNotParsed {
                offset: 0,
                variable: "x".into(),
                kind: "expr".into()
            })
        );
        assert_eq!(
            consume_text("a $x:ty", "a"),
            Err(MacroMatchingError::EndOfInput { offset: 1 })
        );
    }

    #[test]
    fn token_trees() {
        spoor::init();

        let bindings = consume_text("$($t:tt)*", "'a => >>= { x } -").unwrap();
        assert_eq!(render(&bindings, "t"), "[`'a`, `=>`, `>>=`, `{x}`, `-`]");
    }

    #[test]
    fn match_literal() {
        spoor::init();

        assert!(consume_text("\"hello\"", "\"hello\"").is_ok());
        assert!(consume_text("\"hello\"", "\"goodbye\"").is_err());
        let bindings = consume_text("$a:literal $b:literal $c:literal", "-1 true 'c'").unwrap();
        assert_eq!(render(&bindings, "a"), "`- 1`");
        assert_eq!(render(&bindings, "b"), "`true`");
        assert!(consume_text("$a:literal", "x").is_err());
        assert!(consume_text("$i:ident", "_").is_err());
    }

    #[test]
    fn fragments_longer_than_a_window() {
        spoor::init();

        let sum = vec!["1"; 100].join(" + ");
        let bindings = consume_text("$e:expr ; $i:ident", &format!("{} ; x", sum)).unwrap();
        assert_eq!(render(&bindings, "e"), format!("`{}`", sum));

        let long_type = format!("Vec<{}>", vec!["u8"; 60].join(", "));
        let bindings = consume_text("$t:ty , $e:expr", &format!("{} , {}", long_type, sum)).unwrap();
        assert_eq!(render(&bindings, "e"), format!("`{}`", sum));
        assert!(consume_text("$e:expr", &format!("{} +", sum)).is_err());
    }

    #[test]
    fn long_repetitions_stay_linear() {
        spoor::init();

        let matcher = ast::compile_matcher(&tokenize("$($e:expr),*").unwrap().subtree.token_trees).unwrap();
        for &n in &[1000usize, 4000] {
            let input = (0..n).map(|i| format!("a{} + {}", i, i)).collect::<Vec<_>>().join(", ");
            let input = tokenize(&input).unwrap();
            let (result, syn_trees) = consume_counted(&input, &matcher, &DeclLimits::default());
            match result.unwrap().get("e") {
                Some(Binding::Nested(items)) => assert_eq!(items.len(), n),
                other => panic!("unexpected: {:?}", other),
            }
            assert!(syn_trees <= 2 * n * SYN_WINDOW, "{} trees for {} items", syn_trees, n);
        }
    }

    #[test]
    fn negative_literals() {
        spoor::init();

        for number in &["-1", "-0x1f", "-2.5", "-1e3", "-7u8"] {
            let bindings = consume_text("$l:literal", number).unwrap();
            assert_eq!(render(&bindings, "l"), format!("`- {}`", &number[1..]));
        }
        for other in &["-\"s\"", "-'c'", "-b'c'", "-b\"s\"", "-r\"s\"", "-true"] {
            assert!(consume_text("$l:literal", other).is_err(), "{}", other);
        }
        // still fine as two separate tokens
        assert!(consume_text("- $l:literal", "-\"s\"").is_ok());
    }

    #[test]
    fn all_fragment_specifiers() {
        spoor::init();

        let ok = |matcher: &str, input: &str| {
            if let Err(err) = consume_text(matcher, input) {
                panic!("{} didn't match {}: {}", matcher, input, err);
            }
        };

        ok("$thing:block", "{ return; }");
        ok("$thing:expr", "{ 1 + \"hello\" }");
        ok("$thing:ident", "zanzibar");
        ok("$thing:item", "type X<T> = B;");
        ok("$thing:lifetime", "'short");
        ok("$thing:literal", "3.14159f64");
        ok("$thing:meta", "frag");
        ok("$thing:meta", "derive(Debug, Clone)");
        ok("$thing:meta", "doc = \"hi\"");
        ok("$thing:pat", "Banana(ocelot, ..)");
        ok("$thing:pat", "Some(1) | None");
        ok("$thing:pat_param", "x");
        ok("$thing:path", "::f::x<i32>::y<'a>");
        ok("$thing:stmt", "let x: u32 = 5");
        ok("$thing:stmt", "struct S;");
        ok("$thing:stmt", "x += 1");
        ok("$thing:tt", "{ banana }");
        ok("$thing:ty", "&[impl Banana<'a, f32> + Copy + ?Sized]");
        ok("$thing:vis", "pub(crate)");
        ok("$thing:vis", "");
        ok("$thing:vis struct", "struct");

        assert!(consume_text("$thing:pat_param", "A | B").is_err());
        assert!(consume_text("$thing:stmt", "break;").is_err());
    }
}
