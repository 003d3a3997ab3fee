//! Repairs for half-typed code, applied to an item before it's handed to an attribute or
//! derive macro, so the macro sees something it can parse.
//!
//! Only function bodies and other blocks are touched:
//! - a `;` is inserted after a `let` statement that runs into the next statement;
//! - `expr.`, `path::` and `let x =` with nothing after get a placeholder identifier;
//! - a statement that `syn` still can't parse has its smallest broken `(...)`/`[...]` group,
//!   or failing that its whole expression, replaced by a placeholder.
//!
//! Every change gets a fresh token id, so it can be found (and undone) in whatever the macro
//! returns. Input that already parses is never changed.

use crate::decl::bridge;
use sinew_api::tokens::{
    DelimiterKind, Leaf, Spacing, Subtree, TokenId, TokenIdAlloc, TokenTree, WalkEvent,
};
use sinew_api::Map;
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::Token;
use sinew_api::tokenize::forget_lexed_sources;
use tracing::{debug, warn};

/// Identifier standing in for missing or unparseable code.
pub const PLACEHOLDER: &str = "__sinew_fixup";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FixupKind {
    /// The token wasn't in the input.
    Inserted,
    /// The token stands for these input tokens.
    Replaced { original: Vec<TokenTree> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixupChange {
    pub kind: FixupKind,
    /// Id of the inserted token or placeholder.
    pub id: TokenId,
}

/// Everything [`fixup_syntax`] did to one item.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyntaxFixups {
    changes: Vec<FixupChange>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixupOutcome {
    pub subtree: Subtree,
    pub fixups: SyntaxFixups,
}

impl SyntaxFixups {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[FixupChange] {
        &self.changes
    }

    /// Undo the fixups in (an expansion of) the fixed-up tree: inserted tokens are dropped and
    /// placeholders are swapped back for what they replaced.
    pub fn reverse(&self, tree: &Subtree) -> Subtree {
        if self.changes.is_empty() {
            return tree.clone();
        }
        let by_id: Map<TokenId, &FixupKind> = self.changes.iter().map(|c| (c.id, &c.kind)).collect();
        Subtree::new(tree.delimiter, reverse_seq(&tree.token_trees, &by_id))
    }

    /// The fixups whose tokens made it into `tree`, in tree order.
    pub fn placeholders_in(&self, tree: &Subtree) -> Vec<&FixupChange> {
        if self.changes.is_empty() {
            return vec![];
        }
        let by_id: Map<TokenId, &FixupChange> = self.changes.iter().map(|c| (c.id, c)).collect();
        tree.walk()
            .filter_map(|event| match event {
                WalkEvent::Leaf(leaf) => by_id.get(&leaf.id()).copied(),
                _ => None,
            })
            .collect()
    }
}

fn reverse_seq(tts: &[TokenTree], by_id: &Map<TokenId, &FixupKind>) -> Vec<TokenTree> {
    let mut out = Vec::with_capacity(tts.len());
    for tt in tts {
        match tt {
            TokenTree::Leaf(leaf) => match by_id.get(&leaf.id()) {
                Some(FixupKind::Inserted) => (),
                // originals may themselves contain earlier placeholders
                Some(FixupKind::Replaced { original }) => out.extend(reverse_seq(original, by_id)),
                None => out.push(tt.clone()),
            },
            TokenTree::Subtree(s) => out.push(TokenTree::Subtree(Subtree::new(
                s.delimiter,
                reverse_seq(&s.token_trees, by_id),
            ))),
        }
    }
    out
}

/// Repair `item`. Fresh ids come from `ids`, which must not overlap the item's own.
pub fn fixup_syntax(item: &Subtree, ids: &mut TokenIdAlloc) -> FixupOutcome {
    let mut fixer = Fixer {
        ids,
        changes: vec![],
        out_of_ids: false,
    };
    let token_trees = fixer.descend(item.token_trees.clone(), true);
    // `syn` is done with everything lowered for it
    forget_lexed_sources();
    if fixer.out_of_ids {
        warn!("no token ids left for fixups, leaving the item as it is");
        return FixupOutcome {
            subtree: item.clone(),
            fixups: SyntaxFixups::default(),
        };
    }
    if !fixer.changes.is_empty() {
        debug!(changes = fixer.changes.len(), "fixed up item syntax");
    }
    FixupOutcome {
        subtree: Subtree::new(item.delimiter, token_trees),
        fixups: SyntaxFixups {
            changes: fixer.changes,
        },
    }
}

struct Fixer<'a> {
    ids: &'a mut TokenIdAlloc,
    changes: Vec<FixupChange>,
    /// Set once `ids` is exhausted; the whole fixup is abandoned then.
    out_of_ids: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BraceKind {
    /// Statements.
    Block,
    /// Items: the body of an `impl`, `trait` or `mod`.
    Items,
    /// Anything else: struct bodies and literals, match arms, ...
    Other,
}

impl Fixer<'_> {
    fn fresh_id(&mut self) -> TokenId {
        match self.ids.alloc() {
            Some(id) => id,
            None => {
                self.out_of_ids = true;
                TokenId::UNSPECIFIED
            }
        }
    }

    fn inserted(&mut self, leaf: Leaf) -> TokenTree {
        self.changes.push(FixupChange {
            kind: FixupKind::Inserted,
            id: leaf.id(),
        });
        leaf.into()
    }

    fn semicolon(&mut self) -> TokenTree {
        let id = self.fresh_id();
        self.inserted(Leaf::punct(';', Spacing::Alone, id))
    }

    fn placeholder(&mut self) -> TokenTree {
        let id = self.fresh_id();
        self.inserted(Leaf::ident(PLACEHOLDER, id))
    }

    fn replacement(&mut self, original: Vec<TokenTree>) -> TokenTree {
        let id = self.fresh_id();
        self.changes.push(FixupChange {
            kind: FixupKind::Replaced { original },
            id,
        });
        Leaf::ident(PLACEHOLDER, id).into()
    }

    /// Walk a token sequence, repairing every block found in it.
    fn descend(&mut self, tts: Vec<TokenTree>, items_level: bool) -> Vec<TokenTree> {
        let mut out: Vec<TokenTree> = Vec::with_capacity(tts.len());
        let mut fn_pending = false;
        let mut items_pending = false;
        let mut cond_pending = false;
        for tt in tts {
            match tt {
                TokenTree::Leaf(leaf) => {
                    match &leaf {
                        Leaf::Ident(i) if !i.is_raw => match i.text.as_str() {
                            "fn" => fn_pending = true,
                            "impl" | "trait" | "mod" => items_pending = true,
                            "if" | "while" | "for" => cond_pending = true,
                            _ => (),
                        },
                        Leaf::Punct(p) if p.char == ';' => {
                            fn_pending = false;
                            items_pending = false;
                            cond_pending = false;
                        }
                        _ => (),
                    }
                    out.push(TokenTree::Leaf(leaf));
                }
                TokenTree::Subtree(s) => {
                    let is_brace = s.delimiter.map(|d| d.kind) == Some(DelimiterKind::Brace);
                    let inner = if !is_brace {
                        self.descend(s.token_trees, false)
                    } else {
                        let kind = if fn_pending {
                            BraceKind::Block
                        } else if items_pending {
                            BraceKind::Items
                        } else if cond_pending || (!items_level && opens_block(&out)) {
                            BraceKind::Block
                        } else {
                            BraceKind::Other
                        };
                        fn_pending = false;
                        items_pending = false;
                        cond_pending = false;
                        match kind {
                            BraceKind::Block => self.block(s.token_trees),
                            BraceKind::Items => self.descend(s.token_trees, true),
                            BraceKind::Other => self.descend(s.token_trees, false),
                        }
                    };
                    out.push(TokenTree::Subtree(Subtree::new(s.delimiter, inner)));
                }
            }
        }
        out
    }

    fn block(&mut self, tts: Vec<TokenTree>) -> Vec<TokenTree> {
        let tts = self.descend(tts, false);
        let tts = self.statements(tts);
        self.reparse(tts)
    }

    /// Token-level repairs of a block's statements.
    fn statements(&mut self, tts: Vec<TokenTree>) -> Vec<TokenTree> {
        let mut out: Vec<TokenTree> = Vec::with_capacity(tts.len());
        let mut in_let = false;
        let mut stmt_start = true;
        let mut iter = tts.into_iter().peekable();
        while let Some(tt) = iter.next() {
            if in_let && starts_statement(&tt) {
                let semi = self.semicolon();
                out.push(semi);
                in_let = false;
                stmt_start = true;
            }
            if stmt_start && is_ident(&tt, "let") {
                in_let = true;
            }
            let dangling = ends_expression(iter.peek());
            let needs_placeholder = dangling
                && (is_lone_dot(&tt, out.last())
                    || is_path_end(&tt, out.last())
                    || (in_let && is_lone_eq(&tt, out.last())));
            let is_semi = is_punct(&tt, ';');
            stmt_start = is_semi || (!in_let && is_brace(&tt));
            if is_semi {
                in_let = false;
            }
            out.push(tt);
            if needs_placeholder {
                let placeholder = self.placeholder();
                out.push(placeholder);
            }
        }
        if in_let {
            let semi = self.semicolon();
            out.push(semi);
        }
        out
    }

    /// Replace whatever `syn` still rejects.
    fn reparse(&mut self, tts: Vec<TokenTree>) -> Vec<TokenTree> {
        if parses_as_block(&tts) {
            return tts;
        }
        let mut out = Vec::with_capacity(tts.len());
        for stmt in split_statements(tts) {
            if parses_as_block(&stmt) {
                out.extend(stmt);
            } else {
                out.extend(self.repair_statement(stmt));
            }
        }
        out
    }

    fn repair_statement(&mut self, mut stmt: Vec<TokenTree>) -> Vec<TokenTree> {
        while let Some(path) = find_broken_group(&stmt) {
            let group = match group_at(&mut stmt, &path) {
                Some(group) => group,
                None => break,
            };
            let original = std::mem::take(&mut group.token_trees);
            let placeholder = self.replacement(original);
            group.token_trees.push(placeholder);
            if parses_as_block(&stmt) {
                return stmt;
            }
        }

        let end = if stmt.last().map_or(false, |tt| is_punct(tt, ';')) {
            stmt.len() - 1
        } else {
            stmt.len()
        };
        let start = if stmt.first().map_or(false, |tt| is_ident(tt, "let")) {
            let mut eq = None;
            for i in 1..end {
                if is_lone_eq(&stmt[i], Some(&stmt[i - 1])) {
                    eq = Some(i);
                    break;
                }
            }
            eq.map_or(1, |i| i + 1)
        } else {
            0
        };
        let original: Vec<TokenTree> = stmt.drain(start..end).collect();
        let placeholder = if original.is_empty() {
            self.placeholder()
        } else {
            self.replacement(original)
        };
        stmt.insert(start, placeholder);
        stmt
    }
}

/// Whether a `{` right after `out` starts a block expression.
fn opens_block(out: &[TokenTree]) -> bool {
    let prev = match out.last() {
        None => return true,
        Some(prev) => prev,
    };
    match prev {
        TokenTree::Subtree(s) => s.delimiter.map(|d| d.kind) == Some(DelimiterKind::Brace),
        TokenTree::Leaf(Leaf::Punct(p)) => match p.char {
            ';' | ',' | '=' | '|' => true,
            // `=>`
            '>' => matches!(
                out.len().checked_sub(2).and_then(|i| out.get(i)),
                Some(TokenTree::Leaf(Leaf::Punct(eq))) if eq.char == '=' && eq.spacing == Spacing::Joint
            ),
            _ => false,
        },
        TokenTree::Leaf(Leaf::Ident(i)) => {
            !i.is_raw
                && matches!(
                    i.text.as_str(),
                    "else" | "loop" | "unsafe" | "move" | "async" | "try" | "const"
                )
        }
        TokenTree::Leaf(Leaf::Literal(_)) => false,
    }
}

fn is_ident(tt: &TokenTree, text: &str) -> bool {
    matches!(tt, TokenTree::Leaf(Leaf::Ident(i)) if !i.is_raw && i.text == text)
}

fn is_punct(tt: &TokenTree, ch: char) -> bool {
    matches!(tt, TokenTree::Leaf(Leaf::Punct(p)) if p.char == ch)
}

fn is_brace(tt: &TokenTree) -> bool {
    matches!(tt, TokenTree::Subtree(s) if s.delimiter.map(|d| d.kind) == Some(DelimiterKind::Brace))
}

fn is_joint(tt: Option<&TokenTree>, ch: char) -> bool {
    matches!(tt, Some(TokenTree::Leaf(Leaf::Punct(p))) if p.char == ch && p.spacing == Spacing::Joint)
}

fn is_alone(tt: &TokenTree, ch: char) -> bool {
    matches!(tt, TokenTree::Leaf(Leaf::Punct(p)) if p.char == ch && p.spacing == Spacing::Alone)
}

/// A field access `.`, not part of `..`.
fn is_lone_dot(tt: &TokenTree, prev: Option<&TokenTree>) -> bool {
    is_alone(tt, '.') && !is_joint(prev, '.')
}

/// The second `:` of `::`.
fn is_path_end(tt: &TokenTree, prev: Option<&TokenTree>) -> bool {
    is_alone(tt, ':') && is_joint(prev, ':')
}

/// An assignment `=`, not part of `==`, `<=`, `+=`, ...
fn is_lone_eq(tt: &TokenTree, prev: Option<&TokenTree>) -> bool {
    let prev_joint = matches!(prev, Some(TokenTree::Leaf(Leaf::Punct(p))) if p.spacing == Spacing::Joint);
    is_alone(tt, '=') && !prev_joint
}

/// Keywords that can't continue an expression, so they must start a new statement.
fn starts_statement(tt: &TokenTree) -> bool {
    matches!(tt, TokenTree::Leaf(Leaf::Ident(i)) if !i.is_raw && matches!(
        i.text.as_str(),
        "let" | "fn" | "struct" | "enum" | "impl" | "use" | "mod" | "trait" | "static" | "extern" | "pub" | "type"
    ))
}

fn ends_expression(next: Option<&TokenTree>) -> bool {
    match next {
        None => true,
        Some(tt) => is_punct(tt, ';') || starts_statement(tt),
    }
}

fn split_statements(tts: Vec<TokenTree>) -> Vec<Vec<TokenTree>> {
    let mut result = vec![];
    let mut current = vec![];
    for tt in tts {
        let end = is_punct(&tt, ';');
        current.push(tt);
        if end {
            result.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        result.push(current);
    }
    result
}

fn parses_as_block(tts: &[TokenTree]) -> bool {
    match bridge::lower_all(tts) {
        Some(stream) => syn::Block::parse_within.parse2(stream).is_ok(),
        None => false,
    }
}

/// Contents of a `(...)` or `[...]` that could be an expression's: a comma-separated list,
/// or an array repeat `x; n`.
fn parses_as_group_contents(tts: &[TokenTree]) -> bool {
    let stream = match bridge::lower_all(tts) {
        Some(stream) => stream,
        None => return false,
    };
    let list = Punctuated::<syn::Expr, Token![,]>::parse_terminated.parse2(stream.clone());
    if list.is_ok() {
        return true;
    }
    let repeat = |input: syn::parse::ParseStream| -> syn::Result<()> {
        input.parse::<syn::Expr>()?;
        input.parse::<Token![;]>()?;
        input.parse::<syn::Expr>()?;
        Ok(())
    };
    repeat.parse2(stream).is_ok()
}

/// Path (child indices) to the innermost `(...)`/`[...]` whose contents don't parse.
fn find_broken_group(tts: &[TokenTree]) -> Option<Vec<usize>> {
    for (i, tt) in tts.iter().enumerate() {
        if let TokenTree::Subtree(s) = tt {
            if let Some(mut path) = find_broken_group(&s.token_trees) {
                path.insert(0, i);
                return Some(path);
            }
            let kind = s.delimiter.map(|d| d.kind);
            let checked = matches!(kind, Some(DelimiterKind::Parenthesis) | Some(DelimiterKind::Bracket));
            let already_fixed = matches!(
                s.token_trees.as_slice(),
                [TokenTree::Leaf(Leaf::Ident(ident))] if ident.text == PLACEHOLDER
            );
            if checked && !already_fixed && !parses_as_group_contents(&s.token_trees) {
                return Some(vec![i]);
            }
        }
    }
    None
}

fn group_at<'a>(tts: &'a mut [TokenTree], path: &[usize]) -> Option<&'a mut Subtree> {
    let (first, rest) = path.split_first()?;
    match tts.get_mut(*first)? {
        TokenTree::Subtree(s) => {
            if rest.is_empty() {
                Some(s)
            } else {
                group_at(&mut s.token_trees, rest)
            }
        }
        TokenTree::Leaf(_) => None,
    }
}
