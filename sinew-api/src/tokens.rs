//! The token-tree model.
//!
//! A [`Subtree`] is an optionally-delimited sequence of [`TokenTree`]s; leaves are identifiers,
//! literals and single punctuation characters. Every leaf and every delimiter carries a
//! [`TokenId`] so output tokens can be traced back to where they came from. Ids never
//! participate in content comparisons; use [`Subtree::eq_ignoring_ids`] or
//! [`Subtree::discard_ids`] when comparing trees from different sources.
//!
//! Trees are never mutated once built; transformations return new trees.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{self, Write};
use std::hash::{Hash, Hasher};

/// Deepest group nesting accepted anywhere trees are built from outside input: lexing, and
/// compiling or lowering `macro_rules!` definitions.
pub const MAX_NESTING: usize = 256;

/// Opaque token identity, assigned at tokenization time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(pub u32);

impl TokenId {
    /// Id for tokens with no provenance (synthesized, or ids discarded for comparison).
    pub const UNSPECIFIED: TokenId = TokenId(u32::MAX);

    pub fn is_unspecified(self) -> bool {
        self == TokenId::UNSPECIFIED
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_unspecified() {
            write!(f, "#?")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DelimiterKind {
    Parenthesis,
    Brace,
    Bracket,
}

impl DelimiterKind {
    pub fn open_char(self) -> char {
        match self {
            DelimiterKind::Parenthesis => '(',
            DelimiterKind::Brace => '{',
            DelimiterKind::Bracket => '[',
        }
    }

    pub fn close_char(self) -> char {
        match self {
            DelimiterKind::Parenthesis => ')',
            DelimiterKind::Brace => '}',
            DelimiterKind::Bracket => ']',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Delimiter {
    pub kind: DelimiterKind,
    pub open: TokenId,
    pub close: TokenId,
}

impl Delimiter {
    pub fn new(kind: DelimiterKind, open: TokenId, close: TokenId) -> Delimiter {
        Delimiter { kind, open, close }
    }

    pub fn unspecified(kind: DelimiterKind) -> Delimiter {
        Delimiter::new(kind, TokenId::UNSPECIFIED, TokenId::UNSPECIFIED)
    }
}

/// Whether a punctuation character is immediately followed by another one (`=>`, `::`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Spacing {
    Alone,
    Joint,
}

/// An identifier or keyword. `text` never includes the `r#` of a raw identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ident {
    pub text: SmolStr,
    pub is_raw: bool,
    pub id: TokenId,
}

impl Ident {
    /// Build an identifier from its source text, recognizing the `r#` prefix.
    pub fn new(text: &str, id: TokenId) -> Ident {
        match text.strip_prefix("r#") {
            Some(stripped) => Ident {
                text: stripped.into(),
                is_raw: true,
                id,
            },
            None => Ident {
                text: text.into(),
                is_raw: false,
                id,
            },
        }
    }
}

/// Literal categories, as far as the lexer can tell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LitKind {
    Integer,
    Float,
    Char,
    Byte,
    Str,
    /// Raw string, with the number of `#`s.
    StrRaw(u8),
    ByteStr,
    ByteStrRaw(u8),
    CStr,
    CStrRaw(u8),
    /// Something that doesn't look like any literal.
    Err,
}

impl LitKind {
    /// Figure out a literal's kind from its text.
    pub fn classify(text: &str) -> LitKind {
        fn hashes(rest: &str) -> u8 {
            rest.bytes().take_while(|b| *b == b'#').count().min(u8::MAX as usize) as u8
        }
        let bytes = text.as_bytes();
        match bytes {
            [b'"', ..] => LitKind::Str,
            [b'\'', ..] => LitKind::Char,
            [b'b', b'\'', ..] => LitKind::Byte,
            [b'b', b'"', ..] => LitKind::ByteStr,
            [b'b', b'r', b'"' | b'#', ..] => LitKind::ByteStrRaw(hashes(&text[2..])),
            [b'c', b'"', ..] => LitKind::CStr,
            [b'c', b'r', b'"' | b'#', ..] => LitKind::CStrRaw(hashes(&text[2..])),
            [b'r', b'"' | b'#', ..] => LitKind::StrRaw(hashes(&text[1..])),
            [b'0'..=b'9', ..] => classify_number(text),
            _ => LitKind::Err,
        }
    }

    pub fn is_string_like(self) -> bool {
        matches!(
            self,
            LitKind::Str
                | LitKind::StrRaw(_)
                | LitKind::ByteStr
                | LitKind::ByteStrRaw(_)
                | LitKind::CStr
                | LitKind::CStrRaw(_)
        )
    }
}

fn classify_number(text: &str) -> LitKind {
    if text.starts_with("0x") || text.starts_with("0o") || text.starts_with("0b") {
        return LitKind::Integer;
    }
    let bytes = text.as_bytes();
    let mut float = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' | b'_' => i += 1,
            b'.' => {
                float = true;
                i += 1;
            }
            b'e' | b'E' => {
                let next = bytes.get(i + 1).copied();
                match next {
                    Some(b'0'..=b'9') | Some(b'_') => {
                        float = true;
                        i += 1;
                    }
                    Some(b'+') | Some(b'-') => {
                        float = true;
                        i += 2;
                    }
                    _ => break,
                }
            }
            _ => break,
        }
    }
    if float || text[i..].starts_with('f') {
        LitKind::Float
    } else {
        LitKind::Integer
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Literal {
    pub text: SmolStr,
    pub kind: LitKind,
    pub id: TokenId,
}

impl Literal {
    pub fn new(text: &str, id: TokenId) -> Literal {
        Literal {
            text: text.into(),
            kind: LitKind::classify(text),
            id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Punct {
    pub char: char,
    pub spacing: Spacing,
    pub id: TokenId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Leaf {
    Ident(Ident),
    Literal(Literal),
    Punct(Punct),
}

impl Leaf {
    pub fn ident(text: &str, id: TokenId) -> Leaf {
        Leaf::Ident(Ident::new(text, id))
    }

    pub fn literal(text: &str, id: TokenId) -> Leaf {
        Leaf::Literal(Literal::new(text, id))
    }

    pub fn punct(char: char, spacing: Spacing, id: TokenId) -> Leaf {
        Leaf::Punct(Punct { char, spacing, id })
    }

    pub fn id(&self) -> TokenId {
        match self {
            Leaf::Ident(i) => i.id,
            Leaf::Literal(l) => l.id,
            Leaf::Punct(p) => p.id,
        }
    }

    fn id_mut(&mut self) -> &mut TokenId {
        match self {
            Leaf::Ident(i) => &mut i.id,
            Leaf::Literal(l) => &mut l.id,
            Leaf::Punct(p) => &mut p.id,
        }
    }

    /// Short kind name, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Leaf::Ident(_) => "identifier",
            Leaf::Literal(_) => "literal",
            Leaf::Punct(_) => "punctuation",
        }
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Leaf::Ident(i) if i.is_raw => write!(f, "r#{}", i.text),
            Leaf::Ident(i) => f.write_str(&i.text),
            Leaf::Literal(l) => f.write_str(&l.text),
            Leaf::Punct(p) => f.write_char(p.char),
        }
    }
}

impl From<Ident> for Leaf {
    fn from(i: Ident) -> Leaf {
        Leaf::Ident(i)
    }
}
impl From<Literal> for Leaf {
    fn from(l: Literal) -> Leaf {
        Leaf::Literal(l)
    }
}
impl From<Punct> for Leaf {
    fn from(p: Punct) -> Leaf {
        Leaf::Punct(p)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenTree {
    Leaf(Leaf),
    Subtree(Subtree),
}

impl TokenTree {
    /// Id of the first token of this tree (the leaf, or the open delimiter).
    pub fn first_id(&self) -> Option<TokenId> {
        match self {
            TokenTree::Leaf(l) => Some(l.id()),
            TokenTree::Subtree(s) => match &s.delimiter {
                Some(d) => Some(d.open),
                None => s.token_trees.first().and_then(TokenTree::first_id),
            },
        }
    }
}

impl From<Leaf> for TokenTree {
    fn from(l: Leaf) -> TokenTree {
        TokenTree::Leaf(l)
    }
}
impl From<Ident> for TokenTree {
    fn from(i: Ident) -> TokenTree {
        TokenTree::Leaf(Leaf::Ident(i))
    }
}
impl From<Literal> for TokenTree {
    fn from(l: Literal) -> TokenTree {
        TokenTree::Leaf(Leaf::Literal(l))
    }
}
impl From<Punct> for TokenTree {
    fn from(p: Punct) -> TokenTree {
        TokenTree::Leaf(Leaf::Punct(p))
    }
}
impl From<Subtree> for TokenTree {
    fn from(s: Subtree) -> TokenTree {
        TokenTree::Subtree(s)
    }
}

/// A delimited (or invisible, if `delimiter` is `None`) sequence of token trees.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtree {
    pub delimiter: Option<Delimiter>,
    pub token_trees: Vec<TokenTree>,
}

/// Events produced by [`Subtree::walk`].
#[derive(Clone, Copy, Debug)]
pub enum WalkEvent<'a> {
    Enter(&'a Subtree),
    Leaf(&'a Leaf),
    Exit(&'a Subtree),
}

/// Depth-first traversal with an explicit stack, so arbitrarily deep trees are fine.
pub struct Walk<'a> {
    root: Option<&'a Subtree>,
    stack: Vec<(&'a Subtree, usize)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = WalkEvent<'a>;

    fn next(&mut self) -> Option<WalkEvent<'a>> {
        if let Some(root) = self.root.take() {
            self.stack.push((root, 0));
            return Some(WalkEvent::Enter(root));
        }
        let (subtree, idx) = self.stack.last_mut()?;
        let subtree: &'a Subtree = *subtree;
        if *idx < subtree.token_trees.len() {
            let tt = &subtree.token_trees[*idx];
            *idx += 1;
            match tt {
                TokenTree::Leaf(leaf) => Some(WalkEvent::Leaf(leaf)),
                TokenTree::Subtree(inner) => {
                    self.stack.push((inner, 0));
                    Some(WalkEvent::Enter(inner))
                }
            }
        } else {
            self.stack.pop();
            Some(WalkEvent::Exit(subtree))
        }
    }
}

impl Subtree {
    pub fn new(delimiter: Option<Delimiter>, token_trees: Vec<TokenTree>) -> Subtree {
        Subtree {
            delimiter,
            token_trees,
        }
    }

    /// A delimiter-less group; splices its contents into whatever contains it.
    pub fn invisible(token_trees: Vec<TokenTree>) -> Subtree {
        Subtree::new(None, token_trees)
    }

    pub fn is_empty(&self) -> bool {
        self.delimiter.is_none() && self.token_trees.is_empty()
    }

    pub fn walk(&self) -> Walk<'_> {
        Walk {
            root: Some(self),
            stack: vec![],
        }
    }

    /// Number of tokens, counting both delimiters of every delimited subtree.
    pub fn count(&self) -> usize {
        self.walk()
            .map(|event| match event {
                WalkEvent::Leaf(_) => 1,
                WalkEvent::Enter(s) | WalkEvent::Exit(s) => s.delimiter.is_some() as usize,
            })
            .sum()
    }

    /// Maximal subtree nesting; a flat subtree has depth 1.
    pub fn depth(&self) -> usize {
        let mut current = 0usize;
        let mut max = 0usize;
        for event in self.walk() {
            match event {
                WalkEvent::Enter(_) => {
                    current += 1;
                    max = max.max(current);
                }
                WalkEvent::Exit(_) => current -= 1,
                WalkEvent::Leaf(_) => (),
            }
        }
        max
    }

    /// Largest assigned id in this tree, ignoring unspecified ids.
    pub fn max_id(&self) -> Option<TokenId> {
        let mut max = None;
        let mut see = |id: TokenId| {
            if !id.is_unspecified() && max.map_or(true, |m| id > m) {
                max = Some(id);
            }
        };
        for event in self.walk() {
            match event {
                WalkEvent::Leaf(leaf) => see(leaf.id()),
                WalkEvent::Enter(s) => {
                    if let Some(d) = &s.delimiter {
                        see(d.open);
                        see(d.close);
                    }
                }
                WalkEvent::Exit(_) => (),
            }
        }
        max
    }

    /// A copy of this tree with every id passed through `f`.
    pub fn map_ids(&self, mut f: impl FnMut(TokenId) -> TokenId) -> Subtree {
        let mut result = self.clone();
        let mut stack: Vec<&mut Subtree> = vec![&mut result];
        while let Some(Subtree {
            delimiter,
            token_trees,
        }) = stack.pop()
        {
            if let Some(d) = delimiter {
                d.open = f(d.open);
                d.close = f(d.close);
            }
            for tt in token_trees {
                match tt {
                    TokenTree::Leaf(leaf) => {
                        let id = leaf.id_mut();
                        *id = f(*id);
                    }
                    TokenTree::Subtree(inner) => stack.push(inner),
                }
            }
        }
        result
    }

    /// A copy with all ids set to [`TokenId::UNSPECIFIED`].
    pub fn discard_ids(&self) -> Subtree {
        self.map_ids(|_| TokenId::UNSPECIFIED)
    }

    /// Structural equality that ignores token ids.
    pub fn eq_ignoring_ids(&self, other: &Subtree) -> bool {
        self.discard_ids() == other.discard_ids()
    }

    /// A copy where every delimiter-less subtree below the root is spliced into its parent.
    pub fn flatten_invisible(&self) -> Subtree {
        fn flatten_into(tts: &[TokenTree], out: &mut Vec<TokenTree>) {
            for tt in tts {
                match tt {
                    TokenTree::Subtree(s) if s.delimiter.is_none() => {
                        flatten_into(&s.token_trees, out)
                    }
                    TokenTree::Subtree(s) => {
                        let mut inner = Vec::with_capacity(s.token_trees.len());
                        flatten_into(&s.token_trees, &mut inner);
                        out.push(TokenTree::Subtree(Subtree::new(s.delimiter, inner)));
                    }
                    TokenTree::Leaf(l) => out.push(TokenTree::Leaf(l.clone())),
                }
            }
        }
        let mut token_trees = Vec::with_capacity(self.token_trees.len());
        flatten_into(&self.token_trees, &mut token_trees);
        Subtree::new(self.delimiter, token_trees)
    }

    /// One token per line, indented by nesting level. Used for snapshot-style assertions.
    pub fn to_debug_string(&self, with_ids: bool) -> String {
        let mut out = String::new();
        let mut level = 0usize;
        let id = |id: TokenId| {
            if with_ids {
                format!(" {:?}", id)
            } else {
                String::new()
            }
        };
        for event in self.walk() {
            match event {
                WalkEvent::Enter(s) => {
                    indent(&mut out, level);
                    match &s.delimiter {
                        Some(d) => {
                            let _ = write!(
                                out,
                                "SUBTREE {}{}{}{}",
                                d.kind.open_char(),
                                d.kind.close_char(),
                                id(d.open),
                                id(d.close)
                            );
                        }
                        None => out.push_str("SUBTREE $"),
                    }
                    out.push('\n');
                    level += 1;
                }
                WalkEvent::Exit(_) => level -= 1,
                WalkEvent::Leaf(leaf) => {
                    indent(&mut out, level);
                    let _ = match leaf {
                        Leaf::Ident(i) => write!(out, "IDENT   {}{}", leaf, id(i.id)),
                        Leaf::Literal(l) => write!(out, "LITERAL {}{}", l.text, id(l.id)),
                        Leaf::Punct(p) => write!(
                            out,
                            "PUNCH   {} [{}]{}",
                            p.char,
                            match p.spacing {
                                Spacing::Alone => "alone",
                                Spacing::Joint => "joint",
                            },
                            id(p.id)
                        ),
                    };
                    out.push('\n');
                }
            }
        }
        out
    }

    /// Hash of the content, ignoring ids. Stable within a build; used for memo keys.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = fxhash::FxHasher64::default();
        for event in self.walk() {
            match event {
                WalkEvent::Enter(s) => {
                    0u8.hash(&mut hasher);
                    s.delimiter.map(|d| d.kind).hash(&mut hasher);
                }
                WalkEvent::Exit(_) => 1u8.hash(&mut hasher),
                WalkEvent::Leaf(Leaf::Ident(i)) => {
                    2u8.hash(&mut hasher);
                    i.text.hash(&mut hasher);
                    i.is_raw.hash(&mut hasher);
                }
                WalkEvent::Leaf(Leaf::Literal(l)) => {
                    3u8.hash(&mut hasher);
                    l.text.hash(&mut hasher);
                }
                WalkEvent::Leaf(Leaf::Punct(p)) => {
                    4u8.hash(&mut hasher);
                    p.char.hash(&mut hasher);
                    p.spacing.hash(&mut hasher);
                }
            }
        }
        hasher.finish()
    }
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

/// Source text. Joint punctuation is printed without a following space.
impl fmt::Display for Subtree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut need_space = false;
        for event in self.walk() {
            match event {
                WalkEvent::Enter(s) => {
                    if let Some(d) = &s.delimiter {
                        if need_space {
                            f.write_char(' ')?;
                        }
                        f.write_char(d.kind.open_char())?;
                        need_space = false;
                    }
                }
                WalkEvent::Exit(s) => {
                    if let Some(d) = &s.delimiter {
                        f.write_char(d.kind.close_char())?;
                        need_space = true;
                    }
                }
                WalkEvent::Leaf(leaf) => {
                    if need_space {
                        f.write_char(' ')?;
                    }
                    write!(f, "{}", leaf)?;
                    need_space = !matches!(
                        leaf,
                        Leaf::Punct(Punct {
                            spacing: Spacing::Joint,
                            ..
                        })
                    );
                }
            }
        }
        Ok(())
    }
}

/// Hands out fresh, increasing token ids.
#[derive(Clone, Debug, Default)]
pub struct TokenIdAlloc {
    next: u32,
}

impl TokenIdAlloc {
    pub fn new(start: u32) -> TokenIdAlloc {
        TokenIdAlloc { next: start }
    }

    /// An allocator whose ids don't collide with any id in `tree`.
    pub fn after(tree: &Subtree) -> TokenIdAlloc {
        TokenIdAlloc::new(tree.max_id().map_or(0, |id| id.0 + 1))
    }

    /// The next id, or `None` once every id short of [`TokenId::UNSPECIFIED`] is used up.
    pub fn alloc(&mut self) -> Option<TokenId> {
        let id = TokenId(self.next);
        if id.is_unspecified() {
            return None;
        }
        self.next += 1;
        Some(id)
    }

    /// The id the next call to `alloc` will return.
    pub fn peek(&self) -> TokenId {
        TokenId(self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Subtree {
        // foo::bar!{ x , 'a [1.0] }
        Subtree::new(
            Some(Delimiter::new(DelimiterKind::Brace, TokenId(0), TokenId(8))),
            vec![
                Leaf::ident("x", TokenId(1)).into(),
                Leaf::punct(',', Spacing::Alone, TokenId(2)).into(),
                Leaf::punct('\'', Spacing::Joint, TokenId(3)).into(),
                Leaf::ident("a", TokenId(4)).into(),
                Subtree::new(
                    Some(Delimiter::new(DelimiterKind::Bracket, TokenId(5), TokenId(7))),
                    vec![Leaf::literal("1.0", TokenId(6)).into()],
                )
                .into(),
            ],
        )
    }

    #[test]
    fn walk_preserves_boundaries() {
        let tree = sample();
        let events = tree
            .walk()
            .map(|e| match e {
                WalkEvent::Enter(_) => "(".to_string(),
                WalkEvent::Exit(_) => ")".to_string(),
                WalkEvent::Leaf(l) => l.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(events, "( x , ' a ( 1.0 ) )");
    }

    #[test]
    fn counting() {
        let tree = sample();
        assert_eq!(tree.count(), 9);
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.max_id(), Some(TokenId(8)));
        assert_eq!(Subtree::default().count(), 0);
        assert_eq!(Subtree::default().max_id(), None);
        assert_eq!(TokenIdAlloc::after(&tree).alloc(), Some(TokenId(9)));
    }

    #[test]
    fn ids_run_out() {
        let mut ids = TokenIdAlloc::new(u32::MAX - 2);
        assert_eq!(ids.alloc(), Some(TokenId(u32::MAX - 2)));
        assert_eq!(ids.alloc(), Some(TokenId(u32::MAX - 1)));
        assert_eq!(ids.alloc(), None);
        assert_eq!(ids.alloc(), None);
        assert!(ids.peek().is_unspecified());

        let last = Subtree::invisible(vec![Leaf::ident("x", TokenId(u32::MAX - 1)).into()]);
        assert_eq!(TokenIdAlloc::after(&last).alloc(), None);
    }

    #[test]
    fn display_source() {
        assert_eq!(sample().to_string(), "{x , 'a [1.0]}");
    }

    #[test]
    fn id_insensitive_equality() {
        let tree = sample();
        let shifted = tree.map_ids(|id| TokenId(id.0 + 100));
        assert_ne!(tree, shifted);
        assert!(tree.eq_ignoring_ids(&shifted));
        assert_eq!(tree.content_hash(), shifted.content_hash());
        assert!(shifted.discard_ids().max_id().is_none());
    }

    #[test]
    fn debug_string() {
        let tree = Subtree::invisible(vec![
            Leaf::ident("r#match", TokenId(0)).into(),
            Leaf::punct('=', Spacing::Joint, TokenId(1)).into(),
        ]);
        assert_eq!(
            tree.to_debug_string(false),
            "SUBTREE $\n  IDENT   r#match\n  PUNCH   = [joint]\n"
        );
        assert_eq!(
            tree.to_debug_string(true),
            "SUBTREE $\n  IDENT   r#match #0\n  PUNCH   = [joint] #1\n"
        );
    }

    #[test]
    fn flatten() {
        let tree = Subtree::invisible(vec![
            Subtree::invisible(vec![Leaf::ident("x", TokenId(0)).into()]).into(),
            Leaf::punct('+', Spacing::Alone, TokenId(1)).into(),
            Subtree::invisible(vec![Leaf::ident("y", TokenId(2)).into()]).into(),
        ]);
        let flat = tree.flatten_invisible();
        assert_eq!(flat.token_trees.len(), 3);
        assert_eq!(flat.to_string(), "x + y");
    }

    #[test]
    fn literal_kinds() {
        assert_eq!(LitKind::classify("1"), LitKind::Integer);
        assert_eq!(LitKind::classify("1usize"), LitKind::Integer);
        assert_eq!(LitKind::classify("0xff_u8"), LitKind::Integer);
        assert_eq!(LitKind::classify("1.5"), LitKind::Float);
        assert_eq!(LitKind::classify("1e10"), LitKind::Float);
        assert_eq!(LitKind::classify("2f32"), LitKind::Float);
        assert_eq!(LitKind::classify("'c'"), LitKind::Char);
        assert_eq!(LitKind::classify("b'c'"), LitKind::Byte);
        assert_eq!(LitKind::classify("\"s\""), LitKind::Str);
        assert_eq!(LitKind::classify("r##\"s\"##"), LitKind::StrRaw(2));
        assert_eq!(LitKind::classify("br\"s\""), LitKind::ByteStrRaw(0));
        assert_eq!(LitKind::classify("c\"s\""), LitKind::CStr);
        assert_eq!(LitKind::classify("bees"), LitKind::Err);
    }
}
