//! Source text → token tree, with a map from token ids back to byte ranges.
//!
//! Lexing is delegated to `proc_macro2`'s fallback lexer; this module only assigns ids and
//! converts its line/column positions into UTF-8 byte offsets. Doc comments come out of the
//! lexer already lowered to `#[doc = "..."]`.

use crate::tokens::{
    Delimiter, DelimiterKind, Ident, Leaf, Literal, Punct, Spacing, Subtree, TokenId, TokenIdAlloc, TokenTree,
    MAX_NESTING,
};
use crate::Map;
use proc_macro2 as pm2;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TokenizeError {
        Lex(message: String) {
            display("failed to tokenize: {}", message)
        }
        TooDeep {
            display("failed to tokenize: groups nested deeper than {}", MAX_NESTING)
        }
        OutOfIds {
            display("failed to tokenize: ran out of token ids")
        }
    }
}

/// A half-open byte range in some source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> TextRange {
        TextRange { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// Where every token of a tokenized text came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenMap {
    ranges: Map<TokenId, TextRange>,
    text_len: usize,
}

impl TokenMap {
    pub fn insert(&mut self, id: TokenId, range: TextRange) {
        self.ranges.insert(id, range);
    }

    pub fn range_of(&self, id: TokenId) -> Option<TextRange> {
        self.ranges.get(&id).copied()
    }

    /// Byte offset of the start of a token, if it has one in this text.
    pub fn offset_of(&self, id: TokenId) -> Option<usize> {
        self.range_of(id).map(|r| r.start)
    }

    /// The smallest token covering `offset`.
    pub fn token_at(&self, offset: usize) -> Option<TokenId> {
        self.ranges
            .iter()
            .filter(|(_, range)| range.contains(offset))
            .min_by_key(|(id, range)| (range.len(), **id))
            .map(|(id, _)| *id)
    }

    /// Length of the tokenized text; the offset reported for "ran out of input".
    pub fn text_len(&self) -> usize {
        self.text_len
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// A token tree together with the source positions of its tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tokenized {
    pub subtree: Subtree,
    pub map: TokenMap,
}

impl Tokenized {
    /// Wrap a tree that has no source text (synthesized, or received over the wire).
    /// Every offset derived from it is 0.
    pub fn synthetic(subtree: Subtree) -> Tokenized {
        Tokenized {
            subtree,
            map: TokenMap::default(),
        }
    }

    /// Byte offset to report for a token; falls back to 0 for tokens without a source range.
    pub fn offset_of(&self, id: TokenId) -> usize {
        self.map.offset_of(id).unwrap_or(0)
    }
}

/// Tokenize `text` into an invisible root subtree, numbering ids from 0.
pub fn tokenize(text: &str) -> Result<Tokenized, TokenizeError> {
    tokenize_with(text, &mut TokenIdAlloc::default())
}

/// Tokenize `text`, drawing ids from `ids`.
pub fn tokenize_with(text: &str, ids: &mut TokenIdAlloc) -> Result<Tokenized, TokenizeError> {
    let mut lowering = Lowering {
        lines: LineIndex::new(text),
        ids,
        map: TokenMap {
            ranges: Map::default(),
            text_len: text.len(),
        },
    };
    let lowered = pm2::TokenStream::from_str(text)
        .map_err(|e| TokenizeError::Lex(e.to_string()))
        .and_then(|stream| lowering.lower_stream(stream, 0));
    // positions are all in the map by now
    forget_lexed_sources();
    let token_trees = lowered?;
    Ok(Tokenized {
        subtree: Subtree::invisible(token_trees),
        map: lowering.map,
    })
}

struct Lowering<'a> {
    lines: LineIndex<'a>,
    ids: &'a mut TokenIdAlloc,
    map: TokenMap,
}

impl Lowering<'_> {
    fn lower_stream(
        &mut self,
        stream: pm2::TokenStream,
        depth: usize,
    ) -> Result<Vec<TokenTree>, TokenizeError> {
        if depth > MAX_NESTING {
            return Err(TokenizeError::TooDeep);
        }
        let mut result = vec![];
        for tt in stream {
            match tt {
                pm2::TokenTree::Group(group) => {
                    let kind = match group.delimiter() {
                        pm2::Delimiter::Parenthesis => Some(DelimiterKind::Parenthesis),
                        pm2::Delimiter::Brace => Some(DelimiterKind::Brace),
                        pm2::Delimiter::Bracket => Some(DelimiterKind::Bracket),
                        pm2::Delimiter::None => None,
                    };
                    let open = match kind {
                        Some(kind) => Some((kind, self.id_for(group.span_open())?)),
                        None => None,
                    };
                    let inner = self.lower_stream(group.stream(), depth + 1)?;
                    // close ids come after the contents so ids stay in source order
                    let delimiter = match open {
                        Some((kind, open)) => {
                            let close = self.id_for(group.span_close())?;
                            Some(Delimiter::new(kind, open, close))
                        }
                        None => None,
                    };
                    result.push(TokenTree::Subtree(Subtree::new(delimiter, inner)));
                }
                pm2::TokenTree::Ident(ident) => {
                    let id = self.id_for(ident.span())?;
                    result.push(Ident::new(&ident.to_string(), id).into());
                }
                pm2::TokenTree::Punct(punct) => {
                    let id = self.id_for(punct.span())?;
                    let spacing = match punct.spacing() {
                        pm2::Spacing::Alone => Spacing::Alone,
                        pm2::Spacing::Joint => Spacing::Joint,
                    };
                    result.push(
                        Punct {
                            char: punct.as_char(),
                            spacing,
                            id,
                        }
                        .into(),
                    );
                }
                pm2::TokenTree::Literal(literal) => {
                    let id = self.id_for(literal.span())?;
                    result.push(TokenTree::Leaf(Leaf::Literal(Literal::new(
                        &literal.to_string(),
                        id,
                    ))));
                }
            }
        }
        Ok(result)
    }

    fn id_for(&mut self, span: pm2::Span) -> Result<TokenId, TokenizeError> {
        let id = self.ids.alloc().ok_or(TokenizeError::OutOfIds)?;
        let start = self.lines.offset(span.start());
        let end = self.lines.offset(span.end());
        self.map.insert(id, TextRange::new(start, end.max(start)));
        Ok(id)
    }
}

/// Let `proc_macro2` free the source text it keeps for every string it has lexed on this thread.
/// Spans lexed on this thread before the call can't report positions afterwards, so only call
/// this with no lexed tokens in use.
pub fn forget_lexed_sources() {
    pm2::extra::invalidate_current_thread_spans();
}

/// Converts `proc_macro2` line/column pairs (1-based lines, columns in chars) to byte offsets.
struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> LineIndex<'a> {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        LineIndex { text, line_starts }
    }

    fn offset(&self, pos: pm2::LineColumn) -> usize {
        let line = match pos.line.checked_sub(1).and_then(|l| self.line_starts.get(l)) {
            Some(start) => *start,
            None => return self.text.len(),
        };
        self.text[line..]
            .char_indices()
            .nth(pos.column)
            .map_or(self.text.len(), |(i, _)| line + i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{LitKind, WalkEvent};

    #[test]
    fn ids_are_monotonic_and_mapped() {
        let text = "foo(bar, 1)";
        let tokenized = tokenize(text).unwrap();
        let debug = tokenized.subtree.to_debug_string(true);
        assert_eq!(
            debug,
            "SUBTREE $\n  IDENT   foo #0\n  SUBTREE () #1 #5\n    IDENT   bar #2\n    PUNCH   , [alone] #3\n    LITERAL 1 #4\n"
        );
        let range = tokenized.map.range_of(TokenId(2)).unwrap();
        assert_eq!(&text[range.start..range.end], "bar");
        assert_eq!(tokenized.map.offset_of(TokenId(5)), Some(10));
        assert_eq!(tokenized.map.token_at(5), Some(TokenId(2)));
        assert_eq!(tokenized.map.text_len(), text.len());
    }

    #[test]
    fn non_ascii_offsets() {
        let text = "\"Привет\" мир";
        let tokenized = tokenize(text).unwrap();
        let lit = tokenized.map.range_of(TokenId(0)).unwrap();
        assert_eq!(&text[lit.start..lit.end], "\"Привет\"");
        let ident = tokenized.map.range_of(TokenId(1)).unwrap();
        assert_eq!(&text[ident.start..ident.end], "мир");
        match &tokenized.subtree.token_trees[0] {
            TokenTree::Leaf(Leaf::Literal(l)) => {
                assert_eq!(l.text, "\"Привет\"");
                assert_eq!(l.kind, LitKind::Str);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn multiline_offsets() {
        let text = "a\n  bc\n d";
        let tokenized = tokenize(text).unwrap();
        assert_eq!(tokenized.map.offset_of(TokenId(1)), Some(4));
        assert_eq!(tokenized.map.offset_of(TokenId(2)), Some(8));
    }

    #[test]
    fn lifetimes_and_raw_idents() {
        let tokenized = tokenize("'a r#type").unwrap();
        assert_eq!(
            tokenized.subtree.to_debug_string(false),
            "SUBTREE $\n  PUNCH   ' [joint]\n  IDENT   a\n  IDENT   r#type\n"
        );
    }

    #[test]
    fn doc_comments_become_attributes() {
        let tokenized = tokenize("/// hi\nstruct S;").unwrap();
        assert_eq!(tokenized.subtree.to_string(), "# [doc = \" hi\"] struct S ;");
    }

    #[test]
    fn lex_error() {
        assert!(matches!(tokenize("(]"), Err(TokenizeError::Lex(_))));
        assert!(matches!(tokenize("\"open"), Err(TokenizeError::Lex(_))));
    }

    #[test]
    fn deep_nesting() {
        let nested = |depth: usize| format!("{}x{}", "(".repeat(depth), ")".repeat(depth));
        let tokenized = tokenize(&nested(MAX_NESTING)).unwrap();
        assert_eq!(tokenized.subtree.depth(), MAX_NESTING + 1);
        assert_eq!(tokenize(&nested(MAX_NESTING + 1)), Err(TokenizeError::TooDeep));
        assert_eq!(tokenize(&nested(100_000)), Err(TokenizeError::TooDeep));
    }

    #[test]
    fn ids_run_out() {
        let mut ids = TokenIdAlloc::new(u32::MAX - 3);
        let tokenized = tokenize_with("a b c", &mut ids).unwrap();
        assert_eq!(tokenized.subtree.max_id(), Some(TokenId(u32::MAX - 1)));
        assert!(!tokenized.subtree.walk().any(|event| match event {
            WalkEvent::Leaf(leaf) => leaf.id().is_unspecified(),
            _ => false,
        }));

        let mut ids = TokenIdAlloc::new(u32::MAX - 3);
        assert_eq!(tokenize_with("a (b) c", &mut ids), Err(TokenizeError::OutOfIds));
    }

    #[test]
    fn repeated_tokenizing() {
        // where the lexer places a fresh text among everything it has seen
        let lexed_span = || {
            let stream = pm2::TokenStream::from_str("x").unwrap();
            stream.into_iter().next().map(|tt| format!("{:?}", tt.span()))
        };
        forget_lexed_sources();
        let first = lexed_span();
        for i in 0..1000 {
            let text = format!("a{} + b", i);
            let tokenized = tokenize(&text).unwrap();
            assert_eq!(tokenized.map.offset_of(TokenId(2)), Some(text.len() - 1));
        }
        assert!(tokenize("\"open").is_err());
        // nothing is kept from any of those texts
        assert_eq!(lexed_span(), first);
    }
}
