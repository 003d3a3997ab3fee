//! Lowering of `sinew_api` token trees into `proc_macro2` ones, so that non-trivial fragments
//! (`expr`, `ty`, `pat`, ...) can be recognized with `syn`'s parsers.
//!
//! Lowering is per tree: one `proc_macro2` tree for each of ours, so the number of trees a
//! `syn` parser consumed maps straight back to a position in our input. A tree that can't be
//! represented (a malformed identifier, say, or groups nested past `MAX_NESTING`) lowers to
//! `None`; parsers never see past it.

use proc_macro2 as pm2;
use sinew_api::tokens::{DelimiterKind, Leaf, Spacing, Subtree, TokenTree, MAX_NESTING};
use std::str::FromStr;

/// Every character `proc_macro2` accepts as punctuation.
const PUNCT_CHARS: &str = "~!@#$%^&*-=+|;:,<.>/?'";

/// Raw identifiers that aren't allowed.
const NOT_RAW: &[&str] = &["_", "super", "self", "Self", "crate"];

/// Lower each tree of `tts` separately.
pub fn lower_each(tts: &[TokenTree]) -> Vec<Option<pm2::TokenTree>> {
    tts.iter().map(lower).collect()
}

/// Lower a whole sequence; `None` if any tree can't be lowered.
pub fn lower_all(tts: &[TokenTree]) -> Option<pm2::TokenStream> {
    lower_seq(tts, 0)
}

pub fn lower(tt: &TokenTree) -> Option<pm2::TokenTree> {
    lower_nested(tt, 0)
}

fn lower_seq(tts: &[TokenTree], depth: usize) -> Option<pm2::TokenStream> {
    tts.iter().map(|tt| lower_nested(tt, depth)).collect()
}

fn lower_nested(tt: &TokenTree, depth: usize) -> Option<pm2::TokenTree> {
    match tt {
        TokenTree::Leaf(leaf) => lower_leaf(leaf),
        TokenTree::Subtree(_) if depth >= MAX_NESTING => None,
        TokenTree::Subtree(subtree) => lower_subtree(subtree, depth + 1).map(pm2::TokenTree::Group),
    }
}

fn lower_subtree(subtree: &Subtree, depth: usize) -> Option<pm2::Group> {
    let delimiter = match subtree.delimiter.map(|d| d.kind) {
        Some(DelimiterKind::Parenthesis) => pm2::Delimiter::Parenthesis,
        Some(DelimiterKind::Brace) => pm2::Delimiter::Brace,
        Some(DelimiterKind::Bracket) => pm2::Delimiter::Bracket,
        None => pm2::Delimiter::None,
    };
    Some(pm2::Group::new(delimiter, lower_seq(&subtree.token_trees, depth)?))
}

fn lower_leaf(leaf: &Leaf) -> Option<pm2::TokenTree> {
    match leaf {
        Leaf::Ident(ident) => {
            // `$crate` only exists between expansions; to a parser it's a plain path root
            let text = if ident.text == "$crate" {
                "crate"
            } else {
                &ident.text
            };
            lower_ident(text, ident.is_raw).map(pm2::TokenTree::Ident)
        }
        Leaf::Literal(literal) => pm2::Literal::from_str(&literal.text)
            .ok()
            .map(pm2::TokenTree::Literal),
        Leaf::Punct(punct) => {
            if !PUNCT_CHARS.contains(punct.char) {
                return None;
            }
            let spacing = match punct.spacing {
                Spacing::Alone => pm2::Spacing::Alone,
                Spacing::Joint => pm2::Spacing::Joint,
            };
            Some(pm2::TokenTree::Punct(pm2::Punct::new(punct.char, spacing)))
        }
    }
}

fn lower_ident(text: &str, is_raw: bool) -> Option<pm2::Ident> {
    if is_raw {
        if NOT_RAW.contains(&text) {
            return None;
        }
        return lex_ident(&format!("r#{}", text));
    }
    if is_plain_ascii_ident(text) {
        return Some(pm2::Ident::new(text, pm2::Span::call_site()));
    }
    lex_ident(text)
}

fn is_plain_ascii_ident(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => (),
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Let the lexer decide; it never panics, unlike `Ident::new`.
fn lex_ident(text: &str) -> Option<pm2::Ident> {
    let mut trees = pm2::TokenStream::from_str(text).ok()?.into_iter();
    match (trees.next(), trees.next()) {
        (Some(pm2::TokenTree::Ident(ident)), None) => Some(ident),
        _ => None,
    }
}
