//! Finished expansions, shared between threads.
//!
//! Failures are kept in their binary encoding, the same bytes a persistent cache would store,
//! and only if they're a pure function of the call (see `GetMacroExpansionError::can_cache`).
//!
//! Keys are hashes, so every entry also keeps the call it was made for and a hit only counts if
//! that call is the one being asked about. The memo holds a bounded number of entries; past
//! that, recording a new one drops an arbitrary old one.

use crate::call::{MacroCall, MacroCallBody, MacroResolution};
use dashmap::DashMap;
use sinew_api::errors::{Codec, GetMacroExpansionError};
use sinew_api::tokens::Subtree;
use sinew_api::Tokenized;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{trace, warn};

/// Entries kept when nothing else is configured.
pub const DEFAULT_CAPACITY: usize = 1 << 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemoKey {
    /// Hash of the macro definition.
    pub def: u64,
    /// Hash of the call, token ids included.
    pub call: u64,
}

enum Outcome {
    Expanded(Arc<Subtree>),
    Failed(Vec<u8>),
}

struct Entry {
    call: MacroCall,
    resolution: MacroResolution,
    outcome: Outcome,
}

pub struct ExpansionMemo {
    entries: DashMap<MemoKey, Entry>,
    capacity: usize,
}

impl Default for ExpansionMemo {
    fn default() -> ExpansionMemo {
        ExpansionMemo::new(DEFAULT_CAPACITY)
    }
}

impl ExpansionMemo {
    pub fn new(capacity: usize) -> ExpansionMemo {
        ExpansionMemo {
            entries: DashMap::default(),
            capacity,
        }
    }

    pub fn get(
        &self,
        key: MemoKey,
        call: &MacroCall,
        resolution: &MacroResolution,
    ) -> Option<Result<Subtree, GetMacroExpansionError>> {
        let entry = self.entries.get(&key)?;
        if entry.resolution != *resolution || !same_call(&entry.call, call) {
            trace!(?key, "memo key collision");
            return None;
        }
        match &entry.outcome {
            Outcome::Expanded(subtree) => Some(Ok((**subtree).clone())),
            Outcome::Failed(bytes) => match GetMacroExpansionError::from_bytes(bytes) {
                Ok(err) => Some(Err(err)),
                Err(err) => {
                    warn!(%err, "unreadable memoized error");
                    None
                }
            },
        }
    }

    /// Remember `result`, if it can be reused. Returns whether it was stored.
    pub fn record(
        &self,
        key: MemoKey,
        call: &MacroCall,
        resolution: &MacroResolution,
        result: &Result<Subtree, GetMacroExpansionError>,
    ) -> bool {
        let outcome = match result {
            Ok(subtree) => Outcome::Expanded(Arc::new(subtree.clone())),
            Err(err) if err.can_cache() => Outcome::Failed(err.to_bytes()),
            Err(_) => return false,
        };
        if !self.entries.contains_key(&key) {
            make_room(&self.entries, self.capacity);
        }
        let entry = Entry {
            call: without_positions(call),
            resolution: resolution.clone(),
            outcome,
        };
        self.entries.insert(key, entry);
        true
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear()
    }
}

/// Drop arbitrary entries until there's space for one more under `capacity` (at least 1).
pub(crate) fn make_room<K: Eq + Hash + Clone, V>(map: &DashMap<K, V>, capacity: usize) {
    while map.len() >= capacity.max(1) {
        let victim = map.iter().next().map(|entry| entry.key().clone());
        match victim {
            Some(key) => {
                map.remove(&key);
            }
            None => break,
        }
    }
}

/// Source positions don't change what a call expands to.
fn without_positions(call: &MacroCall) -> MacroCall {
    match &call.body {
        Some(MacroCallBody::FunctionLike(tokens)) => MacroCall {
            body: Some(MacroCallBody::FunctionLike(Tokenized::synthetic(tokens.subtree.clone()))),
            ..call.clone()
        },
        _ => call.clone(),
    }
}

fn same_call(a: &MacroCall, b: &MacroCall) -> bool {
    let same_body = match (&a.body, &b.body) {
        (Some(MacroCallBody::FunctionLike(a)), Some(MacroCallBody::FunctionLike(b))) => {
            a.subtree == b.subtree
        }
        (a, b) => a == b,
    };
    same_body && a.kind == b.kind && a.fixup == b.fixup && a.cfg_enabled == b.cfg_enabled && a.env == b.env
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinew_api::errors::{DeclMacroExpansionError, MacroExpansionError, ProcMacroExpansionError};
    use sinew_api::tokenize;

    fn call(text: &str) -> MacroCall {
        MacroCall::function_like(tokenize(text).unwrap())
    }

    fn stringify() -> MacroResolution {
        MacroResolution::Builtin("stringify".into())
    }

    #[test]
    fn what_is_kept() {
        spoor::init();

        let memo = ExpansionMemo::default();
        let key = |call| MemoKey { def: 1, call };
        let (x, def) = (call("x"), stringify());

        let subtree = tokenize("a + b").unwrap().subtree;
        assert!(memo.record(key(1), &x, &def, &Ok(subtree.clone())));
        assert_eq!(memo.get(key(1), &x, &def), Some(Ok(subtree)));

        let decl: GetMacroExpansionError = DeclMacroExpansionError::TooLargeExpansion.into();
        assert!(memo.record(key(2), &x, &def, &Err(decl.clone())));
        assert_eq!(memo.get(key(2), &x, &def), Some(Err(decl)));

        let proc: GetMacroExpansionError = ProcMacroExpansionError::Timeout(10).into();
        assert!(!memo.record(key(3), &x, &def, &Err(proc)));
        assert!(!memo.record(key(4), &x, &def, &Err(GetMacroExpansionError::Unresolved)));
        assert!(memo.record(key(5), &x, &def, &Err(MacroExpansionError::BuiltinMacroExpansionError.into())));

        assert_eq!(memo.get(key(3), &x, &def), None);
        assert_eq!(memo.len(), 3);
        memo.clear();
        assert!(memo.is_empty());
    }

    #[test]
    fn colliding_keys() {
        spoor::init();

        let memo = ExpansionMemo::default();
        let key = MemoKey { def: 7, call: 7 };
        let (x, y, def) = (call("x"), call("y"), stringify());
        let x_expansion = tokenize("\"x\"").unwrap().subtree;

        assert!(memo.record(key, &x, &def, &Ok(x_expansion.clone())));
        assert_eq!(memo.get(key, &y, &def), None);
        assert_eq!(memo.get(key, &x, &MacroResolution::Builtin("concat".into())), None);
        assert_eq!(memo.get(key, &x.clone().with_env("A", "1"), &def), None);
        assert_eq!(memo.get(key, &x, &def), Some(Ok(x_expansion)));

        // the same tokens somewhere else in the file are the same call
        let moved = MacroCall::function_like(Tokenized::synthetic(tokenize("x").unwrap().subtree));
        assert!(memo.get(key, &moved, &def).is_some());

        // the later call takes the slot over
        let y_expansion = tokenize("\"y\"").unwrap().subtree;
        assert!(memo.record(key, &y, &def, &Ok(y_expansion.clone())));
        assert_eq!(memo.get(key, &x, &def), None);
        assert_eq!(memo.get(key, &y, &def), Some(Ok(y_expansion)));
        assert_eq!(memo.len(), 1);
    }

    #[test]
    fn bounded() {
        spoor::init();

        let memo = ExpansionMemo::new(8);
        let (x, def) = (call("x"), stringify());
        let expansion = Ok(tokenize("\"x\"").unwrap().subtree);
        for i in 0..100 {
            assert!(memo.record(MemoKey { def: 0, call: i }, &x, &def, &expansion));
            assert!(memo.len() <= 8);
        }
        assert_eq!(memo.len(), 8);
        // the newest entry always survives
        assert_eq!(memo.get(MemoKey { def: 0, call: 99 }, &x, &def), Some(expansion.clone()));

        // rewriting a key that's present doesn't evict anything
        assert!(memo.record(MemoKey { def: 0, call: 99 }, &x, &def, &expansion));
        assert_eq!(memo.len(), 8);
    }
}
