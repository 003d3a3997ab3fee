//! Dispatches resolved macro calls to the right expander.

use crate::call::{MacroCall, MacroCallBody, MacroResolution, ProcMacroData};
use crate::config::ExpansionConfig;
use crate::memo::{make_room, ExpansionMemo, MemoKey};
use dashmap::DashMap;
use rayon::prelude::*;
use sinew_api::errors::{DeclMacroExpansionError, GetMacroExpansionError};
use sinew_api::tokens::{Subtree, TokenIdAlloc, WalkEvent};
use sinew_api::{TokenId, Tokenized};
use sinew_expand::{expand_builtin, fixup_syntax, DeclMacroExpander, MacroDef};
use sinew_proc::{check_kind, ProcMacroCall, ProcMacroExpander, ProcMacroServer};
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// The macro a call ends up at, once everything that can be checked without expanding is.
enum Target<'a> {
    Decl(&'a Subtree),
    Builtin(&'a str),
    Proc { data: &'a ProcMacroData, artifact: &'a Path },
}

pub struct ExpansionEngine {
    config: ExpansionConfig,
    decl: DeclMacroExpander,
    proc: ProcMacroExpander,
    /// Parsed `macro_rules!` definitions, by hash of their body. The body is kept to tell
    /// colliding hashes apart.
    defs: DashMap<u64, (Subtree, Option<Arc<MacroDef>>)>,
    memo: ExpansionMemo,
}

impl ExpansionEngine {
    /// `proc_server` overrides `config.proc_macro.expander`; without either, proc macro calls fail
    /// with `ExecutableNotFound`.
    pub fn new(config: ExpansionConfig, proc_server: Option<Arc<ProcMacroServer>>) -> ExpansionEngine {
        let proc_server = proc_server.or_else(|| {
            let path = config.proc_macro.expander.as_ref()?;
            let server = ProcMacroServer::locate(path);
            if server.is_none() {
                warn!(path = %path.display(), "proc macro expander not found");
            }
            server.map(Arc::new)
        });
        info!(proc_macros = proc_server.is_some(), "starting expansion engine");
        ExpansionEngine {
            decl: DeclMacroExpander::new(config.decl.clone()),
            proc: ProcMacroExpander::new(proc_server, config.proc_macro.clone()),
            defs: DashMap::default(),
            memo: ExpansionMemo::new(config.memo_capacity),
            config,
        }
    }

    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    pub fn memo(&self) -> &ExpansionMemo {
        &self.memo
    }

    /// Expand one call, or fetch its earlier expansion.
    pub fn expand(
        &self,
        call: &MacroCall,
        resolution: &MacroResolution,
    ) -> Result<Subtree, GetMacroExpansionError> {
        let target = target(call, resolution)?;
        let key = memo_key(call, resolution);
        if let Some(result) = self.memo.get(key, call, resolution) {
            trace!(?key, "memo hit");
            return result;
        }
        let result = self.expand_uncached(call, &target);
        if let Err(err) = &result {
            debug!(%err, "expansion failed");
        }
        self.memo.record(key, call, resolution, &result);
        result
    }

    /// Expand many calls in parallel. Results come back in the order of `calls`.
    pub fn expand_all(
        &self,
        calls: &[(MacroCall, MacroResolution)],
    ) -> Vec<Result<Subtree, GetMacroExpansionError>> {
        calls
            .par_iter()
            .map(|(call, resolution)| self.expand(call, resolution))
            .collect()
    }

    /// The expansion of `call`, only if it's already known; `NotYetExpanded` otherwise.
    pub fn expansion_if_cached(
        &self,
        call: &MacroCall,
        resolution: &MacroResolution,
    ) -> Result<Subtree, GetMacroExpansionError> {
        target(call, resolution)?;
        self.memo
            .get(memo_key(call, resolution), call, resolution)
            .unwrap_or(Err(GetMacroExpansionError::NotYetExpanded))
    }

    fn expand_uncached(&self, call: &MacroCall, target: &Target) -> Result<Subtree, GetMacroExpansionError> {
        // checked by `target`
        let body = call.body.as_ref().ok_or(GetMacroExpansionError::MacroCallSyntax)?;
        match (target, body) {
            (Target::Decl(def_body), MacroCallBody::FunctionLike(tokens)) => {
                let def = self.macro_def(def_body)?;
                Ok(self.decl.expand(&def, tokens)?)
            }
            (Target::Builtin(name), MacroCallBody::FunctionLike(tokens)) => Ok(expand_builtin(name, tokens)?),
            (Target::Decl(_), _) | (Target::Builtin(_), _) => Err(GetMacroExpansionError::MacroCallSyntax),
            (Target::Proc { data, artifact }, body) => self.expand_proc(call, data, artifact, body),
        }
    }

    fn expand_proc(
        &self,
        call: &MacroCall,
        data: &ProcMacroData,
        artifact: &Path,
        body: &MacroCallBody,
    ) -> Result<Subtree, GetMacroExpansionError> {
        let (item, attr) = match body {
            MacroCallBody::FunctionLike(tokens) => (&tokens.subtree, None),
            MacroCallBody::Attribute { item, attr } => (item, Some(attr)),
            MacroCallBody::Derive { item } => (item, None),
        };
        let request = |item: &Subtree| {
            self.proc
                .expand(&ProcMacroCall {
                    lib: artifact,
                    name: &data.name,
                    kind: data.kind,
                    body: item,
                    attributes: attr,
                    env: &call.env,
                })
                .map_err(GetMacroExpansionError::from)
        };

        let item_macro = !matches!(body, MacroCallBody::FunctionLike(_));
        if !call.fixup || !item_macro {
            return request(item);
        }
        let mut ids = fresh_ids(item, attr);
        let fixed = fixup_syntax(item, &mut ids);
        if fixed.fixups.is_empty() {
            return request(item);
        }
        debug!(changes = fixed.fixups.len(), name = %data.name, "fixed up item syntax");
        let expansion = request(&fixed.subtree)?;
        let leftover = fixed.fixups.placeholders_in(&expansion).len();
        if leftover > 0 {
            debug!(leftover, "expansion kept fixup placeholders");
        }
        Ok(fixed.fixups.reverse(&expansion))
    }

    fn macro_def(&self, body: &Subtree) -> Result<Arc<MacroDef>, DeclMacroExpansionError> {
        let hash = tree_hash(body);
        if let Some(entry) = self.defs.get(&hash) {
            let (known, def) = &*entry;
            if known == body {
                return def.clone().ok_or(DeclMacroExpansionError::DefSyntax);
            }
        }
        let def = match MacroDef::parse(body) {
            Ok(def) => Some(Arc::new(def)),
            Err(err) => {
                debug!(%err, "unparseable macro definition");
                None
            }
        };
        if !self.defs.contains_key(&hash) {
            make_room(&self.defs, self.config.memo_capacity);
        }
        self.defs.insert(hash, (body.clone(), def.clone()));
        def.ok_or(DeclMacroExpansionError::DefSyntax)
    }
}

/// Everything that can go wrong before an expander is involved.
fn target<'a>(
    call: &'a MacroCall,
    resolution: &'a MacroResolution,
) -> Result<Target<'a>, GetMacroExpansionError> {
    if !call.cfg_enabled {
        return Err(GetMacroExpansionError::CfgDisabled);
    }
    match resolution {
        MacroResolution::Skipped => return Err(GetMacroExpansionError::Skipped),
        MacroResolution::Unresolved => return Err(GetMacroExpansionError::Unresolved),
        MacroResolution::Macro2 => return Err(GetMacroExpansionError::Macro2IsNotSupported),
        _ => (),
    }
    if call.body.is_none() {
        return Err(GetMacroExpansionError::MacroCallSyntax);
    }
    match resolution {
        MacroResolution::Decl(data) => match &data.body {
            Some(body) => Ok(Target::Decl(body)),
            None => Err(GetMacroExpansionError::MacroDefSyntax),
        },
        MacroResolution::Builtin(name) => Ok(Target::Builtin(name.as_str())),
        MacroResolution::Proc(data) => {
            let artifact = data
                .artifact
                .as_deref()
                .ok_or(GetMacroExpansionError::NoProcMacroArtifact)?;
            check_kind(call.kind, data.kind)?;
            Ok(Target::Proc { data, artifact })
        }
        MacroResolution::Skipped | MacroResolution::Unresolved | MacroResolution::Macro2 => {
            Err(GetMacroExpansionError::Unresolved)
        }
    }
}

/// Ids for fixup tokens that can't be mistaken for anything in the call.
fn fresh_ids(item: &Subtree, attr: Option<&Subtree>) -> TokenIdAlloc {
    let max = item.max_id().into_iter().chain(attr.and_then(Subtree::max_id)).max();
    TokenIdAlloc::new(max.map_or(0, |id| id.0 + 1))
}

fn memo_key(call: &MacroCall, resolution: &MacroResolution) -> MemoKey {
    MemoKey {
        def: def_hash(resolution),
        call: call_hash(call),
    }
}

fn def_hash(resolution: &MacroResolution) -> u64 {
    let mut hasher = fxhash::FxHasher64::default();
    match resolution {
        MacroResolution::Decl(data) => {
            0u8.hash(&mut hasher);
            data.body.as_ref().map(tree_hash).hash(&mut hasher);
        }
        MacroResolution::Builtin(name) => {
            1u8.hash(&mut hasher);
            name.hash(&mut hasher);
        }
        MacroResolution::Proc(data) => {
            2u8.hash(&mut hasher);
            data.name.hash(&mut hasher);
            data.kind.hash(&mut hasher);
            data.artifact.hash(&mut hasher);
        }
        MacroResolution::Macro2 => 3u8.hash(&mut hasher),
        MacroResolution::Unresolved => 4u8.hash(&mut hasher),
        MacroResolution::Skipped => 5u8.hash(&mut hasher),
    }
    hasher.finish()
}

fn call_hash(call: &MacroCall) -> u64 {
    let mut hasher = fxhash::FxHasher64::default();
    call.kind.hash(&mut hasher);
    call.fixup.hash(&mut hasher);
    call.env.hash(&mut hasher);
    match &call.body {
        None => 0u8.hash(&mut hasher),
        Some(MacroCallBody::FunctionLike(Tokenized { subtree, .. })) => {
            1u8.hash(&mut hasher);
            tree_hash(subtree).hash(&mut hasher);
        }
        Some(MacroCallBody::Attribute { item, attr }) => {
            2u8.hash(&mut hasher);
            tree_hash(item).hash(&mut hasher);
            tree_hash(attr).hash(&mut hasher);
        }
        Some(MacroCallBody::Derive { item }) => {
            3u8.hash(&mut hasher);
            tree_hash(item).hash(&mut hasher);
        }
    }
    hasher.finish()
}

/// Content and ids both; expansions carry the call's ids, so calls differing only in ids
/// expand differently.
fn tree_hash(tree: &Subtree) -> u64 {
    let mut hasher = fxhash::FxHasher64::default();
    tree.content_hash().hash(&mut hasher);
    let mut see = |id: TokenId| id.hash(&mut hasher);
    for event in tree.walk() {
        match event {
            WalkEvent::Enter(s) => {
                if let Some(d) = &s.delimiter {
                    see(d.open);
                    see(d.close);
                }
            }
            WalkEvent::Leaf(leaf) => see(leaf.id()),
            WalkEvent::Exit(_) => (),
        }
    }
    hasher.finish()
}
