//! A parser for `macro_rules!` bodies, over `sinew_api` token trees.
//!
//!>    MacroRulesDefinition :
//!>       macro_rules ! IDENTIFIER MacroRulesDef
//!>    MacroRulesDef :
//!>          ( MacroRules ) ;
//!>       , \[ MacroRules \] ;
//!>       , { MacroRules }
//!>    MacroRules :
//!>       MacroRule ( ; MacroRule )\* ;\?
//!>    MacroRule :
//!>       MacroMatcher => MacroTranscriber
//!>    MacroMatcher :
//!>          ( MacroMatch\* )
//!>       , [ MacroMatch\* ]
//!>       , { MacroMatch\* }
//!>    MacroMatch :
//!>          Token[except $ and delimiters]
//!>       , MacroMatcher
//!>       , $ IDENTIFIER : MacroFragSpec
//!>       , $ ( MacroMatch\+ ) MacroRepSep\? MacroRepOp
//!>    MacroFragSpec :
//!>          block , expr , ident , item , lifetime , literal
//!>       , meta , pat , path , stmt , tt , ty , vis
//!>    MacroRepSep :
//!>       Tokenexcept delimiters and repetition operators
//!>    MacroRepOp[2018+] :
//!>       * , + , ?[2018+]
//!>    MacroTranscriber :
//!>       DelimTokenTree
//!
//! Arms are split eagerly (a malformed arm list is a definition error), but each arm's
//! matcher and transcriber are only compiled the first time the arm is tried.

use once_cell::sync::OnceCell;
use sinew_api::tokens::{Delimiter, DelimiterKind, Leaf, Spacing, Subtree, TokenTree, MAX_NESTING};
use smol_str::SmolStr;
use std::fmt;

quick_error! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum AstError {
        MalformedArms(reason: &'static str) {
            display("malformed macro_rules! arms: {}", reason)
        }
        Pattern(reason: String) {
            display("malformed macro pattern: {}", reason)
        }
        Template(reason: String) {
            display("malformed macro template: {}", reason)
        }
    }
}

/// A full `macro_rules!` definition.
#[derive(Debug)]
pub struct MacroDef {
    pub name: Option<SmolStr>,
    pub rules: Vec<MacroRule>,
}

/// An individual arm, consisting of a matcher and a transcriber.
pub struct MacroRule {
    pub pattern: Subtree,
    pub template: Subtree,
    matcher: OnceCell<Result<MatcherSeq, AstError>>,
    transcriber: OnceCell<Result<TranscribeSeq, AstError>>,
}

impl fmt::Debug for MacroRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}) => {{{}}}", self.pattern, self.template)
    }
}

impl MacroRule {
    pub fn new(pattern: Subtree, template: Subtree) -> MacroRule {
        MacroRule {
            pattern,
            template,
            matcher: OnceCell::new(),
            transcriber: OnceCell::new(),
        }
    }

    pub fn matcher(&self) -> Result<&MatcherSeq, &AstError> {
        self.matcher
            .get_or_init(|| compile_matcher(&self.pattern.token_trees))
            .as_ref()
    }

    pub fn transcriber(&self) -> Result<&TranscribeSeq, &AstError> {
        self.transcriber
            .get_or_init(|| compile_transcriber(&self.template.token_trees))
            .as_ref()
    }
}

impl MacroDef {
    pub fn from_arms(rules: Vec<MacroRule>) -> MacroDef {
        MacroDef { name: None, rules }
    }

    /// Parse the body of a `macro_rules!` (the part inside the outer delimiters; the root
    /// delimiter of `body`, if any, is ignored).
    pub fn parse(body: &Subtree) -> Result<MacroDef, AstError> {
        let mut rules = vec![];
        let mut tts = body.token_trees.iter().peekable();
        while let Some(tt) = tts.next() {
            let pattern = match tt {
                TokenTree::Subtree(s) if s.delimiter.is_some() => s.clone(),
                _ => return Err(AstError::MalformedArms("expected a delimited matcher")),
            };
            match (tts.next(), tts.next()) {
                (
                    Some(TokenTree::Leaf(Leaf::Punct(eq))),
                    Some(TokenTree::Leaf(Leaf::Punct(gt))),
                ) if eq.char == '=' && eq.spacing == Spacing::Joint && gt.char == '>' => (),
                _ => return Err(AstError::MalformedArms("expected `=>`")),
            }
            let template = match tts.next() {
                Some(TokenTree::Subtree(s)) if s.delimiter.is_some() => s.clone(),
                _ => return Err(AstError::MalformedArms("expected a delimited transcriber")),
            };
            rules.push(MacroRule::new(pattern, template));
            match tts.peek() {
                Some(TokenTree::Leaf(Leaf::Punct(p))) if p.char == ';' => {
                    tts.next();
                }
                None => (),
                Some(_) => return Err(AstError::MalformedArms("expected `;` between arms")),
            }
        }
        Ok(MacroDef { name: None, rules })
    }

    /// Parse a whole `macro_rules! name { ... }` item.
    pub fn parse_item(item: &Subtree) -> Result<MacroDef, AstError> {
        let tts = &item.token_trees;
        match tts.as_slice() {
            [TokenTree::Leaf(Leaf::Ident(kw)), TokenTree::Leaf(Leaf::Punct(bang)), TokenTree::Leaf(Leaf::Ident(name)), TokenTree::Subtree(body), rest @ ..]
                if kw.text == "macro_rules" && bang.char == '!' && body.delimiter.is_some() =>
            {
                let trailing_ok = match rest {
                    [] => true,
                    [TokenTree::Leaf(Leaf::Punct(semi))] => semi.char == ';',
                    _ => false,
                };
                if !trailing_ok {
                    return Err(AstError::MalformedArms("unexpected tokens after macro body"));
                }
                let mut def = MacroDef::parse(body)?;
                def.name = Some(name.text.clone());
                Ok(def)
            }
            _ => Err(AstError::MalformedArms("not a macro_rules! item")),
        }
    }
}

/// A sequence of matchers.
#[derive(Debug)]
pub struct MatcherSeq(pub Vec<Matcher>);

/// A sequence of transcribers.
#[derive(Debug)]
pub struct TranscribeSeq(pub Vec<Transcribe>);

/// All of the possible elements that can be matched in a macro.
#[derive(Debug)]
pub enum Matcher {
    Repetition(Repetition),
    Fragment(Fragment),
    Group(Group),
    /// A literal token (identifier, literal or punctuation) that must appear verbatim.
    Leaf(Leaf),
}

/// A macro repetition `$(...),+`.
#[derive(Debug)]
pub struct Repetition {
    pub inner: MatcherSeq,
    pub sep: Sep,
    pub kind: RepeatKind,
    /// Every fragment name bound anywhere inside `inner`.
    pub vars: Vec<SmolStr>,
}

/// Kind of macro repetition: `+`, `*`, or `?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatKind {
    Plus,
    Star,
    Question,
}

/// A macro repetition separator: a single token, which for multi-character operators like
/// `=>` is several punctuation leaves.
#[derive(Debug, Default)]
pub struct Sep(pub Vec<Leaf>);

/// A binding fragment: `$x:ident`, `$type:ty`, `$next:tt`, etc.
#[derive(Debug)]
pub struct Fragment {
    pub ident: SmolStr,
    pub spec: FragSpec,
}

/// A fragment specifier: `expr`, `stmt`, `block`, `tt`, etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragSpec {
    Block,
    Expr,
    Ident,
    Item,
    Lifetime,
    Literal,
    Meta,
    /// `pat`: top-level or-patterns allowed.
    Pattern,
    /// `pat_param`: no top-level `|`.
    PatParam,
    Path,
    Statement,
    TokenTree,
    Type,
    Visibility,
}

impl FragSpec {
    pub fn from_name(name: &str) -> Option<FragSpec> {
        Some(match name {
            "block" => FragSpec::Block,
            "expr" | "expr_2021" => FragSpec::Expr,
            "ident" => FragSpec::Ident,
            "item" => FragSpec::Item,
            "lifetime" => FragSpec::Lifetime,
            "literal" => FragSpec::Literal,
            "meta" => FragSpec::Meta,
            "pat" => FragSpec::Pattern,
            "pat_param" => FragSpec::PatParam,
            "path" => FragSpec::Path,
            "stmt" => FragSpec::Statement,
            "tt" => FragSpec::TokenTree,
            "ty" => FragSpec::Type,
            "vis" => FragSpec::Visibility,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            FragSpec::Block => "block",
            FragSpec::Expr => "expr",
            FragSpec::Ident => "ident",
            FragSpec::Item => "item",
            FragSpec::Lifetime => "lifetime",
            FragSpec::Literal => "literal",
            FragSpec::Meta => "meta",
            FragSpec::Pattern => "pat",
            FragSpec::PatParam => "pat_param",
            FragSpec::Path => "path",
            FragSpec::Statement => "stmt",
            FragSpec::TokenTree => "tt",
            FragSpec::Type => "ty",
            FragSpec::Visibility => "vis",
        }
    }

    /// Fragments that are spliced back as plain tokens rather than as an opaque group.
    pub fn is_transparent(self) -> bool {
        matches!(
            self,
            FragSpec::Ident | FragSpec::Lifetime | FragSpec::Literal | FragSpec::TokenTree
        )
    }
}

/// A group delimited by some delimiter: (...), {...}, [...].
/// Note: NOT a `Repetition`!
#[derive(Debug)]
pub struct Group {
    pub delimiter: DelimiterKind,
    pub inner: MatcherSeq,
}

/// Everything that a macro can transcribe.
#[derive(Debug)]
pub enum Transcribe {
    Fragment(TranscribeFragment),
    Repetition(TranscribeRepetition),
    Group(TranscribeGroup),
    Leaf(Leaf),
}

/// A repeated transcription, $(...)+.
#[derive(Debug)]
pub struct TranscribeRepetition {
    pub sep: Sep,
    pub inner: TranscribeSeq,
}

/// A transcription of a delimited token tree, `(...)`, `[...]`, `{...}`.
#[derive(Debug)]
pub struct TranscribeGroup {
    pub delimiter: Delimiter,
    pub inner: TranscribeSeq,
}

/// A fragment transcription, `$thing`. Keeps the original tokens so an unbound name can be
/// written back verbatim.
#[derive(Debug)]
pub struct TranscribeFragment {
    pub name: SmolStr,
    pub dollar: Leaf,
    pub ident: Leaf,
}

fn is_punct(tt: Option<&TokenTree>, ch: char) -> bool {
    matches!(tt, Some(TokenTree::Leaf(Leaf::Punct(p))) if p.char == ch)
}

fn repeat_kind(tt: Option<&TokenTree>) -> Option<RepeatKind> {
    match tt {
        Some(TokenTree::Leaf(Leaf::Punct(p))) => match p.char {
            '*' => Some(RepeatKind::Star),
            '+' => Some(RepeatKind::Plus),
            '?' => Some(RepeatKind::Question),
            _ => None,
        },
        _ => None,
    }
}

/// Parse what follows `$( ... )`: an optional separator token and the repetition operator.
/// Returns the separator, the operator and how many token trees were used.
fn sep_and_kind(rest: &[TokenTree]) -> Result<(Sep, RepeatKind, usize), String> {
    if let Some(kind) = repeat_kind(rest.first()) {
        return Ok((Sep::default(), kind, 1));
    }
    let mut sep = vec![];
    let mut used = 0;
    match rest.first() {
        Some(TokenTree::Leaf(Leaf::Punct(p))) if p.char != '$' => {
            // glue joint punctuation into one separator token, e.g. `=>`
            for tt in rest {
                match tt {
                    TokenTree::Leaf(leaf @ Leaf::Punct(p)) => {
                        sep.push(leaf.clone());
                        used += 1;
                        if p.spacing == Spacing::Alone || repeat_kind(rest.get(used)).is_some() {
                            break;
                        }
                    }
                    _ => break,
                }
            }
        }
        Some(TokenTree::Leaf(leaf)) => {
            sep.push(leaf.clone());
            used = 1;
        }
        Some(TokenTree::Subtree(_)) => return Err("a delimited group can't be a separator".into()),
        None => return Err("expected repetition operator".into()),
    }
    // not glued to the repetition operator that follows it
    if let Some(Leaf::Punct(p)) = sep.last_mut() {
        p.spacing = Spacing::Alone;
    }
    match repeat_kind(rest.get(used)) {
        Some(kind) => Ok((Sep(sep), kind, used + 1)),
        None => Err("expected one of `*`, `+` or `?`".into()),
    }
}

pub fn compile_matcher(tts: &[TokenTree]) -> Result<MatcherSeq, AstError> {
    compile_matcher_inner(tts, 0).map_err(AstError::Pattern)
}

fn compile_matcher_inner(tts: &[TokenTree], depth: usize) -> Result<MatcherSeq, String> {
    if depth > MAX_NESTING {
        return Err(too_deep());
    }
    let mut result = vec![];
    let mut i = 0;
    while i < tts.len() {
        match &tts[i] {
            TokenTree::Leaf(Leaf::Punct(p)) if p.char == '$' => match tts.get(i + 1) {
                Some(TokenTree::Subtree(group))
                    if group.delimiter.map(|d| d.kind) == Some(DelimiterKind::Parenthesis) =>
                {
                    let inner = compile_matcher_inner(&group.token_trees, depth + 1)?;
                    if inner.0.is_empty() {
                        return Err("repetition matches empty token tree".into());
                    }
                    let (sep, kind, used) = sep_and_kind(&tts[i + 2..])?;
                    let mut vars = vec![];
                    collect_vars(&inner, &mut vars);
                    result.push(Matcher::Repetition(Repetition {
                        inner,
                        sep,
                        kind,
                        vars,
                    }));
                    i += 2 + used;
                }
                Some(TokenTree::Leaf(Leaf::Ident(ident))) => {
                    if !is_punct(tts.get(i + 2), ':') {
                        return Err(format!("missing fragment specifier for `${}`", ident.text));
                    }
                    let spec = match tts.get(i + 3) {
                        Some(TokenTree::Leaf(Leaf::Ident(spec))) => FragSpec::from_name(&spec.text)
                            .ok_or_else(|| format!("unknown fragment specifier `{}`", spec.text))?,
                        _ => return Err("expected fragment specifier".into()),
                    };
                    result.push(Matcher::Fragment(Fragment {
                        ident: ident.text.clone(),
                        spec,
                    }));
                    i += 4;
                }
                _ => return Err("expected identifier or `(` after `$`".into()),
            },
            TokenTree::Leaf(leaf) => {
                result.push(Matcher::Leaf(leaf.clone()));
                i += 1;
            }
            TokenTree::Subtree(group) => {
                let inner = compile_matcher_inner(&group.token_trees, depth + 1)?;
                match group.delimiter {
                    Some(d) => result.push(Matcher::Group(Group {
                        delimiter: d.kind,
                        inner,
                    })),
                    // invisible groups in a pattern are just their contents
                    None => result.extend(inner.0),
                }
                i += 1;
            }
        }
    }
    Ok(MatcherSeq(result))
}

fn collect_vars(seq: &MatcherSeq, vars: &mut Vec<SmolStr>) {
    for matcher in &seq.0 {
        match matcher {
            Matcher::Fragment(f) => vars.push(f.ident.clone()),
            Matcher::Group(g) => collect_vars(&g.inner, vars),
            Matcher::Repetition(r) => vars.extend(r.vars.iter().cloned()),
            Matcher::Leaf(_) => (),
        }
    }
}

pub fn compile_transcriber(tts: &[TokenTree]) -> Result<TranscribeSeq, AstError> {
    compile_transcriber_inner(tts, 0).map_err(AstError::Template)
}

fn too_deep() -> String {
    format!("groups nested deeper than {}", MAX_NESTING)
}

fn compile_transcriber_inner(tts: &[TokenTree], depth: usize) -> Result<TranscribeSeq, String> {
    if depth > MAX_NESTING {
        return Err(too_deep());
    }
    let mut result = vec![];
    let mut i = 0;
    while i < tts.len() {
        match &tts[i] {
            TokenTree::Leaf(dollar @ Leaf::Punct(p)) if p.char == '$' => match tts.get(i + 1) {
                Some(TokenTree::Subtree(group))
                    if group.delimiter.map(|d| d.kind) == Some(DelimiterKind::Parenthesis) =>
                {
                    let inner = compile_transcriber_inner(&group.token_trees, depth + 1)?;
                    let (sep, _, used) = sep_and_kind(&tts[i + 2..])?;
                    result.push(Transcribe::Repetition(TranscribeRepetition { sep, inner }));
                    i += 2 + used;
                }
                Some(TokenTree::Leaf(ident @ Leaf::Ident(name))) => {
                    result.push(Transcribe::Fragment(TranscribeFragment {
                        name: name.text.clone(),
                        dollar: dollar.clone(),
                        ident: ident.clone(),
                    }));
                    i += 2;
                }
                // a stray `$` is just a token
                _ => {
                    result.push(Transcribe::Leaf(dollar.clone()));
                    i += 1;
                }
            },
            TokenTree::Leaf(leaf) => {
                result.push(Transcribe::Leaf(leaf.clone()));
                i += 1;
            }
            TokenTree::Subtree(group) => {
                let inner = compile_transcriber_inner(&group.token_trees, depth + 1)?;
                match group.delimiter {
                    Some(delimiter) => {
                        result.push(Transcribe::Group(TranscribeGroup { delimiter, inner }))
                    }
                    None => result.extend(inner.0),
                }
                i += 1;
            }
        }
    }
    Ok(TranscribeSeq(result))
}

/// Names of all fragments a transcriber refers to, including inside nested repetitions, in
/// order of first appearance.
pub fn transcribed_names(seq: &TranscribeSeq) -> Vec<&str> {
    fn find_inner<'a>(seq: &'a TranscribeSeq, names: &mut Vec<&'a str>) {
        for item in &seq.0 {
            match item {
                Transcribe::Fragment(fragment) => {
                    if !names.contains(&&*fragment.name) {
                        names.push(&fragment.name);
                    }
                }
                Transcribe::Group(group) => find_inner(&group.inner, names),
                Transcribe::Repetition(rep) => find_inner(&rep.inner, names),
                Transcribe::Leaf(_) => (),
            }
        }
    }
    let mut names = vec![];
    find_inner(seq, &mut names);
    names
}
