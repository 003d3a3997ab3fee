use sinew::{DeclMacroData, ExpansionConfig, ExpansionEngine, GetMacroExpansionError, MacroCall, MacroResolution};
use sinew_api::errors::{DeclMacroExpansionError, MacroExpansionError};
use sinew_api::tokenize;
use sinew_api::tokens::Subtree;

fn decl(arms: &str) -> MacroResolution {
    MacroResolution::Decl(DeclMacroData {
        body: Some(tokenize(arms).unwrap().subtree),
    })
}

fn call(text: &str) -> MacroCall {
    MacroCall::function_like(tokenize(text).unwrap())
}

fn text(expansion: &Subtree) -> String {
    expansion.flatten_invisible().to_string()
}

#[test]
fn two_idents() {
    spoor::init();

    // macro_rules! my_macro { ($a:ident, $b:ident) => ($a + $b) }
    // my_macro!(x, y)
    let engine = ExpansionEngine::new(ExpansionConfig::default(), None);
    let expansion = engine
        .expand(&call("x, y"), &decl("($a:ident, $b:ident) => ($a + $b)"))
        .unwrap();
    assert_eq!(text(&expansion), "x + y");
    assert!(expansion
        .flatten_invisible()
        .eq_ignoring_ids(&tokenize("x + y").unwrap().subtree));
}

#[test]
fn repetition_counts() {
    spoor::init();

    let engine = ExpansionEngine::new(ExpansionConfig::default(), None);
    let tuple = decl("($($x:expr),*) => (($($x),*))");
    for (input, output) in &[("", "()"), ("a", "(a)"), ("a, b + 1, c", "(a , b + 1 , c)")] {
        let expansion = engine.expand(&call(input), &tuple).unwrap();
        assert_eq!(&text(&expansion), output, "input: {:?}", input);
    }
}

#[test]
fn remembered_results() {
    spoor::init();

    let engine = ExpansionEngine::new(ExpansionConfig::default(), None);
    let resolution = decl("($x:ident) => (struct $x;)");

    let good = call("Foo");
    assert_eq!(
        engine.expansion_if_cached(&good, &resolution),
        Err(GetMacroExpansionError::NotYetExpanded)
    );
    let expansion = engine.expand(&good, &resolution).unwrap();
    assert_eq!(engine.expansion_if_cached(&good, &resolution), Ok(expansion.clone()));
    assert_eq!(engine.expand(&good, &resolution), Ok(expansion));
    assert_eq!(engine.memo().len(), 1);

    // matching failures are a pure function of the call, so they're kept too
    let bad = call("1");
    let err = engine.expand(&bad, &resolution).unwrap_err();
    assert!(err.can_cache());
    match &err {
        GetMacroExpansionError::Expansion(MacroExpansionError::Decl(DeclMacroExpansionError::Matching(errors))) => {
            assert_eq!(errors.len(), 1)
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(engine.expansion_if_cached(&bad, &resolution), Err(err));
    assert_eq!(engine.memo().len(), 2);

    // resolution errors win over the memo
    assert_eq!(
        engine.expansion_if_cached(&good.clone().cfg_disabled(), &resolution),
        Err(GetMacroExpansionError::CfgDisabled)
    );

    engine.memo().clear();
    assert_eq!(
        engine.expansion_if_cached(&bad, &resolution),
        Err(GetMacroExpansionError::NotYetExpanded)
    );
}

#[test]
fn builtins() {
    spoor::init();

    let engine = ExpansionEngine::new(ExpansionConfig::default(), None);
    let stringify = MacroResolution::Builtin("stringify".into());
    assert_eq!(text(&engine.expand(&call("a + b"), &stringify).unwrap()), "\"a + b\"");

    let concat = MacroResolution::Builtin("concat".into());
    assert_eq!(
        text(&engine.expand(&call("\"hello, \", \"world!\""), &concat).unwrap()),
        "\"hello, world!\""
    );

    let env = MacroResolution::Builtin("env".into());
    let err = engine.expand(&call("\"HOME\""), &env).unwrap_err();
    assert_eq!(err, GetMacroExpansionError::from(MacroExpansionError::BuiltinMacroExpansionError));
    assert!(err.can_cache());
}

#[test]
fn batch() {
    spoor::init();

    let engine = ExpansionEngine::new(ExpansionConfig::default(), None);
    let double = decl("($x:expr) => ($x * 2)");
    let mut calls = vec![];
    for i in 0..64 {
        calls.push((call(&i.to_string()), double.clone()));
    }
    calls.push((call("x"), MacroResolution::Unresolved));
    calls.push((call("x"), MacroResolution::Builtin("stringify".into())));

    let results = engine.expand_all(&calls);
    assert_eq!(results.len(), 66);
    for (i, result) in results[..64].iter().enumerate() {
        assert_eq!(text(result.as_ref().unwrap()), format!("{} * 2", i));
    }
    assert_eq!(results[64], Err(GetMacroExpansionError::Unresolved));
    assert_eq!(text(results[65].as_ref().unwrap()), "\"x\"");
}

#[test]
fn configured_limits() {
    spoor::init();

    let config = ExpansionConfig::from_json_str(r#"{ "decl": { "max_tokens": 8 } }"#).unwrap();
    let engine = ExpansionEngine::new(config, None);
    let repeat = decl("($($x:ident)*) => ($($x $x)*)");
    assert!(engine.expand(&call("a b"), &repeat).is_ok());
    assert_eq!(
        engine.expand(&call("a b c d e f"), &repeat),
        Err(GetMacroExpansionError::from(DeclMacroExpansionError::TooLargeExpansion))
    );
}
