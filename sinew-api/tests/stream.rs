use sinew_api::errors::{Codec, GetMacroExpansionError, MacroExpansionError, MacroMatchingError, ProcMacroExpansionError};
use sinew_api::tokenize;
use sinew_api::tokens::Subtree;
use sinew_api::ProcMacroKind;
use std::io::Cursor;

#[test]
fn errors_share_a_stream() {
    spoor::init();

    let errors = vec![
        GetMacroExpansionError::UnmatchedProcMacroKind {
            call_kind: ProcMacroKind::Attr,
            def_kind: ProcMacroKind::CustomDerive,
        },
        MacroExpansionError::Decl(sinew_api::errors::DeclMacroExpansionError::Matching(vec![
            MacroMatchingError::EndOfInput { offset: 300 },
            MacroMatchingError::UnmatchedToken {
                offset: 3,
                expected_kind: "IDENT".into(),
                expected_text: "ж".into(),
                actual_kind: "PUNCT".into(),
                actual_text: "+".into(),
            },
        ]))
        .into(),
        ProcMacroExpansionError::ProcessAborted(-9).into(),
        GetMacroExpansionError::NotYetExpanded,
    ];

    let mut buf = vec![];
    for err in &errors {
        err.write_to(&mut buf).unwrap();
    }
    let mut input = Cursor::new(buf);
    for err in &errors {
        assert_eq!(&GetMacroExpansionError::read_from(&mut input).unwrap(), err);
    }
    // and nothing after
    assert!(GetMacroExpansionError::read_from(&mut input).is_err());
}

#[test]
fn trees_as_json() {
    spoor::init();

    let tokenized = tokenize("#[derive(Debug)] struct S { a: Vec<u8>, b: &'static str }").unwrap();
    let json = serde_json::to_string(&tokenized.subtree).unwrap();
    let back: Subtree = serde_json::from_str(&json).unwrap();
    assert_eq!(back, tokenized.subtree);
    assert_eq!(back.to_string(), tokenized.subtree.to_string());
}
