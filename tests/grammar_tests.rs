mod common;

use std::path::PathBuf;

use asr_relay::{load_working_set, Decoder, DecoderError};
use common::{Call, FakeDecoder};

fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

#[test]
fn test_first_loaded_grammar_is_active() {
    let mut decoder = FakeDecoder::new();
    let loaded = load_working_set(&mut decoder, &paths(&["g1.lm", "g2.lm", "g3.lm"])).unwrap();

    assert_eq!(loaded, 3);
    assert_eq!(decoder.working_set().active_name(), Some("g1.lm"));
    assert_eq!(decoder.calls(), vec![Call::Update("lm:g1.lm".to_string())]);
}

#[test]
fn test_failed_grammar_is_skipped() {
    let mut decoder = FakeDecoder::new();
    let loaded =
        load_working_set(&mut decoder, &paths(&["missing.lm", "g2.lm", "missing2.lm"])).unwrap();

    assert_eq!(loaded, 1);
    assert_eq!(decoder.working_set().active_name(), Some("g2.lm"));
    assert!(decoder.working_set().get("missing.lm").is_none());
}

#[test]
fn test_no_grammar_loaded_is_fatal() {
    let mut decoder = FakeDecoder::new();
    let err = load_working_set(&mut decoder, &paths(&["missing.lm"])).unwrap_err();
    assert!(matches!(err, DecoderError::EmptyWorkingSet));

    let err = load_working_set(&mut FakeDecoder::new(), &[]).unwrap_err();
    assert!(matches!(err, DecoderError::EmptyWorkingSet));
}

#[test]
fn test_duplicate_names_replace_entry() {
    let mut decoder = FakeDecoder::new();
    let loaded = load_working_set(&mut decoder, &paths(&["g1.lm", "g1.lm"])).unwrap();

    assert_eq!(loaded, 1);
    let names: Vec<&str> = decoder.working_set().names().collect();
    assert_eq!(names, vec!["g1.lm"]);
}
