use std::fs;
use std::path::PathBuf;

use lalrgen::{run, Options};
use tempfile::TempDir;

/// Write a grammar into a scratch directory and run the generator on it.
/// Returns the exit count (grammar errors plus conflicts) and the
/// directory holding the outputs.
fn generate(text: &str) -> (u32, TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("g.y");
    fs::write(&input, text).unwrap();
    let options = Options::new(&input);
    let count = run(&options).unwrap();
    let base = dir.path().join("g");
    (count, dir, base)
}

fn state_section<'r>(report: &'r str, state: u32) -> &'r str {
    let start = format!("State {}:", state);
    let begin = report.find(&start).unwrap();
    let rest = &report[begin..];
    match rest[start.len()..].find("\nState ") {
        Some(offset) => &rest[..start.len() + offset],
        None => rest,
    }
}

#[test]
fn minimal_grammar_builds_four_states() {
    let (count, _dir, base) = generate("%start_symbol S. S ::= a. a ::= A .");
    assert_eq!(count, 0);
    let report = fs::read_to_string(base.with_extension("out")).unwrap();
    assert_eq!(report.matches("State ").count(), 4);
    let state0 = state_section(&report, 0);
    assert!(state0.contains("S accept"));
    assert!(base.with_extension("c").exists());
    assert!(base.with_extension("h").exists());
}

#[test]
fn left_precedence_resolves_shift_reduce() {
    let (count, _dir, base) = generate("%left PLUS. E ::= E PLUS E . E ::= NUM .");
    assert_eq!(count, 0);
    let report = fs::read_to_string(base.with_extension("out")).unwrap();
    assert!(!report.contains("** Parsing conflict **"));
    // The clashing state still lists both actions on PLUS, the shift
    // marked as the loser.
    assert!(report.contains("shift"));
    assert!(report.contains("-- dropped by precedence"));
    let conflicted_line = report
        .lines()
        .find(|line| line.contains("-- dropped by precedence"))
        .unwrap();
    assert!(conflicted_line.contains("PLUS"));
}

#[test]
fn unresolved_conflict_is_counted_and_reported() {
    let (count, _dir, base) = generate("E ::= E PLUS E . E ::= NUM .");
    assert_eq!(count, 1);
    let report = fs::read_to_string(base.with_extension("out")).unwrap();
    assert!(report.contains("** Parsing conflict **"));
    // Conflicts do not suppress the generated parser.
    assert!(base.with_extension("c").exists());
}

#[test]
fn unreducible_rule_fails() {
    let (count, _dir, _base) = generate("S ::= A . A ::= B . B ::= X . C ::= Y .");
    assert_eq!(count, 1);
}

#[test]
fn uniform_reduces_compress_to_a_default() {
    // After reducing a, the lookahead can be B or end-of-input; both
    // reduce by the same rule and fold into one default action.
    let (count, _dir, base) = generate("s ::= a B . s ::= a . a ::= A .");
    assert_eq!(count, 0);
    let report = fs::read_to_string(base.with_extension("out")).unwrap();
    assert!(report.contains("{default} reduce"));
    let source = fs::read_to_string(base.with_extension("c")).unwrap();
    assert!(source.contains("yyStateTable"));
}

#[test]
fn header_is_stable_across_runs() {
    let text = "%token_prefix TK_ e ::= NUM PLUS NUM .";
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("g.y");
    fs::write(&input, text).unwrap();
    let options = Options::new(&input);
    assert_eq!(run(&options).unwrap(), 0);
    let header = dir.path().join("g.h");
    let first = fs::read_to_string(&header).unwrap();
    let first_mtime = fs::metadata(&header).unwrap().modified().unwrap();
    assert_eq!(run(&options).unwrap(), 0);
    let second = fs::read_to_string(&header).unwrap();
    let second_mtime = fs::metadata(&header).unwrap().modified().unwrap();
    assert_eq!(first, second);
    assert_eq!(first_mtime, second_mtime);
}

#[test]
fn single_rule_grammar_accepts_and_shifts() {
    let (count, _dir, base) = generate("S ::= A .");
    assert_eq!(count, 0);
    let report = fs::read_to_string(base.with_extension("out")).unwrap();
    let state0 = state_section(&report, 0);
    assert!(state0.contains("accept"));
    assert!(state0.contains("A shift"));
}

#[test]
fn parser_name_substitutes_through_the_template() {
    let (count, _dir, base) = generate("%name Calc e ::= NUM .");
    assert_eq!(count, 0);
    let source = fs::read_to_string(base.with_extension("c")).unwrap();
    assert!(source.contains("void *CalcAlloc("));
    assert!(source.contains("void CalcFree("));
    assert!(source.contains("#define CalcTOKENTYPE"));
    assert!(!source.contains("void *ParseAlloc("));
}

#[test]
fn generated_source_carries_tables_and_actions() {
    let (count, _dir, base) = generate(
        "%token_type {int} %type e {long} e(R) ::= e(L) PLUS e(X) . { R = L + X; } \
         e(R) ::= NUM(N) . { R = N; }",
    );
    assert_eq!(count, 0);
    let source = fs::read_to_string(base.with_extension("c")).unwrap();
    assert!(source.contains("yyActionTable"));
    assert!(source.contains("#define YYNSTATE"));
    assert!(source.contains("yygotominor"));
    assert!(source.contains("yymsp[-2].minor"));
    assert!(source.contains("#define PLUS"));
    assert!(source.contains("long yy"));
}

#[test]
fn quiet_suppresses_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("g.y");
    fs::write(&input, "s ::= A .").unwrap();
    let mut options = Options::new(&input);
    options.quiet = true;
    assert_eq!(run(&options).unwrap(), 0);
    assert!(!dir.path().join("g.out").exists());
    assert!(dir.path().join("g.c").exists());
}

#[test]
fn basis_only_report_is_smaller() {
    let text = "s ::= a . a ::= A .";
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("g.y");
    fs::write(&input, text).unwrap();
    let mut options = Options::new(&input);
    run(&options).unwrap();
    let full = fs::read_to_string(dir.path().join("g.out")).unwrap();
    options.basis_only = true;
    run(&options).unwrap();
    let basis = fs::read_to_string(dir.path().join("g.out")).unwrap();
    assert!(basis.len() < full.len());
}

#[test]
fn output_directory_redirects_files() {
    let dir = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let input = dir.path().join("g.y");
    fs::write(&input, "s ::= A .").unwrap();
    let mut options = Options::new(&input);
    options.output_dir = Some(out.path().to_path_buf());
    assert_eq!(run(&options).unwrap(), 0);
    assert!(out.path().join("g.c").exists());
    assert!(out.path().join("g.out").exists());
    assert!(!dir.path().join("g.c").exists());
}

#[test]
fn uncompressed_tables_keep_explicit_reduces() {
    let text = "s ::= a B . s ::= a . a ::= A .";
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("g.y");
    fs::write(&input, text).unwrap();
    let mut options = Options::new(&input);
    options.no_compress = true;
    assert_eq!(run(&options).unwrap(), 0);
    let report = fs::read_to_string(dir.path().join("g.out")).unwrap();
    assert!(!report.contains("{default}"));
}

#[test]
fn separate_header_mode_elides_inline_defines() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("g.y");
    fs::write(&input, "%token_prefix TK_ s ::= A .").unwrap();
    let mut options = Options::new(&input);
    options.separate_header = true;
    assert_eq!(run(&options).unwrap(), 0);
    let source = fs::read_to_string(dir.path().join("g.c")).unwrap();
    assert!(source.contains("#include \"g.h\""));
    assert!(!source.contains("#define TK_A"));
    let header = fs::read_to_string(dir.path().join("g.h")).unwrap();
    assert!(header.contains("#define TK_A"));
}
