//! Randomized tests for the query pretty-printer.
//!
//! Generates templates and argument lists with random shapes and checks the
//! properties that must hold for any input.

use platform_common::db::{Placeholder, QueryParam, pretty};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;

/// Generate random string of given length
fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate various edge-case strings
fn edge_case_strings() -> Vec<String> {
    vec![
        String::new(),
        " ".to_string(),
        "\n\r\t".to_string(),
        "\0".to_string(),
        "\"quoted\"".to_string(),
        "back\\slash".to_string(),
        "'; DROP TABLE users--".to_string(),
        "$1".to_string(),
        "?".to_string(),
        "ünïcödé 🚀".to_string(),
        "a".repeat(10_000),
        random_string(100),
    ]
}

fn random_param(rng: &mut impl Rng) -> QueryParam {
    match rng.gen_range(0..7) {
        0 => QueryParam::Null,
        1 => QueryParam::Bool(rng.r#gen()),
        2 => QueryParam::Int(rng.r#gen()),
        3 => QueryParam::Float(rng.gen_range(-1e6..1e6)),
        4 => QueryParam::String(edge_case_strings().choose(rng).cloned().unwrap_or_default()),
        5 => QueryParam::Bytes((0..rng.gen_range(0..16)).map(|_| rng.r#gen()).collect()),
        _ => QueryParam::Json(serde_json::json!({ "k": random_string(4) })),
    }
}

/// Template with `count` numbered placeholders, in random order, separated by
/// tabs and newlines.
fn random_dollar_template(rng: &mut impl Rng, count: usize) -> String {
    let mut indexes: Vec<usize> = (1..=count).collect();
    indexes.shuffle(rng);
    let mut sql = String::from("SELECT *\n\tFROM t\n\tWHERE ");
    for (i, index) in indexes.iter().enumerate() {
        if i > 0 {
            sql.push_str(if rng.r#gen() { "\n\tAND " } else { " OR " });
        }
        sql.push_str(&format!("c{i} = ${index}"));
    }
    sql
}

#[test]
fn fuzz_dollar_placeholders_are_all_bound() {
    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let count = rng.gen_range(1..25);
        let template = random_dollar_template(&mut rng, count);
        // Values that cannot themselves look like placeholders.
        let args: Vec<QueryParam> = (0..count)
            .map(|_| QueryParam::Int(rng.gen_range(0..1_000_000)))
            .collect();

        let out = pretty(&template, Placeholder::Dollar, &args);

        assert!(!out.contains('$'), "unbound placeholder in {out:?}");
        assert!(!out.contains('\t'));
        assert!(!out.contains('\n'));
        assert_eq!(out, out.trim());
    }
}

#[test]
fn fuzz_arbitrary_arguments_never_break_single_line_output() {
    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let count = rng.gen_range(0..12);
        let template = random_dollar_template(&mut rng, count.max(1));
        let args: Vec<QueryParam> = (0..count).map(|_| random_param(&mut rng)).collect();

        for placeholder in [Placeholder::Dollar, Placeholder::Question] {
            let out = pretty(&template, placeholder, &args);
            assert!(!out.contains('\t'), "tab survived in {out:?}");
            assert!(!out.contains('\n'), "newline survived in {out:?}");
        }
    }
}

#[test]
fn fuzz_question_placeholders_consume_arguments_in_order() {
    let mut rng = rand::thread_rng();
    for _ in 0..500 {
        let marks = rng.gen_range(0..20);
        let supplied = rng.gen_range(0..20);
        let template = (0..marks).map(|_| "?").collect::<Vec<_>>().join(", ");
        let args: Vec<QueryParam> = (0..supplied).map(|i| QueryParam::Int(i as i64)).collect();

        let out = pretty(&format!("VALUES ({template})"), Placeholder::Question, &args);

        let bound = marks.min(supplied);
        let expected: Vec<String> = (0..marks)
            .map(|i| if i < bound { i.to_string() } else { "?".to_string() })
            .collect();
        assert_eq!(out, format!("VALUES ({})", expected.join(", ")));
    }
}

#[test]
fn fuzz_random_templates_do_not_panic() {
    let mut rng = rand::thread_rng();
    let alphabet: Vec<char> = "$?0123456789 \t\n\"'\\abcü".chars().collect();
    for _ in 0..2_000 {
        let len = rng.gen_range(0..64);
        let template: String = (0..len)
            .map(|_| *alphabet.choose(&mut rng).unwrap_or(&' '))
            .collect();
        let args: Vec<QueryParam> = (0..rng.gen_range(0..12))
            .map(|_| random_param(&mut rng))
            .collect();

        let _ = pretty(&template, Placeholder::Dollar, &args);
        let _ = pretty(&template, Placeholder::Question, &args);
    }
}
