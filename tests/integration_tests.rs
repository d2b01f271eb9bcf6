use jtl::{expand, expand_with, ExpandOptions, Template, TemplateError};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};

fn base_template() -> Value {
    serde_json::from_str(include_str!("fixtures/base_template.json"))
        .expect("Failed to parse base_template.json")
}

fn people() -> Value {
    serde_yaml::from_str(include_str!("fixtures/people.yaml")).expect("Failed to parse people.yaml")
}

/// Expand and return the user-facing error message
fn expand_err(document: Value, params: Value) -> String {
    expand(&document, &params)
        .expect_err("expansion should fail")
        .to_string()
}

#[test]
fn test_math_returns_a_number() {
    assert_eq!(expand(&json!("{{ 1 + 1 }}"), &json!({})).unwrap(), json!(2));
}

#[test]
fn test_each_over_numbers() {
    let output = expand(
        &json!({"{{ each xs as x}}": "{{x}}"}),
        &json!({"xs": [1, 2, 3]}),
    )
    .unwrap();
    assert_eq!(output, json!([1, 2, 3]));
}

#[test]
fn test_flatten_each() {
    let output = expand(
        &json!({"{{ ... flatten | each xs as x}}": ["{{x}}", "{{x}}"]}),
        &json!({"xs": [1, 2]}),
    )
    .unwrap();
    assert_eq!(output, json!([1, 1, 2, 2]));
}

#[test]
fn test_optional_read_on_null() {
    let output = expand(&json!("{{ a?.b ?? 'none' }}"), &json!({"a": null})).unwrap();
    assert_eq!(output, json!("none"));
}

#[test]
fn test_else_branch() {
    let output = expand(
        &json!({"{{ if a == 1 }}": "one", "{{ else }}": "other"}),
        &json!({"a": 2}),
    )
    .unwrap();
    assert_eq!(output, json!("other"));
}

#[test]
fn test_undefined_read_names_the_path() {
    let message = expand_err(
        json!("{{ users[0].missing.field }}"),
        json!({"users": [{}]}),
    );
    assert!(
        message.contains("Unable to read key 'field' on undefined value: users.0.missing"),
        "unexpected message: {}",
        message
    );
}

#[test]
fn test_nullish_recovers_only_from_undefined_reads() {
    assert_eq!(expand(&json!("{{ a.b ?? 1 }}"), &json!({})).unwrap(), json!(1));

    let message = expand_err(json!("{{ a.b.c }}"), json!({"a": {}}));
    assert!(message.contains("a.b"), "unexpected message: {}", message);

    // Errors other than undefined reads are not recovered
    let message = expand_err(json!("{{ (1 / 0) ?? 1 }}"), json!({}));
    assert!(
        message.contains("Math result is not a finite number"),
        "unexpected message: {}",
        message
    );
}

#[test]
fn test_conditional_chain_selects_first_true_branch() {
    let template = Template::compile(json!({
        "{{ if x > 10 }}": "big",
        "{{ else if x > 5 }}": "medium",
        "{{ else if x > 0 }}": "small",
        "{{ else }}": "none"
    }))
    .unwrap();

    for (x, expected) in [(11, "big"), (7, "medium"), (6, "medium"), (1, "small"), (0, "none")] {
        assert_eq!(template.render(&json!({ "x": x })).unwrap(), json!(expected));
    }
}

#[test]
fn test_each_filter_preserves_order() {
    let output = expand(
        &json!({"{{ each xs as x if x % 2 == 0 }}": "{{ x * 10 }}"}),
        &json!({"xs": [4, 1, 2, 7, 8]}),
    )
    .unwrap();
    assert_eq!(output, json!([40, 20, 80]));
}

#[test]
fn test_spread_merge_is_left_to_right() {
    let output = expand(
        &json!({
            "a": 999,
            "e": 5,
            "{{ ... /* first */ }}": {"a": 1, "b": 2, "c": 999},
            "{{ ... /* second */ }}": {"c": 3, "d": 4}
        }),
        &json!({}),
    )
    .unwrap();
    assert_eq!(output, json!({"a": 1, "b": 2, "c": 3, "d": 4, "e": 5}));
}

#[test]
fn test_base_template() {
    let output = expand(&base_template(), &people()).unwrap();

    let expected = json!({
        "first": 2,
        "second": {"value": 4},
        "third": [6, {"value": 8}],
        "greetings": [
            "Hello everybody!",
            "Hello to Jeremy from Portland (the best)!",
            "Hello to Greg from Belmont!"
        ],
        "names": ["Jeremy", "Greg"],
        "portlandPeople": ["Jeremy", "Soon to be a Portland person: Greg"],
        "belmontPeople": ["Formerly of a neighboring city: Jeremy", "Greg"],
        "belmontPeopleComprehension": ["Greg"],
        "peopleOrLocations": ["Jeremy", "Portland", "Greg", "Belmont"],
        "peopleOrLocationsSpread": [
            "Jeremy", "Portland", "Greg", "Belmont",
            "Portland", "Jeremy", "Belmont", "Greg"
        ],
        "merge": {"a": 1, "b": 2, "c": 3, "d": 4, "e": 5},
        "options": {"length": 3, "vars": {"query": "hello"}}
    });
    assert_eq!(output, expected);
}

#[test]
fn test_square_bracket_paths() {
    let params = json!({
        "formData": {
            "faq:question": {"value": "What is the meaning of life?"},
            "faq:answer": {"value": "42"}
        }
    });
    let output = expand(
        &json!({
            "question": "{{formData['faq:question'].value}}",
            "answer": "{{formData['faq:answer'].value}}"
        }),
        &params,
    )
    .unwrap();
    assert_eq!(
        output,
        json!({"question": "What is the meaning of life?", "answer": "42"})
    );
}

#[test]
fn test_faq_blocks() {
    let template = json!({
        "blocks": [
            {"type": "header", "text": {"type": "plain_text", "text": "FAQ", "emoji": true}},
            {
                "{{ ... flatten | each questions as question}}": [
                    {"type": "divider"},
                    {
                        "type": "section",
                        "text": {"type": "mrkdwn", "text": "*{{question.question}}*\n>{{question.answer}}"},
                        "accessory": {
                            "type": "button",
                            "value": "{{question.id}}",
                            "action_id": "{{appSlug}}:delete"
                        }
                    }
                ]
            },
            {"type": "divider"}
        ]
    });
    let params = json!({
        "questions": [
            {"id": "first", "question": "First question", "answer": "First answer"},
            {"id": "second", "question": "Second question", "answer": "Second answer"}
        ],
        "appSlug": "faq"
    });

    let section = |id: &str, question: &str, answer: &str| {
        json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": format!("*{}*\n>{}", question, answer)},
            "accessory": {"type": "button", "value": id, "action_id": "faq:delete"}
        })
    };
    let expected = json!({
        "blocks": [
            {"type": "header", "text": {"type": "plain_text", "text": "FAQ", "emoji": true}},
            {"type": "divider"},
            section("first", "First question", "First answer"),
            {"type": "divider"},
            section("second", "Second question", "Second answer"),
            {"type": "divider"}
        ]
    });

    assert_eq!(expand(&template, &params).unwrap(), expected);
}

fn users() -> Value {
    json!({
        "users": [
            {"name": "Greg", "location": "Belmont", "type": "SuperDuperAdmin", "metadata": {"superpower": "flight"}},
            {"name": "Jeremy", "location": "Portland", "type": "SuperDuperAdmin", "metadata": {"weakness": "kryptonite"}},
            {"type": "Anonymous"}
        ]
    })
}

#[test]
fn test_nulls() {
    let message = expand_err(json!("{{ users[0].metadata.age }}"), users());
    assert!(message.contains("Undefined value in template string"));

    let message = expand_err(json!("{{ users[0].nonExistentField.age }}"), users());
    assert!(message
        .contains("Unable to read key 'age' on undefined value: users.0.nonExistentField"));

    assert_eq!(
        expand(&json!("{{ ... users[0].metadata.age ?? 100 }}"), &users()).unwrap(),
        json!(100)
    );

    assert_eq!(
        expand(
            &json!({"{{ ... flatten | each users as user if user.type == 'SuperDuperAdmin'}}": "{{user.name}}"}),
            &users()
        )
        .unwrap(),
        json!(["Greg", "Jeremy"])
    );

    let output = expand(
        &json!({
            "{{ ... each users as user }}": {
                "name": "{{user.name ?? user.type}}",
                "superpower": "{{user.metadata?.superpower ?? 'unknown' }}",
                "weakness": "{{user.metadata?.weakness ?? 'unknown'}}"
            }
        }),
        &users(),
    )
    .unwrap();
    assert_eq!(
        output,
        json!([
            {"name": "Greg", "superpower": "flight", "weakness": "unknown"},
            {"name": "Jeremy", "superpower": "unknown", "weakness": "kryptonite"},
            {"name": "Anonymous", "superpower": "unknown", "weakness": "unknown"}
        ])
    );
}

#[test]
fn test_convert_undefined_to_null() {
    let options = ExpandOptions {
        convert_undefined_to_null: true,
    };
    let output = expand_with(
        &json!({"a": "{{ missing }}", "b": "x{{ missing }}y"}),
        &json!({}),
        &options,
    )
    .unwrap();
    assert_eq!(output, json!({"a": null, "b": "xy"}));

    let output = expand(
        &json!({"a": "{{ missing }}"}),
        &json!({"__convertUndefinedToNull": true}),
    )
    .unwrap();
    assert_eq!(output, json!({"a": null}));
}

#[test]
fn test_untaken_ternary_branch_is_not_evaluated() {
    assert_eq!(
        expand(&json!("{{ ok == true ? 'yes' : nothing.here }}"), &json!({"ok": true})).unwrap(),
        json!("yes")
    );
}

#[test]
fn test_conditions_must_be_comparisons() {
    assert!(expand(&json!("{{ ok ? 'yes' : 'no' }}"), &json!({"ok": true})).is_err());
    assert!(expand(&json!({"{{ if ok }}": 1}), &json!({"ok": true})).is_err());
    assert_eq!(
        expand(&json!({"{{ if ok == true }}": 1}), &json!({"ok": true})).unwrap(),
        json!(1)
    );
}

#[test]
fn test_long_template_strings() {
    let text = "{{ a }}-".repeat(3000);
    let output = expand(&json!({ "long": text }), &json!({"a": "x"})).unwrap();
    assert_eq!(output, json!({ "long": "x-".repeat(3000) }));
}

#[test]
fn test_loose_and_strict_equality() {
    let output = expand(
        &json!(["{{ 1 == '1' }}", "{{ 1 === '1' }}", "{{ null == undefined }}", "{{ a !== 2 }}"]),
        &json!({"a": 2}),
    )
    .unwrap();
    assert_eq!(output, json!([true, false, true, false]));
}

#[test]
fn test_spreading_a_scalar_into_an_array_fails() {
    let message = expand_err(json!(["{{ ...n }}"]), json!({"n": 3}));
    assert!(message.contains("Unable to spread non-array value"), "{}", message);
}

#[test]
fn test_keys_after_array_spread_fail() {
    let message = expand_err(
        json!({"{{ ... /* xs */ }}": [1], "b": 2}),
        json!({}),
    );
    assert!(message.contains("Unable to set object keys after a spread"), "{}", message);
}

#[test]
fn test_syntax_error_is_located() {
    let err = expand(&json!({"items": ["ok", "{{ }}"]}), &json!({})).unwrap_err();
    assert!(matches!(err, TemplateError::At { .. }));
    assert_eq!(err.path().map(|p| p.dotted()), Some("items.1.3".to_string()));
}

#[test]
fn test_template_is_reusable_across_threads() {
    let template = std::sync::Arc::new(Template::compile(json!({"n": "{{ n * 2 }}"})).unwrap());
    let handles: Vec<_> = (0..4)
        .map(|n| {
            let template = template.clone();
            std::thread::spawn(move || template.render(&json!({ "n": n })).unwrap())
        })
        .collect();
    for (n, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), json!({"n": n * 2}));
    }
}

fn plain_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..5)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn prop_plain_documents_expand_to_themselves(document in plain_json()) {
        prop_assert_eq!(expand(&document, &json!({})).unwrap(), document);
    }

    #[test]
    fn prop_expansion_is_deterministic(a in any::<i32>(), b in any::<i32>()) {
        let template = Template::compile(json!({
            "sum": "{{ a + b }}",
            "text": "{{ a }} and {{ b }}",
            "cmp": "{{ a < b }}"
        })).unwrap();
        let params = json!({"a": a, "b": b});
        let first = template.render(&params).unwrap();
        prop_assert_eq!(&first, &template.render(&params).unwrap());
        prop_assert_eq!(&first["sum"], &json!(a as i64 + b as i64));
        prop_assert_eq!(&first["text"], &json!(format!("{} and {}", a, b)));
        prop_assert_eq!(&first["cmp"], &json!(a < b));
    }

    #[test]
    fn prop_each_copies_its_source(xs in prop::collection::vec(any::<i32>(), 0..8)) {
        let output = expand(&json!({"{{ each xs as x }}": "{{ x }}"}), &json!({"xs": xs})).unwrap();
        prop_assert_eq!(output, json!(xs));
    }
}
