//! Message resolution order as seen through evaluation.

use std::sync::Arc;

use nebula_rules::prelude::*;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[derive(Debug, Clone, Default)]
struct Account {
    password: String,
    age: i64,
    handle: String,
}

const SHARED: ResourceType = ResourceType::new("Shared").with_entries(&[
    ("Password_Required", "{0} is needed"),
    ("TooYoung", "Must be between {0} and {1}"),
    ("Broken", "Missing {4}"),
]);

const ACCOUNT: ResourceType =
    ResourceType::new("AccountMessages").with_entries(&[("Handle_Required", "Pick a handle")]);

fn messages_for(
    configure: impl FnOnce(&mut RuleBuilder<Account>),
    resolver: MessageResolver,
) -> Vec<String> {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Account>::new(Arc::clone(&registry));
    configure(&mut rules);
    rules.build().unwrap();

    Validator::<Account>::from_registry(&registry)
        .with_messages(resolver)
        .validate(&Account::default())
        .unwrap()
        .into_failures()
        .into_iter()
        .map(|f| f.message)
        .collect()
}

fn password(rules: &mut RuleBuilder<Account>) -> PropertyRule<'_, Account, String> {
    rules
        .rule_for(member!(Account, password as "Password"))
        .check(Required)
}

#[test]
fn conventional_default_for_required() {
    let messages = messages_for(
        |r| {
            password(r);
        },
        MessageResolver::new(),
    );
    assert_eq!(messages, vec!["The Password field is required."]);
}

#[rstest]
#[case::resolver_beats_explicit(true, Some("Explicit {0}"), "computed")]
#[case::explicit_with_member_argument(false, Some("{0} cannot be blank"), "Password cannot be blank")]
#[case::bad_explicit_falls_through(false, Some("Broken {7}"), "Password is needed")]
#[case::conventional_resource_key(false, None, "Password is needed")]
fn priority_chain(#[case] with_resolver: bool, #[case] explicit: Option<&'static str>, #[case] expected: &str) {
    let messages = messages_for(
        |r| {
            let mut rule = password(r);
            if with_resolver {
                rule = rule.with_message_fn(|_| Some("computed".to_owned()));
            }
            if let Some(template) = explicit {
                rule.with_message(template);
            }
        },
        MessageResolver::new().with_default_resource(SHARED),
    );
    assert_eq!(messages, vec![expected]);
}

#[test]
fn explicit_message_takes_range_arguments() {
    let messages = messages_for(
        |r| {
            r.rule_for(member!(Account, age as "Age"))
                .check(Range::new(18, 120))
                .with_message("Age must be {0} to {1}");
        },
        MessageResolver::new(),
    );
    assert_eq!(messages, vec!["Age must be 18 to 120"]);
}

#[test]
fn explicit_resource_key_uses_check_arguments() {
    let messages = messages_for(
        |r| {
            r.rule_for(member!(Account, age as "Age"))
                .check(Range::new(18, 120))
                .with_resource_key("TooYoung");
        },
        MessageResolver::new().with_default_resource(SHARED),
    );
    assert_eq!(messages, vec!["Must be between 18 and 120"]);
}

#[test]
fn failed_resource_format_uses_fallback_message() {
    let messages = messages_for(
        |r| {
            password(r)
                .with_resource_key("Broken")
                .with_fallback_message("Please choose a password");
        },
        MessageResolver::new().with_default_resource(SHARED),
    );
    assert_eq!(messages, vec!["Please choose a password"]);
}

#[test]
fn missing_resource_entry_uses_check_default() {
    let messages = messages_for(
        |r| {
            password(r).with_resource_key("NoSuchKey");
        },
        MessageResolver::new().with_default_resource(SHARED),
    );
    assert_eq!(messages, vec!["The Password field is required."]);
}

#[test]
fn conventional_keys_can_be_disabled_per_rule() {
    let messages = messages_for(
        |r| {
            password(r).without_conventional_keys();
        },
        MessageResolver::new().with_default_resource(SHARED),
    );
    assert_eq!(messages, vec!["The Password field is required."]);
}

#[test]
fn conventional_keys_can_be_disabled_globally() {
    let messages = messages_for(
        |r| {
            password(r);
        },
        MessageResolver::new()
            .with_default_resource(SHARED)
            .with_conventional_keys(false),
    );
    assert_eq!(messages, vec!["The Password field is required."]);
}

#[test]
fn type_resource_applies_when_no_other_resource_is_set() {
    let messages = messages_for(
        |r| {
            r.rule_for(member!(Account, handle as "Handle"))
                .check(Required);
        },
        MessageResolver::new().with_type_resource::<Account>(ACCOUNT),
    );
    assert_eq!(messages, vec!["Pick a handle"]);
}

#[test]
fn localizer_receives_rule_locale_and_wins_over_static_table() {
    let localizer = |resource: &ResourceType, key: &str, locale: Option<&str>| {
        (resource.name() == "Shared" && key == "Password_Required" && locale == Some("de"))
            .then(|| "{0} wird benötigt".to_owned())
    };

    let messages = messages_for(
        |r| {
            password(r).with_locale("de");
            r.rule_for(member!(Account, handle as "Handle"))
                .check(Required)
                .with_resource_type(SHARED)
                .with_resource_key("Password_Required");
        },
        MessageResolver::new()
            .with_default_resource(SHARED)
            .with_localizer(localizer),
    );

    assert_eq!(messages, vec!["Password wird benötigt", "Handle is needed"]);
}

#[test]
fn default_locale_comes_from_options() {
    let options = RuleOptions::from_json(r#"{ "default_locale": "fr" }"#).unwrap();
    let localizer = |_: &ResourceType, _: &str, locale: Option<&str>| {
        (locale == Some("fr")).then(|| "{0} est requis".to_owned())
    };

    let messages = messages_for(
        |r| {
            password(r);
        },
        MessageResolver::from_options(&options)
            .with_default_resource(SHARED)
            .with_localizer(localizer),
    );
    assert_eq!(messages, vec!["Password est requis"]);
}

#[test]
fn failure_key_overrides_member_name() {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Account>::new(Arc::clone(&registry));
    password(&mut rules).with_failure_key("credentials.password");
    rules.build().unwrap();

    let report = Validator::<Account>::from_registry(&registry)
        .validate(&Account::default())
        .unwrap();
    assert_eq!(report.failures()[0].key, "credentials.password");
    assert_eq!(report.failures()[0].member, "Password");
}

#[test]
fn must_message_targets_the_must_rule() {
    let messages = messages_for(
        |r| {
            password(r)
                .with_message("no password")
                .must(|p: &String| p.len() >= 8)
                .with_message("too short");
        },
        MessageResolver::new(),
    );
    assert_eq!(messages, vec!["no password", "too short"]);
}
