//! Conditional scoping through the public builder API.

use std::sync::Arc;

use nebula_rules::prelude::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Shipment {
    weight: i32,
    carrier: String,
    courier: String,
    tracking: String,
    express: bool,
}

impl Shipment {
    fn empty(weight: i32) -> Self {
        Self {
            weight,
            carrier: String::new(),
            courier: String::new(),
            tracking: String::new(),
            express: false,
        }
    }
}

fn heavy_or_light(threshold: i32) -> (Arc<RuleRegistry>, RuleSet<Shipment>) {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Shipment>::new(Arc::clone(&registry));
    rules
        .when_scope(
            move |s| s.weight > threshold,
            |r| {
                r.rule_for(member!(Shipment, carrier as "Carrier"))
                    .check(Required);
            },
        )
        .otherwise(|r| {
            r.rule_for(member!(Shipment, courier as "Courier"))
                .check(Required);
        });
    let set = rules.build().unwrap();
    (registry, set)
}

fn failing_members(report: &ValidationReport) -> Vec<&str> {
    report.failures().iter().map(|f| f.member.as_str()).collect()
}

proptest! {
    #[test]
    fn when_and_otherwise_partition_every_instance(weight in any::<i32>(), threshold in -1000i32..1000) {
        let (_, set) = heavy_or_light(threshold);
        let instance = Shipment::empty(weight);

        let applying: Vec<&str> = set
            .iter()
            .filter(|rule| rule.applies(&instance).unwrap())
            .map(|rule| rule.member().name())
            .collect();

        let expected = if weight > threshold { "Carrier" } else { "Courier" };
        prop_assert_eq!(applying, vec![expected]);
    }
}

#[test]
fn validator_reports_only_active_branch() {
    let (registry, _) = heavy_or_light(10);
    let validator = Validator::<Shipment>::from_registry(&registry);

    let heavy = validator.validate(&Shipment::empty(25)).unwrap();
    assert_eq!(failing_members(&heavy), vec!["Carrier"]);

    let light = validator.validate(&Shipment::empty(3)).unwrap();
    assert_eq!(failing_members(&light), vec!["Courier"]);
}

#[test]
fn scope_gate_combines_with_rule_gate() {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Shipment>::new(Arc::clone(&registry));
    rules.when_scope(
        |s| s.weight > 0,
        |r| {
            r.rule_for(member!(Shipment, tracking as "Tracking"))
                .check(Required)
                .when(|s| s.express);
        },
    );
    rules.build().unwrap();
    let validator = Validator::<Shipment>::from_registry(&registry);

    let mut shipment = Shipment::empty(5);
    assert!(validator.validate(&shipment).unwrap().is_valid());

    shipment.express = true;
    assert_eq!(
        failing_members(&validator.validate(&shipment).unwrap()),
        vec!["Tracking"]
    );

    shipment.weight = 0;
    assert!(validator.validate(&shipment).unwrap().is_valid());
}

#[test]
fn builder_level_when_gates_open_rule_but_not_must() {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Shipment>::new(Arc::clone(&registry));
    rules
        .rule_for(member!(Shipment, carrier as "Carrier"))
        .check(Required)
        .must(|c: &String| c.len() <= 3);
    rules.when(|s| s.express);
    rules.build().unwrap();
    let validator = Validator::<Shipment>::from_registry(&registry);

    let mut shipment = Shipment::empty(1);
    shipment.carrier = "Freightways".to_owned();

    let report = validator.validate(&shipment).unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report.failures()[0].check, "Must");

    shipment.carrier.clear();
    shipment.express = true;
    let report = validator.validate(&shipment).unwrap();
    let checks: Vec<&str> = report.failures().iter().map(|f| f.check).collect();
    assert_eq!(checks, vec!["Required"]);
}

#[test]
fn gate_only_rule_gates_previously_registered_checks() {
    let registry = Arc::new(RuleRegistry::new());

    let mut first = RuleBuilder::<Shipment>::new(Arc::clone(&registry));
    first
        .rule_for(member!(Shipment, tracking as "Tracking"))
        .check(Required);
    first.build().unwrap();

    let mut second = RuleBuilder::<Shipment>::with_options(
        Arc::clone(&registry),
        RuleOptions::default().with_registration(RegistrationMode::Preserve),
    );
    second
        .rule_for(member!(Shipment, tracking as "Tracking"))
        .when(|s| s.express);
    second.build().unwrap();

    let validator = Validator::<Shipment>::from_registry(&registry);
    assert_eq!(validator.rules().len(), 1);
    assert!(validator.validate(&Shipment::empty(1)).unwrap().is_valid());

    let mut express = Shipment::empty(1);
    express.express = true;
    assert_eq!(
        failing_members(&validator.validate(&express).unwrap()),
        vec!["Tracking"]
    );
}

#[test]
fn building_twice_does_not_duplicate_registered_rules() {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Shipment>::new(Arc::clone(&registry));
    rules
        .rule_for(member!(Shipment, carrier as "Carrier"))
        .check(Required)
        .check(Length::max(20));

    let first = rules.build().unwrap();
    let second = rules.build().unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(registry.rule_set::<Shipment>().len(), 2);
}

#[test]
fn configuration_errors_surface_from_build() {
    let registry = Arc::new(RuleRegistry::new());

    let mut orphan = RuleBuilder::<Shipment>::new(Arc::clone(&registry));
    orphan.otherwise(|r| {
        r.rule_for(member!(Shipment, courier)).check(Required);
    });
    assert_eq!(orphan.build().unwrap_err(), RuleConfigError::OtherwiseWithoutWhen);

    let mut empty = RuleBuilder::<Shipment>::new(Arc::clone(&registry));
    empty.when_scope(|s| s.express, |_| {});
    assert_eq!(empty.build().unwrap_err(), RuleConfigError::EmptyScope);

    let mut gate_only = RuleBuilder::<Shipment>::new(Arc::clone(&registry));
    gate_only
        .rule_for(member!(Shipment, tracking as "Tracking"))
        .when(|s| s.express);
    assert_eq!(
        gate_only.build().unwrap_err(),
        RuleConfigError::GateWithoutCheck {
            member: "Tracking".to_owned()
        }
    );

    assert_eq!(registry.type_count(), 0);
}
