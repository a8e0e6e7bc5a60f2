//! Async gates, async checks and cancellation.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use nebula_rules::prelude::*;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
struct Booking {
    guest: String,
    room: String,
    voucher: String,
    premium: bool,
}

#[derive(Debug, Clone, Default)]
struct Line {
    name: String,
    code: String,
}

#[derive(Debug, Clone, Default)]
struct Batch {
    lines: Vec<Line>,
}

fn members(report: &ValidationReport) -> Vec<&str> {
    report.failures().iter().map(|f| f.member.as_str()).collect()
}

fn cancel_after(token: &CancellationToken, delay: Duration) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    });
}

#[tokio::test]
async fn async_rule_gate_is_awaited() {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Booking>::new(Arc::clone(&registry));
    rules
        .rule_for(member!(Booking, voucher as "Voucher"))
        .check(Required)
        .when_async(|b, _| async move { b.premium }.boxed());
    rules.build().unwrap();

    let validator = Validator::<Booking>::from_registry(&registry);
    let token = CancellationToken::new();

    let standard = validator
        .validate_async(&Booking::default(), &token)
        .await
        .unwrap();
    assert!(standard.is_valid());

    let premium = Booking {
        premium: true,
        ..Booking::default()
    };
    let report = validator.validate_async(&premium, &token).await.unwrap();
    assert_eq!(members(&report), vec!["Voucher"]);
}

#[tokio::test]
async fn async_scope_and_otherwise_partition() {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Booking>::new(Arc::clone(&registry));
    rules
        .when_scope_async(
            |b, _| async move { b.premium }.boxed(),
            |r| {
                r.rule_for(member!(Booking, voucher as "Voucher"))
                    .check(Required);
            },
        )
        .otherwise_async(|r| {
            r.rule_for(member!(Booking, room as "Room")).check(Required);
        });
    rules.build().unwrap();

    let validator = Validator::<Booking>::from_registry(&registry);
    let token = CancellationToken::new();

    let standard = validator
        .validate_async(&Booking::default(), &token)
        .await
        .unwrap();
    assert_eq!(members(&standard), vec!["Room"]);

    let premium = Booking {
        premium: true,
        ..Booking::default()
    };
    let report = validator.validate_async(&premium, &token).await.unwrap();
    assert_eq!(members(&report), vec!["Voucher"]);
}

#[tokio::test]
async fn must_async_failure_is_reported() {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Booking>::new(Arc::clone(&registry));
    rules
        .rule_for(member!(Booking, room as "Room"))
        .must_async(|room, _| async move { room.starts_with('R') }.boxed())
        .with_message("{0} is not bookable");
    rules.build().unwrap();

    let booking = Booking {
        room: "B12".to_owned(),
        ..Booking::default()
    };
    let report = Validator::<Booking>::from_registry(&registry)
        .validate_async(&booking, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.len(), 1);
    assert_eq!(report.failures()[0].check, "MustAsync");
    assert_eq!(report.failures()[0].message, "Room is not bookable");
}

#[test]
fn sync_path_rejects_async_rules() {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Booking>::new(Arc::clone(&registry));
    rules
        .rule_for(member!(Booking, guest as "Guest"))
        .check(Required)
        .when_async(|_, _| async { true }.boxed());
    rules.build().unwrap();

    let error = Validator::<Booking>::from_registry(&registry)
        .validate(&Booking::default())
        .unwrap_err();
    assert!(matches!(
        error,
        EvaluationError::AsyncInSyncPath { ref member } if member == "Guest"
    ));
}

#[test]
fn sync_path_rejects_async_rules_behind_false_gate() {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Booking>::new(Arc::clone(&registry));
    rules
        .when_scope(
            |b| b.premium,
            |r| {
                r.rule_for(member!(Booking, voucher as "Voucher"))
                    .must_async(|_, _| async { true }.boxed());
            },
        )
        .end();
    rules.build().unwrap();

    let error = Validator::<Booking>::from_registry(&registry)
        .validate(&Booking::default())
        .unwrap_err();
    assert!(matches!(
        error,
        EvaluationError::AsyncInSyncPath { ref member } if member == "Voucher"
    ));
}

#[tokio::test]
async fn cancellation_keeps_failures_of_finished_rules() {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Booking>::new(Arc::clone(&registry));
    rules
        .rule_for(member!(Booking, guest as "Guest"))
        .check(Required);
    rules
        .rule_for(member!(Booking, voucher as "Voucher"))
        .must_async(|_, _| futures::future::pending::<bool>().boxed());
    rules
        .rule_for(member!(Booking, room as "Room"))
        .check(Required);
    rules.build().unwrap();

    let token = CancellationToken::new();
    cancel_after(&token, Duration::from_millis(20));

    let error = Validator::<Booking>::from_registry(&registry)
        .validate_async(&Booking::default(), &token)
        .await
        .unwrap_err();

    let (member, collected) = match error {
        EvaluationError::Cancelled { member, collected } => (member, collected),
        other => panic!("expected cancellation, got {other:?}"),
    };
    assert_eq!(member, "Voucher");
    assert_eq!(members(&collected), vec!["Guest"]);
}

#[tokio::test]
async fn cancelled_token_stops_before_first_rule() {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Booking>::new(Arc::clone(&registry));
    rules
        .rule_for(member!(Booking, guest as "Guest"))
        .check(Required);
    rules.build().unwrap();

    let token = CancellationToken::new();
    token.cancel();

    let error = Validator::<Booking>::from_registry(&registry)
        .validate_async(&Booking::default(), &token)
        .await
        .unwrap_err();
    assert!(error.is_cancelled());
}

#[tokio::test]
async fn cancellation_inside_collection_keeps_element_failures() {
    let registry = Arc::new(RuleRegistry::new());
    let mut rules = RuleBuilder::<Batch>::new(Arc::clone(&registry));
    rules
        .rule_for_each(member!(Batch, lines as "Lines"))
        .child_rules(|line| {
            line.rule_for(member!(Line, name as "Name")).check(Required);
            line.rule_for(member!(Line, code as "Code"))
                .must_async(|code, _| {
                    if code == "hang" {
                        futures::future::pending::<bool>().boxed()
                    } else {
                        futures::future::ready(true).boxed()
                    }
                });
        });
    rules.build().unwrap();

    let batch = Batch {
        lines: vec![
            Line {
                name: String::new(),
                code: "ok".to_owned(),
            },
            Line {
                name: "second".to_owned(),
                code: "hang".to_owned(),
            },
        ],
    };

    let validator = Validator::<Batch>::from_registry(&registry);
    assert!(matches!(
        validator.validate(&batch),
        Err(EvaluationError::AsyncInSyncPath { .. })
    ));

    let token = CancellationToken::new();
    cancel_after(&token, Duration::from_millis(20));

    let error = validator.validate_async(&batch, &token).await.unwrap_err();
    let (member, collected) = match error {
        EvaluationError::Cancelled { member, collected } => (member, collected),
        other => panic!("expected cancellation, got {other:?}"),
    };
    assert_eq!(member, "Lines");
    let paths: Vec<&str> = collected.failures().iter().map(Failure::path).collect();
    assert_eq!(paths, vec!["Lines[0].Name"]);
}
