//! Group membership reconciliation through user updates.

mod common;

use std::sync::Arc;

use common::{box_error, connector_over, FakeBox};
use xavyo_connector::prelude::*;
use xavyo_connector_box::HttpMethod;

const USER: &str = "11446498";

fn fixture() -> Arc<FakeBox> {
    Arc::new(
        FakeBox::new()
            .with_user(USER, "ceo@example.com", "Aaron Levie")
            .with_group("A", "Alpha")
            .with_group("B", "Bravo")
            .with_group("C", "Charlie")
            .with_group("D", "Delta")
            .with_membership(USER, "A", "member")
            .with_membership(USER, "B", "member")
            .with_membership(USER, "C", "member"),
    )
}

fn uid() -> Uid {
    Uid::with_name_hint(USER, Name::new("ceo@example.com"))
}

#[tokio::test]
async fn test_partial_add_and_remove() {
    let fake = fixture();
    let connector = connector_over(fake.clone(), 100);

    connector
        .update_delta(
            ACCOUNT_OBJECT_CLASS,
            &uid(),
            AttributeDeltaSet::new().with(AttributeDelta::add_remove(
                "group_membership",
                ["D"],
                ["B"],
            )),
        )
        .await
        .unwrap();

    assert_eq!(fake.groups_of(USER), vec!["A", "C", "D"]);
}

#[tokio::test]
async fn test_adding_existing_membership_is_idempotent() {
    let fake = fixture();
    let connector = connector_over(fake.clone(), 100);

    connector
        .update_delta(
            ACCOUNT_OBJECT_CLASS,
            &uid(),
            AttributeDeltaSet::new().with(AttributeDelta::add_remove(
                "group_membership",
                ["A"],
                Vec::<String>::new(),
            )),
        )
        .await
        .unwrap();

    assert_eq!(fake.groups_of(USER), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_replace_reconciles_to_the_desired_set() {
    let fake = fixture();
    let connector = connector_over(fake.clone(), 100);

    connector
        .update_delta(
            ACCOUNT_OBJECT_CLASS,
            &uid(),
            AttributeDeltaSet::new()
                .with(AttributeDelta::replace("group_membership", ["C", "D"])),
        )
        .await
        .unwrap();

    assert_eq!(fake.groups_of(USER), vec!["C", "D"]);
    // One listing serves both the diff and the removals.
    let listings = fake
        .calls()
        .iter()
        .filter(|call| *call == "GET /users/11446498/memberships")
        .count();
    assert_eq!(listings, 1);
}

#[tokio::test]
async fn test_clearing_memberships_removes_all() {
    let fake = fixture();
    let connector = connector_over(fake.clone(), 100);

    connector
        .update_delta(
            ACCOUNT_OBJECT_CLASS,
            &uid(),
            AttributeDeltaSet::new().with(AttributeDelta::clear("group_membership")),
        )
        .await
        .unwrap();

    assert!(fake.groups_of(USER).is_empty());
}

#[tokio::test]
async fn test_first_failure_is_reported_after_all_changes_run() {
    let fake = fixture();
    fake.fail_next(
        HttpMethod::Post,
        "/group_memberships",
        box_error(403, "access_denied_insufficient_permissions", "Forbidden"),
    );
    let connector = connector_over(fake.clone(), 100);

    let err = connector
        .update_delta(
            ACCOUNT_OBJECT_CLASS,
            &uid(),
            AttributeDeltaSet::new().with(AttributeDelta::add_remove(
                "group_membership",
                ["D"],
                ["B"],
            )),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::PermissionDenied { .. }), "got {err:?}");
    // The removal still ran.
    assert_eq!(fake.groups_of(USER), vec!["A", "C"]);
}

#[tokio::test]
async fn test_field_changes_and_memberships_in_one_update() {
    let fake = fixture();
    let connector = connector_over(fake.clone(), 100);

    connector
        .update_delta(
            ACCOUNT_OBJECT_CLASS,
            &uid(),
            AttributeDeltaSet::new()
                .with(AttributeDelta::replace_single("job_title", "Chair"))
                .with(AttributeDelta::add_remove(
                    "group_membership",
                    ["D"],
                    Vec::<String>::new(),
                )),
        )
        .await
        .unwrap();

    assert_eq!(fake.user(USER).unwrap()["job_title"], "Chair");
    assert_eq!(fake.groups_of(USER), vec!["A", "B", "C", "D"]);
    assert_eq!(fake.calls()[0], "PUT /users/11446498");
}

#[tokio::test]
async fn test_membership_only_update_skips_put() {
    let fake = fixture();
    let connector = connector_over(fake.clone(), 100);

    connector
        .update_delta(
            ACCOUNT_OBJECT_CLASS,
            &uid(),
            AttributeDeltaSet::new().with(AttributeDelta::add_remove(
                "group_membership",
                Vec::<String>::new(),
                ["A"],
            )),
        )
        .await
        .unwrap();

    assert!(!fake.calls().iter().any(|call| call.starts_with("PUT")));
    assert_eq!(fake.groups_of(USER), vec!["B", "C"]);
}
