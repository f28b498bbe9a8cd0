#[path = "../common/mod.rs"]
mod common;

use common::*;

fn ids(ctx: &TestContext) -> Vec<i64> {
    let (licenses, _) = ctx.engine.list(&LicenseFilter::default(), 100, 0).unwrap();
    let mut ids: Vec<i64> = licenses.iter().map(|l| l.id).collect();
    ids.sort();
    ids
}

#[test]
fn deleted_id_is_reused_by_next_issue() {
    let ctx = setup_engine();
    for _ in 0..5 {
        issue_license(&ctx);
    }
    ctx.engine.delete(3, &Origin::system()).unwrap();

    let next = issue_license(&ctx);
    assert_eq!(next.id, 3, "the gap left by id 3 is filled first");

    let after = issue_license(&ctx);
    assert_eq!(after.id, 6, "no gap left, so the sequence continues");
}

#[test]
fn smallest_gap_wins() {
    let ctx = setup_engine();
    for _ in 0..6 {
        issue_license(&ctx);
    }
    ctx.engine.delete(5, &Origin::system()).unwrap();
    ctx.engine.delete(2, &Origin::system()).unwrap();

    assert_eq!(issue_license(&ctx).id, 2);
    assert_eq!(issue_license(&ctx).id, 5);
    assert_eq!(issue_license(&ctx).id, 7);
}

#[test]
fn deleting_the_highest_id_frees_it() {
    let ctx = setup_engine();
    for _ in 0..3 {
        issue_license(&ctx);
    }
    ctx.engine.delete(3, &Origin::system()).unwrap();
    assert_eq!(
        issue_license(&ctx).id,
        3,
        "the sequence is rewound to the current maximum on delete"
    );
}

#[test]
fn delete_unknown_id_is_not_found() {
    let ctx = setup_engine();
    let result = ctx.engine.delete(42, &Origin::system());
    assert!(matches!(result, Err(licensegate::error::AppError::NotFound(_))));
}

#[test]
fn reorder_compacts_and_preserves_order() {
    let ctx = setup_engine();
    let issued: Vec<License> = (0..9).map(|_| issue_license(&ctx)).collect();
    for id in [3, 4, 6, 7, 8] {
        ctx.engine.delete(id, &Origin::system()).unwrap();
    }
    assert_eq!(ids(&ctx), vec![1, 2, 5, 9]);

    let count = ctx.engine.reorder_ids(&Origin::system()).unwrap();
    assert_eq!(count, 4);
    assert_eq!(ids(&ctx), vec![1, 2, 3, 4]);

    let expected_keys: Vec<&str> = [0, 1, 4, 8]
        .iter()
        .map(|&i| issued[i].license_key.as_str())
        .collect();
    for (new_id, key) in (1..=4).zip(expected_keys) {
        assert_eq!(
            ctx.engine.get(new_id).unwrap().license_key,
            key,
            "id {} should now hold the key that was {}th in id order",
            new_id,
            new_id
        );
    }

    assert_eq!(issue_license(&ctx).id, 5, "sequence restarts after the compacted range");
}

#[test]
fn reorder_keeps_license_state() {
    let ctx = setup_engine();
    issue_license(&ctx);
    let second = issue_license(&ctx);
    ctx.engine.delete(1, &Origin::system()).unwrap();
    ctx.engine
        .verify(&second.license_key, "M1", &Origin::system())
        .unwrap();
    ctx.engine
        .set_note(second.id, Some("office pc"), &Origin::system())
        .unwrap();

    ctx.engine.reorder_ids(&Origin::system()).unwrap();
    let moved = ctx.engine.get(1).unwrap();
    assert_eq!(moved.license_key, second.license_key);
    assert_eq!(moved.status, LicenseStatus::Used);
    assert_eq!(moved.machine_code.as_deref(), Some("M1"));
    assert_eq!(moved.machine_note.as_deref(), Some("office pc"));
    assert_eq!(moved.expires_at, second.expires_at);
}

#[test]
fn reorder_empty_table() {
    let ctx = setup_engine();
    assert_eq!(ctx.engine.reorder_ids(&Origin::system()).unwrap(), 0);
}
