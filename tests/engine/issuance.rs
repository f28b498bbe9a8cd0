#[path = "../common/mod.rs"]
mod common;

use common::*;
use licensegate::engine::validate_key_format;
use licensegate::error::AppError;

#[test]
fn issue_sets_expiry_and_unused_status() {
    let ctx = setup_engine();
    let license = issue_license(&ctx);

    assert_eq!(license.id, 1);
    assert_eq!(license.status, LicenseStatus::Unused);
    assert_eq!(license.machine_code, None);
    assert_eq!(license.duration_days, 30);
    assert_eq!(license.expires_at, TEST_EPOCH + 30 * SECONDS_PER_DAY);
    assert_eq!(license.created_at, TEST_EPOCH);
    assert!(
        validate_key_format(&license.license_key, &KeyFormat::default()),
        "generated key {} should match the default format",
        license.license_key
    );
}

#[test]
fn duration_out_of_range_is_rejected() {
    let ctx = setup_engine();
    for days in [0, -5, 3651] {
        let result = ctx.engine.issue(days, None, None, &Origin::system());
        assert!(
            matches!(result, Err(AppError::Validation(_))),
            "duration {} should be rejected",
            days
        );
    }
    assert!(ctx.engine.issue(3650, None, None, &Origin::system()).is_ok());
}

#[test]
fn key_override_is_used_and_duplicates_conflict() {
    let ctx = setup_engine();
    let license = ctx
        .engine
        .issue(10, Some("custom-key-001"), None, &Origin::system())
        .unwrap();
    assert_eq!(license.license_key, "custom-key-001");

    let duplicate = ctx
        .engine
        .issue(10, Some("custom-key-001"), None, &Origin::system());
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let empty = ctx.engine.issue(10, Some("  "), None, &Origin::system());
    assert!(matches!(empty, Err(AppError::Validation(_))));
}

#[test]
fn custom_format_is_applied_and_bounded() {
    let ctx = setup_engine();
    let format = KeyFormat {
        prefix: "PRO-".to_string(),
        length: 16,
        charset: "ABCDEF0123456789".to_string(),
    };
    let license = ctx
        .engine
        .issue(30, None, Some(&format), &Origin::system())
        .unwrap();
    assert_eq!(license.license_key.len(), 16);
    assert!(license.license_key.starts_with("PRO-"));
    assert!(validate_key_format(&license.license_key, &format));

    for bad in [
        KeyFormat { length: 7, ..format.clone() },
        KeyFormat { length: 65, ..format.clone() },
        KeyFormat { prefix: String::new(), ..format.clone() },
        KeyFormat { charset: String::new(), ..format.clone() },
    ] {
        let result = ctx.engine.issue(30, None, Some(&bad), &Origin::system());
        assert!(
            matches!(result, Err(AppError::Validation(_))),
            "format {:?} should be rejected",
            bad
        );
    }
}

#[test]
fn batch_issues_distinct_keys() {
    let ctx = setup_engine();
    let licenses = ctx.engine.issue_batch(25, 90, None, &Origin::system()).unwrap();
    assert_eq!(licenses.len(), 25);

    let mut keys: Vec<_> = licenses.iter().map(|l| l.license_key.clone()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 25, "batch keys must be unique");

    let ids: Vec<i64> = licenses.iter().map(|l| l.id).collect();
    assert_eq!(ids, (1..=25).collect::<Vec<_>>());
}

#[test]
fn batch_count_bounds() {
    let ctx = setup_engine();
    for count in [0, 101] {
        let result = ctx.engine.issue_batch(count, 30, None, &Origin::system());
        assert!(
            matches!(result, Err(AppError::Validation(_))),
            "batch of {} should be rejected",
            count
        );
    }
    assert_eq!(ctx.engine.issue_batch(100, 30, None, &Origin::system()).unwrap().len(), 100);
}

#[test]
fn issuance_is_audited() {
    let ctx = setup_engine();
    issue_license(&ctx);
    ctx.engine.issue_batch(3, 30, None, &Origin::system()).unwrap();

    let (logs, total) = ctx.engine.admin_logs(50, 0).unwrap();
    assert_eq!(total, 2, "one entry per issue call, one per batch");
    let actions: Vec<&str> = logs.iter().map(|l| l.action.as_str()).collect();
    assert!(actions.contains(&"create_license"));
    assert!(actions.contains(&"batch_create_license"));
}

#[test]
fn failed_batch_still_audits_the_licenses_it_issued() {
    let ctx = setup_engine();
    // A one-character charset leaves room for exactly one key.
    let format = KeyFormat {
        prefix: "zzzzzzz".to_string(),
        length: 8,
        charset: "a".to_string(),
    };

    let result = ctx.engine.issue_batch(3, 30, Some(&format), &Origin::system());
    assert!(matches!(result, Err(AppError::Internal(_))), "got {:?}", result.map(|l| l.len()));

    let (licenses, total) = ctx.engine.list(&LicenseFilter::default(), 50, 0).unwrap();
    assert_eq!(total, 1, "the license issued before the failure stays");
    assert_eq!(licenses[0].license_key, "zzzzzzza");

    let (logs, _) = ctx.engine.admin_logs(50, 0).unwrap();
    let batch: Vec<_> = logs
        .iter()
        .filter(|l| l.action == "batch_create_license")
        .collect();
    assert_eq!(batch.len(), 1);
    assert!(
        batch[0].detail.as_deref().unwrap().contains("1 of 3"),
        "detail: {:?}",
        batch[0].detail
    );
}

#[test]
fn batch_failing_on_first_license_writes_no_audit_entry() {
    let ctx = setup_engine();
    let format = KeyFormat {
        prefix: "zzzzzzz".to_string(),
        length: 8,
        charset: "a".to_string(),
    };
    ctx.engine
        .issue(30, Some("zzzzzzza"), None, &Origin::system())
        .unwrap();

    assert!(ctx.engine.issue_batch(2, 30, Some(&format), &Origin::system()).is_err());
    let (logs, _) = ctx.engine.admin_logs(50, 0).unwrap();
    assert!(logs.iter().all(|l| l.action != "batch_create_license"));
}
