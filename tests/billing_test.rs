mod common;

use common::TestApp;
use orgkit::models::OrgStatus;
use orgkit::{billing, organizations, AppError, Capability, MembershipRole};

#[tokio::test]
async fn owner_reads_the_billing_snapshot() {
    let app = TestApp::spawn();
    let (owner_identity, _, org_id) = app.signup_with_org("Acme Inc.", "acme").await;

    let snapshot = billing::get_organization_billing(&app.state, Some(&owner_identity), Some(org_id))
        .await
        .unwrap()
        .expect("owner should see billing");
    assert_eq!(snapshot.plan, "free");
    assert!(snapshot.active);
}

#[tokio::test]
async fn billing_degrades_to_none_without_the_capability() {
    let app = TestApp::spawn();
    let (_, _, org_id) = app.signup_with_org("Acme Inc.", "acme").await;
    let (member_identity, _) = app.join_org(org_id, MembershipRole::Member, "Member").await;

    assert!(
        billing::get_organization_billing(&app.state, Some(&member_identity), Some(org_id))
            .await
            .unwrap()
            .is_none()
    );
    assert!(billing::get_organization_billing(&app.state, None, Some(org_id))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn billing_gate_requires_an_owner() {
    let app = TestApp::spawn();
    let (owner_identity, _, org_id) = app.signup_with_org("Acme Inc.", "acme").await;
    let (admin_identity, _) = app.join_org(org_id, MembershipRole::Admin, "Admin").await;

    billing::assert_billing_manager(&app.state, Some(&owner_identity), Some(org_id))
        .await
        .unwrap();

    let err = billing::assert_billing_manager(&app.state, Some(&admin_identity), Some(org_id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::OrgForbidden(_)));
}

#[tokio::test]
async fn disabled_organizations_remain_billable_but_nothing_else() {
    let app = TestApp::spawn();
    let (owner_identity, _, org_id) = app.signup_with_org("Acme Inc.", "acme").await;

    let mut org = app.state.store.get_organization(org_id).unwrap();
    org.status = OrgStatus::Disabled;
    app.state.store.update_organization(org).unwrap();

    // Billing access survives the disabled status.
    assert!(
        billing::get_organization_billing(&app.state, Some(&owner_identity), Some(org_id))
            .await
            .unwrap()
            .is_some()
    );

    // Every other capability is gated off.
    let err = orgkit::authz::require_org_capability(
        &app.state,
        Some(&owner_identity),
        Capability::OrgSettingsManage,
        Some(org_id),
    )
    .unwrap_err();
    assert!(matches!(err, AppError::OrgDisabled(_)));

    let err = organizations::update(
        &app.state,
        Some(&owner_identity),
        org_id,
        organizations::UpdateOrganizationArgs {
            name: Some("Renamed".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::OrgDisabled(_)));
}
