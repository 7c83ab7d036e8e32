use rocket::http::{ContentType, Status};
use serde_json::json;

use crate::db::{
    MemberPatch, approve_package, delete_member, get_member, get_member_details,
    get_member_details_by_user_id, get_user, list_members, reject_package, request_package,
    soft_delete_user, update_member,
};
use crate::error::AppError;
use crate::test::utils::{
    TERM_DAYS, TestDbBuilder, bearer, create_standard_test_db, json_body, login_test_user,
    setup_test_client,
};

#[rocket::async_test]
async fn test_assigning_a_package_activates_the_member() {
    let test_db = create_standard_test_db().await;
    let id = test_db.member_id("inactive@gym.test");
    let package_id = test_db.package_id("Monthly");

    let member = update_member(
        &test_db.pool,
        id,
        MemberPatch {
            package_id: Some(Some(package_id)),
            ..Default::default()
        },
        TERM_DAYS,
    )
    .await
    .unwrap();

    assert!(member.is_active);
    assert_eq!(member.package_id, Some(package_id));
    assert!(member.package_expires_at.is_some());

    let member = update_member(
        &test_db.pool,
        id,
        MemberPatch {
            package_id: Some(None),
            ..Default::default()
        },
        TERM_DAYS,
    )
    .await
    .unwrap();

    assert!(!member.is_active);
    assert_eq!(member.package_id, None);
    assert_eq!(member.package_expires_at, None);
}

#[rocket::async_test]
async fn test_null_clears_optional_profile_fields() {
    let test_db = create_standard_test_db().await;
    let (client, _) = setup_test_client(test_db).await;
    let member = login_test_user(&client, "member@gym.test").await;

    let response = client
        .put("/api/members/me")
        .header(ContentType::JSON)
        .header(bearer(&member))
        .body(json!({"gender": "female", "dateOfBirth": "1990-04-12"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body = json_body(response).await;
    assert_eq!(body["gender"], "female");

    let response = client
        .put("/api/members/me")
        .header(ContentType::JSON)
        .header(bearer(&member))
        .body(json!({"gender": null, "name": "Mia M."}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body = json_body(response).await;
    assert!(body["gender"].is_null());
    assert_eq!(body["dateOfBirth"], "1990-04-12");
    assert_eq!(body["name"], "Mia M.");
}

#[rocket::async_test]
async fn test_explicit_is_active_wins_over_derivation() {
    let test_db = create_standard_test_db().await;
    let id = test_db.member_id("inactive@gym.test");
    let package_id = test_db.package_id("Monthly");

    let member = update_member(
        &test_db.pool,
        id,
        MemberPatch {
            package_id: Some(Some(package_id)),
            is_active: Some(false),
            ..Default::default()
        },
        TERM_DAYS,
    )
    .await
    .unwrap();

    assert!(!member.is_active);
    assert_eq!(member.package_id, Some(package_id));
}

#[rocket::async_test]
async fn test_unrelated_edit_keeps_activity() {
    let test_db = create_standard_test_db().await;
    let id = test_db.member_id("member@gym.test");

    sqlx::query("UPDATE members SET is_active = FALSE WHERE id = ?")
        .bind(id)
        .execute(&test_db.pool)
        .await
        .unwrap();

    let member = update_member(
        &test_db.pool,
        id,
        MemberPatch {
            name: Some("Mia Renamed".to_string()),
            ..Default::default()
        },
        TERM_DAYS,
    )
    .await
    .unwrap();

    assert_eq!(member.name, "Mia Renamed");
    assert!(!member.is_active);
    assert!(member.package_id.is_some());
}

#[rocket::async_test]
async fn test_unknown_package_is_not_found() {
    let test_db = create_standard_test_db().await;
    let id = test_db.member_id("inactive@gym.test");

    let result = update_member(
        &test_db.pool,
        id,
        MemberPatch {
            package_id: Some(Some(4_242)),
            ..Default::default()
        },
        TERM_DAYS,
    )
    .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[rocket::async_test]
async fn test_package_request_flow() {
    let test_db = TestDbBuilder::new()
        .package("Monthly", 49.0)
        .withdrawn_package("Legacy", 10.0)
        .member("m@gym.test", "Member")
        .build()
        .await
        .unwrap();
    let id = test_db.member_id("m@gym.test");
    let monthly = test_db.package_id("Monthly");
    let legacy = test_db.package_id("Legacy");

    let withdrawn = request_package(&test_db.pool, id, legacy).await;
    assert!(matches!(withdrawn, Err(AppError::BadRequest(_))));

    let missing = request_package(&test_db.pool, id, 777).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    let member = request_package(&test_db.pool, id, monthly).await.unwrap();
    assert_eq!(member.pending_package_id, Some(monthly));
    assert!(!member.is_active);

    let member = approve_package(&test_db.pool, id, TERM_DAYS).await.unwrap();
    assert_eq!(member.package_id, Some(monthly));
    assert_eq!(member.pending_package_id, None);
    assert!(member.is_active);
    assert!(member.package_expires_at.is_some());

    let nothing_pending = approve_package(&test_db.pool, id, TERM_DAYS).await;
    assert!(matches!(nothing_pending, Err(AppError::BadRequest(_))));

    request_package(&test_db.pool, id, monthly).await.unwrap();
    let member = reject_package(&test_db.pool, id).await.unwrap();
    assert_eq!(member.pending_package_id, None);
    assert_eq!(member.package_id, Some(monthly));
}

#[rocket::async_test]
async fn test_delete_member_removes_registrations_and_account() {
    let test_db = TestDbBuilder::new()
        .trainer("t@gym.test", "Trainer")
        .active_member("m@gym.test", "Member")
        .session("yoga", "t@gym.test", "2030-01-01", "10:00", 5)
        .registration("yoga", "m@gym.test")
        .build()
        .await
        .unwrap();
    let member_id = test_db.member_id("m@gym.test");
    let user_id = test_db.user_id("m@gym.test");

    delete_member(&test_db.pool, member_id).await.unwrap();

    assert!(matches!(
        get_member(&test_db.pool, member_id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        get_user(&test_db.pool, user_id).await,
        Err(AppError::NotFound(_))
    ));

    let registrations = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM session_registrations WHERE member_id = ?",
    )
    .bind(member_id)
    .fetch_one(&test_db.pool)
    .await
    .unwrap();
    assert_eq!(registrations, 0);

    let again = delete_member(&test_db.pool, member_id).await;
    assert!(matches!(again, Err(AppError::NotFound(_))));
}

#[rocket::async_test]
async fn test_member_lookup_tolerates_missing_package() {
    let test_db = create_standard_test_db().await;
    let user_id = test_db.user_id("inactive@gym.test");

    let details = get_member_details_by_user_id(&test_db.pool, user_id)
        .await
        .unwrap()
        .unwrap();
    assert!(details.package.is_none());
    assert_eq!(details.email.as_deref(), Some("inactive@gym.test"));

    let admin_id = test_db.user_id("admin@gym.test");
    assert!(
        get_member_details_by_user_id(&test_db.pool, admin_id)
            .await
            .unwrap()
            .is_none()
    );

    let details = get_member_details(&test_db.pool, test_db.member_id("member@gym.test"))
        .await
        .unwrap();
    assert_eq!(details.package.unwrap().name, "Monthly");
}

#[rocket::async_test]
async fn test_list_members_skips_deleted_accounts() {
    let test_db = create_standard_test_db().await;
    soft_delete_user(&test_db.pool, test_db.user_id("inactive@gym.test"))
        .await
        .unwrap();

    let members = list_members(&test_db.pool).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].member.name, "Mia Member");
}

#[rocket::async_test]
async fn test_member_endpoints_enforce_roles() {
    let test_db = create_standard_test_db().await;
    let other_id = test_db.member_id("inactive@gym.test");
    let own_id = test_db.member_id("member@gym.test");
    let (client, _) = setup_test_client(test_db).await;

    let member = login_test_user(&client, "member@gym.test").await;

    let response = client.get("/api/members").header(bearer(&member)).dispatch().await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client
        .get(format!("/api/members/{}", other_id))
        .header(bearer(&member))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client
        .get(format!("/api/members/{}", own_id))
        .header(bearer(&member))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let trainer = login_test_user(&client, "trainer@gym.test").await;
    let response = client.get("/api/members").header(bearer(&trainer)).dispatch().await;
    assert_eq!(response.status(), Status::Ok);

    let response = client
        .delete(format!("/api/members/{}", other_id))
        .header(bearer(&trainer))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client.get("/api/members/me").header(bearer(&trainer)).dispatch().await;
    assert_eq!(response.status(), Status::Forbidden);
}

#[rocket::async_test]
async fn test_admin_patch_distinguishes_null_from_absent() {
    let test_db = create_standard_test_db().await;
    let id = test_db.member_id("member@gym.test");
    let (client, _) = setup_test_client(test_db).await;
    let admin = login_test_user(&client, "admin@gym.test").await;

    let response = client
        .put(format!("/api/members/{}", id))
        .header(ContentType::JSON)
        .header(bearer(&admin))
        .body(json!({"level": "expert"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body = json_body(response).await;
    assert_eq!(body["level"], "expert");
    assert!(body["packageId"].is_i64());
    assert_eq!(body["isActive"], true);

    let response = client
        .put(format!("/api/members/{}", id))
        .header(ContentType::JSON)
        .header(bearer(&admin))
        .body(json!({"packageId": null}).to_string())
        .dispatch()
        .await;
    let body = json_body(response).await;
    assert!(body["packageId"].is_null());
    assert_eq!(body["isActive"], false);
}

#[rocket::async_test]
async fn test_member_self_service() {
    let test_db = create_standard_test_db().await;
    let package_id = test_db.package_id("Monthly");
    let (client, _) = setup_test_client(test_db).await;
    let token = login_test_user(&client, "inactive@gym.test").await;

    let response = client
        .put("/api/members/me")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(json!({"name": "Ivo Updated", "level": "medium"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body = json_body(response).await;
    assert_eq!(body["name"], "Ivo Updated");
    assert_eq!(body["isActive"], false);

    let response = client
        .post("/api/members/me/package-request")
        .header(ContentType::JSON)
        .header(bearer(&token))
        .body(json!({"packageId": package_id}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body = json_body(response).await;
    assert_eq!(body["pendingPackageId"], package_id);

    let response = client.get("/api/members/me").header(bearer(&token)).dispatch().await;
    let body = json_body(response).await;
    assert_eq!(body["email"], "inactive@gym.test");
    assert!(body["package"].is_null());
}
