use rocket::http::{ContentType, Status};
use serde_json::json;

use crate::auth::AccountStatus;
use crate::db::{
    SessionFilter, SessionPatch, delete_session, get_notifications_for_member, get_session,
    get_session_summary, list_sessions, register_member, soft_delete_user, unregister_member,
    update_session,
};
use crate::error::AppError;
use crate::test::utils::{
    TestDbBuilder, bearer, create_standard_test_db, json_body, login_test_user, setup_test_client,
};

fn bad_request_message(result: Result<impl std::fmt::Debug, AppError>) -> String {
    match result {
        Err(AppError::BadRequest(message)) => message,
        other => panic!("expected a bad request, got {:?}", other),
    }
}

#[rocket::async_test]
async fn test_inactive_member_cannot_register() {
    let test_db = create_standard_test_db().await;

    let result = register_member(
        &test_db.pool,
        test_db.session_id("yoga"),
        test_db.member_id("inactive@gym.test"),
    )
    .await;

    assert_eq!(
        bad_request_message(result),
        "Cannot reserve a session without an active membership"
    );
}

#[rocket::async_test]
async fn test_only_approved_accounts_can_register() {
    let test_db = TestDbBuilder::new()
        .admin("admin@gym.test")
        .trainer("t@gym.test", "Trainer")
        .member_with("waiting@gym.test", "Waiting", AccountStatus::Pending, None, Some(true))
        .active_member("leaving@gym.test", "Leaving")
        .session("yoga", "t@gym.test", "2030-01-01", "18:00", 5)
        .build()
        .await
        .unwrap();
    let session_id = test_db.session_id("yoga");
    let leaving = test_db.member_id("leaving@gym.test");

    let pending =
        register_member(&test_db.pool, session_id, test_db.member_id("waiting@gym.test")).await;
    assert_eq!(
        bad_request_message(pending),
        "Cannot reserve a session for an account that is not approved"
    );

    soft_delete_user(&test_db.pool, test_db.user_id("leaving@gym.test"))
        .await
        .unwrap();
    let (client, test_db) = setup_test_client(test_db).await;
    let admin = login_test_user(&client, "admin@gym.test").await;
    let response = client
        .post(format!("/api/sessions/{}/register/{}", session_id, leaving))
        .header(bearer(&admin))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let summary = get_session_summary(&test_db.pool, session_id).await.unwrap();
    assert_eq!(summary.registered_count, 0);
}

#[rocket::async_test]
async fn test_single_spot_session_fills_up() {
    let test_db = TestDbBuilder::new()
        .trainer("t@gym.test", "Trainer")
        .active_member("a@gym.test", "A")
        .active_member("b@gym.test", "B")
        .session("solo", "t@gym.test", "2030-01-01", "09:00", 1)
        .build()
        .await
        .unwrap();
    let session_id = test_db.session_id("solo");

    register_member(&test_db.pool, session_id, test_db.member_id("a@gym.test"))
        .await
        .unwrap();
    let result =
        register_member(&test_db.pool, session_id, test_db.member_id("b@gym.test")).await;
    assert_eq!(bad_request_message(result), "Session is full");

    let summary = get_session_summary(&test_db.pool, session_id).await.unwrap();
    assert_eq!(summary.registered_count, 1);
    assert!(summary.is_full());
    assert_eq!(summary.available_spots(), 0);
}

#[rocket::async_test]
async fn test_duplicate_registration_is_rejected() {
    let test_db = create_standard_test_db().await;
    let session_id = test_db.session_id("yoga");
    let member_id = test_db.member_id("member@gym.test");

    register_member(&test_db.pool, session_id, member_id)
        .await
        .unwrap();
    let result = register_member(&test_db.pool, session_id, member_id).await;

    assert_eq!(
        bad_request_message(result),
        "Member is already registered for this session"
    );
}

#[rocket::async_test]
async fn test_registration_checks_session_before_member() {
    let test_db = create_standard_test_db().await;

    let missing_session =
        register_member(&test_db.pool, 9_999, test_db.member_id("member@gym.test")).await;
    assert!(matches!(missing_session, Err(AppError::NotFound(_))));

    let missing_member = register_member(&test_db.pool, test_db.session_id("yoga"), 9_999).await;
    assert!(matches!(missing_member, Err(AppError::NotFound(_))));

    let neither = register_member(&test_db.pool, 9_999, 9_999).await;
    match neither {
        Err(AppError::NotFound(message)) => assert!(message.contains("Session")),
        other => panic!("expected session not found, got {:?}", other),
    }
}

#[rocket::async_test]
async fn test_unregister_requires_a_registration() {
    let test_db = create_standard_test_db().await;
    let session_id = test_db.session_id("yoga");
    let member_id = test_db.member_id("member@gym.test");

    let result = unregister_member(&test_db.pool, session_id, member_id).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    register_member(&test_db.pool, session_id, member_id)
        .await
        .unwrap();
    unregister_member(&test_db.pool, session_id, member_id)
        .await
        .unwrap();
    assert_eq!(test_db.notification_count("member@gym.test").await, 0);
}

#[rocket::async_test]
async fn test_deleting_a_session_notifies_each_registered_member() {
    let test_db = TestDbBuilder::new()
        .trainer("t@gym.test", "Trainer")
        .active_member("a@gym.test", "A")
        .active_member("b@gym.test", "B")
        .active_member("c@gym.test", "C")
        .active_member("bystander@gym.test", "D")
        .session("yoga", "t@gym.test", "2030-01-01", "09:00", 5)
        .registration("yoga", "a@gym.test")
        .registration("yoga", "b@gym.test")
        .registration("yoga", "c@gym.test")
        .build()
        .await
        .unwrap();
    let session_id = test_db.session_id("yoga");

    let notified = delete_session(&test_db.pool, session_id).await.unwrap();
    assert_eq!(notified, 3);

    for email in ["a@gym.test", "b@gym.test", "c@gym.test"] {
        assert_eq!(test_db.notification_count(email).await, 1);
        let notifications =
            get_notifications_for_member(&test_db.pool, test_db.member_id(email))
                .await
                .unwrap();
        assert!(notifications[0].message.contains("Yoga"));
        assert!(notifications[0].message.contains("cancelled"));
    }
    assert_eq!(test_db.notification_count("bystander@gym.test").await, 0);

    assert!(matches!(
        get_session(&test_db.pool, session_id).await,
        Err(AppError::NotFound(_))
    ));
}

#[rocket::async_test]
async fn test_update_with_same_time_in_seconds_sends_nothing() {
    let test_db = TestDbBuilder::new()
        .trainer("t@gym.test", "Trainer")
        .active_member("a@gym.test", "A")
        .session("yoga", "t@gym.test", "2030-01-01", "18:00", 5)
        .registration("yoga", "a@gym.test")
        .build()
        .await
        .unwrap();

    let update = update_session(
        &test_db.pool,
        test_db.session_id("yoga"),
        SessionPatch {
            time: Some("18:00:00".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(update.changes.is_empty());
    assert_eq!(update.notified, 0);
    assert_eq!(update.session.time, "18:00");
    assert_eq!(test_db.notification_count("a@gym.test").await, 0);
}

#[rocket::async_test]
async fn test_update_notifies_registered_members_of_changes() {
    let test_db = TestDbBuilder::new()
        .trainer("t@gym.test", "Trainer")
        .active_member("a@gym.test", "A")
        .active_member("b@gym.test", "B")
        .session("yoga", "t@gym.test", "2030-01-01", "18:00", 5)
        .registration("yoga", "a@gym.test")
        .registration("yoga", "b@gym.test")
        .build()
        .await
        .unwrap();

    let update = update_session(
        &test_db.pool,
        test_db.session_id("yoga"),
        SessionPatch {
            time: Some("19:30".to_string()),
            max_participants: Some(8),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(
        update.changes,
        vec!["time changed from 18:00 to 19:30", "capacity changed from 5 to 8"]
    );
    assert_eq!(update.notified, 2);

    let notifications =
        get_notifications_for_member(&test_db.pool, test_db.member_id("a@gym.test"))
            .await
            .unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(
        notifications[0].message,
        "Your Yoga session on 2030-01-01 at 18:00 has been updated: \
         time changed from 18:00 to 19:30; capacity changed from 5 to 8."
    );
}

#[rocket::async_test]
async fn test_capacity_cannot_drop_below_registrations() {
    let test_db = TestDbBuilder::new()
        .trainer("t@gym.test", "Trainer")
        .active_member("a@gym.test", "A")
        .active_member("b@gym.test", "B")
        .session("yoga", "t@gym.test", "2030-01-01", "18:00", 5)
        .registration("yoga", "a@gym.test")
        .registration("yoga", "b@gym.test")
        .build()
        .await
        .unwrap();
    let session_id = test_db.session_id("yoga");

    let result = update_session(
        &test_db.pool,
        session_id,
        SessionPatch {
            max_participants: Some(1),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let session = get_session(&test_db.pool, session_id).await.unwrap();
    assert_eq!(session.max_participants, 5);
    assert_eq!(test_db.notification_count("a@gym.test").await, 0);

    let update = update_session(
        &test_db.pool,
        session_id,
        SessionPatch {
            max_participants: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(update.session.max_participants, 2);
}

#[rocket::async_test]
async fn test_list_sessions_filters() {
    let test_db = create_standard_test_db().await;
    let member_id = test_db.member_id("member@gym.test");
    register_member(&test_db.pool, test_db.session_id("spin"), member_id)
        .await
        .unwrap();

    let all = list_sessions(&test_db.pool, SessionFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].session.session_type, "Yoga");
    assert_eq!(all[0].trainer_name, "Ana Trainer");

    let by_trainer = list_sessions(
        &test_db.pool,
        SessionFilter {
            trainer_id: Some(test_db.trainer_id("other.trainer@gym.test")),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(by_trainer.len(), 1);
    assert_eq!(by_trainer[0].registered_count, 1);
    assert_eq!(by_trainer[0].available_spots(), 1);

    let by_member = list_sessions(
        &test_db.pool,
        SessionFilter {
            member_id: Some(member_id),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(by_member.len(), 1);
    assert_eq!(by_member[0].session.id, test_db.session_id("spin"));
}

#[rocket::async_test]
async fn test_session_endpoints_report_occupancy() {
    let test_db = create_standard_test_db().await;
    let spin_id = test_db.session_id("spin");
    let (client, _) = setup_test_client(test_db).await;
    let member = login_test_user(&client, "member@gym.test").await;

    let response = client
        .post(format!("/api/sessions/{}/register", spin_id))
        .header(bearer(&member))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);

    let response = client
        .get("/api/sessions?date=2030-06-03")
        .header(bearer(&member))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body = json_body(response).await;
    let sessions = body.as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["registeredCount"], 1);
    assert_eq!(sessions[0]["availableSpots"], 1);
    assert_eq!(sessions[0]["isFull"], false);
    assert_eq!(sessions[0]["time"], "07:30");

    let response = client.get("/api/sessions/me").header(bearer(&member)).dispatch().await;
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let response = client
        .get("/api/sessions?date=June")
        .header(bearer(&member))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let response = client
        .post(format!("/api/sessions/{}/register", spin_id))
        .header(bearer(&member))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let body = json_body(response).await;
    assert_eq!(
        body["errors"]["request"][0],
        "Member is already registered for this session"
    );

    let response = client
        .delete(format!("/api/sessions/{}/register", spin_id))
        .header(bearer(&member))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
}

#[rocket::async_test]
async fn test_trainers_manage_only_their_own_sessions() {
    let test_db = create_standard_test_db().await;
    let yoga_id = test_db.session_id("yoga");
    let spin_id = test_db.session_id("spin");
    let other_trainer = test_db.trainer_id("other.trainer@gym.test");
    let (client, _) = setup_test_client(test_db).await;
    let trainer = login_test_user(&client, "trainer@gym.test").await;

    let response = client
        .put(format!("/api/sessions/{}", spin_id))
        .header(ContentType::JSON)
        .header(bearer(&trainer))
        .body(json!({"type": "Pilates"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client
        .delete(format!("/api/sessions/{}", spin_id))
        .header(bearer(&trainer))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client
        .put(format!("/api/sessions/{}", yoga_id))
        .header(ContentType::JSON)
        .header(bearer(&trainer))
        .body(json!({"trainerId": other_trainer}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client
        .put(format!("/api/sessions/{}", yoga_id))
        .header(ContentType::JSON)
        .header(bearer(&trainer))
        .body(json!({"type": "Pilates", "time": "18:00"}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body = json_body(response).await;
    assert_eq!(body["session"]["type"], "Pilates");
    assert_eq!(body["changes"].as_array().unwrap().len(), 1);
    assert_eq!(body["notified"], 0);

    let response = client
        .post("/api/sessions/me")
        .header(ContentType::JSON)
        .header(bearer(&trainer))
        .body(
            json!({"date": "2030-07-01", "time": "06:15", "type": "HIIT", "maxParticipants": 12})
                .to_string(),
        )
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
    let body = json_body(response).await;
    assert_eq!(body["trainerName"], "Ana Trainer");
    assert_eq!(body["availableSpots"], 12);

    let response = client
        .post("/api/sessions/me")
        .header(ContentType::JSON)
        .header(bearer(&trainer))
        .body(
            json!({"date": "2030-07-01", "time": "25:00", "type": "HIIT", "maxParticipants": 0})
                .to_string(),
        )
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let body = json_body(response).await;
    assert!(body["errors"]["time"].is_array());
    assert!(body["errors"]["max_participants"].is_array());

    let response = client.get("/api/sessions/me").header(bearer(&trainer)).dispatch().await;
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let member = login_test_user(&client, "member@gym.test").await;
    let response = client
        .get(format!("/api/sessions/{}/members", yoga_id))
        .header(bearer(&member))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
}

#[rocket::async_test]
async fn test_admin_manages_any_session() {
    let test_db = create_standard_test_db().await;
    let yoga_id = test_db.session_id("yoga");
    let member_id = test_db.member_id("member@gym.test");
    let other_trainer = test_db.trainer_id("other.trainer@gym.test");
    let (client, test_db) = setup_test_client(test_db).await;
    let admin = login_test_user(&client, "admin@gym.test").await;

    let response = client
        .post("/api/sessions")
        .header(ContentType::JSON)
        .header(bearer(&admin))
        .body(
            json!({"date": "2030-07-01", "time": "06:15", "type": "HIIT", "maxParticipants": 4})
                .to_string(),
        )
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let response = client
        .post(format!("/api/sessions/{}/register/{}", yoga_id, member_id))
        .header(bearer(&admin))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);

    let response = client
        .get(format!("/api/sessions/{}/members", yoga_id))
        .header(bearer(&admin))
        .dispatch()
        .await;
    let body = json_body(response).await;
    assert_eq!(body[0]["name"], "Mia Member");

    let response = client
        .put(format!("/api/sessions/{}", yoga_id))
        .header(ContentType::JSON)
        .header(bearer(&admin))
        .body(json!({"trainerId": other_trainer}).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body = json_body(response).await;
    assert_eq!(body["session"]["trainerName"], "Marko Trainer");
    assert_eq!(body["notified"], 1);

    let response = client
        .get("/api/sessions/me")
        .header(bearer(&admin))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client
        .delete(format!("/api/sessions/{}", yoga_id))
        .header(bearer(&admin))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body = json_body(response).await;
    assert_eq!(body["notified"], 1);
    assert_eq!(test_db.notification_count("member@gym.test").await, 2);
}
