//! Comment endpoints nested under their ad.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;
use skymarket::db::models::Role;

#[tokio::test]
async fn test_create_comment_under_ad() {
    let app = TestApp::new();
    let seller = app.user("seller@mail.com", Role::User).await;
    let buyer = app.user("buyer@mail.com", Role::User).await;
    let ad = app.ad(&seller, "Bike", "100").await;

    let (status, comment) = app
        .post(
            &format!("/ads/{}/comments/", ad.id),
            Some(&buyer),
            json!({ "text": "Is it still available?" }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["ad"], ad.id);
    assert_eq!(comment["author"], buyer.id);
    assert_eq!(comment["text"], "Is it still available?");

    let (status, fetched) = app
        .get(
            &format!("/ads/{}/comments/{}/", ad.id, comment["id"]),
            Some(&seller),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, comment);
}

#[tokio::test]
async fn test_comment_on_missing_ad_is_not_found() {
    let app = TestApp::new();
    let user = app.user("test@mail.com", Role::User).await;

    let (status, body) = app
        .post("/ads/999/comments/", Some(&user), json!({ "text": "hello" }))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "Not found." }));

    let (status, _) = app.get("/ads/999/comments/", Some(&user)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_numeric_comment_id_is_json_not_found() {
    let app = TestApp::new();
    let user = app.user("test@mail.com", Role::User).await;
    let ad = app.ad(&user, "Lamp", "10").await;

    let (status, body) = app
        .get(&format!("/ads/{}/comments/first/", ad.id), Some(&user))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "Not found." }));
}

#[tokio::test]
async fn test_comment_text_is_required() {
    let app = TestApp::new();
    let user = app.user("test@mail.com", Role::User).await;
    let ad = app.ad(&user, "Bike", "100").await;

    let (status, body) = app
        .post(&format!("/ads/{}/comments/", ad.id), Some(&user), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "text": ["This field is required."] }));

    let (status, body) = app
        .post(
            &format!("/ads/{}/comments/", ad.id),
            Some(&user),
            json!({ "text": "   " }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "text": ["This field may not be blank."] }));
}

#[tokio::test]
async fn test_comment_under_wrong_ad_is_not_found() {
    let app = TestApp::new();
    let user = app.user("test@mail.com", Role::User).await;
    let admin = app.user("admin@mail.com", Role::Admin).await;
    let first = app.ad(&user, "First", "1").await;
    let second = app.ad(&user, "Second", "1").await;
    let (_, comment) = app
        .post(
            &format!("/ads/{}/comments/", first.id),
            Some(&user),
            json!({ "text": "hello" }),
        )
        .await;
    let comment_id = &comment["id"];

    let (status, body) = app
        .get(
            &format!("/ads/{}/comments/{}/", second.id, comment_id),
            Some(&user),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "detail": "Not found." }));

    // Admin privileges do not widen the lookup scope
    let (status, _) = app
        .patch(
            &format!("/ads/{}/comments/update/{}/", second.id, comment_id),
            Some(&admin),
            json!({ "text": "moved" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .delete(
            &format!("/ads/{}/comments/delete/{}/", second.id, comment_id),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, fetched) = app
        .get(
            &format!("/ads/{}/comments/{}/", first.id, comment_id),
            Some(&user),
        )
        .await;
    assert_eq!(fetched["text"], "hello");
}

#[tokio::test]
async fn test_only_author_or_admin_mutates_comment() {
    let app = TestApp::new();
    let seller = app.user("seller@mail.com", Role::User).await;
    let buyer = app.user("buyer@mail.com", Role::User).await;
    let admin = app.user("admin@mail.com", Role::Admin).await;
    let ad = app.ad(&seller, "Bike", "100").await;
    let (_, comment) = app
        .post(
            &format!("/ads/{}/comments/", ad.id),
            Some(&buyer),
            json!({ "text": "lowball offer" }),
        )
        .await;
    let update_uri = format!("/ads/{}/comments/update/{}/", ad.id, comment["id"]);
    let delete_uri = format!("/ads/{}/comments/delete/{}/", ad.id, comment["id"]);

    // Owning the ad does not grant rights over its comments
    let (status, body) = app
        .patch(&update_uri, Some(&seller), json!({ "text": "edited" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body,
        json!({ "detail": "You are not the owner or administrator of this comment" })
    );
    let (status, _) = app.delete(&delete_uri, Some(&seller)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .patch(&update_uri, Some(&buyer), json!({ "text": "fair offer" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "fair offer");
    assert_eq!(body["created_at"], comment["created_at"]);

    let (status, _) = app.delete(&delete_uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.delete(&delete_uri, Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comment_list_page_size_is_adjustable() {
    let app = TestApp::new();
    let user = app.user("test@mail.com", Role::User).await;
    let ad = app.ad(&user, "Bike", "100").await;
    let other = app.ad(&user, "Chair", "100").await;
    for i in 0..3 {
        app.post(
            &format!("/ads/{}/comments/", ad.id),
            Some(&user),
            json!({ "text": format!("c{i}") }),
        )
        .await;
    }
    app.post(
        &format!("/ads/{}/comments/", other.id),
        Some(&user),
        json!({ "text": "elsewhere" }),
    )
    .await;

    let (status, page) = app
        .get(&format!("/ads/{}/comments/?page_size=2", ad.id), Some(&user))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 3);
    assert_eq!(page["results"].as_array().unwrap().len(), 2);
    assert_eq!(page["results"][0]["text"], "c2");
    assert_eq!(
        page["next"],
        format!("http://testserver/ads/{}/comments/?page=2&page_size=2", ad.id)
    );

    let (_, page) = app
        .get(
            &format!("/ads/{}/comments/?ordering=created_at", ad.id),
            Some(&user),
        )
        .await;
    assert_eq!(page["results"][0]["text"], "c0");
    assert_eq!(page["next"], json!(null));
}
