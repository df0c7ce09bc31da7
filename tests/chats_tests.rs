mod common;

use axum::http::{Method, StatusCode};
use common::*;
use serde_json::json;

#[tokio::test]
async fn test_chats_require_access_token() {
    let (app, db, jwt) = create_test_app().await;
    let alice = create_user(&db, &jwt, "alice").await;

    let (status, _) = get(&app, "/chats", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(&app, "/chats", Some(&alice.refresh)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(&app, "/chats", Some(&alice.access)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_chat_includes_caller() {
    let (app, db, jwt) = create_test_app().await;
    let alice = create_user(&db, &jwt, "alice").await;
    let bob = create_user(&db, &jwt, "bob").await;

    let (status, chat) = send(
        &app,
        request(
            Method::POST,
            "/chats/create",
            Some(&bearer(&alice.access)),
            Some(json!({"userIds": [bob.id]})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let mut members: Vec<i64> = chat["userIds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect();
    members.sort_unstable();
    assert_eq!(members, vec![alice.id, bob.id]);
}

#[tokio::test]
async fn test_create_chat_with_unknown_user() {
    let (app, db, jwt) = create_test_app().await;
    let alice = create_user(&db, &jwt, "alice").await;

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/chats/create",
            Some(&bearer(&alice.access)),
            Some(json!({"userIds": [9999]})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_chat_messages() {
    let (app, db, jwt) = create_test_app().await;
    let alice = create_user(&db, &jwt, "alice").await;
    let bob = create_user(&db, &jwt, "bob").await;
    let chat_id = db.chats().create(&[alice.id, bob.id]).await.unwrap();
    let messages = db.messages();
    let mut sent = Vec::new();
    for text in ["hi", "hello", "how are you"] {
        sent.push(messages.create(chat_id, alice.id, text).await.unwrap().id);
    }

    let uri = format!("/chats/{}/messages?take=2&order=DESC", chat_id);
    let (status, page) = get(&app, &uri, Some(&bob.access)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&page), vec![sent[2], sent[1]]);
    assert_eq!(page["data"][0]["message"], "how are you");
    assert_eq!(page["hasNextPage"], true);
    assert!(
        page["next"]
            .as_str()
            .unwrap()
            .starts_with(&format!("http://localhost:3000/chats/{}/messages?", chat_id))
    );

    let next = next_path(&page).unwrap();
    let (_, page) = get(&app, &next, Some(&bob.access)).await;
    assert_eq!(ids(&page), vec![sent[0]]);
    assert!(page["next"].is_null());
}

#[tokio::test]
async fn test_messages_of_unknown_chat() {
    let (app, db, jwt) = create_test_app().await;
    let alice = create_user(&db, &jwt, "alice").await;

    let (status, _) = get(&app, "/chats/77/messages", Some(&alice.access)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_chats_offset_mode() {
    let (app, db, jwt) = create_test_app().await;
    let alice = create_user(&db, &jwt, "alice").await;
    let bob = create_user(&db, &jwt, "bob").await;
    for _ in 0..3 {
        db.chats().create(&[alice.id, bob.id]).await.unwrap();
    }

    let (status, page) = get(&app, "/chats?page=1&take=2", Some(&alice.access)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&page).len(), 2);
    assert_eq!(page["total"], 3);
}
