use std::net::SocketAddr;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};

use parley_client::chat_lookup::get_or_create_chat;
use parley_client::{ChatBackend, ClientError, RestBackend};
use parley_shared::{Chat, ChatId, Message, NewChat, NewMessage, User};

fn user(id: &str) -> User {
    User {
        id: id.into(),
        name: id.to_uppercase(),
        username: id.to_string(),
        image_url: None,
    }
}

async fn get_user(Path(id): Path<String>) -> Result<Json<User>, StatusCode> {
    match id.as_str() {
        "u1" | "u2" => Ok(Json(user(&id))),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn chat_by_hash(Path(_hash): Path<String>) -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn create_chat(Json(new_chat): Json<NewChat>) -> Json<Chat> {
    Json(Chat {
        id: ChatId::from("c-created"),
        chat_name: new_chat.chat_name,
        participant_ids: new_chat.participant_ids,
        users_hash: new_chat.users_hash,
        is_group_chat: new_chat.is_group_chat,
        latest_message_id: None,
        created_at: Utc.timestamp_opt(100, 0).unwrap(),
    })
}

async fn messages(Path(chat_id): Path<String>) -> Json<Vec<Message>> {
    Json(vec![Message {
        id: "m1".into(),
        content: "hello".into(),
        sender: user("u1"),
        chat_id: chat_id.as_str().into(),
        created_at: Utc.timestamp_opt(100, 0).unwrap(),
        is_deleted: false,
    }])
}

async fn reject_message(Json(_): Json<NewMessage>) -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route("/api/users/:id", get(get_user))
        .route("/api/chats/hash/:hash", get(chat_by_hash))
        .route("/api/chats", post(create_chat))
        .route("/api/messages/:chat_id", get(messages))
        .route("/api/messages", post(reject_message));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn lookup_creates_chat_over_http() {
    let addr = serve().await;
    let backend = RestBackend::new(&format!("http://{addr}/api")).unwrap();

    assert_eq!(backend.get_user_by_id(&"u2".into()).await.unwrap(), Some(user("u2")));
    assert_eq!(backend.get_user_by_id(&"ghost".into()).await.unwrap(), None);

    let chat = get_or_create_chat(&backend, &"u2".into(), &"u1".into())
        .await
        .unwrap();
    assert_eq!(chat.id, ChatId::from("c-created"));
    assert_eq!(chat.users_hash.as_str(), "u1,u2");
    assert_eq!(chat.chat_name, "Sender");

    let err = get_or_create_chat(&backend, &"u1".into(), &"ghost".into())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ChatCreationFailed(_)));
}

#[tokio::test]
async fn messages_and_failed_create() {
    let addr = serve().await;
    let backend = RestBackend::new(&format!("http://{addr}/api/")).unwrap();

    let history = backend.fetch_messages_for_chat(&"c1".into()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].chat_id, ChatId::from("c1"));

    let err = backend
        .create_message(&NewMessage {
            content: "hi".into(),
            sender: "u1".into(),
            chat: "c1".into(),
            timestamp: Utc::now(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::MessageCreationFailed(_)));
}
