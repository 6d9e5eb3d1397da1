//! Direct and group chat, notifications and the live event stream.

mod common;

use std::time::Duration;

use common::TestHarness;
use serde_json::{json, Value};

#[tokio::test]
async fn direct_chat_between_connected_users() {
    let (h, addr) = TestHarness::with_server().await;
    let (alice, alice_api) = h.user_client(addr, "alice", true);
    let (bob, bob_api) = h.user_client(addr, "bob", true);
    let (_eve, eve_api) = h.user_client(addr, "eve", true);

    let convo = alice_api
        .post_json("/api/chats/direct", json!({ "user_id": bob.id.to_string() }), 200)
        .await;
    assert_eq!(convo["kind"], "direct");
    assert_eq!(convo["peer"]["id"], bob.id.to_string());
    let cid = convo["id"].as_str().unwrap();

    // Opening again from the other side yields the same conversation.
    let same = bob_api
        .post_json("/api/chats/direct", json!({ "user_id": alice.id.to_string() }), 200)
        .await;
    assert_eq!(same["id"], cid);

    let sent = alice_api
        .post_json(&format!("/api/chats/{cid}/messages"), json!({ "content": " hi bob " }), 201)
        .await;
    assert_eq!(sent["content"], "hi bob");
    assert_eq!(sent["sender_id"], alice.id.to_string());
    bob_api
        .post_json(&format!("/api/chats/{cid}/messages"), json!({ "content": "hey" }), 201)
        .await;

    let history = bob_api.get_json(&format!("/api/chats/{cid}/messages")).await;
    let contents: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["content"].as_str())
        .collect();
    assert_eq!(contents, vec!["hi bob", "hey"]);

    let older = bob_api
        .get_json(&format!(
            "/api/chats/{cid}/messages?before={}",
            history[1]["id"].as_str().unwrap()
        ))
        .await;
    assert_eq!(older.as_array().unwrap().len(), 1);
    assert_eq!(older[0]["content"], "hi bob");

    let list = alice_api.get_json("/api/chats").await;
    assert_eq!(list[0]["last_message"]["content"], "hey");

    assert_eq!(eve_api.get(&format!("/api/chats/{cid}/messages")).await.status(), 403);
    let resp = eve_api
        .post(&format!("/api/chats/{cid}/messages"), json!({ "content": "let me in" }))
        .await;
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn message_content_is_validated() {
    let (h, addr) = TestHarness::with_server().await;
    let (_a, api) = h.user_client(addr, "writer", true);
    let (reader, _) = h.user_client(addr, "reader", true);

    let convo = api
        .post_json("/api/chats/direct", json!({ "user_id": reader.id.to_string() }), 200)
        .await;
    let path = format!("/api/chats/{}/messages", convo["id"].as_str().unwrap());

    api.post_json(&path, json!({ "content": "   " }), 400).await;
    api.post_json(&path, json!({ "content": "x".repeat(2001) }), 400).await;
    api.post_json(&path, json!({ "content": "x".repeat(2000) }), 201).await;
}

#[tokio::test]
async fn private_strangers_cannot_be_messaged() {
    let (h, addr) = TestHarness::with_server().await;
    let (_a, api) = h.user_client(addr, "stranger", true);
    let (hermit, hermit_api) = h.user_client(addr, "hermit", false);

    let body = api
        .post_json("/api/chats/direct", json!({ "user_id": hermit.id.to_string() }), 403)
        .await;
    assert_eq!(body["code"], "forbidden");

    // The hermit may still reach out to a public user.
    let stranger = h.create_user("open", true);
    hermit_api
        .post_json("/api/chats/direct", json!({ "user_id": stranger.id.to_string() }), 200)
        .await;
}

#[tokio::test]
async fn group_members_share_a_conversation() {
    let (h, addr) = TestHarness::with_server().await;
    let (_owner, owner_api) = h.user_client(addr, "owner", true);
    let (member, member_api) = h.user_client(addr, "member", true);

    let group = owner_api
        .post_json("/api/groups", json!({ "title": "Synth nerds" }), 201)
        .await;
    let gid = group["id"].as_str().unwrap();
    let inv = owner_api
        .post_json(
            &format!("/api/groups/{gid}/invitations"),
            json!({ "user_id": member.id.to_string() }),
            201,
        )
        .await;
    member_api
        .post_json(
            &format!("/api/group-invitations/{}/accept", inv["id"].as_str().unwrap()),
            json!({}),
            200,
        )
        .await;

    let chats = member_api.get_json("/api/chats").await;
    let convo = chats
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["kind"] == "group")
        .cloned()
        .unwrap();
    assert_eq!(convo["group_id"], gid);
    assert_eq!(convo["title"], "Synth nerds");

    let cid = convo["id"].as_str().unwrap();
    owner_api
        .post_json(&format!("/api/chats/{cid}/messages"), json!({ "content": "welcome" }), 201)
        .await;
    let history = member_api.get_json(&format!("/api/chats/{cid}/messages")).await;
    assert_eq!(history[0]["content"], "welcome");

    // Leaving the group drops chat access.
    member_api.post(&format!("/api/groups/{gid}/leave"), json!({})).await;
    assert_eq!(member_api.get(&format!("/api/chats/{cid}/messages")).await.status(), 403);
}

#[tokio::test]
async fn notifications_merge_pending_follow_requests() {
    let (h, addr) = TestHarness::with_server().await;
    let (_fan, fan_api) = h.user_client(addr, "fan", true);
    let (_other, other_api) = h.user_client(addr, "other", true);
    let (star, star_api) = h.user_client(addr, "star", false);
    let (public, public_api) = h.user_client(addr, "public", true);

    // A stored notification for the public account, a pending request for the star.
    other_api
        .post_json(&format!("/api/users/{}/follow", public.id), json!({}), 200)
        .await;
    let follow = fan_api
        .post_json(&format!("/api/users/{}/follow", star.id), json!({}), 200)
        .await;
    let request_id = follow["request_id"].as_str().unwrap();

    let inbox = star_api.get_json("/api/notifications").await;
    assert_eq!(inbox.as_array().unwrap().len(), 1);
    assert_eq!(inbox[0]["kind"], "follow_request");
    assert_eq!(inbox[0]["id"], format!("follow-request-{request_id}"));
    assert_eq!(inbox[0]["is_read"], false);

    let count = star_api.get_json("/api/notifications/unread-count").await;
    assert_eq!(count["count"], 1);

    // Synthetic entries cannot be marked read.
    let resp = star_api
        .post(&format!("/api/notifications/follow-request-{request_id}/read"), json!({}))
        .await;
    assert_eq!(resp.status(), 404);

    let inbox = public_api.get_json("/api/notifications").await;
    assert_eq!(inbox[0]["kind"], "follow");
    let nid = inbox[0]["id"].as_str().unwrap();

    // Someone else's notification is invisible.
    let resp = star_api.post(&format!("/api/notifications/{nid}/read"), json!({})).await;
    assert_eq!(resp.status(), 404);

    let resp = public_api.post(&format!("/api/notifications/{nid}/read"), json!({})).await;
    assert_eq!(resp.status(), 204);
    let count = public_api.get_json("/api/notifications/unread-count").await;
    assert_eq!(count["count"], 0);

    fan_api
        .post_json(&format!("/api/users/{}/follow", public.id), json!({}), 200)
        .await;
    let all: Value = public_api
        .post_json("/api/notifications/read-all", json!({}), 200)
        .await;
    assert_eq!(all["updated"], 1);
}

#[tokio::test]
async fn event_stream_delivers_messages() {
    let (h, addr) = TestHarness::with_server().await;
    let (_alice, alice_api) = h.user_client(addr, "alice", true);
    let (bob, bob_api) = h.user_client(addr, "bob", true);

    let convo = alice_api
        .post_json("/api/chats/direct", json!({ "user_id": bob.id.to_string() }), 200)
        .await;
    let cid = convo["id"].as_str().unwrap().to_string();

    let mut stream = bob_api.get("/api/events").await;
    assert_eq!(stream.status(), 200);
    assert!(stream
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .starts_with("text/event-stream"));

    alice_api
        .post_json(&format!("/api/chats/{cid}/messages"), json!({ "content": "hello stream" }), 201)
        .await;

    let received = tokio::time::timeout(Duration::from_secs(5), async {
        let mut buf = String::new();
        while let Some(chunk) = stream.chunk().await.unwrap() {
            buf.push_str(&String::from_utf8_lossy(&chunk));
            if buf.contains("hello stream") {
                break;
            }
        }
        buf
    })
    .await
    .expect("no event within timeout");

    assert!(received.contains("event: message_sent"));
    assert!(received.contains(&cid));
}
