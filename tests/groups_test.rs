//! Groups: membership, invitations, join requests, posts and events.

mod common;

use common::{Api, TestHarness};
use serde_json::{json, Value};

async fn create_group(api: &Api, title: &str) -> String {
    let group = api
        .post_json("/api/groups", json!({ "title": title, "description": "a test group" }), 201)
        .await;
    assert_eq!(group["member_count"], 1);
    assert_eq!(group["role"], "owner");
    group["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn creator_owns_the_group_and_titles_are_unique() {
    let (h, addr) = TestHarness::with_server().await;
    let (owner, api) = h.user_client(addr, "owner", true);

    let gid = create_group(&api, "Rustaceans").await;
    let body = api
        .post_json("/api/groups", json!({ "title": "Rustaceans" }), 409)
        .await;
    assert_eq!(body["code"], "conflict");
    api.post_json("/api/groups", json!({ "title": "  " }), 400).await;

    let members = api.get_json(&format!("/api/groups/{gid}/members")).await;
    assert_eq!(members.as_array().unwrap().len(), 1);
    assert_eq!(members[0]["user"]["id"], owner.id.to_string());
    assert_eq!(members[0]["role"], "owner");

    let resp = api.post(&format!("/api/groups/{gid}/leave"), json!({})).await;
    assert_eq!(resp.status(), 403);

    let listed = api.get_json("/api/groups").await;
    assert_eq!(listed[0]["title"], "Rustaceans");
    assert_eq!(listed[0]["is_member"], true);
}

#[tokio::test]
async fn invitation_flow() {
    let (h, addr) = TestHarness::with_server().await;
    let (_owner, owner_api) = h.user_client(addr, "owner", true);
    let (guest, guest_api) = h.user_client(addr, "guest", true);
    let (_nosy, nosy_api) = h.user_client(addr, "nosy", true);

    let gid = create_group(&owner_api, "Book club").await;

    let invitation = owner_api
        .post_json(
            &format!("/api/groups/{gid}/invitations"),
            json!({ "user_id": guest.id.to_string() }),
            201,
        )
        .await;
    let inv_id = invitation["id"].as_str().unwrap();
    owner_api
        .post_json(
            &format!("/api/groups/{gid}/invitations"),
            json!({ "user_id": guest.id.to_string() }),
            409,
        )
        .await;

    // Only members may invite.
    nosy_api
        .post_json(
            &format!("/api/groups/{gid}/invitations"),
            json!({ "user_id": guest.id.to_string() }),
            403,
        )
        .await;

    let mine = guest_api.get_json("/api/group-invitations").await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["group_title"], "Book club");

    let inbox = guest_api.get_json("/api/notifications").await;
    assert_eq!(inbox[0]["kind"], "group_invitation");

    let resp = nosy_api
        .post(&format!("/api/group-invitations/{inv_id}/accept"), json!({}))
        .await;
    assert_eq!(resp.status(), 403);

    let group = guest_api
        .post_json(&format!("/api/group-invitations/{inv_id}/accept"), json!({}), 200)
        .await;
    assert_eq!(group["is_member"], true);
    assert_eq!(group["member_count"], 2);
    assert!(guest_api.get_json("/api/group-invitations").await.as_array().unwrap().is_empty());

    let resp = guest_api.post(&format!("/api/groups/{gid}/leave"), json!({})).await;
    assert_eq!(resp.status(), 204);
    let group = owner_api.get_json(&format!("/api/groups/{gid}")).await;
    assert_eq!(group["member_count"], 1);
}

#[tokio::test]
async fn join_request_flow() {
    let (h, addr) = TestHarness::with_server().await;
    let (_owner, owner_api) = h.user_client(addr, "owner", true);
    let (joiner, joiner_api) = h.user_client(addr, "joiner", true);

    let gid = create_group(&owner_api, "Climbers").await;

    let join = joiner_api
        .post_json(&format!("/api/groups/{gid}/join-requests"), json!({}), 201)
        .await;
    assert_eq!(join["status"], "requested");
    let req_id = join["request_id"].as_str().unwrap();
    joiner_api
        .post_json(&format!("/api/groups/{gid}/join-requests"), json!({}), 409)
        .await;

    // Only the owner reviews requests.
    let resp = joiner_api.get(&format!("/api/groups/{gid}/join-requests")).await;
    assert_eq!(resp.status(), 403);

    let pending = owner_api.get_json(&format!("/api/groups/{gid}/join-requests")).await;
    assert_eq!(pending[0]["user"]["id"], joiner.id.to_string());

    let inbox = owner_api.get_json("/api/notifications").await;
    assert_eq!(inbox[0]["kind"], "group_join_request");

    let resp = owner_api
        .post(&format!("/api/group-join-requests/{req_id}/accept"), json!({}))
        .await;
    assert_eq!(resp.status(), 204);

    let group = joiner_api.get_json(&format!("/api/groups/{gid}")).await;
    assert_eq!(group["role"], "member");

    let inbox = joiner_api.get_json("/api/notifications").await;
    assert_eq!(inbox[0]["kind"], "group_join_accepted");
}

#[tokio::test]
async fn invited_user_joins_without_review() {
    let (h, addr) = TestHarness::with_server().await;
    let (_owner, owner_api) = h.user_client(addr, "owner", true);
    let (guest, guest_api) = h.user_client(addr, "guest", true);

    let gid = create_group(&owner_api, "Chess").await;
    owner_api
        .post_json(
            &format!("/api/groups/{gid}/invitations"),
            json!({ "user_id": guest.id.to_string() }),
            201,
        )
        .await;

    let join = guest_api
        .post_json(&format!("/api/groups/{gid}/join-requests"), json!({}), 201)
        .await;
    assert_eq!(join["status"], "joined");
}

#[tokio::test]
async fn group_posts_are_members_only() {
    let (h, addr) = TestHarness::with_server().await;
    let (_owner, owner_api) = h.user_client(addr, "owner", true);
    let (_outsider, outsider_api) = h.user_client(addr, "outsider", true);

    let gid = create_group(&owner_api, "Gardeners").await;
    let post = owner_api
        .post_json(&format!("/api/groups/{gid}/posts"), json!({ "content": "tomatoes" }), 201)
        .await;
    let post_id = post["id"].as_str().unwrap();

    owner_api
        .post_json(
            &format!("/api/group-posts/{post_id}/comments"),
            json!({ "content": "need sun" }),
            201,
        )
        .await;
    let posts = owner_api.get_json(&format!("/api/groups/{gid}/posts")).await;
    assert_eq!(posts[0]["comment_count"], 1);
    let comments = owner_api
        .get_json(&format!("/api/group-posts/{post_id}/comments"))
        .await;
    assert_eq!(comments[0]["content"], "need sun");

    assert_eq!(outsider_api.get(&format!("/api/groups/{gid}/posts")).await.status(), 403);
    assert_eq!(
        outsider_api.get(&format!("/api/group-posts/{post_id}/comments")).await.status(),
        403
    );
    let resp = outsider_api
        .post(&format!("/api/groups/{gid}/posts"), json!({ "content": "spam" }))
        .await;
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn events_notify_members_and_collect_rsvps() {
    let (h, addr) = TestHarness::with_server().await;
    let (_owner, owner_api) = h.user_client(addr, "owner", true);
    let (member, member_api) = h.user_client(addr, "member", true);
    let (_outsider, outsider_api) = h.user_client(addr, "outsider", true);

    let gid = create_group(&owner_api, "Runners").await;
    let inv: Value = owner_api
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

    owner_api
        .post_json(
            &format!("/api/groups/{gid}/events"),
            json!({ "title": "Bad date", "starts_at": "next tuesday" }),
            400,
        )
        .await;

    let event = owner_api
        .post_json(
            &format!("/api/groups/{gid}/events"),
            json!({ "title": "Park run", "description": "5k", "starts_at": "2030-06-01T09:00:00Z" }),
            201,
        )
        .await;
    let event_id = event["id"].as_str().unwrap();

    let inbox = member_api.get_json("/api/notifications").await;
    assert_eq!(inbox[0]["kind"], "group_event");

    let rsvp = member_api
        .post_json(
            &format!("/api/group-events/{event_id}/respond"),
            json!({ "response": "going" }),
            200,
        )
        .await;
    assert_eq!(rsvp["going"], 1);
    assert_eq!(rsvp["my_response"], "going");

    let rsvp = member_api
        .post_json(
            &format!("/api/group-events/{event_id}/respond"),
            json!({ "response": "not_going" }),
            200,
        )
        .await;
    assert_eq!((rsvp["going"].as_i64(), rsvp["not_going"].as_i64()), (Some(0), Some(1)));

    member_api
        .post_json(
            &format!("/api/group-events/{event_id}/respond"),
            json!({ "response": "maybe" }),
            400,
        )
        .await;
    outsider_api
        .post_json(
            &format!("/api/group-events/{event_id}/respond"),
            json!({ "response": "going" }),
            403,
        )
        .await;

    let events = owner_api.get_json(&format!("/api/groups/{gid}/events")).await;
    assert_eq!(events[0]["not_going"], 1);
    assert!(events[0]["my_response"].is_null());
}
