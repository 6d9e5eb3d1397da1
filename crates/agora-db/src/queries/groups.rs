//! Groups, membership, invitations and join requests.
//!
//! Every group owns a group conversation; joining or leaving a group keeps
//! the conversation's participant list in step with `group_members`.

use agora_core::{Error, GroupId, InvitationId, JoinRequestId, Result, UserId};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{
    Group, GroupInvitation, GroupMember, JoinRequest, MemberRole, Notification, NotificationKind,
};
use crate::queries::{chats, conflict_or_db, notifications};
use crate::time;

const COLS: &str = "g.id, g.creator_id, g.title, g.description, g.created_at,
    (SELECT COUNT(*) FROM group_members gm WHERE gm.group_id = g.id)";
const MEMBER_COLS: &str = "group_id, user_id, role, joined_at";
const INVITATION_COLS: &str = "id, group_id, inviter_id, invitee_id, created_at";
const JOIN_REQUEST_COLS: &str = "id, group_id, user_id, created_at";

/// Result of [`request_join`].
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    /// The caller held an invitation, which was accepted.
    Joined(GroupMember),
    /// A join request was stored and the owner notified.
    Requested {
        request: JoinRequest,
        notification: Notification,
    },
}

/// Create a group owned by `creator`, together with its conversation.
pub fn create_group(conn: &Connection, creator: UserId, title: &str, description: &str) -> Result<Group> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::validation("Group title must not be empty"));
    }

    let id = GroupId::new();
    let created_at = time::now();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    tx.execute(
        "INSERT INTO social_groups (id, creator_id, title, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id.to_string(), creator.to_string(), title, description, created_at],
    )
    .map_err(|e| conflict_or_db(e, || format!("A group titled '{title}' already exists")))?;

    chats::create_group_conversation(&tx, id)?;
    add_member(&tx, id, creator, MemberRole::Owner)?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(Group {
        id,
        creator_id: creator,
        title: title.to_string(),
        description: description.to_string(),
        created_at,
        member_count: 1,
    })
}

/// Get a group by ID.
pub fn get_group(conn: &Connection, id: GroupId) -> Result<Option<Group>> {
    conn.query_row(
        &format!("SELECT {COLS} FROM social_groups g WHERE g.id = ?1"),
        [id.to_string()],
        Group::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// All groups, newest first.
pub fn list_groups(conn: &Connection, limit: i64, offset: i64) -> Result<Vec<Group>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {COLS} FROM social_groups g
             ORDER BY g.created_at DESC, g.rowid DESC LIMIT ?1 OFFSET ?2"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![limit, offset], Group::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

/// Membership of `user` in `group`, if any.
pub fn get_member(conn: &Connection, group: GroupId, user: UserId) -> Result<Option<GroupMember>> {
    conn.query_row(
        &format!("SELECT {MEMBER_COLS} FROM group_members WHERE group_id = ?1 AND user_id = ?2"),
        rusqlite::params![group.to_string(), user.to_string()],
        GroupMember::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

pub fn is_member(conn: &Connection, group: GroupId, user: UserId) -> Result<bool> {
    Ok(get_member(conn, group, user)?.is_some())
}

/// Members of a group, owner first then by join time.
pub fn list_members(conn: &Connection, group: GroupId) -> Result<Vec<GroupMember>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {MEMBER_COLS} FROM group_members WHERE group_id = ?1
             ORDER BY role = 'owner' DESC, joined_at ASC, rowid ASC"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([group.to_string()], GroupMember::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Insert a member, join the group conversation and clear any invitation or
/// join request for the pair. The caller holds the surrounding transaction.
fn add_member(conn: &Connection, group: GroupId, user: UserId, role: MemberRole) -> Result<GroupMember> {
    let joined_at = time::now();
    conn.execute(
        "INSERT INTO group_members (group_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![group.to_string(), user.to_string(), role.as_str(), joined_at],
    )
    .map_err(|e| conflict_or_db(e, || "User is already a member of this group".to_string()))?;

    if let Some(conversation) = chats::get_group_conversation(conn, group)? {
        chats::add_participant(conn, conversation.id, user)?;
    }

    conn.execute(
        "DELETE FROM group_invitations WHERE group_id = ?1 AND invitee_id = ?2",
        rusqlite::params![group.to_string(), user.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    conn.execute(
        "DELETE FROM group_join_requests WHERE group_id = ?1 AND user_id = ?2",
        rusqlite::params![group.to_string(), user.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(GroupMember {
        group_id: group,
        user_id: user,
        role,
        joined_at,
    })
}

/// Leave a group. The owner cannot leave.
pub fn leave_group(conn: &Connection, group: GroupId, user: UserId) -> Result<()> {
    let member = get_member(conn, group, user)?
        .ok_or_else(|| Error::Forbidden("You are not a member of this group".into()))?;
    if member.role == MemberRole::Owner {
        return Err(Error::Forbidden("The group owner cannot leave the group".into()));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    tx.execute(
        "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
        rusqlite::params![group.to_string(), user.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    if let Some(conversation) = chats::get_group_conversation(&tx, group)? {
        chats::remove_participant(&tx, conversation.id, user)?;
    }
    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

/// Invite `invitee` into `group` and notify them.
pub fn create_invitation(
    conn: &Connection,
    group: GroupId,
    inviter: UserId,
    invitee: UserId,
) -> Result<(GroupInvitation, Notification)> {
    if is_member(conn, group, invitee)? {
        return Err(Error::Conflict("User is already a member of this group".into()));
    }

    let id = InvitationId::new();
    let created_at = time::now();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    tx.execute(
        "INSERT INTO group_invitations (id, group_id, inviter_id, invitee_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            id.to_string(),
            group.to_string(),
            inviter.to_string(),
            invitee.to_string(),
            created_at,
        ],
    )
    .map_err(|e| conflict_or_db(e, || "User has already been invited".to_string()))?;

    let notification = notifications::create_notification(
        &tx,
        invitee,
        Some(inviter),
        NotificationKind::GroupInvitation,
        Some(&group.to_string()),
    )?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok((
        GroupInvitation {
            id,
            group_id: group,
            inviter_id: inviter,
            invitee_id: invitee,
            created_at,
        },
        notification,
    ))
}

pub fn get_invitation(conn: &Connection, id: InvitationId) -> Result<Option<GroupInvitation>> {
    conn.query_row(
        &format!("SELECT {INVITATION_COLS} FROM group_invitations WHERE id = ?1"),
        [id.to_string()],
        GroupInvitation::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Pending invitations addressed to `user`, newest first.
pub fn list_invitations_for(conn: &Connection, user: UserId) -> Result<Vec<GroupInvitation>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {INVITATION_COLS} FROM group_invitations WHERE invitee_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([user.to_string()], GroupInvitation::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Accept an invitation, making the invitee a member.
pub fn accept_invitation(conn: &Connection, id: InvitationId) -> Result<GroupMember> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    let invitation = get_invitation(&tx, id)?.ok_or_else(|| Error::not_found("invitation", id))?;
    let member = add_member(&tx, invitation.group_id, invitation.invitee_id, MemberRole::Member)?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(member)
}

/// Delete an invitation (decline). Returns true if a row was deleted.
pub fn delete_invitation(conn: &Connection, id: InvitationId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM group_invitations WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

// ---------------------------------------------------------------------------
// Join requests
// ---------------------------------------------------------------------------

/// Ask to join `group`. A pending invitation for the caller is accepted
/// instead of creating a request.
pub fn request_join(conn: &Connection, group_id: GroupId, user: UserId) -> Result<JoinOutcome> {
    let group = get_group(conn, group_id)?.ok_or_else(|| Error::not_found("group", group_id))?;
    if is_member(conn, group_id, user)? {
        return Err(Error::Conflict("You are already a member of this group".into()));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let invited: bool = tx
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM group_invitations WHERE group_id = ?1 AND invitee_id = ?2)",
            rusqlite::params![group_id.to_string(), user.to_string()],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let outcome = if invited {
        JoinOutcome::Joined(add_member(&tx, group_id, user, MemberRole::Member)?)
    } else {
        let id = JoinRequestId::new();
        let created_at = time::now();
        tx.execute(
            "INSERT INTO group_join_requests (id, group_id, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id.to_string(), group_id.to_string(), user.to_string(), created_at],
        )
        .map_err(|e| conflict_or_db(e, || "You have already asked to join this group".to_string()))?;

        let notification = notifications::create_notification(
            &tx,
            group.creator_id,
            Some(user),
            NotificationKind::GroupJoinRequest,
            Some(&id.to_string()),
        )?;
        JoinOutcome::Requested {
            request: JoinRequest {
                id,
                group_id,
                user_id: user,
                created_at,
            },
            notification,
        }
    };

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(outcome)
}

pub fn get_join_request(conn: &Connection, id: JoinRequestId) -> Result<Option<JoinRequest>> {
    conn.query_row(
        &format!("SELECT {JOIN_REQUEST_COLS} FROM group_join_requests WHERE id = ?1"),
        [id.to_string()],
        JoinRequest::from_row,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Pending join requests for a group, oldest first.
pub fn list_join_requests(conn: &Connection, group: GroupId) -> Result<Vec<JoinRequest>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {JOIN_REQUEST_COLS} FROM group_join_requests WHERE group_id = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([group.to_string()], JoinRequest::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Accept a join request: add the member and notify them.
pub fn accept_join_request(
    conn: &Connection,
    id: JoinRequestId,
    approver: UserId,
) -> Result<(GroupMember, Notification)> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    let request = get_join_request(&tx, id)?.ok_or_else(|| Error::not_found("join_request", id))?;
    let member = add_member(&tx, request.group_id, request.user_id, MemberRole::Member)?;
    let notification = notifications::create_notification(
        &tx,
        request.user_id,
        Some(approver),
        NotificationKind::GroupJoinAccepted,
        Some(&request.group_id.to_string()),
    )?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok((member, notification))
}

/// Delete a join request (decline). Returns true if a row was deleted.
pub fn delete_join_request(conn: &Connection, id: JoinRequestId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM group_join_requests WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::users::tests::make_user;

    #[test]
    fn create_group_makes_owner_and_conversation() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);

        let group = create_group(&conn, alice.id, "Rustaceans", "crabs").unwrap();
        let member = get_member(&conn, group.id, alice.id).unwrap().unwrap();
        assert_eq!(member.role, MemberRole::Owner);

        let conversation = chats::get_group_conversation(&conn, group.id).unwrap().unwrap();
        assert!(chats::is_participant(&conn, conversation.id, alice.id).unwrap());
        assert_eq!(get_group(&conn, group.id).unwrap().unwrap().member_count, 1);
    }

    #[test]
    fn duplicate_title_conflicts() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        create_group(&conn, alice.id, "Hikers", "").unwrap();
        let err = create_group(&conn, alice.id, "hikers", "").unwrap_err();
        assert_eq!(err.http_status(), 409);
        assert_eq!(list_groups(&conn, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn invitation_flow() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);
        let group = create_group(&conn, alice.id, "Chess", "").unwrap();

        let (invitation, notification) = create_invitation(&conn, group.id, alice.id, bob.id).unwrap();
        assert_eq!(notification.user_id, bob.id);
        assert_eq!(notification.kind, NotificationKind::GroupInvitation);
        assert_eq!(
            create_invitation(&conn, group.id, alice.id, bob.id).unwrap_err().http_status(),
            409
        );
        assert_eq!(list_invitations_for(&conn, bob.id).unwrap().len(), 1);

        accept_invitation(&conn, invitation.id).unwrap();
        assert!(is_member(&conn, group.id, bob.id).unwrap());
        assert!(list_invitations_for(&conn, bob.id).unwrap().is_empty());

        let conversation = chats::get_group_conversation(&conn, group.id).unwrap().unwrap();
        assert!(chats::is_participant(&conn, conversation.id, bob.id).unwrap());
        assert_eq!(
            create_invitation(&conn, group.id, alice.id, bob.id).unwrap_err().http_status(),
            409
        );
    }

    #[test]
    fn join_request_flow() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);
        let group = create_group(&conn, alice.id, "Climbing", "").unwrap();

        let JoinOutcome::Requested { request, notification } = request_join(&conn, group.id, bob.id).unwrap()
        else {
            panic!("expected a join request");
        };
        assert_eq!(notification.user_id, alice.id);
        assert_eq!(notification.kind, NotificationKind::GroupJoinRequest);
        assert_eq!(request_join(&conn, group.id, bob.id).unwrap_err().http_status(), 409);
        assert_eq!(list_join_requests(&conn, group.id).unwrap().len(), 1);

        let (member, accepted) = accept_join_request(&conn, request.id, alice.id).unwrap();
        assert_eq!(member.user_id, bob.id);
        assert_eq!(accepted.kind, NotificationKind::GroupJoinAccepted);
        assert!(list_join_requests(&conn, group.id).unwrap().is_empty());
        assert_eq!(request_join(&conn, group.id, bob.id).unwrap_err().http_status(), 409);
    }

    #[test]
    fn join_with_invitation_joins_directly() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);
        let group = create_group(&conn, alice.id, "Books", "").unwrap();

        create_invitation(&conn, group.id, alice.id, bob.id).unwrap();
        assert!(matches!(
            request_join(&conn, group.id, bob.id).unwrap(),
            JoinOutcome::Joined(_)
        ));
        assert!(is_member(&conn, group.id, bob.id).unwrap());
    }

    #[test]
    fn leaving() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let alice = make_user(&conn, "alice", true);
        let bob = make_user(&conn, "bob", true);
        let group = create_group(&conn, alice.id, "Runners", "").unwrap();
        let (invitation, _) = create_invitation(&conn, group.id, alice.id, bob.id).unwrap();
        accept_invitation(&conn, invitation.id).unwrap();

        assert_eq!(leave_group(&conn, group.id, alice.id).unwrap_err().http_status(), 403);
        leave_group(&conn, group.id, bob.id).unwrap();
        assert!(!is_member(&conn, group.id, bob.id).unwrap());

        let conversation = chats::get_group_conversation(&conn, group.id).unwrap().unwrap();
        assert!(!chats::is_participant(&conn, conversation.id, bob.id).unwrap());
        assert_eq!(list_members(&conn, group.id).unwrap().len(), 1);
    }
}
