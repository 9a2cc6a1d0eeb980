use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use tracing::info;

use crate::db::entities::{tag, user};
use crate::db::enums::UserRole;
use crate::web::error::AppError;

/// This user id is always treated as an administrator, with or without a row.
pub const RESERVED_ADMIN_USER_ID: i32 = 1;

pub const USER_NAME_MAX_LEN: usize = 255;

/// Why a requester may act on a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCapability {
    Owner,
    Admin,
}

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: i32,
    /// `None` when the id has no row in `users`.
    pub role: Option<UserRole>,
}

impl Requester {
    pub fn is_admin(&self) -> bool {
        self.user_id == RESERVED_ADMIN_USER_ID || self.role == Some(UserRole::Admin)
    }

    /// Admin wins over ownership; `None` means the requester may not touch the tag.
    pub fn tag_capability(&self, tag: &tag::Model) -> Option<TagCapability> {
        if self.is_admin() {
            Some(TagCapability::Admin)
        } else if tag.user_id == self.user_id {
            Some(TagCapability::Owner)
        } else {
            None
        }
    }
}

// --- User Service Functions ---

pub async fn get_user_by_id<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<Option<user::Model>, AppError> {
    Ok(user::Entity::find_by_id(user_id).one(db).await?)
}

/// Like [`get_user_by_id`] but a missing user is an error.
pub async fn require_user<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<user::Model, AppError> {
    get_user_by_id(db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))
}

pub async fn resolve_requester<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<Requester, AppError> {
    let role = get_user_by_id(db, user_id).await?.map(|u| u.role);
    Ok(Requester { user_id, role })
}

pub async fn list_users(db: &DatabaseConnection) -> Result<Vec<user::Model>, AppError> {
    Ok(user::Entity::find()
        .order_by_asc(user::Column::UserId)
        .all(db)
        .await?)
}

pub async fn create_user(
    db: &DatabaseConnection,
    user_name: &str,
    role: Option<UserRole>,
) -> Result<user::Model, AppError> {
    if user_name.is_empty() {
        return Err(AppError::InvalidInput("user_name is required and cannot be empty".to_string()));
    }
    if user_name.chars().count() > USER_NAME_MAX_LEN {
        return Err(AppError::InvalidInput(format!(
            "user_name must be at most {USER_NAME_MAX_LEN} characters"
        )));
    }

    let new_user = user::ActiveModel {
        user_name: Set(user_name.to_owned()),
        role: Set(role.unwrap_or(UserRole::Member)),
        ..Default::default()
    };
    let user = new_user.insert(db).await?;
    info!(user_id = user.user_id, role = %user.role, "User created.");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect, schema::ensure_schema};
    use uuid::Uuid;

    fn tag_owned_by(user_id: i32) -> tag::Model {
        tag::Model {
            tag_id: Uuid::new_v4(),
            tag_name: "release".to_string(),
            scope: Some("v1".to_string()),
            user_id,
        }
    }

    #[test]
    fn test_tag_capability() {
        let tag = tag_owned_by(2);

        let owner = Requester { user_id: 2, role: Some(UserRole::Member) };
        let stranger = Requester { user_id: 3, role: Some(UserRole::Member) };
        let reserved = Requester { user_id: RESERVED_ADMIN_USER_ID, role: None };
        let role_admin = Requester { user_id: 7, role: Some(UserRole::Admin) };

        assert_eq!(owner.tag_capability(&tag), Some(TagCapability::Owner));
        assert_eq!(stranger.tag_capability(&tag), None);
        assert_eq!(reserved.tag_capability(&tag), Some(TagCapability::Admin));
        assert_eq!(role_admin.tag_capability(&tag), Some(TagCapability::Admin));
    }

    #[tokio::test]
    async fn test_create_and_list_users() {
        let db = connect("sqlite::memory:", 1).await.unwrap();
        ensure_schema(&db).await.unwrap();

        let alice = create_user(&db, "alice", None).await.unwrap();
        let bob = create_user(&db, "bob", Some(UserRole::Admin)).await.unwrap();
        assert_eq!(alice.role, UserRole::Member);

        let users = list_users(&db).await.unwrap();
        assert_eq!(users, vec![alice.clone(), bob.clone()]);

        let requester = resolve_requester(&db, bob.user_id).await.unwrap();
        assert!(requester.is_admin());

        let missing = resolve_requester(&db, 42).await.unwrap();
        assert_eq!(missing.role, None);
        assert!(!missing.is_admin());
    }

    #[tokio::test]
    async fn test_create_user_rejects_empty_name() {
        let db = connect("sqlite::memory:", 1).await.unwrap();
        ensure_schema(&db).await.unwrap();

        let err = create_user(&db, "", None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
