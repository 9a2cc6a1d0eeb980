use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, Set, TransactionTrait,
};
use sea_orm::sea_query::SimpleExpr;
use serde::Deserialize;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::db::entities::{tag, vm_tag};
use crate::db::services::{filters, user_service};
use crate::web::error::{is_foreign_key_violation, is_unique_violation, AppError};

pub const TAG_NAME_MAX_LEN: usize = 50;
pub const SCOPE_MAX_LEN: usize = 50;

/// Conjunction of optional predicates for [`list_tags`]. `tag_name` and `scope`
/// are regular expressions, the rest are exact matches.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TagFilter {
    pub tag_id: Option<Uuid>,
    pub tag_name: Option<String>,
    pub scope: Option<String>,
    pub user_id: Option<i32>,
}

/// A `"name:scope"` tag reference, split on the first colon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpec {
    pub tag_name: String,
    pub scope: Option<String>,
}

impl FromStr for TagSpec {
    type Err = AppError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let (tag_name, scope) = spec.split_once(':').ok_or_else(|| {
            AppError::InvalidInput(format!("tag spec '{spec}' must have the form name:scope"))
        })?;
        if tag_name.is_empty() {
            return Err(AppError::InvalidInput(format!("tag spec '{spec}' has an empty name")));
        }
        Ok(TagSpec {
            tag_name: tag_name.to_owned(),
            scope: normalize_scope(Some(scope)),
        })
    }
}

/// An empty scope is stored, compared and filtered as "no scope".
pub fn normalize_scope(scope: Option<&str>) -> Option<String> {
    scope.filter(|s| !s.is_empty()).map(str::to_owned)
}

fn scope_condition(scope: Option<&str>) -> SimpleExpr {
    match scope {
        Some(s) => tag::Column::Scope.eq(s),
        None => tag::Column::Scope.is_null(),
    }
}

fn validate_tag_fields(tag_name: &str, scope: Option<&str>) -> Result<(), AppError> {
    if tag_name.is_empty() {
        return Err(AppError::InvalidInput("tag_name is required and cannot be empty".to_string()));
    }
    if tag_name.chars().count() > TAG_NAME_MAX_LEN {
        return Err(AppError::InvalidInput(format!(
            "tag_name must be at most {TAG_NAME_MAX_LEN} characters"
        )));
    }
    if scope.is_some_and(|s| s.chars().count() > SCOPE_MAX_LEN) {
        return Err(AppError::InvalidInput(format!(
            "scope must be at most {SCOPE_MAX_LEN} characters"
        )));
    }
    Ok(())
}

// --- Tag Service Functions ---

pub async fn list_tags(db: &DatabaseConnection, filter: &TagFilter) -> Result<Vec<tag::Model>, AppError> {
    let name_pattern = filters::compile_optional_regex(filter.tag_name.as_deref())?;
    let scope_pattern = filters::compile_optional_regex(filter.scope.as_deref())?;

    let mut query = tag::Entity::find();
    if let Some(tag_id) = filter.tag_id {
        query = query.filter(tag::Column::TagId.eq(tag_id));
    }
    if let Some(user_id) = filter.user_id {
        query = query.filter(tag::Column::UserId.eq(user_id));
    }

    let tags = query
        .all(db)
        .await?
        .into_iter()
        .filter(|t| name_pattern.as_ref().map_or(true, |re| re.is_match(&t.tag_name)))
        .filter(|t| {
            scope_pattern
                .as_ref()
                .map_or(true, |re| filters::scope_matches(re, t.scope.as_deref()))
        })
        .collect();
    Ok(tags)
}

pub async fn get_tag<C: ConnectionTrait>(db: &C, tag_id: Uuid) -> Result<tag::Model, AppError> {
    tag::Entity::find_by_id(tag_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("tag {tag_id}")))
}

/// Exact lookup by name and (already normalized) scope.
pub async fn find_tag<C: ConnectionTrait>(
    db: &C,
    tag_name: &str,
    scope: Option<&str>,
) -> Result<Option<tag::Model>, AppError> {
    Ok(tag::Entity::find()
        .filter(tag::Column::TagName.eq(tag_name))
        .filter(scope_condition(scope))
        .one(db)
        .await?)
}

pub async fn find_tags_by_name<C: ConnectionTrait>(
    db: &C,
    tag_name: &str,
) -> Result<Vec<tag::Model>, AppError> {
    Ok(tag::Entity::find()
        .filter(tag::Column::TagName.eq(tag_name))
        .all(db)
        .await?)
}

/// Validates and inserts a tag. The caller makes sure the owner exists.
///
/// The lookup only produces a friendlier error; the unique index on
/// `(tag_name, COALESCE(scope, ''))` is what actually rejects a racing duplicate.
pub(crate) async fn insert_tag<C: ConnectionTrait>(
    db: &C,
    tag_name: &str,
    scope: Option<&str>,
    user_id: i32,
) -> Result<tag::Model, AppError> {
    let scope = normalize_scope(scope);
    validate_tag_fields(tag_name, scope.as_deref())?;

    let duplicate = || AppError::DuplicateTag(format!("{tag_name}:{}", scope.as_deref().unwrap_or("")));

    if find_tag(db, tag_name, scope.as_deref()).await?.is_some() {
        return Err(duplicate());
    }

    let new_tag = tag::ActiveModel {
        tag_id: Set(Uuid::new_v4()),
        tag_name: Set(tag_name.to_owned()),
        scope: Set(scope.clone()),
        user_id: Set(user_id),
    };
    new_tag.insert(db).await.map_err(|db_err| {
        if is_unique_violation(&db_err) {
            duplicate()
        } else {
            AppError::from(db_err)
        }
    })
}

pub async fn create_tag(
    db: &DatabaseConnection,
    tag_name: &str,
    scope: Option<&str>,
    user_id: i32,
) -> Result<tag::Model, AppError> {
    let txn = db.begin().await?;
    user_service::require_user(&txn, user_id).await?;
    let tag = insert_tag(&txn, tag_name, scope, user_id).await?;
    txn.commit().await?;

    info!(tag_id = %tag.tag_id, tag_name = %tag.tag_name, scope = ?tag.scope, user_id, "Tag created.");
    Ok(tag)
}

/// Deletes a tag that is attached to no VM, on behalf of its owner or an admin.
pub async fn delete_tag(
    db: &DatabaseConnection,
    tag_id: Option<Uuid>,
    requester_user_id: Option<i32>,
) -> Result<(), AppError> {
    let tag_id = tag_id.ok_or_else(|| AppError::MissingParameter("tag_id".to_string()))?;
    let requester_user_id =
        requester_user_id.ok_or_else(|| AppError::MissingParameter("user_id".to_string()))?;

    let txn = db.begin().await?;
    let tag = get_tag(&txn, tag_id).await?;

    let attached_vms = vm_tag::Entity::find()
        .filter(vm_tag::Column::TagId.eq(tag_id))
        .count(&txn)
        .await?;
    if attached_vms > 0 {
        return Err(AppError::TagInUse(format!("tag {tag_id} is attached to {attached_vms} VM(s)")));
    }

    let requester = user_service::resolve_requester(&txn, requester_user_id).await?;
    let capability = requester.tag_capability(&tag).ok_or_else(|| {
        AppError::NotAuthorized(format!("user {requester_user_id} may not delete tag {tag_id}"))
    })?;

    // The foreign key from vm_tags catches an assignment that raced the count above.
    tag::Entity::delete_by_id(tag_id)
        .exec(&txn)
        .await
        .map_err(|db_err| {
            if is_foreign_key_violation(&db_err) {
                AppError::TagInUse(format!("tag {tag_id} was attached concurrently"))
            } else {
                AppError::from(db_err)
            }
        })?;
    txn.commit().await?;

    info!(%tag_id, requester_user_id, ?capability, "Tag deleted.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::services::{assignment_service, user_service::create_user, vm_service};
    use crate::db::{connect, schema::ensure_schema};

    async fn setup() -> DatabaseConnection {
        let db = connect("sqlite::memory:", 1).await.unwrap();
        ensure_schema(&db).await.unwrap();
        // ids 1 (reserved admin), 2 and 3
        for name in ["admin", "bob", "carol"] {
            create_user(&db, name, None).await.unwrap();
        }
        db
    }

    #[test]
    fn test_tag_spec_parsing() {
        let spec: TagSpec = "env:prod".parse().unwrap();
        assert_eq!(spec, TagSpec { tag_name: "env".into(), scope: Some("prod".into()) });

        let spec: TagSpec = "url:http://host".parse().unwrap();
        assert_eq!(spec.scope.as_deref(), Some("http://host"));

        let spec: TagSpec = "bare:".parse().unwrap();
        assert_eq!(spec.scope, None);

        assert!(matches!("nocolon".parse::<TagSpec>(), Err(AppError::InvalidInput(_))));
        assert!(matches!(":prod".parse::<TagSpec>(), Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_duplicate_tag_is_rejected() {
        let db = setup().await;
        create_tag(&db, "env", Some("prod"), 2).await.unwrap();

        let err = create_tag(&db, "env", Some("prod"), 3).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateTag(_)));

        // same name, different scope is a different tag
        create_tag(&db, "env", Some("dev"), 3).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_scope_is_stored_as_null() {
        let db = setup().await;
        let tag = create_tag(&db, "owner", Some(""), 2).await.unwrap();
        assert_eq!(tag.scope, None);

        let err = create_tag(&db, "owner", None, 2).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateTag(_)));
        let err = create_tag(&db, "owner", Some(""), 3).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateTag(_)));
    }

    #[tokio::test]
    async fn test_unique_index_backs_the_application_check() {
        let db = setup().await;
        create_tag(&db, "env", None, 2).await.unwrap();

        let raw = tag::ActiveModel {
            tag_id: Set(Uuid::new_v4()),
            tag_name: Set("env".to_string()),
            scope: Set(None),
            user_id: Set(3),
        };
        let err = raw.insert(&db).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_create_tag_validation() {
        let db = setup().await;

        let err = create_tag(&db, "", Some("prod"), 2).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let too_long = "x".repeat(TAG_NAME_MAX_LEN + 1);
        let err = create_tag(&db, &too_long, None, 2).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = create_tag(&db, "env", None, 99).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_tags_filters() {
        let db = setup().await;
        let prod = create_tag(&db, "env", Some("prod"), 2).await.unwrap();
        let dev = create_tag(&db, "env", Some("dev"), 3).await.unwrap();
        let team = create_tag(&db, "team", None, 2).await.unwrap();

        let all = list_tags(&db, &TagFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let by_owner = list_tags(&db, &TagFilter { user_id: Some(2), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(by_owner.len(), 2);
        assert!(by_owner.contains(&prod) && by_owner.contains(&team));

        let by_scope = list_tags(&db, &TagFilter { scope: Some("^d".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(by_scope, vec![dev.clone()]);

        let combined = list_tags(
            &db,
            &TagFilter {
                tag_name: Some("^en".into()),
                scope: Some("o".into()),
                user_id: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(combined, vec![prod]);

        let by_id = list_tags(&db, &TagFilter { tag_id: Some(dev.tag_id), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(by_id, vec![dev]);

        let err = list_tags(&db, &TagFilter { tag_name: Some("[".into()), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_delete_requires_owner_or_admin() {
        let db = setup().await;
        let release = create_tag(&db, "release", Some("v1"), 2).await.unwrap();

        let err = delete_tag(&db, Some(release.tag_id), Some(3)).await.unwrap_err();
        assert!(matches!(err, AppError::NotAuthorized(_)));

        delete_tag(&db, Some(release.tag_id), Some(2)).await.unwrap();
        let err = get_tag(&db, release.tag_id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let other = create_tag(&db, "release", Some("v2"), 3).await.unwrap();
        delete_tag(&db, Some(other.tag_id), Some(RESERVED_ADMIN)).await.unwrap();
    }

    const RESERVED_ADMIN: i32 = user_service::RESERVED_ADMIN_USER_ID;

    #[tokio::test]
    async fn test_delete_rejects_tag_in_use_until_unassigned() {
        let db = setup().await;
        let vm = vm_service::create_vm(&db, "vm-a", &["env:prod".to_string()], Some(2))
            .await
            .unwrap();
        let tag = find_tag(&db, "env", Some("prod")).await.unwrap().unwrap();

        let err = delete_tag(&db, Some(tag.tag_id), Some(RESERVED_ADMIN)).await.unwrap_err();
        assert!(matches!(err, AppError::TagInUse(_)));

        assignment_service::unassign(&db, "env", None, &[vm.vm_id]).await.unwrap();
        delete_tag(&db, Some(tag.tag_id), Some(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_requires_parameters() {
        let db = setup().await;
        let err = delete_tag(&db, None, Some(2)).await.unwrap_err();
        assert!(matches!(err, AppError::MissingParameter(ref f) if f == "tag_id"));

        let err = delete_tag(&db, Some(Uuid::new_v4()), None).await.unwrap_err();
        assert!(matches!(err, AppError::MissingParameter(ref f) if f == "user_id"));

        let err = delete_tag(&db, Some(Uuid::new_v4()), Some(2)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
