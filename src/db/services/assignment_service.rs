use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::db::entities::{tag, vm, vm_tag};
use crate::db::services::tag_service;
use crate::web::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentAction {
    Assign,
    Unassign,
}

impl FromStr for AssignmentAction {
    type Err = AppError;

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action {
            "assign" => Ok(AssignmentAction::Assign),
            "unassign" => Ok(AssignmentAction::Unassign),
            other => Err(AppError::InvalidAction(other.to_owned())),
        }
    }
}

impl fmt::Display for AssignmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentAction::Assign => f.write_str("assign"),
            AssignmentAction::Unassign => f.write_str("unassign"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentOutcome {
    pub action: AssignmentAction,
    pub tag_id: Uuid,
    pub vm_ids: Vec<Uuid>,
    /// Associations actually added or removed; repeats of an existing state count as 0.
    pub changed: u64,
}

/// Finds the tag an assignment targets.
///
/// With `scope` (where `""` means "no scope") the lookup is exact. Without it
/// the name has to identify a single tag.
pub async fn resolve_tag<C: ConnectionTrait>(
    db: &C,
    tag_name: &str,
    scope: Option<&str>,
) -> Result<tag::Model, AppError> {
    if let Some(scope) = scope {
        let scope = tag_service::normalize_scope(Some(scope));
        return tag_service::find_tag(db, tag_name, scope.as_deref())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tag '{tag_name}'")));
    }

    let mut candidates = tag_service::find_tags_by_name(db, tag_name).await?;
    match candidates.len() {
        0 => Err(AppError::NotFound(format!("tag '{tag_name}'"))),
        1 => Ok(candidates.remove(0)),
        n => Err(AppError::InvalidInput(format!(
            "tag name '{tag_name}' is ambiguous ({n} scopes); pass a scope"
        ))),
    }
}

async fn require_vms<C: ConnectionTrait>(db: &C, vm_ids: &[Uuid]) -> Result<(), AppError> {
    if vm_ids.is_empty() {
        return Ok(());
    }
    let found: HashSet<Uuid> = vm::Entity::find()
        .filter(vm::Column::VmId.is_in(vm_ids.to_vec()))
        .all(db)
        .await?
        .into_iter()
        .map(|v| v.vm_id)
        .collect();
    let missing: Vec<String> = vm_ids
        .iter()
        .filter(|id| !found.contains(id))
        .map(Uuid::to_string)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("VMs {}", missing.join(", "))))
    }
}

/// Inserts the `(vm_id, tag_id)` associations that do not exist yet and
/// returns how many were added.
pub(crate) async fn link_pairs<C: ConnectionTrait>(db: &C, pairs: &[(Uuid, Uuid)]) -> Result<u64, AppError> {
    if pairs.is_empty() {
        return Ok(0);
    }

    let vm_ids: HashSet<Uuid> = pairs.iter().map(|(vm_id, _)| *vm_id).collect();
    let tag_ids: HashSet<Uuid> = pairs.iter().map(|(_, tag_id)| *tag_id).collect();
    let existing: HashSet<(Uuid, Uuid)> = vm_tag::Entity::find()
        .filter(vm_tag::Column::VmId.is_in(vm_ids))
        .filter(vm_tag::Column::TagId.is_in(tag_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|link| (link.vm_id, link.tag_id))
        .collect();

    let mut seen = HashSet::new();
    let new_links: Vec<vm_tag::ActiveModel> = pairs
        .iter()
        .filter(|pair| !existing.contains(pair) && seen.insert(**pair))
        .map(|(vm_id, tag_id)| vm_tag::ActiveModel {
            vm_id: Set(*vm_id),
            tag_id: Set(*tag_id),
        })
        .collect();

    if new_links.is_empty() {
        return Ok(0);
    }
    Ok(vm_tag::Entity::insert_many(new_links)
        .exec_without_returning(db)
        .await?)
}

// --- Assignment Service Functions ---

/// Attaches the tag to every VM in `vm_ids`. Unknown VM ids fail the whole call.
pub async fn assign(
    db: &DatabaseConnection,
    tag_name: &str,
    scope: Option<&str>,
    vm_ids: &[Uuid],
) -> Result<AssignmentOutcome, AppError> {
    let txn = db.begin().await?;
    let tag = resolve_tag(&txn, tag_name, scope).await?;
    require_vms(&txn, vm_ids).await?;

    let pairs: Vec<(Uuid, Uuid)> = vm_ids.iter().map(|vm_id| (*vm_id, tag.tag_id)).collect();
    let changed = link_pairs(&txn, &pairs).await?;
    txn.commit().await?;

    info!(tag_id = %tag.tag_id, vms = vm_ids.len(), changed, "Tag assigned.");
    Ok(AssignmentOutcome {
        action: AssignmentAction::Assign,
        tag_id: tag.tag_id,
        vm_ids: vm_ids.to_vec(),
        changed,
    })
}

/// Detaches the tag from every VM in `vm_ids`. Missing associations are ignored.
pub async fn unassign(
    db: &DatabaseConnection,
    tag_name: &str,
    scope: Option<&str>,
    vm_ids: &[Uuid],
) -> Result<AssignmentOutcome, AppError> {
    let txn = db.begin().await?;
    let tag = resolve_tag(&txn, tag_name, scope).await?;
    require_vms(&txn, vm_ids).await?;

    let changed = if vm_ids.is_empty() {
        0
    } else {
        vm_tag::Entity::delete_many()
            .filter(vm_tag::Column::TagId.eq(tag.tag_id))
            .filter(vm_tag::Column::VmId.is_in(vm_ids.to_vec()))
            .exec(&txn)
            .await?
            .rows_affected
    };
    txn.commit().await?;

    info!(tag_id = %tag.tag_id, vms = vm_ids.len(), changed, "Tag unassigned.");
    Ok(AssignmentOutcome {
        action: AssignmentAction::Unassign,
        tag_id: tag.tag_id,
        vm_ids: vm_ids.to_vec(),
        changed,
    })
}

pub async fn dispatch(
    db: &DatabaseConnection,
    action: &str,
    tag_name: &str,
    scope: Option<&str>,
    vm_ids: &[Uuid],
) -> Result<AssignmentOutcome, AppError> {
    match action.parse::<AssignmentAction>()? {
        AssignmentAction::Assign => assign(db, tag_name, scope, vm_ids).await,
        AssignmentAction::Unassign => unassign(db, tag_name, scope, vm_ids).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::services::{tag_service::create_tag, user_service::create_user, vm_service};
    use crate::db::{connect, schema::ensure_schema};
    use sea_orm::PaginatorTrait;

    async fn setup() -> DatabaseConnection {
        let db = connect("sqlite::memory:", 1).await.unwrap();
        ensure_schema(&db).await.unwrap();
        create_user(&db, "admin", None).await.unwrap();
        db
    }

    async fn link_count(db: &DatabaseConnection) -> u64 {
        vm_tag::Entity::find().count(db).await.unwrap()
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("assign".parse::<AssignmentAction>().unwrap(), AssignmentAction::Assign);
        assert_eq!("unassign".parse::<AssignmentAction>().unwrap(), AssignmentAction::Unassign);
        assert!(matches!("Assign".parse::<AssignmentAction>(), Err(AppError::InvalidAction(_))));
        assert!(matches!("".parse::<AssignmentAction>(), Err(AppError::InvalidAction(_))));
    }

    #[tokio::test]
    async fn test_assign_is_idempotent() {
        let db = setup().await;
        let tag = create_tag(&db, "backup", Some("daily"), 1).await.unwrap();
        let vm = vm_service::create_vm(&db, "vm-a", &[], None).await.unwrap();

        let first = assign(&db, "backup", None, &[vm.vm_id]).await.unwrap();
        assert_eq!(first.changed, 1);
        assert_eq!(first.tag_id, tag.tag_id);

        let second = assign(&db, "backup", None, &[vm.vm_id, vm.vm_id]).await.unwrap();
        assert_eq!(second.changed, 0);
        assert_eq!(link_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_assign_unknown_tag_creates_nothing() {
        let db = setup().await;
        let vm = vm_service::create_vm(&db, "vm-a", &[], None).await.unwrap();

        let err = assign(&db, "nope", None, &[vm.vm_id]).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(link_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_assign_unknown_vm_fails_whole_call() {
        let db = setup().await;
        create_tag(&db, "backup", None, 1).await.unwrap();
        let vm = vm_service::create_vm(&db, "vm-a", &[], None).await.unwrap();

        let err = assign(&db, "backup", None, &[vm.vm_id, Uuid::new_v4()]).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(link_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_unassign_missing_association_is_noop() {
        let db = setup().await;
        create_tag(&db, "backup", None, 1).await.unwrap();
        let vm_a = vm_service::create_vm(&db, "vm-a", &[], None).await.unwrap();
        let vm_b = vm_service::create_vm(&db, "vm-b", &[], None).await.unwrap();

        assign(&db, "backup", None, &[vm_a.vm_id]).await.unwrap();
        let outcome = unassign(&db, "backup", None, &[vm_a.vm_id, vm_b.vm_id]).await.unwrap();
        assert_eq!(outcome.changed, 1);

        let again = unassign(&db, "backup", None, &[vm_a.vm_id]).await.unwrap();
        assert_eq!(again.changed, 0);
        assert_eq!(link_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_ambiguous_name_needs_scope() {
        let db = setup().await;
        create_tag(&db, "env", Some("prod"), 1).await.unwrap();
        let dev = create_tag(&db, "env", Some("dev"), 1).await.unwrap();
        create_tag(&db, "env", None, 1).await.unwrap();
        let vm = vm_service::create_vm(&db, "vm-a", &[], None).await.unwrap();

        let err = assign(&db, "env", None, &[vm.vm_id]).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let outcome = assign(&db, "env", Some("dev"), &[vm.vm_id]).await.unwrap();
        assert_eq!(outcome.tag_id, dev.tag_id);

        let unscoped = resolve_tag(&db, "env", Some("")).await.unwrap();
        assert_eq!(unscoped.scope, None);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_unknown_action() {
        let db = setup().await;
        let err = dispatch(&db, "toggle", "backup", None, &[]).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidAction(_)));
    }
}
