use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    ModelTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

use crate::db::entities::{tag, vm, vm_tag};
use crate::db::services::{assignment_service, filters, tag_service, user_service};
use crate::db::services::tag_service::TagSpec;
use crate::web::error::{is_unique_violation, AppError};

pub const VM_NAME_MAX_LEN: usize = 255;

/// Query for [`list_vms`]. `tag_name`, `scopes` and `scope` may all repeat in
/// the query string; `scope` and `scopes` are merged into one AND'd list.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct VmQuery {
    pub vm_id: Option<Uuid>,
    #[serde(default, rename = "tag_name")]
    pub tag_names: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub scope: Vec<String>,
}

impl VmQuery {
    fn scope_patterns(&self) -> impl Iterator<Item = &String> {
        self.scopes.iter().chain(&self.scope)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagSummary {
    pub tag_id: Uuid,
    pub tag_name: String,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmWithTags {
    pub vm_id: Uuid,
    pub vm_name: String,
    pub creation_date: DateTime<Utc>,
    pub tags: Vec<TagSummary>,
}

impl VmWithTags {
    fn from_parts(vm: vm::Model, tags: Vec<tag::Model>) -> Self {
        Self {
            vm_id: vm.vm_id,
            vm_name: vm.vm_name,
            creation_date: vm.creation_date,
            tags: tags
                .into_iter()
                .map(|t| TagSummary { tag_id: t.tag_id, tag_name: t.tag_name, scope: t.scope })
                .collect(),
        }
    }
}

fn validate_vm_name(vm_name: &str) -> Result<(), AppError> {
    if vm_name.is_empty() {
        return Err(AppError::InvalidInput("vm_name is required and cannot be empty".to_string()));
    }
    if vm_name.chars().count() > VM_NAME_MAX_LEN {
        return Err(AppError::InvalidInput(format!(
            "vm_name must be at most {VM_NAME_MAX_LEN} characters"
        )));
    }
    Ok(())
}

fn unique_vm_name_error(db_err: sea_orm::DbErr, vm_name: &str) -> AppError {
    if is_unique_violation(&db_err) {
        AppError::DuplicateVm(vm_name.to_owned())
    } else {
        AppError::from(db_err)
    }
}

/// Ids of the VMs carrying at least one tag whose lower-cased name is in `names`.
async fn find_vm_ids_tagged_with<C: ConnectionTrait>(db: &C, names: Vec<String>) -> Result<Vec<Uuid>, AppError> {
    let lowered_name = Func::lower(Expr::col((tag::Entity, tag::Column::TagName)));
    Ok(vm_tag::Entity::find()
        .select_only()
        .column(vm_tag::Column::VmId)
        .distinct()
        .inner_join(tag::Entity)
        .filter(Expr::expr(lowered_name).is_in(names))
        .into_tuple::<Uuid>()
        .all(db)
        .await?)
}

async fn find_vm_by_name<C: ConnectionTrait>(db: &C, vm_name: &str) -> Result<Option<vm::Model>, AppError> {
    Ok(vm::Entity::find()
        .filter(vm::Column::VmName.eq(vm_name))
        .one(db)
        .await?)
}

async fn require_vm<C: ConnectionTrait>(db: &C, vm_id: Uuid) -> Result<vm::Model, AppError> {
    vm::Entity::find_by_id(vm_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("VM {vm_id}")))
}

// --- VM Service Functions ---

pub async fn get_vm_with_tags<C: ConnectionTrait>(db: &C, vm_id: Uuid) -> Result<VmWithTags, AppError> {
    let vm_model = require_vm(db, vm_id).await?;
    let tags = vm_model.find_related(tag::Entity).all(db).await?;
    Ok(VmWithTags::from_parts(vm_model, tags))
}

/// Lists VMs with their tags.
///
/// With `vm_id` only that VM is returned. Otherwise tag-name filters are OR'd
/// (case-insensitive exact) and scope filters are AND'd: each scope regex must
/// match the scope of at least one of the VM's tags.
pub async fn list_vms(db: &DatabaseConnection, query: &VmQuery) -> Result<Vec<VmWithTags>, AppError> {
    if let Some(vm_id) = query.vm_id {
        return Ok(vec![get_vm_with_tags(db, vm_id).await?]);
    }

    let scope_patterns = query
        .scope_patterns()
        .map(|s| filters::compile_regex(s.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut select = vm::Entity::find();
    if !query.tag_names.is_empty() {
        let tag_names: Vec<String> = query.tag_names.iter().map(|n| n.trim().to_lowercase()).collect();
        let vm_ids = find_vm_ids_tagged_with(db, tag_names).await?;
        if vm_ids.is_empty() {
            return Ok(Vec::new());
        }
        select = select.filter(vm::Column::VmId.is_in(vm_ids));
    }

    let vms = select
        .find_with_related(tag::Entity)
        .all(db)
        .await?
        .into_iter()
        .filter(|(_, tags)| filters::has_scopes_matching_all(tags, &scope_patterns))
        .map(|(vm_model, tags)| VmWithTags::from_parts(vm_model, tags))
        .collect();
    Ok(vms)
}

/// Creates a VM and attaches the tags named by `tag_specs`, creating missing
/// tags owned by `owner_user_id`.
///
/// Everything happens in one transaction: a failure after the VM row was
/// inserted leaves nothing behind.
pub async fn create_vm(
    db: &DatabaseConnection,
    vm_name: &str,
    tag_specs: &[String],
    owner_user_id: Option<i32>,
) -> Result<VmWithTags, AppError> {
    validate_vm_name(vm_name)?;
    let specs = tag_specs
        .iter()
        .map(|s| s.parse::<TagSpec>())
        .collect::<Result<Vec<_>, _>>()?;

    let txn = db.begin().await?;

    if find_vm_by_name(&txn, vm_name).await?.is_some() {
        return Err(AppError::DuplicateVm(vm_name.to_owned()));
    }

    let new_vm = vm::ActiveModel {
        vm_id: Set(Uuid::new_v4()),
        vm_name: Set(vm_name.to_owned()),
        creation_date: Set(Utc::now()),
    };
    let vm_model = new_vm
        .insert(&txn)
        .await
        .map_err(|db_err| unique_vm_name_error(db_err, vm_name))?;

    let mut owner_verified = false;
    let mut tag_ids = Vec::with_capacity(specs.len());
    let mut created_tags = 0usize;
    for spec in &specs {
        let tag = match tag_service::find_tag(&txn, &spec.tag_name, spec.scope.as_deref()).await? {
            Some(existing) => existing,
            None => {
                let owner = owner_user_id
                    .ok_or_else(|| AppError::MissingParameter("user_id".to_string()))?;
                if !owner_verified {
                    user_service::require_user(&txn, owner).await?;
                    owner_verified = true;
                }
                created_tags += 1;
                tag_service::insert_tag(&txn, &spec.tag_name, spec.scope.as_deref(), owner).await?
            }
        };
        if !tag_ids.contains(&tag.tag_id) {
            tag_ids.push(tag.tag_id);
        }
    }

    let pairs: Vec<(Uuid, Uuid)> = tag_ids.iter().map(|tag_id| (vm_model.vm_id, *tag_id)).collect();
    assignment_service::link_pairs(&txn, &pairs).await?;

    let created = get_vm_with_tags(&txn, vm_model.vm_id).await?;
    txn.commit().await?;

    info!(
        vm_id = %created.vm_id,
        vm_name = %created.vm_name,
        attached_tags = created.tags.len(),
        created_tags,
        "VM created."
    );
    Ok(created)
}

/// Renames a VM and/or replaces its tag set wholesale.
pub async fn update_vm(
    db: &DatabaseConnection,
    vm_id: Uuid,
    new_name: Option<String>,
    tag_ids: Option<Vec<Uuid>>,
) -> Result<VmWithTags, AppError> {
    let txn = db.begin().await?;
    let vm_model = require_vm(&txn, vm_id).await?;

    if let Some(name) = new_name {
        validate_vm_name(&name)?;
        if name != vm_model.vm_name {
            if find_vm_by_name(&txn, &name).await?.is_some() {
                return Err(AppError::DuplicateVm(name));
            }
            let mut active_model = vm_model.into_active_model();
            active_model.vm_name = Set(name.clone());
            active_model
                .update(&txn)
                .await
                .map_err(|db_err| unique_vm_name_error(db_err, &name))?;
        }
    }

    if let Some(ids) = tag_ids {
        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = ids.into_iter().filter(|id| seen.insert(*id)).collect();

        if !ids.is_empty() {
            let found: HashSet<Uuid> = tag::Entity::find()
                .filter(tag::Column::TagId.is_in(ids.clone()))
                .all(&txn)
                .await?
                .into_iter()
                .map(|t| t.tag_id)
                .collect();
            let missing: Vec<String> = ids
                .iter()
                .filter(|id| !found.contains(id))
                .map(Uuid::to_string)
                .collect();
            if !missing.is_empty() {
                return Err(AppError::NotFound(format!("tags {}", missing.join(", "))));
            }
        }

        vm_tag::Entity::delete_many()
            .filter(vm_tag::Column::VmId.eq(vm_id))
            .exec(&txn)
            .await?;
        let pairs: Vec<(Uuid, Uuid)> = ids.iter().map(|tag_id| (vm_id, *tag_id)).collect();
        assignment_service::link_pairs(&txn, &pairs).await?;
    }

    let updated = get_vm_with_tags(&txn, vm_id).await?;
    txn.commit().await?;

    info!(%vm_id, vm_name = %updated.vm_name, tags = updated.tags.len(), "VM updated.");
    Ok(updated)
}

/// Deletes a VM and its tag associations. The tags themselves stay.
pub async fn delete_vm(db: &DatabaseConnection, vm_id: Uuid) -> Result<(), AppError> {
    let txn = db.begin().await?;
    let vm_model = require_vm(&txn, vm_id).await?;

    let detached = vm_tag::Entity::delete_many()
        .filter(vm_tag::Column::VmId.eq(vm_id))
        .exec(&txn)
        .await?
        .rows_affected;
    vm_model.delete(&txn).await?;
    txn.commit().await?;

    info!(%vm_id, detached_tags = detached, "VM deleted.");
    Ok(())
}
