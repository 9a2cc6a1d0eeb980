use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A `(tag_name, scope)` label. The pair is unique across all tags; a null
/// scope collides with another null scope (see `db::schema`).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tags")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tag_id: Uuid,
    pub tag_name: String,
    pub scope: Option<String>,
    // Owner of the tag, consulted only when deleting it.
    pub user_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::UserId",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::vm::Entity> for Entity {
    fn to() -> RelationDef {
        super::vm_tag::Relation::Vm.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::vm_tag::Relation::Tag.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
