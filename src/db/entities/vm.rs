use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vms")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub vm_id: Uuid,
    #[sea_orm(unique)]
    pub vm_name: String,
    pub creation_date: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vm_tag::Entity")]
    VmTags,
}

impl Related<super::vm_tag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VmTags.def()
    }
}

impl Related<super::tag::Entity> for Entity {
    fn to() -> RelationDef {
        super::vm_tag::Relation::Tag.def()
    }
    fn via() -> Option<RelationDef> {
        Some(super::vm_tag::Relation::Vm.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
