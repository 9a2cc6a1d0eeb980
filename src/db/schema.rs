//! Creates the tables and unique indexes the registries rely on.
//!
//! Every statement is idempotent, so this can run on each start-up. It is not a
//! migration system: existing tables are never altered.

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::{tag, user, vm, vm_tag};

// `COALESCE` makes two NULL scopes collide, which a plain composite unique
// index would not do.
const TAG_NAME_SCOPE_UNIQUE_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_tags_name_scope ON tags (tag_name, COALESCE(scope, ''))";

const VM_TAGS_TAG_ID_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_vm_tags_tag_id ON vm_tags (tag_id)";

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, user::Entity).await?;
    create_table(db, tag::Entity).await?;
    create_table(db, vm::Entity).await?;
    create_table(db, vm_tag::Entity).await?;

    db.execute_unprepared(TAG_NAME_SCOPE_UNIQUE_INDEX).await?;
    db.execute_unprepared(VM_TAGS_TAG_ID_INDEX).await?;

    info!("Database schema is in place.");
    Ok(())
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let mut stmt = Schema::new(backend).create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect;

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let db = connect("sqlite::memory:", 1).await.unwrap();
        ensure_schema(&db).await.unwrap();
        ensure_schema(&db).await.unwrap();

        let tags = tag::Entity::find().all(&db).await.unwrap();
        assert!(tags.is_empty());
    }
}
