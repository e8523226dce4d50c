//! Backend mount repository: registered storage endpoints the filestore
//! nodes and timestore storage targets resolve through (spec glossary).

use crate::error::{CoreError, CoreResult};
use crate::infrastructure::database::entities::backend_mount;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

pub async fn get_by_id<C: ConnectionTrait>(conn: &C, id: i64) -> CoreResult<backend_mount::Model> {
    backend_mount::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("backend mount {id}")))
}

pub async fn get_by_name<C: ConnectionTrait>(conn: &C, name: &str) -> CoreResult<Option<backend_mount::Model>> {
    Ok(backend_mount::Entity::find()
        .filter(backend_mount::Column::Name.eq(name))
        .one(conn)
        .await?)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    driver: &str,
    root_or_bucket: &str,
    prefix: Option<&str>,
    endpoint: Option<&str>,
    region: Option<&str>,
    force_path_style: bool,
) -> CoreResult<backend_mount::Model> {
    let active = backend_mount::ActiveModel {
        id: Default::default(),
        name: Set(name.to_string()),
        driver: Set(driver.to_string()),
        root_or_bucket: Set(root_or_bucket.to_string()),
        prefix: Set(prefix.map(str::to_string)),
        endpoint: Set(endpoint.map(str::to_string)),
        region: Set(region.map(str::to_string)),
        force_path_style: Set(force_path_style),
        created_at: Set(Utc::now()),
    };
    Ok(active.insert(conn).await?)
}
