use log::error;
use sqlx::SqliteConnection;

use crate::{
    db_types::{AdminUser, Role, Roles},
    traits::AuthApiError,
};

pub async fn fetch_admin_user(username: &str, conn: &mut SqliteConnection) -> Result<Option<AdminUser>, AuthApiError> {
    let user = sqlx::query_as::<_, AdminUser>("SELECT * FROM admin_users WHERE username = $1")
        .bind(username)
        .fetch_optional(conn)
        .await?;
    Ok(user)
}

pub(crate) async fn insert_admin_user(
    username: &str,
    api_key_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<AdminUser, AuthApiError> {
    let result = sqlx::query_as::<_, AdminUser>(
        "INSERT INTO admin_users (username, api_key_hash) VALUES ($1, $2) RETURNING *",
    )
    .bind(username)
    .bind(api_key_hash)
    .fetch_one(conn)
    .await;
    match result {
        Ok(user) => Ok(user),
        Err(sqlx::Error::Database(de)) if matches!(de.code().as_deref(), Some("1555") | Some("2067")) => {
            Err(AuthApiError::AdminAlreadyExists(username.to_string()))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_roles(username: &str, conn: &mut SqliteConnection) -> Result<Roles, AuthApiError> {
    let names: Vec<String> = sqlx::query_scalar(
        r#"SELECT r.name FROM roles r
        JOIN role_assignments ra ON ra.role_id = r.id
        WHERE ra.username = $1 ORDER BY r.id ASC"#,
    )
    .bind(username)
    .fetch_all(conn)
    .await?;
    let roles = names
        .iter()
        .filter_map(|name| {
            name.parse::<Role>()
                .map_err(|e| {
                    error!("{e}. Ignoring unknown role for {username}");
                })
                .ok()
        })
        .collect();
    Ok(roles)
}

pub(crate) async fn assign_roles(
    username: &str,
    roles: &[Role],
    conn: &mut SqliteConnection,
) -> Result<(), AuthApiError> {
    for role in roles {
        let role_id: Option<i64> = sqlx::query_scalar("SELECT id FROM roles WHERE name = $1")
            .bind(role.to_string())
            .fetch_optional(&mut *conn)
            .await?;
        let role_id = role_id.ok_or(AuthApiError::RoleNotFound(*role))?;
        sqlx::query("INSERT OR IGNORE INTO role_assignments (username, role_id) VALUES ($1, $2)")
            .bind(username)
            .bind(role_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub(crate) async fn revoke_roles(
    username: &str,
    roles: &[Role],
    conn: &mut SqliteConnection,
) -> Result<(), AuthApiError> {
    for role in roles {
        sqlx::query(
            "DELETE FROM role_assignments WHERE username = $1 AND role_id IN (SELECT id FROM roles WHERE name = $2)",
        )
        .bind(username)
        .bind(role.to_string())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn admin_user_count(conn: &mut SqliteConnection) -> Result<i64, AuthApiError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admin_users").fetch_one(conn).await?;
    Ok(count)
}
