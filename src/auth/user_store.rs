//! Credential store backed by SQLite.
//!
//! Holds user accounts and role documents. Connections are short-lived and
//! opened per call. The three canonical roles are seeded on startup; their
//! permission sets are refreshed in place from the compiled-in defaults so
//! the table and the binary never disagree.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use crate::auth::models::{Role, UpdateProfileRequest, User};
use crate::auth::permissions::DEFAULT_ROLES;

const USER_COLUMNS: &str = "id, email, first_name, last_name, password_hash, role_id, \
     profile_picture_url, is_email_verified, needs_password_change, created_at, updated_at";

type RawUser = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    bool,
    bool,
    String,
    String,
);

pub struct UserStore {
    db_path: String,
}

impl UserStore {
    /// Open (or create) the database, run the schema, and seed roles.
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn connection(&self) -> Result<Connection> {
        Connection::open(&self.db_path).context("failed to open database")
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                permissions TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                role_id TEXT NOT NULL,
                profile_picture_url TEXT,
                is_email_verified INTEGER NOT NULL DEFAULT 0,
                needs_password_change INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (role_id) REFERENCES roles(id)
            )",
            [],
        )?;

        self.seed_default_roles(&conn)?;

        Ok(())
    }

    /// Upsert the canonical roles by name. Existing role rows keep their
    /// ids (users reference them) but get their permissions refreshed;
    /// roles are never deleted here.
    fn seed_default_roles(&self, conn: &Connection) -> Result<()> {
        for (name, actions) in DEFAULT_ROLES {
            let permissions =
                serde_json::to_string(actions).context("failed to serialize role permissions")?;
            conn.execute(
                "INSERT INTO roles (id, name, permissions) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET permissions = excluded.permissions",
                params![Uuid::new_v4().to_string(), name, permissions],
            )
            .with_context(|| format!("failed to seed role {name}"))?;
        }
        info!("seeded default roles");
        Ok(())
    }

    pub fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let conn = self.connection()?;
        let raw = conn
            .query_row(
                "SELECT id, name, permissions FROM roles WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        raw.map(role_from_raw).transpose()
    }

    pub fn find_role_by_id(&self, id: &Uuid) -> Result<Option<Role>> {
        let conn = self.connection()?;
        let raw = conn
            .query_row(
                "SELECT id, name, permissions FROM roles WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        raw.map(role_from_raw).transpose()
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.connection()?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
        let raw = conn
            .query_row(&sql, params![email], read_user_row)
            .optional()?;
        raw.map(user_from_raw).transpose()
    }

    pub fn find_user_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        let conn = self.connection()?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        let raw = conn
            .query_row(&sql, params![id.to_string()], read_user_row)
            .optional()?;
        raw.map(user_from_raw).transpose()
    }

    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO users (id, email, first_name, last_name, password_hash, role_id,
                profile_picture_url, is_email_verified, needs_password_change,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                user.id.to_string(),
                user.email,
                user.first_name,
                user.last_name,
                user.password_hash,
                user.role_id.to_string(),
                user.profile_picture_url,
                user.is_email_verified,
                user.needs_password_change,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        )
        .context("failed to insert user")?;
        Ok(())
    }

    /// Returns false when no row matched the user id.
    pub fn update_user_password(&self, user_id: &Uuid, password_hash: &str) -> Result<bool> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                password_hash,
                Utc::now().to_rfc3339(),
                user_id.to_string()
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn update_user_password_and_flag(
        &self,
        user_id: &Uuid,
        password_hash: &str,
        needs_change: bool,
    ) -> Result<bool> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE users SET password_hash = ?1, needs_password_change = ?2, updated_at = ?3
             WHERE id = ?4",
            params![
                password_hash,
                needs_change,
                Utc::now().to_rfc3339(),
                user_id.to_string()
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn update_user_role(&self, user_id: &Uuid, role_id: &Uuid) -> Result<bool> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE users SET role_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                role_id.to_string(),
                Utc::now().to_rfc3339(),
                user_id.to_string()
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn update_user_profile(&self, user_id: &Uuid, req: &UpdateProfileRequest) -> Result<bool> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE users SET
                first_name = COALESCE(?1, first_name),
                last_name = COALESCE(?2, last_name),
                profile_picture_url = COALESCE(?3, profile_picture_url),
                updated_at = ?4
             WHERE id = ?5",
            params![
                req.first_name,
                req.last_name,
                req.profile_picture_url,
                Utc::now().to_rfc3339(),
                user_id.to_string()
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn set_email_verified(&self, user_id: &Uuid) -> Result<bool> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE users SET is_email_verified = 1, updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), user_id.to_string()],
        )?;
        Ok(changed > 0)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.connection()?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at");
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map([], read_user_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(user_from_raw).collect()
    }
}

fn read_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn user_from_raw(raw: RawUser) -> Result<User> {
    let (
        id,
        email,
        first_name,
        last_name,
        password_hash,
        role_id,
        profile_picture_url,
        is_email_verified,
        needs_password_change,
        created_at,
        updated_at,
    ) = raw;
    Ok(User {
        id: Uuid::parse_str(&id).context("invalid user id in database")?,
        email,
        first_name,
        last_name,
        password_hash,
        role_id: Uuid::parse_str(&role_id).context("invalid role id in database")?,
        profile_picture_url,
        is_email_verified,
        needs_password_change,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn role_from_raw(raw: (String, String, String)) -> Result<Role> {
    let (id, name, permissions) = raw;
    let permissions: HashSet<String> =
        serde_json::from_str(&permissions).context("invalid permission list in database")?;
    Ok(Role {
        id: Uuid::parse_str(&id).context("invalid role id in database")?,
        name,
        permissions,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .context("invalid timestamp in database")?
        .with_timezone(&Utc))
}
