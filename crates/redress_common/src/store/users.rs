use super::{enum_column, is_unique_violation, like_pattern, time_column, Store};
use crate::error::StoreError;
use crate::model::{Page, PageRequest, Pagination, Role, Status, User, UserSummary};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, is_active, department, created_at, updated_at";

/// Admin listing filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub role: Option<Role>,
    /// Case-insensitive match against name or email
    pub search: Option<String>,
}

/// Complaint counts shown on an account's admin page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserComplaintStats {
    pub total_complaints: u64,
    pub pending_complaints: u64,
    pub resolved_complaints: u64,
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: enum_column(row, 4)?,
        is_active: row.get(5)?,
        department: row.get(6)?,
        created_at: time_column(row, 7)?,
        updated_at: time_column(row, 8)?,
    })
}

fn find_one(conn: &Connection, column: &str, value: &str) -> Result<Option<User>, StoreError> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    Ok(conn
        .query_row(&sql, params![value], user_from_row)
        .optional()?)
}

impl Store {
    /// Insert a new account. Fails with `DuplicateEmail` if the address is taken.
    pub async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, password_hash, role, is_active,
                                    department, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    user.id,
                    user.name,
                    user.email,
                    user.password_hash,
                    user.role.as_str(),
                    user.is_active,
                    user.department,
                    user.created_at.timestamp_millis(),
                    user.updated_at.timestamp_millis(),
                ],
            );
            match inserted {
                Ok(_) => Ok(user),
                Err(e) if is_unique_violation(&e) => Err(StoreError::DuplicateEmail),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    pub async fn find_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| find_one(conn, "id", &id)).await
    }

    /// Lookup by normalized (lowercased) email
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.to_string();
        self.with_conn(move |conn| find_one(conn, "email", &email))
            .await
    }

    /// Overwrite every mutable column of an existing account
    pub async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let user = user.clone();
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET name = ?2, email = ?3, password_hash = ?4, role = ?5,
                                  is_active = ?6, department = ?7, updated_at = ?8
                     WHERE id = ?1",
                    params![
                        user.id,
                        user.name,
                        user.email,
                        user.password_hash,
                        user.role.as_str(),
                        user.is_active,
                        user.department,
                        user.updated_at.timestamp_millis(),
                    ],
                )
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        StoreError::DuplicateEmail
                    } else {
                        e.into()
                    }
                })?;
            if changed == 0 {
                return Err(StoreError::NotFound("User"));
            }
            Ok(())
        })
        .await
    }

    /// Remove an account. Complaints it authored stay in place.
    pub async fn delete_user(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            if conn.execute("DELETE FROM users WHERE id = ?1", params![id])? == 0 {
                return Err(StoreError::NotFound("User"));
            }
            Ok(())
        })
        .await
    }

    /// Newest first
    pub async fn list_users(
        &self,
        filter: UserFilter,
        page: PageRequest,
    ) -> Result<Page<User>, StoreError> {
        self.with_conn(move |conn| {
            let mut clauses: Vec<&str> = Vec::new();
            let mut values: Vec<Value> = Vec::new();

            if let Some(role) = filter.role {
                clauses.push("role = ?");
                values.push(Value::Text(role.as_str().to_string()));
            }
            if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
                clauses.push("(LOWER(name) LIKE ? ESCAPE '\\' OR LOWER(email) LIKE ? ESCAPE '\\')");
                let pattern = like_pattern(search.trim());
                values.push(Value::Text(pattern.clone()));
                values.push(Value::Text(pattern));
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!(" WHERE {}", clauses.join(" AND "))
            };

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM users{}", where_sql),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;

            let mut page_values = values;
            page_values.push(Value::Integer(i64::from(page.limit)));
            page_values.push(Value::Integer(page.offset() as i64));
            let sql = format!(
                "SELECT {} FROM users{} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                USER_COLUMNS, where_sql
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(params_from_iter(page_values.iter()), user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            debug!("Listed {} of {} users", items.len(), total);
            Ok(Page {
                items,
                pagination: Pagination::new(page, total as u64),
            })
        })
        .await
    }

    /// Active staff and admins, the people a complaint can be assigned to
    pub async fn staff_directory(&self) -> Result<Vec<UserSummary>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE role IN ('staff', 'admin') AND is_active = 1
                 ORDER BY name",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let staff = stmt
                .query_map([], user_from_row)?
                .map(|user| user.map(|u| u.summary()))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(staff)
        })
        .await
    }

    /// Summaries for a set of ids; unknown ids are simply absent
    pub async fn user_summaries(
        &self,
        ids: Vec<String>,
    ) -> Result<HashMap<String, UserSummary>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users WHERE id = ?1",
                USER_COLUMNS
            ))?;
            let mut found = HashMap::new();
            for id in ids {
                if found.contains_key(&id) {
                    continue;
                }
                if let Some(user) = stmt.query_row(params![id], user_from_row).optional()? {
                    found.insert(id, user.summary());
                }
            }
            Ok(found)
        })
        .await
    }

    pub async fn user_complaint_stats(
        &self,
        user_id: &str,
    ) -> Result<UserComplaintStats, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let (total, pending, resolved): (i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN status = ?2 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN status = ?3 THEN 1 ELSE 0 END), 0)
                 FROM complaints WHERE user_id = ?1",
                params![
                    user_id,
                    Status::Pending.as_str(),
                    Status::Resolved.as_str()
                ],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            Ok(UserComplaintStats {
                total_complaints: total as u64,
                pending_complaints: pending as u64,
                resolved_complaints: resolved as u64,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DbLocation;
    use chrono::Duration;

    fn user(id: &str, name: &str, email: &str, role: Role) -> User {
        let now = crate::now();
        User {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: "pbkdf2-sha256$1$00$00".to_string(),
            role,
            is_active: true,
            department: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn store() -> Store {
        Store::open(DbLocation::InMemory).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = store().await;
        let jane = user("u1", "Jane Smith", "jane@example.com", Role::User);
        store.insert_user(jane.clone()).await.unwrap();

        assert_eq!(store.find_user("u1").await.unwrap(), Some(jane.clone()));
        assert_eq!(
            store.find_user_by_email("jane@example.com").await.unwrap(),
            Some(jane)
        );
        assert_eq!(store.find_user("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = store().await;
        store
            .insert_user(user("u1", "Jane", "jane@example.com", Role::User))
            .await
            .unwrap();
        let err = store
            .insert_user(user("u2", "Jane Two", "jane@example.com", Role::User))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = store().await;
        let mut jane = user("u1", "Jane", "jane@example.com", Role::User);
        store.insert_user(jane.clone()).await.unwrap();

        jane.role = Role::Staff;
        jane.is_active = false;
        store.update_user(&jane).await.unwrap();
        let stored = store.find_user("u1").await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Staff);
        assert!(!stored.is_active);

        store.delete_user("u1").await.unwrap();
        assert!(matches!(
            store.delete_user("u1").await.unwrap_err(),
            StoreError::NotFound("User")
        ));
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let store = store().await;
        let base = crate::now();
        for (i, (name, role)) in [
            ("Admin User", Role::Admin),
            ("Staff Member", Role::Staff),
            ("John Doe", Role::User),
            ("Jane Smith", Role::User),
        ]
        .into_iter()
        .enumerate()
        {
            let mut u = user(
                &format!("u{i}"),
                name,
                &format!("{}@example.com", name.split(' ').next().unwrap().to_lowercase()),
                role,
            );
            u.created_at = base + Duration::seconds(i as i64);
            store.insert_user(u).await.unwrap();
        }

        let users = store
            .list_users(
                UserFilter {
                    role: Some(Role::User),
                    search: None,
                },
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(users.pagination.total, 2);
        assert_eq!(users.items[0].name, "Jane Smith");

        let search = store
            .list_users(
                UserFilter {
                    role: None,
                    search: Some("STAFF".to_string()),
                },
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(search.items.len(), 1);
        assert_eq!(search.items[0].role, Role::Staff);

        let second = store
            .list_users(UserFilter::default(), PageRequest::new(Some(2), Some(3)))
            .await
            .unwrap();
        assert_eq!(second.pagination.pages, 2);
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].name, "Admin User");
    }

    #[tokio::test]
    async fn test_staff_directory_excludes_inactive_and_users() {
        let store = store().await;
        store
            .insert_user(user("a", "Admin", "admin@example.com", Role::Admin))
            .await
            .unwrap();
        store
            .insert_user(user("s", "Staff", "staff@example.com", Role::Staff))
            .await
            .unwrap();
        let mut gone = user("g", "Gone", "gone@example.com", Role::Staff);
        gone.is_active = false;
        store.insert_user(gone).await.unwrap();
        store
            .insert_user(user("u", "User", "user@example.com", Role::User))
            .await
            .unwrap();

        let staff = store.staff_directory().await.unwrap();
        let ids: Vec<&str> = staff.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "s"]);
    }

    #[tokio::test]
    async fn test_user_summaries_skip_unknown() {
        let store = store().await;
        store
            .insert_user(user("a", "Admin", "admin@example.com", Role::Admin))
            .await
            .unwrap();
        let found = store
            .user_summaries(vec!["a".to_string(), "zz".to_string(), "a".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["a"].name, "Admin");
    }
}
