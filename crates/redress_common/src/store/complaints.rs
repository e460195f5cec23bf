use super::{enum_column, like_pattern, optional_time_column, time_column, Store};
use crate::error::StoreError;
use crate::model::{
    Category, Complaint, Page, PageRequest, Pagination, Priority, Status, TimelineEntry,
};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use tracing::debug;

const COMPLAINT_COLUMNS: &str = "id, user_id, title, category, description, attachments, status,
     priority, assigned_to, resolution_note, resolved_at, created_at, updated_at";

/// Listing filter. Every set field narrows the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplaintFilter {
    pub author: Option<String>,
    pub assignee: Option<String>,
    pub status: Option<Status>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    /// Case-insensitive match against title or description
    pub search: Option<String>,
}

impl ComplaintFilter {
    fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values = Vec::new();

        if let Some(author) = &self.author {
            clauses.push("user_id = ?");
            values.push(Value::Text(author.clone()));
        }
        if let Some(assignee) = &self.assignee {
            clauses.push("assigned_to = ?");
            values.push(Value::Text(assignee.clone()));
        }
        if let Some(status) = self.status {
            clauses.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(category) = self.category {
            clauses.push("category = ?");
            values.push(Value::Text(category.as_str().to_string()));
        }
        if let Some(priority) = self.priority {
            clauses.push("priority = ?");
            values.push(Value::Text(priority.as_str().to_string()));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push(
                "(LOWER(title) LIKE ? ESCAPE '\\' OR LOWER(description) LIKE ? ESCAPE '\\')",
            );
            let pattern = like_pattern(search);
            values.push(Value::Text(pattern.clone()));
            values.push(Value::Text(pattern));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        (where_sql, values)
    }
}

fn complaint_from_row(row: &Row<'_>) -> rusqlite::Result<Complaint> {
    let attachments: String = row.get(5)?;
    let attachments: Vec<String> = serde_json::from_str(&attachments)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(Complaint {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        category: enum_column(row, 3)?,
        description: row.get(4)?,
        attachments,
        status: enum_column(row, 6)?,
        priority: enum_column(row, 7)?,
        assigned_to: row.get(8)?,
        timeline: Vec::new(),
        resolution_note: row.get(9)?,
        resolved_at: optional_time_column(row, 10)?,
        created_at: time_column(row, 11)?,
        updated_at: time_column(row, 12)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<TimelineEntry> {
    Ok(TimelineEntry {
        status: enum_column(row, 0)?,
        note: row.get(1)?,
        updated_by: row.get(2)?,
        timestamp: time_column(row, 3)?,
    })
}

fn load_timeline(conn: &Connection, complaint: &mut Complaint) -> Result<(), StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT status, note, updated_by, timestamp FROM timeline_entries
         WHERE complaint_id = ?1 ORDER BY seq",
    )?;
    complaint.timeline = stmt
        .query_map(params![complaint.id], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(())
}

/// Insert timeline entries from position `from` onwards
fn append_timeline(
    tx: &Transaction<'_>,
    complaint: &Complaint,
    from: usize,
) -> Result<(), StoreError> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO timeline_entries (complaint_id, seq, status, note, updated_by, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for (seq, entry) in complaint.timeline.iter().enumerate().skip(from) {
        stmt.execute(params![
            complaint.id,
            seq as i64,
            entry.status.as_str(),
            entry.note,
            entry.updated_by,
            entry.timestamp.timestamp_millis(),
        ])?;
    }
    Ok(())
}

fn stored_timeline_len(tx: &Transaction<'_>, complaint_id: &str) -> Result<usize, StoreError> {
    let len: i64 = tx.query_row(
        "SELECT COUNT(*) FROM timeline_entries WHERE complaint_id = ?1",
        params![complaint_id],
        |row| row.get(0),
    )?;
    Ok(len as usize)
}

impl Store {
    pub async fn insert_complaint(&self, complaint: Complaint) -> Result<Complaint, StoreError> {
        self.with_conn(move |conn| {
            let attachments = serde_json::to_string(&complaint.attachments)?;
            let tx = conn.transaction()?;
            tx.execute(
                &format!(
                    "INSERT INTO complaints ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    COMPLAINT_COLUMNS
                ),
                params![
                    complaint.id,
                    complaint.user_id,
                    complaint.title,
                    complaint.category.as_str(),
                    complaint.description,
                    attachments,
                    complaint.status.as_str(),
                    complaint.priority.as_str(),
                    complaint.assigned_to,
                    complaint.resolution_note,
                    complaint.resolved_at.map(|t| t.timestamp_millis()),
                    complaint.created_at.timestamp_millis(),
                    complaint.updated_at.timestamp_millis(),
                ],
            )?;
            append_timeline(&tx, &complaint, 0)?;
            tx.commit()?;
            Ok(complaint)
        })
        .await
    }

    /// Complaint with its full timeline
    pub async fn find_complaint(&self, id: &str) -> Result<Option<Complaint>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    &format!("SELECT {} FROM complaints WHERE id = ?1", COMPLAINT_COLUMNS),
                    params![id],
                    complaint_from_row,
                )
                .optional()?;
            match found {
                Some(mut complaint) => {
                    load_timeline(conn, &mut complaint)?;
                    Ok(Some(complaint))
                }
                None => Ok(None),
            }
        })
        .await
    }

    /// Persist `next`, a lifecycle transition of `loaded`.
    ///
    /// `loaded` is the snapshot the caller read. If the stored row has moved
    /// on since (status, `updated_at` or timeline length differ) the save is
    /// refused with `StoreError::Conflict` and nothing is written.
    ///
    /// The stored timeline is append-only: entries already on disk are never
    /// rewritten, only the ones past the stored length are inserted. A
    /// timeline shorter than what is stored is refused.
    pub async fn save_complaint(
        &self,
        loaded: &Complaint,
        next: &Complaint,
    ) -> Result<(), StoreError> {
        let expected_status = loaded.status;
        let expected_updated_at = loaded.updated_at.timestamp_millis();
        let expected_len = loaded.timeline.len();
        let complaint = next.clone();
        self.with_conn(move |conn| {
            let attachments = serde_json::to_string(&complaint.attachments)?;
            let tx = conn.transaction()?;

            let current: Option<(String, i64)> = tx
                .query_row(
                    "SELECT status, updated_at FROM complaints WHERE id = ?1",
                    params![complaint.id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (status, updated_at) = match current {
                Some(current) => current,
                None => return Err(StoreError::NotFound("Complaint")),
            };
            let stored = stored_timeline_len(&tx, &complaint.id)?;
            if status != expected_status.as_str()
                || updated_at != expected_updated_at
                || stored != expected_len
            {
                return Err(StoreError::Conflict(format!(
                    "complaint {} changed since it was read",
                    complaint.id
                )));
            }
            if complaint.timeline.len() < stored {
                return Err(StoreError::Corrupt(format!(
                    "timeline of {} would shrink from {} to {} entries",
                    complaint.id,
                    stored,
                    complaint.timeline.len()
                )));
            }

            tx.execute(
                "UPDATE complaints SET title = ?2, category = ?3, description = ?4,
                        attachments = ?5, status = ?6, priority = ?7, assigned_to = ?8,
                        resolution_note = ?9, resolved_at = ?10, updated_at = ?11
                 WHERE id = ?1",
                params![
                    complaint.id,
                    complaint.title,
                    complaint.category.as_str(),
                    complaint.description,
                    attachments,
                    complaint.status.as_str(),
                    complaint.priority.as_str(),
                    complaint.assigned_to,
                    complaint.resolution_note,
                    complaint.resolved_at.map(|t| t.timestamp_millis()),
                    complaint.updated_at.timestamp_millis(),
                ],
            )?;
            append_timeline(&tx, &complaint, stored)?;
            tx.commit()?;

            debug!(
                "Saved complaint {} ({} new timeline entries)",
                complaint.id,
                complaint.timeline.len() - stored
            );
            Ok(())
        })
        .await
    }

    pub async fn delete_complaint(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            if conn.execute("DELETE FROM complaints WHERE id = ?1", params![id])? == 0 {
                return Err(StoreError::NotFound("Complaint"));
            }
            Ok(())
        })
        .await
    }

    /// Newest first, each complaint with its timeline
    pub async fn list_complaints(
        &self,
        filter: ComplaintFilter,
        page: PageRequest,
    ) -> Result<Page<Complaint>, StoreError> {
        self.with_conn(move |conn| {
            let (where_sql, values) = filter.to_sql();

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM complaints{}", where_sql),
                params_from_iter(values.iter()),
                |row| row.get(0),
            )?;

            let mut page_values = values;
            page_values.push(Value::Integer(i64::from(page.limit)));
            page_values.push(Value::Integer(page.offset() as i64));
            let sql = format!(
                "SELECT {} FROM complaints{} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
                COMPLAINT_COLUMNS, where_sql
            );
            let mut items = {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(page_values.iter()), complaint_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            for complaint in &mut items {
                load_timeline(conn, complaint)?;
            }

            debug!("Listed {} of {} complaints", items.len(), total);
            Ok(Page {
                items,
                pagination: Pagination::new(page, total as u64),
            })
        })
        .await
    }
}
