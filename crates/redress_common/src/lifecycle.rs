//! Complaint lifecycle transitions.
//!
//! Every mutation of a complaint goes through one of the functions here.
//! They take the current complaint and return the next one, so the audit
//! side effects (timeline append, first-resolution timestamp) are visible at
//! the call site instead of hidden in a persistence hook.
//!
//! Any status may move to any other status. There is no terminal lock on
//! `resolved` or `rejected`.

use crate::model::{Complaint, Priority, Status, TimelineEntry};
use crate::validation::ComplaintDraft;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Note recorded on the seed timeline entry
pub const SUBMITTED_NOTE: &str = "Complaint submitted";

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

impl Complaint {
    /// Build a freshly filed complaint in `pending` with its seed timeline entry
    pub fn file(author_id: &str, draft: ComplaintDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: author_id.to_string(),
            title: draft.title,
            category: draft.category,
            description: draft.description,
            attachments: draft.attachments,
            status: Status::Pending,
            priority: draft.priority,
            assigned_to: None,
            timeline: vec![TimelineEntry {
                status: Status::Pending,
                note: SUBMITTED_NOTE.to_string(),
                updated_by: author_id.to_string(),
                timestamp: now,
            }],
            resolution_note: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Hours between filing and first resolution, `None` until resolved
    pub fn resolution_time(&self) -> Option<f64> {
        self.resolved_at.map(|resolved| {
            (resolved - self.created_at).num_milliseconds() as f64 / MILLIS_PER_HOUR
        })
    }

    pub fn is_assigned_to(&self, user_id: &str) -> bool {
        self.assigned_to.as_deref() == Some(user_id)
    }

    pub fn latest_entry(&self) -> Option<&TimelineEntry> {
        self.timeline.last()
    }
}

/// Move a complaint to `new_status` on behalf of `actor_id`.
///
/// - A timeline entry is appended only when the status value changes.
/// - `resolved_at` is stamped the first time the complaint reaches
///   `resolved` and is never overwritten afterwards.
/// - Moving to `resolved` with a non-empty note records it as the
///   resolution note.
pub fn apply_status_change(
    complaint: &Complaint,
    new_status: Status,
    note: &str,
    actor_id: &str,
    now: DateTime<Utc>,
) -> Complaint {
    let mut next = complaint.clone();
    let note = note.trim();

    if next.status != new_status {
        next.timeline.push(TimelineEntry {
            status: new_status,
            note: note.to_string(),
            updated_by: actor_id.to_string(),
            timestamp: now,
        });
        next.status = new_status;
    }

    if new_status == Status::Resolved {
        if next.resolved_at.is_none() {
            next.resolved_at = Some(now);
        }
        if !note.is_empty() {
            next.resolution_note = Some(note.to_string());
        }
    }

    next.updated_at = now;
    next
}

/// Hand a complaint to a staff member. Status and timeline are untouched.
pub fn assign(complaint: &Complaint, staff_id: &str, now: DateTime<Utc>) -> Complaint {
    let mut next = complaint.clone();
    next.assigned_to = Some(staff_id.to_string());
    next.updated_at = now;
    next
}

pub fn reprioritize(complaint: &Complaint, priority: Priority, now: DateTime<Utc>) -> Complaint {
    let mut next = complaint.clone();
    next.priority = priority;
    next.updated_at = now;
    next
}
