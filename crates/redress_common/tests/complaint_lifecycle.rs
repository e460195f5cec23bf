//! Complaint lifecycle through the store, on a real database file.

use chrono::Duration;
use redress_common::lifecycle::{apply_status_change, assign, reprioritize};
use redress_common::model::PageRequest;
use redress_common::policy::{authorize, Action, Principal, Resource, Subject};
use redress_common::store::ComplaintFilter;
use redress_common::validation::NewComplaint;
use redress_common::{Complaint, DbLocation, Priority, Role, Status, Store};
use tempfile::TempDir;

fn submission() -> NewComplaint {
    NewComplaint {
        title: "  Wi-Fi not working in Library  ".to_string(),
        category: "IT".to_string(),
        description: "The Wi-Fi has been down on the second floor since Monday".to_string(),
        priority: Some("high".to_string()),
        attachments: Vec::new(),
    }
}

#[tokio::test]
async fn test_file_progress_resolve_and_reopen() {
    let temp = TempDir::new().unwrap();
    let store = Store::open(DbLocation::Path(temp.path().join("redress.db")))
        .await
        .unwrap();

    let filed_at = redress_common::now() - Duration::hours(5);
    let draft = submission().validate().unwrap();
    assert_eq!(draft.title, "Wi-Fi not working in Library");

    let complaint = Complaint::file("author", draft, filed_at);
    store.insert_complaint(complaint.clone()).await.unwrap();

    let assigned = assign(&complaint, "staff", filed_at + Duration::minutes(10));
    let working = apply_status_change(
        &assigned,
        Status::InProgress,
        "Assigned",
        "admin",
        filed_at + Duration::hours(1),
    );
    store.save_complaint(&complaint, &working).await.unwrap();

    let stored = store.find_complaint(&complaint.id).await.unwrap().unwrap();
    assert_eq!(stored.timeline.len(), 2);
    assert!(stored.resolved_at.is_none());
    assert!(stored.resolution_time().is_none());

    let resolved_at = filed_at + Duration::hours(4);
    let resolved = apply_status_change(&stored, Status::Resolved, "Fixed", "staff", resolved_at);
    store.save_complaint(&stored, &resolved).await.unwrap();

    // resaving as resolved keeps the first stamp
    let again = apply_status_change(
        &resolved,
        Status::Resolved,
        "",
        "staff",
        resolved_at + Duration::hours(1),
    );
    store.save_complaint(&resolved, &again).await.unwrap();

    let stored = store.find_complaint(&complaint.id).await.unwrap().unwrap();
    assert_eq!(stored.timeline.len(), 3);
    assert_eq!(stored.resolved_at, Some(resolved_at));
    assert_eq!(stored.resolution_note.as_deref(), Some("Fixed"));
    assert_eq!(stored.resolution_time(), Some(4.0));

    // reopening is allowed and still keeps resolved_at
    let reopened = apply_status_change(
        &stored,
        Status::Pending,
        "Problem is back",
        "admin",
        resolved_at + Duration::hours(2),
    );
    let reopened = reprioritize(&reopened, Priority::Critical, resolved_at + Duration::hours(2));
    store.save_complaint(&stored, &reopened).await.unwrap();

    let stored = store.find_complaint(&complaint.id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Pending);
    assert_eq!(stored.priority, Priority::Critical);
    assert_eq!(stored.timeline.len(), 4);
    assert_eq!(stored.resolved_at, Some(resolved_at));
    let statuses: Vec<Status> = stored.timeline.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            Status::Pending,
            Status::InProgress,
            Status::Resolved,
            Status::Pending
        ]
    );
}

#[tokio::test]
async fn test_read_access_follows_policy() {
    let store = Store::open(DbLocation::InMemory).await.unwrap();
    let now = redress_common::now();
    let complaint = Complaint::file("author", submission().validate().unwrap(), now);
    let complaint = assign(&complaint, "staff-a", now);
    store.insert_complaint(complaint.clone()).await.unwrap();

    let stored = store.find_complaint(&complaint.id).await.unwrap().unwrap();
    let subject = Subject::complaint(&stored);
    let check = |id: &str, role: Role| {
        authorize(&Principal::new(id, role), Resource::Complaint, Action::Read, &subject)
    };

    assert!(check("author", Role::User).is_ok());
    assert!(check("someone-else", Role::User).is_err());
    assert!(check("staff-a", Role::Staff).is_ok());
    assert!(check("staff-b", Role::Staff).is_err());
    assert!(check("any-admin", Role::Admin).is_ok());

    let for_staff = store
        .list_complaints(
            ComplaintFilter {
                assignee: Some("staff-b".to_string()),
                ..ComplaintFilter::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(for_staff.pagination.total, 0);
}
