//! Sample data for development and demos.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use redress_common::credentials::PasswordHasher;
use redress_common::lifecycle::{apply_status_change, assign};
use redress_common::model::PageRequest;
use redress_common::store::UserFilter;
use redress_common::validation::ComplaintDraft;
use redress_common::{Category, Complaint, Priority, Role, Status, Store, User};
use tracing::info;

struct SampleUser {
    name: &'static str,
    email: &'static str,
    password: &'static str,
    role: Role,
    department: Option<&'static str>,
}

const SAMPLE_USERS: &[SampleUser] = &[
    SampleUser {
        name: "Admin User",
        email: "admin@example.com",
        password: "Admin@123",
        role: Role::Admin,
        department: None,
    },
    SampleUser {
        name: "Staff Member",
        email: "staff@example.com",
        password: "Staff@123",
        role: Role::Staff,
        department: Some("IT"),
    },
    SampleUser {
        name: "John Doe",
        email: "john@example.com",
        password: "User@123",
        role: Role::User,
        department: None,
    },
    SampleUser {
        name: "Jane Smith",
        email: "jane@example.com",
        password: "User@123",
        role: Role::User,
        department: None,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub complaints: usize,
}

fn draft(title: &str, category: Category, description: &str, priority: Priority) -> ComplaintDraft {
    ComplaintDraft {
        title: title.to_string(),
        category,
        description: description.to_string(),
        priority,
        attachments: Vec::new(),
    }
}

/// The three sample complaints, all filed by `author`
fn sample_complaints(author: &str, staff: &str, now: DateTime<Utc>) -> Vec<Complaint> {
    let wifi = Complaint::file(
        author,
        draft(
            "Wi-Fi not working in Library",
            Category::It,
            "The wireless network connection keeps dropping in the central library. This has been happening for the past 3 days and is affecting my research work.",
            Priority::High,
        ),
        now - Duration::days(3),
    );

    let chairs_filed = now - Duration::days(5);
    let chairs = Complaint::file(
        author,
        draft(
            "Broken chairs in classroom 301",
            Category::Infrastructure,
            "Multiple chairs in classroom 301 are broken and need immediate replacement. This is causing inconvenience during lectures.",
            Priority::Medium,
        ),
        chairs_filed,
    );
    let chairs = assign(&chairs, staff, chairs_filed + Duration::hours(2));
    let chairs = apply_status_change(
        &chairs,
        Status::InProgress,
        "Assigned to maintenance team",
        staff,
        chairs_filed + Duration::hours(2),
    );

    let ac_filed = now - Duration::days(4);
    let ac = Complaint::file(
        author,
        draft(
            "AC not cooling in Hostel Room 205",
            Category::Hostel,
            "The air conditioning unit in hostel room 205 is not cooling properly. It makes loud noises but does not reduce the temperature.",
            Priority::Medium,
        ),
        ac_filed,
    );
    let ac = assign(&ac, staff, ac_filed + Duration::hours(1));
    let ac = apply_status_change(
        &ac,
        Status::InProgress,
        "Technician assigned",
        staff,
        ac_filed + Duration::hours(1),
    );
    let ac = apply_status_change(
        &ac,
        Status::Resolved,
        "AC serviced and refrigerant refilled. Working properly now.",
        staff,
        now - Duration::days(2),
    );

    vec![wifi, chairs, ac]
}

/// Load the sample accounts and complaints.
///
/// Refuses to touch a database that already has accounts unless `force` is
/// set, in which case everything is wiped first.
pub async fn seed(store: &Store, hasher: PasswordHasher, force: bool) -> Result<SeedReport> {
    let existing = store
        .list_users(UserFilter::default(), PageRequest::new(Some(1), Some(1)))
        .await?
        .pagination
        .total;
    if existing > 0 {
        if !force {
            bail!(
                "database already holds {} accounts; rerun with --force to replace them",
                existing
            );
        }
        store.clear().await?;
    }

    let now = redress_common::now();
    let mut created = Vec::with_capacity(SAMPLE_USERS.len());
    for sample in SAMPLE_USERS {
        let password = sample.password;
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(password)).await??;
        let user = User::new(
            sample.name.to_string(),
            sample.email.to_string(),
            password_hash,
            sample.role,
            sample.department.map(str::to_string),
            now,
        );
        created.push(store.insert_user(user).await?);
    }
    info!("Created {} users", created.len());

    let author = created.iter().find(|u| u.role == Role::User);
    let staff = created.iter().find(|u| u.role == Role::Staff);
    let mut complaints = 0;
    if let (Some(author), Some(staff)) = (author, staff) {
        for complaint in sample_complaints(&author.id, &staff.id, now) {
            store.insert_complaint(complaint).await?;
            complaints += 1;
        }
    }
    info!("Created {} complaints", complaints);

    Ok(SeedReport {
        users: created.len(),
        complaints,
    })
}
