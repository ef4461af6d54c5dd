//! Fixed sample dataset and test database helpers.
//!
//! [`dataset`] returns the hand-authored records used by
//! [`Seeder::seed_all`](crate::Seeder::seed_all). Every date is expressed
//! relative to an anchor instant so the dataset is reproducible in tests.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use deskstore_core::{CoreResult, Database, Schema};
use deskstore_storage::{FileBackend, FileOptions, StorageError};
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;

/// The seven dashboard collections, in seeding order.
pub const COLLECTIONS: [&str; 7] = [
    "users",
    "tasks",
    "customers",
    "projects",
    "notifications",
    "settings",
    "auditLogs",
];

/// Formats an instant the way stored records carry dates.
#[must_use]
pub fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// The fixed dataset, per collection, in [`COLLECTIONS`] order.
#[must_use]
pub fn dataset(anchor: DateTime<Utc>) -> Vec<(&'static str, Vec<Value>)> {
    let at = |offset: Duration| timestamp(anchor + offset);
    let week_ago = at(-Duration::days(7));
    let month_ago = at(-Duration::days(30));

    let users = vec![
        json!({
            "id": 1, "name": "Zhang Wei", "email": "zhang.manager@company.com",
            "department": "Sales", "role": "manager", "avatar": "", "status": "active",
            "createdAt": month_ago, "lastLogin": at(Duration::zero()),
        }),
        json!({
            "id": 2, "name": "Li Na", "email": "li.director@company.com",
            "department": "Engineering", "role": "director", "avatar": "", "status": "active",
            "createdAt": month_ago, "lastLogin": at(-Duration::hours(2)),
        }),
        json!({
            "id": 3, "name": "Wang Fang", "email": "wang.designer@company.com",
            "department": "Design", "role": "designer", "avatar": "", "status": "active",
            "createdAt": month_ago, "lastLogin": at(-Duration::minutes(30)),
        }),
        json!({
            "id": 4, "name": "Chen Jie", "email": "chen.developer@company.com",
            "department": "Engineering", "role": "developer", "avatar": "", "status": "active",
            "createdAt": month_ago, "lastLogin": at(-Duration::hours(1)),
        }),
        json!({
            "id": 5, "name": "Zhao Lei", "email": "zhao.product@company.com",
            "department": "Product", "role": "product_manager", "avatar": "", "status": "active",
            "createdAt": month_ago, "lastLogin": at(-Duration::minutes(15)),
        }),
    ];

    let tasks = vec![
        json!({
            "id": 1, "title": "Design the new user interface",
            "description": "Home, list and detail pages for the next release",
            "assigneeId": 3, "assigneeName": "Wang Fang",
            "status": "in_progress", "priority": "high",
            "dueDate": at(Duration::days(3)), "createdAt": week_ago,
            "updatedAt": at(-Duration::hours(2)), "projectId": 1,
            "tags": ["design", "UI", "user experience"],
        }),
        json!({
            "id": 2, "title": "Build the user management API",
            "description": "Endpoints for creating, updating and listing users",
            "assigneeId": 4, "assigneeName": "Chen Jie",
            "status": "completed", "priority": "medium",
            "dueDate": at(Duration::days(1)), "createdAt": week_ago,
            "updatedAt": at(-Duration::days(1)), "projectId": 1,
            "tags": ["development", "API", "backend"],
        }),
        json!({
            "id": 3, "title": "Customer requirements research",
            "description": "Collect and analyse customer feedback on new features",
            "assigneeId": 5, "assigneeName": "Zhao Lei",
            "status": "pending", "priority": "high",
            "dueDate": at(Duration::days(5)), "createdAt": at(-Duration::days(2)),
            "updatedAt": at(-Duration::days(2)), "projectId": 2,
            "tags": ["research", "requirements", "customers"],
        }),
        json!({
            "id": 4, "title": "System performance tuning",
            "description": "Improve response times and database query performance",
            "assigneeId": 2, "assigneeName": "Li Na",
            "status": "in_progress", "priority": "medium",
            "dueDate": at(Duration::days(7)), "createdAt": at(-Duration::days(3)),
            "updatedAt": at(-Duration::hours(1)), "projectId": 1,
            "tags": ["optimization", "performance", "engineering"],
        }),
    ];

    let customers = vec![
        json!({
            "id": 1, "name": "Beijing Technology Co.", "email": "contact@beijing-tech.com",
            "phone": "010-12345678", "address": "Chaoyang Science Park, Beijing",
            "status": "active", "type": "enterprise", "industry": "Technology",
            "revenue": 5_000_000, "createdAt": month_ago,
            "lastContact": at(-Duration::days(3)), "assignedTo": 1,
            "notes": "Key account, annual partner",
        }),
        json!({
            "id": 2, "name": "Shanghai Manufacturing Group", "email": "info@shanghai-mfg.com",
            "phone": "021-87654321", "address": "Pudong Industrial Park, Shanghai",
            "status": "potential", "type": "enterprise", "industry": "Manufacturing",
            "revenue": 8_000_000, "createdAt": at(-Duration::weeks(2)),
            "lastContact": at(-Duration::days(1)), "assignedTo": 1,
            "notes": "In negotiation, strong potential",
        }),
        json!({
            "id": 3, "name": "Shenzhen Innovation Ltd.", "email": "hello@shenzhen-innovation.com",
            "phone": "0755-11223344", "address": "Nanshan High-Tech Park, Shenzhen",
            "status": "active", "type": "startup", "industry": "Internet",
            "revenue": 2_000_000, "createdAt": at(-Duration::weeks(3)),
            "lastContact": at(-Duration::days(2)), "assignedTo": 1,
            "notes": "Young team, growing fast",
        }),
    ];

    let projects = vec![
        json!({
            "id": 1, "name": "Enterprise system upgrade",
            "description": "Upgrade the management system with new features and a better UX",
            "status": "active", "priority": "high", "managerId": 2, "managerName": "Li Na",
            "startDate": month_ago, "endDate": at(Duration::days(60)),
            "budget": 500_000, "progress": 65, "teamMembers": [2, 3, 4, 5],
            "createdAt": month_ago, "updatedAt": at(-Duration::hours(1)),
        }),
        json!({
            "id": 2, "name": "Customer relationship management",
            "description": "A new CRM to improve sales efficiency",
            "status": "planning", "priority": "medium", "managerId": 1, "managerName": "Zhang Wei",
            "startDate": at(Duration::days(7)), "endDate": at(Duration::days(90)),
            "budget": 300_000, "progress": 10, "teamMembers": [1, 5],
            "createdAt": week_ago, "updatedAt": week_ago,
        }),
    ];

    let notifications = vec![
        json!({
            "id": 1, "userId": 3, "title": "New task assigned",
            "content": "You were assigned: Design the new user interface",
            "type": "task", "priority": "medium", "isRead": false,
            "timestamp": at(-Duration::hours(2)), "actionUrl": "/tasks/1",
        }),
        json!({
            "id": 2, "userId": 4, "title": "Task due soon",
            "content": "Task 'Build the user management API' is due tomorrow",
            "type": "reminder", "priority": "high", "isRead": true,
            "timestamp": at(-Duration::hours(4)), "actionUrl": "/tasks/2",
        }),
        json!({
            "id": 3, "userId": 1, "title": "Customer follow-up",
            "content": "Follow up with Beijing Technology Co.",
            "type": "customer", "priority": "medium", "isRead": false,
            "timestamp": at(-Duration::hours(6)), "actionUrl": "/customers/1",
        }),
    ];

    let settings = vec![
        json!({
            "key": "theme", "value": "light", "category": "appearance",
            "description": "Color theme", "updatedAt": week_ago,
        }),
        json!({
            "key": "language", "value": "en-US", "category": "localization",
            "description": "Interface language", "updatedAt": week_ago,
        }),
        json!({
            "key": "notifications_enabled", "value": true, "category": "notifications",
            "description": "Whether notifications are shown", "updatedAt": week_ago,
        }),
        json!({
            "key": "auto_save_interval", "value": 30, "category": "system",
            "description": "Auto-save interval in seconds", "updatedAt": week_ago,
        }),
        json!({
            "key": "items_per_page", "value": 20, "category": "display",
            "description": "Rows shown per page", "updatedAt": week_ago,
        }),
    ];

    let audit_logs = vec![
        json!({
            "id": 1, "userId": 1, "userName": "Zhang Wei", "action": "create",
            "resource": "customer", "resourceId": "3",
            "details": "Created customer: Shenzhen Innovation Ltd.",
            "timestamp": at(-Duration::weeks(3)), "ipAddress": "192.168.1.100",
            "userAgent": "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
        }),
        json!({
            "id": 2, "userId": 3, "userName": "Wang Fang", "action": "update",
            "resource": "task", "resourceId": "1",
            "details": "Moved task to in progress",
            "timestamp": at(-Duration::hours(2)), "ipAddress": "192.168.1.101",
            "userAgent": "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36",
        }),
        json!({
            "id": 3, "userId": 4, "userName": "Chen Jie", "action": "complete",
            "resource": "task", "resourceId": "2",
            "details": "Completed task: Build the user management API",
            "timestamp": at(-Duration::days(1)), "ipAddress": "192.168.1.102",
            "userAgent": "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36",
        }),
        json!({
            "id": 4, "userId": 2, "userName": "Li Na", "action": "login",
            "resource": "system", "resourceId": null,
            "details": "Signed in",
            "timestamp": at(-Duration::hours(2)), "ipAddress": "192.168.1.103",
            "userAgent": "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
        }),
    ];

    vec![
        ("users", users),
        ("tasks", tasks),
        ("customers", customers),
        ("projects", projects),
        ("notifications", notifications),
        ("settings", settings),
        ("auditLogs", audit_logs),
    ]
}

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates an open in-memory database with the enterprise schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn memory() -> CoreResult<Self> {
        Ok(Self {
            db: Database::open_in_memory(Schema::enterprise())?,
            _temp_dir: None,
        })
    }

    /// Creates an open file-backed database in a temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened.
    pub fn file() -> CoreResult<Self> {
        let temp_dir = TempDir::new().map_err(StorageError::from)?;
        let backend = FileBackend::new(temp_dir.path(), FileOptions::new().sync_on_commit(false));
        let db = Database::new(Schema::enterprise(), backend);
        db.open()?;
        Ok(Self {
            db,
            _temp_dir: Some(temp_dir),
        })
    }

    /// Returns the database directory if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs `f` with a fresh in-memory database.
///
/// # Errors
///
/// Returns an error if the database cannot be opened.
pub fn with_temp_db<F, R>(f: F) -> CoreResult<R>
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory()?;
    Ok(f(&test_db.db))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn dataset_counts() {
        let anchor = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let counts: Vec<_> = dataset(anchor)
            .iter()
            .map(|(name, records)| (*name, records.len()))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("users", 5),
                ("tasks", 4),
                ("customers", 3),
                ("projects", 2),
                ("notifications", 3),
                ("settings", 5),
                ("auditLogs", 4),
            ]
        );
    }

    #[test]
    fn dates_follow_anchor() {
        let anchor = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let data = dataset(anchor);
        let users = &data[0].1;
        assert_eq!(users[0]["lastLogin"], "2024-06-01T09:00:00.000Z");
        assert_eq!(users[0]["createdAt"], "2024-05-02T09:00:00.000Z");
    }

    #[test]
    fn file_database_has_path() {
        let db = TestDatabase::file().unwrap();
        assert!(db.path().is_some_and(Path::exists));
        assert!(db.is_open());
        assert!(TestDatabase::memory().unwrap().path().is_none());
    }
}
