//! Random record generators.
//!
//! [`random_task`] draws synthetic task records from fixed value sets; it is
//! what [`Seeder::generate_random_data`](crate::Seeder::generate_random_data)
//! inserts. The proptest strategies below generate records for property
//! tests.

use crate::fixtures::timestamp;
use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Map, Value};

/// Task statuses drawn by the generators.
pub const STATUSES: [&str; 4] = ["pending", "in_progress", "completed", "cancelled"];
/// Task priorities drawn by the generators.
pub const PRIORITIES: [&str; 4] = ["low", "medium", "high", "urgent"];
/// Tag pool; each generated task takes a non-empty prefix.
pub const TAGS: [&str; 3] = ["tag1", "tag2", "tag3"];

const USERS: i64 = 5;
const PROJECTS: i64 = 2;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Generates the `index`-th random task relative to `anchor`.
///
/// - `assigneeId` in 1..=5, `projectId` in 1..=2
/// - `dueDate` within 30 days after the anchor
/// - `createdAt` within 30 days before, `updatedAt` within one day before
/// - one to three tags
pub fn random_task<R: Rng + ?Sized>(rng: &mut R, index: usize, anchor: DateTime<Utc>) -> Value {
    let number = index + 1;
    let offset = |rng: &mut R, days: i64| Duration::milliseconds(rng.gen_range(0..days * DAY_MS));

    let status = STATUSES.choose(rng).copied().unwrap_or(STATUSES[0]);
    let priority = PRIORITIES.choose(rng).copied().unwrap_or(PRIORITIES[0]);
    let assignee = rng.gen_range(1..=USERS);
    let assignee_name = format!("User {}", rng.gen_range(1..=USERS));
    let due = anchor + offset(rng, 30);
    let created = anchor - offset(rng, 30);
    let updated = anchor - offset(rng, 1);
    let project = rng.gen_range(1..=PROJECTS);
    let tags = &TAGS[..rng.gen_range(1..=TAGS.len())];

    json!({
        "title": format!("Random task {number}"),
        "description": format!("Randomly generated task number {number}"),
        "assigneeId": assignee,
        "assigneeName": assignee_name,
        "status": status,
        "priority": priority,
        "dueDate": timestamp(due),
        "createdAt": timestamp(created),
        "updatedAt": timestamp(updated),
        "projectId": project,
        "tags": tags,
    })
}

/// Strategy for scalar JSON field values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 _-]{0,24}".prop_map(Value::from),
    ]
}

/// Strategy for flat record objects without a primary key.
pub fn record_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z][a-zA-Z]{0,11}", scalar_strategy(), 0..8)
        .prop_map(|fields| {
            let mut object: Map<String, Value> = fields.into_iter().collect();
            object.remove("id");
            object.remove("key");
            Value::Object(object)
        })
}

/// Strategy for settings records with a caller-supplied string key.
pub fn setting_strategy() -> impl Strategy<Value = Value> {
    (
        "[a-z][a-z_]{0,15}",
        prop::sample::select(vec!["appearance", "system", "display", "localization"]),
        scalar_strategy(),
    )
        .prop_map(|(key, category, value)| {
            json!({"key": key, "category": category, "value": value})
        })
}

/// Strategy for task records in the shape [`random_task`] produces.
pub fn task_strategy() -> impl Strategy<Value = Value> {
    (
        prop::sample::select(STATUSES.to_vec()),
        prop::sample::select(PRIORITIES.to_vec()),
        1..=USERS,
        "[A-Za-z ]{1,32}",
    )
        .prop_map(|(status, priority, assignee, title)| {
            json!({
                "title": title,
                "status": status,
                "priority": priority,
                "assigneeId": assignee,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn parse(value: &Value) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value.as_str().unwrap())
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn same_seed_same_tasks() {
        let a = random_task(&mut StdRng::seed_from_u64(7), 0, anchor());
        let b = random_task(&mut StdRng::seed_from_u64(7), 0, anchor());
        assert_eq!(a, b);
        assert_eq!(a["title"], "Random task 1");
    }

    #[test]
    fn values_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for i in 0..200 {
            let task = random_task(&mut rng, i, anchor());
            assert!(STATUSES.contains(&task["status"].as_str().unwrap()));
            assert!(PRIORITIES.contains(&task["priority"].as_str().unwrap()));
            assert!((1..=5).contains(&task["assigneeId"].as_i64().unwrap()));
            assert!((1..=2).contains(&task["projectId"].as_i64().unwrap()));

            let tags = task["tags"].as_array().unwrap();
            assert!((1..=3).contains(&tags.len()));
            assert_eq!(tags[0], "tag1");

            let due = parse(&task["dueDate"]);
            assert!(due >= anchor() && due < anchor() + Duration::days(30));
            let created = parse(&task["createdAt"]);
            assert!(created <= anchor() && created > anchor() - Duration::days(30));
            let updated = parse(&task["updatedAt"]);
            assert!(updated <= anchor() && updated > anchor() - Duration::days(1));
        }
    }

    proptest! {
        #[test]
        fn records_never_carry_keys(record in record_strategy()) {
            prop_assert!(record.get("id").is_none());
            prop_assert!(record.get("key").is_none());
        }
    }
}
