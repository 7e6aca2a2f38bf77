//! Core domain model and classification rules for habrep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const CRATE_NAME: &str = "habrep-core";

pub const POLARITY_GOOD: &str = "good";
pub const POLARITY_BAD: &str = "bad";

/// Task record exactly as the tasks upstream serves it. Timestamps are epoch
/// seconds; upstream owns all identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    pub description: String,
    #[serde(rename = "dueDate")]
    pub due_date: i64,
    #[serde(rename = "completedDate")]
    pub completed_date: Option<i64>,
    #[serde(rename = "remind")]
    pub reminder: i64,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Habit record exactly as the habits upstream serves it. `polarity` is the
/// free-form `type` tag; only "good" and "bad" are recognized downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub title: String,
    pub difficulty: String,
    pub color: String,
    pub score: i64,
    #[serde(rename = "_id")]
    pub habit_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "type")]
    pub polarity: String,
}

/// Aggregate of one user's classified tasks and habits at a point in time.
///
/// `report_id` is absent until the store assigns one at insert and is
/// excluded from content equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReport {
    #[serde(rename = "reportID", default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<i64>,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "todayTasks")]
    pub today_tasks: Vec<Task>,
    #[serde(rename = "delayedTasks")]
    pub delayed_tasks: Vec<Task>,
    #[serde(rename = "goodHabits")]
    pub good_habits: Vec<Habit>,
    #[serde(rename = "badHabits")]
    pub bad_habits: Vec<Habit>,
}

/// The four report sequences in their stored JSON form, plus the content
/// fingerprint derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceBlobs {
    pub today_tasks: String,
    pub delayed_tasks: String,
    pub good_habits: String,
    pub bad_habits: String,
}

impl SequenceBlobs {
    /// SHA-256 hex digest over the user id and the four blobs. Two reports
    /// are content-equal iff their fingerprints match.
    pub fn fingerprint(&self, user_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        for blob in [
            &self.today_tasks,
            &self.delayed_tasks,
            &self.good_habits,
            &self.bad_habits,
        ] {
            // separator so adjacent blobs cannot alias across boundaries
            hasher.update([0u8]);
            hasher.update(blob.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl UserReport {
    pub fn new(
        user_id: impl Into<String>,
        today_tasks: Vec<Task>,
        delayed_tasks: Vec<Task>,
        good_habits: Vec<Habit>,
        bad_habits: Vec<Habit>,
    ) -> Self {
        Self {
            report_id: None,
            user_id: user_id.into(),
            today_tasks,
            delayed_tasks,
            good_habits,
            bad_habits,
        }
    }

    /// Equality over user id and the four sequences, element-wise and
    /// order-sensitive, ignoring `report_id`.
    pub fn content_eq(&self, other: &UserReport) -> bool {
        self.user_id == other.user_id
            && self.today_tasks == other.today_tasks
            && self.delayed_tasks == other.delayed_tasks
            && self.good_habits == other.good_habits
            && self.bad_habits == other.bad_habits
    }

    /// Serialize the four sequences the way the store persists them.
    pub fn sequence_blobs(&self) -> serde_json::Result<SequenceBlobs> {
        Ok(SequenceBlobs {
            today_tasks: serde_json::to_string(&self.today_tasks)?,
            delayed_tasks: serde_json::to_string(&self.delayed_tasks)?,
            good_habits: serde_json::to_string(&self.good_habits)?,
            bad_habits: serde_json::to_string(&self.bad_habits)?,
        })
    }

    /// Content fingerprint of this report; see [`SequenceBlobs::fingerprint`].
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        Ok(self.sequence_blobs()?.fingerprint(&self.user_id))
    }
}

/// Task buckets relative to a reference day. The three buckets partition the
/// input exactly and preserve its relative order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskBuckets {
    pub today: Vec<Task>,
    pub delayed: Vec<Task>,
    /// Due on a later calendar day; never enters a report.
    pub future: Vec<Task>,
}

/// Bucket tasks by comparing each due date against `reference`, calendar day
/// to calendar day in UTC. A task due at 23:59 of the reference day is
/// "today" just like one due at 00:01, regardless of elapsed duration.
pub fn classify_tasks_by_day(tasks: Vec<Task>, reference: DateTime<Utc>) -> TaskBuckets {
    let reference_day = reference.date_naive();
    let mut buckets = TaskBuckets::default();
    for task in tasks {
        match DateTime::<Utc>::from_timestamp(task.due_date, 0).map(|due| due.date_naive()) {
            Some(day) if day == reference_day => buckets.today.push(task),
            Some(day) if day < reference_day => buckets.delayed.push(task),
            Some(_) => buckets.future.push(task),
            // unrepresentable as a date; order on raw seconds so the task
            // still lands in exactly one bucket
            None if task.due_date < reference.timestamp() => buckets.delayed.push(task),
            None => buckets.future.push(task),
        }
    }
    buckets
}

/// Habit partition by declared polarity tag. Preserves input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HabitSplit {
    pub good: Vec<Habit>,
    pub bad: Vec<Habit>,
    /// Tag was neither "good" nor "bad". Callers decide whether to log or
    /// drop these; they never enter a report.
    pub unrecognized: Vec<Habit>,
}

pub fn classify_habits_by_polarity(habits: Vec<Habit>) -> HabitSplit {
    let mut split = HabitSplit::default();
    for habit in habits {
        match habit.polarity.as_str() {
            POLARITY_GOOD => split.good.push(habit),
            POLARITY_BAD => split.bad.push(habit),
            _ => split.unrecognized.push(habit),
        }
    }
    split
}
