//! Item data model
//!
//! Typed records for the five item kinds, the per-id markers (watermark,
//! deleted, dead, skipped) and [`CycleBatch`], the immutable value a cycle's
//! transform step hands to the loader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream item identifier
pub type ItemId = i64;

// ============================================================================
// Kinds
// ============================================================================

/// Classification of an item by its `type` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Story,
    Job,
    Comment,
    Poll,
    PollOption,
    /// Tag present but not one of the known kinds
    Unknown,
}

impl ItemKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "story" => ItemKind::Story,
            "job" => ItemKind::Job,
            "comment" => ItemKind::Comment,
            "poll" => ItemKind::Poll,
            "pollopt" => ItemKind::PollOption,
            _ => ItemKind::Unknown,
        }
    }

    /// Upstream tag for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Story => "story",
            ItemKind::Job => "job",
            ItemKind::Comment => "comment",
            ItemKind::Poll => "poll",
            ItemKind::PollOption => "pollopt",
            ItemKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Kind records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: ItemId,
    pub title: Option<String>,
    pub by: Option<String>,
    pub descendants: Option<i64>,
    pub score: Option<i64>,
    pub time: Option<DateTime<Utc>>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: ItemId,
    pub title: Option<String>,
    pub text: Option<String>,
    pub by: Option<String>,
    pub score: Option<i64>,
    pub time: Option<DateTime<Utc>>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: ItemId,
    pub text: Option<String>,
    pub by: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub parent: Option<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: ItemId,
    pub title: Option<String>,
    pub text: Option<String>,
    pub by: Option<String>,
    pub descendants: Option<i64>,
    pub score: Option<i64>,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: ItemId,
    pub text: Option<String>,
    pub by: Option<String>,
    /// Parent poll id
    pub poll: Option<ItemId>,
    pub score: Option<i64>,
    pub time: Option<DateTime<Utc>>,
}

/// A successfully classified item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemRecord {
    Story(Story),
    Job(Job),
    Comment(Comment),
    Poll(Poll),
    PollOption(PollOption),
}

impl ItemRecord {
    pub fn id(&self) -> ItemId {
        match self {
            ItemRecord::Story(r) => r.id,
            ItemRecord::Job(r) => r.id,
            ItemRecord::Comment(r) => r.id,
            ItemRecord::Poll(r) => r.id,
            ItemRecord::PollOption(r) => r.id,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            ItemRecord::Story(_) => ItemKind::Story,
            ItemRecord::Job(_) => ItemKind::Job,
            ItemRecord::Comment(_) => ItemKind::Comment,
            ItemRecord::Poll(_) => ItemKind::Poll,
            ItemRecord::PollOption(_) => ItemKind::PollOption,
        }
    }
}

// ============================================================================
// Classification outcome
// ============================================================================

/// Why a payload could not be classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Upstream answered `null` for the id
    NullPayload,
    /// Payload is JSON but not an object
    NotAnObject,
    MissingType,
    UnknownType(String),
}

/// A field that was present but could not be coerced; stored as null
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoercionWarning {
    pub field: &'static str,
    pub expected: &'static str,
    /// Short rendering of the offending JSON value
    pub found: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Classification {
    Record { record: ItemRecord },
    Skipped { reason: SkipReason },
}

/// Everything the classifier derives from one payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedItem {
    pub id: ItemId,
    pub classification: Classification,
    pub deleted: bool,
    pub dead: bool,
    pub warnings: Vec<CoercionWarning>,
}

// ============================================================================
// Ranges and batches
// ============================================================================

/// Inclusive id range covered by one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub start: ItemId,
    pub end: ItemId,
}

impl IdRange {
    /// Next range after `cursor`: at most `batch_size` ids, never past `max_id`.
    /// `None` once the cursor has caught up.
    pub fn next(cursor: ItemId, max_id: ItemId, batch_size: usize) -> Option<Self> {
        if cursor >= max_id || batch_size == 0 {
            return None;
        }

        let batch = ItemId::try_from(batch_size).unwrap_or(ItemId::MAX);
        let start = cursor + 1;
        let end = start.saturating_add(batch - 1).min(max_id);

        Some(Self { start, end })
    }

    pub fn len(&self) -> usize {
        usize::try_from(self.end - self.start + 1).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn ids(&self) -> std::ops::RangeInclusive<ItemId> {
        self.start..=self.end
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// One row of the append-only watermark log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkEntry {
    pub id: ItemId,
    pub processed_at: DateTime<Utc>,
}

/// Row counts derived from a [`CycleBatch`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub watermarks: usize,
    pub stories: usize,
    pub jobs: usize,
    pub comments: usize,
    pub polls: usize,
    pub poll_options: usize,
    pub deleted: usize,
    pub dead: usize,
    pub skipped: usize,
    pub coercion_warnings: usize,
}

impl BatchStats {
    pub fn records(&self) -> usize {
        self.stories + self.jobs + self.comments + self.polls + self.poll_options
    }
}

/// Everything one cycle writes, grouped by target table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleBatch {
    pub range: IdRange,
    pub watermarks: Vec<WatermarkEntry>,
    pub stories: Vec<Story>,
    pub jobs: Vec<Job>,
    pub comments: Vec<Comment>,
    pub polls: Vec<Poll>,
    pub poll_options: Vec<PollOption>,
    pub deleted: Vec<ItemId>,
    pub dead: Vec<ItemId>,
    pub skipped: Vec<ItemId>,
    pub coercion_warnings: usize,
}

impl CycleBatch {
    /// Group classified items by table. Every item gets a watermark entry
    /// stamped with `processed_at`, whatever its classification.
    pub fn from_classified(
        range: IdRange,
        items: impl IntoIterator<Item = ClassifiedItem>,
        processed_at: DateTime<Utc>,
    ) -> Self {
        let mut batch = Self {
            range,
            watermarks: Vec::with_capacity(range.len()),
            stories: Vec::new(),
            jobs: Vec::new(),
            comments: Vec::new(),
            polls: Vec::new(),
            poll_options: Vec::new(),
            deleted: Vec::new(),
            dead: Vec::new(),
            skipped: Vec::new(),
            coercion_warnings: 0,
        };

        for item in items {
            batch.watermarks.push(WatermarkEntry {
                id: item.id,
                processed_at,
            });

            if item.deleted {
                batch.deleted.push(item.id);
            }
            if item.dead {
                batch.dead.push(item.id);
            }
            batch.coercion_warnings += item.warnings.len();

            match item.classification {
                Classification::Record { record } => match record {
                    ItemRecord::Story(r) => batch.stories.push(r),
                    ItemRecord::Job(r) => batch.jobs.push(r),
                    ItemRecord::Comment(r) => batch.comments.push(r),
                    ItemRecord::Poll(r) => batch.polls.push(r),
                    ItemRecord::PollOption(r) => batch.poll_options.push(r),
                },
                Classification::Skipped { .. } => batch.skipped.push(item.id),
            }
        }

        batch
    }

    pub fn stats(&self) -> BatchStats {
        BatchStats {
            watermarks: self.watermarks.len(),
            stories: self.stories.len(),
            jobs: self.jobs.len(),
            comments: self.comments.len(),
            polls: self.polls.len(),
            poll_options: self.poll_options.len(),
            deleted: self.deleted.len(),
            dead: self.dead.len(),
            skipped: self.skipped.len(),
            coercion_warnings: self.coercion_warnings,
        }
    }

    /// True when the watermark ids are exactly the ids of `range`
    pub fn covers_range(&self) -> bool {
        let mut ids: Vec<ItemId> = self.watermarks.iter().map(|w| w.id).collect();
        ids.sort_unstable();
        ids.into_iter().eq(self.range.ids())
    }
}
