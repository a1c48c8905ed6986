//! Payload classification and sanitization
//!
//! Pure functions: one [`RawPayload`] in, one [`ClassifiedItem`] out. Nothing
//! here fails. A payload without a usable `type` tag becomes a skip marker;
//! a field that is absent becomes `None`; a field that is present but cannot
//! be coerced becomes `None` plus a [`CoercionWarning`].

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::{
    Classification, ClassifiedItem, CoercionWarning, Comment, ItemId, ItemKind, ItemRecord, Job,
    Poll, PollOption, SkipReason, Story,
};
use crate::upstream::RawPayload;

/// Classify one payload. The requested id is authoritative for every record
/// and marker produced.
pub fn classify(payload: &RawPayload) -> ClassifiedItem {
    let id = payload.id;

    let object = match &payload.body {
        Value::Object(object) => object,
        Value::Null => return skipped(id, SkipReason::NullPayload),
        _ => return skipped(id, SkipReason::NotAnObject),
    };

    let mut fields = FieldReader::new(object);
    fields.check_id(id);

    let deleted = fields.flag("deleted");
    let dead = fields.flag("dead");

    let classification = match object.get("type") {
        None | Some(Value::Null) => Classification::Skipped {
            reason: SkipReason::MissingType,
        },
        Some(Value::String(tag)) => match ItemKind::from_tag(tag) {
            ItemKind::Story => record(ItemRecord::Story(Story {
                id,
                title: fields.text("title"),
                by: fields.string("by"),
                descendants: fields.integer("descendants"),
                score: fields.integer("score"),
                time: fields.timestamp("time"),
                url: fields.string("url"),
            })),
            ItemKind::Job => record(ItemRecord::Job(Job {
                id,
                title: fields.text("title"),
                text: fields.text("text"),
                by: fields.string("by"),
                score: fields.integer("score"),
                time: fields.timestamp("time"),
                url: fields.string("url"),
            })),
            ItemKind::Comment => record(ItemRecord::Comment(Comment {
                id,
                text: fields.text("text"),
                by: fields.string("by"),
                time: fields.timestamp("time"),
                parent: fields.integer("parent"),
            })),
            ItemKind::Poll => record(ItemRecord::Poll(Poll {
                id,
                title: fields.text("title"),
                text: fields.text("text"),
                by: fields.string("by"),
                descendants: fields.integer("descendants"),
                score: fields.integer("score"),
                time: fields.timestamp("time"),
            })),
            ItemKind::PollOption => record(ItemRecord::PollOption(PollOption {
                id,
                text: fields.text("text"),
                by: fields.string("by"),
                poll: fields.integer("poll"),
                score: fields.integer("score"),
                time: fields.timestamp("time"),
            })),
            ItemKind::Unknown => Classification::Skipped {
                reason: SkipReason::UnknownType(tag.clone()),
            },
        },
        Some(other) => Classification::Skipped {
            reason: SkipReason::UnknownType(describe(other)),
        },
    };

    ClassifiedItem {
        id,
        classification,
        deleted,
        dead,
        warnings: fields.into_warnings(),
    }
}

/// HTML-unescape, then drop NUL bytes in both literal and `\x00` escaped form.
///
/// ```
/// use hnpipe_ingest::classify::sanitize_text;
///
/// assert_eq!(sanitize_text("Hi&amp;bye\x00"), "Hi&bye");
/// ```
pub fn sanitize_text(raw: &str) -> String {
    strip_nul(&html_escape::decode_html_entities(raw))
}

fn strip_nul(raw: &str) -> String {
    raw.replace("\\x00", "").replace('\0', "")
}

fn record(record: ItemRecord) -> Classification {
    Classification::Record { record }
}

fn skipped(id: ItemId, reason: SkipReason) -> ClassifiedItem {
    ClassifiedItem {
        id,
        classification: Classification::Skipped { reason },
        deleted: false,
        dead: false,
        warnings: Vec::new(),
    }
}

/// Extract-or-null field access over one JSON object
struct FieldReader<'a> {
    object: &'a Map<String, Value>,
    warnings: Vec<CoercionWarning>,
}

impl<'a> FieldReader<'a> {
    fn new(object: &'a Map<String, Value>) -> Self {
        Self {
            object,
            warnings: Vec::new(),
        }
    }

    fn into_warnings(self) -> Vec<CoercionWarning> {
        self.warnings
    }

    /// Absent and explicit `null` both read as "no value"
    fn present(&self, field: &str) -> Option<&'a Value> {
        self.object.get(field).filter(|v| !v.is_null())
    }

    fn warn(&mut self, field: &'static str, expected: &'static str, found: &Value) {
        self.warnings.push(CoercionWarning {
            field,
            expected,
            found: describe(found),
        });
    }

    /// Free text: HTML-unescaped and NUL-stripped
    fn text(&mut self, field: &'static str) -> Option<String> {
        self.string_with(field, sanitize_text)
    }

    /// Plain string: NUL-stripped only
    fn string(&mut self, field: &'static str) -> Option<String> {
        self.string_with(field, strip_nul)
    }

    fn string_with(&mut self, field: &'static str, clean: fn(&str) -> String) -> Option<String> {
        match self.present(field)? {
            Value::String(s) => Some(clean(s)),
            other => {
                self.warn(field, "string", other);
                None
            },
        }
    }

    fn integer(&mut self, field: &'static str) -> Option<i64> {
        let value = self.present(field)?;
        let coerced = coerce_integer(value);
        if coerced.is_none() {
            self.warn(field, "integer", value);
        }
        coerced
    }

    /// Epoch seconds to a UTC timestamp. Fractions are truncated; values
    /// outside what a TIMESTAMPTZ column holds are rejected.
    fn timestamp(&mut self, field: &'static str) -> Option<DateTime<Utc>> {
        let value = self.present(field)?;
        let coerced = coerce_epoch_seconds(value)
            .filter(|secs| (MIN_EPOCH_SECS..MAX_EPOCH_SECS).contains(secs))
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        if coerced.is_none() {
            self.warn(field, "epoch seconds", value);
        }
        coerced
    }

    /// Only a literal `true` sets a flag
    fn flag(&mut self, field: &'static str) -> bool {
        match self.present(field) {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                self.warn(field, "boolean", other);
                false
            },
        }
    }

    fn check_id(&mut self, requested: ItemId) {
        if let Some(value) = self.present("id") {
            if coerce_integer(value) != Some(requested) {
                self.warn("id", "requested id", value);
            }
        }
    }
}

/// Integers, integral floats and numeric strings
fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .filter(|f| *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 4714-11-24 00:00:00 BC, the earliest PostgreSQL timestamp
const MIN_EPOCH_SECS: i64 = -210_866_803_200;
/// 294277-01-01 00:00:00, one past the latest PostgreSQL timestamp
const MAX_EPOCH_SECS: i64 = 9_224_318_016_000;

/// Like [`coerce_integer`], but finite fractional values truncate toward zero
fn coerce_epoch_seconds(value: &Value) -> Option<i64> {
    let truncate = |f: f64| {
        Some(f.trunc())
            .filter(|t| t.is_finite() && *t >= i64::MIN as f64 && *t <= i64::MAX as f64)
            .map(|t| t as i64)
    };

    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
        Value::String(s) => {
            let s = s.trim();
            s.parse().ok().or_else(|| s.parse::<f64>().ok().and_then(truncate))
        },
        _ => None,
    }
}

fn describe(value: &Value) -> String {
    const MAX: usize = 40;
    let rendered = value.to_string();
    if rendered.chars().count() > MAX {
        let cut: String = rendered.chars().take(MAX).collect();
        format!("{cut}...")
    } else {
        rendered
    }
}
