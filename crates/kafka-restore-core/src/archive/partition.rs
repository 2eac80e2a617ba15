use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One calendar day of archived data for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatePartition {
    pub topic: String,
    pub date: NaiveDate,
}

impl DatePartition {
    pub fn new(topic: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            topic: topic.into(),
            date,
        }
    }

    /// Archive key prefix for this day, without a trailing slash.
    pub fn prefix(&self) -> String {
        format!(
            "{}/year={:04}/month={:02}/day={:02}",
            self.topic,
            self.date.year(),
            self.date.month(),
            self.date.day()
        )
    }

    /// Whether `key` lies under this partition's prefix.
    pub fn contains_key(&self, key: &str) -> bool {
        key.strip_prefix(&self.prefix())
            .is_some_and(|rest| rest.len() > 1 && rest.starts_with('/'))
    }
}

impl fmt::Display for DatePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.topic, self.date)
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Build a range. An inverted range is allowed and yields no days.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Number of days in the range.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start).num_days() as usize + 1
        }
    }

    /// Days from `start` to `end`, both included, stepping one day at a time.
    pub fn days(&self) -> Days {
        Days {
            next: (!self.is_empty()).then_some(self.start),
            end: self.end,
        }
    }

    /// Partitions of `topic` for every day in the range.
    pub fn partitions<'a>(&self, topic: &'a str) -> impl Iterator<Item = DatePartition> + 'a {
        self.days().map(move |date| DatePartition::new(topic, date))
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Iterator over the days of a [`DateRange`].
#[derive(Debug, Clone)]
pub struct Days {
    next: Option<NaiveDate>,
    end: NaiveDate,
}

impl Iterator for Days {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        self.next = current.succ_opt().filter(|next| *next <= self.end);
        Some(current)
    }
}
