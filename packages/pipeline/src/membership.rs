//! Membership export preparation.
//!
//! Parses membership rows into tags and activity flags, counts active and
//! all-time members per address key, and attaches those counts to joined
//! building rows.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use building_map_address::{address_key, parse_number};
use building_map_pipeline_models::{MembershipProjection, TagCount, YearCount};
use building_map_table::Table;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use regex::Regex;

use crate::join::JoinedBuildingRow;

/// Days within which an update counts as recent activity.
pub const RECENT_ACTIVITY_DAYS: i64 = 365;

/// Years listed in the membership year filter.
const YEAR_FILTER_LIMIT: usize = 8;

/// Tags listed in the tag filter.
const TOP_TAG_LIMIT: usize = 12;

static MEMBERSHIP_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)membership-(\d{4})").expect("valid regex"));

/// Naive timestamp formats accepted for `updated_at`, read as UTC.
const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// One prepared membership row.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipRecord {
    /// Address key.
    pub key: String,
    /// Tags in export order.
    pub tags: Vec<String>,
    /// Whether a tag equals `member` (case-insensitive).
    pub has_member_tag: bool,
    /// Latest `membership-YYYY` year.
    pub latest_membership_year: Option<i32>,
    /// Parsed update timestamp.
    pub updated_at: Option<DateTime<Utc>>,
    /// Whether `updated_at` falls within [`RECENT_ACTIVITY_DAYS`].
    pub updated_recently: bool,
    /// Whether the row counts as an active member.
    pub is_active_default: bool,
    /// Value of the member-count column, when one exists.
    pub member_count: Option<f64>,
}

impl MembershipRecord {
    /// The payload entry stored on map points.
    #[must_use]
    pub fn projection(&self) -> MembershipProjection {
        MembershipProjection {
            tags: self.tags.clone(),
            updated_at: self
                .updated_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            has_member_tag: self.has_member_tag,
            latest_membership_year: self.latest_membership_year,
            is_active_default: self.is_active_default,
        }
    }
}

/// Prepared membership export.
#[derive(Debug, Clone, Default)]
pub struct Membership {
    /// Rows in export order.
    pub records: Vec<MembershipRecord>,
    /// Numeric member-count column, if the export has one.
    pub count_column: Option<String>,
}

/// Splits a comma-separated tag list, dropping blanks.
#[must_use]
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Latest year among `membership-YYYY` tags.
#[must_use]
pub fn latest_membership_year(tags: &[String]) -> Option<i32> {
    tags.iter()
        .flat_map(|tag| MEMBERSHIP_YEAR_RE.captures_iter(tag))
        .filter_map(|caps| caps[1].parse::<i32>().ok())
        .max()
}

/// Best-effort ISO 8601 timestamp parsing. Seconds are optional, the date
/// and time may be split by `T` or a space, and naive values (including a
/// trailing `Z`) are taken as UTC.
#[must_use]
pub fn parse_updated_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let raw = raw.strip_suffix(['Z', 'z']).unwrap_or(raw);
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Finds a member-count column: the first whose name contains `member` and
/// either contains `count` or ends in `s`, with only numeric cells.
fn find_count_column(table: &Table) -> Option<usize> {
    table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| {
            name.contains("member") && (name.contains("count") || name.ends_with('s'))
        })
        .map(|(index, _)| index)
        .find(|index| {
            table
                .rows()
                .filter_map(|row| row.at(Some(*index)))
                .all(|cell| parse_number(Some(cell)).is_some())
        })
}

/// Prepares every membership row relative to `now`.
#[must_use]
pub fn prepare_membership(table: &Table, now: DateTime<Utc>) -> Membership {
    let address_col = table
        .find_column(|name| name.contains("address"))
        .or_else(|| (!table.columns().is_empty()).then_some(0));
    let tags_col = table.column_index("tag_list");
    let updated_col = table.column_index("updated_at");
    let count_col = find_count_column(table);
    let window = TimeDelta::days(RECENT_ACTIVITY_DAYS);
    let current_year = now.year();

    let records = table
        .rows()
        .map(|row| {
            let tags = parse_tags(row.at(tags_col));
            let has_member_tag = tags.iter().any(|tag| tag.eq_ignore_ascii_case("member"));
            let latest_membership_year = latest_membership_year(&tags);
            let updated_at = row.at(updated_col).and_then(parse_updated_at);
            let updated_recently =
                updated_at.is_some_and(|t| now.signed_duration_since(t) <= window);
            let is_active_default = has_member_tag
                && (latest_membership_year.is_none_or(|year| year >= current_year - 1)
                    || updated_recently);

            MembershipRecord {
                key: address_key(row.at(address_col).unwrap_or_default()),
                tags,
                has_member_tag,
                latest_membership_year,
                updated_at,
                updated_recently,
                is_active_default,
                member_count: count_col.and_then(|index| parse_number(row.at(Some(index)))),
            }
        })
        .collect::<Vec<_>>();

    let count_column = count_col.map(|index| table.columns()[index].clone());
    if let Some(name) = &count_column {
        log::debug!("Summing member counts from '{name}'");
    }

    Membership {
        records,
        count_column,
    }
}

impl Membership {
    /// Member count per address key.
    ///
    /// Sums the member-count column when present, else counts rows. Rows
    /// with an empty key are skipped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn counts(&self, active_only: bool) -> BTreeMap<String, u32> {
        let mut sums: BTreeMap<String, f64> = BTreeMap::new();
        for record in &self.records {
            if record.key.is_empty() || (active_only && !record.is_active_default) {
                continue;
            }
            let value = if self.count_column.is_some() {
                record.member_count.unwrap_or(0.0)
            } else {
                1.0
            };
            *sums.entry(record.key.clone()).or_insert(0.0) += value;
        }

        sums.into_iter()
            .map(|(key, sum)| (key, sum.max(0.0).trunc() as u32))
            .collect()
    }

    /// Payload entries per address key, in export order.
    #[must_use]
    pub fn payloads(&self) -> BTreeMap<String, Vec<MembershipProjection>> {
        let mut payloads: BTreeMap<String, Vec<MembershipProjection>> = BTreeMap::new();
        for record in self.records.iter().filter(|r| !r.key.is_empty()) {
            payloads
                .entry(record.key.clone())
                .or_default()
                .push(record.projection());
        }
        payloads
    }

    /// The most recent membership years, newest first.
    #[must_use]
    pub fn year_counts(&self) -> Vec<YearCount> {
        let mut counts: BTreeMap<i32, u64> = BTreeMap::new();
        for year in self.records.iter().filter_map(|r| r.latest_membership_year) {
            *counts.entry(year).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .rev()
            .take(YEAR_FILTER_LIMIT)
            .map(|(year, count)| YearCount { year, count })
            .collect()
    }

    /// The most common tags mentioning `member`; ties keep first-seen order.
    #[must_use]
    pub fn top_tags(&self) -> Vec<TagCount> {
        let mut counts: Vec<TagCount> = Vec::new();
        let mut positions: BTreeMap<&str, usize> = BTreeMap::new();
        for tag in self.records.iter().flat_map(|r| &r.tags) {
            if !tag.to_lowercase().contains("member") {
                continue;
            }
            if let Some(&position) = positions.get(tag.as_str()) {
                counts[position].count += 1;
            } else {
                positions.insert(tag, counts.len());
                counts.push(TagCount {
                    name: tag.clone(),
                    count: 1,
                });
            }
        }

        counts.sort_by(|a, b| b.count.cmp(&a.count));
        counts.truncate(TOP_TAG_LIMIT);
        counts
    }

    /// Earliest and latest membership year seen.
    #[must_use]
    pub fn year_range(&self) -> (Option<i32>, Option<i32>) {
        let years = self.records.iter().filter_map(|r| r.latest_membership_year);
        (years.clone().min(), years.max())
    }
}

/// Default "updated since" cutoff for a run at `now`.
#[must_use]
pub fn default_updated_since(now: DateTime<Utc>) -> NaiveDate {
    (now - TimeDelta::days(RECENT_ACTIVITY_DAYS)).date_naive()
}

/// A joined building row with its membership figures.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedBuildingRow {
    /// The joined row.
    pub row: JoinedBuildingRow,
    /// Active members at this key.
    pub member_count: u32,
    /// All-time members at this key, at least `member_count`.
    pub member_count_all: u32,
    /// Active members per unit, capped at 1.
    pub member_share_building: f64,
    /// Membership rows at this key.
    pub members_payload: Vec<MembershipProjection>,
}

/// Share of units held by active members, capped at 1.
#[must_use]
pub fn member_share(member_count: u32, units: Option<f64>) -> f64 {
    match units {
        Some(units) if units > 0.0 => (f64::from(member_count) / units).min(1.0),
        _ => 0.0,
    }
}

/// Attaches membership counts and payloads to joined rows by key.
#[must_use]
pub fn attach_membership(
    rows: Vec<JoinedBuildingRow>,
    membership: &Membership,
) -> Vec<EnrichedBuildingRow> {
    let active = membership.counts(true);
    let all = membership.counts(false);
    let payloads = membership.payloads();

    rows.into_iter()
        .map(|row| {
            let member_count = active.get(&row.key).copied().unwrap_or(0);
            let member_count_all = all
                .get(&row.key)
                .copied()
                .unwrap_or(0)
                .max(member_count);
            let members_payload = payloads.get(&row.key).cloned().unwrap_or_default();
            let member_share_building = member_share(member_count, row.numbers.units);

            EnrichedBuildingRow {
                row,
                member_count,
                member_count_all,
                member_share_building,
                members_payload,
            }
        })
        .collect()
}
