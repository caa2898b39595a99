//! Date/author grouping of the message store for display.

use chrono::{DateTime, Local, NaiveDate, Utc};

use crate::state::{AuthorRun, ChatMessage, DateGroup};

/// Two consecutive same-author messages further apart than this start a new
/// run.
const RUN_WINDOW_MS: i64 = 5 * 60 * 1000;

pub(crate) fn local_day(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&Local).date_naive()
}

pub(crate) fn format_display_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%l:%M %p")
        .to_string()
        .trim()
        .to_string()
}

/// "Today", "Yesterday", or a long-form date. `today` is passed in so output
/// stays reproducible; callers resolve it from the wall clock once per
/// refresh.
pub(crate) fn format_date_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        "Today".to_string()
    } else if day == today.pred_opt().unwrap_or(today) {
        "Yesterday".to_string()
    } else {
        day.format("%A, %B %-d, %Y").to_string()
    }
}

/// Bucket `messages` (store order: newest first) into date groups of
/// contiguous same-author runs.
///
/// A new group starts whenever the local calendar day changes between
/// consecutive input messages. A day whose messages are interleaved with
/// another day's therefore yields one group per contiguous run, not a true
/// group-by; output order mirrors input order. Pure and deterministic.
pub(crate) fn group_messages(messages: &[ChatMessage], today: NaiveDate) -> Vec<DateGroup> {
    let mut groups: Vec<DateGroup> = Vec::new();

    for (i, msg) in messages.iter().enumerate() {
        let day = local_day(msg.timestamp);
        let new_group = i == 0 || local_day(messages[i - 1].timestamp) != day;
        if new_group {
            groups.push(DateGroup {
                day,
                label: format_date_label(day, today),
                runs: Vec::new(),
            });
        }

        let new_run = new_group || {
            let prev = &messages[i - 1];
            prev.author_id != msg.author_id
                || (msg.timestamp - prev.timestamp)
                    .num_milliseconds()
                    .abs()
                    > RUN_WINDOW_MS
        };

        if let Some(group) = groups.last_mut() {
            if new_run {
                group.runs.push(AuthorRun {
                    author_id: msg.author_id.clone(),
                    messages: Vec::new(),
                });
            }
            if let Some(run) = group.runs.last_mut() {
                run.messages.push(msg.clone());
            }
        }
    }

    groups
}
