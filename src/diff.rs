use serde::Serialize;

use crate::file::format_size;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Added,
    Increased,
    Decreased,
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffChange {
    // Signed delta in bytes, current minus last.
    pub raw: i64,
    // Magnitude with a "+"/"-" prefix when non-zero.
    pub pretty: String,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSize {
    pub raw: u64,
    pub pretty: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    // File path, or "summary" for the synthetic aggregate row.
    pub id: String,
    pub status: DiffStatus,
    pub change: DiffChange,
    pub size: DiffSize,
    pub is_below_threshold: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Sizes {
    pub current: u64,
    pub last: u64,
}

// Pure classification of a current/last byte count pair. A missing prior size
// is signalled by last == 0 and always classifies as "added". The threshold is
// evaluated against the current size only, never against the delta.
pub fn create_diff(id: &str, sizes: Sizes, threshold: Option<u64>) -> Diff {
    let change = sizes.current as i64 - sizes.last as i64;

    let (status, percent) = if sizes.last == 0 {
        (DiffStatus::Added, 100.0)
    } else if change == 0 {
        (DiffStatus::Unchanged, 0.0)
    } else {
        let status = if change > 0 {
            DiffStatus::Increased
        } else {
            DiffStatus::Decreased
        };
        let percent =
            (sizes.last as f64 - sizes.current as f64).abs() / sizes.last as f64 * 100.0;
        (status, round2(percent))
    };

    let prefix = match change {
        c if c > 0 => "+",
        c if c < 0 => "-",
        _ => "",
    };

    let is_below_threshold = match threshold {
        Some(limit) => sizes.current <= limit,
        None => true,
    };

    Diff {
        id: id.to_string(),
        status,
        change: DiffChange {
            raw: change,
            pretty: format!("{}{}", prefix, format_size(change.unsigned_abs())),
            percent,
        },
        size: DiffSize {
            raw: sizes.current,
            pretty: format_size(sizes.current),
        },
        is_below_threshold,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
