//! LRC parsing.
//!
//! Turns `[mm:ss.xx]text` lines into [`SyncedLine`]s. A line may carry several
//! timestamps, in which case it is emitted once per timestamp. Metadata tags
//! such as `[ar:Artist]` or `[offset:+100]` are skipped. The output is sorted
//! by time; lines sharing a timestamp keep their input order.

use core_library::SyncedLine;

/// Parses LRC text. Lines without a valid timestamp are dropped.
pub fn parse_lrc(text: &str) -> Vec<SyncedLine> {
    let mut lines = Vec::new();

    for raw in text.lines() {
        let mut rest = raw.trim();
        let mut stamps = Vec::new();

        while let Some(tag_body) = rest.strip_prefix('[') {
            let Some(end) = tag_body.find(']') else {
                break;
            };
            if let Some(ms) = parse_timestamp(&tag_body[..end]) {
                stamps.push(ms);
            }
            rest = tag_body[end + 1..].trim_start();
        }

        let text = rest.trim();
        for time_offset_ms in stamps {
            lines.push(SyncedLine {
                time_offset_ms,
                text: text.to_string(),
            });
        }
    }

    lines.sort_by_key(|line| line.time_offset_ms);
    lines
}

/// True when at least one line carries a timestamp.
pub fn is_lrc(text: &str) -> bool {
    text.lines().any(|line| {
        line.trim()
            .strip_prefix('[')
            .and_then(|body| body.find(']').map(|end| &body[..end]))
            .and_then(parse_timestamp)
            .is_some()
    })
}

/// `mm:ss`, `mm:ss.x`, `mm:ss.xx` or `mm:ss.xxx` to milliseconds.
fn parse_timestamp(tag: &str) -> Option<u64> {
    let (minutes, rest) = tag.split_once(':')?;
    let (seconds, fraction) = match rest.split_once('.') {
        Some((seconds, fraction)) => (seconds, Some(fraction)),
        None => (rest, None),
    };

    if !is_digits(minutes) || !is_digits(seconds) {
        return None;
    }
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    if seconds >= 60 {
        return None;
    }

    let millis = match fraction {
        None => 0,
        Some(f) if is_digits(f) && f.len() <= 3 => {
            let value: u64 = f.parse().ok()?;
            match f.len() {
                1 => value * 100,
                2 => value * 10,
                _ => value,
            }
        }
        Some(_) => return None,
    };

    Some(minutes * 60_000 + seconds * 1_000 + millis)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
