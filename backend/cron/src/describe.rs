/// Human-readable descriptions of cron expressions.
///
/// Display-only: scheduling correctness never depends on this output. The
/// description is a pure function of the expression text.
use cronhook_core::CronhookError;

use crate::engine;

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const WEEKDAYS: [&str; 7] = [
    "Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday",
];

/// Describe a 6-field cron expression in English, e.g.
/// `"0 0 2 * * ?"` → `"at 02:00 every day"`.
pub fn describe(expr: &str) -> Result<String, CronhookError> {
    engine::parse(expr)?;
    let fields: Vec<&str> = expr.trim().split_whitespace().collect();
    let (sec, min, hour) = (fields[0], fields[1], fields[2]);
    let (dom, mon, dow) = (fields[3], fields[4], fields[5]);

    let mut out = describe_time(sec, min, hour);

    let day_free = is_any(dom) && is_any(mon) && is_any(dow);
    if day_free {
        if fixed(hour).is_some() {
            out.push_str(" every day");
        }
    } else {
        if let Some(d) = describe_dom(dom) {
            out.push(' ');
            out.push_str(&d);
        }
        if let Some(w) = describe_dow(dow) {
            out.push(' ');
            out.push_str(&w);
        }
        if let Some(m) = describe_month(mon) {
            out.push(' ');
            out.push_str(&m);
        }
    }
    Ok(out)
}

fn is_any(field: &str) -> bool {
    field == "*" || field == "?"
}

/// A plain numeric field value, if the field is one.
fn fixed(field: &str) -> Option<u32> {
    field.parse().ok()
}

/// The step of a `*/n` or `a/n` field, if the field has one.
fn step(field: &str) -> Option<u32> {
    field.split_once('/').and_then(|(_, s)| s.parse().ok())
}

fn describe_time(sec: &str, min: &str, hour: &str) -> String {
    if let (Some(s), Some(m), Some(h)) = (fixed(sec), fixed(min), fixed(hour)) {
        return if s == 0 {
            format!("at {h:02}:{m:02}")
        } else {
            format!("at {h:02}:{m:02}:{s:02}")
        };
    }
    if is_any(sec) && is_any(min) && is_any(hour) {
        return "every second".to_string();
    }
    if let Some(n) = step(sec) {
        if is_any(min) && is_any(hour) {
            return format!("every {n} seconds");
        }
    }
    if let Some(n) = step(min) {
        if is_any(hour) {
            return format!("every {n} minutes");
        }
    }
    if let Some(n) = step(hour) {
        return format!("every {n} hours");
    }
    if fixed(sec).is_some() && is_any(min) && is_any(hour) {
        return "every minute".to_string();
    }
    if is_any(hour) {
        if let (Some(_), Some(m)) = (fixed(sec), fixed(min)) {
            return format!("at {m} minutes past every hour");
        }
    }
    // Complex field combinations fall back to a literal rendering.
    format!("at seconds {sec}, minutes {min}, hours {hour}")
}

fn describe_dom(dom: &str) -> Option<String> {
    if is_any(dom) {
        return None;
    }
    Some(match fixed(dom) {
        Some(d) => format!("on day {d} of the month"),
        None => format!("on days {dom} of the month"),
    })
}

fn describe_month(mon: &str) -> Option<String> {
    if is_any(mon) {
        return None;
    }
    Some(match fixed(mon) {
        Some(m @ 1..=12) => format!("in {}", MONTHS[(m - 1) as usize]),
        _ => format!("in months {mon}"),
    })
}

fn describe_dow(dow: &str) -> Option<String> {
    if is_any(dow) {
        return None;
    }
    // The cron crate numbers days 1 = Sunday through 7 = Saturday.
    Some(match fixed(dow) {
        Some(d @ 1..=7) => format!("on {}", WEEKDAYS[(d - 1) as usize]),
        _ => format!("on {dow}"),
    })
}
