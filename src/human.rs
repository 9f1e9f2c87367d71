//! Human-readable size and time formatting for progress display.

const KILOBYTE: u64 = 1024;
const MEGABYTE: u64 = 1024 * 1024;
const GIGABYTE: u64 = 1024 * 1024 * 1024;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * 60;

/// Format a byte count: `N b`, integer `N Kb` / `N Mb`, or `N.NNN Gb`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn human_size(size: u64) -> String {
    if size >= GIGABYTE {
        format!("{:.3} Gb", size as f64 / GIGABYTE as f64)
    } else if size >= MEGABYTE {
        format!("{} Mb", size / MEGABYTE)
    } else if size >= KILOBYTE {
        format!("{} Kb", size / KILOBYTE)
    } else {
        format!("{size} b")
    }
}

/// Format an elapsed duration in seconds: `Ns`, `NmSSs`, `NhMMm`, `NhMMmSSs`.
///
/// Minute and second fields are zero-padded to two digits; a zero trailing
/// seconds field is omitted.
#[must_use]
pub fn human_duration(elapsed_seconds: u64) -> String {
    let hours = elapsed_seconds / HOUR;
    let minutes = (elapsed_seconds % HOUR) / MINUTE;
    let seconds = elapsed_seconds % MINUTE;

    if elapsed_seconds >= HOUR {
        if seconds == 0 {
            format!("{hours}h{minutes:02}m")
        } else {
            format!("{hours}h{minutes:02}m{seconds:02}s")
        }
    } else if elapsed_seconds >= MINUTE {
        if seconds == 0 {
            format!("{minutes}m")
        } else {
            format!("{minutes}m{seconds:02}s")
        }
    } else {
        format!("{elapsed_seconds}s")
    }
}
