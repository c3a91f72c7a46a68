//! Dated output layout.
//!
//! Frames land in one directory per night, named `{YYYY}{mon}{D}` with the day
//! right-aligned in two columns (`2024mar 7`, `2024mar17`). File names carry
//! the full zero-padded timestamp: `s20240307_14_05_09.fits`.

use chrono::{Datelike, NaiveDateTime, Timelike};
use std::path::{Path, PathBuf};

/// Lowercase month abbreviations indexed by month number; slot 0 is unused.
pub const MONTHS: [&str; 13] = [
    "", "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

pub fn dated_dir_name(ts: &NaiveDateTime) -> String {
    format!(
        "{}{}{:>2}",
        ts.year(),
        MONTHS[ts.month() as usize],
        ts.day()
    )
}

pub fn frame_file_name(ts: &NaiveDateTime, extension: &str) -> String {
    format!(
        "s{:04}{:02}{:02}_{:02}_{:02}_{:02}.{}",
        ts.year(),
        ts.month(),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second(),
        extension
    )
}

/// Full output path for a frame taken at local wall-clock time `ts`.
pub fn frame_path(base_dir: &Path, extension: &str, ts: &NaiveDateTime) -> PathBuf {
    base_dir
        .join(dated_dir_name(ts))
        .join(frame_file_name(ts, extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, ss)
            .unwrap()
    }

    #[test]
    fn single_digit_day_is_space_padded() {
        let ts = at(2024, 3, 7, 14, 5, 9);
        assert_eq!(dated_dir_name(&ts), "2024mar 7");
        assert_eq!(frame_file_name(&ts, "fits"), "s20240307_14_05_09.fits");
    }

    #[test]
    fn two_digit_day_and_december() {
        let ts = at(2023, 12, 31, 23, 59, 58);
        assert_eq!(dated_dir_name(&ts), "2023dec31");
        assert_eq!(frame_file_name(&ts, "fit"), "s20231231_23_59_58.fit");
    }

    #[test]
    fn path_joins_base() {
        let ts = at(2024, 1, 1, 0, 0, 0);
        let path = frame_path(Path::new("/data"), "fits", &ts);
        assert_eq!(path, PathBuf::from("/data/2024jan 1/s20240101_00_00_00.fits"));
    }

    #[test]
    fn month_table_is_complete() {
        assert_eq!(MONTHS.len(), 13);
        assert_eq!(MONTHS[1], "jan");
        assert_eq!(MONTHS[12], "dec");
    }
}
