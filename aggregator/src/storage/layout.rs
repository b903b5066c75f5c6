//! Storage file placement
//!
//! Session layout: `<root>/<startup day>/packets_<startup ms>.sqlite`, fixed for
//! the process lifetime. Daily layout: `<root>/<today>/packets.sqlite`, which
//! moves to a new directory when the local calendar day changes.

use crate::config::StorageLayout;
use chrono::{DateTime, Local};
use packetlog_shared::utils::time::day_stamp;
use std::path::PathBuf;

pub const DAILY_FILE_NAME: &str = "packets.sqlite";

#[derive(Debug, Clone)]
pub struct LocationResolver {
    root: PathBuf,
    layout: StorageLayout,
    started_at: DateTime<Local>,
}

impl LocationResolver {
    pub fn new(root: impl Into<PathBuf>, layout: StorageLayout) -> Self {
        Self::with_start(root, layout, Local::now())
    }

    pub fn with_start(
        root: impl Into<PathBuf>,
        layout: StorageLayout,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            root: root.into(),
            layout,
            started_at,
        }
    }

    /// Storage file to use at `now`.
    pub fn path_at(&self, now: &DateTime<Local>) -> PathBuf {
        match self.layout {
            StorageLayout::Session => self
                .root
                .join(day_stamp(&self.started_at))
                .join(format!("packets_{}.sqlite", self.started_at.timestamp_millis())),
            StorageLayout::Daily => self.root.join(day_stamp(now)).join(DAILY_FILE_NAME),
        }
    }

    pub fn current_path(&self) -> PathBuf {
        self.path_at(&Local::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn noon(day: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_session_path_is_fixed() {
        let start = noon(1);
        let resolver = LocationResolver::with_start("/data", StorageLayout::Session, start);
        let expected = PathBuf::from("/data/2024-05-01")
            .join(format!("packets_{}.sqlite", start.timestamp_millis()));

        assert_eq!(resolver.path_at(&start), expected);
        assert_eq!(resolver.path_at(&(start + Duration::days(3))), expected);
    }

    #[test]
    fn test_daily_path_rotates() {
        let resolver = LocationResolver::with_start("/data", StorageLayout::Daily, noon(1));
        assert_eq!(
            resolver.path_at(&noon(1)),
            PathBuf::from("/data/2024-05-01/packets.sqlite")
        );
        assert_eq!(
            resolver.path_at(&noon(2)),
            PathBuf::from("/data/2024-05-02/packets.sqlite")
        );
    }
}
