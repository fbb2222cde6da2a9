//! Backup keys and their ordering.
//!
//! A key is `<version>_<revision>_etcd.backup` with the revision written as 16
//! zero-padded lowercase hex digits. The fixed width makes plain string order
//! agree with revision order, so the newest backup can be found from a bucket
//! listing alone.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::MalformedRecordError;

/// Logical state version of a cluster.
pub type Revision = i64;

/// Fixed last component of every backup key.
pub const BACKUP_SUFFIX: &str = "etcd.backup";

const SEPARATOR: char = '_';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub software_version: String,
    pub revision: Revision,
}

impl BackupRecord {
    pub fn new(software_version: impl Into<String>, revision: Revision) -> Self {
        Self {
            software_version: software_version.into(),
            revision,
        }
    }

    /// The object key this record is stored under.
    pub fn key(&self) -> String {
        format!(
            "{}{SEPARATOR}{:016x}{SEPARATOR}{BACKUP_SUFFIX}",
            self.software_version, self.revision
        )
    }

    /// Parse an object name back into a record.
    pub fn parse(name: &str) -> Result<Self, MalformedRecordError> {
        let parts: Vec<&str> = name.splitn(3, SEPARATOR).collect();
        let [version, revision, suffix] = parts[..] else {
            return Err(MalformedRecordError::Shape(name.to_string()));
        };
        if suffix != BACKUP_SUFFIX {
            return Err(MalformedRecordError::Suffix(name.to_string()));
        }
        let malformed_revision = || MalformedRecordError::Revision {
            name: name.to_string(),
            revision: revision.to_string(),
        };
        // from_str_radix tolerates a leading sign; keys never carry one.
        if revision.starts_with(['+', '-']) {
            return Err(malformed_revision());
        }
        let revision = i64::from_str_radix(revision, 16).map_err(|_| malformed_revision())?;
        Ok(Self::new(version, revision))
    }
}

impl fmt::Display for BackupRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for BackupRecord {
    type Err = MalformedRecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Orders records by revision only.
pub fn by_revision(a: &BackupRecord, b: &BackupRecord) -> Ordering {
    a.revision.cmp(&b.revision)
}

/// Newest valid record among `names`. Names that are not backup keys are
/// logged and skipped.
pub fn latest<I, S>(names: I) -> Option<BackupRecord>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| match BackupRecord::parse(name.as_ref()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Skipping object that is not a backup");
                None
            }
        })
        .max_by(by_revision)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_matches_wire_format() {
        let record = BackupRecord::new("3.2.0", 10);
        assert_eq!(record.key(), "3.2.0_000000000000000a_etcd.backup");
        assert_eq!(record.to_string(), record.key());
    }

    #[test]
    fn parse_recovers_revision() {
        for revision in [0, 1, 0xff, 1 << 40, i64::MAX] {
            let key = BackupRecord::new("3.3.1", revision).key();
            let parsed: BackupRecord = key.parse().expect("valid key");
            assert_eq!(parsed.revision, revision);
            assert_eq!(parsed.software_version, "3.3.1");
        }
    }

    #[test]
    fn key_order_follows_revision_order() {
        let pairs = [(0, 1), (9, 10), (15, 16), (255, 4096), (i64::MAX - 1, i64::MAX)];
        for (a, b) in pairs {
            let ka = BackupRecord::new("3.2.0", a).key();
            let kb = BackupRecord::new("3.2.0", b).key();
            assert!(ka < kb, "{ka} should sort before {kb}");
        }
    }

    #[test]
    fn parse_rejects_malformed_names() {
        assert_eq!(
            BackupRecord::parse("not-a-backup"),
            Err(MalformedRecordError::Shape("not-a-backup".into()))
        );
        assert_eq!(
            BackupRecord::parse("3.2.0_000000000000000a_other"),
            Err(MalformedRecordError::Suffix("3.2.0_000000000000000a_other".into()))
        );
        assert!(matches!(
            BackupRecord::parse("3.2.0_zz_etcd.backup"),
            Err(MalformedRecordError::Revision { .. })
        ));
        assert!(matches!(
            BackupRecord::parse("3.2.0_-a_etcd.backup"),
            Err(MalformedRecordError::Revision { .. })
        ));
        assert!(matches!(
            BackupRecord::parse("3.2.0__etcd.backup"),
            Err(MalformedRecordError::Revision { .. })
        ));
    }

    #[test]
    fn latest_skips_garbage() {
        let names = [
            "3.2.0_0000000000000005_etcd.backup",
            "3.2.0_000000000000000a_etcd.backup",
            "not-a-backup",
        ];
        let record = latest(names).expect("one valid record");
        assert_eq!(record.revision, 10);
        assert_eq!(record.key(), "3.2.0_000000000000000a_etcd.backup");
    }

    #[test]
    fn latest_compares_revision_not_version() {
        let names = vec![
            "3.3.0_0000000000000002_etcd.backup".to_string(),
            "3.1.0_0000000000000007_etcd.backup".to_string(),
        ];
        assert_eq!(latest(&names).map(|r| r.revision), Some(7));
    }

    #[test]
    fn latest_of_nothing_is_none() {
        assert_eq!(latest(Vec::<String>::new()), None);
        assert_eq!(latest(["junk", "more_junk"]), None);
    }
}
