//! Flat-text cooldown table on disk.
//!
//! One record per line, `kind,identity,timestampMillis`, with `kind` either
//! `user` or `channel`. Blank lines and lines starting with `#` are ignored.
//! Malformed lines are skipped with a warning; they never abort a load.
//!
//! Identities that the format cannot carry (empty, containing `,` or a line
//! break, or with surrounding whitespace) are left out of the table with a
//! warning rather than written in a form that reads back differently.
//!
//! Saves replace the whole file: the table is written to a uniquely named
//! temporary file in the same directory, which is then renamed over the
//! target. Concurrent saves never share a temporary file.

use crate::application::ports::{CooldownStore, PersistenceError};
use crate::domain::identity::{CooldownEntry, CooldownKind};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// File name used when no path is configured.
pub const DEFAULT_STATE_FILE: &str = "cooldown_state.csv";

/// Cooldown store backed by a single text file.
#[derive(Debug, Clone)]
pub struct CooldownFile {
    path: PathBuf,
}

impl CooldownFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn directory(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}

/// Whether `identity` survives a write and re-read unchanged.
pub fn is_storable(identity: &str) -> bool {
    !identity.is_empty()
        && !identity.contains([',', '\n', '\r'])
        && identity.trim() == identity
}

/// Parse one table line. `None` for anything that is not a well-formed record.
pub fn parse_line(line: &str) -> Option<CooldownEntry> {
    let mut fields = line.trim().splitn(3, ',');
    let kind = CooldownKind::parse(fields.next()?.trim())?;
    let identity = fields.next()?.trim();
    if identity.is_empty() {
        return None;
    }
    let last_warned_at = fields.next()?.trim().parse::<u64>().ok()?;
    Some(CooldownEntry::new(kind, identity, last_warned_at))
}

/// Parse a whole table, skipping comments, blanks and malformed lines.
pub fn parse_table(contents: &str) -> Vec<CooldownEntry> {
    let mut entries = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some(entry) => entries.push(entry),
            None => warn!(line_number = index + 1, line, "skipping malformed cooldown record"),
        }
    }
    entries
}

/// Render entries in table form, one line each.
///
/// Entries whose identity is not [`is_storable`] are skipped.
pub fn render_table(entries: &[CooldownEntry]) -> String {
    let mut out = String::with_capacity(entries.len() * 32);
    for entry in entries {
        if !is_storable(entry.identity.as_str()) {
            warn!(
                kind = %entry.kind,
                identity = ?entry.identity.as_str(),
                "identity cannot be stored; cooldown not persisted"
            );
            continue;
        }
        out.push_str(entry.kind.as_str());
        out.push(',');
        out.push_str(entry.identity.as_str());
        out.push(',');
        out.push_str(&entry.last_warned_at.to_string());
        out.push('\n');
    }
    out
}

impl CooldownStore for CooldownFile {
    fn load(&self) -> Result<Vec<CooldownEntry>, PersistenceError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(file = %self.path.display(), "no cooldown state file; starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let entries = parse_table(&contents);
        debug!(file = %self.path.display(), entries = entries.len(), "cooldown state loaded");
        Ok(entries)
    }

    fn save(&self, entries: &[CooldownEntry]) -> Result<(), PersistenceError> {
        let directory = self.directory();
        fs::create_dir_all(directory).map_err(|e| self.io_error(e))?;

        let mut temp = NamedTempFile::new_in(directory).map_err(|e| self.io_error(e))?;
        temp.write_all(render_table(entries).as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| self.io_error(e))?;

        temp.persist(&self.path)
            .map(drop)
            .map_err(|e| self.io_error(e.error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("user,U1,1714521600000"),
            Some(CooldownEntry::new(CooldownKind::User, "U1", 1_714_521_600_000))
        );
        assert_eq!(
            parse_line("channel,C1,5\r"),
            Some(CooldownEntry::new(CooldownKind::Channel, "C1", 5))
        );
        assert_eq!(parse_line("user,,abc"), None);
        assert_eq!(parse_line("channel,X,notanumber"), None);
        assert_eq!(parse_line("team,T1,5"), None);
        assert_eq!(parse_line("user,U1"), None);
        assert_eq!(parse_line("user,U1,-5"), None);
    }

    #[test]
    fn test_parse_table_skips_noise() {
        let table =
            "# cooldowns\n\nuser,U1,10\nuser,,abc\n   \nchannel,X,notanumber\nchannel,C1,20\n";
        let entries = parse_table(table);
        assert_eq!(
            entries,
            vec![
                CooldownEntry::new(CooldownKind::User, "U1", 10),
                CooldownEntry::new(CooldownKind::Channel, "C1", 20),
            ]
        );
    }

    #[test]
    fn test_render_table() {
        let entries = vec![
            CooldownEntry::new(CooldownKind::User, "U1", 10),
            CooldownEntry::new(CooldownKind::Channel, "C1", 20),
        ];
        assert_eq!(render_table(&entries), "user,U1,10\nchannel,C1,20\n");
        assert_eq!(render_table(&[]), "");
    }

    #[test]
    fn test_storable_identities() {
        assert!(is_storable("U024BE7LH"));
        assert!(is_storable("C-general"));
        assert!(!is_storable(""));
        assert!(!is_storable("U1,team"));
        assert!(!is_storable("U1\nuser,U2"));
        assert!(!is_storable("U1\r"));
        assert!(!is_storable(" U1"));
    }

    #[test]
    fn test_unstorable_identities_cannot_forge_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = CooldownFile::new(dir.path().join(DEFAULT_STATE_FILE));

        store
            .save(&[
                CooldownEntry::new(CooldownKind::User, "U1,team", 42),
                CooldownEntry::new(
                    CooldownKind::User,
                    "U1\nchannel,C9,99999999999999\nuser,U2",
                    42,
                ),
                CooldownEntry::new(CooldownKind::Channel, "C1", 7),
            ])
            .unwrap();

        assert_eq!(
            store.load().unwrap(),
            vec![CooldownEntry::new(CooldownKind::Channel, "C1", 7)]
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CooldownFile::new(dir.path().join("absent.csv"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CooldownFile::new(dir.path().join("state").join(DEFAULT_STATE_FILE));

        store
            .save(&[
                CooldownEntry::new(CooldownKind::User, "U1", 1),
                CooldownEntry::new(CooldownKind::User, "U2", 2),
            ])
            .unwrap();
        store
            .save(&[CooldownEntry::new(CooldownKind::Channel, "C1", 3)])
            .unwrap();

        assert_eq!(
            store.load().unwrap(),
            vec![CooldownEntry::new(CooldownKind::Channel, "C1", 3)]
        );
        let leftovers = fs::read_dir(dir.path().join("state")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_concurrent_saves_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CooldownFile::new(dir.path().join(DEFAULT_STATE_FILE)));
        let snapshots = [
            vec![CooldownEntry::new(CooldownKind::User, "U1", 1)],
            vec![
                CooldownEntry::new(CooldownKind::User, "U2", 2),
                CooldownEntry::new(CooldownKind::Channel, "C2", 2),
            ],
        ];

        let handles: Vec<_> = snapshots
            .iter()
            .cloned()
            .map(|entries| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..200)
                        .filter(|_| store.save(&entries).is_err())
                        .count()
                })
            })
            .collect();
        let failures: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(failures, 0);
        let loaded = store.load().unwrap();
        assert!(snapshots.contains(&loaded), "torn snapshot: {:?}", loaded);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be read as a file
        let store = CooldownFile::new(dir.path());
        assert!(matches!(store.load(), Err(PersistenceError::Io { .. })));
    }
}
