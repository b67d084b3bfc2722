//! Applies a merged tree (and any conflicts) to the index.
//!
//! For a clean path, the existing stage-0 entry's stat cache is reused when
//! the OID is unchanged (avoiding a spurious "modified" status against the
//! working tree); a changed OID gets a zeroed stat cache so the next status
//! scan re-stats it. For a conflicted path, stages 1-3 are written and the
//! stage-0 entry (if any) is dropped. All of this happens in memory against
//! the caller's `Index`; persisting it is a single `Index::write_to` call,
//! giving the whole update the same atomicity as any other index write.

use bstr::{BStr, BString};
use git_hash::ObjectId;
use git_index::{EntryFlags, Index, IndexEntry, Stage, StatData};
use git_object::FileMode;

use crate::ConflictEntry;

/// One path's outcome from a tree merge, as seen by the index.
///
/// Paths are owned rather than borrowed: a bulk rebuild from a freshly
/// merged tree has no pre-existing buffer to borrow from.
pub enum PathOutcome<'a> {
    Clean {
        path: BString,
        oid: ObjectId,
        mode: FileMode,
    },
    Conflicted(&'a ConflictEntry),
    /// The path no longer exists in the merged tree.
    Removed { path: BString },
}

/// Apply every path outcome of a tree merge to `index`.
pub fn apply_outcomes(index: &mut Index, outcomes: &[PathOutcome<'_>]) {
    for outcome in outcomes {
        match outcome {
            PathOutcome::Clean { path, oid, mode } => {
                apply_clean(index, path.as_ref(), *oid, *mode)
            }
            PathOutcome::Conflicted(conflict) => record_conflict(index, conflict),
            PathOutcome::Removed { path } => {
                let path: &BStr = path.as_ref();
                index.remove(path, Stage::Normal);
                index.remove(path, Stage::Base);
                index.remove(path, Stage::Ours);
                index.remove(path, Stage::Theirs);
            }
        }
    }
}

/// Drop any stage-0 entry for the path and write whichever of
/// base/ours/theirs the conflict carries as stages 1-3.
fn record_conflict(index: &mut Index, conflict: &ConflictEntry) {
    let path: &BStr = conflict.path.as_ref();
    index.remove(path, Stage::Normal);

    let sides = [
        (Stage::Base, &conflict.base),
        (Stage::Ours, &conflict.ours),
        (Stage::Theirs, &conflict.theirs),
    ];
    for (stage, side) in sides {
        if let Some(side) = side {
            index.add(IndexEntry {
                path: conflict.path.clone(),
                oid: side.oid,
                mode: side.mode,
                stage,
                stat: StatData::default(),
                flags: EntryFlags::default(),
            });
        }
    }
}

fn apply_clean(index: &mut Index, path: &BStr, oid: ObjectId, mode: FileMode) {
    index.remove(path, Stage::Base);
    index.remove(path, Stage::Ours);
    index.remove(path, Stage::Theirs);

    let stat = match index.get(path, Stage::Normal) {
        Some(existing) if existing.oid == oid && existing.mode == mode => existing.stat,
        _ => StatData::default(),
    };

    index.add(IndexEntry {
        path: path.to_owned(),
        oid,
        mode,
        stage: Stage::Normal,
        stat,
        flags: EntryFlags::default(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::{BString, ByteSlice};
    use git_object::FileMode;

    fn oid(byte: u8) -> ObjectId {
        ObjectId::Sha1([byte; 20])
    }

    fn side(byte: u8, path: &str) -> crate::ConflictSide {
        crate::ConflictSide {
            oid: oid(byte),
            mode: FileMode::Regular,
            path: BString::from(path),
        }
    }

    #[test]
    fn conflicted_outcome_writes_three_stages_and_drops_stage_zero() {
        let mut index = Index::new();
        index.add(IndexEntry {
            path: BString::from("file.txt"),
            oid: oid(9),
            mode: FileMode::Regular,
            stage: Stage::Normal,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        });

        let conflict = ConflictEntry {
            path: BString::from("file.txt"),
            conflict_type: crate::ConflictType::Content,
            base: Some(side(1, "file.txt")),
            ours: Some(side(2, "file.txt")),
            theirs: Some(side(3, "file.txt")),
        };

        apply_outcomes(&mut index, &[PathOutcome::Conflicted(&conflict)]);

        let path = b"file.txt".as_bstr();
        assert!(index.get(path, Stage::Normal).is_none());
        assert_eq!(index.get(path, Stage::Base).unwrap().oid, oid(1));
        assert_eq!(index.get(path, Stage::Ours).unwrap().oid, oid(2));
        assert_eq!(index.get(path, Stage::Theirs).unwrap().oid, oid(3));
        assert!(index.has_conflicts(path));
    }

    #[test]
    fn conflicted_outcome_omits_missing_side() {
        let mut index = Index::new();
        let conflict = ConflictEntry {
            path: BString::from("deleted.txt"),
            conflict_type: crate::ConflictType::ModifyDelete,
            base: Some(side(1, "deleted.txt")),
            ours: Some(side(2, "deleted.txt")),
            theirs: None,
        };

        apply_outcomes(&mut index, &[PathOutcome::Conflicted(&conflict)]);

        let path = b"deleted.txt".as_bstr();
        assert!(index.get(path, Stage::Base).is_some());
        assert!(index.get(path, Stage::Ours).is_some());
        assert!(index.get(path, Stage::Theirs).is_none());
    }

    #[test]
    fn unchanged_oid_keeps_stat_cache() {
        let mut index = Index::new();
        let path = b"file.txt".as_bstr();
        let stat = StatData {
            mtime_secs: 42,
            ..StatData::default()
        };
        index.add(IndexEntry {
            path: BString::from("file.txt"),
            oid: oid(1),
            mode: FileMode::Regular,
            stage: Stage::Normal,
            stat,
            flags: EntryFlags::default(),
        });

        apply_outcomes(
            &mut index,
            &[PathOutcome::Clean {
                path: BString::from("file.txt"),
                oid: oid(1),
                mode: FileMode::Regular,
            }],
        );

        let entry = index.get(path, Stage::Normal).unwrap();
        assert_eq!(entry.stat.mtime_secs, 42);
    }

    #[test]
    fn changed_oid_resets_stat_cache() {
        let mut index = Index::new();
        let path = b"file.txt".as_bstr();
        let stat = StatData {
            mtime_secs: 42,
            ..StatData::default()
        };
        index.add(IndexEntry {
            path: BString::from("file.txt"),
            oid: oid(1),
            mode: FileMode::Regular,
            stage: Stage::Normal,
            stat,
            flags: EntryFlags::default(),
        });

        apply_outcomes(
            &mut index,
            &[PathOutcome::Clean {
                path: BString::from("file.txt"),
                oid: oid(2),
                mode: FileMode::Regular,
            }],
        );

        let entry = index.get(path, Stage::Normal).unwrap();
        assert_eq!(entry.oid, oid(2));
        assert_eq!(entry.stat.mtime_secs, 0);
    }

    #[test]
    fn removed_path_clears_all_stages() {
        let mut index = Index::new();
        let path = b"gone.txt".as_bstr();
        index.add(IndexEntry {
            path: BString::from("gone.txt"),
            oid: oid(1),
            mode: FileMode::Regular,
            stage: Stage::Normal,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        });

        apply_outcomes(
            &mut index,
            &[PathOutcome::Removed {
                path: BString::from("gone.txt"),
            }],
        );

        assert!(index.get(path, Stage::Normal).is_none());
    }
}
