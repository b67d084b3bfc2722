//! Recursive three-way tree merge.
//!
//! Walks the union of entry names across `base` (optional), `ours`, and
//! `theirs`, classifying each name's triple of entries against a fixed rule
//! table and recursing into subtrees. No rename or copy detection is
//! attempted — a path that moved is seen as a delete on one side and an add
//! on the other.

use bstr::{BStr, BString, ByteSlice};
use git_hash::ObjectId;
use git_object::{FileMode, Tree, TreeEntry};
use git_object::{Blob, Object};
use git_odb::ObjectDatabase;

use crate::content::{merge_content, MergeLabels};
use crate::{ConflictEntry, ConflictSide, ConflictType, ContentMergeResult, MergeError, MergeOptions};

/// Output of merging one tree level.
pub struct TreeMergeOutput {
    pub tree_oid: ObjectId,
    pub conflicts: Vec<ConflictEntry>,
}

/// Merge three optional trees (by OID) rooted at `base_path`, writing any
/// new blob/tree objects to `odb` and returning the merged tree's OID plus
/// every conflict found at or below this level.
pub fn merge_trees(
    odb: &ObjectDatabase,
    base_path: &BStr,
    base: Option<&ObjectId>,
    ours: Option<&ObjectId>,
    theirs: Option<&ObjectId>,
    options: &MergeOptions,
) -> Result<TreeMergeOutput, MergeError> {
    let base_tree = load_tree(odb, base)?;
    let ours_tree = load_tree(odb, ours)?;
    let theirs_tree = load_tree(odb, theirs)?;

    let mut names: Vec<BString> = Vec::new();
    for tree in [&base_tree, &ours_tree, &theirs_tree] {
        for entry in &tree.entries {
            if !names.iter().any(|n| n == &entry.name) {
                names.push(entry.name.clone());
            }
        }
    }
    names.sort_by(|a, b| {
        let ea = ours_tree
            .find(a.as_ref())
            .or_else(|| theirs_tree.find(a.as_ref()))
            .or_else(|| base_tree.find(a.as_ref()))
            .unwrap();
        let eb = ours_tree
            .find(b.as_ref())
            .or_else(|| theirs_tree.find(b.as_ref()))
            .or_else(|| base_tree.find(b.as_ref()))
            .unwrap();
        TreeEntry::cmp_entries(ea, eb)
    });

    let mut merged = Tree::new();
    let mut conflicts = Vec::new();

    for name in &names {
        let name = name.as_ref();
        let b = base_tree.find(name);
        let o = ours_tree.find(name);
        let t = theirs_tree.find(name);

        let child_path = join_path(base_path, name);

        if let Some(entry) = classify(odb, child_path.as_ref(), b, o, t, options, &mut conflicts)? {
            merged.entries.push(entry);
        }
    }

    let tree_oid = odb.write(&Object::Tree(merged))?;
    Ok(TreeMergeOutput { tree_oid, conflicts })
}

fn join_path(base: &BStr, name: &BStr) -> BString {
    if base.is_empty() {
        BString::from(name)
    } else {
        let mut p = BString::from(base);
        p.push(b'/');
        p.extend_from_slice(name);
        p
    }
}

fn load_tree(odb: &ObjectDatabase, oid: Option<&ObjectId>) -> Result<Tree, MergeError> {
    match oid {
        None => Ok(Tree::new()),
        Some(oid) => match odb.read(oid)? {
            Some(Object::Tree(tree)) => Ok(tree),
            Some(_) => Err(MergeError::NotFound(format!("{oid} is not a tree"))),
            None => Err(MergeError::NotFound(oid.to_hex().to_string())),
        },
    }
}

fn entries_equal(a: &TreeEntry, b: &TreeEntry) -> bool {
    a.oid == b.oid && a.mode == b.mode
}

/// Classify one name's `(base, ours, theirs)` triple and return the merged
/// entry to keep at this level, if any, per the rule table in order.
fn classify(
    odb: &ObjectDatabase,
    path: &BStr,
    b: Option<&TreeEntry>,
    o: Option<&TreeEntry>,
    t: Option<&TreeEntry>,
    options: &MergeOptions,
    conflicts: &mut Vec<ConflictEntry>,
) -> Result<Option<TreeEntry>, MergeError> {
    // Rule 1: o == t.
    if let (Some(o), Some(t)) = (o, t) {
        if entries_equal(o, t) {
            return Ok(Some(o.clone()));
        }
    }

    // Rule 2: both absent.
    if o.is_none() && t.is_none() {
        return Ok(None);
    }

    // Rule 3: b == o, t absent -> deletion by theirs.
    if let (Some(b), Some(o)) = (b, o) {
        if entries_equal(b, o) && t.is_none() {
            return Ok(None);
        }
    }

    // Rule 4: b == t, o absent -> deletion by ours.
    if let (Some(b), Some(t)) = (b, t) {
        if entries_equal(b, t) && o.is_none() {
            return Ok(None);
        }
    }

    // Rule 5 (both deleted, b present) is subsumed by rule 2 above since it
    // also requires o and t both absent.

    // Rule 6: b == o, t present -> take t.
    if let (Some(b), Some(o)) = (b, o) {
        if entries_equal(b, o) {
            if let Some(t) = t {
                return Ok(Some(t.clone()));
            }
        }
    }

    // Rule 7: b == t, o present -> take o.
    if let (Some(b), Some(t)) = (b, t) {
        if entries_equal(b, t) {
            if let Some(o) = o {
                return Ok(Some(o.clone()));
            }
        }
    }

    match (o, t) {
        (Some(o), Some(t)) => {
            if o.mode.is_tree() != t.mode.is_tree() {
                // Rule 8: type change between blob and tree.
                record_type_change(path, b, o, t, conflicts);
                return Ok(Some(o.clone()));
            }

            if o.mode.is_tree() && t.mode.is_tree() {
                // Rule 9: recurse into subtrees.
                let base_oid = b.filter(|b| b.mode.is_tree()).map(|b| b.oid);
                let sub = merge_trees(
                    odb,
                    path,
                    base_oid.as_ref(),
                    Some(&o.oid),
                    Some(&t.oid),
                    options,
                )?;
                conflicts.extend(sub.conflicts);
                return Ok(Some(TreeEntry {
                    mode: FileMode::Tree,
                    name: name_of(path),
                    oid: sub.tree_oid,
                }));
            }

            // Rule 10: both blobs -> three-way blob merge.
            merge_blob_entry(odb, path, b, o, t, options, conflicts)
        }
        (Some(o), None) => {
            if b.is_none() {
                // Unilateral add by ours; theirs never had the path.
                return Ok(Some(o.clone()));
            }
            // Rule 11: ours modified, theirs deleted.
            conflicts.push(ConflictEntry {
                path: path.to_owned(),
                conflict_type: ConflictType::ModifyDelete,
                base: b.map(|e| side_of(path, e)),
                ours: Some(side_of(path, o)),
                theirs: None,
            });
            Ok(Some(o.clone()))
        }
        (None, Some(t)) => {
            if b.is_none() {
                // Unilateral add by theirs; ours never had the path.
                return Ok(Some(t.clone()));
            }
            // Rule 11 (symmetric): ours deleted, theirs modified.
            conflicts.push(ConflictEntry {
                path: path.to_owned(),
                conflict_type: ConflictType::DeleteModify,
                base: b.map(|e| side_of(path, e)),
                ours: None,
                theirs: Some(side_of(path, t)),
            });
            Ok(Some(t.clone()))
        }
        (None, None) => unreachable!("handled by rule 2"),
    }
}

fn name_of(path: &BStr) -> BString {
    match path.rfind_byte(b'/') {
        Some(pos) => BString::from(&path[pos + 1..]),
        None => path.to_owned(),
    }
}

fn record_type_change(
    path: &BStr,
    b: Option<&TreeEntry>,
    o: &TreeEntry,
    t: &TreeEntry,
    conflicts: &mut Vec<ConflictEntry>,
) {
    conflicts.push(ConflictEntry {
        path: path.to_owned(),
        conflict_type: ConflictType::TypeChange,
        base: b.map(|e| side_of(path, e)),
        ours: Some(side_of(path, o)),
        theirs: Some(side_of(path, t)),
    });
}

fn side_of(path: &BStr, entry: &TreeEntry) -> ConflictSide {
    ConflictSide {
        oid: entry.oid,
        mode: entry.mode,
        path: path.to_owned(),
    }
}

/// Resolve the merged mode for a blob pair per §4.2's mode-reconciliation
/// rule, recording a conflict if neither side agrees with base.
fn reconcile_mode(
    path: &BStr,
    b: Option<&TreeEntry>,
    o: &TreeEntry,
    t: &TreeEntry,
    conflicts: &mut Vec<ConflictEntry>,
) -> FileMode {
    if o.mode == t.mode {
        return o.mode;
    }
    match b {
        Some(b) if b.mode == o.mode => t.mode,
        Some(b) if b.mode == t.mode => o.mode,
        _ => {
            conflicts.push(ConflictEntry {
                path: path.to_owned(),
                conflict_type: ConflictType::TypeChange,
                base: b.map(|e| side_of(path, e)),
                ours: Some(side_of(path, o)),
                theirs: Some(side_of(path, t)),
            });
            o.mode
        }
    }
}

fn merge_blob_entry(
    odb: &ObjectDatabase,
    path: &BStr,
    b: Option<&TreeEntry>,
    o: &TreeEntry,
    t: &TreeEntry,
    options: &MergeOptions,
    conflicts: &mut Vec<ConflictEntry>,
) -> Result<Option<TreeEntry>, MergeError> {
    let mode = reconcile_mode(path, b, o, t, conflicts);

    if o.oid == t.oid {
        return Ok(Some(TreeEntry {
            mode,
            name: name_of(path),
            oid: o.oid,
        }));
    }

    let base_bytes = match b {
        Some(b) => Some(read_blob(odb, &b.oid)?),
        None => None,
    };
    let ours_bytes = read_blob(odb, &o.oid)?;
    let theirs_bytes = read_blob(odb, &t.oid)?;

    if git_diff::binary::is_binary(&ours_bytes)
        || git_diff::binary::is_binary(&theirs_bytes)
        || base_bytes.as_deref().is_some_and(git_diff::binary::is_binary)
    {
        conflicts.push(ConflictEntry {
            path: path.to_owned(),
            conflict_type: ConflictType::Content,
            base: b.map(|e| side_of(path, e)),
            ours: Some(side_of(path, o)),
            theirs: Some(side_of(path, t)),
        });
        return Ok(Some(TreeEntry {
            mode,
            name: name_of(path),
            oid: o.oid,
        }));
    }

    let labels = MergeLabels::default();
    let result = merge_content(
        base_bytes.as_deref().unwrap_or(b""),
        &ours_bytes,
        &theirs_bytes,
        options,
        &labels,
    );

    match result {
        ContentMergeResult::Clean(merged) => {
            let oid = odb.write(&Object::Blob(Blob { data: merged }))?;
            Ok(Some(TreeEntry {
                mode,
                name: name_of(path),
                oid,
            }))
        }
        ContentMergeResult::Conflict { content, .. } => {
            let oid = odb.write(&Object::Blob(Blob { data: content }))?;
            let conflict_type = if base_bytes.is_none() {
                ConflictType::AddAdd
            } else {
                ConflictType::Content
            };
            conflicts.push(ConflictEntry {
                path: path.to_owned(),
                conflict_type,
                base: b.map(|e| side_of(path, e)),
                ours: Some(side_of(path, o)),
                theirs: Some(side_of(path, t)),
            });
            Ok(Some(TreeEntry {
                mode,
                name: name_of(path),
                oid,
            }))
        }
    }
}

fn read_blob(odb: &ObjectDatabase, oid: &ObjectId) -> Result<Vec<u8>, MergeError> {
    match odb.read(oid)? {
        Some(Object::Blob(blob)) => Ok(blob.data),
        Some(_) => Err(MergeError::NotFound(format!("{oid} is not a blob"))),
        None => Err(MergeError::NotFound(oid.to_hex().to_string())),
    }
}
