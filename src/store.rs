//! The persistent search tree: a durable map from canonical sentence to
//! node record, backed by SQLite.
//!
//! The tree shape is never materialised as pointers. Nodes name their
//! parent by canonical string and children are found through the parent
//! index, which keeps the store shareable between processes and makes
//! cycles impossible. Banks are never stored; they are recomputed from
//! the sentence (the letter arithmetic is cheaper than keeping a second
//! copy consistent).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension};
use rustc_hash::FxHashMap;

use crate::bank::LetterBank;
use crate::error::Result;
use crate::fragment::{tokenize, Fragment};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS visited (
    sentence        TEXT PRIMARY KEY,
    parent          TEXT NOT NULL,
    score           REAL,
    cumulative      REAL,
    mean_descendant REAL,
    visits          INTEGER NOT NULL DEFAULT 0,
    status          INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS visited_parent ON visited(parent);
";

const COLUMNS: &str = "sentence, parent, score, cumulative, mean_descendant, visits, status";

/// Node lifecycle state. `U` (unexplored) is deliberately absent: an
/// unexplored child is a missing row, surfaced only as a synthetic
/// bucket in demographic summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeStatus {
    /// Selectable and expandable.
    Open = 0,
    /// Hard-invalid: no extension can win.
    Invalid = 1,
    /// Manually excluded; never selected or expanded again.
    Excluded = 7,
}

impl NodeStatus {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<NodeStatus> {
        match code {
            0 => Some(NodeStatus::Open),
            1 => Some(NodeStatus::Invalid),
            7 => Some(NodeStatus::Excluded),
            _ => None,
        }
    }
}

/// One row of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub sentence: String,
    pub parent: String,
    /// Oracle score of this sentence; `None` until first scored,
    /// `-inf` for invalid nodes, `+inf` for the recorded solution.
    pub score: Option<f64>,
    /// Sum of oracle scores along the path from the root: always the
    /// parent's cumulative score plus this node's own.
    pub cumulative: Option<f64>,
    /// Running mean over rolled-out descendants.
    pub mean_descendant: Option<f64>,
    pub visits: i64,
    pub status: NodeStatus,
}

impl NodeRecord {
    /// A fresh open node with no statistics yet.
    pub fn open(sentence: &str, parent: &str) -> Self {
        NodeRecord {
            sentence: sentence.to_string(),
            parent: parent.to_string(),
            score: None,
            cumulative: None,
            mean_descendant: None,
            visits: 0,
            status: NodeStatus::Open,
        }
    }
}

pub struct SearchTree {
    conn: Connection,
    path: PathBuf,
}

impl SearchTree {
    /// Opens (creating if necessary) the store at `path`. A failed open
    /// is retried once before the error escapes.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = match Connection::open(path) {
            Ok(conn) => conn,
            Err(e) => {
                warn!("store open failed ({e}), retrying once");
                Connection::open(path)?
            }
        };
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        debug!("search tree open at {}", path.display());
        Ok(SearchTree {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM visited", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, sentence: &str) -> Result<Option<NodeRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM visited WHERE sentence = ?1"),
                [sentence],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Upserts a single record. Atomic per key.
    pub fn put(&self, record: &NodeRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO visited (sentence, parent, score, cumulative, mean_descendant, visits, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(sentence) DO UPDATE SET
                 parent = excluded.parent,
                 score = excluded.score,
                 cumulative = excluded.cumulative,
                 mean_descendant = excluded.mean_descendant,
                 visits = excluded.visits,
                 status = excluded.status",
            params![
                record.sentence,
                record.parent,
                record.score,
                record.cumulative,
                record.mean_descendant,
                record.visits,
                record.status.code(),
            ],
        )?;
        Ok(())
    }

    /// Writes a whole roll-out's records in one transaction: after a
    /// crash either all of them are durable or none are.
    pub fn put_all(&mut self, records: &[NodeRecord]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO visited (sentence, parent, score, cumulative, mean_descendant, visits, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(sentence) DO UPDATE SET
                     parent = excluded.parent,
                     score = excluded.score,
                     cumulative = excluded.cumulative,
                     mean_descendant = excluded.mean_descendant,
                     visits = excluded.visits,
                     status = excluded.status",
            )?;
            for record in records {
                stmt.execute(params![
                    record.sentence,
                    record.parent,
                    record.score,
                    record.cumulative,
                    record.mean_descendant,
                    record.visits,
                    record.status.code(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All stored children of `sentence`, in canonical order.
    pub fn children_of(&self, sentence: &str) -> Result<Vec<NodeRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM visited WHERE parent = ?1 ORDER BY sentence"
        ))?;
        let rows = stmt.query_map([sentence], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Count of stored children per status code.
    pub fn children_demographics(&self, sentence: &str) -> Result<BTreeMap<i64, u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM visited WHERE parent = ?1 GROUP BY status",
        )?;
        let rows = stmt.query_map([sentence], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        Ok(rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()?)
    }

    /// Stored child count for every parent in one query; the selection
    /// phase joins this against playable counts.
    pub fn child_counts(&self) -> Result<FxHashMap<String, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT parent, COUNT(*) FROM visited GROUP BY parent")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        Ok(rows.collect::<rusqlite::Result<FxHashMap<_, _>>>()?)
    }

    /// Top `k` children of `sentence` by score, best first. Unscored
    /// children sort last.
    pub fn top_children(&self, sentence: &str, k: usize) -> Result<Vec<NodeRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM visited WHERE parent = ?1
             ORDER BY score DESC, sentence LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![sentence, k as i64], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Top `k` strict descendants of `sentence` by mean descendant
    /// score, best first.
    ///
    /// SQLite's LIKE is ASCII-case-insensitive, so the broad match is
    /// re-filtered exactly in Rust before the limit applies.
    pub fn top_descendants(&self, sentence: &str, k: usize) -> Result<Vec<NodeRecord>> {
        let prefix = format!("{} ", sentence);
        let pattern = format!("{}%", escape_like(&prefix));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM visited WHERE sentence LIKE ?1 ESCAPE '\\'
             ORDER BY mean_descendant DESC, sentence"
        ))?;
        let rows = stmt.query_map([pattern], row_to_record)?;
        let mut out = Vec::with_capacity(k);
        for row in rows {
            let record = row?;
            if record.sentence.starts_with(&prefix) {
                out.push(record);
                if out.len() == k {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Every open node, in canonical order. The selection phase samples
    /// from these.
    pub fn open_nodes(&self) -> Result<Vec<NodeRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM visited WHERE status = 0 ORDER BY sentence"
        ))?;
        let rows = stmt.query_map([], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every stored sentence containing `word` as a whole token,
    /// case-exactly.
    pub fn containing_word(&self, word: &str) -> Result<Vec<NodeRecord>> {
        let escaped = escape_like(word);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM visited
             WHERE sentence = ?1
                OR sentence LIKE ?2 ESCAPE '\\'
                OR sentence LIKE ?3 ESCAPE '\\'
                OR sentence LIKE ?4 ESCAPE '\\'
             ORDER BY sentence"
        ))?;
        let rows = stmt.query_map(
            params![
                word,
                format!("{escaped} %"),
                format!("% {escaped}"),
                format!("% {escaped} %"),
            ],
            row_to_record,
        )?;
        let mut out = Vec::new();
        for row in rows {
            let record = row?;
            if tokenize(&record.sentence).iter().any(|t| t == word) {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Deletes every strict descendant of `sentence` and optionally
    /// overwrites the node's own status.
    ///
    /// Returns `(modified, deleted)`. `modified` is `-1` when a status
    /// was requested but already set; `deleted` is the number of
    /// descendant rows removed. `(0, 0)` means nothing matched at all.
    pub fn trim(&mut self, sentence: &str, new_status: Option<NodeStatus>) -> Result<(i64, i64)> {
        let node = self.get(sentence)?;
        let prefix = format!("{} ", sentence);
        let pattern = format!("{}%", escape_like(&prefix));

        let descendants: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT sentence FROM visited WHERE sentence LIKE ?1 ESCAPE '\\'")?;
            let rows = stmt.query_map([pattern], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                let s = row?;
                if s.starts_with(&prefix) {
                    out.push(s);
                }
            }
            out
        };

        let tx = self.conn.transaction()?;
        let modified = match (node.as_ref(), new_status) {
            (Some(node), Some(status)) if node.status == status => -1,
            (Some(_), Some(status)) => tx.execute(
                "UPDATE visited SET status = ?1 WHERE sentence = ?2",
                params![status.code(), sentence],
            )? as i64,
            _ => 0,
        };
        let mut deleted = 0i64;
        {
            let mut stmt = tx.prepare("DELETE FROM visited WHERE sentence = ?1")?;
            for s in &descendants {
                deleted += stmt.execute([s])? as i64;
            }
        }
        tx.commit()?;
        debug!("trim {sentence:?}: modified {modified}, deleted {deleted}");
        Ok((modified, deleted))
    }

    /// Every row in canonical order; used by audits and the
    /// reproducibility tests.
    pub fn dump(&self) -> Result<Vec<NodeRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM visited ORDER BY sentence"
        ))?;
        let rows = stmt.query_map([], row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Store audit: returns the sentences whose letters are not
    /// contained in `bank`. A healthy tree returns nothing.
    pub fn verify(&self, bank: &LetterBank) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT sentence FROM visited ORDER BY sentence")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut bad = Vec::new();
        for row in rows {
            let sentence = row?;
            let frag = Fragment::new(&sentence);
            if bank.checked_subtract_bank(&frag.letters).is_none() {
                bad.push(sentence);
            }
        }
        Ok(bad)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeRecord> {
    let code: i64 = row.get(6)?;
    let status = NodeStatus::from_code(code)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(6, code))?;
    Ok(NodeRecord {
        sentence: row.get(0)?,
        parent: row.get(1)?,
        score: row.get(2)?,
        cumulative: row.get(3)?,
        mean_descendant: row.get(4)?,
        visits: row.get(5)?,
        status,
    })
}

/// Escapes LIKE wildcards so sentences containing `%` or `_` match
/// literally.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_tree() -> (TempDir, SearchTree) {
        let dir = TempDir::new().expect("tempdir");
        let tree = SearchTree::open(&dir.path().join("test.db")).expect("open");
        (dir, tree)
    }

    fn record(sentence: &str, score: f64, mean: f64, status: NodeStatus) -> NodeRecord {
        NodeRecord {
            sentence: sentence.to_string(),
            parent: crate::fragment::parent_of(sentence),
            score: Some(score),
            cumulative: Some(score),
            mean_descendant: Some(mean),
            visits: 1,
            status,
        }
    }

    #[test]
    fn get_put_round_trip() {
        let (_dir, tree) = temp_tree();
        assert!(tree.get("I").unwrap().is_none());
        let rec = record("I", -1.0, -4.0, NodeStatus::Open);
        tree.put(&rec).unwrap();
        assert_eq!(tree.get("I").unwrap().unwrap(), rec);
        assert_eq!(tree.len().unwrap(), 1);
    }

    #[test]
    fn put_upserts_on_conflict() {
        let (_dir, tree) = temp_tree();
        tree.put(&record("I", -1.0, -4.0, NodeStatus::Open)).unwrap();
        let mut updated = record("I", -2.0, -3.0, NodeStatus::Open);
        updated.visits = 5;
        tree.put(&updated).unwrap();
        assert_eq!(tree.len().unwrap(), 1);
        assert_eq!(tree.get("I").unwrap().unwrap().visits, 5);
    }

    #[test]
    fn infinities_survive_a_round_trip() {
        let (_dir, tree) = temp_tree();
        tree.put(&record("I win", f64::INFINITY, -1.0, NodeStatus::Open))
            .unwrap();
        tree.put(&record("I lose", f64::NEG_INFINITY, -1.0, NodeStatus::Invalid))
            .unwrap();
        assert_eq!(tree.get("I win").unwrap().unwrap().score, Some(f64::INFINITY));
        assert_eq!(
            tree.get("I lose").unwrap().unwrap().score,
            Some(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn children_are_found_by_parent() {
        let (_dir, tree) = temp_tree();
        tree.put(&record("I", -1.0, -1.0, NodeStatus::Open)).unwrap();
        tree.put(&record("I am", -2.0, -2.0, NodeStatus::Open)).unwrap();
        tree.put(&record("I do", -3.0, -3.0, NodeStatus::Invalid))
            .unwrap();
        tree.put(&record("I am so", -4.0, -4.0, NodeStatus::Open))
            .unwrap();
        let children = tree.children_of("I").unwrap();
        assert_eq!(
            children.iter().map(|c| c.sentence.as_str()).collect::<Vec<_>>(),
            vec!["I am", "I do"]
        );
        let demo = tree.children_demographics("I").unwrap();
        assert_eq!(demo.get(&0), Some(&1));
        assert_eq!(demo.get(&1), Some(&1));
    }

    #[test]
    fn top_children_order_by_score() {
        let (_dir, tree) = temp_tree();
        tree.put(&record("I a", -5.0, -1.0, NodeStatus::Open)).unwrap();
        tree.put(&record("I b", -1.0, -1.0, NodeStatus::Open)).unwrap();
        tree.put(&record("I c", -3.0, -1.0, NodeStatus::Open)).unwrap();
        tree.put(&NodeRecord::open("I d", "I")).unwrap();
        let top = tree.top_children("I", 3).unwrap();
        assert_eq!(
            top.iter().map(|c| c.sentence.as_str()).collect::<Vec<_>>(),
            vec!["I b", "I c", "I a"]
        );
    }

    #[test]
    fn top_descendants_are_strict_and_case_exact() {
        let (_dir, tree) = temp_tree();
        tree.put(&record("I", -1.0, -1.0, NodeStatus::Open)).unwrap();
        tree.put(&record("I am", -1.0, -9.0, NodeStatus::Open)).unwrap();
        tree.put(&record("I am so", -1.0, -2.0, NodeStatus::Open))
            .unwrap();
        // same letters, different case: not a descendant of "I"
        tree.put(&record("i am", -1.0, -1.0, NodeStatus::Open)).unwrap();
        let top = tree.top_descendants("I", 5).unwrap();
        assert_eq!(
            top.iter().map(|c| c.sentence.as_str()).collect::<Vec<_>>(),
            vec!["I am so", "I am"]
        );
    }

    #[test]
    fn trim_deletes_descendants_only() {
        let (_dir, mut tree) = temp_tree();
        tree.put(&record("I", -1.0, -1.0, NodeStatus::Open)).unwrap();
        tree.put(&record("I am", -1.0, -1.0, NodeStatus::Open)).unwrap();
        tree.put(&record("I am so", -1.0, -1.0, NodeStatus::Open))
            .unwrap();
        tree.put(&record("I ax", -1.0, -1.0, NodeStatus::Open)).unwrap();
        let (modified, deleted) = tree.trim("I am", None).unwrap();
        assert_eq!((modified, deleted), (0, 1));
        assert!(tree.get("I am so").unwrap().is_none());
        // the node itself and its siblings/ancestors survive
        assert_eq!(tree.get("I am").unwrap().unwrap().status, NodeStatus::Open);
        assert!(tree.get("I").unwrap().is_some());
        assert!(tree.get("I ax").unwrap().is_some());
    }

    #[test]
    fn trim_with_status_marks_the_node() {
        let (_dir, mut tree) = temp_tree();
        tree.put(&record("I am", -1.0, -1.0, NodeStatus::Open)).unwrap();
        tree.put(&record("I am so", -1.0, -1.0, NodeStatus::Open))
            .unwrap();
        let (modified, deleted) = tree.trim("I am", Some(NodeStatus::Excluded)).unwrap();
        assert_eq!((modified, deleted), (1, 1));
        assert_eq!(tree.get("I am").unwrap().unwrap().status, NodeStatus::Excluded);
        // repeating the trim reports the already-set status
        let (modified, deleted) = tree.trim("I am", Some(NodeStatus::Excluded)).unwrap();
        assert_eq!((modified, deleted), (-1, 0));
    }

    #[test]
    fn containing_word_matches_whole_tokens_only() {
        let (_dir, tree) = temp_tree();
        tree.put(&record("I am", -1.0, -1.0, NodeStatus::Open)).unwrap();
        tree.put(&record("I amble", -1.0, -1.0, NodeStatus::Open))
            .unwrap();
        tree.put(&record("am I", -1.0, -1.0, NodeStatus::Open)).unwrap();
        tree.put(&record("AM I", -1.0, -1.0, NodeStatus::Open)).unwrap();
        let rows = tree.containing_word("am").unwrap();
        assert_eq!(
            rows.iter().map(|r| r.sentence.as_str()).collect::<Vec<_>>(),
            vec!["I am", "am I"]
        );
    }

    #[test]
    fn verify_flags_rows_outside_the_bank() {
        let (_dir, tree) = temp_tree();
        let bank = LetterBank::from_str("I am");
        tree.put(&record("I am", -1.0, -1.0, NodeStatus::Open)).unwrap();
        tree.put(&record("I ax", -1.0, -1.0, NodeStatus::Open)).unwrap();
        assert_eq!(tree.verify(&bank).unwrap(), vec!["I ax".to_string()]);
    }

    #[test]
    fn put_all_is_transactional_and_visible() {
        let (_dir, mut tree) = temp_tree();
        let records = vec![
            record("I", -1.0, -1.0, NodeStatus::Open),
            record("I am", -2.0, -2.0, NodeStatus::Open),
        ];
        tree.put_all(&records).unwrap();
        assert_eq!(tree.len().unwrap(), 2);
    }
}
