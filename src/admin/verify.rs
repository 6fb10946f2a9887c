use std::collections::BTreeSet;

use serde::Serialize;

use crate::db::Db;
use crate::primitives::pager::{read_free_page, FreeListStore, Pager};
use crate::storage::btree::page::{HEADER, OFFSET_LEN, PTR_LEN};
use crate::storage::btree::{NodeKind, NodeStore};
use crate::types::{page::PAGE_SIZE, PageId, Result};

const MAX_FINDINGS: usize = 32;

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Non-critical issue, such as an unusually shaped tree.
    Warning,
    /// The file is inconsistent.
    Error,
}

/// A single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Human-readable description of the issue.
    pub message: String,
}

impl VerifyFinding {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Warning,
            message: message.into(),
        }
    }
}

/// What the verification walk examined.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Internal pages reached from the root.
    pub internal_pages: u64,
    /// Leaf pages reached from the root.
    pub leaf_pages: u64,
    /// User keys, sentinel excluded.
    pub keys: u64,
    /// Freelist chain nodes.
    pub freelist_nodes: u64,
    /// Page numbers listed on the freelist.
    pub free_pages: u64,
    /// Pages in use according to the meta page.
    pub flushed_pages: u64,
}

/// Complete report of a verification pass.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// Whether no error-level finding was recorded.
    pub success: bool,
    /// Issues discovered, capped at a fixed number.
    pub findings: Vec<VerifyFinding>,
    /// Statistics about the structures examined.
    pub counts: VerifyCounts,
}

/// Walks the committed tree and freelist of `db` and checks that:
///
/// - keys ascend strictly inside every node and the leftmost path starts
///   with the empty sentinel key;
/// - every internal key equals the first key of its child and every child
///   stays below the next separator;
/// - every node fits a page and all leaves sit at the same depth;
/// - freelist nodes carry consistent running totals;
/// - the meta page, tree pages, freelist nodes and free pages are disjoint
///   and together cover exactly `[0, flushed)`.
pub fn verify(db: &Db) -> Result<VerifyReport> {
    let pager = db.pager();
    let meta = pager.meta();
    let mut walk = Walk {
        pager,
        flushed: meta.flushed,
        findings: Vec::new(),
        counts: VerifyCounts {
            flushed_pages: meta.flushed,
            ..VerifyCounts::default()
        },
        owned: BTreeSet::from([PageId::NONE]),
        leaf_depth: None,
    };

    if !meta.root.is_none() {
        walk.node(meta.root, 1, None, None);
    }
    walk.freelist(meta.free_head);
    walk.coverage();

    let success = !walk
        .findings
        .iter()
        .any(|f| f.severity == VerifySeverity::Error);
    Ok(VerifyReport {
        success,
        findings: walk.findings,
        counts: walk.counts,
    })
}

struct Walk<'a> {
    pager: &'a Pager,
    flushed: u64,
    findings: Vec<VerifyFinding>,
    counts: VerifyCounts,
    owned: BTreeSet<PageId>,
    leaf_depth: Option<usize>,
}

impl Walk<'_> {
    fn push(&mut self, finding: VerifyFinding) {
        if self.findings.len() < MAX_FINDINGS {
            self.findings.push(finding);
        }
    }

    fn push_error(&mut self, message: impl Into<String>) {
        self.push(VerifyFinding::error(message));
    }

    /// Records `id` as owned; false when it is out of range or owned twice.
    fn claim(&mut self, id: PageId, what: &str) -> bool {
        if id.is_none() || id.0 >= self.flushed {
            self.push_error(format!("{what} page {id} outside [1, {})", self.flushed));
            return false;
        }
        if !self.owned.insert(id) {
            self.push_error(format!("{what} page {id} is referenced twice"));
            return false;
        }
        true
    }

    fn node(&mut self, id: PageId, depth: usize, low: Option<&[u8]>, high: Option<&[u8]>) {
        if !self.claim(id, "tree") {
            return;
        }
        let node = match self.pager.get(id) {
            Ok(node) => node,
            Err(err) => return self.push_error(format!("tree page {id}: {err}")),
        };
        let kind = match node.kind_at(id) {
            Ok(kind) => kind,
            Err(err) => return self.push_error(err.to_string()),
        };
        let count = node.count();
        let fixed = HEADER + (PTR_LEN + OFFSET_LEN) * count as usize;
        if fixed > PAGE_SIZE || node.size_bytes() > PAGE_SIZE {
            return self.push_error(format!("tree page {id} overflows the page"));
        }
        if count == 0 {
            return self.push_error(format!("tree page {id} is empty"));
        }
        let keys: Vec<Vec<u8>> = (0..count).map(|i| node.key(i).to_vec()).collect();
        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            self.push_error(format!("tree page {id} keys are not strictly ascending"));
        }
        match low {
            None if !keys[0].is_empty() => {
                self.push_error(format!("leftmost page {id} does not start with the sentinel"))
            }
            Some(low) if keys[0] != low => self.push_error(format!(
                "tree page {id} first key differs from its parent separator"
            )),
            _ => {}
        }
        if let Some(high) = high {
            if keys[keys.len() - 1].as_slice() >= high {
                self.push_error(format!("tree page {id} reaches past the next separator"));
            }
        }
        match kind {
            NodeKind::Leaf => {
                self.counts.leaf_pages += 1;
                self.counts.keys += keys.iter().filter(|k| !k.is_empty()).count() as u64;
                match self.leaf_depth {
                    Some(expected) if expected != depth => self.push_error(format!(
                        "leaf page {id} at depth {depth}, expected {expected}"
                    )),
                    Some(_) => {}
                    None => self.leaf_depth = Some(depth),
                }
            }
            NodeKind::Internal => {
                self.counts.internal_pages += 1;
                if count == 1 && depth == 1 {
                    self.push(VerifyFinding::warning(format!(
                        "root page {id} has a single child"
                    )));
                }
                for i in 0..count {
                    let idx = i as usize;
                    let child_low = if low.is_none() && i == 0 {
                        None
                    } else {
                        Some(keys[idx].as_slice())
                    };
                    let child_high = keys.get(idx + 1).map(Vec::as_slice).or(high);
                    self.node(node.ptr(i), depth + 1, child_low, child_high);
                }
            }
        }
    }

    fn freelist(&mut self, head: PageId) {
        let mut current = head;
        let mut expected_total: Option<u64> = None;
        while !current.is_none() {
            if !self.claim(current, "freelist") {
                return;
            }
            let node = match self.pager.read_page(current).and_then(|buf| read_free_page(&buf)) {
                Ok(node) => node,
                Err(err) => return self.push_error(format!("freelist page {current}: {err}")),
            };
            let size = node.pages.len() as u64;
            if let Some(total) = expected_total {
                if node.total != total {
                    self.push_error(format!(
                        "freelist page {current} total {} expected {total}",
                        node.total
                    ));
                }
            }
            if node.total < size {
                return self.push_error(format!("freelist page {current} total below its size"));
            }
            expected_total = Some(node.total - size);
            self.counts.freelist_nodes += 1;
            for page in &node.pages {
                if self.claim(*page, "free") {
                    self.counts.free_pages += 1;
                }
            }
            current = node.next;
        }
        if let Some(rest) = expected_total.filter(|rest| *rest != 0) {
            self.push_error(format!("freelist ends with {rest} items unaccounted for"));
        }
    }

    fn coverage(&mut self) {
        let missing = (0..self.flushed)
            .map(PageId)
            .filter(|id| !self.owned.contains(id))
            .count();
        if missing > 0 {
            let first = (0..self.flushed)
                .map(PageId)
                .find(|id| !self.owned.contains(id))
                .unwrap_or(PageId::NONE);
            self.push_error(format!("{missing} pages leaked, first is page {first}"));
        }
    }
}
