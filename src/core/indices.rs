use hashbrown::HashSet;

use crate::types::{OpId, OpSeq};

/// Set of operation ids already durably applied, plus the log position it
/// reflects so it can be extended incrementally instead of rebuilt.
#[derive(Debug, Default)]
pub struct AppliedOpIndex {
    ids: HashSet<OpId>,
    through_seq: OpSeq,
    loaded: bool,
}

impl AppliedOpIndex {
    /// True once the index has been populated from the backend.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Highest sequence whose id is reflected in the index.
    pub fn through_seq(&self) -> OpSeq {
        self.through_seq
    }

    /// Adds ids read from the backend for the range ending at `through_seq`.
    pub fn extend(&mut self, ids: impl IntoIterator<Item = OpId>, through_seq: OpSeq) {
        self.ids.extend(ids);
        self.through_seq = self.through_seq.max(through_seq);
        self.loaded = true;
    }

    /// Records a freshly appended id. No-op until the index is loaded.
    pub fn record(&mut self, id: &str, seq: OpSeq) {
        if !self.loaded {
            return;
        }
        self.ids.insert(id.to_string());
        self.through_seq = self.through_seq.max(seq);
    }

    /// Membership test.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of known ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when no id is known.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Owned copy of the id set.
    pub fn to_set(&self) -> HashSet<OpId> {
        self.ids.clone()
    }
}
