use smallvec::SmallVec;

use crate::key::KeyId;

/// Sorted `(key, value)` pairs identifying one series of a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // Series carry at most a handful of tags.
    pairs: SmallVec<[(KeyId, KeyId); 4]>,
}

impl TagSet {
    /// Builds a set from pairs in any order. Later duplicates of a key are dropped.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        let mut pairs: SmallVec<[(KeyId, KeyId); 4]> = pairs.into_iter().collect();
        pairs.sort_by_key(|(k, _)| *k);
        pairs.dedup_by_key(|(k, _)| *k);
        Self { pairs }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.pairs.iter().copied()
    }

    pub fn get(&self, key: KeyId) -> Option<KeyId> {
        let idx = self.pairs.partition_point(|(k, _)| *k < key);
        self.pairs
            .get(idx)
            .and_then(|(k, v)| (*k == key).then_some(*v))
    }

    /// Keeps only the given keys.
    pub fn project(&self, keys: &[KeyId]) -> TagSet {
        let pairs = keys
            .iter()
            .filter_map(|k| self.get(*k).map(|v| (*k, v)))
            .collect::<SmallVec<[(KeyId, KeyId); 4]>>();
        TagSet::from_pairs(pairs)
    }
}
