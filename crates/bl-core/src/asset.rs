//! Sample asset store.
//!
//! The scheduler never loads or decodes files; a collaborator inserts
//! decoded assets here and clips reference them by key. Assets are
//! reference counted so an in-flight render keeps its source alive
//! even if the asset is removed from the table.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use arrayvec::ArrayString;
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Key for referencing assets in the sample table.
    pub struct AssetKey;
}

/// An immutable, decoded sample asset in planar f32.
#[derive(Clone, Debug)]
pub struct SampleAsset {
    /// Asset name
    pub name: ArrayString<32>,
    /// Native sample rate of the data
    pub sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl SampleAsset {
    /// Create an asset from planar channel data. All channels must be
    /// equal length.
    pub fn new(name: &str, sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        debug_assert!(channels.windows(2).all(|w| w[0].len() == w[1].len()));
        let mut n = ArrayString::new();
        let _ = n.try_push_str(name);
        Self { name: n, sample_rate, channels }
    }

    /// Number of frames.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    /// One channel's sample data.
    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.channels[ch]
    }

    /// Read a sample, folding out-of-range positions to silence.
    pub fn sample(&self, ch: usize, frame: usize) -> f32 {
        self.channels
            .get(ch.min(self.channels.len().saturating_sub(1)))
            .and_then(|c| c.get(frame))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Content-addressed table of sample assets.
#[derive(Default)]
pub struct SampleTable {
    assets: SlotMap<AssetKey, Arc<SampleAsset>>,
    by_hash: BTreeMap<u64, AssetKey>,
}

impl SampleTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an asset under its content hash, returning its key.
    /// Re-inserting an existing hash returns the existing key.
    pub fn insert(&mut self, hash: u64, asset: SampleAsset) -> AssetKey {
        if let Some(&key) = self.by_hash.get(&hash) {
            return key;
        }
        let key = self.assets.insert(Arc::new(asset));
        self.by_hash.insert(hash, key);
        key
    }

    /// Get a shared handle to an asset.
    pub fn get(&self, key: AssetKey) -> Option<&Arc<SampleAsset>> {
        self.assets.get(key)
    }

    /// Look up an asset key by content hash.
    pub fn lookup(&self, hash: u64) -> Option<AssetKey> {
        self.by_hash.get(&hash).copied()
    }

    /// Remove an asset from the table. Outstanding `Arc` handles keep
    /// the data alive until they drop.
    pub fn remove(&mut self, hash: u64) -> Option<Arc<SampleAsset>> {
        let key = self.by_hash.remove(&hash)?;
        self.assets.remove(key)
    }

    /// Number of assets.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Returns true if the table holds no assets.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn mono_asset(data: Vec<f32>) -> SampleAsset {
        SampleAsset::new("test", 44100, vec![data])
    }

    #[test]
    fn insert_and_lookup_by_hash() {
        let mut table = SampleTable::new();
        let key = table.insert(0xABCD, mono_asset(vec![0.5; 8]));
        assert_eq!(table.lookup(0xABCD), Some(key));
        assert_eq!(table.get(key).unwrap().frames(), 8);
    }

    #[test]
    fn duplicate_hash_returns_same_key() {
        let mut table = SampleTable::new();
        let a = table.insert(1, mono_asset(vec![0.0; 4]));
        let b = table.insert(1, mono_asset(vec![1.0; 4]));
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_keeps_outstanding_handles_alive() {
        let mut table = SampleTable::new();
        let key = table.insert(9, mono_asset(vec![0.25; 4]));
        let handle = table.get(key).unwrap().clone();
        table.remove(9);
        assert!(table.get(key).is_none());
        assert_eq!(handle.sample(0, 2), 0.25);
    }

    #[test]
    fn out_of_range_read_is_silence() {
        let asset = mono_asset(vec![1.0; 4]);
        assert_eq!(asset.sample(0, 100), 0.0);
        assert_eq!(asset.sample(3, 0), 1.0); // channel folds to last
    }
}
