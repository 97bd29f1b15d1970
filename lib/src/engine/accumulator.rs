// Copyright (c) 2022-2023 The MobileCoin Foundation

/// Caches streamed input so only whole blocks are released
#[derive(Clone, Debug)]
pub struct BlockAccumulator {
    block: usize,
    cache: Vec<u8>,
}

impl BlockAccumulator {
    pub fn new(block: usize) -> Self {
        Self {
            block: block.max(1),
            cache: Vec::with_capacity(block),
        }
    }

    /// Add data, returning every whole block now available
    pub fn push(&mut self, data: &[u8]) -> Vec<u8> {
        self.cache.extend_from_slice(data);

        let whole = self.cache.len() - self.cache.len() % self.block;
        let rest = self.cache.split_off(whole);

        std::mem::replace(&mut self.cache, rest)
    }

    /// Take any cached partial block
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.cache)
    }

    /// Number of cached bytes
    pub fn pending(&self) -> usize {
        self.cache.len()
    }

    pub fn block_len(&self) -> usize {
        self.block
    }
}

impl Drop for BlockAccumulator {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.cache.zeroize();
    }
}
