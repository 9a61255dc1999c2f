use rayon::prelude::*;

/// Data-parallel dispatch of element-wise work.
///
/// Elements are grouped into independent blocks of `threads_per_block`
/// elements and the blocks are executed on the rayon thread pool. Nothing is
/// shared between blocks and the output keeps the input order.
#[derive(Copy, Clone, Debug)]
pub struct BlockDispatch {
    threads_per_block: usize,
}

impl BlockDispatch {
    pub fn new(threads_per_block: usize) -> Self {
        BlockDispatch {
            threads_per_block: threads_per_block.max(1),
        }
    }

    pub fn threads_per_block(&self) -> usize {
        self.threads_per_block
    }

    pub fn blocks(&self, elements: usize) -> usize {
        (elements + self.threads_per_block - 1) / self.threads_per_block
    }

    pub fn map<I, O, F>(&self, input: &[I], kernel: F) -> Vec<O>
    where
        I: Sync,
        O: Send,
        F: Fn(&I) -> O + Sync,
    {
        let blocks: Vec<Vec<O>> = input
            .par_chunks(self.threads_per_block)
            .map(|block| block.iter().map(&kernel).collect())
            .collect();
        blocks.into_iter().flatten().collect()
    }
}
