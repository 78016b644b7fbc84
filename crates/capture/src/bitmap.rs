//! Pooled RGBA bitmaps with explicit ownership.
//!
//! Every frame handed out of the pool is accounted for until it is
//! released. The outstanding count makes leak checks cheap: after an
//! export finishes, on any path, it must read zero.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::trace;

#[derive(Debug, Default)]
struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    outstanding: AtomicUsize,
}

/// A reusable buffer pool for RGBA frame bitmaps.
///
/// Cloning shares the pool. Buffers are recycled on release so steady
/// state capture allocates nothing per frame.
#[derive(Debug, Clone, Default)]
pub struct BitmapPool {
    inner: Arc<PoolInner>,
}

impl BitmapPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a zeroable `width x height` RGBA buffer.
    pub fn acquire(&self, width: u32, height: u32) -> PooledBitmap {
        let len = width as usize * height as usize * 4;
        let mut data = self
            .inner
            .free
            .lock()
            .expect("bitmap pool poisoned")
            .pop()
            .unwrap_or_default();
        data.clear();
        data.resize(len, 0);
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
        PooledBitmap {
            width,
            height,
            data: Some(data),
            pool: self.clone(),
        }
    }

    /// Bitmaps currently checked out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::SeqCst)
    }

    /// Buffers sitting in the free list.
    pub fn pooled(&self) -> usize {
        self.inner.free.lock().expect("bitmap pool poisoned").len()
    }

    fn put_back(&self, data: Vec<u8>) {
        self.inner
            .free
            .lock()
            .expect("bitmap pool poisoned")
            .push(data);
        self.inner.outstanding.fetch_sub(1, Ordering::SeqCst);
        trace!(outstanding = self.outstanding(), "bitmap released");
    }
}

/// An owned RGBA bitmap checked out of a [`BitmapPool`].
///
/// Release is explicit via [`PooledBitmap::release`]; dropping without
/// releasing still returns the buffer, so cancellation paths cannot
/// leak frames.
#[derive(Debug)]
pub struct PooledBitmap {
    width: u32,
    height: u32,
    data: Option<Vec<u8>>,
    pool: BitmapPool,
}

impl PooledBitmap {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }

    /// Return the buffer to the pool.
    pub fn release(mut self) {
        if let Some(data) = self.data.take() {
            self.pool.put_back(data);
        }
    }
}

impl Drop for PooledBitmap {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.put_back(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_balance_the_count() {
        let pool = BitmapPool::new();
        let a = pool.acquire(4, 4);
        let b = pool.acquire(4, 4);
        assert_eq!(pool.outstanding(), 2);
        a.release();
        drop(b);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.pooled(), 2);
    }

    #[test]
    fn released_buffers_are_recycled() {
        let pool = BitmapPool::new();
        pool.acquire(2, 2).release();
        assert_eq!(pool.pooled(), 1);
        let again = pool.acquire(2, 2);
        assert_eq!(pool.pooled(), 0);
        assert_eq!(again.data().len(), 16);
        assert!(again.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn reacquired_buffer_resizes_to_the_new_dimensions() {
        let pool = BitmapPool::new();
        pool.acquire(8, 8).release();
        let small = pool.acquire(2, 2);
        assert_eq!(small.data().len(), 16);
    }
}
