//! Generic object pool.
//!
//! The realtime ("kernel") context must never allocate (spec.md §5). Pools
//! are filled ("fluffed") from the shell side during maintenance and drawn
//! down by either side; if the kernel ever has to allocate because a pool
//! ran dry, `Pool::checkout` logs a loud `tracing::error!` rather than
//! silently allocating, so the condition is visible without panicking the
//! audio thread.

use std::sync::Mutex;

use tracing::error;

/// Implemented by anything that lives in a `Pool`. `reset` clears
/// instance state before the object is handed out again.
pub trait Poolable: Default {
    fn reset(&mut self);
}

/// A bounded free list guarded by its own lock, per spec.md §5 ("each pool
/// has its own lock").
pub struct Pool<T: Poolable> {
    free: Mutex<Vec<Box<T>>>,
    high_water: usize,
    name: &'static str,
}

impl<T: Poolable> Pool<T> {
    pub fn new(name: &'static str, high_water: usize) -> Self {
        Self { free: Mutex::new(Vec::new()), high_water, name }
    }

    /// Take an object from the pool, or allocate one if empty. Allocating
    /// from the kernel context is a protocol violation; callers on that
    /// side are expected to have fluffed ahead of time. We can't observe
    /// which thread we're on here, so the caller passes `realtime` to
    /// make the violation visible.
    pub fn checkout(&self, realtime: bool) -> Box<T> {
        let mut free = self.free.lock().unwrap();
        match free.pop() {
            Some(mut obj) => {
                obj.reset();
                obj
            }
            None => {
                if realtime {
                    error!(pool = self.name, "realtime checkout forced an allocation, pool ran dry");
                }
                Box::new(T::default())
            }
        }
    }

    /// Return an object to the pool for reuse.
    pub fn checkin(&self, mut obj: Box<T>) {
        obj.reset();
        let mut free = self.free.lock().unwrap();
        if free.len() < self.high_water {
            free.push(obj);
        }
        // else: drop it, the pool is already full
    }

    /// Called during shell maintenance to top the pool up to its
    /// high-water mark ("fluffing") so the kernel never has to allocate.
    pub fn fluff(&self) {
        let mut free = self.free.lock().unwrap();
        while free.len() < self.high_water {
            free.push(Box::new(T::default()));
        }
    }

    pub fn available(&self) -> usize {
        self.free.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Widget {
        touched: bool,
    }

    impl Poolable for Widget {
        fn reset(&mut self) {
            self.touched = false;
        }
    }

    #[test]
    fn fluff_fills_to_high_water() {
        let pool: Pool<Widget> = Pool::new("widget", 4);
        pool.fluff();
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn checkout_checkin_round_trip() {
        let pool: Pool<Widget> = Pool::new("widget", 2);
        pool.fluff();
        let mut w = pool.checkout(true);
        w.touched = true;
        pool.checkin(w);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn checkout_on_empty_pool_allocates() {
        let pool: Pool<Widget> = Pool::new("widget", 0);
        let w = pool.checkout(false);
        assert!(!w.touched);
    }
}
