use parking_lot::RwLock;
use parking_lot::RwLockReadGuard;
use parking_lot::RwLockWriteGuard;
use std::sync::Arc;

/// A convenience type alias for [Arc<RwLock<T>>].
///
/// Used for state that several builders may share, such as the
/// [NameTable](crate::builder::NameTable) that keeps emitted names unique.
///
/// # Example
///
/// ```
/// use relax::shared::Shared;
///
/// let lock: Shared<i32> = Shared::new(42.into());
/// assert_eq!(*lock.read(), 42);
/// ```
pub type Shared<T> = Arc<RwLock<T>>;

/// Short accessors around [RwLock].
///
/// Traversals are single threaded, so a lock that is already held means the
/// same thread is re-entering; [parking_lot]'s locks never poison, so there is
/// no error to handle.
///
/// # Example
///
/// ```
/// use relax::shared::Shared;
/// use relax::shared::SharedExt;
///
/// let lock: Shared<Vec<i32>> = Shared::new(vec![1].into());
/// lock.wr().push(2);
/// assert_eq!(lock.rd().len(), 2);
/// ```
pub trait SharedExt<T: ?Sized> {
    fn rd(&self) -> RwLockReadGuard<'_, T>;
    fn wr(&self) -> RwLockWriteGuard<'_, T>;
}

impl<T: ?Sized> SharedExt<T> for Shared<T> {
    fn rd(&self) -> RwLockReadGuard<'_, T> {
        self.read()
    }
    fn wr(&self) -> RwLockWriteGuard<'_, T> {
        self.write()
    }
}

#[test]
fn test_shared() {
    let lock: Shared<i32> = Shared::new(41.into());
    *lock.wr() += 1;
    assert_eq!(*lock.rd(), 42);
}
