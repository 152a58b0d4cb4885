// SPDX-License-Identifier: MPL-2.0

//! Backing drivers of mountable file systems.
//!
//! A driver is owned by whoever registered it. The mount core only counts
//! references on it: a [`DriverRef`] is one counted reference, taken when
//! the driver is resolved or when a `DriverRef` is cloned, and given back
//! when it is dropped.

use core::{
    ops::Deref,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{
    fs::{
        mount::MountFlags,
        namespace::{InodeNamespace, SpecialKind},
    },
    prelude::*,
};

/// The kind of storage a driver exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverClass {
    Block,
    Mtd,
}

/// A backing driver.
///
/// Cloning a `DriverHandle` does not count as a reference; use
/// [`DriverHandle::acquire`] for that.
#[derive(Clone)]
pub struct DriverHandle {
    inner: Arc<DriverInner>,
}

struct DriverInner {
    name: String,
    class: DriverClass,
    writable: bool,
    refs: AtomicUsize,
    device: Option<Arc<dyn Any + Send + Sync>>,
}

impl DriverHandle {
    /// Creates a writable driver.
    pub fn new(name: &str, class: DriverClass) -> Self {
        Self::build(name, class, true, None)
    }

    /// Creates a driver that can only be mounted with `MS_RDONLY`.
    pub fn new_read_only(name: &str, class: DriverClass) -> Self {
        Self::build(name, class, false, None)
    }

    /// Creates a writable driver wrapping a device object.
    ///
    /// File systems get the device back with [`DriverHandle::device`].
    pub fn with_device(name: &str, class: DriverClass, device: Arc<dyn Any + Send + Sync>) -> Self {
        Self::build(name, class, true, Some(device))
    }

    fn build(
        name: &str,
        class: DriverClass,
        writable: bool,
        device: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                name: name.to_string(),
                class,
                writable,
                refs: AtomicUsize::new(0),
                device,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn class(&self) -> DriverClass {
        self.inner.class
    }

    pub fn is_writable(&self) -> bool {
        self.inner.writable
    }

    /// Gets the device object, if it is of type `T`.
    pub fn device<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.device.as_ref()?.downcast_ref::<T>()
    }

    /// Gets the number of outstanding counted references.
    pub fn ref_count(&self) -> usize {
        self.inner.refs.load(Ordering::Acquire)
    }

    /// Takes a counted reference.
    pub fn acquire(&self) -> DriverRef {
        self.inner.refs.fetch_add(1, Ordering::AcqRel);
        DriverRef {
            handle: self.clone(),
        }
    }

    /// Returns whether both handles refer to the same driver.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for DriverHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DriverHandle")
            .field("name", &self.inner.name)
            .field("class", &self.inner.class)
            .field("writable", &self.inner.writable)
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// One counted reference on a driver.
///
/// Cloning takes another reference; dropping gives one back.
#[derive(Debug)]
pub struct DriverRef {
    handle: DriverHandle,
}

impl DriverRef {
    pub fn handle(&self) -> &DriverHandle {
        &self.handle
    }
}

impl Clone for DriverRef {
    fn clone(&self) -> Self {
        self.handle.acquire()
    }
}

impl Deref for DriverRef {
    type Target = DriverHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for DriverRef {
    fn drop(&mut self) {
        let old = self.handle.inner.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old > 0);
    }
}

/// Why a source could not be resolved to a driver of some class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// Nothing is known under the source name.
    NotFound,
    /// The source names a driver of another class.
    WrongClass,
    /// The source names a driver of this class that cannot be used.
    Failed(Error),
}

impl ResolveError {
    /// Returns whether the next class of drivers should be tried.
    pub fn falls_through(&self) -> bool {
        matches!(self, ResolveError::NotFound | ResolveError::WrongClass)
    }
}

/// Resolves the `source` argument of `mount` to a driver.
///
/// Both methods hand one counted reference to the caller on success.
pub trait DriverResolver: Send + Sync {
    fn resolve_block(
        &self,
        source: &str,
        flags: MountFlags,
    ) -> core::result::Result<DriverRef, ResolveError>;

    fn resolve_mtd(&self, source: &str) -> core::result::Result<DriverRef, ResolveError>;
}

/// Resolves drivers registered as special inodes of a namespace.
///
/// A block driver registered at `/dev/mmcsd0` with
/// [`SpecialKind::BlockDriver`] is the source `"/dev/mmcsd0"`.
pub struct NamespaceResolver {
    namespace: Arc<InodeNamespace>,
}

impl NamespaceResolver {
    pub fn new(namespace: Arc<InodeNamespace>) -> Self {
        Self { namespace }
    }

    fn resolve(
        &self,
        source: &str,
        class: DriverClass,
        flags: MountFlags,
    ) -> core::result::Result<DriverRef, ResolveError> {
        let mut tree = self.namespace.lock();
        // A source that is not a path, or a path into a mounted file system,
        // cannot be a driver.
        let hit = tree.search(source).map_err(|_| ResolveError::NotFound)?;
        let resolved = if !hit.relpath().is_empty() {
            Err(ResolveError::NotFound)
        } else {
            match tree.special(hit.inode()) {
                Ok(Some(SpecialKind::BlockDriver(handle))) if class == DriverClass::Block => {
                    if !handle.is_writable() && !flags.contains(MountFlags::MS_RDONLY) {
                        Err(ResolveError::Failed(Error::with_message(
                            Errno::EACCES,
                            "the block driver is read-only",
                        )))
                    } else {
                        Ok(handle.acquire())
                    }
                }
                Ok(Some(SpecialKind::MtdDriver(handle))) if class == DriverClass::Mtd => {
                    Ok(handle.acquire())
                }
                Ok(_) => Err(ResolveError::WrongClass),
                Err(err) => Err(ResolveError::Failed(err)),
            }
        };

        if let Err(err) = tree.release(hit.inode()) {
            error!("failed to release driver inode {}: {}", source, err);
        }
        resolved
    }
}

impl DriverResolver for NamespaceResolver {
    fn resolve_block(
        &self,
        source: &str,
        flags: MountFlags,
    ) -> core::result::Result<DriverRef, ResolveError> {
        self.resolve(source, DriverClass::Block, flags)
    }

    fn resolve_mtd(&self, source: &str) -> core::result::Result<DriverRef, ResolveError> {
        self.resolve(source, DriverClass::Mtd, MountFlags::empty())
    }
}
