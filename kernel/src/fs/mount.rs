// SPDX-License-Identifier: MPL-2.0

//! The `mount` operation.
//!
//! Mounting happens in four steps:
//!
//! 1. The source is classified: it is resolved to a block driver, an MTD
//!    driver or nothing, and the file system type is looked up among the
//!    types of that class.
//! 2. The namespace lock is taken and the target is claimed, either by
//!    finding a plain inode or a directory there, or by reserving a new one.
//! 3. The file system is bound to the driver. The lock stays held.
//! 4. The target becomes a mountpoint, or everything is rolled back.
//!
//! Each resource acquired on the way is owned by a guard that gives it back
//! when dropped, so every early return unwinds exactly what was acquired.

use crate::{
    fs::{
        driver::{DriverRef, DriverResolver, ResolveError},
        namespace::{InodeId, InodeNamespace, InodeTree, InodeType, MountBinding, Reservation},
        registry::{BackingClass, FsOperations, FsRegistry},
    },
    prelude::*,
};

bitflags! {
    /// Flags of `mount`.
    pub struct MountFlags: u32 {
        const MS_RDONLY        =   1 << 0;       // Mount read-only.
        const MS_NOSUID        =   1 << 1;       // Ignore suid and sgid bits.
        const MS_NODEV         =   1 << 2;       // Disallow access to device special files.
        const MS_NOEXEC        =   1 << 3;       // Disallow program execution.
        const MS_SYNCHRONOUS   =   1 << 4;       // Writes are synced at once.
        const MS_REMOUNT       =   1 << 5;       // Alter flags of a mounted FS.
        const MS_MANDLOCK      =   1 << 6;       // Allow mandatory locks on an FS.
        const MS_DIRSYNC       =   1 << 7;       // Directory modifications are synchronous.
        const MS_NOATIME       =   1 << 10;      // Do not update access times.
        const MS_NODIRATIME    =   1 << 11;      // Do not update directory access times.
    }
}

/// A mounted file system, as listed by [`MountService::mounts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub path: String,
    pub fs_type: &'static str,
}

/// The mount core: the file system registry, the namespace it mounts into,
/// and the resolver used to find backing drivers.
pub struct MountService {
    registry: FsRegistry,
    namespace: Arc<InodeNamespace>,
    resolver: Arc<dyn DriverResolver>,
}

impl MountService {
    pub fn new(
        registry: FsRegistry,
        namespace: Arc<InodeNamespace>,
        resolver: Arc<dyn DriverResolver>,
    ) -> Self {
        Self {
            registry,
            namespace,
            resolver,
        }
    }

    pub fn registry(&self) -> &FsRegistry {
        &self.registry
    }

    pub fn namespace(&self) -> &Arc<InodeNamespace> {
        &self.namespace
    }

    /// Mounts a file system of type `filesystemtype` at `target`.
    ///
    /// `source` names the backing driver, if the file system needs one.
    /// `options` is handed to the file system as is.
    ///
    /// On success the target is a mountpoint that keeps one reference on its
    /// inode, and the file system holds one reference on the driver, until
    /// the file system is unmounted. On failure nothing has changed.
    ///
    /// # Errors
    ///
    /// * `ENOSYS` if no file system is compiled in.
    /// * `EINVAL` if `target` or `filesystemtype` is missing, or `target` is
    ///   malformed.
    /// * `ENOENT` if `target` is empty.
    /// * `ENODEV` if no file system of that type fits the source.
    /// * `ENOTBLK` if `source` cannot be resolved to a usable driver.
    /// * `ENOTDIR` if a special inode, such as a driver, lives at `target`.
    /// * `EBUSY` if `target` is the root, is already a mountpoint or lies in
    ///   one.
    /// * `EEXIST`, `ENOMEM` if the target inode cannot be reserved.
    /// * Whatever the file system's `bind` fails with.
    pub fn mount(
        &self,
        source: Option<&str>,
        target: Option<&str>,
        filesystemtype: Option<&str>,
        flags: MountFlags,
        options: Option<&[u8]>,
    ) -> Result<()> {
        if self.registry.is_empty() {
            error!("no file systems are compiled in");
            return_errno_with_message!(Errno::ENOSYS, "no file systems are compiled in");
        }
        let (Some(target), Some(fs_type)) = (target, filesystemtype) else {
            return_errno_with_message!(Errno::EINVAL, "target and file system type are required");
        };
        if target.is_empty() {
            return_errno_with_message!(Errno::ENOENT, "target is empty");
        }
        debug!(
            "source = {:?}, target = {:?}, fs_type = {:?}, flags = {:?}",
            source, target, fs_type, flags
        );

        let MountSource {
            fs_type,
            ops,
            driver,
        } = self.classify_source(source, fs_type, flags)?;

        let mut tree = self.namespace.lock();
        let candidate = MountCandidate::claim(&mut tree, target).inspect_err(|err| {
            error!("failed to claim mountpoint {}: {}", target, err);
        })?;

        // The driver reference handed over to the file system. A failed bind
        // drops it, which gives it back.
        let handle = ops
            .bind(driver.clone(), options, flags)
            .inspect_err(|err| error!("failed to bind {} at {}: {}", fs_type, target, err))?;

        candidate.commit(MountBinding::new(fs_type, ops, handle))?;
        drop(tree);

        info!("mounted {} at {}", fs_type, target);
        // `driver` is dropped here, giving back the reference taken by the
        // resolver. The file system keeps its own.
        Ok(())
    }

    /// Lists the mounted file systems, ordered by path.
    pub fn mounts(&self) -> Vec<MountInfo> {
        let mut mounts = Vec::new();
        self.namespace.for_each_mountpoint(|path, binding| {
            mounts.push(MountInfo {
                path: path.to_string(),
                fs_type: binding.fs_type(),
            });
        });
        mounts
    }

    /// Finds the file system type and, if it needs one, its driver.
    ///
    /// Block drivers are tried first, then MTD drivers, then driver-less
    /// file systems.
    fn classify_source(
        &self,
        source: Option<&str>,
        fs_type: &str,
        flags: MountFlags,
    ) -> Result<MountSource> {
        if let Some(source) = source {
            if BackingClass::Block.is_compiled_in() {
                match self.resolver.resolve_block(source, flags) {
                    Ok(driver) => return self.with_driver(BackingClass::Block, fs_type, driver),
                    Err(ResolveError::Failed(err)) => {
                        error!("block driver {} is unusable: {}", source, err);
                        return_errno_with_message!(Errno::ENOTBLK, "the source is unusable");
                    }
                    Err(_) => {}
                }
            }
            if BackingClass::Mtd.is_compiled_in() {
                match self.resolver.resolve_mtd(source) {
                    Ok(driver) => return self.with_driver(BackingClass::Mtd, fs_type, driver),
                    Err(ResolveError::Failed(err)) => {
                        error!("MTD driver {} is unusable: {}", source, err);
                        return_errno_with_message!(Errno::ENOTBLK, "the source is unusable");
                    }
                    Err(_) => {}
                }
            }
        }

        if BackingClass::Pseudo.is_compiled_in() {
            if let Some(entry) = self.registry.find_entry(BackingClass::Pseudo, fs_type) {
                return Ok(MountSource {
                    fs_type: entry.name(),
                    ops: entry.ops().clone(),
                    driver: None,
                });
            }
        }

        match source {
            Some(source) => {
                error!("failed to find block driver {}", source);
                return_errno_with_message!(Errno::ENOTBLK, "the source is not a driver");
            }
            None => {
                error!("failed to find file system {}", fs_type);
                return_errno_with_message!(Errno::ENODEV, "unknown file system type");
            }
        }
    }

    fn with_driver(
        &self,
        class: BackingClass,
        fs_type: &str,
        driver: DriverRef,
    ) -> Result<MountSource> {
        // On failure `driver` is dropped, so the resolved driver keeps no
        // extra reference.
        let Some(entry) = self.registry.find_entry(class, fs_type) else {
            error!("failed to find {:?} based file system {}", class, fs_type);
            return_errno_with_message!(Errno::ENODEV, "no file system of this type fits the driver");
        };
        Ok(MountSource {
            fs_type: entry.name(),
            ops: entry.ops().clone(),
            driver: Some(driver),
        })
    }
}

/// The outcome of classifying the source.
struct MountSource {
    fs_type: &'static str,
    ops: Arc<dyn FsOperations>,
    driver: Option<DriverRef>,
}

/// The inode a file system is about to be mounted on.
///
/// Unless committed, dropping the candidate puts the namespace back the way
/// it was: a found inode gets its search reference back, a reserved inode
/// is removed with the directories reserved along with it.
struct MountCandidate<'a> {
    tree: &'a mut InodeTree,
    inode: InodeId,
    reservation: Option<Reservation>,
    committed: bool,
}

impl<'a> MountCandidate<'a> {
    fn claim(tree: &'a mut InodeTree, target: &str) -> Result<Self> {
        let hit = match tree.search(target) {
            Ok(hit) => hit,
            Err(err) if err.error() == Errno::ENOENT => {
                let reservation = tree.reserve(target)?;
                return Ok(Self {
                    tree,
                    inode: reservation.inode(),
                    reservation: Some(reservation),
                    committed: false,
                });
            }
            Err(err) => return Err(err),
        };

        // Mounting over the root would hide every other inode, drivers
        // included.
        if hit.inode() == tree.root() {
            tree.release(hit.inode())?;
            return_errno_with_message!(Errno::EBUSY, "the root cannot be a mountpoint");
        }

        let type_ = hit.type_();
        if type_.is_special() {
            tree.release(hit.inode())?;
            if type_ == InodeType::Mountpoint {
                return_errno_with_message!(Errno::EBUSY, "the target is already mounted");
            }
            return_errno_with_message!(Errno::ENOTDIR, "the target is a special inode");
        }

        Ok(Self {
            tree,
            inode: hit.inode(),
            reservation: None,
            committed: false,
        })
    }

    /// Makes the candidate a mountpoint.
    ///
    /// A found inode keeps its search reference as the mountpoint's
    /// reference; a reserved inode gains one.
    fn commit(mut self, binding: MountBinding) -> Result<()> {
        let take_reference = self.reservation.is_some();
        self.tree
            .publish_mountpoint(self.inode, binding, take_reference)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for MountCandidate<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        match self.reservation.take() {
            Some(reservation) => self.tree.unreserve(reservation),
            None => {
                if let Err(err) = self.tree.release(self.inode) {
                    error!("failed to release the mount candidate: {}", err);
                }
            }
        }
    }
}
