// SPDX-License-Identifier: MPL-2.0

//! The table of compiled-in file system types.
//!
//! A file system type is found by its backing class and its name. The table
//! is assembled once at startup with [`FsRegistry::builder`] and never
//! changes afterwards; there is no way to load a file system at runtime.

use crate::{
    config,
    fs::{driver::DriverRef, mount::MountFlags},
    prelude::*,
};

/// The opaque, file-system-specific state produced by a successful bind.
///
/// The mount core never looks inside; it only keeps the handle alive on the
/// mountpoint until the file system is unmounted.
pub type FsHandle = Arc<dyn Any + Send + Sync>;

/// What a file system type requires from its backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackingClass {
    /// The file system is bound to a block driver (e.g. `vfat`, `romfs`).
    Block,
    /// The file system is bound to an MTD driver (e.g. `spiffs`).
    Mtd,
    /// The file system needs no driver (e.g. `tmpfs`, `procfs`, `nfs`).
    Pseudo,
}

impl BackingClass {
    /// Returns whether file systems of this class are compiled in.
    pub const fn is_compiled_in(self) -> bool {
        match self {
            BackingClass::Block => config::block_fs_enabled(),
            BackingClass::Mtd => config::mtd_fs_enabled(),
            BackingClass::Pseudo => config::pseudo_fs_enabled(),
        }
    }
}

/// The operations a file system type exposes to the mount core.
///
/// Other operations of a mounted file system (reading, unlinking,
/// unbinding...) are dispatched through the handle returned by `bind`
/// and do not concern the mount core.
pub trait FsOperations: Send + Sync + 'static {
    /// Binds a new instance of the file system to `driver`.
    ///
    /// `driver` is `Some` exactly when the file system type was found through
    /// a block or MTD driver. It is a counted reference that the mount core
    /// hands over to the file system: keeping it in the returned handle keeps
    /// the driver referenced for as long as the instance lives, and dropping
    /// it (for instance by returning an error) gives the reference back.
    ///
    /// `options` is passed through from the caller of `mount` untouched.
    ///
    /// The namespace lock is held while this method runs, so it must not
    /// touch the inode namespace.
    fn bind(
        &self,
        driver: Option<DriverRef>,
        options: Option<&[u8]>,
        flags: MountFlags,
    ) -> Result<FsHandle>;
}

/// One compiled-in file system type.
#[derive(Clone)]
pub struct FsEntry {
    class: BackingClass,
    name: &'static str,
    ops: Arc<dyn FsOperations>,
}

impl FsEntry {
    /// Gets the backing class.
    pub fn class(&self) -> BackingClass {
        self.class
    }

    /// Gets the name of this FS type such as `"vfat"` or `"tmpfs"`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Gets the operations.
    pub fn ops(&self) -> &Arc<dyn FsOperations> {
        &self.ops
    }
}

impl Debug for FsEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FsEntry")
            .field("class", &self.class)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The immutable table of file system types.
#[derive(Debug, Clone, Default)]
pub struct FsRegistry {
    entries: Vec<FsEntry>,
}

impl FsRegistry {
    /// Starts assembling a registry.
    pub fn builder() -> FsRegistryBuilder {
        FsRegistryBuilder {
            entries: Vec::new(),
        }
    }

    /// Looks up a FS type of the given class.
    ///
    /// Names are compared exactly and the first matching entry wins.
    pub fn look_up(&self, class: BackingClass, name: &str) -> Option<Arc<dyn FsOperations>> {
        self.find_entry(class, name).map(|entry| entry.ops.clone())
    }

    /// Finds the entry of a FS type of the given class.
    pub fn find_entry(&self, class: BackingClass, name: &str) -> Option<&FsEntry> {
        self.entries
            .iter()
            .find(|entry| entry.class == class && entry.name == name)
    }

    /// Returns whether no file system is compiled in at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over the entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &FsEntry> {
        self.entries.iter()
    }
}

/// Assembles an [`FsRegistry`].
pub struct FsRegistryBuilder {
    entries: Vec<FsEntry>,
}

impl FsRegistryBuilder {
    /// Adds a FS type of the given class.
    ///
    /// Entries of a class that is not compiled in are dropped.
    pub fn register(
        mut self,
        class: BackingClass,
        name: &'static str,
        ops: Arc<dyn FsOperations>,
    ) -> Self {
        if !class.is_compiled_in() {
            warn!("{:?} file systems are not compiled in, dropping {}", class, name);
            return self;
        }

        if self
            .entries
            .iter()
            .any(|entry| entry.class == class && entry.name == name)
        {
            warn!(
                "{:?} file system {} registered twice, the first one wins",
                class, name
            );
        }

        self.entries.push(FsEntry { class, name, ops });
        self
    }

    /// Adds a FS type bound to block drivers.
    pub fn block(self, name: &'static str, ops: Arc<dyn FsOperations>) -> Self {
        self.register(BackingClass::Block, name, ops)
    }

    /// Adds a FS type bound to MTD drivers.
    pub fn mtd(self, name: &'static str, ops: Arc<dyn FsOperations>) -> Self {
        self.register(BackingClass::Mtd, name, ops)
    }

    /// Adds a FS type that needs no driver.
    pub fn pseudo(self, name: &'static str, ops: Arc<dyn FsOperations>) -> Self {
        self.register(BackingClass::Pseudo, name, ops)
    }

    pub fn build(self) -> FsRegistry {
        debug!("{} file system types compiled in", self.entries.len());
        FsRegistry {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct NamedFs(&'static str);

    impl FsOperations for NamedFs {
        fn bind(
            &self,
            _driver: Option<DriverRef>,
            _options: Option<&[u8]>,
            _flags: MountFlags,
        ) -> Result<FsHandle> {
            Ok(Arc::new(self.0))
        }
    }

    fn bound_name(ops: &Arc<dyn FsOperations>) -> &'static str {
        let handle = ops.bind(None, None, MountFlags::empty()).unwrap();
        *handle.downcast_ref::<&'static str>().unwrap()
    }

    #[cfg(all(feature = "block_fs", feature = "mtd_fs", feature = "pseudo_fs"))]
    #[test]
    fn look_up_respects_class() {
        let registry = FsRegistry::builder()
            .block("vfat", Arc::new(NamedFs("fat")))
            .mtd("spiffs", Arc::new(NamedFs("spiffs")))
            .pseudo("tmpfs", Arc::new(NamedFs("tmpfs")))
            .build();

        assert_eq!(registry.len(), 3);
        assert!(registry.look_up(BackingClass::Block, "vfat").is_some());
        assert!(registry.look_up(BackingClass::Mtd, "vfat").is_none());
        assert!(registry.look_up(BackingClass::Pseudo, "vfat").is_none());
        assert!(registry.look_up(BackingClass::Mtd, "spiffs").is_some());
        assert!(registry.look_up(BackingClass::Pseudo, "tmpfs").is_some());
        assert!(registry.look_up(BackingClass::Block, "VFAT").is_none());
        assert!(registry.look_up(BackingClass::Block, "vfa").is_none());

        let entry = registry.find_entry(BackingClass::Mtd, "spiffs").unwrap();
        assert_eq!(entry.class(), BackingClass::Mtd);
        assert_eq!(entry.name(), "spiffs");
    }

    #[cfg(all(feature = "block_fs", feature = "mtd_fs"))]
    #[test]
    fn one_name_in_several_classes() {
        let registry = FsRegistry::builder()
            .block("romfs", Arc::new(NamedFs("romfs-block")))
            .mtd("romfs", Arc::new(NamedFs("romfs-mtd")))
            .build();

        let block = registry.look_up(BackingClass::Block, "romfs").unwrap();
        let mtd = registry.look_up(BackingClass::Mtd, "romfs").unwrap();
        assert_eq!(bound_name(&block), "romfs-block");
        assert_eq!(bound_name(&mtd), "romfs-mtd");
    }

    #[cfg(feature = "pseudo_fs")]
    #[test]
    fn first_registration_wins() {
        let registry = FsRegistry::builder()
            .pseudo("tmpfs", Arc::new(NamedFs("first")))
            .pseudo("tmpfs", Arc::new(NamedFs("second")))
            .build();

        let ops = registry.look_up(BackingClass::Pseudo, "tmpfs").unwrap();
        assert_eq!(bound_name(&ops), "first");
        assert_eq!(registry.len(), 2);
    }

    #[cfg(all(feature = "block_fs", feature = "pseudo_fs"))]
    #[test]
    fn iteration_keeps_registration_order() {
        let registry = FsRegistry::builder()
            .pseudo("procfs", Arc::new(NamedFs("procfs")))
            .block("vfat", Arc::new(NamedFs("fat")))
            .pseudo("nfs", Arc::new(NamedFs("nfs")))
            .build();

        let names: Vec<_> = registry.iter().map(|entry| entry.name()).collect();
        assert_eq!(names, ["procfs", "vfat", "nfs"]);
        assert!(!registry.is_empty());
        assert!(FsRegistry::default().is_empty());
    }

    #[test]
    fn classes_follow_features() {
        assert_eq!(BackingClass::Block.is_compiled_in(), cfg!(feature = "block_fs"));
        assert_eq!(BackingClass::Mtd.is_compiled_in(), cfg!(feature = "mtd_fs"));
        assert_eq!(BackingClass::Pseudo.is_compiled_in(), cfg!(feature = "pseudo_fs"));
    }

    #[test]
    fn registrations_of_compiled_out_classes_are_dropped() {
        let registry = FsRegistry::builder()
            .block("vfat", Arc::new(NamedFs("fat")))
            .mtd("spiffs", Arc::new(NamedFs("spiffs")))
            .pseudo("tmpfs", Arc::new(NamedFs("tmpfs")))
            .build();

        let expected = [
            (BackingClass::Block, "vfat"),
            (BackingClass::Mtd, "spiffs"),
            (BackingClass::Pseudo, "tmpfs"),
        ];
        for (class, name) in expected {
            assert_eq!(
                registry.find_entry(class, name).is_some(),
                class.is_compiled_in(),
                "{:?} {}",
                class,
                name
            );
        }
        assert!(registry.iter().all(|entry| entry.class().is_compiled_in()));
    }

    #[cfg(not(feature = "block_fs"))]
    #[test]
    fn block_registration_dropped() {
        let registry = FsRegistry::builder()
            .block("vfat", Arc::new(NamedFs("fat")))
            .build();
        assert!(registry.is_empty());
        assert!(registry.look_up(BackingClass::Block, "vfat").is_none());
    }

    #[cfg(not(feature = "mtd_fs"))]
    #[test]
    fn mtd_registration_dropped() {
        let registry = FsRegistry::builder()
            .mtd("spiffs", Arc::new(NamedFs("spiffs")))
            .build();
        assert!(registry.is_empty());
        assert!(registry.look_up(BackingClass::Mtd, "spiffs").is_none());
    }

    #[cfg(not(feature = "pseudo_fs"))]
    #[test]
    fn pseudo_registration_dropped() {
        let registry = FsRegistry::builder()
            .pseudo("tmpfs", Arc::new(NamedFs("tmpfs")))
            .build();
        assert!(registry.is_empty());
        assert!(registry.look_up(BackingClass::Pseudo, "tmpfs").is_none());
    }
}
