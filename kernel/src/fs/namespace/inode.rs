// SPDX-License-Identifier: MPL-2.0

use crate::{
    fs::{
        driver::DriverHandle,
        registry::{FsHandle, FsOperations},
    },
    prelude::*,
};

/// Identifies an inode of an [`InodeTree`].
///
/// The identifier stays valid until the inode is freed. Using it afterwards
/// fails with `ESTALE`, even if the slot has been reused by a newer inode.
///
/// [`InodeTree`]: super::InodeTree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InodeId {
    pub(super) index: u32,
    pub(super) generation: u32,
}

/// The type of an inode, without any payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InodeType {
    /// An intermediate directory of the pseudo file system.
    Directory,
    /// A reserved placeholder that nothing has claimed yet.
    Plain,
    /// A character driver.
    Driver,
    /// A block driver.
    BlockDriver,
    /// An MTD driver.
    MtdDriver,
    /// A symbolic link.
    Softlink,
    /// A named semaphore.
    NamedSemaphore,
    /// A message queue.
    MessageQueue,
    /// A shared memory object.
    SharedMemory,
    /// The root of a mounted file system.
    Mountpoint,
}

impl InodeType {
    /// Returns whether the inode is anything but a plain node or a directory.
    ///
    /// Nothing can be mounted over a special inode.
    pub fn is_special(self) -> bool {
        !matches!(self, InodeType::Directory | InodeType::Plain)
    }
}

/// The payload of a special inode published with
/// [`InodeTree::register_special`].
///
/// [`InodeTree::register_special`]: super::InodeTree::register_special
#[derive(Debug, Clone)]
pub enum SpecialKind {
    Driver,
    BlockDriver(DriverHandle),
    MtdDriver(DriverHandle),
    Softlink(String),
    NamedSemaphore,
    MessageQueue,
    SharedMemory,
}

impl SpecialKind {
    pub fn type_(&self) -> InodeType {
        match self {
            SpecialKind::Driver => InodeType::Driver,
            SpecialKind::BlockDriver(_) => InodeType::BlockDriver,
            SpecialKind::MtdDriver(_) => InodeType::MtdDriver,
            SpecialKind::Softlink(_) => InodeType::Softlink,
            SpecialKind::NamedSemaphore => InodeType::NamedSemaphore,
            SpecialKind::MessageQueue => InodeType::MessageQueue,
            SpecialKind::SharedMemory => InodeType::SharedMemory,
        }
    }
}

/// The file system bound to a mountpoint.
///
/// The operations and the handle only ever exist together.
#[derive(Clone)]
pub struct MountBinding {
    fs_type: &'static str,
    ops: Arc<dyn FsOperations>,
    handle: FsHandle,
}

impl MountBinding {
    pub(crate) fn new(fs_type: &'static str, ops: Arc<dyn FsOperations>, handle: FsHandle) -> Self {
        Self {
            fs_type,
            ops,
            handle,
        }
    }

    /// Gets the name of the bound FS type.
    pub fn fs_type(&self) -> &'static str {
        self.fs_type
    }

    /// Gets the operations of the bound FS type.
    pub fn ops(&self) -> &Arc<dyn FsOperations> {
        &self.ops
    }

    /// Gets the handle produced by `bind`.
    pub fn handle(&self) -> &FsHandle {
        &self.handle
    }
}

impl Debug for MountBinding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MountBinding")
            .field("fs_type", &self.fs_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub(super) enum InodeKind {
    Directory,
    Plain,
    Special(SpecialKind),
    Mountpoint(MountBinding),
}

impl InodeKind {
    pub(super) fn type_(&self) -> InodeType {
        match self {
            InodeKind::Directory => InodeType::Directory,
            InodeKind::Plain => InodeType::Plain,
            InodeKind::Special(special) => special.type_(),
            InodeKind::Mountpoint(_) => InodeType::Mountpoint,
        }
    }
}

#[derive(Debug)]
pub(super) struct Inode {
    pub(super) name: String,
    pub(super) parent: Option<InodeId>,
    pub(super) children: BTreeMap<String, InodeId>,
    pub(super) kind: InodeKind,
    pub(super) refs: usize,
    /// Cleared once the inode is removed from the tree.
    pub(super) attached: bool,
}

impl Inode {
    pub(super) fn new(name: &str, parent: Option<InodeId>, kind: InodeKind) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: BTreeMap::new(),
            kind,
            refs: 0,
            attached: true,
        }
    }

    /// Returns whether other inodes may be created below this one.
    pub(super) fn can_have_children(&self) -> bool {
        matches!(self.kind, InodeKind::Directory | InodeKind::Plain)
    }
}
