// SPDX-License-Identifier: MPL-2.0

//! The inode namespace.
//!
//! Every named object of the system (drivers, mountpoints, and the
//! directories leading to them) is an inode of one tree. The tree is
//! guarded by a single non-reentrant lock: [`InodeNamespace::lock`] gives
//! the [`InodeTree`] to one caller at a time, and every operation on the
//! tree is atomic with respect to the others.
//!
//! Inodes carry a reference count. A reference is taken by
//! [`InodeTree::search`] and [`InodeTree::add_reference`] and given back by
//! [`InodeTree::release`]. Removing an inode only detaches it from the tree;
//! its memory is reclaimed once it is detached and its last reference is
//! released.

mod inode;
mod path;

pub use self::inode::{InodeId, InodeType, MountBinding, SpecialKind};
use self::inode::{Inode, InodeKind};
use crate::{config::NamespaceConfig, prelude::*};

/// A successful [`InodeTree::search`].
///
/// The found inode holds one more reference on behalf of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    inode: InodeId,
    type_: InodeType,
    relpath: String,
}

impl SearchHit {
    pub fn inode(&self) -> InodeId {
        self.inode
    }

    pub fn type_(&self) -> InodeType {
        self.type_
    }

    /// The part of the path below the found inode.
    ///
    /// It is empty unless the search stopped at a mountpoint, in which case
    /// the rest of the path belongs to the mounted file system.
    pub fn relpath(&self) -> &str {
        &self.relpath
    }
}

/// The inodes created by one [`InodeTree::reserve`].
///
/// Handing it back to [`InodeTree::unreserve`] removes exactly these inodes.
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub struct Reservation {
    leaf: InodeId,
    /// Intermediate directories created on the way, outermost first.
    created: Vec<InodeId>,
}

impl Reservation {
    /// The reserved inode itself.
    pub fn inode(&self) -> InodeId {
        self.leaf
    }

    /// The number of inodes created by the reservation, the leaf included.
    pub fn created(&self) -> usize {
        self.created.len() + 1
    }
}

/// One inode as seen by [`InodeTree::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeImage {
    pub path: String,
    pub type_: InodeType,
    pub refs: usize,
}

/// A comparable image of the namespace.
///
/// Two snapshots are equal if the trees have the same shape, the same
/// inode types and the same reference counts, and the same number of
/// inodes are alive (detached inodes waiting for their last release
/// included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSnapshot {
    pub inodes: Vec<InodeImage>,
    pub live_inodes: usize,
}

struct Slot {
    generation: u32,
    inode: Option<Inode>,
}

/// The tree of inodes. Obtained through [`InodeNamespace::lock`].
pub struct InodeTree {
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    live: usize,
    root: InodeId,
    config: NamespaceConfig,
}

impl InodeTree {
    fn new(config: NamespaceConfig) -> Self {
        let root = InodeId {
            index: 0,
            generation: 0,
        };
        Self {
            slots: vec![Slot {
                generation: 0,
                inode: Some(Inode::new("", None, InodeKind::Directory)),
            }],
            free_slots: Vec::new(),
            live: 1,
            root,
            config,
        }
    }

    /// Gets the root inode. It is never freed.
    pub fn root(&self) -> InodeId {
        self.root
    }

    /// Gets the number of inodes alive.
    pub fn live_inodes(&self) -> usize {
        self.live
    }

    /// Finds the inode at `path` and takes a reference on it.
    ///
    /// If a mountpoint is met before the path is exhausted, the search stops
    /// there and returns the mountpoint together with the rest of the path.
    pub fn search(&mut self, path: &str) -> Result<SearchHit> {
        let components = path::components(path, self.config.max_name_len)?;

        let mut current = self.root;
        let mut consumed = 0;
        for name in components.iter() {
            let inode = self.get(current)?;
            if matches!(inode.kind, InodeKind::Mountpoint(_)) {
                break;
            }
            let Some(&child) = inode.children.get(*name) else {
                return_errno_with_message!(Errno::ENOENT, "no inode exists at the path");
            };
            current = child;
            consumed += 1;
        }

        let relpath = components[consumed..].join("/");
        let inode = self.get_mut(current)?;
        inode.refs += 1;
        Ok(SearchHit {
            inode: current,
            type_: inode.kind.type_(),
            relpath,
        })
    }

    /// Finds the inode at `path` without taking a reference.
    ///
    /// Unlike [`Self::search`], the path must name an inode exactly.
    pub fn look_up(&self, path: &str) -> Result<InodeId> {
        let components = path::components(path, self.config.max_name_len)?;
        self.walk(&components)
            .ok_or(Error::with_message(Errno::ENOENT, "no inode exists at the path"))
    }

    /// Inserts a plain inode at `path`.
    ///
    /// Missing intermediate directories are created as well. The new inode
    /// has no references.
    ///
    /// # Errors
    ///
    /// * `EEXIST` if an inode already exists at `path`.
    /// * `EINVAL` if `path` is the root, is malformed, or passes through an
    ///   inode that cannot have children.
    /// * `ENOMEM` if the namespace has no room for the new inodes. Nothing is
    ///   created in that case.
    pub fn reserve(&mut self, path: &str) -> Result<Reservation> {
        let components = path::components(path, self.config.max_name_len)?;
        let Some((leaf_name, parents)) = components.split_last() else {
            return_errno_with_message!(Errno::EINVAL, "the root cannot be reserved");
        };

        let mut current = self.root;
        let mut existing = 0;
        for name in parents {
            let inode = self.get(current)?;
            if !inode.can_have_children() {
                return_errno_with_message!(Errno::EINVAL, "a path component is not a directory");
            }
            match inode.children.get(*name) {
                Some(&child) => {
                    current = child;
                    existing += 1;
                }
                None => break,
            }
        }

        let parent = self.get(current)?;
        if !parent.can_have_children() {
            return_errno_with_message!(Errno::EINVAL, "a path component is not a directory");
        }
        if existing == parents.len() && parent.children.contains_key(*leaf_name) {
            return_errno_with_message!(Errno::EEXIST, "an inode already exists at the path");
        }

        let missing = components.len() - existing;
        if self.live + missing > self.config.max_inodes {
            return_errno_with_message!(Errno::ENOMEM, "the inode namespace is full");
        }

        let mut created = Vec::with_capacity(missing - 1);
        for name in &parents[existing..] {
            current = self.attach(current, name, InodeKind::Directory)?;
            created.push(current);
        }
        let leaf = self.attach(current, leaf_name, InodeKind::Plain)?;

        trace!("reserved {} ({} inodes)", path, missing);
        Ok(Reservation { leaf, created })
    }

    /// Removes the inodes created by a reservation, innermost first.
    pub fn unreserve(&mut self, reservation: Reservation) {
        let Reservation { leaf, created } = reservation;
        for id in core::iter::once(leaf).chain(created.into_iter().rev()) {
            match self.get(id) {
                Ok(inode) if inode.children.is_empty() => self.detach(id),
                Ok(_) => {
                    warn!("a reserved inode gained children, keeping it");
                    return;
                }
                Err(_) => warn!("a reserved inode has already been freed"),
            }
        }
    }

    /// Takes one more reference on an inode.
    pub fn add_reference(&mut self, id: InodeId) -> Result<()> {
        self.get_mut(id)?.refs += 1;
        Ok(())
    }

    /// Gives back one reference on an inode.
    ///
    /// An inode that has been removed from the tree is freed by its last
    /// release. An inode still in the tree stays, even without references.
    pub fn release(&mut self, id: InodeId) -> Result<()> {
        let root = self.root;
        let inode = self.get_mut(id)?;
        if inode.refs == 0 {
            error!("releasing inode {:?} which holds no reference", id);
            return_errno_with_message!(Errno::EINVAL, "the inode holds no reference");
        }

        inode.refs -= 1;
        if inode.refs == 0 && !inode.attached && id != root {
            self.free(id);
        }
        Ok(())
    }

    /// Detaches the inode at `path` from the tree.
    ///
    /// The inode is freed at once if nobody holds a reference on it.
    /// Otherwise it lingers, unreachable, until its last release.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let components = path::components(path, self.config.max_name_len)?;
        if components.is_empty() {
            return_errno_with_message!(Errno::EINVAL, "the root cannot be removed");
        }

        let id = self
            .walk(&components)
            .ok_or(Error::with_message(Errno::ENOENT, "no inode exists at the path"))?;
        if !self.get(id)?.children.is_empty() {
            return_errno_with_message!(Errno::ENOTEMPTY, "the inode has children");
        }

        self.detach(id);
        Ok(())
    }

    /// Publishes a special inode, such as a driver, at `path`.
    pub fn register_special(&mut self, path: &str, kind: SpecialKind) -> Result<InodeId> {
        let id = self.reserve(path)?.inode();
        debug!("registered {:?} at {}", kind.type_(), path);
        self.get_mut(id)?.kind = InodeKind::Special(kind);
        Ok(id)
    }

    /// Turns a plain inode or a directory into a mountpoint.
    ///
    /// The binding is installed in one step, so no one can observe a
    /// mountpoint without its file system. With `take_reference`, the
    /// mountpoint also gains the reference it keeps until it is unmounted.
    pub(crate) fn publish_mountpoint(
        &mut self,
        id: InodeId,
        binding: MountBinding,
        take_reference: bool,
    ) -> Result<()> {
        let inode = self.get_mut(id)?;
        if inode.kind.type_().is_special() {
            return_errno_with_message!(Errno::EBUSY, "the inode is already special");
        }

        inode.kind = InodeKind::Mountpoint(binding);
        if take_reference {
            inode.refs += 1;
        }
        Ok(())
    }

    pub fn type_of(&self, id: InodeId) -> Result<InodeType> {
        Ok(self.get(id)?.kind.type_())
    }

    pub fn ref_count(&self, id: InodeId) -> Result<usize> {
        Ok(self.get(id)?.refs)
    }

    /// Gets the payload of a special inode.
    pub fn special(&self, id: InodeId) -> Result<Option<&SpecialKind>> {
        match &self.get(id)?.kind {
            InodeKind::Special(special) => Ok(Some(special)),
            _ => Ok(None),
        }
    }

    /// Gets the file system bound to a mountpoint.
    pub fn binding(&self, id: InodeId) -> Result<Option<&MountBinding>> {
        match &self.get(id)?.kind {
            InodeKind::Mountpoint(binding) => Ok(Some(binding)),
            _ => Ok(None),
        }
    }

    /// Calls `f` with the path and the binding of every mountpoint.
    pub fn for_each_mountpoint(&self, mut f: impl FnMut(&str, &MountBinding)) {
        self.for_each_attached(|path, inode| {
            if let InodeKind::Mountpoint(binding) = &inode.kind {
                f(path, binding);
            }
        });
    }

    pub fn snapshot(&self) -> NamespaceSnapshot {
        let mut inodes = Vec::new();
        self.for_each_attached(|path, inode| {
            inodes.push(InodeImage {
                path: path.to_string(),
                type_: inode.kind.type_(),
                refs: inode.refs,
            });
        });
        NamespaceSnapshot {
            inodes,
            live_inodes: self.live,
        }
    }

    /// Visits the attached inodes in pre-order, children sorted by name.
    fn for_each_attached(&self, mut f: impl FnMut(&str, &Inode)) {
        let mut stack = vec![(self.root, String::from("/"))];
        while let Some((id, path)) = stack.pop() {
            let Ok(inode) = self.get(id) else {
                continue;
            };
            f(&path, inode);
            for (name, &child) in inode.children.iter().rev() {
                let child_path = if path == "/" {
                    format!("/{}", name)
                } else {
                    format!("{}/{}", path, name)
                };
                stack.push((child, child_path));
            }
        }
    }

    fn walk(&self, components: &[&str]) -> Option<InodeId> {
        let mut current = self.root;
        for name in components {
            current = *self.get(current).ok()?.children.get(*name)?;
        }
        Some(current)
    }

    fn get(&self, id: InodeId) -> Result<&Inode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.inode.as_ref())
            .ok_or(Error::with_message(Errno::ESTALE, "the inode has been freed"))
    }

    fn get_mut(&mut self, id: InodeId) -> Result<&mut Inode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.inode.as_mut())
            .ok_or(Error::with_message(Errno::ESTALE, "the inode has been freed"))
    }

    fn attach(&mut self, parent: InodeId, name: &str, kind: InodeKind) -> Result<InodeId> {
        self.get(parent)?;
        let id = self.alloc(Inode::new(name, Some(parent), kind));
        self.get_mut(parent)?.children.insert(name.to_string(), id);
        Ok(id)
    }

    fn detach(&mut self, id: InodeId) {
        if id == self.root {
            return;
        }
        let Ok(inode) = self.get_mut(id) else {
            return;
        };

        let parent = inode.parent.take();
        let name = inode.name.clone();
        let refs = inode.refs;
        inode.attached = false;

        if let Some(parent) = parent {
            if let Ok(parent) = self.get_mut(parent) {
                parent.children.remove(&name);
            }
        }
        if refs == 0 {
            self.free(id);
        }
    }

    fn alloc(&mut self, inode: Inode) -> InodeId {
        self.live += 1;
        if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            slot.inode = Some(inode);
            return InodeId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            inode: Some(inode),
        });
        InodeId {
            index,
            generation: 0,
        }
    }

    fn free(&mut self, id: InodeId) {
        let slot = &mut self.slots[id.index as usize];
        if slot.inode.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.free_slots.push(id.index);
            self.live -= 1;
        }
    }
}

/// The namespace service: an [`InodeTree`] behind the namespace lock.
pub struct InodeNamespace {
    tree: Mutex<InodeTree>,
}

impl InodeNamespace {
    /// Creates a namespace holding only the root directory.
    pub fn new(config: NamespaceConfig) -> Self {
        Self {
            tree: Mutex::new(InodeTree::new(config)),
        }
    }

    /// Acquires the namespace lock.
    ///
    /// The lock is not reentrant: calling any method of the namespace while
    /// holding the guard deadlocks. Use the methods of the guard instead.
    pub fn lock(&self) -> MutexGuard<'_, InodeTree> {
        self.tree.lock()
    }

    /// Acquires the namespace lock if nobody holds it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, InodeTree>> {
        self.tree.try_lock()
    }

    pub fn search(&self, path: &str) -> Result<SearchHit> {
        self.lock().search(path)
    }

    pub fn reserve(&self, path: &str) -> Result<Reservation> {
        self.lock().reserve(path)
    }

    pub fn unreserve(&self, reservation: Reservation) {
        self.lock().unreserve(reservation)
    }

    pub fn add_reference(&self, id: InodeId) -> Result<()> {
        self.lock().add_reference(id)
    }

    pub fn release(&self, id: InodeId) -> Result<()> {
        self.lock().release(id)
    }

    pub fn remove(&self, path: &str) -> Result<()> {
        self.lock().remove(path)
    }

    pub fn register_special(&self, path: &str, kind: SpecialKind) -> Result<InodeId> {
        self.lock().register_special(path, kind)
    }

    /// Gets the type of the inode at `path`, if any.
    pub fn type_at(&self, path: &str) -> Option<InodeType> {
        let tree = self.lock();
        tree.look_up(path).and_then(|id| tree.type_of(id)).ok()
    }

    /// Gets the reference count of the inode at `path`, if any.
    pub fn ref_count_at(&self, path: &str) -> Option<usize> {
        let tree = self.lock();
        tree.look_up(path).and_then(|id| tree.ref_count(id)).ok()
    }

    pub fn live_inodes(&self) -> usize {
        self.lock().live_inodes()
    }

    pub fn snapshot(&self) -> NamespaceSnapshot {
        self.lock().snapshot()
    }

    pub fn for_each_mountpoint(&self, f: impl FnMut(&str, &MountBinding)) {
        self.lock().for_each_mountpoint(f)
    }
}

impl Default for InodeNamespace {
    fn default() -> Self {
        Self::new(NamespaceConfig::default())
    }
}
