// SPDX-License-Identifier: MPL-2.0

//! The mount core of the virtual file system.
//!
//! This crate owns three things:
//!
//! * the compiled-in table of file system types ([`fs::registry`]),
//! * the inode namespace shared by the whole system ([`fs::namespace`]),
//! * the `mount` operation that binds a file system to a backing driver and
//!   publishes it into the namespace ([`fs::mount`]).
//!
//! Concrete file systems and device drivers live elsewhere. They plug in
//! through [`fs::registry::FsOperations`] and [`fs::driver::DriverResolver`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod fs;
mod prelude;

pub use self::{
    error::{Errno, Error},
    fs::{
        driver::{DriverClass, DriverHandle, DriverRef, DriverResolver, ResolveError},
        mount::{MountFlags, MountService},
        namespace::{InodeNamespace, InodeType, SpecialKind},
        registry::{BackingClass, FsHandle, FsOperations, FsRegistry},
    },
};

/// The result type used by the public API of this crate.
pub type Result<T> = core::result::Result<T, Error>;
