// SPDX-License-Identifier: MPL-2.0

pub mod driver;
pub mod mount;
pub mod namespace;
pub mod registry;
