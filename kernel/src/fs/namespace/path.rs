// SPDX-License-Identifier: MPL-2.0

use crate::prelude::*;

/// Splits an absolute path into its components.
///
/// Repeated and trailing slashes are ignored, so `"/mnt//sd/"` has the
/// components `["mnt", "sd"]` and `"/"` has none.
pub(super) fn components(path: &str, max_name_len: usize) -> Result<Vec<&str>> {
    if path.is_empty() {
        return_errno_with_message!(Errno::ENOENT, "the path is empty");
    }
    if !path.starts_with('/') {
        return_errno_with_message!(Errno::EINVAL, "the path is not absolute");
    }

    let mut components = Vec::new();
    for name in path.split('/').filter(|name| !name.is_empty()) {
        if name == "." || name == ".." {
            return_errno_with_message!(Errno::EINVAL, "relative components are not supported");
        }
        if name.len() > max_name_len {
            return_errno_with_message!(Errno::EINVAL, "the path component is too long");
        }
        components.push(name);
    }
    Ok(components)
}
