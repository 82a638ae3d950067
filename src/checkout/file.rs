//! The `file` checkout driver: the source directory is a local path, no
//! fetching involved.

use std::path::Path;

use crate::error::Result;
use crate::model::{Pragma, RootVariant};

use super::CheckoutInfo;

pub fn checkout(path: &str) -> Result<CheckoutInfo> {
    let span = tracing::info_span!("checkout", source = "file", path);
    let _enter = span.enter();

    let remote_stub = RootVariant::File {
        path: path.to_string(),
        pragma: Pragma::default(),
    };
    Ok(CheckoutInfo::simple(Path::new(path).to_path_buf(), remote_stub))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_dir_is_the_given_path_unchanged() {
        let info = checkout("/some/local/checkout").unwrap();
        assert_eq!(info.source_dir, Path::new("/some/local/checkout"));
        match info.remote_stub {
            RootVariant::File { path, .. } => assert_eq!(path, "/some/local/checkout"),
            other => panic!("expected a file root, got {other:?}"),
        }
    }
}
