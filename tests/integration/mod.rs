//! Integration tests for release-rail

mod helpers;
mod test_local_host;
mod test_manifest;
mod test_plugins;
mod test_releases;
