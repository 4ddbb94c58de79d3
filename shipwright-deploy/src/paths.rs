use std::path::{Path, PathBuf};

pub const RELEASES_DIR: &str = "releases";
pub const SHARED_DIR: &str = "shared";
pub const CURRENT_LINK: &str = "current";
pub const HISTORY_FILE: &str = "releases.json";
/// Written into every release; holds the resolved commit the probe expects.
pub const REVISION_FILE: &str = "REVISION";

/// `shared/<from>` is linked into each release at `<to>`. `bundle` stays in
/// `shared/` and is used directly as the install path.
pub const SHARED_LINKS: &[(&str, &str)] = &[
    ("assets", "public/assets"),
    ("pids", "tmp/pids"),
    ("sockets", "tmp/sockets"),
    ("log", "log"),
    ("system", "public/system"),
    ("config/unicorn.rb", "config/unicorn.rb"),
];

pub fn releases_dir(deploy_to: &Path) -> PathBuf {
    deploy_to.join(RELEASES_DIR)
}

pub fn release_dir(deploy_to: &Path, id: &str) -> PathBuf {
    releases_dir(deploy_to).join(id)
}

pub fn shared_dir(deploy_to: &Path) -> PathBuf {
    deploy_to.join(SHARED_DIR)
}

pub fn bundle_dir(deploy_to: &Path) -> PathBuf {
    shared_dir(deploy_to).join("bundle")
}

pub fn current_link(deploy_to: &Path) -> PathBuf {
    deploy_to.join(CURRENT_LINK)
}

pub fn history_path(deploy_to: &Path) -> PathBuf {
    deploy_to.join(HISTORY_FILE)
}
