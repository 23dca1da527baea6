//! Mount configuration and the option-string projection.

use rfs_dispatch::TimeoutPolicy;
use std::path::Path;

/// Everything the embedder can configure for one mount.
///
/// Most fields pass through verbatim as native mount options; `force`,
/// `mkdir` and `timeout` drive the lifecycle and dispatch layers instead
/// and never appear in the option string.
#[derive(Debug, Clone, Default)]
pub struct MountConfig {
    /// Verbose native tracing.
    pub debug: bool,
    /// Relax access control to other users.
    pub allow_other: bool,
    /// Relax access control to root.
    pub allow_root: bool,
    /// Ask the OS to unmount when the process exits.
    pub auto_unmount: bool,
    /// Delegate permission checks to the OS.
    pub default_permissions: bool,
    pub blkdev: bool,
    pub blksize: Option<u32>,
    pub max_read: Option<u32>,
    pub fd: Option<i32>,
    pub user_id: Option<u32>,
    pub fsname: Option<String>,
    pub subtype: Option<String>,
    pub kernel_cache: bool,
    pub auto_cache: bool,
    pub umask: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub entry_timeout: Option<u32>,
    pub attr_timeout: Option<u32>,
    pub ac_attr_timeout: Option<u32>,
    pub noforget: bool,
    pub remember: Option<u32>,
    pub modules: Option<String>,
    /// Label the volume in the host's file manager (macOS only).
    pub display_folder: bool,
    /// Volume name used with `display_folder`; defaults to the mountpoint's
    /// base name.
    pub name: Option<String>,
    /// Best-effort stale-mount recovery before mounting.
    pub force: bool,
    /// Auto-create the mountpoint directory (recursively).
    pub mkdir: bool,
    /// Request deadline policy for the dispatch layer.
    pub timeout: TimeoutPolicy,
}

/// Native option tokens for a configuration: bare tokens for boolean
/// flags, `key=value` for value options. Platform-conditional volume
/// labeling is controlled by `macos`; the icon path is resolved by the
/// caller so this stays a pure projection.
#[must_use]
pub fn option_tokens(
    config: &MountConfig,
    mountpoint: &Path,
    folder_icon: Option<&Path>,
    macos: bool,
) -> Vec<String> {
    let mut tokens = Vec::new();

    if config.debug {
        tokens.push("debug".to_owned());
    }
    if config.allow_other {
        tokens.push("allow_other".to_owned());
    }
    if config.allow_root {
        tokens.push("allow_root".to_owned());
    }
    if config.auto_unmount {
        tokens.push("auto_unmount".to_owned());
    }
    if config.default_permissions {
        tokens.push("default_permissions".to_owned());
    }
    if config.blkdev {
        tokens.push("blkdev".to_owned());
    }
    if let Some(blksize) = config.blksize {
        tokens.push(format!("blksize={blksize}"));
    }
    if let Some(max_read) = config.max_read {
        tokens.push(format!("max_read={max_read}"));
    }
    if let Some(fd) = config.fd {
        tokens.push(format!("fd={fd}"));
    }
    if let Some(user_id) = config.user_id {
        tokens.push(format!("user_id={user_id}"));
    }
    if let Some(fsname) = &config.fsname {
        tokens.push(format!("fsname={fsname}"));
    }
    if let Some(subtype) = &config.subtype {
        tokens.push(format!("subtype={subtype}"));
    }
    if config.kernel_cache {
        tokens.push("kernel_cache".to_owned());
    }
    if config.auto_cache {
        tokens.push("auto_cache".to_owned());
    }
    if let Some(umask) = config.umask {
        tokens.push(format!("umask={umask}"));
    }
    if let Some(uid) = config.uid {
        tokens.push(format!("uid={uid}"));
    }
    if let Some(gid) = config.gid {
        tokens.push(format!("gid={gid}"));
    }
    if let Some(entry_timeout) = config.entry_timeout {
        tokens.push(format!("entry_timeout={entry_timeout}"));
    }
    if let Some(attr_timeout) = config.attr_timeout {
        tokens.push(format!("attr_timeout={attr_timeout}"));
    }
    if let Some(ac_attr_timeout) = config.ac_attr_timeout {
        tokens.push(format!("ac_attr_timeout={ac_attr_timeout}"));
    }
    if config.noforget {
        tokens.push("noforget".to_owned());
    }
    if let Some(remember) = config.remember {
        tokens.push(format!("remember={remember}"));
    }
    if let Some(modules) = &config.modules {
        tokens.push(format!("modules={modules}"));
    }

    if config.display_folder && macos {
        let label = config
            .name
            .as_deref()
            .map(Path::new)
            .unwrap_or(mountpoint)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tokens.push(format!("volname={label}"));
        if let Some(icon) = folder_icon {
            tokens.push(format!("volicon={}", icon.display()));
        }
    }

    tokens
}

/// The `-o`-prefixed option string handed to the native driver, or the
/// empty string when no options apply.
#[must_use]
pub fn option_string(config: &MountConfig, mountpoint: &Path, folder_icon: Option<&Path>) -> String {
    let tokens = option_tokens(
        config,
        mountpoint,
        folder_icon,
        cfg!(target_os = "macos"),
    );
    if tokens.is_empty() {
        String::new()
    } else {
        format!("-o{}", tokens.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn empty_config_projects_no_options() {
        let tokens = option_tokens(
            &MountConfig::default(),
            Path::new("/mnt/x"),
            None,
            false,
        );
        assert!(tokens.is_empty());
        assert_eq!(
            option_string(&MountConfig::default(), Path::new("/mnt/x"), None),
            ""
        );
    }

    #[test]
    fn boolean_flags_emit_bare_tokens_and_values_emit_pairs() {
        let config = MountConfig {
            debug: true,
            allow_other: true,
            auto_unmount: true,
            blksize: Some(4096),
            fsname: Some("relayfs".to_owned()),
            uid: Some(1000),
            ..MountConfig::default()
        };
        let tokens = option_tokens(&config, Path::new("/mnt/x"), None, false);
        assert_eq!(
            tokens,
            vec![
                "debug",
                "allow_other",
                "auto_unmount",
                "blksize=4096",
                "fsname=relayfs",
                "uid=1000",
            ]
        );
    }

    #[test]
    fn display_folder_is_macos_only() {
        let config = MountConfig {
            display_folder: true,
            ..MountConfig::default()
        };
        let mnt = PathBuf::from("/mnt/photos");

        assert!(option_tokens(&config, &mnt, None, false).is_empty());

        let tokens = option_tokens(&config, &mnt, None, true);
        assert_eq!(tokens, vec!["volname=photos"]);

        let icon = PathBuf::from("/icons/folder.icns");
        let tokens = option_tokens(&config, &mnt, Some(&icon), true);
        assert_eq!(
            tokens,
            vec!["volname=photos", "volicon=/icons/folder.icns"]
        );
    }

    #[test]
    fn volume_label_prefers_the_configured_name() {
        let config = MountConfig {
            display_folder: true,
            name: Some("My Volume".to_owned()),
            ..MountConfig::default()
        };
        let tokens = option_tokens(&config, Path::new("/mnt/photos"), None, true);
        assert_eq!(tokens, vec!["volname=My Volume"]);
    }

    #[test]
    fn option_string_joins_with_commas_behind_dash_o() {
        let config = MountConfig {
            allow_other: true,
            uid: Some(7),
            ..MountConfig::default()
        };
        let tokens = option_tokens(&config, Path::new("/mnt/x"), None, false);
        assert_eq!(format!("-o{}", tokens.join(",")), "-oallow_other,uid=7");
    }
}
