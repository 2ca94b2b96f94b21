//! Process-wide configuration, constructed directly by the embedding application rather
//! than parsed from a dynamic option list.
//!
//! Mirrors the teacher crate's own `mnt::mount_options::Config` (one flat, `Default`-able
//! struct carrying every knob) but trades its string/enum mount-option vector for a small
//! set of typed fields, per the redesign guidance against reflective/stringly-typed
//! validation: this configuration surface is meant to be constructed once, in code, not
//! parsed from a variadic options string.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::fs::CaseFold;

/// Per-mount overrides layered on top of the process-wide [`VfsConfig`] defaults.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct MountConfig {
    /// Case-folding behavior for lookups under this mount. `None` inherits the
    /// process-wide default.
    pub case_fold: Option<CaseFold>,
    /// Treat this mount as read-only regardless of the backend's own attributes.
    pub read_only: bool,
}

/// Top-level VFS configuration, passed once at initialization.
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub struct VfsConfig {
    /// Enable POSIX permission checks in the facade (§4.I step 4).
    pub check_access: bool,
    /// Default case-folding behavior, inherited by mounts that don't override it.
    pub case_fold: CaseFold,
    /// Populate `/dev/{null,zero,full,random}` device nodes at startup.
    pub add_devices: bool,
    /// Disable the async/sync bridge's shadow cache; sync access raises `ENOTSUP` instead.
    pub disable_async_cache: bool,
    /// Initial mount table, keyed by mount point.
    pub mounts: HashMap<PathBuf, MountConfig>,
}

impl Default for VfsConfig {
    fn default() -> Self {
        VfsConfig {
            check_access: false,
            case_fold: CaseFold::None,
            add_devices: false,
            disable_async_cache: false,
            mounts: HashMap::new(),
        }
    }
}

impl VfsConfig {
    /// The effective case-fold behavior for a mount at `prefix`: its own override if set,
    /// otherwise the process-wide default.
    pub fn case_fold_for(&self, prefix: &std::path::Path) -> CaseFold {
        self.mounts
            .get(prefix)
            .and_then(|m| m.case_fold)
            .unwrap_or(self.case_fold)
    }

    /// `true` if `prefix` was mounted read-only via its own [`MountConfig`].
    pub fn is_read_only(&self, prefix: &std::path::Path) -> bool {
        self.mounts.get(prefix).is_some_and(|m| m.read_only)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_checks_nothing_and_folds_nothing() {
        let config = VfsConfig::default();
        assert!(!config.check_access);
        assert_eq!(config.case_fold, CaseFold::None);
        assert!(config.mounts.is_empty());
    }

    #[test]
    fn mount_override_takes_precedence_over_default() {
        let mut config = VfsConfig {
            case_fold: CaseFold::Lower,
            ..VfsConfig::default()
        };
        config.mounts.insert(
            PathBuf::from("/data"),
            MountConfig {
                case_fold: Some(CaseFold::Upper),
                read_only: true,
            },
        );
        assert_eq!(config.case_fold_for(&PathBuf::from("/data")), CaseFold::Upper);
        assert_eq!(config.case_fold_for(&PathBuf::from("/other")), CaseFold::Lower);
        assert!(config.is_read_only(&PathBuf::from("/data")));
        assert!(!config.is_read_only(&PathBuf::from("/other")));
    }
}
