// ABOUTME: Diagnostics accumulator for non-fatal warnings during a run.
// ABOUTME: Collects problems that shouldn't fail the command but should be shown to users.

use crate::sshfs::ReleaseReport;

/// Collects non-fatal warnings during a command.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Record one warning per mount a teardown could not release.
    pub fn record_release(&mut self, report: &ReleaseReport) {
        for failure in &report.failed {
            self.warn(Warning::mount_release(failure.to_string()));
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during a command.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// An SSH mount was left behind after teardown.
    pub fn mount_release(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::MountRelease,
            message: message.into(),
        }
    }

    /// The box image could not be built; the base image is used instead.
    pub fn image_build(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ImageBuild,
            message: message.into(),
        }
    }

    /// The named configuration could not be saved after the run.
    pub fn config_save(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ConfigSave,
            message: message.into(),
        }
    }

    /// No container runtime answered.
    pub fn runtime_unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::RuntimeUnavailable,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// An SSH mount could not be unmounted (mountpoint may remain).
    MountRelease,
    /// Building the box image failed.
    ImageBuild,
    /// Persisting the named configuration failed.
    ConfigSave,
    /// No runtime could be reached.
    RuntimeUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sshfs::{MountError, ReleaseFailure};
    use std::path::Path;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::image_build("build exited with 1"));
        diag.warn(Warning::config_save("disk full"));

        assert!(diag.has_warnings());
        assert_eq!(diag.warnings().len(), 2);
        assert_eq!(diag.warnings()[0].kind, WarningKind::ImageBuild);
        assert_eq!(diag.warnings()[1].kind, WarningKind::ConfigSave);
    }

    #[test]
    fn release_failures_become_warnings() {
        let mut report = ReleaseReport::default();
        report.failed.push(ReleaseFailure::new(
            Path::new("/tmp/ssh-mounts/ro-dev@build+srv"),
            &MountError::Unmount {
                target: "/tmp/ssh-mounts/ro-dev@build+srv".into(),
                reason: "device busy".into(),
            },
        ));

        let mut diag = Diagnostics::default();
        diag.record_release(&report);
        assert_eq!(diag.warnings().len(), 1);
        assert_eq!(diag.warnings()[0].kind, WarningKind::MountRelease);
        assert!(diag.warnings()[0].message.contains("device busy"));
    }
}
