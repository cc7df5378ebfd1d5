// ABOUTME: Integration tests for locating and loading tool settings.
// ABOUTME: Covers the home directory override and settings file discovery.

use boxctl::settings::{self, HOME_ENV, SETTINGS_FILENAME, SETTINGS_FILENAME_ALT, Settings};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

mod home_tests {
    use super::*;

    #[test]
    fn env_var_relocates_home() {
        temp_env::with_var(HOME_ENV, Some("/srv/boxctl-home"), || {
            assert_eq!(
                settings::home_dir().unwrap(),
                PathBuf::from("/srv/boxctl-home")
            );
        });
    }

    #[test]
    fn empty_env_var_is_ignored() {
        temp_env::with_vars([(HOME_ENV, Some("")), ("HOME", Some("/home/dev"))], || {
            assert_eq!(
                settings::home_dir().unwrap(),
                PathBuf::from("/home/dev/.box-cli")
            );
        });
    }
}

mod discover_tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let home = tempfile::tempdir().unwrap();
        assert_eq!(Settings::discover(home.path()).unwrap(), Settings::default());
    }

    #[test]
    fn yml_is_preferred_over_yaml() {
        let home = tempfile::tempdir().unwrap();
        fs::write(home.path().join(SETTINGS_FILENAME), "mount_timeout: 3s\n").unwrap();
        fs::write(home.path().join(SETTINGS_FILENAME_ALT), "mount_timeout: 9s\n").unwrap();

        let settings = Settings::discover(home.path()).unwrap();
        assert_eq!(settings.mount_timeout, Duration::from_secs(3));
    }

    #[test]
    fn invalid_file_is_an_error() {
        let home = tempfile::tempdir().unwrap();
        fs::write(home.path().join(SETTINGS_FILENAME_ALT), "lock_timeout: [\n").unwrap();

        assert!(Settings::discover(home.path()).is_err());
    }
}
