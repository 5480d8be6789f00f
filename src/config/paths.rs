//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\lesson-coach\
//!   macOS:   ~/Library/Application Support/lesson-coach/
//!   Linux:   ~/.config/lesson-coach/
//!
//! Data dir (lesson files):
//!   Windows: %LOCALAPPDATA%\lesson-coach\
//!   macOS:   ~/Library/Application Support/lesson-coach/
//!   Linux:   ~/.local/share/lesson-coach/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory searched for lesson JSON files given by name.
    pub lessons_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "lesson-coach";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let settings_file = config_dir.join("settings.toml");
        let lessons_dir = data_dir.join("lessons");

        Self {
            config_dir,
            settings_file,
            lessons_dir,
        }
    }

    /// Resolve a lesson argument: existing paths are used as-is, bare names
    /// are looked up as `<lessons_dir>/<name>.json`.
    pub fn resolve_lesson(&self, arg: &str) -> PathBuf {
        let direct = PathBuf::from(arg);
        if direct.exists() {
            return direct;
        }
        self.lessons_dir.join(format!("{arg}.json"))
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
