use std::fs;
use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::Result;

/// Page types offered out of the box.
pub const DEFAULT_PAGE_TYPES: &str = "page-my-index
page-frontpage
page-course-view
page-mod-assign-view";

lazy_static! {
    static ref PAGE_PREFIX: Regex = Regex::new(r"^page-").expect("Invalid page prefix regex");
}

/// Administrator settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    /// One page type per line. Alerts may only target these.
    #[serde(alias = "pagetypes", default = "default_page_types")]
    pub page_types: String,
}

fn default_page_types() -> String {
    DEFAULT_PAGE_TYPES.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_types: default_page_types(),
        }
    }
}

impl Settings {
    pub fn page_types(&self) -> PageTypes {
        PageTypes::parse(&self.page_types)
    }
}

/// The set of recognised page types, in configured order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageTypes {
    values: Vec<String>,
}

impl PageTypes {
    /// Split a newline-delimited block, trimming lines and skipping blanks.
    pub fn parse(block: &str) -> Self {
        let mut values: Vec<String> = Vec::new();
        for line in block.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !values.iter().any(|v| v == line) {
                values.push(line.to_string());
            }
        }
        Self { values }
    }

    pub fn contains(&self, page_type: &str) -> bool {
        !page_type.is_empty() && self.values.iter().any(|v| v == page_type)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// `(value, label)` pairs for selection menus and listings.
    pub fn menu(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .map(|value| (value.clone(), page_label(value)))
            .collect()
    }

    /// The menu label for `page_type`, if it is configured.
    pub fn label(&self, page_type: &str) -> Option<String> {
        self.contains(page_type).then(|| page_label(page_type))
    }
}

/// `page-my-index` becomes `My Index`.
fn page_label(page_type: &str) -> String {
    PAGE_PREFIX
        .replace(page_type, "")
        .split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    /// Load settings, falling back to defaults when the file is missing or
    /// unreadable.
    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            match fs::read_to_string(&self.config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => return settings,
                    Err(e) => log::warn!("Ignoring corrupt settings {:?}: {}", self.config_path, e),
                },
                Err(e) => log::warn!("Unable to read settings {:?}: {}", self.config_path, e),
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());

        let default = manager.load();
        assert!(default.page_types().contains("page-course-view"));

        let new_settings = Settings {
            page_types: "page-site-index\npage-my-index".to_string(),
        };

        manager.save(&new_settings).unwrap();
        let loaded = manager.load();

        assert_eq!(loaded, new_settings);
        assert!(!loaded.page_types().contains("page-course-view"));
    }

    #[test]
    fn test_corrupt_settings_fall_back() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), "{not json").unwrap();
        let manager = ConfigManager::new(dir.path().to_path_buf());
        assert_eq!(manager.load(), Settings::default());
    }

    #[test]
    fn test_page_types_parse() {
        let types = PageTypes::parse("  page-my-index \r\n\n page-frontpage\npage-my-index\n");
        assert_eq!(types.values(), &["page-my-index", "page-frontpage"]);
        assert!(types.contains("page-frontpage"));
        assert!(!types.contains(""));
        assert!(!types.contains("page-course-view"));
    }

    #[test]
    fn test_page_type_menu_labels() {
        let types = Settings::default().page_types();
        let menu = types.menu();
        assert_eq!(menu[0], ("page-my-index".to_string(), "My Index".to_string()));
        assert_eq!(types.label("page-mod-assign-view").as_deref(), Some("Mod Assign View"));
        assert_eq!(types.label("page-unknown"), None);
    }
}
