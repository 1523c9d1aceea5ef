//! Application configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{TagError, TagResult};
use crate::template::{ArgPlaceholder, dollar_placeholder, question_placeholder};

/// How bound arguments appear in rendered SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderStyle {
    /// `?`
    #[default]
    Question,
    /// `$1`, `$2`, ...
    Dollar,
    /// `@p1`, `@p2`, ...
    At,
    /// `:1`, `:2`, ...
    Colon,
}

impl PlaceholderStyle {
    pub fn to_placeholder(self) -> ArgPlaceholder {
        match self {
            PlaceholderStyle::Question => question_placeholder(),
            PlaceholderStyle::Dollar => dollar_placeholder(),
            PlaceholderStyle::At => std::sync::Arc::new(|i: usize| format!("@p{}", i + 1)),
            PlaceholderStyle::Colon => std::sync::Arc::new(|i: usize| format!(":{}", i + 1)),
        }
    }
}

/// Main tagql configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagqlConfig {
    /// Dialect used to join tag queries
    #[serde(default)]
    pub dialect: Dialect,

    /// Catalog file with categories and builders (optional)
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    /// Flatten nested same-operator sets before compiling
    #[serde(default = "default_true")]
    pub simplify: bool,

    /// Placeholder style for every catalog builder
    #[serde(default)]
    pub placeholder: PlaceholderStyle,
}

fn default_true() -> bool {
    true
}

impl Default for TagqlConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            catalog_path: None,
            simplify: true,
            placeholder: PlaceholderStyle::default(),
        }
    }
}

impl TagqlConfig {
    /// Create a new configuration builder
    pub fn builder() -> TagqlConfigBuilder {
        TagqlConfigBuilder::default()
    }

    /// `<config dir>/tagql/config.toml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tagql").join("config.toml"))
    }

    pub fn from_toml(content: &str) -> TagResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> TagResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;

        // Relative catalog paths are relative to the config file.
        if let (Some(catalog), Some(dir)) = (&config.catalog_path, path.parent()) {
            if catalog.is_relative() {
                config.catalog_path = Some(dir.join(catalog));
            }
        }
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else
    /// the defaults.
    pub fn discover(path: Option<&Path>) -> TagResult<Self> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(TagError::Config(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// Builder for TagqlConfig
#[derive(Debug, Default)]
pub struct TagqlConfigBuilder {
    config: TagqlConfig,
}

impl TagqlConfigBuilder {
    /// Set the dialect
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.config.dialect = dialect;
        self
    }

    /// Set the catalog path
    pub fn catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.catalog_path = Some(path.into());
        self
    }

    pub fn simplify(mut self, simplify: bool) -> Self {
        self.config.simplify = simplify;
        self
    }

    pub fn placeholder(mut self, style: PlaceholderStyle) -> Self {
        self.config.placeholder = style;
        self
    }

    /// Build the configuration
    pub fn build(self) -> TagqlConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = TagqlConfig::from_toml("").unwrap();
        assert_eq!(config, TagqlConfig::default());
        assert_eq!(config.dialect, Dialect::BigQuery);
        assert!(config.simplify);
    }

    #[test]
    fn test_from_toml() {
        let config = TagqlConfig::from_toml(
            r#"
dialect = "postgres"
catalog_path = "catalog.toml"
simplify = false
placeholder = "dollar"
"#,
        )
        .unwrap();
        let expected = TagqlConfig::builder()
            .dialect(Dialect::Postgres)
            .catalog("catalog.toml")
            .simplify(false)
            .placeholder(PlaceholderStyle::Dollar)
            .build();
        assert_eq!(config, expected);

        assert!(TagqlConfig::from_toml(r#"dialect = "oracle""#).is_err());
    }

    #[test]
    fn test_placeholder_styles() {
        let render = |style: PlaceholderStyle| style.to_placeholder()(1);
        assert_eq!(render(PlaceholderStyle::Question), "?");
        assert_eq!(render(PlaceholderStyle::Dollar), "$2");
        assert_eq!(render(PlaceholderStyle::At), "@p2");
        assert_eq!(render(PlaceholderStyle::Colon), ":2");
    }

    #[test]
    fn test_load_resolves_catalog_relative_to_file() {
        let dir = std::env::temp_dir().join(format!("tagql-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "catalog_path = \"catalog.toml\"\n").unwrap();

        let config = TagqlConfig::load(&path).unwrap();
        assert_eq!(config.catalog_path, Some(dir.join("catalog.toml")));

        let missing = TagqlConfig::discover(Some(dir.join("nope.toml").as_path())).unwrap_err();
        assert!(matches!(missing, TagError::Config(_)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
