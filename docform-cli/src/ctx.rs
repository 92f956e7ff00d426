//! Application context shared by the subcommands.
//!
//! [`AppContext`] owns the loaded configuration and a schema resolver whose
//! fetcher routes configured URL patterns to local directories, plain paths
//! and `file://` URLs to the filesystem, and everything else to HTTP.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, anyhow};
use colored::Colorize;
use docform::{
    FormConfig, FormTree,
    model::TreeOptions,
    schema::{FileFetcher, HttpFetcher, RoutedFetcher, SCHEMA_KEY, Schema, SchemaResolver},
};
use serde_json::Value;
use tokio::fs;

/// Plain paths and `file://` URLs.
const LOCAL_ROUTE: &str = r"^(?:file://|[^:]*$)";

/// Paths given on the command line.
#[derive(Debug, Default, Clone)]
pub struct PathConfig {
    /// Configuration file, `.docform.toml` by default.
    pub config: PathBuf,
    /// Document to load. `None` starts from an empty document.
    pub input: Option<PathBuf>,
    /// Where to write the resulting document. `None` prints it.
    pub output: Option<PathBuf>,
}

pub struct AppContext {
    pub paths: PathConfig,
    pub config: FormConfig,
    /// Prefix of the generated field ids.
    pub salt: String,
    resolver: SchemaResolver<RoutedFetcher>,
}

impl AppContext {
    /// Load the configuration and set up schema fetching.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be parsed or declares an
    /// invalid route pattern.
    pub fn new(paths: PathConfig, salt: impl Into<String>) -> anyhow::Result<Self> {
        let config = FormConfig::load(&paths.config)?;
        let fetcher = RoutedFetcher::new(HttpFetcher::new())
            .with_config_routes(&config.schema.routes)?
            .route(LOCAL_ROUTE, FileFetcher::new())?;
        let resolver = SchemaResolver::with_config(fetcher, &config.schema);

        Ok(Self {
            paths,
            config,
            salt: salt.into(),
            resolver,
        })
    }

    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions {
            defaults: self.config.defaults.clone(),
            salt: Some(self.salt.clone()),
            today: None,
        }
    }

    /// Resolve a root schema, warning when it fell back to the empty schema.
    pub async fn schema(&mut self, url: &str) -> Arc<Schema> {
        let schema = self.resolver.resolve_root(url).await;
        if schema.is_placeholder() {
            warn!("schema {url} could not be resolved, continuing with an empty schema");
        }
        schema
    }

    /// Text of the input document, empty without `--input`.
    pub async fn read_input(&self) -> anyhow::Result<String> {
        match &self.paths.input {
            Some(path) => fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display())),
            None => Ok(String::new()),
        }
    }

    /// Build the form tree of the input document.
    ///
    /// The schema is `schema_url` when given, the input's `$schema`
    /// otherwise.
    pub async fn load_tree(&mut self, schema_url: Option<&str>) -> anyhow::Result<FormTree> {
        let text = self.read_input().await?;
        let url = match schema_url {
            Some(url) => url.to_string(),
            None => designator(&text)
                .ok_or_else(|| anyhow!("no --schema given and the input has no {SCHEMA_KEY}"))?,
        };
        let schema = self.schema(&url).await;
        debug!("building form for {url}");
        Ok(FormTree::from_text(schema, &text, self.tree_options()))
    }

    /// Print `text`, or write it to the `--output` file.
    pub async fn write_output(&self, text: &str) -> anyhow::Result<()> {
        match &self.paths.output {
            Some(path) => {
                fs::write(path, format!("{text}\n"))
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                eprintln!("{}", format!("Wrote {}", path.display()).green());
            }
            None => println!("{text}"),
        }
        Ok(())
    }
}

/// `$schema` of a JSON document, if it has one.
fn designator(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value.get(SCHEMA_KEY)?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docform::schema::SchemaFetcher;

    #[test]
    fn designator_reads_schema_key() {
        assert_eq!(
            designator(r#"{"$schema": "https://example.com/a", "x": 1}"#).as_deref(),
            Some("https://example.com/a")
        );
        assert_eq!(designator(r#"{"x": 1}"#), None);
        assert_eq!(designator("not json"), None);
    }

    #[tokio::test]
    async fn local_paths_are_read_from_disk() {
        let dir = std::env::temp_dir().join(format!("docform-ctx-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let schema_path = dir.join("note.json");
        std::fs::write(
            &schema_path,
            r#"{"type": "object", "required": ["title"], "properties": {"title": {"type": "string"}}}"#,
        )
        .unwrap();

        let mut ctx = AppContext::new(
            PathConfig {
                config: dir.join("missing.toml"),
                ..Default::default()
            },
            "t",
        )
        .unwrap();
        let url = schema_path.display().to_string();
        assert!(ctx.resolver.fetcher().fetch(&url).await.is_ok());

        let tree = ctx.load_tree(Some(&url)).await.unwrap();
        assert_eq!(tree.value()["title"], "");
        assert_eq!(tree.value()[SCHEMA_KEY], url.as_str());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn missing_schema_is_an_error() {
        let mut ctx = AppContext::new(
            PathConfig {
                config: PathBuf::from("/nonexistent/.docform.toml"),
                ..Default::default()
            },
            "t",
        )
        .unwrap();
        assert!(ctx.load_tree(None).await.is_err());
    }
}
