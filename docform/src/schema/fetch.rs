//! Fetch collaborators that turn a schema URL into JSON text.
//!
//! The resolver only sees the [`SchemaFetcher`] trait. Which concrete
//! fetcher serves a URL is decided by [`RoutedFetcher`] through regex
//! matching, so a domain-specific provider can shadow the network.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use futures::{FutureExt, future::BoxFuture};
use regex::Regex;

use crate::config::SchemaRoute;

/// Source of schema documents.
pub trait SchemaFetcher: Send + Sync {
    /// Fetch the document at `url` and return its text.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, anyhow::Result<String>>;
}

impl<F: SchemaFetcher + ?Sized> SchemaFetcher for Box<F> {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        (**self).fetch(url)
    }
}

/// Plain HTTP(S) fetcher.
#[cfg(feature = "http")]
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "http")]
impl SchemaFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .with_context(|| format!("GET {url}"))?
                .error_for_status()?;
            Ok(response.text().await?)
        }
        .boxed()
    }
}

/// Reads schema documents from the local filesystem.
///
/// Accepts plain paths and `file://` URLs. With a base directory set,
/// relative paths are resolved against it.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    base: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn path_for(&self, url: &str) -> PathBuf {
        let raw = url.strip_prefix("file://").unwrap_or(url);
        match &self.base {
            Some(base) if Path::new(raw).is_relative() => base.join(raw),
            _ => PathBuf::from(raw),
        }
    }
}

impl SchemaFetcher for FileFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        async move {
            let path = self.path_for(url);
            tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))
        }
        .boxed()
    }
}

/// In-process provider backed by a map of URL to document text.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    documents: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document, returning `self` for chaining.
    pub fn with(mut self, url: impl Into<String>, document: impl Into<String>) -> Self {
        self.insert(url, document);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, document: impl Into<String>) {
        self.documents.insert(url.into(), document.into());
    }
}

impl SchemaFetcher for StaticFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        let found = self
            .documents
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no document registered for {url}"));
        async move { found }.boxed()
    }
}

/// Serves files named after the last URL segment from a directory.
struct DirectoryFetcher {
    dir: PathBuf,
}

impl SchemaFetcher for DirectoryFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        async move {
            let name = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
            let path = self.dir.join(format!("{name}.json"));
            tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))
        }
        .boxed()
    }
}

/// Dispatches each URL to the first fetcher whose pattern matches.
pub struct RoutedFetcher {
    routes: Vec<(Regex, Box<dyn SchemaFetcher>)>,
    fallback: Box<dyn SchemaFetcher>,
}

impl RoutedFetcher {
    pub fn new(fallback: impl SchemaFetcher + 'static) -> Self {
        Self {
            routes: Vec::new(),
            fallback: Box::new(fallback),
        }
    }

    /// Add a route. Earlier routes take precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regular expression.
    pub fn route(
        mut self,
        pattern: &str,
        fetcher: impl SchemaFetcher + 'static,
    ) -> anyhow::Result<Self> {
        let re = Regex::new(pattern).with_context(|| format!("invalid route pattern {pattern}"))?;
        self.routes.push((re, Box::new(fetcher)));
        Ok(self)
    }

    /// Add the directory routes declared in configuration.
    pub fn with_config_routes(mut self, routes: &[SchemaRoute]) -> anyhow::Result<Self> {
        for route in routes {
            self = self.route(
                &route.pattern,
                DirectoryFetcher {
                    dir: PathBuf::from(&route.dir),
                },
            )?;
        }
        Ok(self)
    }

    fn select(&self, url: &str) -> &dyn SchemaFetcher {
        self.routes
            .iter()
            .find(|(re, _)| re.is_match(url))
            .map(|(_, f)| f.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }
}

impl SchemaFetcher for RoutedFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        let fetcher = self.select(url);
        debug!("fetching schema {url}");
        fetcher.fetch(url)
    }
}
