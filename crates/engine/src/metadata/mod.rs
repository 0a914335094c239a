//! Metadata document model
//!
//! A [`Metadata`] moves through three states over its lifetime:
//!
//! ```text
//! Unloaded --retrieve--> Raw(document) --is_valid_metadata--> Validated(init)
//! ```
//!
//! `Raw` holds the document as retrieved. Validation checks for the init key
//! and keeps only the mapping under it; the inner mapping is never visible
//! before validation succeeds.

pub mod configsets;
pub mod remote;

use crate::command::Executor;
use crate::handlers::{
    CommandsHandler, FilesHandler, GroupsHandler, PackagesHandler, SourcesHandler, UsersHandler,
};
use crate::hooks::Hook;
use crate::runtime::Runtime;
use crate::services::ServicesHandler;
use crate::{Error, Result};
use serde_json::{Map, Value};
use stackinit_config::PathSettings;
use stackinit_config::paths::resource_cache_path;
use stackinit_http::HttpClient;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level key of an init document
pub const INIT_KEY: &str = "AWS::CloudFormation::Init";

/// Event fired for a resource whose metadata changed
pub const POST_UPDATE: &str = "post.update";

/// A document handed to the agent directly instead of being looked up
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataInput {
    /// Serialized JSON
    Text(String),
    /// Already parsed
    Value(Value),
}

impl From<&str> for MetadataInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MetadataInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for MetadataInput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Where [`Metadata::retrieve`] looks for a document
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    /// Document provisioned at boot, tried after the remote endpoint
    pub default_path: PathBuf,
    /// Last known good cache
    pub last_path: PathBuf,
    /// Literal document; when set nothing else is consulted
    pub meta_str: Option<MetadataInput>,
    /// File holding the metadata server URL
    pub metadata_server: PathBuf,
    /// Explicit access key
    pub access_key: Option<String>,
    /// Explicit secret key
    pub secret_key: Option<String>,
    /// Credentials file, used when no explicit key pair is given
    pub credentials_file: Option<PathBuf>,
}

impl RetrieveOptions {
    /// Options using the host paths from `paths`
    #[must_use]
    pub fn from_paths(paths: &PathSettings) -> Self {
        Self {
            default_path: paths.init_data.clone(),
            last_path: paths.last_metadata.clone(),
            meta_str: None,
            metadata_server: paths.metadata_server.clone(),
            access_key: None,
            secret_key: None,
            credentials_file: Some(paths.credentials.clone()),
        }
    }

    /// Use `input` instead of looking anything up
    #[must_use]
    pub fn with_meta_str(mut self, input: impl Into<MetadataInput>) -> Self {
        self.meta_str = Some(input.into());
        self
    }

    /// Sign remote requests with this key pair
    #[must_use]
    pub fn with_keys(mut self, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    /// Read the key pair from `path`
    #[must_use]
    pub fn with_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum MetadataState {
    Unloaded,
    Raw(Value),
    Validated(Map<String, Value>),
}

/// The configuration document of one stack resource
#[derive(Debug, Clone)]
pub struct Metadata {
    stack: String,
    resource: Option<String>,
    state: MetadataState,
    changed: bool,
}

impl Metadata {
    /// Metadata of `resource` in `stack`, not yet retrieved
    pub fn new(stack: impl Into<String>, resource: Option<&str>) -> Self {
        Self {
            stack: stack.into(),
            resource: resource.map(str::to_string),
            state: MetadataState::Unloaded,
            changed: false,
        }
    }

    /// Stack name
    #[must_use]
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Resource name, if any
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Whether the last retrieval produced a document different from the cache
    #[must_use]
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// The document as retrieved, before validation
    #[must_use]
    pub fn raw(&self) -> Option<&Value> {
        match &self.state {
            MetadataState::Raw(value) => Some(value),
            _ => None,
        }
    }

    /// The init mapping, once validated
    #[must_use]
    pub fn document(&self) -> Option<&Map<String, Value>> {
        match &self.state {
            MetadataState::Validated(init) => Some(init),
            _ => None,
        }
    }

    /// Load the document from the first source that yields one
    ///
    /// Order: `meta_str`, the remote endpoint (only with credentials), the
    /// default file, then the last known good cache. A document obtained from
    /// any source but the cache itself replaces the cache.
    ///
    /// # Errors
    ///
    /// [`Error::Retrieval`] when no source yields a document or `meta_str` is
    /// not a JSON object.
    #[tracing::instrument(skip_all, fields(stack = %self.stack, resource = ?self.resource))]
    pub fn retrieve(&mut self, options: &RetrieveOptions, http: &HttpClient) -> Result<()> {
        let cache_path = resource_cache_path(&options.last_path, self.resource.as_deref());
        let previous = load_document(&cache_path);

        let (document, from_cache) = if let Some(input) = &options.meta_str {
            (parse_input(input)?, false)
        } else if let Some(document) = self.fetch_remote(options, http) {
            (document, false)
        } else if let Some(document) = load_document(&options.default_path) {
            tracing::info!(path = %options.default_path.display(), "Using provisioned metadata");
            (document, false)
        } else if let Some(document) = previous.clone() {
            tracing::info!(path = %cache_path.display(), "Using last known good metadata");
            (document, true)
        } else {
            return Err(Error::Retrieval("no metadata source available".to_string()));
        };

        self.changed = previous.as_ref() != Some(&document);

        let empty = document.as_object().is_none_or(Map::is_empty);
        if !from_cache && !empty {
            if let Err(e) = write_cache(&cache_path, &document) {
                tracing::warn!("{e}");
            }
        }

        self.state = MetadataState::Raw(document);
        Ok(())
    }

    fn fetch_remote(&self, options: &RetrieveOptions, http: &HttpClient) -> Option<Value> {
        let credentials = remote::resolve_credentials(options)?;
        let endpoint = match remote::endpoint(&options.metadata_server) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::warn!("{e}");
                return None;
            }
        };
        match remote::describe_stack_resource(
            http,
            &endpoint,
            &credentials,
            &self.stack,
            self.resource.as_deref(),
        ) {
            Ok(document) => Some(document),
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, "Remote metadata unavailable: {e}");
                None
            }
        }
    }

    /// Check for the init key and keep only the mapping under it
    ///
    /// Returns `false` while unloaded or when the document has no init
    /// mapping, or an empty one. Validation happens once; later calls report
    /// the outcome.
    pub fn is_valid_metadata(&mut self) -> bool {
        match &mut self.state {
            MetadataState::Unloaded => false,
            MetadataState::Validated(_) => true,
            MetadataState::Raw(document) => {
                if !document
                    .get(INIT_KEY)
                    .and_then(Value::as_object)
                    .is_some_and(|init| !init.is_empty())
                {
                    return false;
                }
                let Some(Value::Object(init)) = document
                    .as_object_mut()
                    .and_then(|map| map.remove(INIT_KEY))
                else {
                    return false;
                };
                self.state = MetadataState::Validated(init);
                true
            }
        }
    }

    /// Apply the selected configs to the host
    ///
    /// Sections run in the order packages, groups, users, sources, files,
    /// commands, services.
    ///
    /// # Errors
    ///
    /// [`Error::Retrieval`] for a document without a valid init mapping,
    /// [`Error::Configuration`] for a bad configSets reference, and the first
    /// failing section's error otherwise.
    #[tracing::instrument(skip(self, runtime), fields(stack = %self.stack))]
    pub fn cfn_init(&mut self, runtime: &Runtime, config_sets: Option<&str>) -> Result<()> {
        if !self.is_valid_metadata() {
            return Err(Error::Retrieval(format!(
                "metadata has no valid {INIT_KEY} mapping"
            )));
        }
        let Some(init) = self.document() else {
            return Ok(());
        };

        for name in configsets::resolve(init, config_sets)? {
            let Some(config) = init.get(&name).and_then(Value::as_object) else {
                continue;
            };
            tracing::info!(config = %name, "Applying config");
            apply_config(config, runtime)?;
        }
        Ok(())
    }

    /// One monitoring cycle for this resource
    ///
    /// Restarts services that should run and fires `post.update` when the
    /// metadata changed since the last cycle.
    #[tracing::instrument(skip(self, runtime, hooks), fields(resource = ?self.resource))]
    pub fn cfn_hup(&mut self, runtime: &Runtime, hooks: &[Hook]) {
        if self.is_valid_metadata()
            && let Some(services) = self
                .document()
                .and_then(|init| init.get("config"))
                .and_then(|config| config.get("services"))
        {
            ServicesHandler::new(services, runtime.executor(), runtime.run_as())
                .with_hooks(self.resource.as_deref(), hooks)
                .monitor_services();
        }

        if self.changed
            && let Some(resource) = self.resource.as_deref()
        {
            tracing::info!(resource, "Metadata changed");
            fire(hooks, POST_UPDATE, resource, runtime.executor());
        }
    }
}

impl fmt::Display for Metadata {
    /// The document as compact JSON: the whole document before validation,
    /// the init mapping after it, nothing while unloaded
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = match &self.state {
            MetadataState::Unloaded => return Ok(()),
            MetadataState::Raw(document) => serde_json::to_string(document),
            MetadataState::Validated(init) => serde_json::to_string(init),
        };
        f.write_str(&rendered.map_err(|_| fmt::Error)?)
    }
}

fn fire(hooks: &[Hook], event: &str, resource: &str, executor: &dyn Executor) {
    for hook in hooks {
        if let Some(runner) = hook.event(event, resource, executor)
            && !runner.succeeded()
        {
            tracing::warn!(hook = %hook.name, "Hook failed\n{runner}");
        }
    }
}

fn section<'a>(config: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    let value = config.get(key)?;
    let section = value.as_object();
    if section.is_none() {
        tracing::warn!(section = key, "Ignoring section that is not a mapping");
    }
    section
}

fn apply_config(config: &Map<String, Value>, runtime: &Runtime) -> Result<()> {
    if let Some(packages) = section(config, "packages") {
        PackagesHandler::new(packages, runtime).apply()?;
    }
    if let Some(groups) = section(config, "groups") {
        GroupsHandler::new(groups, runtime).apply()?;
    }
    if let Some(users) = section(config, "users") {
        UsersHandler::new(users, runtime).apply()?;
    }
    if let Some(sources) = section(config, "sources") {
        SourcesHandler::new(sources, runtime).apply()?;
    }
    if let Some(files) = section(config, "files") {
        FilesHandler::new(files, runtime).apply()?;
    }
    if let Some(commands) = section(config, "commands") {
        CommandsHandler::new(commands, runtime).apply()?;
    }
    if let Some(services) = config.get("services") {
        ServicesHandler::new(services, runtime.executor(), runtime.run_as()).apply_services();
    }
    Ok(())
}

fn parse_input(input: &MetadataInput) -> Result<Value> {
    let document = match input {
        MetadataInput::Text(text) => serde_json::from_str(text)
            .map_err(|e| Error::Retrieval(format!("invalid metadata string: {e}")))?,
        MetadataInput::Value(value) => value.clone(),
    };
    if document.is_object() {
        Ok(document)
    } else {
        Err(Error::Retrieval("metadata is not a JSON object".to_string()))
    }
}

/// Read a JSON object from `path`; absent, empty or malformed files yield `None`
fn load_document(path: &Path) -> Option<Value> {
    let content = fs::read_to_string(path).ok()?;
    if content.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(&content) {
        Ok(document) if document.is_object() => Some(document),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "Ignoring metadata that is not a JSON object");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "Ignoring malformed metadata: {e}");
            None
        }
    }
}

fn write_cache(path: &Path, document: &Value) -> Result<()> {
    let to_write_error = |e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(to_write_error)?;
    }
    let mut content = serde_json::to_string_pretty(document)?;
    content.push('\n');
    fs::write(path, content).map_err(to_write_error)?;
    tracing::debug!(path = %path.display(), "Cached metadata");
    Ok(())
}
