//! Get-metadata command implementation

use clap::Args;
use serde_json::Value;

use crate::command::Command;
use crate::common::{CredentialArgs, RuntimeContext};
use crate::error::{CommandError, Result};

/// Print the metadata of a resource as JSON
#[derive(Debug, Args)]
pub struct GetMetadataCommand {
    /// Stack name
    #[arg(short, long)]
    pub stack: String,

    /// Logical resource ID
    #[arg(short, long)]
    pub resource: String,

    /// Print only this top-level key
    #[arg(short, long)]
    pub key: Option<String>,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

impl GetMetadataCommand {
    /// The whole document, or the value under `key`
    ///
    /// # Errors
    ///
    /// [`CommandError::KeyNotFound`] when `key` is absent.
    pub fn select<'a>(&self, document: &'a Value) -> Result<&'a Value> {
        match &self.key {
            None => Ok(document),
            Some(key) => document
                .get(key)
                .ok_or_else(|| CommandError::KeyNotFound { key: key.clone() }),
        }
    }
}

impl Command for GetMetadataCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let options = self
            .credentials
            .retrieve_options(context.paths(), Some(&self.stack));
        let metadata = context.retrieve(&self.stack, Some(&self.resource), &options)?;

        let Some(document) = metadata.raw() else {
            return Ok(());
        };
        println!("{}", serde_json::to_string_pretty(self.select(document)?)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use serde_json::json;

    fn command(key: Option<&str>) -> GetMetadataCommand {
        GetMetadataCommand {
            stack: "teststack".into(),
            resource: "WebServer".into(),
            key: key.map(str::to_string),
            credentials: CredentialArgs::default(),
        }
    }

    #[test]
    fn test_select_whole_document() {
        let document = json!({"foo": {"bar": 1}});
        assert_eq!(command(None).select(&document).unwrap(), &document);
    }

    #[test]
    fn test_select_key() {
        let document = json!({"foo": {"bar": 1}});
        assert_eq!(
            command(Some("foo")).select(&document).unwrap(),
            &json!({"bar": 1})
        );
        assert!(matches!(
            command(Some("baz")).select(&document),
            Err(CommandError::KeyNotFound { .. })
        ));
    }
}
