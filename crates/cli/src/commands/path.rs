//! `repofetch path`: print where a rule is materialized.

use super::CommandContext;
use crate::cli::{CliError, OkEnvelope};
use repofetch_core::{WorkspaceError, marker};
use serde::Serialize;

/// Location and state of one repository.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RepositoryPath {
    /// Rule name.
    pub name: String,
    /// Repository directory.
    pub path: String,
    /// Whether a completed fetch for the current declaration is on disk.
    pub complete: bool,
}

/// Resolve the repository directory for `rule`. Nothing is fetched.
///
/// # Errors
///
/// Returns [`CliError::Config`] if `rule` is not declared.
pub async fn execute(ctx: &CommandContext, rule: &str) -> Result<RepositoryPath, CliError> {
    let declared = ctx
        .workspace()
        .rule(rule)
        .ok_or_else(|| WorkspaceError::UnknownRule {
            name: rule.to_string(),
        })?;

    Ok(RepositoryPath {
        name: rule.to_string(),
        path: ctx.layout().repository_dir(rule).display().to_string(),
        complete: marker::is_complete(ctx.layout(), declared).await,
    })
}

/// Text or JSON rendering of a [`RepositoryPath`].
///
/// # Errors
///
/// Returns [`CliError::Other`] if JSON serialization fails.
pub fn render(path: &RepositoryPath, json: bool) -> Result<String, CliError> {
    if json {
        serde_json::to_string(&OkEnvelope::new(path))
            .map_err(|e| CliError::other(format!("Failed to serialize result: {e}")))
    } else {
        Ok(path.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> CommandContext {
        let workspace = temp.path().join("WORKSPACE.toml");
        std::fs::write(
            &workspace,
            "[[http_archive]]\nname = \"png\"\nurl = \"https://example.com/png.tar.gz\"\n",
        )
        .unwrap();
        CommandContext::load(&workspace, Some(temp.path()), false).unwrap()
    }

    #[tokio::test]
    async fn test_path_of_unfetched_rule() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);

        let path = execute(&ctx, "png").await.unwrap();

        assert_eq!(
            path.path,
            temp.path().join("external").join("png").display().to_string()
        );
        assert!(!path.complete);
        assert_eq!(render(&path, false).unwrap(), path.path);
    }

    #[tokio::test]
    async fn test_unknown_rule() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);

        let err = execute(&ctx, "zlib").await.unwrap_err();

        assert!(matches!(err, CliError::Config { .. }));
        assert!(err.to_string().contains("zlib"));
    }

    #[test]
    fn test_json_rendering() {
        let path = RepositoryPath {
            name: "png".into(),
            path: "/out/external/png".into(),
            complete: true,
        };
        let json: serde_json::Value =
            serde_json::from_str(&render(&path, true).unwrap()).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["data"]["name"], "png");
        assert_eq!(json["data"]["complete"], true);
    }
}
