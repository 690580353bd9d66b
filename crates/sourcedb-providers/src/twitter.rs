//! Twitter/X sourcing via the companion fetch script.
//!
//! There is no affordable official search API, so collection happens in a
//! Python script driving a logged-in session. The script takes one keyword
//! per invocation and prints a JSON array of posts on stdout; this module
//! spawns it per keyword and merges the output.

use std::path::PathBuf;

use serde_json::Value;
use tracing::warn;

use crate::error::ProviderError;

/// Runs the external twitter fetch script, one invocation per keyword.
#[derive(Debug, Clone)]
pub struct TwitterFetcher {
    python_bin: String,
    script: PathBuf,
    auth_token: String,
    ct0: String,
}

impl TwitterFetcher {
    /// Builds a fetcher when both session cookies are configured.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingConfig`] when either cookie is absent;
    /// the script cannot authenticate without both.
    pub fn new(
        python_bin: &str,
        script: &std::path::Path,
        auth_token: Option<&str>,
        ct0: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let auth_token = auth_token.ok_or(ProviderError::MissingConfig("TWITTER_AUTH_TOKEN"))?;
        let ct0 = ct0.ok_or(ProviderError::MissingConfig("TWITTER_CT0"))?;
        Ok(Self {
            python_bin: python_bin.to_owned(),
            script: script.to_owned(),
            auth_token: auth_token.to_owned(),
            ct0: ct0.to_owned(),
        })
    }

    /// Fetches posts for each keyword, at most `per_keyword` per keyword.
    ///
    /// A non-zero exit is tolerated when the script still produced parseable
    /// items (partial scrapes routinely exit dirty); non-zero with nothing
    /// usable fails the batch. Every item is stamped with the keyword it was
    /// fetched for if the script did not set one.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::Subprocess`] if the script cannot be spawned, or
    ///   exits non-zero without producing any items.
    pub async fn fetch(
        &self,
        keywords: &[String],
        per_keyword: usize,
        mode: &str,
    ) -> Result<Vec<Value>, ProviderError> {
        let per_keyword = per_keyword.max(1);
        let mut all = Vec::new();

        for keyword in keywords.iter().filter(|k| !k.trim().is_empty()) {
            let keyword = keyword.trim();
            let output = tokio::process::Command::new(&self.python_bin)
                .arg(&self.script)
                .args(["--keywords", keyword])
                .args(["--count", &per_keyword.to_string()])
                .args(["--mode", mode])
                .env("TWITTER_AUTH_TOKEN", &self.auth_token)
                .env("TWITTER_CT0", &self.ct0)
                .output()
                .await
                .map_err(|e| ProviderError::Subprocess(format!("spawn twitter fetch: {e}")))?;

            let stdout = String::from_utf8_lossy(&output.stdout);
            let mut items: Vec<Value> =
                serde_json::from_str(stdout.trim()).unwrap_or_default();

            if !output.status.success() && items.is_empty() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let detail = if stderr.trim().is_empty() {
                    stdout.trim().to_owned()
                } else {
                    stderr.trim().to_owned()
                };
                return Err(ProviderError::Subprocess(format!(
                    "twitter fetch failed for '{keyword}': {detail}"
                )));
            }
            if !output.status.success() {
                warn!(
                    keyword,
                    items = items.len(),
                    "twitter fetch exited non-zero but produced items, keeping them"
                );
            }

            items.truncate(per_keyword);
            for item in &mut items {
                if let Value::Object(map) = item {
                    let missing = map
                        .get("keyword")
                        .and_then(Value::as_str)
                        .is_none_or(|k| k.trim().is_empty());
                    if missing {
                        map.insert("keyword".to_owned(), Value::String(keyword.to_owned()));
                    }
                }
            }
            all.extend(items);
        }

        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn script_with(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twitter_fetch.py");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{body}").unwrap();
        (dir, path)
    }

    #[test]
    fn missing_credentials_is_a_config_error() {
        let result = TwitterFetcher::new(
            "python3",
            std::path::Path::new("./twitter_fetch.py"),
            Some("tok"),
            None,
        );
        assert!(matches!(
            result,
            Err(ProviderError::MissingConfig("TWITTER_CT0"))
        ));
    }

    #[tokio::test]
    async fn collects_and_stamps_keyword() {
        let (_dir, script) = script_with(
            r#"
import json, sys
print(json.dumps([
    {"id": "1", "title": "a"},
    {"id": "2", "title": "b", "keyword": "already-set"},
]))
"#,
        );
        let fetcher =
            TwitterFetcher::new("python3", &script, Some("tok"), Some("ct0")).unwrap();
        let items = fetcher
            .fetch(&["rust".to_string()], 5, "latest")
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["keyword"], "rust");
        assert_eq!(items[1]["keyword"], "already-set");
    }

    #[tokio::test]
    async fn truncates_to_per_keyword_budget() {
        let (_dir, script) = script_with(
            r#"
import json
print(json.dumps([{"id": str(i)} for i in range(10)]))
"#,
        );
        let fetcher =
            TwitterFetcher::new("python3", &script, Some("tok"), Some("ct0")).unwrap();
        let items = fetcher
            .fetch(&["rust".to_string()], 3, "latest")
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn dirty_exit_with_items_is_tolerated() {
        let (_dir, script) = script_with(
            r#"
import json, sys
print(json.dumps([{"id": "1"}]))
sys.exit(2)
"#,
        );
        let fetcher =
            TwitterFetcher::new("python3", &script, Some("tok"), Some("ct0")).unwrap();
        let items = fetcher
            .fetch(&["rust".to_string()], 5, "latest")
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn dirty_exit_without_items_fails() {
        let (_dir, script) = script_with(
            r#"
import sys
print("boom", file=sys.stderr)
sys.exit(1)
"#,
        );
        let fetcher =
            TwitterFetcher::new("python3", &script, Some("tok"), Some("ct0")).unwrap();
        let result = fetcher.fetch(&["rust".to_string()], 5, "latest").await;
        assert!(matches!(result, Err(ProviderError::Subprocess(_))));
    }

    #[tokio::test]
    async fn blank_keywords_are_skipped() {
        let (_dir, script) = script_with("import json; print(json.dumps([{\"id\": \"1\"}]))");
        let fetcher =
            TwitterFetcher::new("python3", &script, Some("tok"), Some("ct0")).unwrap();
        let items = fetcher
            .fetch(&["  ".to_string(), String::new()], 5, "latest")
            .await
            .unwrap();
        assert!(items.is_empty());
    }
}
