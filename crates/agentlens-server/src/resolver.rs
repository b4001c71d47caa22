use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::traits::SessionPathResolver;

/// Default resolver: find `<session-id>.jsonl` under the configured
/// transcript roots. Good enough for a local install; deployments with an
/// index swap in their own [`SessionPathResolver`].
pub struct DirectoryResolver {
    roots: Vec<PathBuf>,
}

impl DirectoryResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

#[async_trait]
impl SessionPathResolver for DirectoryResolver {
    async fn resolve_session_path(&self, session_id: &str) -> Option<PathBuf> {
        let roots = self.roots.clone();
        let file_name = OsString::from(format!("{session_id}.jsonl"));

        let scan = tokio::task::spawn_blocking(move || {
            for root in roots {
                for entry in walkdir::WalkDir::new(&root)
                    .follow_links(false)
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                {
                    let path = entry.path();
                    if path.is_file() && path.file_name() == Some(file_name.as_os_str()) {
                        return Some(path.to_path_buf());
                    }
                }
            }
            None
        });

        scan.await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_session_files_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("project-a");
        std::fs::create_dir_all(&nested).unwrap();
        let path = nested.join("11111111-2222-4333-8444-555555555555.jsonl");
        std::fs::write(&path, "").unwrap();

        let resolver = DirectoryResolver::new(vec![dir.path().to_path_buf()]);
        let found = resolver
            .resolve_session_path("11111111-2222-4333-8444-555555555555")
            .await;
        assert_eq!(found, Some(path));

        let missing = resolver.resolve_session_path("deadbeef").await;
        assert!(missing.is_none());
    }
}
