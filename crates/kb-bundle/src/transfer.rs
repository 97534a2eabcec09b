//! Publishing and copying bundles between sources.

use std::path::Path;

use kb_core::Application;
use tracing::{info, warn};

use crate::bundle::{BundleFile, BundleRef};
use crate::error::{BundleError, BundleResult};
use crate::source::Source;

/// Build a bundle from an application document on disk and store it.
pub async fn publish(
    app_path: &Path,
    images_path: Option<&Path>,
    dest: &dyn Source,
) -> BundleResult<BundleRef> {
    let doc = tokio::fs::read(app_path).await?;
    let application: Application =
        serde_yaml::from_slice(&doc).map_err(|e| BundleError::Document(e.to_string()))?;
    let images = match images_path {
        Some(path) => Some(tokio::fs::read(path).await?),
        None => None,
    };

    let bundle = BundleFile::build(&application, images.as_deref())?;
    dest.put(&bundle).await?;
    info!(
        bundle = %bundle.reference(),
        dest = %dest.describe(),
        sha256 = %bundle.sha256(),
        "bundle published"
    );
    Ok(bundle.reference().clone())
}

/// Copy bundles from one source to another.
///
/// A failed read aborts the copy. A failed write is logged and the copy
/// moves on; the returned list holds the bundles that were written.
pub async fn copy(
    bundles: &[BundleRef],
    from: &dyn Source,
    to: &dyn Source,
) -> BundleResult<Vec<BundleRef>> {
    let mut copied = Vec::new();
    for bundle in bundles {
        let file = from.get(bundle).await?;
        match to.put(&file).await {
            Ok(()) => {
                info!(bundle = %file.reference(), to = %to.describe(), "bundle copied");
                copied.push(file.reference().clone());
            }
            Err(e) => {
                warn!(bundle = %file.reference(), to = %to.describe(), error = %e, "failed to copy bundle");
            }
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::tests::test_app;
    use crate::directory::DirectorySource;
    use crate::multi::MultiSource;

    #[tokio::test]
    async fn publish_writes_bundle_and_side_file() {
        let dir = tempfile::tempdir().unwrap();
        let app_path = dir.path().join("app.yaml");
        std::fs::write(&app_path, serde_yaml::to_string(&test_app("app", "2.0.0")).unwrap())
            .unwrap();
        let images_path = dir.path().join("images.tar");
        std::fs::write(&images_path, b"layers").unwrap();

        let dest = DirectorySource::new(dir.path().join("out"));
        let published = publish(&app_path, Some(&images_path), &dest).await.unwrap();
        assert_eq!(published, BundleRef::new("app", "2.0.0"));

        let fetched = dest.get(&BundleRef::latest("app")).await.unwrap();
        assert!(fetched.has_images());
    }

    #[tokio::test]
    async fn copy_moves_bundles_between_directories() {
        let from_dir = tempfile::tempdir().unwrap();
        let to_dir = tempfile::tempdir().unwrap();
        let from = DirectorySource::new(from_dir.path());
        for name in ["pg", "app"] {
            from.put(&BundleFile::build(&test_app(name, "1.0.0"), None).unwrap())
                .await
                .unwrap();
        }

        let to = DirectorySource::new(to_dir.path());
        let refs = vec![BundleRef::latest("pg"), BundleRef::new("app", "1.0.0")];
        let copied = copy(&refs, &from, &to).await.unwrap();
        assert_eq!(copied.len(), 2);
        assert!(to.get(&BundleRef::new("pg", "1.0.0")).await.is_ok());
    }

    #[tokio::test]
    async fn copy_continues_past_failed_writes() {
        let from_dir = tempfile::tempdir().unwrap();
        let from = DirectorySource::new(from_dir.path());
        from.put(&BundleFile::build(&test_app("pg", "1.0.0"), None).unwrap())
            .await
            .unwrap();

        let unwritable = MultiSource::new(Vec::new());
        let copied = copy(&[BundleRef::latest("pg")], &from, &unwritable)
            .await
            .unwrap();
        assert!(copied.is_empty());
    }

    #[tokio::test]
    async fn copy_aborts_on_missing_bundle() {
        let from_dir = tempfile::tempdir().unwrap();
        let to_dir = tempfile::tempdir().unwrap();
        let err = copy(
            &[BundleRef::latest("ghost")],
            &DirectorySource::new(from_dir.path()),
            &DirectorySource::new(to_dir.path()),
        )
        .await
        .unwrap_err();
        assert!(err.is_not_found());
    }
}
