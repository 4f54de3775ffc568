//! User-initiated export of a live visual to a file

use std::path::{Path, PathBuf};

use log::info;

use crate::data_url::DataUrl;
use crate::engine::EngineHandle;
use crate::{Error, ImageFormat, Result};

/// Export the visual behind `handle` as `<dir>/<stem>.<ext>`.
///
/// Unlike the snapshot chain there is no fallback: the engine's export is
/// the only source and its failure is returned to the caller.
pub async fn export_to_file(
    handle: &dyn EngineHandle,
    format: ImageFormat,
    dir: &Path,
    stem: &str,
) -> Result<PathBuf> {
    let url = handle.to_image(format).await.map_err(|e| match e {
        Error::Export { .. } => e,
        other => Error::Export {
            format,
            reason: other.to_string(),
        },
    })?;
    if url.is_empty() {
        return Err(Error::Export {
            format,
            reason: "engine returned an empty image".to_string(),
        });
    }

    let bytes = DataUrl::parse(&url)?.decode_bytes()?;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.{}", stem, format.extension()));
    tokio::fs::write(&path, &bytes).await?;
    info!("exported {} ({} bytes) to {}", format, bytes.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_url;
    use crate::Dimensions;
    use async_trait::async_trait;

    struct FixedExport(Option<String>);

    #[async_trait]
    impl EngineHandle for FixedExport {
        fn render(&self, _content: Option<&str>) -> Result<()> {
            Ok(())
        }

        fn update(&self, _dimensions: Dimensions) -> Result<()> {
            Ok(())
        }

        async fn to_image(&self, format: ImageFormat) -> Result<String> {
            match &self.0 {
                Some(url) => Ok(url.clone()),
                None => Err(Error::Other(format!("{} unsupported", format))),
            }
        }

        fn destroy(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn writes_decoded_bytes_next_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let handle = FixedExport(Some(data_url::encode_base64(ImageFormat::Png, b"\x89PNG")));

        let path = export_to_file(&handle, ImageFormat::Png, dir.path(), "infographic")
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("infographic.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG");
    }

    #[tokio::test]
    async fn engine_failures_become_export_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = export_to_file(&FixedExport(None), ImageFormat::Svg, dir.path(), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Export { format: ImageFormat::Svg, .. }));
        assert!(!dir.path().join("x.svg").exists());
    }
}
