use std::io;
use std::path::{Path, PathBuf};

const DATA_DIR_NAME: &str = "bmrs_cache";

pub fn get_data_dir() -> io::Result<PathBuf> {
    dirs::cache_dir()
        .map(|p| p.join(DATA_DIR_NAME))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "could not determine system cache directory",
            )
        })
}

pub async fn ensure_dir_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!(
                        "data path exists but is not a directory: {}",
                        path.display()
                    ),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(path).await
        }
        Err(e) => Err(e),
    }
}
