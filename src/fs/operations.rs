use std::{io::ErrorKind, path::Path};

use tokio::{
    fs::{self, File},
    io::{self, AsyncWriteExt},
};

/// Replaces the file at `path` with `contents` so that readers see either the old or the new
/// contents, never a mix. The data is written to a sibling temporary file first and then renamed
/// over the target.
pub async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    let mut temporary = path.as_os_str().to_owned();
    temporary.push(".tmp");
    let temporary = Path::new(&temporary);

    let mut file = File::create(temporary).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(temporary, path).await
}

/// Reads the whole file. A missing file is not an error, it simply has no contents yet.
pub async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, io::Error> {
    match fs::read(path).await {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
