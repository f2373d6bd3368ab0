// src/console.rs
use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::fs::File;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncSeekExt, BufReader};

use crate::triggers::StreamDispatcher;

/// Decodes one raw console line, dropping the line terminator.
fn decode_line(raw: &[u8]) -> String {
    let mut line = String::from_utf8_lossy(raw).into_owned();
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    line
}

/// Dispatches every line of `reader` in order until EOF. Returns the number
/// of lines read.
pub async fn pump_lines<R>(mut reader: R, dispatcher: &StreamDispatcher) -> io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        dispatcher.dispatch(&decode_line(&buf)).await;
        count += 1;
    }
    debug!("Stream for server {:?} ended after {} lines", dispatcher.server_id(), count);
    Ok(count)
}

/// Tails `path` from its current end, dispatching each complete line.
///
/// Only new output is streamed. A partially written line is held until its
/// newline arrives. A file that is missing, truncated, or replaced by a new
/// file (log rotation) is waited for and then read again from the start.
/// Returns only on an I/O error other than the file being absent.
pub async fn follow_file(path: &Path, dispatcher: &StreamDispatcher, poll: Duration) -> io::Result<()> {
    info!("Following {} for server {:?}", path.display(), dispatcher.server_id());

    let mut from_start = false;
    let mut reported_missing = false;
    loop {
        let file = match File::open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if !reported_missing {
                    warn!("{} does not exist yet, waiting for it", path.display());
                    reported_missing = true;
                }
                from_start = true;
                tokio::time::sleep(poll).await;
                continue;
            }
            Err(err) => return Err(err),
        };
        reported_missing = false;

        tail(path, file, from_start, dispatcher, poll).await?;
        from_start = true;
    }
}

/// Reads `file` until `path` is truncated, removed or points at another file.
async fn tail(
    path: &Path,
    mut file: File,
    from_start: bool,
    dispatcher: &StreamDispatcher,
    poll: Duration,
) -> io::Result<()> {
    let identity = file_identity(&file.metadata().await?);
    let mut position = if from_start {
        debug!("Reading {} from the start", path.display());
        0
    } else {
        file.seek(SeekFrom::End(0)).await?
    };
    let mut reader = BufReader::new(file);

    let mut pending = Vec::new();
    loop {
        let read = reader.read_until(b'\n', &mut pending).await?;
        position += read as u64;
        if read > 0 && pending.ends_with(b"\n") {
            dispatcher.dispatch(&decode_line(&pending)).await;
            pending.clear();
            continue;
        }

        tokio::time::sleep(poll).await;
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() < position => {
                warn!("{} was truncated, reading from the start", path.display());
                return Ok(());
            }
            Ok(meta) if file_identity(&meta) != identity => {
                info!("{} was replaced, reading the new file", path.display());
                return Ok(());
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!("{} was removed, waiting for it to reappear", path.display());
                return Ok(());
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_identity(_meta: &std::fs::Metadata) -> Option<(u64, u64)> {
    None
}
