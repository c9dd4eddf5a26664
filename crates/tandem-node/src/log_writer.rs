//! Session log persistence.
//!
//! Each hidden app hands over its rendered log. Writes run on spawned tasks
//! so the frame loop never waits on the disk. Finished writes are collected
//! on each new write and [`LogWriter::flush`] waits for the rest on shutdown.

use std::path::PathBuf;

use tandem_proto::Role;
use tokio::{
    fs,
    io::AsyncWriteExt,
    task::{JoinError, JoinSet},
};
use tracing::{debug, warn};

use crate::error::{NodeError, Result};

/// Appends session logs to `<dir>/<role>-<app>.log`.
#[derive(Debug)]
pub struct LogWriter {
    dir: Option<PathBuf>,
    role: Role,
    writes: JoinSet<Result<PathBuf>>,
}

impl LogWriter {
    /// Writer into `dir`; `None` drops every log.
    pub fn new(dir: Option<PathBuf>, role: Role) -> Self {
        Self { dir, role, writes: JoinSet::new() }
    }

    /// File that `app_name`'s logs are appended to.
    pub fn path_for(&self, app_name: &str) -> Option<PathBuf> {
        let role = match self.role {
            Role::Therapist => "therapist",
            Role::Patient => "patient",
            Role::Unassigned => "unassigned",
        };
        self.dir.as_ref().map(|dir| dir.join(format!("{role}-{app_name}.log")))
    }

    /// Queue an append of `contents`. Returns immediately, after collecting
    /// writes that already finished.
    pub fn persist(&mut self, app_name: &str, contents: String) {
        self.reap();
        let Some(path) = self.path_for(app_name) else {
            debug!(app = app_name, "no log directory, session log dropped");
            return;
        };
        self.writes.spawn(append(path, contents));
    }

    /// Collect finished writes without waiting.
    fn reap(&mut self) -> Vec<PathBuf> {
        let mut written = Vec::new();
        while let Some(joined) = self.writes.try_join_next() {
            written.extend(settled(joined));
        }
        written
    }

    /// Writes not yet collected.
    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    /// Wait for every queued write. Failures are logged and skipped; the
    /// paths written are returned.
    pub async fn flush(&mut self) -> Vec<PathBuf> {
        let mut written = Vec::new();
        while let Some(joined) = self.writes.join_next().await {
            written.extend(settled(joined));
        }
        written
    }
}

fn settled(joined: std::result::Result<Result<PathBuf>, JoinError>) -> Option<PathBuf> {
    match joined {
        Ok(Ok(path)) => Some(path),
        Ok(Err(error)) => {
            warn!(%error, "session log lost");
            None
        },
        Err(error) => {
            warn!(%error, "session log task failed");
            None
        },
    }
}

async fn append(path: PathBuf, contents: String) -> Result<PathBuf> {
    let write = async {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;
        Ok::<_, std::io::Error>(())
    };
    match write.await {
        Ok(()) => {
            debug!(path = %path.display(), bytes = contents.len(), "session log written");
            Ok(path)
        },
        Err(source) => Err(NodeError::LogWrite { path, source }),
    }
}
