//! Append-only order journal and the persistence adapter built on it.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::limits::MAX_BATCH_SIZE;
use crate::model::*;
use crate::persist::{OrderPersistence, PersistError};

/// Encode one batch as `[len][bincode][crc32]`.
fn encode_batch(writer: &mut impl Write, batch: &OrderBatch) -> io::Result<()> {
    let payload =
        bincode::serialize(batch).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read the next 4-byte little-endian word. `None` on a clean or torn end.
fn read_u32(reader: &mut impl Read) -> io::Result<Option<u32>> {
    let mut buf = [0u8; 4];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(u32::from_le_bytes(buf))),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Append-only log of persisted order batches.
///
/// Format per entry: `[u32: len][bincode: OrderBatch][u32: crc32]`.
/// A torn or corrupt tail (crash mid-write) ends replay at the last good entry.
pub struct Journal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Journal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append and fsync a single batch.
    #[cfg(test)]
    pub fn append(&mut self, batch: &OrderBatch) -> io::Result<()> {
        self.append_buffered(batch)?;
        self.flush_sync()
    }

    /// Buffer a batch without syncing. Follow with `flush_sync()`.
    pub fn append_buffered(&mut self, batch: &OrderBatch) -> io::Result<()> {
        encode_batch(&mut self.writer, batch)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Rewrite the journal as a single batch holding `latest`, via a temp
    /// file renamed over the original.
    pub fn compact(&mut self, latest: &HashMap<ItemId, OrderUpdate>) -> io::Result<()> {
        let tmp_path = self.path.with_extension("journal.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            encode_batch(&mut writer, &snapshot_batch(latest))?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Every intact batch on disk, oldest first. A missing file is empty.
    pub fn replay(path: &Path) -> io::Result<Vec<OrderBatch>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut batches = Vec::new();

        while let Some(len) = read_u32(&mut reader)? {
            let mut payload = vec![0u8; len as usize];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let Some(stored_crc) = read_u32(&mut reader)? else {
                break;
            };
            if stored_crc != crc32fast::hash(&payload) {
                break;
            }
            match bincode::deserialize::<OrderBatch>(&payload) {
                Ok(batch) => batches.push(batch),
                Err(_) => break,
            }
        }
        Ok(batches)
    }

    /// Fold replayed batches into the last stored value per item.
    pub fn latest_orders(path: &Path) -> io::Result<HashMap<ItemId, OrderUpdate>> {
        let mut latest = HashMap::new();
        for batch in Self::replay(path)? {
            for update in batch.updates {
                latest.insert(update.id, update);
            }
        }
        Ok(latest)
    }
}

/// All latest values as one batch, grouped by container and sorted by order.
fn snapshot_batch(latest: &HashMap<ItemId, OrderUpdate>) -> OrderBatch {
    let mut updates: Vec<OrderUpdate> = latest.values().copied().collect();
    updates.sort_by(|a, b| {
        a.container_id
            .cmp(&b.container_id)
            .then(a.order.total_cmp(&b.order))
    });
    OrderBatch { updates }
}

// ── Inspection ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemView {
    pub id: ItemId,
    pub order: OrderKey,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerView {
    pub container_id: ContainerId,
    pub items: Vec<ItemView>,
}

/// What a journal on disk currently says.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inspection {
    /// Intact batches found before any compaction.
    pub batches: usize,
    /// Containers by id, items by stored order.
    pub containers: Vec<ContainerView>,
    pub compacted: bool,
}

/// Replay `path` and group the last stored value of every item by container.
/// With `compact`, a journal holding more than one batch is then rewritten
/// to that single state.
pub fn inspect(path: &Path, compact: bool) -> io::Result<Inspection> {
    let batches = Journal::replay(path)?;
    let mut latest = HashMap::new();
    for batch in &batches {
        for update in &batch.updates {
            latest.insert(update.id, *update);
        }
    }

    let mut by_container: BTreeMap<ContainerId, Vec<ItemView>> = BTreeMap::new();
    for update in latest.values() {
        by_container.entry(update.container_id).or_default().push(ItemView {
            id: update.id,
            order: update.order,
        });
    }
    let containers = by_container
        .into_iter()
        .map(|(container_id, mut items)| {
            items.sort_by(|a, b| a.order.total_cmp(&b.order).then(a.id.cmp(&b.id)));
            ContainerView {
                container_id,
                items,
            }
        })
        .collect();

    let compacted = compact && batches.len() > 1;
    if compacted {
        Journal::open(path)?.compact(&latest)?;
    }
    Ok(Inspection {
        batches: batches.len(),
        containers,
        compacted,
    })
}

// ── Journal-backed persistence ───────────────────────────────────

enum JournalCommand {
    Append {
        batch: OrderBatch,
        response: oneshot::Sender<io::Result<()>>,
    },
    Latest {
        response: oneshot::Sender<HashMap<ItemId, OrderUpdate>>,
    },
    Compact {
        response: oneshot::Sender<io::Result<()>>,
    },
}

/// [`OrderPersistence`] over a [`Journal`]. A background task owns the file
/// and group-commits: it drains every append already queued, fsyncs once,
/// then answers all of them.
pub struct JournalPersistence {
    tx: mpsc::Sender<JournalCommand>,
}

impl JournalPersistence {
    /// Open (or create) the journal and spawn its writer. Must be called
    /// inside a tokio runtime.
    pub fn open(path: PathBuf, compact_threshold: u64) -> io::Result<Self> {
        let latest = Journal::latest_orders(&path)?;
        let journal = Journal::open(&path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(writer_loop(journal, latest, compact_threshold.max(1), rx));
        Ok(Self { tx })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> JournalCommand,
    ) -> Result<T, PersistError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| PersistError::Closed)?;
        rx.await.map_err(|_| PersistError::Closed)
    }

    /// Last stored value per item, including everything replayed at open.
    pub async fn latest_orders(&self) -> Result<HashMap<ItemId, OrderUpdate>, PersistError> {
        self.request(|response| JournalCommand::Latest { response })
            .await
    }

    pub async fn compact(&self) -> Result<(), PersistError> {
        self.request(|response| JournalCommand::Compact { response })
            .await?
            .map_err(|e| PersistError::Io(e.to_string()))
    }
}

#[async_trait]
impl OrderPersistence for JournalPersistence {
    async fn persist_order(&self, items: Vec<OrderUpdate>) -> Result<(), PersistError> {
        if items.len() > MAX_BATCH_SIZE {
            return Err(PersistError::Rejected("batch too large".into()));
        }
        let batch = OrderBatch { updates: items };
        self.request(|response| JournalCommand::Append { batch, response })
            .await?
            .map_err(|e| PersistError::Io(e.to_string()))
    }
}

async fn writer_loop(
    mut journal: Journal,
    mut latest: HashMap<ItemId, OrderUpdate>,
    compact_threshold: u64,
    mut rx: mpsc::Receiver<JournalCommand>,
) {
    while let Some(cmd) = rx.recv().await {
        let (batch, response) = match cmd {
            JournalCommand::Append { batch, response } => (batch, response),
            other => {
                handle_other(&mut journal, &latest, other);
                continue;
            }
        };

        let mut pending = vec![(batch, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(JournalCommand::Append { batch, response }) => pending.push((batch, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
            .record(pending.len() as f64);
        let flush_start = std::time::Instant::now();
        let results = flush_pending(&mut journal, &pending);
        metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());

        let mut stored = 0;
        for ((batch, _), result) in pending.iter().zip(&results) {
            if result.is_ok() {
                stored += 1;
                for update in &batch.updates {
                    latest.insert(update.id, *update);
                }
            }
        }
        if stored > 0 && journal.appends_since_compact() >= compact_threshold {
            match journal.compact(&latest) {
                Ok(()) => tracing::debug!("journal {} compacted", journal.path().display()),
                Err(e) => tracing::warn!("journal compaction failed: {e}"),
            }
        }

        for ((_, response), result) in pending.into_iter().zip(results) {
            let _ = response.send(result);
        }

        if let Some(other) = deferred {
            handle_other(&mut journal, &latest, other);
        }
    }
}

/// Buffer every pending batch, then flush once. Returns one result per batch.
fn flush_pending(
    journal: &mut Journal,
    pending: &[(OrderBatch, oneshot::Sender<io::Result<()>>)],
) -> Vec<io::Result<()>> {
    let mut appended = 0;
    let mut append_err = None;
    for (batch, _) in pending {
        if let Err(e) = journal.append_buffered(batch) {
            append_err = Some(e);
            break;
        }
        appended += 1;
    }
    // Flush even after a failed append so half-buffered bytes do not leak
    // into the next group.
    let flush_result = journal.flush_sync();
    group_outcome(pending.len(), appended, append_err.as_ref(), &flush_result)
}

/// Batches buffered before the first failed append are durable once the
/// flush succeeds. The failed batch and everything queued behind it are not.
fn group_outcome(
    len: usize,
    appended: usize,
    append_err: Option<&io::Error>,
    flush_result: &io::Result<()>,
) -> Vec<io::Result<()>> {
    let copy = |e: &io::Error| Err(io::Error::new(e.kind(), e.to_string()));
    (0..len)
        .map(|i| match (flush_result, append_err) {
            (Err(e), _) => copy(e),
            (Ok(()), Some(e)) if i >= appended => copy(e),
            (Ok(()), _) => Ok(()),
        })
        .collect()
}

fn handle_other(
    journal: &mut Journal,
    latest: &HashMap<ItemId, OrderUpdate>,
    cmd: JournalCommand,
) {
    match cmd {
        JournalCommand::Latest { response } => {
            let _ = response.send(latest.clone());
        }
        JournalCommand::Compact { response } => {
            let _ = response.send(journal.compact(latest));
        }
        JournalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}
