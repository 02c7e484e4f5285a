//! # Audit Log
//!
//! The security event log (`cheat.log`), separate from operational
//! `tracing` output.
//!
//! ## Architecture
//!
//! ```text
//!   login 1 ──┐
//!   login 2 ──┼──> [bounded channel] ──> [writer thread] ──> cheat.log
//!   admin   ──┘     try_send, drop          (single writer)
//!                   when full
//! ```
//!
//! Producers never block. When the queue is full the record is dropped and
//! counted, so a flood of bad logins cannot stall verification on disk I/O.
//! Passkeys are masked before they enter the queue.

use crate::error::{GuardError, GuardResult};
use chrono::NaiveDateTime;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use modsentry_core::Clock;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const HEAVY_RULE: &str =
    "================================================================================";
const LIGHT_RULE: &str =
    "--------------------------------------------------------------------------------";

/// Masks a passkey for logging.
///
/// ```text
/// ""                 -> NULL
/// "abc"              -> a****
/// "abcdefgh"         -> ab****h
/// "2026, Octob...Ga4E" -> 2026,***[41 chars]***xGa4E
/// ```
#[must_use]
pub fn mask_passkey(passkey: &str) -> String {
    let chars: Vec<char> = passkey.chars().collect();
    let len = chars.len();
    let take = |range: std::ops::Range<usize>| chars[range].iter().collect::<String>();

    match len {
        0 => "NULL".to_string(),
        1..=3 => format!("{}****", take(0..1)),
        4..=10 => format!("{}****{}", take(0..2), take(len - 1..len)),
        _ => format!(
            "{}***[{} chars]***{}",
            take(0..5),
            len - 10,
            take(len - 5..len)
        ),
    }
}

/// Kind of audited event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditKind {
    /// A passkey was derived for a player.
    Generation,
    /// Passkey check.
    PasskeyValidation,
    /// Checksum check.
    ChecksumValidation,
    /// Violation recorded by an admin.
    ManualViolation,
    /// Sensitivity analysis of a mismatch.
    Sensitivity,
    /// Reference artifact regenerated.
    Refresh,
    /// Internal failure.
    Error,
}

impl AuditKind {
    /// Upper-case label used in the log.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Generation => "GENERATION",
            Self::PasskeyValidation => "PASSKEY_VALIDATION",
            Self::ChecksumValidation => "CHECKSUM_VALIDATION",
            Self::ManualViolation => "MANUAL_VIOLATION",
            Self::Sensitivity => "SENSITIVITY",
            Self::Refresh => "REFRESH",
            Self::Error => "ERROR",
        }
    }
}

/// One audit log entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditRecord {
    kind: AuditKind,
    success: bool,
    player: Option<String>,
    identity: Option<String>,
    masked_passkey: Option<String>,
    reason: Option<String>,
    details: Option<String>,
}

impl AuditRecord {
    /// Starts a record.
    #[must_use]
    pub fn new(kind: AuditKind, success: bool) -> Self {
        Self {
            kind,
            success,
            player: None,
            identity: None,
            masked_passkey: None,
            reason: None,
            details: None,
        }
    }

    /// Sets the player name and stable identity.
    #[must_use]
    pub fn player(mut self, name: &str, identity: &str) -> Self {
        self.player = Some(name.to_string());
        self.identity = Some(identity.to_string());
        self
    }

    /// Attaches a passkey, masked immediately.
    #[must_use]
    pub fn passkey(mut self, passkey: &str) -> Self {
        self.masked_passkey = Some(mask_passkey(passkey));
        self
    }

    /// Sets the failure reason (printed for failures only).
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets free-form details.
    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// The event kind.
    #[must_use]
    pub fn kind(&self) -> AuditKind {
        self.kind
    }

    fn write_to(&self, out: &mut impl Write, at: NaiveDateTime) -> std::io::Result<()> {
        let status = if self.success { "SUCCESS" } else { "FAILURE" };
        writeln!(out, "{LIGHT_RULE}")?;
        writeln!(
            out,
            "[{}] {} - {status}",
            at.format(TIMESTAMP_FORMAT),
            self.kind.label()
        )?;
        writeln!(
            out,
            "Player: {} (UUID: {})",
            self.player.as_deref().unwrap_or("Unknown"),
            self.identity.as_deref().unwrap_or("Unknown")
        )?;
        writeln!(out, "Passkey: {}", self.masked_passkey.as_deref().unwrap_or("N/A"))?;
        if let (false, Some(reason)) = (self.success, &self.reason) {
            writeln!(out, "Failure Reason: {reason}")?;
        }
        if let Some(details) = self.details.as_deref().filter(|d| !d.is_empty()) {
            writeln!(out, "Details: {details}")?;
        }
        writeln!(out)
    }
}

enum Message {
    Record(AuditRecord, NaiveDateTime),
    Separator(String, NaiveDateTime),
    Flush(Sender<()>),
}

/// Handle to the audit writer.
///
/// Dropping it drains the queue and joins the writer thread.
pub struct AuditLog {
    sender: Option<Sender<Message>>,
    writer: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl AuditLog {
    /// Opens (appending) the log file at `path`.
    ///
    /// A new file gets a header.
    ///
    /// # Errors
    ///
    /// Fails if the file or its directory cannot be created.
    pub fn open(path: &Path, capacity: usize, clock: Arc<dyn Clock>) -> GuardResult<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| GuardError::storage(dir, e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| GuardError::storage(path, e))?;

        let is_new = file.metadata().map(|m| m.len() == 0).unwrap_or(false);
        if is_new {
            write_header(&mut file, clock.now()).map_err(|e| GuardError::storage(path, e))?;
        }

        tracing::info!(path = %path.display(), "audit log opened");
        Ok(Self::with_writer(file, capacity, clock))
    }

    /// Starts a log over any sink.
    #[must_use]
    pub fn with_writer<W: Write + Send + 'static>(
        writer: W,
        capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        let handle = thread::spawn(move || writer_loop(BufWriter::new(writer), &receiver));

        Self {
            sender: Some(sender),
            writer: Some(handle),
            dropped: Arc::new(AtomicU64::new(0)),
            clock,
        }
    }

    /// A log that discards everything.
    #[must_use]
    pub fn discard(clock: Arc<dyn Clock>) -> Self {
        Self::with_writer(std::io::sink(), 1, clock)
    }

    /// Queues a record. Returns `false` if it was dropped.
    pub fn record(&self, record: AuditRecord) -> bool {
        let kind = record.kind();
        self.offer(Message::Record(record, self.clock.now()), kind.label())
    }

    /// Queues a session separator (server start, player connect, ...).
    pub fn separator(&self, message: impl Into<String>) -> bool {
        self.offer(Message::Separator(message.into(), self.clock.now()), "SEPARATOR")
    }

    fn offer(&self, message: Message, label: &str) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        match sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(kind = label, dropped = total, "audit queue full, record dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Records dropped so far because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Blocks until everything queued before this call is written.
    pub fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack_tx, ack_rx) = bounded(1);
        if sender.send(Message::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

fn write_header(out: &mut impl Write, at: NaiveDateTime) -> std::io::Result<()> {
    writeln!(out, "{HEAVY_RULE}")?;
    writeln!(out, "MODSENTRY Event Log")?;
    writeln!(out, "Log Started: {}", at.format(TIMESTAMP_FORMAT))?;
    writeln!(out, "{HEAVY_RULE}")?;
    writeln!(out)
}

fn write_separator(out: &mut impl Write, message: &str, at: NaiveDateTime) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{HEAVY_RULE}")?;
    writeln!(out, "{message}")?;
    writeln!(out, "Timestamp: {}", at.format(TIMESTAMP_FORMAT))?;
    writeln!(out, "{HEAVY_RULE}")?;
    writeln!(out)
}

fn writer_loop<W: Write>(mut out: BufWriter<W>, receiver: &Receiver<Message>) {
    let mut failed = false;
    while let Ok(first) = receiver.recv() {
        let mut acks = Vec::new();
        for message in std::iter::once(first).chain(receiver.try_iter()) {
            let result = match message {
                Message::Record(record, at) => record.write_to(&mut out, at),
                Message::Separator(text, at) => write_separator(&mut out, &text, at),
                Message::Flush(ack) => {
                    acks.push(ack);
                    Ok(())
                }
            };
            report_failure(result, &mut failed);
        }
        report_failure(out.flush(), &mut failed);
        for ack in acks {
            let _ = ack.send(());
        }
    }
    report_failure(out.flush(), &mut failed);
}

fn report_failure(result: std::io::Result<()>, failed: &mut bool) {
    match result {
        Ok(()) => *failed = false,
        Err(e) if !*failed => {
            tracing::error!(error = %e, "failed to write audit log");
            *failed = true;
        }
        Err(_) => {}
    }
}
