//! Socket ownership: serialized writes and a line-oriented ingest task

use std::sync::Arc;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    constants::{MAX_FRAME_SIZE, SOCKET_BUF_SIZE},
    error::{AmiError, AmiResult},
    protocol::FrameAssembler,
};

/// Byte stream a session can run over (TCP, UDP adapter, in-memory duplex).
pub trait AmiStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AmiStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

type BoxedStream = Box<dyn AmiStream>;

const CLOSED_PIPE: &str = "io: read/write on closed pipe";

struct Ingest {
    lines: mpsc::Receiver<String>,
    assembler: FrameAssembler,
}

/// One socket split into a locked writer and a background line reader.
pub(crate) struct Transport {
    writer: Mutex<Option<WriteHalf<BoxedStream>>>,
    ingest: Mutex<Ingest>,
    failure: Arc<parking_lot::Mutex<Option<String>>>,
    stop: CancellationToken,
}

impl Transport {
    /// Split `stream` and start the ingest task.
    pub(crate) fn new<S: AmiStream>(stream: S, queue_size: usize) -> Self {
        let boxed: BoxedStream = Box::new(stream);
        let (read_half, write_half) = tokio::io::split(boxed);
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let failure = Arc::new(parking_lot::Mutex::new(None));
        let stop = CancellationToken::new();

        tokio::spawn(ingest_loop(read_half, tx, failure.clone(), stop.clone()));

        Self {
            writer: Mutex::new(Some(write_half)),
            ingest: Mutex::new(Ingest {
                lines: rx,
                assembler: FrameAssembler::new(),
            }),
            failure,
            stop,
        }
    }

    /// Write all of `data` and flush, holding the writer lock throughout so
    /// concurrent frames never interleave.
    pub(crate) async fn write(&self, data: &[u8]) -> AmiResult<()> {
        let mut guard = self
            .writer
            .lock()
            .await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| AmiError::Network(CLOSED_PIPE.to_string()))?;
        writer
            .write_all(data)
            .await
            .map_err(AmiError::from_io)?;
        writer
            .flush()
            .await
            .map_err(AmiError::from_io)
    }

    /// Next raw line, terminator stripped. Used for the banner only.
    pub(crate) async fn recv_line(&self, cancel: &CancellationToken) -> AmiResult<String> {
        let mut ingest = self
            .ingest
            .lock()
            .await;
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AmiError::Cancelled),
            line = ingest.lines.recv() => line,
        };
        match line {
            Some(line) => Ok(line
                .trim_end_matches(['\r', '\n'])
                .to_string()),
            None => Err(self.closed_error()),
        }
    }

    /// Accumulate lines until a complete frame (ending CRLF CRLF) is buffered.
    ///
    /// Returns [`AmiError::Network`] once the ingest task has stopped and its
    /// queue is drained, [`AmiError::Cancelled`] when `cancel` fires.
    pub(crate) async fn recv_frame(&self, cancel: &CancellationToken) -> AmiResult<String> {
        let mut guard = self
            .ingest
            .lock()
            .await;
        let ingest = &mut *guard;
        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AmiError::Cancelled),
                line = ingest.lines.recv() => line,
            };
            match line {
                Some(line) => {
                    if let Some(frame) = ingest
                        .assembler
                        .push_line(&line)?
                    {
                        trace!("[RECV] frame of {} bytes", frame.len());
                        return Ok(frame);
                    }
                }
                None => return Err(self.closed_error()),
            }
        }
    }

    /// Stop the ingest task and close the write side. Idempotent.
    pub(crate) async fn shutdown(&self) {
        self.stop
            .cancel();
        let writer = self
            .writer
            .lock()
            .await
            .take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer
                .shutdown()
                .await
            {
                debug!("[CLOSE] socket shutdown: {}", e);
            }
        }
    }

    fn closed_error(&self) -> AmiError {
        let reason = self
            .failure
            .lock()
            .clone()
            .unwrap_or_else(|| CLOSED_PIPE.to_string());
        AmiError::Network(reason)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.stop
            .cancel();
    }
}

/// Read LF-terminated lines into the bounded queue until EOF, error, or stop.
async fn ingest_loop(
    reader: ReadHalf<BoxedStream>,
    tx: mpsc::Sender<String>,
    failure: Arc<parking_lot::Mutex<Option<String>>>,
    stop: CancellationToken,
) {
    let mut reader = BufReader::with_capacity(SOCKET_BUF_SIZE, reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            _ = stop.cancelled() => {
                debug!("[INGEST] stopped");
                return;
            }
            r = async {
                let mut limited = (&mut reader).take(MAX_FRAME_SIZE as u64 + 1);
                limited
                    .read_until(b'\n', &mut buf)
                    .await
            } => r,
        };

        let reason = match read {
            Ok(0) => "EOF".to_string(),
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx
                    .send(line)
                    .await
                    .is_err()
                {
                    debug!("[INGEST] queue receiver gone");
                    return;
                }
                continue;
            }
            Err(e) => match AmiError::from_io(e) {
                AmiError::Network(msg) => msg,
                other => other.to_string(),
            },
        };

        warn!("[INGEST] read loop ended: {}", reason);
        *failure.lock() = Some(reason);
        return;
    }
}
