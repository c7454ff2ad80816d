//! Socket tasks for one connection attempt
//!
//! Each connection gets a reader, a writer and a sequencer task on the hub
//! runtime. The reader cuts frames off the socket and hands each one to its
//! own parse task; the sequencer awaits those parses in arrival order and
//! forwards the results to the delivery thread, so parsing may overlap
//! while delivery never reorders.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::SinkExt;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;

use tischat_protocol::{CodecError, ProtocolError, RawFrame, Transmission, TransmissionCodec, Vocabulary};
use tischat_utils::ConnectionError;

use super::dispatch::{DeliveryEvent, LinkEvent};
use super::mailbox::{take_through, Delivery, ReadRequest, Want};
use super::{Shared, SocketHandle};

const READ_CHUNK: usize = 4096;

/// Instructions for the writer task, processed in order
#[derive(Debug)]
pub(crate) enum WriterCommand {
    Send(Transmission),
    /// Flush everything queued so far, then shut the write half
    Shutdown,
}

#[derive(Debug)]
enum WriterExit {
    Closed,
    Cancelled,
    Failed(ConnectionError),
    /// Every sender is gone
    Dropped,
}

enum Sequenced {
    Parsing(JoinHandle<Result<Transmission, ProtocolError>>),
    Ready(LinkEvent),
}

/// Everything one connection attempt needs
pub(crate) struct LinkTask {
    pub id: u64,
    pub host: String,
    pub port: u16,
    pub vocab: Arc<Vocabulary>,
    pub max_line_length: usize,
    pub connect_timeout: Option<Duration>,
    pub outbound: mpsc::UnboundedReceiver<WriterCommand>,
    pub read_requests: mpsc::UnboundedReceiver<ReadRequest>,
    pub cancel: CancellationToken,
    pub shared: Arc<Shared>,
    pub events: mpsc::UnboundedSender<DeliveryEvent>,
}

/// Hands frames to parse tasks and queues results in arrival order
struct Sequencer {
    queue: mpsc::UnboundedSender<Sequenced>,
    vocab: Arc<Vocabulary>,
}

impl Sequencer {
    fn parse(&self, frame: RawFrame) {
        let vocab = Arc::clone(&self.vocab);
        let parsing = tokio::spawn(async move { frame.parse(&vocab) });
        let _ = self.queue.send(Sequenced::Parsing(parsing));
    }

    fn push(&self, event: LinkEvent) {
        let _ = self.queue.send(Sequenced::Ready(event));
    }
}

/// Drive one connection from dial to teardown
pub(crate) async fn run(task: LinkTask) {
    let LinkTask {
        id,
        host,
        port,
        vocab,
        max_line_length,
        connect_timeout,
        outbound,
        read_requests,
        cancel,
        shared,
        events,
    } = task;

    let (queue, ordered) = mpsc::unbounded_channel();
    let sequencer_task = tokio::spawn(deliver_in_order(id, ordered, events));
    let sequencer = Sequencer {
        queue,
        vocab: Arc::clone(&vocab),
    };

    let reason = match dial(&host, port, connect_timeout, &cancel).await {
        Ok(stream) => match socket_handle(id, &stream) {
            Ok(handle) => {
                tracing::info!(id, peer = %handle.peer_addr(), "Connected");
                shared.attach_socket(id, handle);
                sequencer.push(LinkEvent::Established);

                let (read_half, write_half) = stream.into_split();
                let writer = tokio::spawn(write_loop(
                    FramedWrite::new(
                        write_half,
                        TransmissionCodec::with_max_line_length(Arc::clone(&vocab), max_line_length),
                    ),
                    outbound,
                    cancel.clone(),
                ));
                let codec = TransmissionCodec::with_max_line_length(vocab, max_line_length);
                read_loop(read_half, codec, read_requests, writer, &sequencer, &cancel).await
            }
            Err(reason) => Some(reason),
        },
        Err(reason) => reason,
    };

    match &reason {
        Some(reason) => tracing::info!(id, %reason, "Connection ended"),
        None => tracing::info!(id, "Connection closed"),
    }
    sequencer.push(LinkEvent::Ended(reason));
    drop(sequencer);

    if let Err(e) = sequencer_task.await {
        tracing::error!(id, "Sequencer task failed: {}", e);
    }
}

/// Open the socket. `Err(None)` means the attempt was cancelled.
async fn dial(
    host: &str,
    port: u16,
    limit: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<TcpStream, Option<ConnectionError>> {
    tracing::debug!(host, port, "Dialing");
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(None),
        result = connect_within(host, port, limit) => result.map_err(Some),
    }
}

async fn connect_within(
    host: &str,
    port: u16,
    limit: Option<Duration>,
) -> Result<TcpStream, ConnectionError> {
    within(limit, TcpStream::connect((host, port))).await
}

/// Await a connect attempt, giving up after `limit`
async fn within<T>(
    limit: Option<Duration>,
    attempt: impl Future<Output = std::io::Result<T>>,
) -> Result<T, ConnectionError> {
    let result = match limit {
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .map_err(|_| ConnectionError::Timeout {
                seconds: limit.as_secs() + u64::from(limit.subsec_nanos() > 0),
            })?,
        None => attempt.await,
    };
    result.map_err(|e| ConnectionError::from_connect(&e))
}

fn socket_handle(id: u64, stream: &TcpStream) -> Result<SocketHandle, ConnectionError> {
    let local_addr = stream.local_addr().map_err(|e| ConnectionError::from_connect(&e))?;
    let peer_addr = stream.peer_addr().map_err(|e| ConnectionError::from_connect(&e))?;
    Ok(SocketHandle {
        id,
        local_addr,
        peer_addr,
    })
}

/// Single writer for the connection; wire order is queue order
async fn write_loop(
    mut sink: FramedWrite<OwnedWriteHalf, TransmissionCodec>,
    mut commands: mpsc::UnboundedReceiver<WriterCommand>,
    cancel: CancellationToken,
) -> WriterExit {
    loop {
        let command = tokio::select! {
            biased;
            _ = cancel.cancelled() => return WriterExit::Cancelled,
            command = commands.recv() => command,
        };

        match command {
            Some(WriterCommand::Send(transmission)) => {
                let verb = transmission.verb().to_string();
                let written = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return WriterExit::Cancelled,
                    written = sink.send(transmission) => written,
                };
                match written {
                    Ok(()) => tracing::debug!(verb = %verb, "Sent transmission"),
                    Err(CodecError::LineTooLong { len, max }) => {
                        tracing::warn!(verb = %verb, len, max, "Dropping transmission with oversized line");
                    }
                    Err(CodecError::Io(e)) => {
                        tracing::error!("Write failed: {}", e);
                        return WriterExit::Failed(ConnectionError::from_stream(&e));
                    }
                }
            }
            Some(WriterCommand::Shutdown) => {
                let closed = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return WriterExit::Cancelled,
                    closed = sink.close() => closed,
                };
                return match closed {
                    Ok(()) => WriterExit::Closed,
                    Err(CodecError::Io(e)) => WriterExit::Failed(ConnectionError::from_stream(&e)),
                    Err(e) => WriterExit::Failed(ConnectionError::LostMidStream(e.to_string())),
                };
            }
            None => return WriterExit::Dropped,
        }
    }
}

/// Read until the connection ends, returning why it ended.
///
/// Buffered bytes go to blocking reads first, one request at a time in the
/// order they were queued; everything else is cut into frames. Requests are
/// only taken between transmissions so a blocking read never splits a unit
/// the router has started on.
async fn read_loop(
    mut reader: OwnedReadHalf,
    mut codec: TransmissionCodec,
    mut requests: mpsc::UnboundedReceiver<ReadRequest>,
    mut writer: JoinHandle<WriterExit>,
    sequencer: &Sequencer,
    cancel: &CancellationToken,
) -> Option<ConnectionError> {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut pending: Option<ReadRequest> = None;
    let mut requests_open = true;

    let reason = loop {
        if pending.is_none() && codec.is_idle() {
            pending = requests.try_recv().ok();
        }

        if let Some(request) = pending.take() {
            match serve(&request, &mut codec, &mut buf) {
                Ok(Some(delivery)) => {
                    tracing::debug!("Answering blocked reader");
                    request.deliver(delivery);
                    // The next queued reader gets what follows
                    continue;
                }
                Ok(None) => pending = Some(request),
                Err(e) => {
                    tracing::error!("Unrecoverable stream error: {}", e);
                    break Some(ConnectionError::LostMidStream(e.to_string()));
                }
            }
        }

        if pending.is_none() {
            if let Err(e) = cut_frames(&mut codec, &mut buf, sequencer) {
                tracing::error!("Unrecoverable stream error: {}", e);
                break Some(ConnectionError::LostMidStream(e.to_string()));
            }
        }

        let accepting = requests_open && pending.is_none() && codec.is_idle();
        buf.reserve(READ_CHUNK);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break None,
            exit = &mut writer => {
                break match exit {
                    Ok(WriterExit::Closed | WriterExit::Cancelled | WriterExit::Dropped) => None,
                    Ok(WriterExit::Failed(reason)) => Some(reason),
                    Err(e) => Some(ConnectionError::LostMidStream(format!("writer task failed: {}", e))),
                };
            }
            request = requests.recv(), if accepting => match request {
                Some(request) => pending = Some(request),
                None => requests_open = false,
            },
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    if let Some(request) = pending.take() {
                        finish_at_eof(request, &mut codec, &mut buf);
                    }
                    drain_at_eof(&mut codec, &mut buf, sequencer);
                    break Some(ConnectionError::closed_by_peer());
                }
                Ok(n) => tracing::trace!(bytes = n, "Read from socket"),
                Err(e) => {
                    tracing::error!("Read failed: {}", e);
                    break Some(ConnectionError::from_stream(&e));
                }
            },
        }
    };

    if let Some(request) = pending.take() {
        request.close();
    }
    writer.abort();
    reason
}

/// Answer `request` from what is buffered, if possible.
///
/// A raw read may buffer up to the codec's line limit while it waits for
/// its delimiter.
fn serve(
    request: &ReadRequest,
    codec: &mut TransmissionCodec,
    buf: &mut BytesMut,
) -> Result<Option<Delivery>, CodecError> {
    match request.want() {
        Want::Through(delimiter) => match take_through(buf, delimiter) {
            Some(chunk) => {
                codec.reset_scan();
                Ok(Some(Delivery::Chunk(chunk)))
            }
            None if buf.len() > codec.max_line_length() => Err(CodecError::LineTooLong {
                len: buf.len(),
                max: codec.max_line_length(),
            }),
            None => Ok(None),
        },
        Want::Transmission => Ok(codec.next_frame(buf)?.map(Delivery::Frame)),
    }
}

/// A whole-transmission read still gets whatever the stream ended with
fn finish_at_eof(request: ReadRequest, codec: &mut TransmissionCodec, buf: &mut BytesMut) {
    if *request.want() == Want::Transmission {
        if let Ok(Some(frame)) = codec.next_frame_eof(buf) {
            request.deliver(Delivery::Frame(frame));
            return;
        }
    }
    request.close();
}

fn cut_frames(
    codec: &mut TransmissionCodec,
    buf: &mut BytesMut,
    sequencer: &Sequencer,
) -> Result<(), CodecError> {
    while let Some(frame) = codec.next_frame(buf)? {
        sequencer.parse(frame);
    }
    Ok(())
}

fn drain_at_eof(codec: &mut TransmissionCodec, buf: &mut BytesMut, sequencer: &Sequencer) {
    loop {
        match codec.next_frame_eof(buf) {
            Ok(Some(frame)) => sequencer.parse(frame),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Discarding unreadable tail of stream: {}", e);
                break;
            }
        }
    }
}

/// Await parses in the order their frames arrived
async fn deliver_in_order(
    id: u64,
    mut ordered: mpsc::UnboundedReceiver<Sequenced>,
    events: mpsc::UnboundedSender<DeliveryEvent>,
) {
    while let Some(item) = ordered.recv().await {
        let event = match item {
            Sequenced::Ready(event) => event,
            Sequenced::Parsing(parsing) => match parsing.await {
                Ok(parsed) => LinkEvent::Received(parsed),
                Err(e) => {
                    tracing::error!(id, "Parse task failed: {}", e);
                    continue;
                }
            },
        };

        if events.send(DeliveryEvent::Link { id, event }).is_err() {
            tracing::debug!(id, "Delivery thread gone, dropping events");
            break;
        }
    }
}
