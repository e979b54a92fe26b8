//! The two long-lived broker tasks (§4.3): the send pump serialises outbound
//! writes; the receive pump reads frames and fans them out via the listener
//! registry.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::codec::{read_frame, write_frame};
use crate::error::UnpiError;
use crate::frame::Frame;

use super::registry::ListenerRegistry;

/// A queued outbound write plus the channel its result is delivered on.
pub(super) struct SendJob {
    pub frame: Frame,
    pub completion: oneshot::Sender<Result<(), UnpiError>>,
}

/// Consumes `queue` and writes each frame via `writer`, delivering the write
/// result back to the caller through the job's completion channel. Exits when
/// `shutdown` is cancelled.
pub(super) async fn send_pump<W>(
    mut writer: W,
    mut queue: mpsc::Receiver<SendJob>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                log::debug!("send pump shutting down");
                return;
            }
            job = queue.recv() => {
                let Some(job) = job else {
                    log::debug!("send pump queue closed");
                    return;
                };
                let result = write_frame(&mut writer, &job.frame).await;
                if let Err(ref e) = result {
                    log::warn!("unpi write failed: {e}");
                }
                let _ = job.completion.send(result);
            }
        }
    }
}

/// Repeatedly reads one frame and dispatches it via `registry`. Terminates on
/// any I/O error other than `Interrupted` (already retried inside
/// [`read_frame`]) — a terminated receive pump never restarts itself; the
/// caller must recreate the broker against a fresh stream.
///
/// Because the underlying read blocks, `shutdown` is polled non-blockingly
/// between iterations — it may not be observed until a byte arrives or the
/// stream closes. Closing the underlying transport is the authoritative way
/// to unblock a receive pump promptly (Design Note "shutdown races").
pub(super) async fn receive_pump<R>(mut reader: R, registry: ListenerRegistry, shutdown: CancellationToken)
where
    R: AsyncRead + Unpin + Send,
{
    loop {
        match read_frame(&mut reader).await {
            Ok(frame) => registry.dispatch(frame),
            Err(UnpiError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                log::info!("unpi receive pump exiting: stream closed");
                return;
            }
            Err(e) => {
                log::warn!("unpi read failed: {e}");
                // Frame-level errors (bad checksum, missing SOF on a buffer
                // boundary) are not transport failures — resync and keep
                // reading. Transport I/O errors are terminal.
                if matches!(e, UnpiError::Io(_)) {
                    return;
                }
            }
        }

        if shutdown.is_cancelled() {
            log::debug!("receive pump shutting down");
            return;
        }
    }
}
