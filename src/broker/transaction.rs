//! Transactions (C5): `Request`, `RequestResponse`, `Await`, and `Subscribe`,
//! built atop the broker's pumps (C4) and the message library (C3).
//!
//! All blocking operations take a [`Deadline`]; its firing cancels the
//! operation with [`UnpiError::ContextCancelled`] and always deregisters the
//! listener it installed first (§4.5, §5 "Resource release"). When a
//! response and an expiring deadline are both ready in the same poll,
//! cancellation wins (§4.5.2 step 6) — the `select!` below always checks the
//! deadline branch first.

use tokio::sync::{mpsc, oneshot};

use crate::deadline::Deadline;
use crate::error::UnpiError;
use crate::frame::{Frame, MessageType};
use crate::library::Payload;

use super::pumps::SendJob;
use super::registry::CancelHandle;
use super::Broker;

impl Broker {
    /// Fire-and-forget send (§4.5.1).
    ///
    /// Fails [`UnpiError::RequestMessageNotInLibrary`] if `value`'s type isn't
    /// registered, [`UnpiError::FrameNotAsynchronous`] if its identity is
    /// `SREQ` (synchronous messages must go through [`Broker::request_response`]),
    /// or [`UnpiError::PayloadTooLarge`] if its encoded form exceeds 255 bytes.
    pub async fn request<T: Payload>(&self, value: &T) -> Result<(), UnpiError> {
        let identity = self
            .inner
            .library
            .get_by_value(value)
            .ok_or(UnpiError::RequestMessageNotInLibrary)?;

        if identity.message_type == MessageType::SREQ {
            return Err(UnpiError::FrameNotAsynchronous);
        }

        let payload = value.encode().map_err(|e| UnpiError::Encode(Box::new(e)))?;
        let frame = Frame::try_new(identity.message_type, identity.subsystem, identity.command_id, payload)?;

        self.submit(frame).await
    }

    /// Correlated request/response exchange (§4.5.2).
    ///
    /// If the request's identity is `SREQ`, the broker-wide synchronous gate
    /// is held for the remainder of the call, serialising it against every
    /// other concurrent SREQ transaction (P9). A single-slot mailbox is
    /// installed for the response identity before the request is written, so
    /// a reply racing the write can never be missed; the listener is always
    /// torn down on the way out, whichever exit path is taken. Fails
    /// [`UnpiError::PayloadTooLarge`] if the encoded request exceeds 255 bytes,
    /// before anything is sent or any listener is installed.
    pub async fn request_response<Req: Payload, Resp: Payload>(
        &self,
        req: &Req,
        deadline: Deadline,
    ) -> Result<Resp, UnpiError> {
        let req_identity = self
            .inner
            .library
            .get_by_value(req)
            .ok_or(UnpiError::RequestMessageNotInLibrary)?;
        let resp_identity = self
            .inner
            .library
            .get_by_type::<Resp>()
            .ok_or(UnpiError::ResponseMessageNotInLibrary)?;

        let payload = req.encode().map_err(|e| UnpiError::Encode(Box::new(e)))?;
        let frame = Frame::try_new(req_identity.message_type, req_identity.subsystem, req_identity.command_id, payload)?;

        let _gate = if req_identity.message_type == MessageType::SREQ {
            Some(self.inner.sync_gate.lock().await)
        } else {
            None
        };

        let (mailbox_tx, mut mailbox_rx) = mpsc::channel::<Frame>(1);
        let cancel = self.inner.registry.add_listen(resp_identity, move |frame| {
            let _ = mailbox_tx.try_send(frame);
        });

        let result = async {
            self.submit(frame).await?;

            tokio::select! {
                biased;
                () = deadline.wait() => Err(UnpiError::ContextCancelled),
                received = mailbox_rx.recv() => match received {
                    Some(frame) => Resp::decode(&frame.payload).map_err(|e| UnpiError::Decode(Box::new(e))),
                    None => Err(UnpiError::ContextCancelled),
                },
            }
        }
        .await;

        cancel.cancel();
        result
    }

    /// Receive the next frame matching `Resp`'s registered identity, without
    /// sending anything first (§4.5.3).
    pub async fn await_message<Resp: Payload>(&self, deadline: Deadline) -> Result<Resp, UnpiError> {
        let resp_identity = self
            .inner
            .library
            .get_by_type::<Resp>()
            .ok_or(UnpiError::ResponseMessageNotInLibrary)?;

        let (mailbox_tx, mut mailbox_rx) = mpsc::channel::<Frame>(1);
        let cancel = self.inner.registry.add_listen(resp_identity, move |frame| {
            let _ = mailbox_tx.try_send(frame);
        });

        let result = tokio::select! {
            biased;
            () = deadline.wait() => Err(UnpiError::ContextCancelled),
            received = mailbox_rx.recv() => match received {
                Some(frame) => Resp::decode(&frame.payload).map_err(|e| UnpiError::Decode(Box::new(e))),
                None => Err(UnpiError::ContextCancelled),
            },
        };

        cancel.cancel();
        result
    }

    /// Install a persistent listener that decodes every matching frame into a
    /// fresh `T` and hands it to `callback` (§4.5.4). Decode failures are
    /// logged and swallowed — the user callback is only ever invoked with a
    /// successfully decoded value.
    pub fn subscribe<T, F>(&self, callback: F) -> Result<Subscription, UnpiError>
    where
        T: Payload,
        F: Fn(T) + Send + Sync + 'static,
    {
        let identity = self
            .inner
            .library
            .get_by_type::<T>()
            .ok_or(UnpiError::ResponseMessageNotInLibrary)?;

        let cancel = self.inner.registry.add_listen(identity, move |frame| match T::decode(&frame.payload) {
            Ok(value) => callback(value),
            Err(e) => log::warn!("subscription decode failed for {identity:?}: {e}"),
        });

        Ok(Subscription { cancel })
    }

    /// Enqueue `frame` on the outbound queue and wait for the send pump to
    /// report its write result. Back-pressure: the 51st concurrent sender
    /// blocks here until the pump drains one (§4.3).
    async fn submit(&self, frame: Frame) -> Result<(), UnpiError> {
        let (completion_tx, completion_rx) = oneshot::channel();
        self.inner
            .send_tx
            .send(SendJob { frame, completion: completion_tx })
            .await
            .map_err(|_| UnpiError::BrokerStopped)?;

        completion_rx.await.map_err(|_| UnpiError::BrokerStopped)?
    }
}

/// Cancel handle for a [`Broker::subscribe`] registration. Dropping this does
/// *not* cancel the subscription — call [`Subscription::cancel`] explicitly,
/// mirroring the explicit cancel closure returned by the original broker.
pub struct Subscription {
    cancel: CancelHandle,
}

impl Subscription {
    /// Remove the subscription's listener. Safe to call more than once (P7).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
