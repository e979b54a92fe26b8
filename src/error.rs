//! Error kinds for the frame codec, message library, and broker.

use thiserror::Error;

/// Everything that can go wrong decoding, dispatching, or transacting UNPI frames.
#[derive(Debug, Error)]
pub enum UnpiError {
    /// Decode buffer shorter than the minimum frame size, or shorter than
    /// `LEN` declares.
    #[error("frame too short")]
    FrameTooShort,

    /// Byte 0 of a decode buffer was not `0xFE`. Never surfaced by the
    /// streaming reader, which resynchronises instead.
    #[error("frame is missing start of frame byte")]
    FrameMissingStartOfFrame,

    /// An encoded payload exceeds the 255-byte wire length field. Returned at
    /// encode time rather than letting `LEN` silently wrap.
    #[error("payload of {0} bytes exceeds the 255-byte frame limit")]
    PayloadTooLarge(usize),

    /// XOR checksum over the header+payload did not match the trailing FCS byte.
    #[error("frame failed checksum")]
    FrameChecksumFailed,

    /// `Request` was called with a message whose identity is `SREQ`; use
    /// `RequestResponse` instead.
    #[error("synchronous messages cannot be sent one-shot, use request_response")]
    FrameNotAsynchronous,

    /// The request value's type is not registered in the message library.
    #[error("request message was not in message library")]
    RequestMessageNotInLibrary,

    /// The response value's type is not registered in the message library.
    #[error("response message was not in message library")]
    ResponseMessageNotInLibrary,

    /// The deadline token passed to a blocking transaction fired before
    /// completion.
    #[error("context cancelled")]
    ContextCancelled,

    /// The broker has been stopped and no longer accepts transactions.
    #[error("broker is stopped")]
    BrokerStopped,

    /// Transport I/O failure surfaced from the underlying reader/writer.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The external payload codec failed to encode a value.
    #[error("payload encode failed: {0}")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// The external payload codec failed to decode a value.
    #[error("payload decode failed: {0}")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}
