//! Relay message type.
//!
//! Payloads are opaque to the relay. The only thing recorded besides the
//! bytes is whether the message arrived as text or binary, so it can be
//! re-emitted with the same frame type.
//!
//! `bytes::Bytes` is reference counted, so fanning one message out to N
//! peers shares a single allocation.

// ============================================================================
// Imports
// ============================================================================

use bytes::Bytes;

// ============================================================================
// MessageKind
// ============================================================================

/// Frame type a message was received with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// UTF-8 text payload.
    Text,
    /// Arbitrary bytes.
    Binary,
}

// ============================================================================
// Message
// ============================================================================

/// Immutable relay message.
///
/// A `Text` message always holds valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    payload: Bytes,
}

impl Message {
    /// Creates a text message.
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            payload: Bytes::from(text.into()),
        }
    }

    /// Creates a binary message.
    #[inline]
    #[must_use]
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload: payload.into(),
        }
    }

    /// Wraps a payload the transport has already validated as UTF-8.
    #[inline]
    pub(crate) fn from_utf8(payload: Bytes) -> Self {
        Self {
            kind: MessageKind::Text,
            payload,
        }
    }

    /// Builds a message from raw bytes, marking it as text when the bytes
    /// are valid UTF-8.
    #[must_use]
    pub fn from_bytes(payload: Bytes) -> Self {
        let kind = if std::str::from_utf8(&payload).is_ok() {
            MessageKind::Text
        } else {
            MessageKind::Binary
        };
        Self { kind, payload }
    }

    /// Returns the frame type.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns the payload.
    #[inline]
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consumes the message and returns its payload.
    #[inline]
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Returns the payload as `&str` for text messages.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            MessageKind::Text => std::str::from_utf8(&self.payload).ok(),
            MessageKind::Binary => None,
        }
    }

    /// Payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
