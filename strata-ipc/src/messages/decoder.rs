use bytes::Buf;
use strata_buffer::ByteBuffer;
use strata_error::{StrataResult, strata_bail, strata_err};

use crate::messages::{Message, parse_metadata};
use crate::{MESSAGE_PREFIX_LENGTH, ReadOptions};

/// A message decoded from an IPC stream: either a full envelope with its
/// body, or the end-of-stream marker.
#[derive(Debug)]
pub enum DecoderMessage {
    /// A message and its (possibly empty) body.
    Message(Message, ByteBuffer),
    /// The end-of-stream marker: a zero-length metadata prefix.
    Eos,
}

/// The outcome of one decode attempt.
#[derive(Debug)]
pub enum PollRead {
    /// A complete message was decoded.
    Some(DecoderMessage),
    /// The *total* number of bytes the current step needs before it can
    /// make progress (not the incremental count).
    NeedMore(usize),
}

#[derive(Default)]
enum State {
    #[default]
    Length,
    Metadata(usize),
    Body(Box<Message>),
}

/// A stateful, incremental decoder of IPC messages from an arbitrary
/// stream of bytes. Feed it bytes as they arrive; it asks for more via
/// [`PollRead::NeedMore`].
#[derive(Default)]
pub struct MessageDecoder {
    options: ReadOptions,
    state: State,
}

impl MessageDecoder {
    /// A decoder enforcing the given read options.
    pub fn new(options: ReadOptions) -> Self {
        Self {
            options,
            state: State::default(),
        }
    }

    /// Whether the decoder sits at a message boundary (no partial message
    /// buffered).
    pub fn is_at_boundary(&self) -> bool {
        matches!(self.state, State::Length)
    }

    /// Attempt to read the next message from `bytes`.
    ///
    /// If the buffered bytes are incomplete, returns
    /// [`PollRead::NeedMore`] with the total number of bytes the current
    /// step requires; the next call should provide at least that many.
    pub fn read_next<B: Buf>(&mut self, bytes: &mut B) -> StrataResult<PollRead> {
        loop {
            match &self.state {
                State::Length => {
                    if bytes.remaining() < MESSAGE_PREFIX_LENGTH {
                        return Ok(PollRead::NeedMore(MESSAGE_PREFIX_LENGTH));
                    }
                    let metadata_length = bytes.get_u32_le();
                    if metadata_length == 0 {
                        return Ok(PollRead::Some(DecoderMessage::Eos));
                    }
                    if metadata_length > i32::MAX as u32 {
                        strata_bail!(
                            InvalidFormat: "negative metadata length prefix ({})",
                            metadata_length as i32
                        );
                    }
                    self.state = State::Metadata(metadata_length as usize);
                }
                State::Metadata(metadata_length) => {
                    if bytes.remaining() < *metadata_length {
                        return Ok(PollRead::NeedMore(*metadata_length));
                    }
                    let metadata = bytes.copy_to_bytes(*metadata_length);
                    let message = parse_metadata(metadata.as_ref(), &self.options)?;
                    self.state = State::Body(Box::new(message));
                }
                State::Body(message) => {
                    let body_length = usize::try_from(message.body_length).map_err(
                        |_| strata_err!(InvalidFormat: "body length {} overflows usize", message.body_length),
                    )?;
                    if bytes.remaining() < body_length {
                        return Ok(PollRead::NeedMore(body_length));
                    }
                    let body = ByteBuffer::from(bytes.copy_to_bytes(body_length));
                    let State::Body(message) = std::mem::take(&mut self.state) else {
                        unreachable!("state checked above");
                    };
                    return Ok(PollRead::Some(DecoderMessage::Message(*message, body)));
                }
            }
        }
    }
}
