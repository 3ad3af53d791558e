//! Decoding of the completion backend's data stream.
//!
//! The chat endpoint answers with a plain-text body where every line is one
//! frame of the form `<code>:<json>`. This module turns the raw HTTP byte
//! stream into a stream of [`StreamEvent`]s.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::codec::Decoder;

use crate::types::{StreamEvent, Usage};
use crate::{Error, Result};

/// Process a stream of bytes into a stream of decoded frames.
///
/// Frames are applied strictly in arrival order. A transport error ends the
/// stream after it has been yielded; a malformed frame is yielded as an error
/// and decoding continues with the next line.
pub fn process_data_stream<S>(byte_stream: S) -> impl Stream<Item = Result<StreamEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + Send + 'static,
{
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    stream::unfold(
        (stream, BytesMut::new(), DataStreamDecoder::default(), false),
        |(mut stream, mut buffer, mut decoder, finished)| async move {
            if finished {
                return None;
            }
            loop {
                match decoder.decode(&mut buffer) {
                    Ok(Some(event)) => return Some((Ok(event), (stream, buffer, decoder, false))),
                    Ok(None) => {}
                    Err(e) => return Some((Err(e), (stream, buffer, decoder, false))),
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => return Some((Err(e), (stream, buffer, decoder, true))),
                    None => {
                        return match decoder.decode_eof(&mut buffer) {
                            Ok(Some(event)) => Some((Ok(event), (stream, buffer, decoder, true))),
                            Ok(None) => None,
                            Err(e) => Some((Err(e), (stream, buffer, decoder, true))),
                        };
                    }
                }
            }
        },
    )
}

/// Line-oriented decoder for data-stream frames.
///
/// Lines are split on raw bytes before UTF-8 validation, so a multi-byte
/// character divided between two network chunks decodes correctly.
#[derive(Debug, Default)]
pub struct DataStreamDecoder {
    next_index: usize,
}

impl Decoder for DataStreamDecoder {
    type Item = StreamEvent;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<StreamEvent>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.next_index = src.len();
                return Ok(None);
            };
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            let line = std::str::from_utf8(&line)?.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }
            return parse_frame(line).map(Some);
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<StreamEvent>> {
        if let Some(event) = self.decode(src)? {
            return Ok(Some(event));
        }
        let rest = src.split();
        self.next_index = 0;
        let line = std::str::from_utf8(&rest)?.trim();
        if line.is_empty() {
            Ok(None)
        } else {
            parse_frame(line).map(Some)
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartStepFrame {
    #[serde(default)]
    message_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinishFrame {
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    is_continued: bool,
}

/// Parse one `<code>:<json>` frame.
pub fn parse_frame(line: &str) -> Result<StreamEvent> {
    let Some((code, payload)) = line.split_once(':') else {
        return Err(Error::serialization(
            format!("Malformed stream frame: missing ':' separator in '{line}'"),
            None,
        ));
    };
    let mut chars = code.chars();
    let (Some(code), None) = (chars.next(), chars.next()) else {
        return Err(Error::serialization(
            format!("Malformed stream frame: bad code '{code}'"),
            None,
        ));
    };

    let event = match code {
        '0' => StreamEvent::TextDelta(serde_json::from_str(payload)?),
        '2' => StreamEvent::Data(serde_json::from_str(payload)?),
        '3' => StreamEvent::Error(serde_json::from_str(payload)?),
        '8' => StreamEvent::MessageAnnotations(serde_json::from_str(payload)?),
        'f' => {
            let frame: StartStepFrame = serde_json::from_str(payload)?;
            StreamEvent::StartStep {
                message_id: frame.message_id,
            }
        }
        'e' => {
            let frame: FinishFrame = serde_json::from_str(payload)?;
            StreamEvent::FinishStep {
                finish_reason: frame.finish_reason,
                usage: frame.usage,
                is_continued: frame.is_continued,
            }
        }
        'd' => {
            let frame: FinishFrame = serde_json::from_str(payload)?;
            StreamEvent::FinishMessage {
                finish_reason: frame.finish_reason,
                usage: frame.usage,
            }
        }
        '9' | 'a' | 'b' | 'c' | 'g' | 'h' | 'i' | 'j' | 'k' => StreamEvent::Other {
            code,
            value: serde_json::from_str::<Value>(payload)?,
        },
        _ => {
            return Err(Error::serialization(
                format!("Unknown stream frame code: {code}"),
                None,
            ));
        }
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(
        parts: &[&'static [u8]],
    ) -> impl Stream<Item = reqwest::Result<Bytes>> + Unpin + Send + 'static {
        let parts: Vec<reqwest::Result<Bytes>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        stream::iter(parts)
    }

    async fn collect(parts: &[&'static [u8]]) -> Vec<Result<StreamEvent>> {
        process_data_stream(chunks(parts)).collect().await
    }

    #[tokio::test]
    async fn parse_text_deltas() {
        let events = collect(&[b"0:\"Hel\"\n0:\"lo\"\n"]).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(StreamEvent::TextDelta(t)) if t == "Hel"));
        assert!(matches!(&events[1], Ok(StreamEvent::TextDelta(t)) if t == "lo"));
    }

    #[tokio::test]
    async fn handle_split_frame() {
        let events = collect(&[b"0:\"ab", b"c\"\n", b"d:{\"finishReason\":\"stop\"}\n"]).await;
        assert!(matches!(&events[0], Ok(StreamEvent::TextDelta(t)) if t == "abc"));
        assert!(matches!(
            &events[1],
            Ok(StreamEvent::FinishMessage { finish_reason: Some(r), usage: None }) if r == "stop"
        ));
    }

    #[tokio::test]
    async fn handle_split_multibyte_character() {
        // "é" is 0xC3 0xA9; split it across two chunks.
        let events = collect(&[b"0:\"caf\xC3", b"\xA9\"\n"]).await;
        assert!(matches!(&events[0], Ok(StreamEvent::TextDelta(t)) if t == "café"));
    }

    #[tokio::test]
    async fn finish_message_carries_usage() {
        let events = collect(&[
            b"f:{\"messageId\":\"msg-1\"}\n",
            b"e:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":3,\"completionTokens\":4},\"isContinued\":false}\n",
            b"d:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":3,\"completionTokens\":4}}\n",
        ])
        .await;
        assert!(matches!(
            &events[0],
            Ok(StreamEvent::StartStep { message_id: Some(id) }) if id == "msg-1"
        ));
        assert!(matches!(&events[1], Ok(StreamEvent::FinishStep { is_continued: false, .. })));
        match &events[2] {
            Ok(event @ StreamEvent::FinishMessage { usage, .. }) => {
                assert!(event.is_terminal());
                assert_eq!(*usage, Some(Usage::new(3, 4)));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn data_and_error_frames() {
        let events = collect(&[b"2:[{\"progress\":1}]\n3:\"model overloaded\"\n"]).await;
        assert!(matches!(&events[0], Ok(StreamEvent::Data(values)) if values.len() == 1));
        assert!(matches!(&events[1], Ok(StreamEvent::Error(m)) if m == "model overloaded"));
    }

    #[tokio::test]
    async fn trailing_frame_without_newline() {
        let events = collect(&[b"0:\"a\"\n0:\"b\""]).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], Ok(StreamEvent::TextDelta(t)) if t == "b"));
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let events = collect(&[b"\n\r\n0:\"x\"\r\n\n"]).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn handle_unknown_frame_code() {
        let events = collect(&[b"z:{}\n0:\"after\"\n"]).await;
        assert_eq!(events.len(), 2);
        match &events[0] {
            Err(e) => assert!(e.to_string().contains("Unknown stream frame code")),
            Ok(event) => panic!("expected error, got {event:?}"),
        }
        assert!(matches!(&events[1], Ok(StreamEvent::TextDelta(t)) if t == "after"));
    }

    #[tokio::test]
    async fn handle_malformed_frame() {
        let events = collect(&[b"no separator here\n"]).await;
        assert!(events[0].is_err());
    }

    #[test]
    fn tool_frames_are_preserved() {
        let event = parse_frame(r#"9:{"toolCallId":"t1","toolName":"x","args":{}}"#).unwrap();
        assert!(matches!(event, StreamEvent::Other { code: '9', .. }));
    }
}
