//! Wire framing of events.
//!
//! An event is a single JSON header line, followed by `data_length` bytes of
//! JSON data and `payload_length` bytes of binary payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::codec::{Decoder, Encoder};

use super::{Event, ProtocolError};

/// Protocol version written into every outgoing header.
const PROTOCOL_VERSION: &str = "1.5.2";

/// Upper bound for a header line (protects against unframed garbage).
const MAX_HEADER_BYTES: usize = 1024 * 1024;

/// First line of every event on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct Header {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_length: Option<usize>,
}

/// Decoder progress within the current event.
#[derive(Debug, Default)]
enum DecodeState {
    #[default]
    Header,
    Body(Header),
}

/// Codec turning a byte stream into [`Event`]s and back.
#[derive(Debug, Default)]
pub struct EventCodec {
    state: DecodeState,
}

impl EventCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for EventCodec {
    type Item = Event;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Event>, ProtocolError> {
        loop {
            match std::mem::take(&mut self.state) {
                DecodeState::Header => {
                    let Some(newline) = src.iter().position(|b| *b == b'\n') else {
                        if src.len() > MAX_HEADER_BYTES {
                            return Err(ProtocolError::HeaderTooLong(MAX_HEADER_BYTES));
                        }
                        return Ok(None);
                    };
                    if newline > MAX_HEADER_BYTES {
                        return Err(ProtocolError::HeaderTooLong(MAX_HEADER_BYTES));
                    }

                    let line = src.split_to(newline + 1);
                    let line = line[..newline].trim_ascii();
                    if line.is_empty() {
                        continue;
                    }

                    let header: Header = serde_json::from_slice(line)?;
                    self.state = DecodeState::Body(header);
                }
                DecodeState::Body(header) => {
                    let data_length = header.data_length.unwrap_or(0);
                    let payload_length = header.payload_length.unwrap_or(0);
                    let needed = data_length + payload_length;

                    if src.len() < needed {
                        src.reserve(needed - src.len());
                        self.state = DecodeState::Body(header);
                        return Ok(None);
                    }

                    let mut data = header.data.unwrap_or_default();
                    if data_length > 0 {
                        match serde_json::from_slice::<Value>(&src[..data_length])? {
                            Value::Object(extra) => data.extend(extra),
                            _ => return Err(ProtocolError::DataNotObject),
                        }
                    }
                    src.advance(data_length);

                    let payload = (payload_length > 0).then(|| src.split_to(payload_length).freeze());

                    return Ok(Some(Event { event_type: header.event_type, data, payload }));
                }
            }
        }
    }
}

impl Encoder<Event> for EventCodec {
    type Error = ProtocolError;

    fn encode(&mut self, event: Event, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let data = if event.data.is_empty() { None } else { Some(serde_json::to_vec(&event.data)?) };
        let payload = event.payload.filter(|p| !p.is_empty());

        let header = Header {
            event_type: event.event_type,
            version: Some(PROTOCOL_VERSION.to_string()),
            data: None,
            data_length: data.as_ref().map(Vec::len),
            payload_length: payload.as_ref().map(Bytes::len),
        };
        let header = serde_json::to_vec(&header)?;

        dst.reserve(header.len() + 1 + data.as_ref().map_or(0, Vec::len) + payload.as_ref().map_or(0, Bytes::len));
        dst.put_slice(&header);
        dst.put_u8(b'\n');
        if let Some(data) = data {
            dst.put_slice(&data);
        }
        if let Some(payload) = payload {
            dst.put_slice(&payload);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::protocol::{AudioChunk, Message, Synthesize};

    fn decode_all(bytes: &[u8]) -> Vec<Event> {
        let mut codec = EventCodec::new();
        let mut buf = BytesMut::from(bytes);
        let mut events = Vec::new();
        while let Some(event) = codec.decode(&mut buf).unwrap() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_encoded_layout() {
        let mut event = Event::new("audio-chunk").with_payload(Bytes::from_static(b"\x01\x02"));
        event.data.insert("rate".into(), json!(22050));

        let mut buf = BytesMut::new();
        EventCodec::new().encode(event, &mut buf).unwrap();

        let newline = buf.iter().position(|b| *b == b'\n').unwrap();
        let header: Value = serde_json::from_slice(&buf[..newline]).unwrap();
        assert_eq!(header["type"], "audio-chunk");
        assert_eq!(header["version"], PROTOCOL_VERSION);
        assert_eq!(header["data_length"], 14);
        assert_eq!(header["payload_length"], 2);
        assert_eq!(&buf[newline + 1..], b"{\"rate\":22050}\x01\x02");
    }

    #[test]
    fn test_event_without_data_has_bare_header() {
        let mut buf = BytesMut::new();
        EventCodec::new().encode(Event::new("describe"), &mut buf).unwrap();
        let header: Value = serde_json::from_slice(&buf[..buf.len() - 1]).unwrap();
        assert_eq!(header, json!({"type": "describe", "version": PROTOCOL_VERSION}));
    }

    #[test]
    fn test_decodes_inline_data_and_blank_lines() {
        let events = decode_all(b"\r\n{\"type\":\"synthesize\",\"data\":{\"text\":\"Hi.\"}}\r\n{\"type\":\"describe\"}\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].to_message::<Synthesize>().unwrap().text, "Hi.");
        assert_eq!(events[1].event_type, "describe");
    }

    #[test]
    fn test_data_section_overrides_inline_data() {
        let body = b"{\"text\":\"from section\"}";
        let mut wire = format!("{{\"type\":\"synthesize\",\"data\":{{\"text\":\"inline\"}},\"data_length\":{}}}\n", body.len()).into_bytes();
        wire.extend_from_slice(body);
        let events = decode_all(&wire);
        assert_eq!(events[0].to_message::<Synthesize>().unwrap().text, "from section");
    }

    #[test]
    fn test_partial_input_waits_for_more() {
        let mut codec = EventCodec::new();
        let mut buf = BytesMut::from(&b"{\"type\":\"audio-chunk\",\"payload_length\":4}\n\x00\x01"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\x02\x03");
        let event = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(event.payload.unwrap().as_ref(), b"\x00\x01\x02\x03");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_rejects_malformed_header() {
        let mut buf = BytesMut::from(&b"not json\n"[..]);
        assert!(matches!(EventCodec::new().decode(&mut buf), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_rejects_non_object_data() {
        let mut buf = BytesMut::from(&b"{\"type\":\"x\",\"data_length\":2}\n[]"[..]);
        assert!(matches!(EventCodec::new().decode(&mut buf), Err(ProtocolError::DataNotObject)));
    }

    #[test]
    fn test_rejects_oversized_header() {
        let mut buf = BytesMut::from(vec![b'{'; MAX_HEADER_BYTES + 1].as_slice());
        assert!(matches!(EventCodec::new().decode(&mut buf), Err(ProtocolError::HeaderTooLong(_))));
    }

    #[tokio::test]
    async fn test_framed_stream() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FramedWrite::new(client, EventCodec::new());
        let mut reader = FramedRead::new(server, EventCodec::new());

        let chunk = AudioChunk { rate: 22050, width: 2, channels: 1, timestamp: Some(40) };
        writer.send(chunk.to_event().unwrap().with_payload(Bytes::from_static(&[9; 100]))).await.unwrap();
        writer.send(Event::new("audio-stop")).await.unwrap();
        drop(writer);

        let first = reader.next().await.unwrap().unwrap();
        assert_eq!(first.to_message::<AudioChunk>().unwrap(), chunk);
        assert_eq!(first.payload.unwrap().len(), 100);
        assert_eq!(reader.next().await.unwrap().unwrap().event_type, "audio-stop");
        assert!(reader.next().await.is_none());
    }
}
