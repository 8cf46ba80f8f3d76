//! Inner message codec: `Data` packet payloads decode into one
//! `Message`. Header layout: message type in the upper 4 bits of the
//! first byte, flags in the lower 4 bits; `Request`/`Response` carry a
//! variable-length id, `Request`/`Notify`/`Push` carry a route.

use crate::error::{CherryError, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Request = 0,
    Notify = 1,
    Response = 2,
    Push = 3,
}

impl MessageType {
    fn from_tag(tag: u8) -> Result<Self, CherryError> {
        match tag {
            0 => Ok(MessageType::Request),
            1 => Ok(MessageType::Notify),
            2 => Ok(MessageType::Response),
            3 => Ok(MessageType::Push),
            _ => Err(CherryError::new(ErrorCode::RouteDecodeError)),
        }
    }

    fn carries_id(self) -> bool {
        matches!(self, MessageType::Request | MessageType::Response)
    }

    fn carries_route(self) -> bool {
        matches!(self, MessageType::Request | MessageType::Notify | MessageType::Push)
    }
}

const ERROR_FLAG: u8 = 0x1;
const ROUTE_DICT_FLAG: u8 = 0x2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Inline(String),
    Dictionary(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub id: Option<u64>,
    pub route: Option<Route>,
    pub data: Vec<u8>,
    pub error: bool,
}

impl Message {
    pub fn request(id: u64, route: Route, data: Vec<u8>) -> Self {
        Self {
            message_type: MessageType::Request,
            id: Some(id),
            route: Some(route),
            data,
            error: false,
        }
    }

    pub fn notify(route: Route, data: Vec<u8>) -> Self {
        Self {
            message_type: MessageType::Notify,
            id: None,
            route: Some(route),
            data,
            error: false,
        }
    }

    pub fn response(id: u64, data: Vec<u8>, error: bool) -> Self {
        Self {
            message_type: MessageType::Response,
            id: Some(id),
            route: None,
            data,
            error,
        }
    }

    pub fn push(route: Route, data: Vec<u8>) -> Self {
        Self {
            message_type: MessageType::Push,
            id: None,
            route: Some(route),
            data,
            error: false,
        }
    }
}

fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn decode_varint(buf: &[u8], offset: &mut usize) -> Result<u64, CherryError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *buf.get(*offset).ok_or_else(|| CherryError::new(ErrorCode::RouteDecodeError))?;
        *offset += 1;
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(CherryError::new(ErrorCode::RouteDecodeError));
        }
    }
}

pub fn encode_message(message: &Message) -> Vec<u8> {
    let mut flags = 0u8;
    if message.error {
        flags |= ERROR_FLAG;
    }
    let route_is_dict = matches!(message.route, Some(Route::Dictionary(_)));
    if route_is_dict {
        flags |= ROUTE_DICT_FLAG;
    }

    let mut out = Vec::with_capacity(4 + message.data.len());
    out.push(((message.message_type as u8) << 4) | flags);

    if let Some(id) = message.id {
        encode_varint(id, &mut out);
    }

    if let Some(route) = &message.route {
        match route {
            Route::Dictionary(index) => encode_varint(*index as u64, &mut out),
            Route::Inline(s) => {
                encode_varint(s.len() as u64, &mut out);
                out.extend_from_slice(s.as_bytes());
            }
        }
    }

    out.extend_from_slice(&message.data);
    out
}

pub fn decode_message(buf: &[u8]) -> Result<Message, CherryError> {
    let header = *buf.first().ok_or_else(|| CherryError::new(ErrorCode::RouteDecodeError))?;
    let message_type = MessageType::from_tag(header >> 4)?;
    let flags = header & 0x0F;
    let mut offset = 1usize;

    let id = if message_type.carries_id() {
        Some(decode_varint(buf, &mut offset)?)
    } else {
        None
    };

    let route = if message_type.carries_route() {
        if flags & ROUTE_DICT_FLAG != 0 {
            Some(Route::Dictionary(decode_varint(buf, &mut offset)? as u32))
        } else {
            let len = decode_varint(buf, &mut offset)? as usize;
            let end = offset
                .checked_add(len)
                .filter(|&end| end <= buf.len())
                .ok_or_else(|| CherryError::new(ErrorCode::RouteDecodeError))?;
            let s = String::from_utf8(buf[offset..end].to_vec())
                .map_err(|e| CherryError::with_source(ErrorCode::RouteDecodeError, e))?;
            offset = end;
            Some(Route::Inline(s))
        }
    } else {
        None
    };

    let data = buf[offset..].to_vec();

    Ok(Message {
        message_type,
        id,
        route,
        data,
        error: flags & ERROR_FLAG != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_request_with_inline_route() {
        let message = Message::request(42, Route::Inline("account.login".into()), vec![1, 2, 3]);
        let encoded = encode_message(&message);
        assert_eq!(decode_message(&encoded).unwrap(), message);
    }

    #[test]
    fn round_trips_a_request_with_dictionary_route() {
        let message = Message::request(300, Route::Dictionary(17), vec![9]);
        let encoded = encode_message(&message);
        assert_eq!(decode_message(&encoded).unwrap(), message);
    }

    #[test]
    fn round_trips_an_error_response() {
        let message = Message::response(300, vec![], true);
        let encoded = encode_message(&message);
        let decoded = decode_message(&encoded).unwrap();
        assert!(decoded.error);
        assert_eq!(decoded, message);
    }

    #[test]
    fn round_trips_a_push_with_no_id() {
        let message = Message::push(Route::Inline("room.update".into()), vec![4, 5, 6, 7]);
        let encoded = encode_message(&message);
        assert_eq!(decode_message(&encoded).unwrap(), message);
    }

    #[test]
    fn large_ids_use_multiple_varint_bytes() {
        let message = Message::request(u64::from(u32::MAX) + 1000, Route::Dictionary(0), vec![]);
        let encoded = encode_message(&message);
        assert!(encoded.len() > 3);
        assert_eq!(decode_message(&encoded).unwrap().id, message.id);
    }

    #[test]
    fn truncated_buffer_is_rejected_not_panicking() {
        let message = Message::request(1, Route::Inline("x".into()), vec![]);
        let encoded = encode_message(&message);
        assert!(decode_message(&encoded[..encoded.len() - 1]).is_err());
    }
}
