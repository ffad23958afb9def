//! CoAP 报文编解码（RFC 7252 子集）
//!
//! ```text
//!  0                   1                   2                   3
//! |Ver| T |  TKL  |      Code     |          Message ID           |
//! |   Token (if any, TKL bytes) ...
//! |   Options (if any) ...
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! ```

use crate::error::CodecError;
use std::fmt;

const VERSION: u8 = 1;
const PAYLOAD_MARKER: u8 = 0xFF;
const MAX_TOKEN_LEN: usize = 8;

/// Uri-Path 选项号
pub const OPTION_URI_PATH: u16 = 11;
/// Content-Format 选项号
pub const OPTION_CONTENT_FORMAT: u16 = 12;

/// text/plain; charset=utf-8
pub const CONTENT_FORMAT_TEXT: u16 = 0;
/// application/json
pub const CONTENT_FORMAT_JSON: u16 = 50;

/// 报文类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Confirmable,
    NonConfirmable,
    Acknowledgement,
    Reset,
}

impl MessageType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Self::Confirmable => 0,
            Self::NonConfirmable => 1,
            Self::Acknowledgement => 2,
            Self::Reset => 3,
        }
    }
}

/// 报文码（class.detail）
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(pub u8);

impl Code {
    pub const EMPTY: Code = Code(0x00);
    pub const GET: Code = Code(0x01);
    pub const POST: Code = Code(0x02);
    pub const PUT: Code = Code(0x03);
    pub const DELETE: Code = Code(0x04);
    pub const CREATED: Code = Code(0x41);
    pub const CHANGED: Code = Code(0x44);
    pub const CONTENT: Code = Code(0x45);
    pub const BAD_REQUEST: Code = Code(0x80);
    pub const NOT_FOUND: Code = Code(0x84);
    pub const METHOD_NOT_ALLOWED: Code = Code(0x85);
    pub const INTERNAL_SERVER_ERROR: Code = Code(0xA0);

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_request(self) -> bool {
        self.class() == 0 && !self.is_empty()
    }

    pub fn is_response(self) -> bool {
        (2..=5).contains(&self.class())
    }

    pub fn is_success(self) -> bool {
        self.class() == 2
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({self})")
    }
}

/// 请求方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn from_code(code: Code) -> Option<Self> {
        match code {
            Code::GET => Some(Self::Get),
            Code::POST => Some(Self::Post),
            Code::PUT => Some(Self::Put),
            Code::DELETE => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn code(self) -> Code {
        match self {
            Self::Get => Code::GET,
            Self::Post => Code::POST,
            Self::Put => Code::PUT,
            Self::Delete => Code::DELETE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// 选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Vec<u8>,
}

/// CoAP 报文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub code: Code,
    pub message_id: u16,
    pub token: Vec<u8>,
    pub options: Vec<CoapOption>,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(message_type: MessageType, code: Code, message_id: u16) -> Self {
        Self {
            message_type,
            code,
            message_id,
            token: Vec::new(),
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// 空 ACK（用于分离响应的确认）
    pub fn empty_ack(message_id: u16) -> Self {
        Self::new(MessageType::Acknowledgement, Code::EMPTY, message_id)
    }

    /// RST
    pub fn reset(message_id: u16) -> Self {
        Self::new(MessageType::Reset, Code::EMPTY, message_id)
    }

    /// 资源路径：各段 Uri-Path 以 `/` 连接。
    pub fn uri_path(&self) -> String {
        self.options
            .iter()
            .filter(|option| option.number == OPTION_URI_PATH)
            .map(|option| String::from_utf8_lossy(&option.value).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn set_uri_path(&mut self, path: &str) {
        self.options.retain(|option| option.number != OPTION_URI_PATH);
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            self.options.push(CoapOption {
                number: OPTION_URI_PATH,
                value: segment.as_bytes().to_vec(),
            });
        }
    }

    pub fn content_format(&self) -> Option<u16> {
        self.options
            .iter()
            .find(|option| option.number == OPTION_CONTENT_FORMAT)
            .map(|option| {
                option
                    .value
                    .iter()
                    .fold(0u16, |acc, byte| (acc << 8) | u16::from(*byte))
            })
    }

    pub fn set_content_format(&mut self, format: u16) {
        self.options
            .retain(|option| option.number != OPTION_CONTENT_FORMAT);
        // uint 选项：最短大端编码，0 为空值
        let value = match format {
            0 => Vec::new(),
            1..=0xFF => vec![format as u8],
            _ => format.to_be_bytes().to_vec(),
        };
        self.options.push(CoapOption {
            number: OPTION_CONTENT_FORMAT,
            value,
        });
    }

    /// 编码为字节。选项按编号升序写出。
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.token.len() > MAX_TOKEN_LEN {
            return Err(CodecError::InvalidTokenLength(self.token.len()));
        }
        let mut out = Vec::with_capacity(4 + self.token.len() + self.payload.len() + 16);
        out.push((VERSION << 6) | (self.message_type.bits() << 4) | self.token.len() as u8);
        out.push(self.code.0);
        out.extend_from_slice(&self.message_id.to_be_bytes());
        out.extend_from_slice(&self.token);

        let mut options: Vec<&CoapOption> = self.options.iter().collect();
        options.sort_by_key(|option| option.number);
        let mut previous = 0u16;
        for option in options {
            let delta = option.number - previous;
            let length = option.value.len();
            if length > usize::from(u16::MAX) + 269 {
                return Err(CodecError::OptionTooLong(length));
            }
            let (delta_nibble, delta_ext) = split_extended(u32::from(delta));
            let (length_nibble, length_ext) = split_extended(length as u32);
            out.push((delta_nibble << 4) | length_nibble);
            out.extend_from_slice(&delta_ext);
            out.extend_from_slice(&length_ext);
            out.extend_from_slice(&option.value);
            previous = option.number;
        }

        if !self.payload.is_empty() {
            out.push(PAYLOAD_MARKER);
            out.extend_from_slice(&self.payload);
        }
        Ok(out)
    }

    /// 从字节解码。
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let header = peek_header(bytes)?;
        let token_len = usize::from(bytes[0] & 0x0F);
        if token_len > MAX_TOKEN_LEN {
            return Err(CodecError::InvalidTokenLength(token_len));
        }
        let mut cursor = 4;
        let token = bytes
            .get(cursor..cursor + token_len)
            .ok_or(CodecError::Truncated("token"))?
            .to_vec();
        cursor += token_len;

        let mut options = Vec::new();
        let mut payload = Vec::new();
        let mut number = 0u16;
        while cursor < bytes.len() {
            let byte = bytes[cursor];
            cursor += 1;
            if byte == PAYLOAD_MARKER {
                if cursor == bytes.len() {
                    return Err(CodecError::EmptyPayload);
                }
                payload = bytes[cursor..].to_vec();
                break;
            }
            let delta = read_extended(bytes, &mut cursor, byte >> 4)?;
            let length = read_extended(bytes, &mut cursor, byte & 0x0F)? as usize;
            number = u16::try_from(u32::from(number) + delta)
                .map_err(|_| CodecError::Truncated("option number"))?;
            let value = bytes
                .get(cursor..cursor + length)
                .ok_or(CodecError::Truncated("option value"))?
                .to_vec();
            cursor += length;
            options.push(CoapOption { number, value });
        }

        Ok(Self {
            message_type: header.message_type,
            code: header.code,
            message_id: header.message_id,
            token,
            options,
            payload,
        })
    }
}

/// 报文头（仅前 4 字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub message_type: MessageType,
    pub code: Code,
    pub message_id: u16,
}

/// 只解析固定头，供无法完整解码的报文回 RST 使用。
pub fn peek_header(bytes: &[u8]) -> Result<Header, CodecError> {
    if bytes.len() < 4 {
        return Err(CodecError::Truncated("header"));
    }
    let version = bytes[0] >> 6;
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    Ok(Header {
        message_type: MessageType::from_bits(bytes[0] >> 4),
        code: Code(bytes[1]),
        message_id: u16::from_be_bytes([bytes[2], bytes[3]]),
    })
}

fn split_extended(value: u32) -> (u8, Vec<u8>) {
    if value < 13 {
        (value as u8, Vec::new())
    } else if value < 269 {
        (13, vec![(value - 13) as u8])
    } else {
        (14, ((value - 269) as u16).to_be_bytes().to_vec())
    }
}

fn read_extended(bytes: &[u8], cursor: &mut usize, nibble: u8) -> Result<u32, CodecError> {
    match nibble {
        0..=12 => Ok(u32::from(nibble)),
        13 => {
            let byte = *bytes
                .get(*cursor)
                .ok_or(CodecError::Truncated("option extension"))?;
            *cursor += 1;
            Ok(u32::from(byte) + 13)
        }
        14 => {
            let pair = bytes
                .get(*cursor..*cursor + 2)
                .ok_or(CodecError::Truncated("option extension"))?;
            *cursor += 2;
            Ok(u32::from(u16::from_be_bytes([pair[0], pair[1]])) + 269)
        }
        _ => Err(CodecError::ReservedOptionNibble),
    }
}
