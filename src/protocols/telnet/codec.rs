use tokio_util::codec::{Encoder, Decoder};
use bytes::{BytesMut, Buf, BufMut, Bytes};
use std::io;

use super::codes;

// TelnetEvents are the bread and butter of this Codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelnetEvent {
    // WILL|WONT|DO|DONT <OPTION>
    Negotiate(u8, u8),

    // IAC SB <OPTION> <DATA> IAC SE
    SubNegotiate(u8, Bytes),

    // Raw data, with IAC escapes already removed.
    Data(Bytes),

    // An IAC <command> other than those involved in negotiation and sub-options.
    Command(u8)
}

// Doubles every IAC so it survives the trip as data.
fn escape_iac(data: &[u8], out: &mut BytesMut) {
    for b in data {
        if *b == codes::IAC {
            out.put_u8(codes::IAC);
        }
        out.put_u8(*b);
    }
}

impl From<TelnetEvent> for Bytes {
    fn from(src: TelnetEvent) -> Self {
        match src {
            TelnetEvent::Data(data) => {
                let mut out = BytesMut::with_capacity(data.len());
                escape_iac(&data, &mut out);
                out.freeze()
            },
            TelnetEvent::Negotiate(comm, op) => {
                let mut out = BytesMut::with_capacity(3);
                out.extend(&[codes::IAC, comm, op]);
                out.freeze()
            },
            TelnetEvent::SubNegotiate(op, data) => {
                let mut out = BytesMut::with_capacity(5 + data.len());
                out.extend(&[codes::IAC, codes::SB, op]);
                escape_iac(&data, &mut out);
                out.extend(&[codes::IAC, codes::SE]);
                out.freeze()
            },
            TelnetEvent::Command(byte) => {
                let mut out = BytesMut::with_capacity(2);
                out.extend(&[codes::IAC, byte]);
                out.freeze()
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct TelnetCodec {
    max_buffer: usize,
}

impl Default for TelnetCodec {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

impl TelnetCodec {
    pub fn new(max_buffer: usize) -> Self {
        TelnetCodec {
            max_buffer,
        }
    }
}

impl Encoder<TelnetEvent> for TelnetCodec {
    type Error = io::Error;

    fn encode(&mut self, item: TelnetEvent, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let out = Bytes::from(item);
        dst.reserve(out.len());
        dst.put(out.as_ref());
        Ok(())
    }
}

impl Decoder for TelnetCodec {
    type Item = TelnetEvent;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        if src.len() > self.max_buffer {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "telnet buffer overflow"));
        }

        // Plain data runs up to the next IAC.
        if src[0] != codes::IAC {
            let end = src.iter().position(|b| *b == codes::IAC).unwrap_or(src.len());
            return Ok(Some(TelnetEvent::Data(src.split_to(end).freeze())));
        }

        if src.len() < 2 {
            return Ok(None);
        }

        match src[1] {
            codes::IAC => {
                src.advance(2);
                Ok(Some(TelnetEvent::Data(Bytes::from_static(&[codes::IAC]))))
            },
            codes::WILL | codes::WONT | codes::DO | codes::DONT => {
                if src.len() < 3 {
                    return Ok(None);
                }
                let answer = TelnetEvent::Negotiate(src[1], src[2]);
                src.advance(3);
                Ok(Some(answer))
            },
            codes::SB => {
                if src.len() < 5 {
                    return Ok(None);
                }
                let op = src[2];
                let mut data = BytesMut::new();
                let mut pos = 3;
                while pos + 1 < src.len() {
                    if src[pos] == codes::IAC {
                        match src[pos + 1] {
                            codes::SE => {
                                src.advance(pos + 2);
                                return Ok(Some(TelnetEvent::SubNegotiate(op, data.freeze())));
                            },
                            codes::IAC => {
                                data.put_u8(codes::IAC);
                                pos += 2;
                            },
                            // A stray command inside a sub-negotiation; keep the byte and move on.
                            other => {
                                data.put_u8(other);
                                pos += 2;
                            }
                        }
                    } else {
                        data.put_u8(src[pos]);
                        pos += 1;
                    }
                }
                Ok(None)
            },
            cmd => {
                src.advance(2);
                Ok(Some(TelnetEvent::Command(cmd)))
            }
        }
    }
}
