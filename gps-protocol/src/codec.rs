/// `tokio_util` codec adapter around a [FrameDecoder]
use std::io::{self, ErrorKind};

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::DecodeError;
use crate::protocol::{DecoderOptions, FrameDecoder};

/// Turns a byte stream into packets of one protocol and writes raw response
/// bytes back.
///
/// Incomplete frames stay buffered until the rest arrives, but never grow
/// beyond the configured maximum frame length.
#[derive(Debug)]
pub struct FrameCodec<D> {
    decoder: D,
    max_frame_len: usize,
}

impl<D: FrameDecoder> FrameCodec<D> {
    pub fn new(options: &DecoderOptions) -> Self {
        FrameCodec {
            decoder: D::new(options),
            max_frame_len: options.max_frame_len,
        }
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }
}

impl<D: FrameDecoder> Decoder for FrameCodec<D> {
    type Item = D::Packet;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decoder.decode_frame(src)? {
            Some((packet, used)) => {
                log::trace!("{} frame: {}", D::NAME, hex::encode(&src[..used]));
                src.advance(used);
                Ok(Some(packet))
            }
            None if src.len() > self.max_frame_len => Err(DecodeError::FrameTooLarge {
                max: self.max_frame_len,
                got: src.len(),
            }),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(packet) => Ok(Some(packet)),
            None if buf.is_empty() => Ok(None),
            None => Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("{} bytes of an incomplete frame left on stream", buf.len()),
            )
            .into()),
        }
    }
}

impl<D> Encoder<Vec<u8>> for FrameCodec<D> {
    type Error = io::Error;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gt06::Gt06Decoder;
    use crate::protocol::Packet;
    use crate::watch::WatchDecoder;

    const LOGIN: &str = "78780d01035341903175401300014e100d0a";
    const STATUS: &str = "78780a13460404000100034e4f0d0a";

    #[test]
    fn frames_split_across_reads() {
        let mut codec = FrameCodec::<Gt06Decoder>::new(&DecoderOptions::default());
        let login = hex::decode(LOGIN).unwrap();
        let mut buf = BytesMut::from(&login[..7]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 7);

        buf.extend_from_slice(&login[7..]);
        buf.extend_from_slice(&hex::decode(STATUS).unwrap());
        let login = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(login.device(), "353419031754013");
        let status = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(status.device(), "353419031754013");
        assert!(buf.is_empty());
        assert_eq!(codec.decoder().device_id(), Some("353419031754013"));
    }

    #[test]
    fn unterminated_frame_is_bounded() {
        let options = DecoderOptions {
            max_frame_len: 16,
            ..DecoderOptions::default()
        };
        let mut codec = FrameCodec::<WatchDecoder>::new(&options);
        let mut buf = BytesMut::from(&b"[3G*8800000015*"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"0009*LK,0,0");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(DecodeError::FrameTooLarge { max: 16, got: 26 })
        ));
    }

    #[test]
    fn leftover_bytes_at_eof() {
        let mut codec = FrameCodec::<WatchDecoder>::new(&DecoderOptions::default());
        let mut buf = BytesMut::from(&b"[3G*1*0002*LK][3G*1"[..]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_some());
        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(err.is_connection_gone());

        let mut empty = BytesMut::new();
        assert!(codec.decode_eof(&mut empty).unwrap().is_none());
    }

    #[test]
    fn responses_are_written_verbatim() {
        let mut codec = FrameCodec::<WatchDecoder>::new(&DecoderOptions::default());
        let mut dst = BytesMut::new();
        codec.encode(b"[3G*1*0002*LK]".to_vec(), &mut dst).unwrap();
        assert_eq!(&dst[..], b"[3G*1*0002*LK]");
    }
}
