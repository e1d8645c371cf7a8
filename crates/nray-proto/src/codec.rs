//! Length-delimited framing plus bincode payload (de)serialization.

use bytes::Bytes;
use nray_core::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::codec::LengthDelimitedCodec;

/// Builds the length-delimited codec both ends of the transport use.
/// 16 MiB max frame guards against a malformed length prefix turning
/// into an unbounded allocation.
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(16 * 1024 * 1024)
        .new_codec()
}

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes> {
    let bytes = bincode::serialize(message)?;
    Ok(Bytes::from(bytes))
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T> {
    bincode::deserialize(frame).map_err(|e| Error::Protocol(format!("malformed frame: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nray_core::{AnyTargets, ServerMessage};

    #[test]
    fn round_trips_a_server_message() {
        let msg = ServerMessage::JobBatch {
            batch_id: 42,
            targets: AnyTargets::new(vec!["10.0.0.1".to_string()], vec![22], vec![]),
        };
        let bytes = encode(&msg).unwrap();
        let decoded: ServerMessage = decode(&bytes).unwrap();
        match decoded {
            ServerMessage::JobBatch { batch_id, targets } => {
                assert_eq!(batch_id, 42);
                assert_eq!(targets.tcp_ports, vec![22]);
            }
            _ => panic!("wrong variant decoded"),
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        let garbage = vec![0xffu8; 4];
        let result: Result<ServerMessage> = decode(&garbage);
        assert!(result.is_err());
    }
}
