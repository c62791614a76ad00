//! Minimal micro-protocol: all-zero sentinel chunks mark start and end.
//!
//! A payload chunk that is entirely zero cannot be told apart from a
//! sentinel. The receiver will read it as the end of the transmission and
//! drop everything after it. Callers that may produce such chunks should
//! encode their payload first (base64 never yields a zero byte).

use super::{
    MicroProtocolReceive, MicroProtocolResponse, MicroProtocolSend, SliceUnit, TransmissionState,
};
use crate::bits::{BitSeq, BitSlicer, SimpleBitSlicer};
use crate::error::{Error, Result};
use tracing::{debug, info};

/// Send side of the minimal micro-protocol.
#[derive(Debug, Clone)]
pub struct MinimalMicroProtocolSend {
    slicer: SimpleBitSlicer,
    sentinel: BitSeq,
}

impl MinimalMicroProtocolSend {
    /// Create the send side.
    ///
    /// `padding` completes the final chunk and must hold at least
    /// `slice_size - 1` bits once `slice_size` is converted to bits.
    pub fn new(slice_size: usize, unit: SliceUnit, padding: BitSeq) -> Result<Self> {
        let slice_bits = unit.to_bits(slice_size)?;
        let slicer = SimpleBitSlicer::new(slice_bits, padding)?;
        Ok(Self {
            slicer,
            sentinel: BitSeq::zeros(slice_bits),
        })
    }
}

impl MicroProtocolSend for MinimalMicroProtocolSend {
    /// `00110` with a 3-bit slice and padding `000` becomes
    /// `000`, `001`, `100`, `000`.
    fn frame(&self, data: &BitSeq) -> Vec<BitSeq> {
        let body = self.slicer.slice(data);
        let mut framed = Vec::with_capacity(body.len() + 2);
        framed.push(self.sentinel.clone());
        framed.extend(body);
        framed.push(self.sentinel.clone());
        debug!(
            slice_size = self.slicer.slice_size(),
            chunks = framed.len(),
            "framed transmission"
        );
        framed
    }

    fn slice_size(&self) -> usize {
        self.slicer.slice_size()
    }
}

/// Receive side of the minimal micro-protocol.
///
/// | state    | zero chunk | other chunk          |
/// |----------|------------|----------------------|
/// | waiting  | → active   | stay                 |
/// | active   | → finished | stay, emit the chunk |
/// | finished | stay       | stay                 |
#[derive(Debug, Clone)]
pub struct MinimalMicroProtocolReceive {
    slice_size: usize,
    state: TransmissionState,
}

impl MinimalMicroProtocolReceive {
    /// Create the receive side in `WaitingForTransmission`.
    pub fn new(slice_size: usize, unit: SliceUnit) -> Result<Self> {
        let slice_size = unit.to_bits(slice_size)?;
        if slice_size == 0 {
            return Err(Error::InvalidConfig(
                "slice size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            slice_size,
            state: TransmissionState::WaitingForTransmission,
        })
    }

    fn is_sentinel(&self, chunk: &BitSeq) -> bool {
        chunk.len() == self.slice_size && chunk.is_zero()
    }
}

impl MicroProtocolReceive for MinimalMicroProtocolReceive {
    /// Chunks of the wrong length are treated as unrelated traffic while
    /// waiting or finished, and rejected while a transmission is active.
    fn classify(&mut self, chunk: &BitSeq) -> Result<MicroProtocolResponse> {
        let mut payload = None;

        match self.state {
            TransmissionState::WaitingForTransmission => {
                if self.is_sentinel(chunk) {
                    self.state = TransmissionState::ActiveTransmission;
                    info!(slice_size = self.slice_size, "transmission started");
                }
            }
            TransmissionState::ActiveTransmission => {
                if chunk.len() != self.slice_size {
                    return Err(Error::ChunkLength {
                        expected: self.slice_size,
                        actual: chunk.len(),
                    });
                }
                if chunk.is_zero() {
                    self.state = TransmissionState::FinishedTransmission;
                    info!("transmission finished");
                } else {
                    payload = Some(chunk.clone());
                }
            }
            TransmissionState::FinishedTransmission => {}
        }

        Ok(MicroProtocolResponse {
            state: self.state,
            payload,
        })
    }

    fn state(&self) -> TransmissionState {
        self.state
    }

    fn slice_size(&self) -> usize {
        self.slice_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(s: &str) -> BitSeq {
        s.parse().unwrap()
    }

    #[test]
    fn test_unit_conversion() {
        for size in 1..100 {
            let send =
                MinimalMicroProtocolSend::new(size, SliceUnit::Bits, BitSeq::zeros(size)).unwrap();
            assert_eq!(send.slice_size(), size);

            let send =
                MinimalMicroProtocolSend::new(size, SliceUnit::Bytes, BitSeq::zeros(size * 8))
                    .unwrap();
            assert_eq!(send.slice_size(), size * 8);

            let recv = MinimalMicroProtocolReceive::new(size, SliceUnit::Bytes).unwrap();
            assert_eq!(recv.slice_size(), size * 8);
        }
    }

    #[test]
    fn test_byte_size_overflowing_bits_rejected() {
        assert!(matches!(
            MinimalMicroProtocolReceive::new(usize::MAX, SliceUnit::Bytes),
            Err(Error::InvalidConfig(_))
        ));
        assert!(MinimalMicroProtocolSend::new(usize::MAX, SliceUnit::Bytes, BitSeq::new()).is_err());
    }

    #[test]
    fn test_frame_known_bits() {
        let mp = MinimalMicroProtocolSend::new(3, SliceUnit::Bits, bits("00")).unwrap();
        let framed = mp.frame(&bits("0111101001010110101"));
        let expected: Vec<BitSeq> = [
            "000", "011", "110", "100", "101", "011", "010", "100", "000",
        ]
        .iter()
        .map(|s| bits(s))
        .collect();
        assert_eq!(framed, expected);
    }

    #[test]
    fn test_frame_empty_payload_is_two_sentinels() {
        let mp = MinimalMicroProtocolSend::new(1, SliceUnit::Bytes, BitSeq::zeros(8)).unwrap();
        assert_eq!(mp.frame(&BitSeq::new()), vec![BitSeq::zeros(8), BitSeq::zeros(8)]);
    }

    #[test]
    fn test_classify_transitions() {
        let mut mp = MinimalMicroProtocolReceive::new(3, SliceUnit::Bits).unwrap();
        assert_eq!(mp.state(), TransmissionState::WaitingForTransmission);

        let steps = [
            ("001", TransmissionState::WaitingForTransmission, None),
            ("000", TransmissionState::ActiveTransmission, None),
            ("110", TransmissionState::ActiveTransmission, Some("110")),
            ("011", TransmissionState::ActiveTransmission, Some("011")),
            ("000", TransmissionState::FinishedTransmission, None),
            ("111", TransmissionState::FinishedTransmission, None),
            ("000", TransmissionState::FinishedTransmission, None),
        ];

        for (input, state, payload) in steps {
            let resp = mp.classify(&bits(input)).unwrap();
            assert_eq!(resp.state, state, "after {input}");
            assert_eq!(resp.payload, payload.map(bits), "after {input}");
            assert_eq!(mp.state(), state);
        }
    }

    #[test]
    fn test_wrong_length_while_active_is_rejected() {
        let mut mp = MinimalMicroProtocolReceive::new(4, SliceUnit::Bits).unwrap();
        // Noise of another length before the start marker is ignored.
        let resp = mp.classify(&bits("00000")).unwrap();
        assert_eq!(resp.state, TransmissionState::WaitingForTransmission);

        mp.classify(&bits("0000")).unwrap();
        assert!(matches!(
            mp.classify(&bits("101")),
            Err(Error::ChunkLength {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_round_trip() {
        let send = MinimalMicroProtocolSend::new(5, SliceUnit::Bits, bits("1111")).unwrap();
        let mut recv = MinimalMicroProtocolReceive::new(5, SliceUnit::Bits).unwrap();
        let data = BitSeq::from_bytes(b"Hello World");

        let mut collected = BitSeq::new();
        for chunk in send.frame(&data) {
            if let Some(payload) = recv.classify(&chunk).unwrap().payload {
                collected.extend_from(&payload);
            }
        }

        assert_eq!(recv.state(), TransmissionState::FinishedTransmission);
        assert_eq!(collected.range(0, data.len()).unwrap(), data);
    }

    #[test]
    fn test_zero_payload_chunk_ends_transmission_early() {
        let send = MinimalMicroProtocolSend::new(1, SliceUnit::Bytes, BitSeq::zeros(8)).unwrap();
        let mut recv = MinimalMicroProtocolReceive::new(1, SliceUnit::Bytes).unwrap();

        let mut collected = BitSeq::new();
        for chunk in send.frame(&BitSeq::from_bytes(&[b'a', 0, b'b'])) {
            if let Some(payload) = recv.classify(&chunk).unwrap().payload {
                collected.extend_from(&payload);
            }
        }

        assert_eq!(recv.state(), TransmissionState::FinishedTransmission);
        assert_eq!(collected.to_bytes().unwrap(), b"a".to_vec());
    }
}
