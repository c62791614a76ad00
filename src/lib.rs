//! Covert channel framework
//!
//! Hides an arbitrary byte stream inside the payloads of an existing
//! carrier (text lines, replayed packet captures, intercepted packets) and
//! recovers it on the other side.
//!
//! # Features
//!
//! - **Bit slicing**: fixed-size chunks, the last one completed from configurable padding
//! - **Micro-protocol**: all-zero sentinel chunks mark start and end of a transmission
//! - **Embedding strategies**: fixed bit offset, regex substitution, whole payload
//! - **Carriers**: lines on stdio, pcap replay, any `UnitSource` / `UnitSink` pair
//! - **Payload transforms**: base64, XOR, AES-CTR, password-sealed AES-256-GCM
//!
//! # Architecture
//!
//! ```text
//! data → transforms → slice + frame → embed per unit → carrier
//! carrier → extract per unit → deframe → transforms → data
//! ```
//!
//! # Example
//!
//! ```rust
//! use covert_channel::carrier::{LineReceiveAdapter, LineSendAdapter};
//! use covert_channel::transform::{Base64Decode, Base64Encode, Transform};
//! use covert_channel::{ChannelConfig, Receiver, Sender};
//! use std::io::Cursor;
//!
//! let config = ChannelConfig::default();
//!
//! let encode = vec![Box::new(Base64Encode) as Box<dyn Transform>];
//! let adapter = LineSendAdapter::new(Vec::new(), config.build_send_protocol().unwrap());
//! let mut sender = Sender::new(encode, adapter);
//! sender.send(b"Hidden data").unwrap();
//! let lines = sender.into_adapter().into_inner();
//!
//! let decode = vec![Box::new(Base64Decode) as Box<dyn Transform>];
//! let framing = config.build_receive_protocol().unwrap();
//! let adapter = LineReceiveAdapter::new(Cursor::new(lines), framing);
//! let data = Receiver::new(decode, adapter).receive().unwrap();
//! assert_eq!(data, b"Hidden data");
//! ```

pub mod bits;
pub mod carrier;
pub mod config;
pub mod crypto;
pub mod embed;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod transform;

pub use bits::BitSeq;
pub use config::ChannelConfig;
pub use error::{Error, Result};
pub use pipeline::{Receiver, Sender};
