//! Sender and Receiver: transforms around a single carrier transmission.
//!
//! ```text
//! Sender:   data → t1 → t2 → … → SendAdapter::send
//! Receiver: ReceiveAdapter::receive → r1 → r2 → … → data
//! ```
//!
//! Both lists run front to back. The receiver does not reverse its list,
//! so a sender running `[encrypt, encode]` pairs with a receiver running
//! `[decode, decrypt]`.

use crate::carrier::{ReceiveAdapter, SendAdapter};
use crate::error::Result;
use crate::transform::Transform;
use tracing::{debug, info};

/// Run `transforms` over `data` in order.
fn run_all(transforms: &[Box<dyn Transform>], data: Vec<u8>) -> Result<Vec<u8>> {
    transforms.iter().try_fold(data, |acc, transform| {
        let out = transform.apply(&acc)?;
        debug!(
            transform = transform.name(),
            before = acc.len(),
            after = out.len(),
            "applied transform"
        );
        Ok(out)
    })
}

/// Pre-processes data and hands it to a send adapter.
pub struct Sender<A: SendAdapter> {
    transforms: Vec<Box<dyn Transform>>,
    adapter: A,
}

impl<A: SendAdapter> Sender<A> {
    pub fn new(transforms: Vec<Box<dyn Transform>>, adapter: A) -> Self {
        Self {
            transforms,
            adapter,
        }
    }

    /// Transform `data` and send it in one transmission.
    ///
    /// # Errors
    /// Transform errors are returned before anything touches the carrier.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        let prepared = run_all(&self.transforms, data.to_vec())?;
        info!(
            input = data.len(),
            prepared = prepared.len(),
            transforms = self.transforms.len(),
            "sender starting transmission"
        );
        self.adapter.send(&prepared)
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn into_adapter(self) -> A {
        self.adapter
    }
}

/// Receives one transmission and post-processes it.
pub struct Receiver<A: ReceiveAdapter> {
    transforms: Vec<Box<dyn Transform>>,
    adapter: A,
}

impl<A: ReceiveAdapter> Receiver<A> {
    pub fn new(transforms: Vec<Box<dyn Transform>>, adapter: A) -> Self {
        Self {
            transforms,
            adapter,
        }
    }

    /// Block until the adapter finishes, then transform what arrived.
    pub fn receive(&mut self) -> Result<Vec<u8>> {
        let raw = self.adapter.receive()?;
        let data = run_all(&self.transforms, raw)?;
        info!(bytes = data.len(), "receiver finished transmission");
        Ok(data)
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn into_adapter(self) -> A {
        self.adapter
    }
}
