// SPDX-License-Identifier: MIT

//! Scripted in-memory transport for protocol tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sed_call::error::Result;
use sed_call::transport::{Transport, TransportType};

/// Replays queued responses and records every IF-SEND.
///
/// An exhausted response queue answers zero bytes, which is exactly what
/// a TPer still preparing its response looks like.
#[derive(Default)]
pub struct MockTransport {
    sends: Mutex<Vec<(u8, u16, Vec<u8>)>>,
    responses: Mutex<VecDeque<Vec<u8>>>,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(MockTransport::default())
    }

    /// Queue one IF-RECV response.
    pub fn push_response(&self, data: Vec<u8>) {
        self.responses.lock().unwrap().push_back(data);
    }

    /// Everything sent so far, as (protocol, ComID, payload).
    pub fn sent(&self) -> Vec<(u8, u16, Vec<u8>)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }
}

impl Transport for MockTransport {
    fn if_send(&self, protocol_id: u8, com_id: u16, payload: &[u8]) -> Result<()> {
        self.sends
            .lock()
            .unwrap()
            .push((protocol_id, com_id, payload.to_vec()));
        Ok(())
    }

    fn if_recv(&self, _protocol_id: u8, _com_id: u16, buffer: &mut [u8]) -> Result<usize> {
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => {
                let len = response.len().min(buffer.len());
                buffer[..len].copy_from_slice(&response[..len]);
                Ok(len)
            }
            None => Ok(0),
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Unknown
    }

    fn device_path(&self) -> &str {
        "/dev/mock"
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}
