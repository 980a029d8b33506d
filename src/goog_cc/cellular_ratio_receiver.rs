/*
 *  Copyright (c) 2024 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

//! Out of band cellular resource ratio samples.
//!
//! A modem side process sends one fixed size datagram per sample to a local
//! unix socket. [CellularRatioReceiver] reads them on a background thread and
//! queues them on a channel, which the owner of the estimator drains with
//! [DelayBasedBwe::process_cellular_ratio_updates](super::DelayBasedBwe::process_cellular_ratio_updates).

#[cfg(unix)]
use std::{
    io::ErrorKind,
    net::Shutdown,
    os::unix::net::UnixDatagram,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

#[cfg(unix)]
use crossbeam_channel::Sender;
use thiserror::Error;

use crate::api::units::Timestamp;

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/webrtc_cellular_ratio.sock";

#[derive(Error, Debug)]
pub enum CellularRatioError {
    #[error("cellular ratio socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid cellular ratio packet size: expected {expected}, got {actual}")]
    InvalidPacketSize { expected: usize, actual: usize },

    #[error("cellular ratio receiver is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, CellularRatioError>;

/// One sample as sent on the wire: `u64` timestamp in ms, `f64` ratio and
/// `u32` sequence number, little endian and unpadded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellularRatioPacket {
    pub timestamp_ms: u64,
    pub ratio: f64,
    pub sequence_number: u32,
}

impl CellularRatioPacket {
    pub const SIZE: usize = 20;

    // Keeps the conversion below Timestamp::plus_infinity().
    const MAX_TIMESTAMP_MS: u64 = (i64::MAX / 1_000 - 1) as u64;

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::SIZE {
            return Err(CellularRatioError::InvalidPacketSize {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }

        Ok(Self {
            timestamp_ms: u64::from_le_bytes(le_bytes(&buf[0..8])),
            ratio: f64::from_le_bytes(le_bytes(&buf[8..16])),
            sequence_number: u32::from_le_bytes(le_bytes(&buf[16..20])),
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        buf[8..16].copy_from_slice(&self.ratio.to_le_bytes());
        buf[16..20].copy_from_slice(&self.sequence_number.to_le_bytes());
        buf
    }

    /// The sample time on the estimator clock.
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::from_millis(self.timestamp_ms.min(Self::MAX_TIMESTAMP_MS) as i64)
    }
}

fn le_bytes<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// Receives [CellularRatioPacket]s on a unix datagram socket.
///
/// The socket is bound by [CellularRatioReceiver::start] and removed again by
/// [CellularRatioReceiver::stop], which also runs on drop.
#[cfg(unix)]
pub struct CellularRatioReceiver {
    path: PathBuf,
    running: Arc<AtomicBool>,
    socket: Option<UnixDatagram>,
    thread: Option<JoinHandle<()>>,
}

#[cfg(unix)]
impl Default for CellularRatioReceiver {
    fn default() -> Self {
        Self::new(DEFAULT_SOCKET_PATH)
    }
}

#[cfg(unix)]
impl CellularRatioReceiver {
    const RECEIVE_BUFFER_SIZE: usize = 64;
    const POLL_INTERVAL: Duration = Duration::from_millis(100);
    const THREAD_NAME: &'static str = "cellular-ratio";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            running: Arc::new(AtomicBool::new(false)),
            socket: None,
            thread: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True while the receive thread is alive.
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Binds the socket and starts forwarding samples to `updates`.
    ///
    /// A stale socket file at the path is removed first. Fails if the socket
    /// cannot be bound, in which case no samples will ever arrive. A receiver
    /// whose thread has exited on its own can be started again.
    pub fn start(&mut self, updates: Sender<CellularRatioPacket>) -> Result<()> {
        if self.is_running() {
            return Err(CellularRatioError::AlreadyRunning);
        }
        // Reap a finished thread and its socket before binding again.
        self.stop();

        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = ?self.path, "Removed stale cellular ratio socket"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let socket = UnixDatagram::bind(&self.path)?;
        // Lets the thread notice a stop even where shutdown does not wake recv.
        socket.set_read_timeout(Some(Self::POLL_INTERVAL))?;
        let thread_socket = socket.try_clone()?;

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let thread = std::thread::Builder::new()
            .name(Self::THREAD_NAME.to_string())
            .spawn(move || receive_loop(thread_socket, running, updates));
        let thread = match thread {
            Ok(thread) => thread,
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                self.remove_socket_file();
                return Err(err.into());
            }
        };

        tracing::info!(path = ?self.path, "Cellular ratio receiver listening");
        self.socket = Some(socket);
        self.thread = Some(thread);
        Ok(())
    }

    /// Stops the receive thread and removes the socket file. Safe to call
    /// more than once.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        let Some(thread) = self.thread.take() else {
            return;
        };
        if let Some(socket) = self.socket.take() {
            if let Err(err) = socket.shutdown(Shutdown::Both) {
                tracing::trace!(%err, "Cellular ratio socket shutdown");
            }
        }
        if thread.join().is_err() {
            tracing::error!("Cellular ratio receiver thread panicked");
        }
        self.remove_socket_file();
        tracing::info!(path = ?self.path, "Cellular ratio receiver stopped");
    }

    fn remove_socket_file(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = ?self.path, %err, "Failed to remove cellular ratio socket")
            }
        }
    }
}

#[cfg(unix)]
impl Drop for CellularRatioReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
fn receive_loop(
    socket: UnixDatagram,
    running: Arc<AtomicBool>,
    updates: Sender<CellularRatioPacket>,
) {
    let mut buf = [0u8; CellularRatioReceiver::RECEIVE_BUFFER_SIZE];
    let mut last_sequence_number: Option<u32> = None;

    while running.load(Ordering::SeqCst) {
        let len = match socket.recv(&mut buf) {
            Ok(len) => len,
            Err(err) => match err.kind() {
                ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => continue,
                _ => {
                    if running.load(Ordering::SeqCst) {
                        tracing::error!(%err, "Cellular ratio receive failed");
                    }
                    break;
                }
            },
        };
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let packet = match CellularRatioPacket::decode(&buf[..len]) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(%err, "Dropping cellular ratio datagram");
                continue;
            }
        };

        if let Some(last) = last_sequence_number {
            let expected = last.wrapping_add(1);
            if packet.sequence_number != expected {
                tracing::warn!(
                    expected,
                    received = packet.sequence_number,
                    gap = packet.sequence_number.wrapping_sub(expected),
                    "Cellular ratio sequence gap"
                );
            }
        }
        last_sequence_number = Some(packet.sequence_number);

        if packet.sequence_number % 10 == 0 {
            tracing::info!(
                seq = packet.sequence_number,
                ratio = packet.ratio,
                timestamp_ms = packet.timestamp_ms,
                "Cellular ratio sample"
            );
        } else {
            tracing::debug!(
                seq = packet.sequence_number,
                ratio = packet.ratio,
                timestamp_ms = packet.timestamp_ms,
                "Cellular ratio sample"
            );
        }

        if updates.send(packet).is_err() {
            tracing::debug!("Cellular ratio consumer dropped");
            break;
        }
    }

    tracing::debug!("Cellular ratio receive loop exited");
}
