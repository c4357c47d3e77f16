/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Wire protocol between the socket broker and its clients.
//!
//! # Frame layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ Payload Length (4 bytes, big-endian u32, excludes header)     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Protocol Version (1 byte, currently 0x01)                     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Frame Type (1 byte)                                           │
//! │   0x01 = Subscribe      0x02 = Subscribed                     │
//! │   0x03 = Unsubscribe    0x04 = Unsubscribed                   │
//! │   0x05 = Publish        0x06 = Published                      │
//! │   0x07 = Deliver        0x08 = Error                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Payload (JSON encoding of the frame)                          │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::{CommLinkError, Result};

/// Protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Frame header size: 4 bytes length + 1 byte version + 1 byte type.
pub const HEADER_SIZE: usize = 6;

/// Maximum frame size (16 MiB hard limit).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Frames exchanged with the socket broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BrokerFrame {
    /// Client → broker: start receiving `channel`.
    Subscribe {
        /// Channel name.
        channel: String,
    },
    /// Broker → client: the subscription is active.
    Subscribed {
        /// Channel name.
        channel: String,
    },
    /// Client → broker: stop receiving `channel`.
    Unsubscribe {
        /// Channel name.
        channel: String,
    },
    /// Broker → client: the subscription has ended.
    Unsubscribed {
        /// Channel name.
        channel: String,
    },
    /// Client → broker: fan `payload` out to `channel`.
    Publish {
        /// Channel name.
        channel: String,
        /// Packed message.
        payload: String,
    },
    /// Broker → client: the publish reached `receivers` subscribers.
    Published {
        /// Subscriber count.
        receivers: usize,
    },
    /// Broker → client: a payload published on a subscribed channel.
    Deliver {
        /// Channel name.
        channel: String,
        /// Packed message.
        payload: String,
    },
    /// Broker → client: the previous request failed.
    Error {
        /// Description.
        message: String,
    },
}

impl BrokerFrame {
    /// Frame type byte.
    #[must_use]
    pub const fn frame_type(&self) -> u8 {
        match self {
            Self::Subscribe { .. } => 0x01,
            Self::Subscribed { .. } => 0x02,
            Self::Unsubscribe { .. } => 0x03,
            Self::Unsubscribed { .. } => 0x04,
            Self::Publish { .. } => 0x05,
            Self::Published { .. } => 0x06,
            Self::Deliver { .. } => 0x07,
            Self::Error { .. } => 0x08,
        }
    }
}

fn closed_or_io(e: &std::io::Error) -> CommLinkError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        CommLinkError::Transport("connection closed".to_string())
    } else {
        CommLinkError::Transport(e.to_string())
    }
}

/// Reads one frame.
///
/// # Errors
///
/// Fails on I/O errors, a version mismatch, an oversized frame, or a payload
/// that does not decode to the frame type named in the header.
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<BrokerFrame>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| closed_or_io(&e))?;

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let version = header[4];
    let frame_type = header[5];

    if version != PROTOCOL_VERSION {
        return Err(CommLinkError::Transport(format!(
            "Unsupported protocol version: {version}, expected {PROTOCOL_VERSION}"
        )));
    }
    if length > max_size.min(MAX_FRAME_SIZE) {
        return Err(CommLinkError::Transport(format!(
            "Frame size {length} exceeds maximum {}",
            max_size.min(MAX_FRAME_SIZE)
        )));
    }

    let mut payload = vec![0u8; length];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| closed_or_io(&e))?;

    let frame: BrokerFrame = serde_json::from_slice(&payload)?;
    if frame.frame_type() != frame_type {
        return Err(CommLinkError::Transport(format!(
            "Frame type {frame_type:#04x} does not match payload {:#04x}",
            frame.frame_type()
        )));
    }
    Ok(frame)
}

/// Writes one frame and flushes.
pub async fn write_frame<W>(writer: &mut W, frame: &BrokerFrame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(frame)?;
    let length: u32 = payload
        .len()
        .try_into()
        .map_err(|_| CommLinkError::Transport("Payload too large for u32".to_string()))?;

    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(&length.to_be_bytes());
    header[4] = PROTOCOL_VERSION;
    header[5] = frame.frame_type();

    writer.write_all(&header).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}
