//! Serial link tasks.
//!
//! `rx` reassembles command frames and answers each one; `tx` is the single
//! writer that drains the outbound queue (replies and telemetry) onto the
//! wire.

use embassy_time::Timer;
use embedded_io_async::{Read, Write};

use super::protocol::{handle_frame, FrameAssembler, FrameEvent, ProtocolError, FRAME_CAPACITY};
use crate::utils::controllers::DeviceContext;

/// Read commands from `port` forever.
pub async fn rx<R: Read>(
    ctx: &DeviceContext,
    mut port: R,
) -> ! {
    let mut assembler = FrameAssembler::<FRAME_CAPACITY>::new();
    let mut chunk = [0u8; 64];
    loop {
        let n = match port.read(&mut chunk).await {
            Ok(0) => {
                Timer::after_millis(10).await;
                continue;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Serial read failed: {:?}", e);
                Timer::after_millis(10).await;
                continue;
            }
        };
        for &byte in &chunk[..n] {
            match assembler.push(byte) {
                FrameEvent::Pending => {}
                FrameEvent::Overflow => {
                    tracing::warn!(
                        "Command buffer overflow, resetting ({})",
                        ProtocolError::Overflow
                    )
                }
                FrameEvent::Frame(frame) => {
                    let reply = handle_frame(ctx, &frame).await;
                    match reply.encode() {
                        Ok(line) => ctx.send_reply(line).await,
                        Err(e) => tracing::error!("Reply encode failed: {}", e),
                    }
                }
            }
        }
    }
}

/// Write queued lines to `port` forever.
pub async fn tx<W: Write>(
    ctx: &DeviceContext,
    mut port: W,
) -> ! {
    loop {
        let line = ctx.next_outbound().await;
        if let Err(e) = port.write_all(line.as_bytes()).await {
            tracing::warn!("Serial write failed: {:?}", e);
            continue;
        }
        if let Err(e) = port.flush().await {
            tracing::warn!("Serial flush failed: {:?}", e);
        }
    }
}
