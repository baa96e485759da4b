// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Small blocking-style helpers shared by the worker pool and the duel
//! orchestrator, both of which write short replies on an otherwise
//! non-blocking [`mio::net::TcpStream`] from a worker thread.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use mio::net::TcpStream;

const WRITE_RETRY_BUDGET: Duration = Duration::from_secs(5);

/// Write `text` plus a trailing `\n`, retrying through `WouldBlock` for up
/// to [`WRITE_RETRY_BUDGET`] (spec.md §7: short writes are retried within
/// the same handler rather than requeued through the reactor). Replies here
/// are always a handful of bytes, well under a socket send buffer, so this
/// effectively never spins more than once or twice in practice.
pub fn write_line(stream: &mut TcpStream, text: &str) -> io::Result<()> {
    let mut payload = text.as_bytes().to_vec();
    payload.push(b'\n');
    let mut written = 0;
    let deadline = Instant::now() + WRITE_RETRY_BUDGET;
    while written < payload.len() {
        match stream.write(&payload[written..]) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "peer closed")),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "write stalled"));
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
