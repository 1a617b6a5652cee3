use std::io::Write;
use std::net::Ipv4Addr;
use tracing::warn;

use crate::state::{EngineStats, StatsError};

/// Write the ping statistics block
///
/// The RTT line is omitted when no reply was ever matched; the missing
/// samples are reported back to the caller instead.
pub fn write_ping_summary<W: Write>(
    writer: &mut W,
    target: Ipv4Addr,
    stats: &EngineStats,
) -> std::io::Result<Result<(), StatsError>> {
    writeln!(writer)?;
    writeln!(writer, "--- {} ping statistics ---", target)?;
    writeln!(
        writer,
        "{} packets transmitted, {} received, {}% packet loss",
        stats.transmitted,
        stats.received,
        stats.loss_pct()
    )?;

    match stats.summary() {
        Ok(rtt) => {
            writeln!(
                writer,
                "rtt min/avg/max/mdev = {:.3}/{:.3}/{:.3}/{:.3} ms",
                rtt.min, rtt.avg, rtt.max, rtt.mdev
            )?;
            Ok(Ok(()))
        }
        Err(e) => {
            if stats.transmitted > 0 {
                warn!("{}", e);
            }
            Ok(Err(e))
        }
    }
}
