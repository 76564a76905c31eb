//! Statistics display and formatting

use srtla_core::PathSnapshot;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a millisecond RTT in human-readable form
pub fn format_rtt(rtt_ms: f64) -> String {
    if rtt_ms >= 1000.0 {
        format!("{:.2}s", rtt_ms / 1000.0)
    } else {
        format!("{:.1}ms", rtt_ms)
    }
}

/// Display a per-path statistics table
pub fn display_path_stats(snapshots: &[PathSnapshot], dropped: u64) {
    println!("\n┌──────────────────────────────────────────────────────────────────────────────┐");
    println!("│ PATHS                                                                        │");
    println!("├──────────────────────────────────────────────────────────────────────────────┤");
    println!(
        "│ {:<11} {:<9} {:<17} {:>6} {:>8} {:>8} {:>5} {:>6} │",
        "vip", "kind", "state", "window", "inflight", "rtt", "naks", "score"
    );
    for s in snapshots {
        println!(
            "│ {:<11} {:<9} {:<17} {:>6} {:>8} {:>8} {:>5} {:>6} │",
            s.virtual_ip,
            s.kind,
            s.state.to_string(),
            s.window,
            s.inflight,
            format_rtt(s.rtt_ms),
            s.nak_count,
            s.score,
        );
    }
    println!("├──────────────────────────────────────────────────────────────────────────────┤");
    let total_bytes: u64 = snapshots.iter().map(|s| s.bytes_sent).sum();
    let total_packets: u64 = snapshots.iter().map(|s| s.packets_sent).sum();
    println!(
        "│ total: {} in {} packets, {} dropped (no path)",
        format_bytes(total_bytes),
        total_packets,
        dropped
    );
    println!("└──────────────────────────────────────────────────────────────────────────────┘");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn rtt_formatting() {
        assert_eq!(format_rtt(85.3), "85.3ms");
        assert_eq!(format_rtt(1500.0), "1.50s");
    }
}
