// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Phase timers for the four pipeline stages.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const PROGRESS_WIDTH: usize = 6;
const ELAPSED_WIDTH: usize = 13;

#[derive(Debug, Default)]
pub struct Timing {
    phases: BTreeMap<Kind, Duration>,
}

impl Timing {
    pub fn begin(&self, kind: Kind) -> Timer {
        Timer(kind, Instant::now())
    }

    pub fn finish(&mut self, timer: Timer) {
        self.record(timer.0, timer.1.elapsed());
    }

    pub fn record(&mut self, kind: Kind, elapsed: Duration) {
        self.phases.insert(kind, elapsed);
    }

    pub fn print_table(&self) {
        let total: Duration = self.phases.values().sum();
        let max_prefix_length = self
            .phases
            .keys()
            .map(|k| k.to_string().len())
            .max()
            .unwrap_or_default();

        println!("P{:<max_prefix_length$}  {:>ELAPSED_WIDTH$} {:>PROGRESS_WIDTH$}", "hase", "Elapsed", "%");
        for (kind, elapsed) in &self.phases {
            println!(
                "│{:<max_prefix_length$}  {} {}",
                kind,
                fmt_elapsed(*elapsed),
                fmt_progress(*elapsed, total)
            );
        }
        println!("{}", "─".repeat(1 + max_prefix_length + 2 + ELAPSED_WIDTH + 1 + PROGRESS_WIDTH));
        println!("T{:<max_prefix_length$}  {} {}", "otal", fmt_elapsed(total), fmt_progress(total, total));
    }
}

pub struct Timer(Kind, Instant);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
pub enum Kind {
    Parse,
    Resolve,
    Script,
    Execute,
}

fn fmt_elapsed(duration: Duration) -> String {
    let _seconds = duration.as_secs_f32() % 60.0;
    let _minutes = (duration.as_secs() / 60) % 60;
    let _hours = duration.as_secs() / 3600;

    let seconds = if _minutes > 0 {
        format!("{_seconds:0>5.2}s")
    } else {
        format!("{_seconds:>5.2}s")
    };

    let minutes = if _minutes > 0 {
        if _hours > 0 {
            format!("{_minutes:0>2}m")
        } else {
            format!("{_minutes:>2}m")
        }
    } else {
        " ".repeat(3)
    };

    let hours = if _hours > 0 { format!("{_hours:>3}h") } else { " ".repeat(4) };

    format!("{hours}{minutes}{seconds}")
}

fn fmt_progress(elapsed: Duration, total: Duration) -> String {
    if total.as_secs_f32() == 0.0 {
        return format!("{:>5.1}%", 0.0);
    }
    let pct = elapsed.as_secs_f32() / total.as_secs_f32() * 100.0;
    format!("{pct:>5.1}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_only() {
        assert_eq!(fmt_elapsed(Duration::from_secs_f32(1.004)), "        1.00s");
    }

    #[test]
    fn minutes_and_seconds() {
        assert_eq!(fmt_elapsed(Duration::from_secs(61)), "     1m01.00s");
    }

    #[test]
    fn record_and_print_does_not_panic() {
        let mut timing = Timing::default();
        timing.record(Kind::Parse, Duration::from_secs(1));
        timing.record(Kind::Resolve, Duration::from_secs(2));
        timing.print_table();
    }
}
