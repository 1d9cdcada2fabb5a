// Global verbosity system for clean output control
use std::sync::atomic::{AtomicU8, Ordering};

static VERBOSITY_LEVEL: AtomicU8 = AtomicU8::new(0);

pub fn set_verbosity_level(level: u8) {
    VERBOSITY_LEVEL.store(level, Ordering::Relaxed);
    if level > 0 {
        println!("📢 Verbosity level: {} (0=summary, 1=info, 2=debug)", level);
    }
}

pub fn get_verbosity_level() -> u8 {
    VERBOSITY_LEVEL.load(Ordering::Relaxed)
}

// Level 0: always shown - cycle summaries, balances, mission status
#[macro_export]
macro_rules! o_summary {
    ($($arg:tt)*) => {
        println!($($arg)*);
    };
}

// Level 1: operational info - navigation, trades, events
#[macro_export]
macro_rules! o_info {
    ($($arg:tt)*) => {
        if $crate::verbosity::get_verbosity_level() >= 1 {
            println!($($arg)*);
        }
    };
}

// Level 2: detailed debug info - route rankings, API timings
#[macro_export]
macro_rules! o_debug {
    ($($arg:tt)*) => {
        if $crate::verbosity::get_verbosity_level() >= 2 {
            println!($($arg)*);
        }
    };
}

// Always print errors regardless of verbosity
#[macro_export]
macro_rules! o_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*)
    };
}
