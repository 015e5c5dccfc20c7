//! Shared test utilities for serial-line integration tests.
//!
//! - Loopback ports with a second driver clone kept for inspection
//! - Hardware settings read from the environment

#![allow(dead_code)]

use serial_line::port::{LoopbackDriver, Port};
use std::env;
use std::time::Duration;

/// Device name used for in-memory ports.
pub const LOOP: &str = "LOOP";

/// A closed loopback port plus a driver clone that shares its state.
pub fn loopback_port(baud_rate: u32) -> (LoopbackDriver, Port<LoopbackDriver>) {
    let driver = LoopbackDriver::new();
    let port = Port::with_driver(driver.clone(), LOOP, baud_rate);
    (driver, port)
}

/// An open loopback port whose reads never wait.
pub fn open_loopback_port(baud_rate: u32) -> (LoopbackDriver, Port<LoopbackDriver>) {
    let (driver, port) = loopback_port(baud_rate);
    let port = port.with_timeout(None);
    port.open().expect("loopback open failed");
    (driver, port)
}

/// An open port over a driver that does not echo writes.
pub fn open_silent_port(timeout: Option<Duration>) -> (LoopbackDriver, Port<LoopbackDriver>) {
    let driver = LoopbackDriver::with_loopback(false);
    let port = Port::with_driver(driver.clone(), LOOP, 115200).with_timeout(timeout);
    port.open().expect("loopback open failed");
    (driver, port)
}

/// Hardware test settings from `TEST_PORT`, `TEST_BAUD` and `TEST_LOOPBACK`.
pub struct HardwareConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub loopback_enabled: bool,
}

impl HardwareConfig {
    pub fn from_env() -> Option<Self> {
        let port_name = env::var("TEST_PORT").ok()?;
        let baud_rate = env::var("TEST_BAUD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(115200);
        let loopback_enabled = env::var("TEST_LOOPBACK").ok().as_deref() == Some("1");

        Some(Self {
            port_name,
            baud_rate,
            loopback_enabled,
        })
    }
}
