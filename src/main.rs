//! iiod-lite daemon — serves a simulated device registry over TCP.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Server (accept loop, one thread per client)             │
//! │    Session ── Session ── Session   (SessionTable slots)  │
//! │  ──────────────── Backend trait boundary ─────────────── │
//! │  SharedBackend ──▶ DeviceRegistry (simulated sim-adc)    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `iiod-lite [config.json]`. Without a path the defaults apply.
#![deny(unused_must_use)]

use anyhow::{Context, Result};
use log::info;

use iiod::backend::{AttrValue, ChannelDescriptor, DeviceDescriptor, DeviceRegistry, SharedBackend};
use iiod::config::DaemonConfig;
use iiod::server::Server;

const SIM_DEVICE: &str = "sim-adc";
const SIM_CHANNELS: usize = 4;

// ── Simulated device ──────────────────────────────────────────

/// Sawtooth per enabled channel, 16-bit little-endian, interleaved.
fn capture_ramp(mask: u32, buf: &mut [u8]) {
    let enabled = mask.count_ones().max(1) as usize;
    for (i, sample) in buf.chunks_mut(2).enumerate() {
        let value = ((i / enabled) as u16).wrapping_mul(64);
        for (dst, src) in sample.iter_mut().zip(value.to_le_bytes()) {
            *dst = src;
        }
    }
}

fn simulated_registry() -> Result<DeviceRegistry> {
    let mut device = DeviceDescriptor::new()
        .attribute("sampling_frequency", AttrValue::stored("1000"))
        .attribute("name", AttrValue::read_only(SIM_DEVICE))
        .debug_attribute("direct_reg_access", AttrValue::stored("0x0"))
        .buffer_attribute("length", AttrValue::stored("1024"))
        .buffer_capacity(0x10000)
        .capture_with(capture_ramp);
    for n in 0..SIM_CHANNELS {
        device = device.channel(
            ChannelDescriptor::input(format!("voltage{n}"))
                .attribute("raw", AttrValue::stored("0"))
                .attribute("scale", AttrValue::read_only("0.152587890")),
        );
    }

    let mut registry = DeviceRegistry::new();
    registry
        .register(SIM_DEVICE, device)
        .context("registering simulated device")?;
    registry.set_discovery_text(discovery_xml());
    Ok(registry)
}

fn discovery_xml() -> String {
    let channels: String = (0..SIM_CHANNELS)
        .map(|n| {
            format!(
                "<channel id=\"voltage{n}\" type=\"input\">\
                 <attribute name=\"raw\"/><attribute name=\"scale\"/></channel>"
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><context name=\"iiod-lite\">\
         <device id=\"{SIM_DEVICE}\" name=\"{SIM_DEVICE}\">{channels}\
         <attribute name=\"sampling_frequency\"/><attribute name=\"name\"/>\
         <debug-attribute name=\"direct_reg_access\"/>\
         <buffer-attribute name=\"length\"/></device></context>"
    )
}

// ── Entry point ───────────────────────────────────────────────

fn load_config() -> Result<DaemonConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(DaemonConfig::default());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    DaemonConfig::from_json(&text).with_context(|| format!("loading {path}"))
}

fn main() -> Result<()> {
    env_logger::init();

    let config = load_config()?;
    info!(
        "IIOD: starting (max {} sessions, chunk {} bytes)",
        config.max_sessions, config.engine.chunk_size
    );

    let backend = SharedBackend::new(simulated_registry()?);
    let server = Server::bind(&config, backend)
        .with_context(|| format!("binding {}", config.listen_addr))?;
    server.serve();
    Ok(())
}
