//! In-memory device registry implementing [`Backend`].
//!
//! Devices are registered under a name together with a [`DeviceDescriptor`]
//! listing their channels and attribute tables. Attribute values are held in
//! memory, and every device owns a sample buffer that READBUF/WRITEBUF move
//! data through. This is enough to run the daemon against simulated
//! hardware, and it is the reference store the round-trip tests use.
//!
//! An empty attribute name addresses every attribute of the scope at once.
//! The payload is then a sequence of records:
//!
//! ```text
//! ┌──────────────────┬────────────────────────────┐
//! │ Length (4B, BE)  │ value, zero-padded to 4B   │  × attributes
//! └──────────────────┴────────────────────────────┘
//! ```

use log::{debug, info};

use super::{AttrKind, Backend, BackendResult};
use crate::error::Errno;
use crate::protocol::session::SessionId;

// ───────────────────────────────────────────────────────────────
// Descriptors
// ───────────────────────────────────────────────────────────────

/// Attribute value held by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Readable and writable.
    Stored(Vec<u8>),
    /// Readable only; writes are refused with `-EACCES`.
    ReadOnly(Vec<u8>),
}

impl AttrValue {
    pub fn stored(v: impl AsRef<[u8]>) -> Self {
        Self::Stored(v.as_ref().to_vec())
    }

    pub fn read_only(v: impl AsRef<[u8]>) -> Self {
        Self::ReadOnly(v.as_ref().to_vec())
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Stored(v) | Self::ReadOnly(v) => v,
        }
    }

    fn store(&mut self, data: &[u8]) -> BackendResult<()> {
        match self {
            Self::Stored(v) => {
                v.clear();
                v.extend_from_slice(data);
                Ok(())
            }
            Self::ReadOnly(_) => Err(Errno::EACCES),
        }
    }
}

type AttrTable = Vec<(String, AttrValue)>;

/// One channel of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub name: String,
    pub output: bool,
    attributes: AttrTable,
}

impl ChannelDescriptor {
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: false,
            attributes: Vec::new(),
        }
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: true,
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.push((name.into(), value));
        self
    }
}

/// Fills a freshly captured sample buffer.
pub type CaptureFn = fn(mask: u32, buf: &mut [u8]);

/// Static description of a device: channels, attributes, buffer size.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    channels: Vec<ChannelDescriptor>,
    attributes: AttrTable,
    debug_attributes: AttrTable,
    buffer_attributes: AttrTable,
    buffer_capacity: usize,
    capture: Option<CaptureFn>,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceDescriptor {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            attributes: Vec::new(),
            debug_attributes: Vec::new(),
            buffer_attributes: Vec::new(),
            buffer_capacity: 4096,
            capture: None,
        }
    }

    #[must_use]
    pub fn channel(mut self, channel: ChannelDescriptor) -> Self {
        self.channels.push(channel);
        self
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.push((name.into(), value));
        self
    }

    #[must_use]
    pub fn debug_attribute(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.debug_attributes.push((name.into(), value));
        self
    }

    #[must_use]
    pub fn buffer_attribute(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.buffer_attributes.push((name.into(), value));
        self
    }

    /// Largest number of sample bytes the device can hold.
    #[must_use]
    pub fn buffer_capacity(mut self, bytes: usize) -> Self {
        self.buffer_capacity = bytes;
        self
    }

    /// Generator run on every device-to-memory transfer.
    #[must_use]
    pub fn capture_with(mut self, f: CaptureFn) -> Self {
        self.capture = Some(f);
        self
    }

    /// Mask with one bit set per declared channel.
    fn channel_mask(&self) -> u32 {
        match self.channels.len() {
            0 => 0,
            n if n >= 32 => u32::MAX,
            n => (1u32 << n) - 1,
        }
    }

    fn table_mut(&mut self, kind: AttrKind) -> &mut AttrTable {
        match kind {
            AttrKind::Device => &mut self.attributes,
            AttrKind::Debug => &mut self.debug_attributes,
            AttrKind::Buffer => &mut self.buffer_attributes,
        }
    }

    fn channel_table_mut(&mut self, channel: &str, is_output: bool) -> BackendResult<&mut AttrTable> {
        self.channels
            .iter_mut()
            .find(|c| c.name == channel && c.output == is_output)
            .map(|c| &mut c.attributes)
            .ok_or(Errno::ENOENT)
    }
}

// ───────────────────────────────────────────────────────────────
// Attribute table access
// ───────────────────────────────────────────────────────────────

fn padded(len: usize) -> usize {
    len.div_ceil(4) * 4
}

fn read_from_table(table: &AttrTable, attr: &str, out: &mut [u8]) -> BackendResult<usize> {
    if attr.is_empty() {
        return read_all(table, out);
    }
    let (_, value) = table
        .iter()
        .find(|(name, _)| name == attr)
        .ok_or(Errno::ENOENT)?;
    let bytes = value.bytes();
    let n = bytes.len().min(out.len());
    out[..n].copy_from_slice(&bytes[..n]);
    Ok(n)
}

fn write_to_table(table: &mut AttrTable, attr: &str, data: &[u8]) -> BackendResult<usize> {
    if attr.is_empty() {
        return write_all(table, data);
    }
    let (_, value) = table
        .iter_mut()
        .find(|(name, _)| name == attr)
        .ok_or(Errno::ENOENT)?;
    value.store(data)?;
    Ok(data.len())
}

fn read_all(table: &AttrTable, out: &mut [u8]) -> BackendResult<usize> {
    let mut pos = 0;
    for (_, value) in table {
        let bytes = value.bytes();
        let end = pos + 4 + padded(bytes.len());
        if end > out.len() {
            return Err(Errno::ENOMEM);
        }
        out[pos..pos + 4].copy_from_slice(&(bytes.len() as u32).to_be_bytes());
        out[pos + 4..pos + 4 + bytes.len()].copy_from_slice(bytes);
        out[pos + 4 + bytes.len()..end].fill(0);
        pos = end;
    }
    Ok(pos)
}

fn write_all(table: &mut AttrTable, data: &[u8]) -> BackendResult<usize> {
    let mut pos = 0;
    for (_, value) in table.iter_mut() {
        let header = data.get(pos..pos + 4).ok_or(Errno::EINVAL)?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        pos += 4;
        let payload = data.get(pos..pos + len).ok_or(Errno::EINVAL)?;
        // Read-only entries are skipped so one record cannot fail the batch.
        if let AttrValue::Stored(_) = value {
            value.store(payload)?;
        }
        pos += padded(len);
    }
    Ok(data.len())
}

// ───────────────────────────────────────────────────────────────
// Registry
// ───────────────────────────────────────────────────────────────

struct Interface {
    name: String,
    descriptor: DeviceDescriptor,
    ch_mask: u32,
    open: bool,
    sample_size: usize,
    samples: Vec<u8>,
}

/// Registry of named devices backed by memory.
pub struct DeviceRegistry {
    interfaces: Vec<Interface>,
    discovery_text: String,
    timeout_ms: u32,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            interfaces: Vec::new(),
            discovery_text: String::new(),
            timeout_ms: 0,
        }
    }

    /// Add a device. Names must be unique.
    pub fn register(&mut self, name: impl Into<String>, descriptor: DeviceDescriptor) -> BackendResult<()> {
        let name = name.into();
        if self.interfaces.iter().any(|i| i.name == name) {
            return Err(Errno::EEXIST);
        }
        info!(
            "registry: registered '{}' ({} channels)",
            name,
            descriptor.channels.len()
        );
        self.interfaces.push(Interface {
            name,
            descriptor,
            ch_mask: 0,
            open: false,
            sample_size: 0,
            samples: Vec::new(),
        });
        Ok(())
    }

    /// Remove a device.
    pub fn unregister(&mut self, name: &str) -> BackendResult<()> {
        let idx = self
            .interfaces
            .iter()
            .position(|i| i.name == name)
            .ok_or(Errno::ENODEV)?;
        self.interfaces.remove(idx);
        info!("registry: unregistered '{}'", name);
        Ok(())
    }

    pub fn device_names(&self) -> impl Iterator<Item = &str> {
        self.interfaces.iter().map(|i| i.name.as_str())
    }

    /// Replace the document returned by `PRINT`.
    pub fn set_discovery_text(&mut self, text: impl Into<String>) {
        self.discovery_text = text.into();
    }

    /// Last value configured through `TIMEOUT`.
    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Sample bytes currently held by `device`.
    pub fn samples(&self, device: &str) -> Option<&[u8]> {
        self.interfaces
            .iter()
            .find(|i| i.name == device)
            .map(|i| i.samples.as_slice())
    }

    /// Sample size given to the open context of `device`.
    pub fn sample_size(&self, device: &str) -> Option<usize> {
        self.interfaces
            .iter()
            .find(|i| i.name == device && i.open)
            .map(|i| i.sample_size)
    }

    /// Whether `device` has an open sampling context.
    pub fn is_open(&self, device: &str) -> bool {
        self.interfaces.iter().any(|i| i.name == device && i.open)
    }

    fn interface_mut(&mut self, device: &str) -> BackendResult<&mut Interface> {
        self.interfaces
            .iter_mut()
            .find(|i| i.name == device)
            .ok_or(Errno::ENODEV)
    }

    fn open_interface_mut(&mut self, device: &str) -> BackendResult<&mut Interface> {
        let iface = self.interface_mut(device)?;
        if iface.open { Ok(iface) } else { Err(Errno::EBADF) }
    }
}

impl Backend for DeviceRegistry {
    fn read_attr(
        &mut self,
        _sid: SessionId,
        device: &str,
        attr: &str,
        out: &mut [u8],
        kind: AttrKind,
    ) -> BackendResult<usize> {
        let iface = self.interface_mut(device)?;
        read_from_table(iface.descriptor.table_mut(kind), attr, out)
    }

    fn write_attr(
        &mut self,
        _sid: SessionId,
        device: &str,
        attr: &str,
        data: &[u8],
        kind: AttrKind,
    ) -> BackendResult<usize> {
        let iface = self.interface_mut(device)?;
        write_to_table(iface.descriptor.table_mut(kind), attr, data)
    }

    fn ch_read_attr(
        &mut self,
        _sid: SessionId,
        device: &str,
        channel: &str,
        is_output: bool,
        attr: &str,
        out: &mut [u8],
    ) -> BackendResult<usize> {
        let iface = self.interface_mut(device)?;
        let table = iface.descriptor.channel_table_mut(channel, is_output)?;
        read_from_table(table, attr, out)
    }

    fn ch_write_attr(
        &mut self,
        _sid: SessionId,
        device: &str,
        channel: &str,
        is_output: bool,
        attr: &str,
        data: &[u8],
    ) -> BackendResult<usize> {
        let iface = self.interface_mut(device)?;
        let table = iface.descriptor.channel_table_mut(channel, is_output)?;
        write_to_table(table, attr, data)
    }

    fn open(&mut self, _sid: SessionId, device: &str, sample_size: usize, mask: u32) -> BackendResult<()> {
        let iface = self.interface_mut(device)?;
        if mask & !iface.descriptor.channel_mask() != 0 {
            return Err(Errno::ENOENT);
        }
        iface.ch_mask = mask;
        iface.sample_size = sample_size;
        iface.open = true;
        debug!("registry: '{}' open mask={:08x} samples={}", device, mask, sample_size);
        Ok(())
    }

    fn close(&mut self, _sid: SessionId, device: &str) -> BackendResult<()> {
        let iface = self.interface_mut(device)?;
        iface.ch_mask = 0;
        iface.open = false;
        debug!("registry: '{}' closed", device);
        Ok(())
    }

    fn get_mask(&mut self, _sid: SessionId, device: &str) -> BackendResult<u32> {
        Ok(self.interface_mut(device)?.ch_mask)
    }

    fn transfer_dev_to_mem(
        &mut self,
        _sid: SessionId,
        device: &str,
        bytes: usize,
    ) -> Option<BackendResult<usize>> {
        let result = self.open_interface_mut(device).and_then(|iface| {
            if bytes > iface.descriptor.buffer_capacity {
                return Err(Errno::ENOMEM);
            }
            iface.samples.resize(bytes, 0);
            if let Some(capture) = iface.descriptor.capture {
                capture(iface.ch_mask, &mut iface.samples);
            }
            Ok(bytes)
        });
        Some(result)
    }

    fn read_data(
        &mut self,
        _sid: SessionId,
        device: &str,
        buf: &mut [u8],
        offset: usize,
    ) -> BackendResult<usize> {
        let iface = self.open_interface_mut(device)?;
        let available = iface.samples.get(offset..).unwrap_or(&[]);
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn transfer_mem_to_dev(
        &mut self,
        _sid: SessionId,
        device: &str,
        bytes: usize,
    ) -> Option<BackendResult<usize>> {
        let result = self.open_interface_mut(device).and_then(|iface| {
            if bytes > iface.descriptor.buffer_capacity {
                Err(Errno::ENOMEM)
            } else {
                Ok(bytes)
            }
        });
        Some(result)
    }

    fn write_data(
        &mut self,
        _sid: SessionId,
        device: &str,
        data: &[u8],
        offset: usize,
    ) -> BackendResult<usize> {
        let iface = self.open_interface_mut(device)?;
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= iface.descriptor.buffer_capacity)
            .ok_or(Errno::ENOMEM)?;
        if iface.samples.len() < end {
            iface.samples.resize(end, 0);
        }
        iface.samples[offset..end].copy_from_slice(data);
        Ok(data.len())
    }

    fn set_timeout(&mut self, _sid: SessionId, timeout_ms: u32) -> Option<BackendResult<()>> {
        self.timeout_ms = timeout_ms;
        Some(Ok(()))
    }

    fn discovery_text(&mut self, _sid: SessionId) -> String {
        self.discovery_text.clone()
    }
}
