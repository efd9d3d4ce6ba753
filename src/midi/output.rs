use std::sync::Arc;

use midir::{MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;

use crate::error::PortError;

/// Destination for raw MIDI bytes.
pub trait OutputPort: Send {
    fn name(&self) -> &str;

    fn send(&mut self, bytes: &[u8]) -> Result<(), PortError>;

    /// Releases the underlying device handle.
    fn close(self: Box<Self>) {}
}

/// Output port backed by a `midir` connection.
pub struct MidirOutput {
    name: String,
    connection: MidiOutputConnection,
}

impl MidirOutput {
    /// Connects to the first port matching `selector`: an exact port name,
    /// then a port whose name contains it, then a numeric port index.
    pub fn open(client_name: &str, selector: &str) -> Result<Self, PortError> {
        let midi_out = MidiOutput::new(client_name).map_err(|e| PortError::Init(e.to_string()))?;

        let ports = midi_out.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_out.port_name(p).unwrap_or_default())
            .collect();

        let index = select_port(&names, selector)?;

        let name = names[index].clone();
        let connection = midi_out
            .connect(&ports[index], client_name)
            .map_err(|e| PortError::Connect {
                port: name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(port = %name, "opened MIDI output");
        Ok(Self { name, connection })
    }
}

impl OutputPort for MidirOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        self.connection.send(bytes).map_err(|e| PortError::Send {
            port: self.name.clone(),
            reason: e.to_string(),
        })
    }

    fn close(self: Box<Self>) {
        tracing::info!(port = %self.name, "closing MIDI output");
        let _ = self.connection.close();
    }
}

/// Index of the port matching `selector` by exact name, then by name
/// fragment, then as a numeric index. A blank selector matches nothing.
pub fn select_port(names: &[String], selector: &str) -> Result<usize, PortError> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(PortError::NotFound(String::new()));
    }
    names
        .iter()
        .position(|n| n == selector)
        .or_else(|| names.iter().position(|n| n.contains(selector)))
        .or_else(|| selector.parse::<usize>().ok().filter(|&i| i < names.len()))
        .ok_or_else(|| PortError::NotFound(selector.to_string()))
}

/// Sorted names of the output ports currently visible to `midir`.
pub fn list_output_ports(client_name: &str) -> Result<Vec<String>, PortError> {
    let midi_out = MidiOutput::new(client_name).map_err(|e| PortError::Init(e.to_string()))?;
    let mut names: Vec<String> = midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect();
    names.sort();
    Ok(names)
}

/// Output port that keeps every message it is sent in memory.
///
/// The [`MemoryPortLog`] obtained from [`MemoryPort::log`] stays readable
/// after the port itself has been moved into a sequencer.
pub struct MemoryPort {
    name: String,
    log: MemoryPortLog,
}

#[derive(Clone, Default)]
pub struct MemoryPortLog {
    inner: Arc<Mutex<LogInner>>,
}

#[derive(Default)]
struct LogInner {
    sent: Vec<Vec<u8>>,
    failing: bool,
    closed: bool,
}

impl MemoryPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log: MemoryPortLog::default(),
        }
    }

    pub fn log(&self) -> MemoryPortLog {
        self.log.clone()
    }
}

impl MemoryPortLog {
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.inner.lock().sent.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// While failing, every send returns [`PortError::Send`] and records nothing.
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl OutputPort for MemoryPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        let mut inner = self.log.inner.lock();
        if inner.failing {
            return Err(PortError::Send {
                port: self.name.clone(),
                reason: "device disconnected".into(),
            });
        }
        inner.sent.push(bytes.to_vec());
        Ok(())
    }

    fn close(self: Box<Self>) {
        self.log.inner.lock().closed = true;
    }
}

/// Output port that only logs, for dry runs without a MIDI device.
pub struct TracingPort;

impl OutputPort for TracingPort {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        tracing::info!("midi out {:02X?}", bytes);
        Ok(())
    }
}
