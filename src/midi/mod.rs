mod message;
mod output;

pub use message::{Channel, MidiMessage, controller, status};
pub use output::{
    MemoryPort, MemoryPortLog, MidirOutput, OutputPort, TracingPort, list_output_ports,
    select_port,
};
