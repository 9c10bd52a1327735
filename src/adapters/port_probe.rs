use std::net::{Ipv4Addr, TcpListener};

use tracing::debug;

use crate::ports::PortProbe;

/// Port probe that tries to bind the port on all interfaces.
#[derive(Debug, Default)]
pub struct TcpPortProbe;

impl TcpPortProbe {
    pub fn new() -> Self {
        Self
    }
}

impl PortProbe for TcpPortProbe {
    fn is_free(&self, port: u16) -> bool {
        // The listener is dropped right away, releasing the port.
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(_) => true,
            Err(e) => {
                debug!(port = port, error = %e, "Port is not bindable");
                false
            }
        }
    }
}
