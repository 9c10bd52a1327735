pub mod config;
pub mod console;
pub mod engine;
pub mod hardware;
pub mod http;
pub mod network;
pub mod shell;

pub use config::ConfigStore;
pub use console::Console;
pub use engine::{ContainerEngine, EngineInfo, EphemeralRun};
pub use hardware::HardwareDetector;
pub use http::HttpClient;
pub use network::PortProbe;
pub use shell::{CommandOutput, HostShell};
