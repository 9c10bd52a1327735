pub mod config_store;
pub mod docker_cli;
pub mod hardware_detector;
pub mod http_client;
pub mod port_probe;
pub mod system_shell;
pub mod terminal_console;

pub use config_store::TomlConfigStore;
pub use docker_cli::DockerCli;
pub use hardware_detector::SystemHardwareDetector;
pub use http_client::ReqwestHttpClient;
pub use port_probe::TcpPortProbe;
pub use system_shell::SystemShell;
pub use terminal_console::TerminalConsole;
